use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameRate {
    /// Frames published during the last completed second.
    pub per_second: u32,
    pub current_second: u32,
    pub total: u64,
}

/// Counts published frames in one-second windows.
#[derive(Debug, Default)]
pub struct FrameRateCounter {
    window_start: Option<Instant>,
    current: u32,
    last_second: u32,
    total: u64,
}

impl FrameRateCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self) {
        self.record_at(Instant::now());
    }

    pub fn record_at(&mut self, now: Instant) {
        self.roll_over(now);
        self.current = self.current.saturating_add(1);
        self.total += 1;
    }

    pub fn snapshot(&mut self) -> FrameRate {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&mut self, now: Instant) -> FrameRate {
        self.roll_over(now);
        FrameRate {
            per_second: self.last_second,
            current_second: self.current,
            total: self.total,
        }
    }

    fn roll_over(&mut self, now: Instant) {
        let start = *self.window_start.get_or_insert(now);
        let elapsed = now.saturating_duration_since(start);
        if elapsed < WINDOW {
            return;
        }
        // A gap longer than one window means the last full second was idle.
        self.last_second = if elapsed < WINDOW * 2 { self.current } else { 0 };
        self.current = 0;
        self.window_start = Some(start + Duration::from_secs(elapsed.as_secs()));
    }
}
