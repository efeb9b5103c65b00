use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Screen scale factor readable from several UI-side owners.
///
/// The sink writes it when a scale change is pumped; input adapters read it
/// on every event so pointer mapping follows the frame on screen.
#[derive(Debug, Clone)]
pub struct SharedScaleFactor {
    bits: Arc<AtomicU64>,
}

impl SharedScaleFactor {
    pub fn new(scale_factor: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(scale_factor.to_bits())),
        }
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Ignores non-finite and non-positive values. Returns whether the value
    /// was stored.
    pub fn set(&self, scale_factor: f64) -> bool {
        if !scale_factor.is_finite() || scale_factor <= 0.0 {
            return false;
        }
        self.bits.store(scale_factor.to_bits(), Ordering::Release);
        true
    }
}
