//! Display sink crate root.
//!
//! The producer side (`DisplayPublisher`) records what the UI should do with
//! the newest texture; the UI side (`DisplaySink`) applies it when pumped.
//! At most one invalidation is pending at any time, and `Recreate` dominates
//! `Reuse`, so a UI thread that falls behind only ever sees the newest state
//! and the producer never blocks on it.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use frame_buffer::FrameLayout;
use texture_surface::{SurfaceTexture, TextureId};

mod frame_rate;
mod scale;

pub use frame_rate::{FrameRate, FrameRateCounter};
pub use scale::SharedScaleFactor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidateKind {
    /// Same texture, new contents.
    Reuse,
    /// New texture; the image source must be rebuilt.
    Recreate,
}

impl InvalidateKind {
    pub fn merge(self, other: InvalidateKind) -> InvalidateKind {
        match (self, other) {
            (InvalidateKind::Reuse, InvalidateKind::Reuse) => InvalidateKind::Reuse,
            _ => InvalidateKind::Recreate,
        }
    }
}

struct PendingInvalidation<T> {
    kind: InvalidateKind,
    texture: Weak<SurfaceTexture<T>>,
}

struct Pending<T> {
    invalidation: Option<PendingInvalidation<T>>,
    scale_factor: Option<f64>,
}

struct SharedDisplay<T> {
    pending: Mutex<Pending<T>>,
    frame_rate: Mutex<FrameRateCounter>,
    notify_sender: Sender<()>,
    notify_receiver: Receiver<()>,
}

impl<T> SharedDisplay<T> {
    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Pending<T>> {
        self.pending
            .lock()
            .unwrap_or_else(|_| panic!("display pending lock poisoned"))
    }

    fn frame_rate(&self) -> FrameRate {
        self.frame_rate
            .lock()
            .unwrap_or_else(|_| panic!("frame rate lock poisoned"))
            .snapshot()
    }

    fn wake(&self) {
        match self.notify_sender.try_send(()) {
            Ok(()) => {}
            Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                panic!("display notify channel disconnected")
            }
        }
    }
}

/// Creates a connected publisher/sink pair.
pub fn display_channel<T>(initial_scale_factor: f64) -> (DisplayPublisher<T>, DisplaySink<T>) {
    let (notify_sender, notify_receiver) = bounded(1);
    let shared = Arc::new(SharedDisplay {
        pending: Mutex::new(Pending {
            invalidation: None,
            scale_factor: None,
        }),
        frame_rate: Mutex::new(FrameRateCounter::new()),
        notify_sender,
        notify_receiver,
    });
    let publisher = DisplayPublisher {
        shared: Arc::clone(&shared),
    };
    let sink = DisplaySink {
        shared,
        source: None,
        next_source_id: 1,
        scale_factor: SharedScaleFactor::new(initial_scale_factor),
        context_lost: false,
        source_replaced: Vec::new(),
        context_restored: Vec::new(),
        _ui_thread_only: PhantomData,
    };
    (publisher, sink)
}

/// Producer half. Cheap to clone; never blocks on the UI thread.
pub struct DisplayPublisher<T> {
    shared: Arc<SharedDisplay<T>>,
}

impl<T> Clone for DisplayPublisher<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> DisplayPublisher<T> {
    pub fn publish(&self, texture: &Arc<SurfaceTexture<T>>, kind: InvalidateKind) {
        {
            let mut pending = self.shared.lock_pending();
            let kind = match &pending.invalidation {
                Some(previous) => previous.kind.merge(kind),
                None => kind,
            };
            pending.invalidation = Some(PendingInvalidation {
                kind,
                texture: Arc::downgrade(texture),
            });
        }
        self.shared
            .frame_rate
            .lock()
            .unwrap_or_else(|_| panic!("frame rate lock poisoned"))
            .record();
        tracing::trace!(texture_id = texture.id().raw(), ?kind, "display invalidation published");
        self.shared.wake();
    }

    pub fn publish_scale_factor(&self, scale_factor: f64) {
        self.shared.lock_pending().scale_factor = Some(scale_factor);
        self.shared.wake();
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.shared.frame_rate()
    }
}

/// What one pump did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkUpdate {
    Idle,
    /// The bound image source was marked dirty.
    Invalidated,
    /// A new image source was bound.
    Replaced,
    /// The published texture was gone before the UI got to it.
    Stale,
}

/// UI-side handle to the newest texture.
#[derive(Debug)]
pub struct ImageSource<T> {
    id: u64,
    texture_id: TextureId,
    layout: FrameLayout,
    texture: Weak<SurfaceTexture<T>>,
    dirty_generation: u64,
    scale_factor: f64,
}

impl<T> ImageSource<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn texture_id(&self) -> TextureId {
        self.texture_id
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// `None` once the producer has replaced or released the texture.
    pub fn texture(&self) -> Option<Arc<SurfaceTexture<T>>> {
        self.texture.upgrade()
    }

    /// Bumped on every `Reuse` applied to this source.
    pub fn dirty_generation(&self) -> u64 {
        self.dirty_generation
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }
}

type SourceObserver<T> = Box<dyn FnMut(&ImageSource<T>)>;
type RestoreObserver = Box<dyn FnMut()>;

/// UI half. Lives on the UI thread.
pub struct DisplaySink<T> {
    shared: Arc<SharedDisplay<T>>,
    source: Option<ImageSource<T>>,
    next_source_id: u64,
    scale_factor: SharedScaleFactor,
    context_lost: bool,
    source_replaced: Vec<SourceObserver<T>>,
    context_restored: Vec<RestoreObserver>,
    _ui_thread_only: PhantomData<*const ()>,
}

impl<T> DisplaySink<T> {
    pub fn image_source(&self) -> Option<&ImageSource<T>> {
        self.source.as_ref()
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor.get()
    }

    /// Handle that tracks every scale change this sink applies.
    pub fn scale_factor_handle(&self) -> SharedScaleFactor {
        self.scale_factor.clone()
    }

    pub fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.shared.frame_rate()
    }

    pub fn frames_per_second(&self) -> u32 {
        self.frame_rate().per_second
    }

    pub fn on_source_replaced(&mut self, observer: impl FnMut(&ImageSource<T>) + 'static) {
        self.source_replaced.push(Box::new(observer));
    }

    /// Observers run when the rendering context comes back; they are expected
    /// to reallocate textures and republish.
    pub fn on_context_restored(&mut self, observer: impl FnMut() + 'static) {
        self.context_restored.push(Box::new(observer));
    }

    /// Applies the pending invalidation, if any.
    pub fn pump(&mut self) -> SinkUpdate {
        while self.shared.notify_receiver.try_recv().is_ok() {}
        let (invalidation, scale_factor) = {
            let mut pending = self.shared.lock_pending();
            (pending.invalidation.take(), pending.scale_factor.take())
        };

        if let Some(scale_factor) = scale_factor
            && self.scale_factor.set(scale_factor)
        {
            if let Some(source) = self.source.as_mut() {
                source.scale_factor = scale_factor;
            }
        }
        let Some(invalidation) = invalidation else {
            return SinkUpdate::Idle;
        };
        if self.context_lost {
            tracing::debug!("invalidation dropped while rendering context is lost");
            return SinkUpdate::Idle;
        }
        let Some(texture) = invalidation.texture.upgrade() else {
            tracing::trace!("published texture already released");
            return SinkUpdate::Stale;
        };

        let reusable = invalidation.kind == InvalidateKind::Reuse
            && self.source.as_ref().is_some_and(|source| {
                source.texture_id == texture.id() && source.texture.strong_count() > 0
            });
        if reusable && let Some(source) = self.source.as_mut() {
            source.dirty_generation += 1;
            return SinkUpdate::Invalidated;
        }

        self.bind_source(&texture);
        SinkUpdate::Replaced
    }

    /// Waits up to `timeout` for a publish, then pumps.
    pub fn wait_and_pump(&mut self, timeout: Duration) -> SinkUpdate {
        match self.shared.notify_receiver.recv_timeout(timeout) {
            Ok(()) => self.pump(),
            Err(RecvTimeoutError::Timeout) => SinkUpdate::Idle,
            Err(RecvTimeoutError::Disconnected) => {
                panic!("display notify channel disconnected")
            }
        }
    }

    /// Drops the image source; invalidations are ignored until
    /// `handle_context_restored`.
    pub fn handle_context_lost(&mut self) {
        if let Some(source) = self.source.take() {
            tracing::warn!(source_id = source.id, "rendering context lost; image source dropped");
        }
        self.context_lost = true;
    }

    /// Runs the restore observers, then applies whatever they published.
    pub fn handle_context_restored(&mut self) -> SinkUpdate {
        self.context_lost = false;
        for observer in &mut self.context_restored {
            observer();
        }
        self.pump()
    }

    fn bind_source(&mut self, texture: &Arc<SurfaceTexture<T>>) {
        let id = self.next_source_id;
        self.next_source_id += 1;
        let previous = self.source.replace(ImageSource {
            id,
            texture_id: texture.id(),
            layout: texture.layout(),
            texture: Arc::downgrade(texture),
            dirty_generation: 0,
            scale_factor: self.scale_factor.get(),
        });
        tracing::debug!(
            source_id = id,
            previous_source_id = previous.map(|source| source.id),
            texture_id = texture.id().raw(),
            width = texture.layout().width(),
            height = texture.layout().height(),
            "image source bound"
        );
        if let Some(source) = &self.source {
            for observer in &mut self.source_replaced {
                observer(source);
            }
        }
    }
}
