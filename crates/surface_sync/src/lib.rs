//! Surface synchronization.
//!
//! `SurfaceSync` is the one place where paint notifications from the browser
//! engine meet the texture pair the UI displays. Every entry point takes the
//! surface lock, so ingestion, compositing, reallocation and disposal are
//! serialized per surface, and an observer taking the same lock only ever
//! sees `Uninitialized`, `Ready` or `Disposed`.
//!
//! Producer-facing calls never fail; they report a `PaintOutcome`.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use composite::{CompositePainter, CompositeRequest};
use display_sink::{DisplayPublisher, DisplaySink, FrameRate, InvalidateKind, display_channel};
use frame_buffer::{FrameBuffer, FrameIngestError, FrameKind, PaintFrame, PixelRect, PopupState};
use texture_surface::{SurfaceDevice, SurfaceDeviceError, SurfaceSlot, SurfaceTexture};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSyncConfig {
    /// When false every render copies the whole frame.
    pub dirty_rect_support: bool,
    /// Frame rate the browser engine is asked to paint at.
    pub max_frame_rate: u32,
    pub initial_scale_factor: f64,
}

impl Default for SurfaceSyncConfig {
    fn default() -> Self {
        Self {
            dirty_rect_support: true,
            max_frame_rate: 30,
            initial_scale_factor: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceLifecycle {
    Uninitialized,
    Ready,
    /// Only ever set while the surface lock is held.
    Resizing,
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    EmptyDirtyRect,
    /// No main frame yet, or a notification without a buffer that changed
    /// nothing.
    NoPixels,
    PopupHidden,
    Unchanged,
    NothingTouched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceAllocError {
    DeviceLost,
    Allocate(SurfaceDeviceError),
    Upload(SurfaceDeviceError),
}

impl fmt::Display for SurfaceAllocError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceAllocError::DeviceLost => write!(formatter, "surface device is lost"),
            SurfaceAllocError::Allocate(error) => {
                write!(formatter, "surface texture allocation failed: {error}")
            }
            SurfaceAllocError::Upload(error) => write!(formatter, "surface upload failed: {error}"),
        }
    }
}

impl std::error::Error for SurfaceAllocError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SurfaceAllocError::DeviceLost => None,
            SurfaceAllocError::Allocate(error) | SurfaceAllocError::Upload(error) => Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintOutcome {
    Ignored(IgnoreReason),
    /// The surface was disposed; the notification was dropped.
    Disposed,
    Rendered {
        kind: InvalidateKind,
        region: PixelRect,
    },
    /// Rendering failed; the previous texture stays on screen and the next
    /// notification retries.
    Deferred(SurfaceAllocError),
    Rejected(FrameIngestError),
}

impl PaintOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, PaintOutcome::Rendered { .. })
    }
}

struct SurfaceState<D: SurfaceDevice> {
    lifecycle: SurfaceLifecycle,
    main: FrameBuffer,
    popup: PopupState,
    painter: CompositePainter,
    slot: SurfaceSlot<D>,
    scale_factor: f64,
}

pub struct SurfaceSync<D: SurfaceDevice> {
    state: Mutex<SurfaceState<D>>,
    publisher: DisplayPublisher<D::Target>,
    config: SurfaceSyncConfig,
}

impl<D: SurfaceDevice> SurfaceSync<D> {
    /// Creates the surface and the UI-side sink it publishes to.
    pub fn new(device: Arc<D>, config: SurfaceSyncConfig) -> (Self, DisplaySink<D::Target>) {
        let (publisher, sink) = display_channel(config.initial_scale_factor);
        let surface = Self {
            state: Mutex::new(SurfaceState {
                lifecycle: SurfaceLifecycle::Uninitialized,
                main: FrameBuffer::new(FrameKind::Main),
                popup: PopupState::new(),
                painter: CompositePainter::new(config.dirty_rect_support),
                slot: SurfaceSlot::new(device),
                scale_factor: config.initial_scale_factor,
            }),
            publisher,
            config,
        };
        (surface, sink)
    }

    pub fn config(&self) -> SurfaceSyncConfig {
        self.config
    }

    pub fn lifecycle(&self) -> SurfaceLifecycle {
        self.lock_state().lifecycle
    }

    pub fn is_disposed(&self) -> bool {
        self.lifecycle() == SurfaceLifecycle::Disposed
    }

    pub fn scale_factor(&self) -> f64 {
        self.lock_state().scale_factor
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.publisher.frame_rate()
    }

    /// Handle to the texture currently on display, if one exists.
    pub fn current_texture(&self) -> Option<Weak<SurfaceTexture<D::Target>>> {
        self.lock_state()
            .slot
            .surface()
            .map(|surface| surface.downgrade_target())
    }

    /// Ingests one paint notification and renders it before returning.
    pub fn on_paint(&self, paint: &PaintFrame<'_>) -> PaintOutcome {
        let mut state = self.lock_state();
        if state.lifecycle == SurfaceLifecycle::Disposed {
            return PaintOutcome::Disposed;
        }
        match paint.kind {
            FrameKind::Main => self.paint_main(&mut state, paint),
            FrameKind::Popup => self.paint_popup(&mut state, paint),
        }
    }

    pub fn on_popup_show(&self, visible: bool) -> PaintOutcome {
        let mut state = self.lock_state();
        if state.lifecycle == SurfaceLifecycle::Disposed {
            return PaintOutcome::Disposed;
        }
        if !state.popup.show(visible) {
            return PaintOutcome::Ignored(IgnoreReason::Unchanged);
        }
        tracing::debug!(visible, "popup visibility changed");
        let request = if visible {
            CompositeRequest::popup_changed()
        } else {
            CompositeRequest::popup_closed()
        };
        self.render(&mut state, request)
    }

    pub fn on_popup_bounds(&self, x: i32, y: i32, width: i32, height: i32) -> PaintOutcome {
        let mut state = self.lock_state();
        if state.lifecycle == SurfaceLifecycle::Disposed {
            return PaintOutcome::Disposed;
        }
        if !state.popup.set_bounds(x, y, width, height) {
            return PaintOutcome::Ignored(IgnoreReason::Unchanged);
        }
        tracing::trace!(x, y, width, height, "popup bounds changed");
        if !state.popup.is_visible() {
            return PaintOutcome::Ignored(IgnoreReason::PopupHidden);
        }
        self.render(&mut state, CompositeRequest::popup_changed())
    }

    /// Records the screen scale factor. Returns false for unusable values.
    pub fn on_screen_scale_changed(&self, scale_factor: f64) -> bool {
        if !scale_factor.is_finite() || scale_factor <= 0.0 {
            tracing::warn!(scale_factor, "ignoring invalid screen scale factor");
            return false;
        }
        let mut state = self.lock_state();
        if state.lifecycle == SurfaceLifecycle::Disposed || state.scale_factor == scale_factor {
            return false;
        }
        state.scale_factor = scale_factor;
        self.publisher.publish_scale_factor(scale_factor);
        tracing::debug!(scale_factor, "screen scale factor changed");
        true
    }

    /// Forces the next render to reallocate, e.g. after the display reported
    /// a lost rendering context.
    pub fn mark_device_lost(&self) {
        let mut state = self.lock_state();
        if state.lifecycle == SurfaceLifecycle::Disposed {
            return;
        }
        state.slot.mark_stale();
        tracing::warn!("surface marked for reinitialization after device loss");
    }

    /// Reallocates textures, optionally on a replacement device, and redraws
    /// them from the retained snapshot.
    pub fn recover_device(&self, device: Option<Arc<D>>) -> PaintOutcome {
        let mut state = self.lock_state();
        if state.lifecycle == SurfaceLifecycle::Disposed {
            return PaintOutcome::Disposed;
        }
        match device {
            Some(device) => state.slot.replace_device(device),
            None => state.slot.mark_stale(),
        }
        if !state.main.has_frame() {
            return PaintOutcome::Ignored(IgnoreReason::NoPixels);
        }
        tracing::debug!("recovering surface textures");
        self.reallocate(&mut state)
    }

    /// Releases both textures and every retained snapshot. Later calls are
    /// no-ops. Returns false when already disposed.
    pub fn dispose(&self) -> bool {
        let mut state = self.lock_state();
        if state.lifecycle == SurfaceLifecycle::Disposed {
            return false;
        }
        state.lifecycle = SurfaceLifecycle::Disposed;
        state.slot.release();
        state.main = FrameBuffer::new(FrameKind::Main);
        state.popup = PopupState::new();
        state.painter.reset();
        tracing::debug!("surface disposed");
        true
    }

    fn lock_state(&self) -> MutexGuard<'_, SurfaceState<D>> {
        self.state
            .lock()
            .unwrap_or_else(|_| panic!("surface state lock poisoned"))
    }

    fn paint_main(&self, state: &mut SurfaceState<D>, paint: &PaintFrame<'_>) -> PaintOutcome {
        let update = match state.main.ingest(paint) {
            Ok(Some(update)) => update,
            Ok(None) => return PaintOutcome::Ignored(IgnoreReason::EmptyDirtyRect),
            Err(error) => {
                tracing::warn!(%error, "main paint rejected");
                return PaintOutcome::Rejected(error);
            }
        };
        if update.resized {
            tracing::debug!(
                width = paint.width,
                height = paint.height,
                copied = update.copied,
                "main frame resized"
            );
        } else if !update.copied && !state.slot.is_stale() {
            return PaintOutcome::Ignored(IgnoreReason::NoPixels);
        }
        self.render(state, CompositeRequest::dirty(update.dirty_rect))
    }

    fn paint_popup(&self, state: &mut SurfaceState<D>, paint: &PaintFrame<'_>) -> PaintOutcome {
        if !state.popup.is_visible() {
            return PaintOutcome::Ignored(IgnoreReason::PopupHidden);
        }
        match state.popup.ingest(paint) {
            Ok(Some(_)) => {}
            Ok(None) => return PaintOutcome::Ignored(IgnoreReason::EmptyDirtyRect),
            Err(error) => {
                tracing::warn!(%error, "popup paint rejected");
                return PaintOutcome::Rejected(error);
            }
        }
        self.render(state, CompositeRequest::popup_changed())
    }

    /// Reallocates when the textures no longer fit the main frame, otherwise
    /// composites incrementally into the existing pair.
    fn render(&self, state: &mut SurfaceState<D>, request: CompositeRequest) -> PaintOutcome {
        if !state.main.has_frame() {
            return PaintOutcome::Ignored(IgnoreReason::NoPixels);
        }
        let layout = state.main.layout();
        let fits = !state.slot.is_stale()
            && state
                .slot
                .surface()
                .is_some_and(|surface| surface.layout() == layout);
        if !fits {
            return self.reallocate(state);
        }
        if state.slot.device().is_lost() {
            state.slot.mark_stale();
            tracing::warn!("device lost; render deferred");
            return PaintOutcome::Deferred(SurfaceAllocError::DeviceLost);
        }

        let SurfaceState {
            main,
            popup,
            painter,
            slot,
            ..
        } = state;
        let Some(surface) = slot.surface_mut() else {
            return PaintOutcome::Ignored(IgnoreReason::NothingTouched);
        };
        let outcome = {
            let mut staging = surface.lock_staging();
            painter.paint(&mut staging, layout, main, popup, request)
        };
        if outcome.is_empty() {
            return PaintOutcome::Ignored(IgnoreReason::NothingTouched);
        }
        if let Err(error) = surface.present(outcome.touched) {
            tracing::warn!(%error, "surface upload failed; keeping previous frame");
            slot.mark_stale();
            return PaintOutcome::Deferred(SurfaceAllocError::Upload(error));
        }
        self.publisher.publish(surface.target(), InvalidateKind::Reuse);
        PaintOutcome::Rendered {
            kind: InvalidateKind::Reuse,
            region: outcome.touched,
        }
    }

    /// Builds a new texture pair seeded with a full composite, swaps it in and
    /// publishes `Recreate`. On failure the previous pair stays on display.
    fn reallocate(&self, state: &mut SurfaceState<D>) -> PaintOutcome {
        if state.slot.device().is_lost() {
            state.slot.mark_stale();
            tracing::warn!("device lost; reallocation deferred");
            return PaintOutcome::Deferred(SurfaceAllocError::DeviceLost);
        }
        let previous_lifecycle = state.lifecycle;
        if previous_lifecycle == SurfaceLifecycle::Ready {
            state.lifecycle = SurfaceLifecycle::Resizing;
        }

        let layout = state.main.layout();
        let SurfaceState {
            main,
            popup,
            painter,
            slot,
            ..
        } = state;
        painter.reset();
        let result = slot.ensure_sized(layout, |staging| {
            painter.paint(staging, layout, main, popup, CompositeRequest::full());
        });

        match result {
            Ok(_) => {
                state.lifecycle = SurfaceLifecycle::Ready;
                let Some(surface) = state.slot.surface() else {
                    return PaintOutcome::Ignored(IgnoreReason::NothingTouched);
                };
                tracing::debug!(
                    texture_id = surface.id().raw(),
                    width = layout.width(),
                    height = layout.height(),
                    "surface textures recreated"
                );
                self.publisher.publish(surface.target(), InvalidateKind::Recreate);
                PaintOutcome::Rendered {
                    kind: InvalidateKind::Recreate,
                    region: layout.bounds(),
                }
            }
            Err(error) => {
                state.lifecycle = previous_lifecycle;
                state.slot.mark_stale();
                tracing::warn!(
                    %error,
                    width = layout.width(),
                    height = layout.height(),
                    "surface allocation failed; keeping previous textures"
                );
                PaintOutcome::Deferred(SurfaceAllocError::Allocate(error))
            }
        }
    }
}

#[cfg(test)]
mod tests;
