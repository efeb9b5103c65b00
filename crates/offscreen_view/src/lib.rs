//! Off-screen view.
//!
//! Composition root for one embedded browser surface. `OffscreenView` owns
//! the UI-side display sink; the engine thread talks to the `SurfaceSync`
//! handed out by `render_handler` through the `RenderHandler` capability.
//! Dropping the view disposes the surface.

use std::sync::Arc;
use std::time::Duration;

use display_sink::{DisplaySink, ImageSource, SinkUpdate};
use frame_buffer::PaintFrame;
use surface_sync::{PaintOutcome, SurfaceSync, SurfaceSyncConfig};
use texture_surface::SurfaceDevice;

mod input;

pub use input::{
    BrowserInput, DevicePoint, InputAdapter, InputModifiers, KeyEvent, KeyEventKind, LogicalPoint,
    MouseButton, TouchPhase, UiInputEvent,
};

/// Rendering callbacks the browser engine invokes from its own thread.
pub trait RenderHandler {
    fn on_paint(&self, paint: &PaintFrame<'_>) -> PaintOutcome;

    fn on_popup_show(&self, visible: bool) -> PaintOutcome;

    fn on_popup_bounds(&self, x: i32, y: i32, width: i32, height: i32) -> PaintOutcome;

    fn on_screen_scale_changed(&self, scale_factor: f64) -> bool;
}

impl<D: SurfaceDevice> RenderHandler for SurfaceSync<D> {
    fn on_paint(&self, paint: &PaintFrame<'_>) -> PaintOutcome {
        SurfaceSync::on_paint(self, paint)
    }

    fn on_popup_show(&self, visible: bool) -> PaintOutcome {
        SurfaceSync::on_popup_show(self, visible)
    }

    fn on_popup_bounds(&self, x: i32, y: i32, width: i32, height: i32) -> PaintOutcome {
        SurfaceSync::on_popup_bounds(self, x, y, width, height)
    }

    fn on_screen_scale_changed(&self, scale_factor: f64) -> bool {
        SurfaceSync::on_screen_scale_changed(self, scale_factor)
    }
}

pub struct OffscreenView<D: SurfaceDevice> {
    surface: Arc<SurfaceSync<D>>,
    sink: DisplaySink<D::Target>,
}

impl<D: SurfaceDevice> OffscreenView<D> {
    pub fn new(device: Arc<D>, config: SurfaceSyncConfig) -> Self {
        let (surface, mut sink) = SurfaceSync::new(device, config);
        let surface = Arc::new(surface);
        let recovering = Arc::downgrade(&surface);
        sink.on_context_restored(move || {
            if let Some(surface) = recovering.upgrade() {
                let outcome = surface.recover_device(None);
                tracing::debug!(?outcome, "surface recovery after context restore");
            }
        });
        Self { surface, sink }
    }

    /// Handle for the engine thread.
    pub fn render_handler(&self) -> Arc<SurfaceSync<D>> {
        Arc::clone(&self.surface)
    }

    pub fn surface(&self) -> &SurfaceSync<D> {
        &self.surface
    }

    pub fn sink_mut(&mut self) -> &mut DisplaySink<D::Target> {
        &mut self.sink
    }

    pub fn image_source(&self) -> Option<&ImageSource<D::Target>> {
        self.sink.image_source()
    }

    /// Applies the newest published frame to the image source.
    pub fn pump_display(&mut self) -> SinkUpdate {
        self.sink.pump()
    }

    pub fn wait_for_display(&mut self, timeout: Duration) -> SinkUpdate {
        self.sink.wait_and_pump(timeout)
    }

    pub fn frames_per_second(&self) -> u32 {
        self.sink.frames_per_second()
    }

    pub fn handle_context_lost(&mut self) {
        self.surface.mark_device_lost();
        self.sink.handle_context_lost();
    }

    pub fn handle_context_restored(&mut self) -> SinkUpdate {
        self.sink.handle_context_restored()
    }

    /// Input adapter that maps with whatever scale factor the display has
    /// applied at the time of each event.
    pub fn input_adapter<B: BrowserInput>(&self, browser: B) -> InputAdapter<B> {
        InputAdapter::with_scale_factor(browser, self.sink.scale_factor_handle())
    }

    pub fn dispose(&self) -> bool {
        self.surface.dispose()
    }
}

impl<D: SurfaceDevice> RenderHandler for OffscreenView<D> {
    fn on_paint(&self, paint: &PaintFrame<'_>) -> PaintOutcome {
        self.surface.on_paint(paint)
    }

    fn on_popup_show(&self, visible: bool) -> PaintOutcome {
        self.surface.on_popup_show(visible)
    }

    fn on_popup_bounds(&self, x: i32, y: i32, width: i32, height: i32) -> PaintOutcome {
        self.surface.on_popup_bounds(x, y, width, height)
    }

    fn on_screen_scale_changed(&self, scale_factor: f64) -> bool {
        self.surface.on_screen_scale_changed(scale_factor)
    }
}

impl<D: SurfaceDevice> Drop for OffscreenView<D> {
    fn drop(&mut self) {
        self.surface.dispose();
    }
}
