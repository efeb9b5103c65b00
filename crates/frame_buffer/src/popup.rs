//! Popup overlay state (`<select>` dropdowns, autofill lists).
//!
//! Only one popup exists at a time. Its frame is transient: hiding the popup
//! drops the snapshot so nothing stale can be composited later.

use crate::{DirtyRect, FrameBuffer, FrameIngestError, FrameKind, FrameLayout, FrameUpdate, PaintFrame, PixelRect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PopupBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Where a popup lands on the canvas once clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupOverlay {
    /// Region to read, in popup-frame coordinates.
    pub source_rect: PixelRect,
    /// Region to write, in canvas coordinates. Same size as `source_rect`.
    pub dest_rect: PixelRect,
}

#[derive(Debug)]
pub struct PopupState {
    visible: bool,
    bounds: Option<PopupBounds>,
    frame: Option<FrameBuffer>,
}

impl Default for PopupState {
    fn default() -> Self {
        Self::new()
    }
}

impl PopupState {
    pub fn new() -> Self {
        Self {
            visible: false,
            bounds: None,
            frame: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn bounds(&self) -> Option<PopupBounds> {
        self.bounds
    }

    pub fn frame(&self) -> Option<&FrameBuffer> {
        self.frame.as_ref()
    }

    /// Returns whether visibility changed.
    pub fn show(&mut self, visible: bool) -> bool {
        let changed = self.visible != visible;
        self.visible = visible;
        if !visible {
            self.frame = None;
        }
        changed
    }

    /// Negative sizes collapse to zero; returns whether the bounds changed.
    pub fn set_bounds(&mut self, x: i32, y: i32, width: i32, height: i32) -> bool {
        let bounds = PopupBounds {
            x,
            y,
            width: width.max(0) as u32,
            height: height.max(0) as u32,
        };
        let changed = self.bounds != Some(bounds);
        self.bounds = Some(bounds);
        changed
    }

    pub fn ingest(&mut self, paint: &PaintFrame<'_>) -> Result<Option<FrameUpdate>, FrameIngestError> {
        self.frame
            .get_or_insert_with(|| FrameBuffer::new(FrameKind::Popup))
            .ingest(paint)
    }

    /// Overlay placement, if the popup is composable onto `canvas` right now.
    ///
    /// Requires visibility, a frame with valid pixels, and a frame size equal
    /// to the recorded bounds. Off-canvas parts are clipped away.
    pub fn overlay_for(&self, canvas: FrameLayout) -> Option<PopupOverlay> {
        if !self.visible {
            return None;
        }
        let frame = self.frame.as_ref().filter(|frame| frame.has_valid_pixels())?;
        let bounds = self.bounds?;
        if frame.width() != bounds.width || frame.height() != bounds.height {
            tracing::trace!(
                frame_width = frame.width(),
                frame_height = frame.height(),
                bounds_width = bounds.width,
                bounds_height = bounds.height,
                "popup frame does not match recorded bounds"
            );
            return None;
        }
        let width = i32::try_from(bounds.width).ok()?;
        let height = i32::try_from(bounds.height).ok()?;
        let dest_rect = DirtyRect::new(bounds.x, bounds.y, width, height).clamp_to(canvas)?;
        let source_x = i64::from(dest_rect.x) - i64::from(bounds.x);
        let source_y = i64::from(dest_rect.y) - i64::from(bounds.y);
        Some(PopupOverlay {
            source_rect: PixelRect::new(
                source_x as u32,
                source_y as u32,
                dest_rect.width,
                dest_rect.height,
            ),
            dest_rect,
        })
    }
}
