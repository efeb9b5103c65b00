//! Frame buffer crate root.
//!
//! Owns the CPU-side view of what the browser engine painted: the retained
//! main-frame snapshot, the transient popup snapshot, and the geometry used
//! to address BGRA bytes inside them.
//!
//! The engine's buffer is only borrowed for the duration of a paint callback.
//! `FrameBuffer::ingest` copies what it needs before returning.

use std::fmt;

mod geometry;
mod popup;

pub use geometry::{DirtyRect, FrameLayout, PixelRect};
pub use popup::{PopupBounds, PopupOverlay, PopupState};

pub const BYTES_PER_PIXEL: usize = 4;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Bgra8 {
    pub b: u8,
    pub g: u8,
    pub r: u8,
    pub a: u8,
}

static_assertions::const_assert_eq!(std::mem::size_of::<Bgra8>(), BYTES_PER_PIXEL);

impl Bgra8 {
    pub const fn new(b: u8, g: u8, r: u8, a: u8) -> Self {
        Self { b, g, r, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(b, g, r, u8::MAX)
    }

    pub fn to_bytes(self) -> [u8; BYTES_PER_PIXEL] {
        bytemuck::cast(self)
    }

    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Main,
    Popup,
}

impl FrameKind {
    pub fn is_popup(self) -> bool {
        matches!(self, FrameKind::Popup)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLayoutError {
    ZeroSize,
    SizeOverflow,
}

impl fmt::Display for FrameLayoutError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameLayoutError::ZeroSize => write!(formatter, "frame width and height must be positive"),
            FrameLayoutError::SizeOverflow => write!(formatter, "frame byte size overflows usize"),
        }
    }
}

impl std::error::Error for FrameLayoutError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameIngestError {
    Layout(FrameLayoutError),
    BufferTooShort { expected: usize, actual: usize },
    KindMismatch { expected: FrameKind, actual: FrameKind },
}

impl From<FrameLayoutError> for FrameIngestError {
    fn from(value: FrameLayoutError) -> Self {
        Self::Layout(value)
    }
}

impl fmt::Display for FrameIngestError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameIngestError::Layout(error) => write!(formatter, "invalid frame layout: {error}"),
            FrameIngestError::BufferTooShort { expected, actual } => write!(
                formatter,
                "paint buffer holds {actual} bytes, frame needs {expected}"
            ),
            FrameIngestError::KindMismatch { expected, actual } => write!(
                formatter,
                "paint for {actual:?} stream delivered to {expected:?} frame buffer"
            ),
        }
    }
}

impl std::error::Error for FrameIngestError {}

/// One paint notification from the browser engine.
///
/// `buffer` is `None` when the engine handed over a null pointer.
#[derive(Debug, Clone, Copy)]
pub struct PaintFrame<'a> {
    pub kind: FrameKind,
    pub dirty_rect: DirtyRect,
    pub buffer: Option<&'a [u8]>,
    pub width: u32,
    pub height: u32,
}

impl<'a> PaintFrame<'a> {
    pub fn main(dirty_rect: DirtyRect, buffer: &'a [u8], width: u32, height: u32) -> Self {
        Self {
            kind: FrameKind::Main,
            dirty_rect,
            buffer: Some(buffer),
            width,
            height,
        }
    }

    pub fn popup(dirty_rect: DirtyRect, buffer: &'a [u8], width: u32, height: u32) -> Self {
        Self {
            kind: FrameKind::Popup,
            dirty_rect,
            buffer: Some(buffer),
            width,
            height,
        }
    }

    /// Builds a paint notification from the engine's raw callback arguments.
    ///
    /// Negative sizes become zero (and are later rejected by layout checks).
    /// A null `buffer` maps to `None`.
    ///
    /// # Safety
    ///
    /// When `buffer` is non-null it must point to at least
    /// `width * height * 4` readable bytes that stay valid and unmodified for
    /// `'a`, which must not outlive the engine's paint callback.
    pub unsafe fn from_raw_parts(
        kind: FrameKind,
        dirty_rect: DirtyRect,
        buffer: *const u8,
        width: i32,
        height: i32,
    ) -> Self {
        let width = width.max(0) as u32;
        let height = height.max(0) as u32;
        let byte_len = FrameLayout::new(width, height)
            .map(|layout| layout.byte_len())
            .ok();
        let buffer = match byte_len {
            Some(byte_len) if !buffer.is_null() => {
                // SAFETY: non-null and sized per the caller contract above.
                Some(unsafe { std::slice::from_raw_parts(buffer, byte_len) })
            }
            _ => None,
        };
        Self {
            kind,
            dirty_rect,
            buffer,
            width,
            height,
        }
    }
}

/// Result of a successful, non-ignored ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameUpdate {
    /// Region that changed in the retained snapshot (full bounds after a
    /// full snapshot).
    pub dirty_rect: PixelRect,
    pub resized: bool,
    /// False when the notification carried no buffer.
    pub copied: bool,
}

/// Retained snapshot of one paint stream.
#[derive(Debug)]
pub struct FrameBuffer {
    kind: FrameKind,
    layout: FrameLayout,
    dirty_rect: PixelRect,
    pixels: Vec<u8>,
    pixels_valid: bool,
}

impl FrameBuffer {
    pub fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            layout: FrameLayout::EMPTY,
            dirty_rect: PixelRect::default(),
            pixels: Vec::new(),
            pixels_valid: false,
        }
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn is_popup(&self) -> bool {
        self.kind.is_popup()
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    pub fn width(&self) -> u32 {
        self.layout.width()
    }

    pub fn height(&self) -> u32 {
        self.layout.height()
    }

    pub fn dirty_rect(&self) -> PixelRect {
        self.dirty_rect
    }

    pub fn has_frame(&self) -> bool {
        !self.layout.is_empty()
    }

    /// False until a notification with a buffer has been snapshotted at the
    /// current size.
    pub fn has_valid_pixels(&self) -> bool {
        self.pixels_valid
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Bgra8> {
        if !self.layout.bounds().contains_point(x, y) {
            return None;
        }
        let offset = self.layout.byte_offset(x, y);
        Some(bytemuck::pod_read_unaligned(
            &self.pixels[offset..offset + BYTES_PER_PIXEL],
        ))
    }

    /// Snapshots `paint` into this buffer.
    ///
    /// Returns `Ok(None)` for notifications that carry no usable dirty region.
    /// A size change reallocates the snapshot. Without a buffer the overlap
    /// with the previous content is kept, the rest is zero-filled, and the
    /// snapshot stays invalid until the next buffer is copied in full.
    pub fn ingest(&mut self, paint: &PaintFrame<'_>) -> Result<Option<FrameUpdate>, FrameIngestError> {
        if paint.kind != self.kind {
            return Err(FrameIngestError::KindMismatch {
                expected: self.kind,
                actual: paint.kind,
            });
        }
        let layout = FrameLayout::new(paint.width, paint.height)?;
        let Some(clamped_dirty) = paint.dirty_rect.clamp_to(layout) else {
            return Ok(None);
        };
        let buffer = paint.buffer.filter(|buffer| !buffer.is_empty());
        if let Some(buffer) = buffer
            && buffer.len() < layout.byte_len()
        {
            return Err(FrameIngestError::BufferTooShort {
                expected: layout.byte_len(),
                actual: buffer.len(),
            });
        }

        let resized = layout != self.layout;
        if resized {
            let previous = std::mem::replace(&mut self.pixels, vec![0; layout.byte_len()]);
            if self.pixels_valid && buffer.is_none() {
                carry_over(&previous, self.layout, &mut self.pixels, layout);
            }
            self.layout = layout;
            self.pixels_valid = false;
        }

        let mut dirty_rect = clamped_dirty;
        let copied = match buffer {
            Some(buffer) if self.pixels_valid => {
                copy_rows(buffer, &mut self.pixels, layout, clamped_dirty);
                true
            }
            Some(buffer) => {
                self.pixels.copy_from_slice(&buffer[..layout.byte_len()]);
                self.pixels_valid = true;
                dirty_rect = layout.bounds();
                true
            }
            None => {
                tracing::debug!(
                    kind = ?self.kind,
                    width = layout.width(),
                    height = layout.height(),
                    "paint without buffer; snapshot copy skipped"
                );
                false
            }
        };
        if resized {
            dirty_rect = layout.bounds();
        }
        self.dirty_rect = dirty_rect;

        Ok(Some(FrameUpdate {
            dirty_rect,
            resized,
            copied,
        }))
    }
}

/// Copies the top-left overlap of two layouts.
fn carry_over(source: &[u8], source_layout: FrameLayout, destination: &mut [u8], layout: FrameLayout) {
    let width = source_layout.width().min(layout.width());
    let height = source_layout.height().min(layout.height());
    let row_bytes = width as usize * BYTES_PER_PIXEL;
    for y in 0..height {
        let from = source_layout.byte_offset(0, y);
        let to = layout.byte_offset(0, y);
        destination[to..to + row_bytes].copy_from_slice(&source[from..from + row_bytes]);
    }
}

fn copy_rows(source: &[u8], destination: &mut [u8], layout: FrameLayout, rect: PixelRect) {
    if layout.spans_full_rows(rect) {
        let span = layout.flat_span(rect);
        destination[span.clone()].copy_from_slice(&source[span]);
        return;
    }
    for row in 0..rect.height {
        let span = layout.row_span(rect, row);
        destination[span.clone()].copy_from_slice(&source[span]);
    }
}

#[cfg(test)]
mod tests;
