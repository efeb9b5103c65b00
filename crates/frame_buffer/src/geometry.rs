//! Pixel-space geometry shared by ingestion, compositing and upload.
//!
//! `DirtyRect` is the signed rectangle reported by the browser engine;
//! `PixelRect` is the clamped, unsigned form every other stage works with.

use std::ops::Range;

use crate::{BYTES_PER_PIXEL, FrameLayoutError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirtyRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl DirtyRect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_all_zero(&self) -> bool {
        self.x == 0 && self.y == 0 && self.width == 0 && self.height == 0
    }

    /// Clamps the rect to the frame bounds. `None` when nothing is left.
    ///
    /// Rects that only partly overlap the frame are clamped rather than
    /// rejected; only zero-area or fully outside rects are dropped.
    pub fn clamp_to(&self, layout: FrameLayout) -> Option<PixelRect> {
        if self.is_all_zero() || self.width <= 0 || self.height <= 0 || layout.is_empty() {
            return None;
        }
        let min_x = i64::from(self.x).max(0);
        let min_y = i64::from(self.y).max(0);
        let max_x = (i64::from(self.x) + i64::from(self.width)).min(i64::from(layout.width()));
        let max_y = (i64::from(self.y) + i64::from(self.height)).min(i64::from(layout.height()));
        if min_x >= max_x || min_y >= max_y {
            return None;
        }
        Some(PixelRect::new(
            min_x as u32,
            min_y as u32,
            (max_x - min_x) as u32,
            (max_y - min_y) as u32,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn contains_point(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn contains_rect(&self, other: &PixelRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn intersect(&self, other: &PixelRect) -> Option<PixelRect> {
        let min_x = self.x.max(other.x);
        let min_y = self.y.max(other.y);
        let max_x = self.right().min(other.right());
        let max_y = self.bottom().min(other.bottom());
        if min_x >= max_x || min_y >= max_y {
            return None;
        }
        Some(PixelRect::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    /// Bounding box of both rects. Empty rects do not contribute.
    pub fn union(&self, other: &PixelRect) -> PixelRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let min_x = self.x.min(other.x);
        let min_y = self.y.min(other.y);
        let max_x = self.right().max(other.right());
        let max_y = self.bottom().max(other.bottom());
        PixelRect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }
}

/// Dimensions of a tightly packed BGRA frame (stride is `width * 4`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FrameLayout {
    width: u32,
    height: u32,
}

impl FrameLayout {
    pub const EMPTY: FrameLayout = FrameLayout {
        width: 0,
        height: 0,
    };

    pub fn new(width: u32, height: u32) -> Result<Self, FrameLayoutError> {
        if width == 0 || height == 0 {
            return Err(FrameLayoutError::ZeroSize);
        }
        (width as usize)
            .checked_mul(BYTES_PER_PIXEL)
            .and_then(|stride| stride.checked_mul(height as usize))
            .ok_or(FrameLayoutError::SizeOverflow)?;
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    pub fn byte_len(&self) -> usize {
        self.stride() * self.height as usize
    }

    pub fn bounds(&self) -> PixelRect {
        PixelRect::from_size(self.width, self.height)
    }

    pub fn byte_offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.stride() + x as usize * BYTES_PER_PIXEL
    }

    /// Byte range of one row of `rect`, `row` counted from the top of the rect.
    pub fn row_span(&self, rect: PixelRect, row: u32) -> Range<usize> {
        debug_assert!(row < rect.height, "row {row} outside rect height {}", rect.height);
        let start = self.byte_offset(rect.x, rect.y + row);
        start..start + rect.width as usize * BYTES_PER_PIXEL
    }

    /// Single flat range starting at the rect origin: `height - 1` full-stride
    /// rows plus one partial row. Only byte-accurate as a copy range when the
    /// rect spans the full width and both sides share this stride.
    pub fn flat_span(&self, rect: PixelRect) -> Range<usize> {
        if rect.is_empty() {
            let start = self.byte_offset(rect.x, rect.y);
            return start..start;
        }
        let start = self.byte_offset(rect.x, rect.y);
        let length = (rect.height as usize - 1) * self.stride() + rect.width as usize * BYTES_PER_PIXEL;
        start..start + length
    }

    /// True when `rect` rows are contiguous in memory for this layout.
    pub fn spans_full_rows(&self, rect: PixelRect) -> bool {
        rect.x == 0 && rect.width == self.width
    }
}
