//! Row copies between tightly packed BGRA buffers.

use frame_buffer::{BYTES_PER_PIXEL, FrameLayout, PixelRect};

/// Copies `rect` from `source` to the same position in `destination`. Both
/// buffers share `layout`.
pub(crate) fn copy_in_place(source: &[u8], destination: &mut [u8], layout: FrameLayout, rect: PixelRect) {
    if rect.is_empty() {
        return;
    }
    debug_assert!(layout.bounds().contains_rect(&rect));
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

/// Copies `source_rect` of a buffer laid out per `source_layout` to
/// `(dest_x, dest_y)` of a buffer laid out per `dest_layout`.
pub(crate) fn copy_between(
    source: &[u8],
    source_layout: FrameLayout,
    source_rect: PixelRect,
    destination: &mut [u8],
    dest_layout: FrameLayout,
    dest_x: u32,
    dest_y: u32,
) {
    if source_rect.is_empty() {
        return;
    }
    debug_assert!(source_layout.bounds().contains_rect(&source_rect));
    debug_assert!(dest_layout.bounds().contains_rect(&PixelRect::new(
        dest_x,
        dest_y,
        source_rect.width,
        source_rect.height
    )));
    let row_bytes = source_rect.width as usize * BYTES_PER_PIXEL;
    for row in 0..source_rect.height {
        let source_start = source_layout.byte_offset(source_rect.x, source_rect.y + row);
        let dest_start = dest_layout.byte_offset(dest_x, dest_y + row);
        destination[dest_start..dest_start + row_bytes]
            .copy_from_slice(&source[source_start..source_start + row_bytes]);
    }
}
