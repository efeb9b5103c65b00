use super::*;

fn solid_frame(width: u32, height: u32, pixel: Bgra8) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(width as usize * height as usize * BYTES_PER_PIXEL);
    for _ in 0..width * height {
        bytes.extend_from_slice(&pixel.to_bytes());
    }
    bytes
}

fn layout(width: u32, height: u32) -> FrameLayout {
    FrameLayout::new(width, height).expect("valid layout")
}

#[test]
fn all_zero_dirty_rect_is_ignored() {
    let mut frame = FrameBuffer::new(FrameKind::Main);
    let bytes = solid_frame(4, 4, Bgra8::opaque(1, 2, 3));

    let update = frame
        .ingest(&PaintFrame::main(DirtyRect::default(), &bytes, 4, 4))
        .expect("ingest");

    assert_eq!(update, None);
    assert!(!frame.has_frame());
}

#[test]
fn dirty_rect_is_clamped_to_frame_bounds() {
    let clamped = DirtyRect::new(-2, 3, 10, 10).clamp_to(layout(8, 6));
    assert_eq!(clamped, Some(PixelRect::new(0, 3, 8, 3)));

    assert_eq!(DirtyRect::new(9, 0, 4, 4).clamp_to(layout(8, 6)), None);
    assert_eq!(DirtyRect::new(0, 0, -4, 4).clamp_to(layout(8, 6)), None);
}

#[test]
fn flat_span_matches_partial_last_row_formula() {
    let layout = layout(10, 10);
    let rect = PixelRect::new(2, 3, 4, 5);
    let span = layout.flat_span(rect);

    assert_eq!(span.start, 3 * 10 * 4 + 2 * 4);
    assert_eq!(span.len(), 4 * 10 * 4 + 4 * 4);
    assert!(!layout.spans_full_rows(rect));
    assert!(layout.spans_full_rows(PixelRect::new(0, 3, 10, 2)));
}

#[test]
fn first_frame_snapshots_everything_and_reports_full_dirty_rect() {
    let mut frame = FrameBuffer::new(FrameKind::Main);
    let bytes = solid_frame(4, 4, Bgra8::opaque(9, 8, 7));

    let update = frame
        .ingest(&PaintFrame::main(DirtyRect::new(1, 1, 1, 1), &bytes, 4, 4))
        .expect("ingest")
        .expect("update");

    assert!(update.resized);
    assert!(update.copied);
    assert_eq!(update.dirty_rect, PixelRect::from_size(4, 4));
    assert_eq!(frame.pixels(), bytes.as_slice());
    assert_eq!(frame.pixel(3, 3), Some(Bgra8::opaque(9, 8, 7)));
}

#[test]
fn later_frames_only_snapshot_the_dirty_rows() {
    let mut frame = FrameBuffer::new(FrameKind::Main);
    let black = solid_frame(4, 4, Bgra8::opaque(0, 0, 0));
    let white = solid_frame(4, 4, Bgra8::opaque(255, 255, 255));
    frame
        .ingest(&PaintFrame::main(DirtyRect::new(0, 0, 4, 4), &black, 4, 4))
        .expect("first ingest");

    let update = frame
        .ingest(&PaintFrame::main(DirtyRect::new(1, 1, 2, 2), &white, 4, 4))
        .expect("second ingest")
        .expect("update");

    assert!(!update.resized);
    assert_eq!(update.dirty_rect, PixelRect::new(1, 1, 2, 2));
    for y in 0..4 {
        for x in 0..4 {
            let inside = (1..3).contains(&x) && (1..3).contains(&y);
            let expected = if inside {
                Bgra8::opaque(255, 255, 255)
            } else {
                Bgra8::opaque(0, 0, 0)
            };
            assert_eq!(frame.pixel(x, y), Some(expected), "pixel ({x},{y})");
        }
    }
}

#[test]
fn missing_buffer_still_applies_resize() {
    let mut frame = FrameBuffer::new(FrameKind::Main);
    let bytes = solid_frame(4, 4, Bgra8::opaque(1, 1, 1));
    frame
        .ingest(&PaintFrame::main(DirtyRect::new(0, 0, 4, 4), &bytes, 4, 4))
        .expect("first ingest");

    let update = frame
        .ingest(&PaintFrame {
            kind: FrameKind::Main,
            dirty_rect: DirtyRect::new(0, 0, 6, 2),
            buffer: None,
            width: 6,
            height: 2,
        })
        .expect("ingest")
        .expect("update");

    assert!(update.resized);
    assert!(!update.copied);
    assert_eq!(frame.layout(), layout(6, 2));
    assert_eq!(frame.pixels().len(), 6 * 2 * BYTES_PER_PIXEL);
    assert_eq!(frame.pixel(3, 1), Some(Bgra8::opaque(1, 1, 1)));
    assert_eq!(frame.pixel(5, 0), Some(Bgra8::default()));
    assert!(!frame.has_valid_pixels());
}

#[test]
fn short_buffer_is_rejected_without_state_change() {
    let mut frame = FrameBuffer::new(FrameKind::Main);
    let bytes = vec![0u8; 10];

    let error = frame
        .ingest(&PaintFrame::main(DirtyRect::new(0, 0, 4, 4), &bytes, 4, 4))
        .expect_err("short buffer");

    assert_eq!(
        error,
        FrameIngestError::BufferTooShort {
            expected: 64,
            actual: 10
        }
    );
    assert!(!frame.has_frame());
}

#[test]
fn popup_paint_into_main_buffer_is_a_kind_mismatch() {
    let mut frame = FrameBuffer::new(FrameKind::Main);
    let bytes = solid_frame(2, 2, Bgra8::default());

    let error = frame
        .ingest(&PaintFrame::popup(DirtyRect::new(0, 0, 2, 2), &bytes, 2, 2))
        .expect_err("kind mismatch");

    assert!(matches!(error, FrameIngestError::KindMismatch { .. }));
}

#[test]
fn raw_parts_maps_null_to_missing_buffer() {
    // SAFETY: null pointers are never dereferenced.
    let paint = unsafe {
        PaintFrame::from_raw_parts(
            FrameKind::Main,
            DirtyRect::new(0, 0, 2, 2),
            std::ptr::null(),
            2,
            2,
        )
    };
    assert!(paint.buffer.is_none());

    let bytes = solid_frame(2, 2, Bgra8::opaque(4, 5, 6));
    // SAFETY: `bytes` holds exactly 2 * 2 * 4 bytes and outlives `paint`.
    let paint = unsafe {
        PaintFrame::from_raw_parts(
            FrameKind::Main,
            DirtyRect::new(0, 0, 2, 2),
            bytes.as_ptr(),
            2,
            2,
        )
    };
    assert_eq!(paint.buffer.map(<[u8]>::len), Some(16));
}

#[test]
fn popup_overlay_requires_visible_matching_frame() {
    let mut popup = PopupState::new();
    let bytes = solid_frame(3, 2, Bgra8::opaque(0, 0, 255));
    popup
        .ingest(&PaintFrame::popup(DirtyRect::new(0, 0, 3, 2), &bytes, 3, 2))
        .expect("popup ingest");
    popup.set_bounds(1, 1, 3, 2);
    assert_eq!(popup.overlay_for(layout(8, 8)), None, "hidden popup");

    popup.show(true);
    popup
        .ingest(&PaintFrame::popup(DirtyRect::new(0, 0, 3, 2), &bytes, 3, 2))
        .expect("popup ingest");
    assert_eq!(
        popup.overlay_for(layout(8, 8)),
        Some(PopupOverlay {
            source_rect: PixelRect::new(0, 0, 3, 2),
            dest_rect: PixelRect::new(1, 1, 3, 2),
        })
    );

    popup.set_bounds(1, 1, 4, 2);
    assert_eq!(popup.overlay_for(layout(8, 8)), None, "size mismatch");
}

#[test]
fn popup_overlay_is_clipped_to_canvas() {
    let mut popup = PopupState::new();
    popup.show(true);
    popup.set_bounds(-1, 6, 4, 4);
    let bytes = solid_frame(4, 4, Bgra8::opaque(0, 255, 0));
    popup
        .ingest(&PaintFrame::popup(DirtyRect::new(0, 0, 4, 4), &bytes, 4, 4))
        .expect("popup ingest");

    let overlay = popup.overlay_for(layout(8, 8)).expect("overlay");

    assert_eq!(overlay.dest_rect, PixelRect::new(0, 6, 3, 2));
    assert_eq!(overlay.source_rect, PixelRect::new(1, 0, 3, 2));
}

#[test]
fn hiding_popup_drops_its_frame() {
    let mut popup = PopupState::new();
    popup.show(true);
    let bytes = solid_frame(2, 2, Bgra8::default());
    popup
        .ingest(&PaintFrame::popup(DirtyRect::new(0, 0, 2, 2), &bytes, 2, 2))
        .expect("popup ingest");
    assert!(popup.frame().is_some());

    assert!(popup.show(false));
    assert!(popup.frame().is_none());
    assert!(!popup.show(false));
}

#[test]
fn rect_union_and_intersection() {
    let a = PixelRect::new(0, 0, 4, 4);
    let b = PixelRect::new(2, 2, 4, 4);

    assert_eq!(a.union(&b), PixelRect::new(0, 0, 6, 6));
    assert_eq!(a.intersect(&b), Some(PixelRect::new(2, 2, 2, 2)));
    assert_eq!(a.union(&PixelRect::default()), a);
    assert_eq!(a.intersect(&PixelRect::new(4, 0, 1, 1)), None);
    assert!(PixelRect::new(0, 0, 6, 6).contains_rect(&b));
}
