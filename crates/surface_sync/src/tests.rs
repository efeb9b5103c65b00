use std::thread;

use display_sink::SinkUpdate;
use frame_buffer::{BYTES_PER_PIXEL, Bgra8, DirtyRect, FrameLayout};
use proptest::prelude::*;
use texture_surface::{HostSurfaceDevice, HostTexture};

use super::*;

const GREY: Bgra8 = Bgra8::opaque(128, 128, 128);
const BLACK: Bgra8 = Bgra8::opaque(0, 0, 0);
const WHITE: Bgra8 = Bgra8::opaque(255, 255, 255);
const RED: Bgra8 = Bgra8::opaque(255, 0, 0);

fn solid(width: u32, height: u32, pixel: Bgra8) -> Vec<u8> {
    pixel.to_bytes().repeat(width as usize * height as usize)
}

fn full_rect(width: u32, height: u32) -> DirtyRect {
    DirtyRect::new(0, 0, width as i32, height as i32)
}

fn new_surface(
    device: &Arc<HostSurfaceDevice>,
) -> (SurfaceSync<HostSurfaceDevice>, DisplaySink<HostTexture>) {
    SurfaceSync::new(Arc::clone(device), SurfaceSyncConfig::default())
}

fn paint_main(
    surface: &SurfaceSync<HostSurfaceDevice>,
    width: u32,
    height: u32,
    pixel: Bgra8,
) -> PaintOutcome {
    let bytes = solid(width, height, pixel);
    surface.on_paint(&PaintFrame::main(full_rect(width, height), &bytes, width, height))
}

fn target_pixel(surface: &SurfaceSync<HostSurfaceDevice>, x: u32, y: u32) -> Option<Bgra8> {
    let texture = surface.current_texture()?.upgrade()?;
    texture.texture().pixel(x, y)
}

#[test]
fn first_frame_allocates_and_publishes_recreate() {
    let device = Arc::new(HostSurfaceDevice::new());
    let (surface, mut sink) = new_surface(&device);
    assert_eq!(surface.lifecycle(), SurfaceLifecycle::Uninitialized);

    let outcome = paint_main(&surface, 4, 4, GREY);

    assert_eq!(
        outcome,
        PaintOutcome::Rendered {
            kind: InvalidateKind::Recreate,
            region: PixelRect::from_size(4, 4),
        }
    );
    assert_eq!(surface.lifecycle(), SurfaceLifecycle::Ready);
    assert_eq!(target_pixel(&surface, 3, 3), Some(GREY));
    assert_eq!(sink.pump(), SinkUpdate::Replaced);
    assert_eq!(surface.frame_rate().total, 1);
}

#[test]
fn dirty_rect_update_uploads_only_the_rect() {
    let device = Arc::new(HostSurfaceDevice::new());
    let (surface, mut sink) = new_surface(&device);
    paint_main(&surface, 4, 4, BLACK);
    sink.pump();
    let uploaded_before = device.uploaded_bytes();

    let white = solid(4, 4, WHITE);
    let outcome = surface.on_paint(&PaintFrame::main(DirtyRect::new(1, 1, 2, 2), &white, 4, 4));

    assert_eq!(
        outcome,
        PaintOutcome::Rendered {
            kind: InvalidateKind::Reuse,
            region: PixelRect::new(1, 1, 2, 2),
        }
    );
    assert_eq!(device.uploaded_bytes() - uploaded_before, 4 * BYTES_PER_PIXEL as u64);
    for y in 0..4 {
        for x in 0..4 {
            let inside = (1..3).contains(&x) && (1..3).contains(&y);
            let expected = if inside { WHITE } else { BLACK };
            assert_eq!(target_pixel(&surface, x, y), Some(expected), "pixel ({x},{y})");
        }
    }
    assert_eq!(sink.pump(), SinkUpdate::Invalidated);
}

#[test]
fn repeated_full_frame_is_idempotent() {
    let device = Arc::new(HostSurfaceDevice::new());
    let (surface, _sink) = new_surface(&device);
    paint_main(&surface, 5, 3, GREY);
    let texture = surface
        .current_texture()
        .and_then(|texture| texture.upgrade())
        .expect("texture");
    let first = texture.texture().read_pixels();

    paint_main(&surface, 5, 3, GREY);

    assert_eq!(texture.texture().read_pixels(), first);
    assert_eq!(device.allocation_count(), 1);
}

#[test]
fn resize_recreates_textures_and_releases_the_old_pair() {
    let device = Arc::new(HostSurfaceDevice::new());
    let (surface, mut sink) = new_surface(&device);
    paint_main(&surface, 4, 4, GREY);
    sink.pump();
    let previous = surface.current_texture().expect("texture");

    let outcome = paint_main(&surface, 8, 2, WHITE);

    assert_eq!(
        outcome,
        PaintOutcome::Rendered {
            kind: InvalidateKind::Recreate,
            region: PixelRect::from_size(8, 2),
        }
    );
    assert!(previous.upgrade().is_none());
    assert_eq!(target_pixel(&surface, 7, 1), Some(WHITE));
    assert_eq!(sink.pump(), SinkUpdate::Replaced);
    let source = sink.image_source().expect("source");
    assert_eq!(source.layout(), FrameLayout::new(8, 2).expect("layout"));
}

#[test]
fn degenerate_notifications_change_nothing() {
    let device = Arc::new(HostSurfaceDevice::new());
    let (surface, _sink) = new_surface(&device);
    paint_main(&surface, 4, 4, GREY);
    let bytes = solid(4, 4, WHITE);

    assert_eq!(
        surface.on_paint(&PaintFrame::main(DirtyRect::default(), &bytes, 4, 4)),
        PaintOutcome::Ignored(IgnoreReason::EmptyDirtyRect)
    );
    assert!(matches!(
        surface.on_paint(&PaintFrame::main(full_rect(4, 4), &bytes[..12], 4, 4)),
        PaintOutcome::Rejected(FrameIngestError::BufferTooShort { .. })
    ));
    assert_eq!(target_pixel(&surface, 0, 0), Some(GREY));
}

fn paint_without_buffer(surface: &SurfaceSync<HostSurfaceDevice>, width: u32, height: u32) -> PaintOutcome {
    surface.on_paint(&PaintFrame {
        kind: FrameKind::Main,
        dirty_rect: full_rect(width, height),
        buffer: None,
        width,
        height,
    })
}

#[test]
fn missing_buffer_still_resizes_textures() {
    let device = Arc::new(HostSurfaceDevice::new());
    let (surface, _sink) = new_surface(&device);
    paint_main(&surface, 4, 4, GREY);

    assert_eq!(
        paint_without_buffer(&surface, 6, 6),
        PaintOutcome::Rendered {
            kind: InvalidateKind::Recreate,
            region: PixelRect::from_size(6, 6),
        }
    );
    let texture = surface
        .current_texture()
        .and_then(|texture| texture.upgrade())
        .expect("texture");
    assert_eq!(texture.layout(), FrameLayout::new(6, 6).expect("layout"));
    assert_eq!(texture.texture().pixel(3, 3), Some(GREY));
    assert_eq!(texture.texture().pixel(5, 5), Some(Bgra8::default()));
    assert_eq!(device.allocation_count(), 2);

    assert_eq!(
        paint_without_buffer(&surface, 6, 6),
        PaintOutcome::Ignored(IgnoreReason::NoPixels)
    );

    let bytes = solid(6, 6, WHITE);
    let outcome = surface.on_paint(&PaintFrame::main(DirtyRect::new(0, 0, 1, 1), &bytes, 6, 6));
    assert_eq!(
        outcome,
        PaintOutcome::Rendered {
            kind: InvalidateKind::Reuse,
            region: PixelRect::from_size(6, 6),
        }
    );
    assert_eq!(target_pixel(&surface, 5, 5), Some(WHITE));
    assert_eq!(device.allocation_count(), 2);
}

#[test]
fn recovery_after_buffer_less_resize_uses_retained_overlap() {
    let device = Arc::new(HostSurfaceDevice::new());
    let (surface, _sink) = new_surface(&device);
    paint_main(&surface, 4, 4, GREY);
    paint_without_buffer(&surface, 2, 2);

    surface.mark_device_lost();
    assert!(matches!(
        surface.recover_device(None),
        PaintOutcome::Rendered {
            kind: InvalidateKind::Recreate,
            ..
        }
    ));
    assert_eq!(target_pixel(&surface, 1, 1), Some(GREY));
}

#[test]
fn popup_scenario_on_800_by_600_canvas() {
    let device = Arc::new(HostSurfaceDevice::new());
    let (surface, mut sink) = new_surface(&device);
    paint_main(&surface, 800, 600, GREY);
    sink.pump();

    assert_eq!(
        surface.on_popup_show(true),
        PaintOutcome::Ignored(IgnoreReason::NothingTouched)
    );
    surface.on_popup_bounds(50, 50, 100, 40);
    let popup = solid(100, 40, RED);
    let outcome = surface.on_paint(&PaintFrame::popup(full_rect(100, 40), &popup, 100, 40));

    assert_eq!(
        outcome,
        PaintOutcome::Rendered {
            kind: InvalidateKind::Reuse,
            region: PixelRect::new(50, 50, 100, 40),
        }
    );
    assert_eq!(target_pixel(&surface, 50, 50), Some(RED));
    assert_eq!(target_pixel(&surface, 149, 89), Some(RED));
    assert_eq!(target_pixel(&surface, 150, 90), Some(GREY));
    assert_eq!(target_pixel(&surface, 49, 49), Some(GREY));
    assert_eq!(sink.pump(), SinkUpdate::Invalidated);

    let outcome = surface.on_popup_show(false);

    assert_eq!(
        outcome,
        PaintOutcome::Rendered {
            kind: InvalidateKind::Reuse,
            region: PixelRect::from_size(800, 600),
        }
    );
    assert_eq!(target_pixel(&surface, 60, 60), Some(GREY));
    assert_eq!(target_pixel(&surface, 149, 89), Some(GREY));
}

#[test]
fn main_paint_under_visible_popup_keeps_popup_on_top() {
    let device = Arc::new(HostSurfaceDevice::new());
    let (surface, _sink) = new_surface(&device);
    paint_main(&surface, 16, 16, GREY);
    surface.on_popup_show(true);
    surface.on_popup_bounds(2, 2, 4, 4);
    let popup = solid(4, 4, RED);
    surface.on_paint(&PaintFrame::popup(full_rect(4, 4), &popup, 4, 4));

    let white = solid(16, 16, WHITE);
    let outcome = surface.on_paint(&PaintFrame::main(DirtyRect::new(0, 0, 8, 8), &white, 16, 16));

    assert_eq!(
        outcome,
        PaintOutcome::Rendered {
            kind: InvalidateKind::Reuse,
            region: PixelRect::new(0, 0, 8, 8),
        }
    );
    assert_eq!(target_pixel(&surface, 3, 3), Some(RED));
    assert_eq!(target_pixel(&surface, 7, 7), Some(WHITE));
    assert_eq!(target_pixel(&surface, 9, 9), Some(GREY));
}

#[test]
fn moving_a_popup_leaves_no_stale_pixels() {
    let device = Arc::new(HostSurfaceDevice::new());
    let (surface, _sink) = new_surface(&device);
    paint_main(&surface, 16, 16, GREY);
    surface.on_popup_show(true);
    surface.on_popup_bounds(0, 0, 4, 4);
    let popup = solid(4, 4, RED);
    surface.on_paint(&PaintFrame::popup(full_rect(4, 4), &popup, 4, 4));
    assert_eq!(target_pixel(&surface, 1, 1), Some(RED));

    let outcome = surface.on_popup_bounds(10, 10, 4, 4);

    assert_eq!(
        outcome,
        PaintOutcome::Rendered {
            kind: InvalidateKind::Reuse,
            region: PixelRect::new(0, 0, 14, 14),
        }
    );
    assert_eq!(target_pixel(&surface, 1, 1), Some(GREY));
    assert_eq!(target_pixel(&surface, 11, 11), Some(RED));
}

#[test]
fn failed_allocation_keeps_last_good_frame_and_retries() {
    let device = Arc::new(HostSurfaceDevice::new());
    let (surface, _sink) = new_surface(&device);
    paint_main(&surface, 4, 4, GREY);
    let previous = surface.current_texture().expect("texture");

    device.fail_next_allocations(1);
    let outcome = paint_main(&surface, 6, 6, WHITE);

    assert_eq!(
        outcome,
        PaintOutcome::Deferred(SurfaceAllocError::Allocate(SurfaceDeviceError::OutOfMemory))
    );
    assert_eq!(surface.lifecycle(), SurfaceLifecycle::Ready);
    assert!(previous.upgrade().is_some());
    assert_eq!(target_pixel(&surface, 0, 0), Some(GREY));

    let bytes = solid(6, 6, WHITE);
    let outcome = surface.on_paint(&PaintFrame::main(DirtyRect::new(0, 0, 1, 1), &bytes, 6, 6));

    assert_eq!(
        outcome,
        PaintOutcome::Rendered {
            kind: InvalidateKind::Recreate,
            region: PixelRect::from_size(6, 6),
        }
    );
    assert_eq!(target_pixel(&surface, 5, 5), Some(WHITE));
}

#[test]
fn lost_device_defers_until_recovered() {
    let device = Arc::new(HostSurfaceDevice::new());
    let (surface, mut sink) = new_surface(&device);
    paint_main(&surface, 4, 4, GREY);
    sink.pump();

    device.mark_lost();
    assert_eq!(
        paint_main(&surface, 4, 4, WHITE),
        PaintOutcome::Deferred(SurfaceAllocError::DeviceLost)
    );

    let replacement = Arc::new(HostSurfaceDevice::new());
    let outcome = surface.recover_device(Some(Arc::clone(&replacement)));

    assert_eq!(
        outcome,
        PaintOutcome::Rendered {
            kind: InvalidateKind::Recreate,
            region: PixelRect::from_size(4, 4),
        }
    );
    assert_eq!(replacement.allocation_count(), 1);
    assert_eq!(target_pixel(&surface, 2, 2), Some(WHITE));
    assert_eq!(sink.pump(), SinkUpdate::Replaced);
}

#[test]
fn dispose_releases_everything_and_drops_later_notifications() {
    let device = Arc::new(HostSurfaceDevice::new());
    let (surface, _sink) = new_surface(&device);
    paint_main(&surface, 4, 4, GREY);
    let texture = surface.current_texture().expect("texture");

    assert!(surface.dispose());

    assert!(!surface.dispose());
    assert!(surface.is_disposed());
    assert!(texture.upgrade().is_none());
    assert!(surface.current_texture().is_none());
    assert_eq!(paint_main(&surface, 4, 4, GREY), PaintOutcome::Disposed);
    assert_eq!(surface.on_popup_show(true), PaintOutcome::Disposed);
    assert_eq!(surface.recover_device(None), PaintOutcome::Disposed);
}

#[test]
fn scale_factor_is_validated_and_forwarded() {
    let device = Arc::new(HostSurfaceDevice::new());
    let (surface, mut sink) = new_surface(&device);

    assert!(!surface.on_screen_scale_changed(0.0));
    assert!(!surface.on_screen_scale_changed(f64::NAN));
    assert!(!surface.on_screen_scale_changed(1.0));
    assert!(surface.on_screen_scale_changed(2.0));

    sink.pump();
    assert_eq!(surface.scale_factor(), 2.0);
    assert_eq!(sink.scale_factor(), 2.0);
}

#[test]
fn unsupported_dirty_rects_upload_whole_frame() {
    let device = Arc::new(HostSurfaceDevice::new());
    let config = SurfaceSyncConfig {
        dirty_rect_support: false,
        ..SurfaceSyncConfig::default()
    };
    let (surface, _sink) = SurfaceSync::new(Arc::clone(&device), config);
    paint_main(&surface, 4, 4, GREY);

    let bytes = solid(4, 4, WHITE);
    let outcome = surface.on_paint(&PaintFrame::main(DirtyRect::new(1, 1, 1, 1), &bytes, 4, 4));

    assert_eq!(
        outcome,
        PaintOutcome::Rendered {
            kind: InvalidateKind::Reuse,
            region: PixelRect::from_size(4, 4),
        }
    );
}

const SIZES: [(u32, u32); 3] = [(4, 4), (7, 3), (2, 9)];

fn producer_ops() -> impl Strategy<Value = Vec<(usize, u8)>> {
    prop::collection::vec((0..SIZES.len(), 1u8..=255), 1..24)
}

fn assert_solid(pixels: &[u8]) -> Result<(), TestCaseError> {
    let Some(first) = pixels.chunks_exact(BYTES_PER_PIXEL).next() else {
        return Ok(());
    };
    prop_assert_eq!(first[3], u8::MAX, "uninitialized target observed");
    for chunk in pixels.chunks_exact(BYTES_PER_PIXEL) {
        prop_assert_eq!(chunk, first, "half-written target observed");
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn concurrent_paints_and_dispose_never_expose_partial_surfaces(
        first_ops in producer_ops(),
        second_ops in producer_ops(),
        dispose_at in prop::option::of(0usize..24),
    ) {
        let device = Arc::new(HostSurfaceDevice::new());
        let (surface, mut sink) = SurfaceSync::new(device, SurfaceSyncConfig::default());
        let surface = Arc::new(surface);
        let disposes = dispose_at.is_some_and(|index| index < first_ops.len());

        let producers: Vec<_> = [(first_ops, dispose_at), (second_ops, None)]
            .into_iter()
            .map(|(ops, dispose_at)| {
                let surface = Arc::clone(&surface);
                thread::spawn(move || {
                    for (index, (size, shade)) in ops.into_iter().enumerate() {
                        if dispose_at == Some(index) {
                            surface.dispose();
                        }
                        let (width, height) = SIZES[size];
                        paint_main(&surface, width, height, Bgra8::opaque(shade, shade, shade));
                    }
                })
            })
            .collect();

        let mut last_texture_id = 0;
        while producers.iter().any(|producer| !producer.is_finished()) {
            sink.pump();
            if let Some(source) = sink.image_source() {
                let texture_id = source.texture_id().raw();
                prop_assert!(texture_id >= last_texture_id, "older texture rebound");
                last_texture_id = texture_id;
                if let Some(texture) = source.texture() {
                    prop_assert_eq!(texture.id(), source.texture_id());
                    prop_assert_eq!(texture.layout(), source.layout());
                    let pixels = texture.texture().read_pixels();
                    prop_assert_eq!(pixels.len(), texture.layout().byte_len());
                    assert_solid(&pixels)?;
                }
            }
            thread::yield_now();
        }
        for producer in producers {
            producer.join().expect("producer thread");
        }

        let disposed = surface.is_disposed();
        prop_assert_eq!(disposed, disposes);
        if disposed {
            prop_assert!(surface.current_texture().is_none());
            prop_assert_eq!(paint_main(&surface, 4, 4, WHITE), PaintOutcome::Disposed);
        } else {
            prop_assert_eq!(surface.lifecycle(), SurfaceLifecycle::Ready);
        }
    }
}
