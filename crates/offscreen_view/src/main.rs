use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use display_sink::SinkUpdate;
use frame_buffer::{BYTES_PER_PIXEL, Bgra8, DirtyRect, FrameLayout, PaintFrame};
use offscreen_view::{OffscreenView, RenderHandler};
use surface_sync::{SurfaceSync, SurfaceSyncConfig};
use texture_surface::{HostSurfaceDevice, HostTexture, SurfaceDevice, WgpuSurfaceDevice, WgpuTarget};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Drive an off-screen surface with a synthetic paint producer")]
struct DemoArgs {
    /// Initial frame width in pixels.
    #[arg(long, default_value_t = 640)]
    width: u32,
    /// Initial frame height in pixels.
    #[arg(long, default_value_t = 360)]
    height: u32,
    /// Number of main frames to paint.
    #[arg(long, default_value_t = 120)]
    frames: u32,
    /// Paint rate of the producer.
    #[arg(long, default_value_t = 60)]
    fps: u32,
    #[arg(long, value_enum, default_value = "host")]
    device: DeviceKind,
    /// Copy every frame instead of dirty rects.
    #[arg(long)]
    full_frames: bool,
    /// Write the final displayed texture as PNG (host device only).
    #[arg(long)]
    dump_png: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum DeviceKind {
    Host,
    Wgpu,
}

/// CPU copy of a device texture, when the backend can provide one cheaply.
trait ReadBack {
    fn read_back(&self) -> Option<Vec<u8>>;
}

impl ReadBack for HostTexture {
    fn read_back(&self) -> Option<Vec<u8>> {
        Some(self.read_pixels())
    }
}

impl ReadBack for WgpuTarget {
    fn read_back(&self) -> Option<Vec<u8>> {
        None
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let arguments = DemoArgs::parse();
    if arguments.fps == 0 {
        return Err(anyhow::anyhow!("--fps must be positive"));
    }
    FrameLayout::new(arguments.width, arguments.height)
        .with_context(|| format!("invalid frame size {}x{}", arguments.width, arguments.height))?;

    let config = SurfaceSyncConfig {
        dirty_rect_support: !arguments.full_frames,
        max_frame_rate: arguments.fps,
        ..SurfaceSyncConfig::default()
    };
    match arguments.device {
        DeviceKind::Host => run(Arc::new(HostSurfaceDevice::new()), config, &arguments),
        DeviceKind::Wgpu => {
            let device = WgpuSurfaceDevice::request_headless().context("create wgpu device")?;
            run(Arc::new(device), config, &arguments)
        }
    }
}

fn run<D>(device: Arc<D>, config: SurfaceSyncConfig, arguments: &DemoArgs) -> Result<()>
where
    D: SurfaceDevice,
    D::Target: ReadBack,
{
    let mut view = OffscreenView::new(device, config);
    let stop = Arc::new(AtomicBool::new(false));
    let producer = spawn_producer(view.render_handler(), arguments, Arc::clone(&stop));

    let mut replaced = 0u32;
    let mut invalidated = 0u32;
    while !producer.is_finished() {
        match view.wait_for_display(Duration::from_millis(100)) {
            SinkUpdate::Replaced => replaced += 1,
            SinkUpdate::Invalidated => invalidated += 1,
            SinkUpdate::Idle | SinkUpdate::Stale => {}
        }
    }
    stop.store(true, Ordering::Release);
    let painted = producer
        .join()
        .map_err(|_| anyhow::anyhow!("producer thread panicked"))?;
    if view.pump_display() == SinkUpdate::Replaced {
        replaced += 1;
    }

    let frame_rate = view.surface().frame_rate();
    tracing::info!(
        painted,
        published = frame_rate.total,
        replaced,
        invalidated,
        fps = frame_rate.per_second,
        "demo finished"
    );

    if let Some(path) = &arguments.dump_png {
        dump_png(&view, path)?;
    }
    Ok(())
}

fn spawn_producer<D: SurfaceDevice>(
    handler: Arc<SurfaceSync<D>>,
    arguments: &DemoArgs,
    stop: Arc<AtomicBool>,
) -> JoinHandle<u32> {
    let frames = arguments.frames;
    let frame_interval = Duration::from_secs(1) / arguments.fps;
    let initial = (arguments.width, arguments.height);
    thread::spawn(move || {
        let mut painter = SyntheticPage::new(initial.0, initial.1);
        let mut painted = 0;
        for frame in 0..frames {
            if stop.load(Ordering::Acquire) {
                break;
            }
            if frame == frames / 2 {
                painter = SyntheticPage::new((initial.0 * 3 / 4).max(1), (initial.1 * 3 / 4).max(1));
            }
            if frame == frames / 3 {
                show_popup(&*handler, &painter);
            }
            if frame == frames * 2 / 3 {
                handler.on_popup_show(false);
            }

            let dirty_rect = painter.advance();
            let outcome = handler.on_paint(&PaintFrame::main(
                dirty_rect,
                painter.pixels(),
                painter.width,
                painter.height,
            ));
            tracing::trace!(frame, ?outcome, "main frame painted");
            painted += 1;
            thread::sleep(frame_interval);
        }
        painted
    })
}

fn show_popup(handler: &dyn RenderHandler, page: &SyntheticPage) {
    let width = (page.width / 4).max(1);
    let height = (page.height / 6).max(1);
    handler.on_popup_show(true);
    handler.on_popup_bounds(page.width as i32 / 8, page.height as i32 / 8, width as i32, height as i32);
    let pixels = Bgra8::opaque(250, 250, 210)
        .to_bytes()
        .repeat(width as usize * height as usize);
    let outcome = handler.on_paint(&PaintFrame::popup(
        DirtyRect::new(0, 0, width as i32, height as i32),
        &pixels,
        width,
        height,
    ));
    tracing::info!(?outcome, width, height, "popup shown");
}

/// A page with a vertical bar sweeping across a gradient.
struct SyntheticPage {
    width: u32,
    height: u32,
    bar_x: u32,
    pixels: Vec<u8>,
    first_frame: bool,
}

impl SyntheticPage {
    const BAR_WIDTH: u32 = 8;

    fn new(width: u32, height: u32) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * BYTES_PER_PIXEL);
        for y in 0..height {
            for x in 0..width {
                let background = Bgra8::opaque(
                    (x * 255 / width.max(1)) as u8,
                    (y * 255 / height.max(1)) as u8,
                    96,
                );
                pixels.extend_from_slice(&background.to_bytes());
            }
        }
        Self {
            width,
            height,
            bar_x: 0,
            pixels,
            first_frame: true,
        }
    }

    fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    fn fill_bar(&mut self, x: u32, pixel: Option<Bgra8>) {
        let stride = self.width as usize * BYTES_PER_PIXEL;
        for y in 0..self.height {
            for column in x..(x + Self::BAR_WIDTH).min(self.width) {
                let color = pixel.unwrap_or_else(|| {
                    Bgra8::opaque(
                        (column * 255 / self.width) as u8,
                        (y * 255 / self.height) as u8,
                        96,
                    )
                });
                let offset = y as usize * stride + column as usize * BYTES_PER_PIXEL;
                self.pixels[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&color.to_bytes());
            }
        }
    }

    /// Moves the bar and returns the rect that changed.
    fn advance(&mut self) -> DirtyRect {
        if self.first_frame {
            self.first_frame = false;
            self.fill_bar(self.bar_x, Some(Bgra8::opaque(255, 255, 255)));
            return DirtyRect::new(0, 0, self.width as i32, self.height as i32);
        }
        let previous = self.bar_x;
        self.fill_bar(previous, None);
        self.bar_x = (previous + Self::BAR_WIDTH / 2) % self.width;
        self.fill_bar(self.bar_x, Some(Bgra8::opaque(255, 255, 255)));

        let left = previous.min(self.bar_x);
        let right = (previous.max(self.bar_x) + Self::BAR_WIDTH).min(self.width);
        DirtyRect::new(left as i32, 0, (right - left) as i32, self.height as i32)
    }
}

fn dump_png<D>(view: &OffscreenView<D>, path: &Path) -> Result<()>
where
    D: SurfaceDevice,
    D::Target: ReadBack,
{
    let source = view
        .image_source()
        .context("no image source bound; nothing was displayed")?;
    let texture = source
        .texture()
        .context("displayed texture was already released")?;
    let Some(mut pixels) = texture.texture().read_back() else {
        tracing::warn!("PNG dump needs the host device; skipped");
        return Ok(());
    };
    for pixel in pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
        pixel.swap(0, 2);
    }
    let layout = texture.layout();
    let image = image::RgbaImage::from_raw(layout.width(), layout.height(), pixels)
        .context("texture size does not match its pixels")?;
    image
        .save(path)
        .with_context(|| format!("write {}", path.display()))?;
    tracing::info!(path = %path.display(), "final frame written");
    Ok(())
}
