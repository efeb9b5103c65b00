//! wgpu-backed surface device.
//!
//! Staging memory stays on the CPU side of `TextureSurface`; uploads go
//! through `Queue::write_texture` with the frame stride as `bytes_per_row`,
//! so sub-rectangles need no row padding.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use frame_buffer::{FrameLayout, PixelRect};

use crate::{SurfaceDevice, SurfaceDeviceError};

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;

#[derive(Debug)]
pub struct WgpuTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl WgpuTarget {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

#[derive(Debug)]
pub struct WgpuSurfaceDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    lost: Arc<AtomicBool>,
}

impl WgpuSurfaceDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let lost = Arc::new(AtomicBool::new(false));
        let lost_flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            tracing::warn!(?reason, %message, "wgpu device lost");
            lost_flag.store(true, Ordering::Release);
        });
        Self {
            device,
            queue,
            lost,
        }
    }

    /// Creates a device without a presentation surface.
    pub fn request_headless() -> Result<Self, SurfaceDeviceError> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .map_err(|_| SurfaceDeviceError::NoAdapter)?;
            let limits = adapter.limits();
            let (device, queue) = adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: Some("texture_surface.device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits,
                    experimental_features: wgpu::ExperimentalFeatures::disabled(),
                    memory_hints: wgpu::MemoryHints::Performance,
                    trace: wgpu::Trace::Off,
                })
                .await
                .map_err(|_| SurfaceDeviceError::NoAdapter)?;
            Ok(Self::new(device, queue))
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

impl SurfaceDevice for WgpuSurfaceDevice {
    type Target = WgpuTarget;

    fn create_target(&self, layout: FrameLayout) -> Result<WgpuTarget, SurfaceDeviceError> {
        if self.is_lost() {
            return Err(SurfaceDeviceError::DeviceLost);
        }
        let error_scope = self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("texture_surface.target"),
            size: wgpu::Extent3d {
                width: layout.width(),
                height: layout.height(),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        if pollster::block_on(error_scope.pop()).is_some() {
            return Err(SurfaceDeviceError::OutOfMemory);
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("texture_surface.target_view"),
            ..Default::default()
        });
        Ok(WgpuTarget { texture, view })
    }

    fn upload_region(
        &self,
        target: &WgpuTarget,
        staging: &[u8],
        layout: FrameLayout,
        region: PixelRect,
    ) -> Result<(), SurfaceDeviceError> {
        if self.is_lost() {
            return Err(SurfaceDeviceError::DeviceLost);
        }
        if staging.len() != layout.byte_len() {
            return Err(SurfaceDeviceError::StagingSizeMismatch);
        }
        if !layout.bounds().contains_rect(&region) {
            return Err(SurfaceDeviceError::RegionOutOfBounds);
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: region.x,
                    y: region.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            staging,
            wgpu::TexelCopyBufferLayout {
                offset: layout.byte_offset(region.x, region.y) as u64,
                bytes_per_row: Some(layout.stride() as u32),
                rows_per_image: Some(region.height),
            },
            wgpu::Extent3d {
                width: region.width,
                height: region.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }
}
