//! Texture surface crate root.
//!
//! A `TextureSurface` is the staging/target pair a frame is uploaded through:
//! the staging side is CPU-writable memory (the counterpart of a
//! system-memory staging texture), the target side is a device texture the
//! display samples. Devices are injected through `SurfaceDevice`; nothing in
//! this crate reaches for a global device.
//!
//! Modules:
//! - `surface`: the pair, the scoped staging lock, and `SurfaceSlot`, which
//!   owns reallocation.
//! - `host`: a device whose targets live in CPU memory.
//! - `wgpu_device`: the wgpu-backed device.

use std::fmt;

use frame_buffer::{FrameLayout, PixelRect};

mod host;
mod surface;
#[cfg(feature = "wgpu-backend")]
mod wgpu_device;

pub use host::{HostSurfaceDevice, HostTexture};
pub use surface::{StagingWriteGuard, SurfaceSlot, SurfaceTexture, TextureSurface};
#[cfg(feature = "wgpu-backend")]
pub use wgpu_device::{WgpuSurfaceDevice, WgpuTarget};

pub const DEFAULT_MAX_TEXTURE_DIMENSION: u32 = 16384;

/// Identity of one allocated staging/target pair. A new id means consumers
/// must rebind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

impl TextureId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Device handle a surface allocates and uploads through.
pub trait SurfaceDevice: Send + Sync + 'static {
    type Target: Send + Sync + 'static;

    fn create_target(&self, layout: FrameLayout) -> Result<Self::Target, SurfaceDeviceError>;

    /// Copies `region` of `staging` (laid out per `layout`) into the same
    /// region of `target`.
    fn upload_region(
        &self,
        target: &Self::Target,
        staging: &[u8],
        layout: FrameLayout,
        region: PixelRect,
    ) -> Result<(), SurfaceDeviceError>;

    fn max_texture_dimension(&self) -> u32;

    fn is_lost(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceDeviceError {
    DeviceLost,
    OutOfMemory,
    NoAdapter,
    SizeExceedsDeviceLimit { width: u32, height: u32, max: u32 },
    RegionOutOfBounds,
    StagingSizeMismatch,
    SourceTooShort { expected: usize, actual: usize },
}

impl fmt::Display for SurfaceDeviceError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceDeviceError::DeviceLost => write!(formatter, "graphics device lost"),
            SurfaceDeviceError::OutOfMemory => {
                write!(formatter, "out of memory allocating surface textures")
            }
            SurfaceDeviceError::NoAdapter => write!(formatter, "no compatible graphics adapter"),
            SurfaceDeviceError::SizeExceedsDeviceLimit { width, height, max } => write!(
                formatter,
                "surface size {width}x{height} exceeds device texture limit {max}"
            ),
            SurfaceDeviceError::RegionOutOfBounds => {
                write!(formatter, "upload region lies outside the surface")
            }
            SurfaceDeviceError::StagingSizeMismatch => {
                write!(formatter, "staging memory does not match surface layout")
            }
            SurfaceDeviceError::SourceTooShort { expected, actual } => write!(
                formatter,
                "upload source holds {actual} bytes, region needs {expected}"
            ),
        }
    }
}

impl std::error::Error for SurfaceDeviceError {}
