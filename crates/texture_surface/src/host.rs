//! CPU-resident surface device.
//!
//! Render targets are plain byte vectors. Used as the software fallback when
//! no GPU is available and as the device in tests, where allocation failures
//! and device loss can be injected.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use frame_buffer::{BYTES_PER_PIXEL, Bgra8, FrameLayout, PixelRect};

use crate::{DEFAULT_MAX_TEXTURE_DIMENSION, SurfaceDevice, SurfaceDeviceError};

#[derive(Debug)]
pub struct HostTexture {
    layout: FrameLayout,
    pixels: Mutex<Vec<u8>>,
}

impl HostTexture {
    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    pub fn read_pixels(&self) -> Vec<u8> {
        self.pixels
            .lock()
            .unwrap_or_else(|_| panic!("host texture lock poisoned"))
            .clone()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Bgra8> {
        if !self.layout.bounds().contains_point(x, y) {
            return None;
        }
        let offset = self.layout.byte_offset(x, y);
        let pixels = self
            .pixels
            .lock()
            .unwrap_or_else(|_| panic!("host texture lock poisoned"));
        Some(bytemuck::pod_read_unaligned(
            &pixels[offset..offset + BYTES_PER_PIXEL],
        ))
    }
}

#[derive(Debug)]
pub struct HostSurfaceDevice {
    max_dimension: u32,
    lost: AtomicBool,
    pending_allocation_failures: AtomicU32,
    allocations: AtomicU64,
    uploads: AtomicU64,
    uploaded_bytes: AtomicU64,
}

impl Default for HostSurfaceDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSurfaceDevice {
    pub fn new() -> Self {
        Self::with_max_dimension(DEFAULT_MAX_TEXTURE_DIMENSION)
    }

    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension,
            lost: AtomicBool::new(false),
            pending_allocation_failures: AtomicU32::new(0),
            allocations: AtomicU64::new(0),
            uploads: AtomicU64::new(0),
            uploaded_bytes: AtomicU64::new(0),
        }
    }

    /// The next `count` target allocations fail with `OutOfMemory`.
    pub fn fail_next_allocations(&self, count: u32) {
        self.pending_allocation_failures
            .store(count, Ordering::Release);
    }

    pub fn mark_lost(&self) {
        self.lost.store(true, Ordering::Release);
    }

    pub fn mark_restored(&self) {
        self.lost.store(false, Ordering::Release);
    }

    pub fn allocation_count(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }

    pub fn upload_count(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.uploaded_bytes.load(Ordering::Relaxed)
    }

    fn take_injected_failure(&self) -> bool {
        self.pending_allocation_failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

impl SurfaceDevice for HostSurfaceDevice {
    type Target = HostTexture;

    fn create_target(&self, layout: FrameLayout) -> Result<HostTexture, SurfaceDeviceError> {
        if self.is_lost() {
            return Err(SurfaceDeviceError::DeviceLost);
        }
        if self.take_injected_failure() {
            return Err(SurfaceDeviceError::OutOfMemory);
        }
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(layout.byte_len())
            .map_err(|_| SurfaceDeviceError::OutOfMemory)?;
        pixels.resize(layout.byte_len(), 0);
        self.allocations.fetch_add(1, Ordering::Relaxed);
        Ok(HostTexture {
            layout,
            pixels: Mutex::new(pixels),
        })
    }

    fn upload_region(
        &self,
        target: &HostTexture,
        staging: &[u8],
        layout: FrameLayout,
        region: PixelRect,
    ) -> Result<(), SurfaceDeviceError> {
        if self.is_lost() {
            return Err(SurfaceDeviceError::DeviceLost);
        }
        if target.layout != layout || staging.len() != layout.byte_len() {
            return Err(SurfaceDeviceError::StagingSizeMismatch);
        }
        if !layout.bounds().contains_rect(&region) {
            return Err(SurfaceDeviceError::RegionOutOfBounds);
        }
        let mut pixels = target
            .pixels
            .lock()
            .unwrap_or_else(|_| panic!("host texture lock poisoned"));
        if layout.spans_full_rows(region) {
            let span = layout.flat_span(region);
            pixels[span.clone()].copy_from_slice(&staging[span]);
        } else {
            for row in 0..region.height {
                let span = layout.row_span(region, row);
                pixels[span.clone()].copy_from_slice(&staging[span]);
            }
        }
        self.uploads.fetch_add(1, Ordering::Relaxed);
        self.uploaded_bytes.fetch_add(
            region.area() * BYTES_PER_PIXEL as u64,
            Ordering::Relaxed,
        );
        Ok(())
    }

    fn max_texture_dimension(&self) -> u32 {
        self.max_dimension
    }

    fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }
}
