use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};

use frame_buffer::{BYTES_PER_PIXEL, FrameLayout, PixelRect};

use crate::{SurfaceDevice, SurfaceDeviceError, TextureId};

/// Device texture plus the identity and size it was created with.
#[derive(Debug)]
pub struct SurfaceTexture<T> {
    id: TextureId,
    layout: FrameLayout,
    texture: T,
}

impl<T> SurfaceTexture<T> {
    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    pub fn texture(&self) -> &T {
        &self.texture
    }
}

pub struct TextureSurface<D: SurfaceDevice> {
    device: Arc<D>,
    layout: FrameLayout,
    staging: Vec<u8>,
    target: Arc<SurfaceTexture<D::Target>>,
}

impl<D: SurfaceDevice> TextureSurface<D> {
    /// Allocates a staging/target pair. Both sides share `layout`.
    pub fn allocate(device: Arc<D>, layout: FrameLayout, id: TextureId) -> Result<Self, SurfaceDeviceError> {
        if device.is_lost() {
            return Err(SurfaceDeviceError::DeviceLost);
        }
        let max = device.max_texture_dimension();
        if layout.width() > max || layout.height() > max {
            return Err(SurfaceDeviceError::SizeExceedsDeviceLimit {
                width: layout.width(),
                height: layout.height(),
                max,
            });
        }

        let mut staging = Vec::new();
        staging
            .try_reserve_exact(layout.byte_len())
            .map_err(|_| SurfaceDeviceError::OutOfMemory)?;
        staging.resize(layout.byte_len(), 0);
        let texture = device.create_target(layout)?;

        tracing::debug!(
            texture_id = id.raw(),
            width = layout.width(),
            height = layout.height(),
            "allocated surface textures"
        );
        Ok(Self {
            device,
            layout,
            staging,
            target: Arc::new(SurfaceTexture {
                id,
                layout,
                texture,
            }),
        })
    }

    pub fn id(&self) -> TextureId {
        self.target.id
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    pub fn target(&self) -> &Arc<SurfaceTexture<D::Target>> {
        &self.target
    }

    /// Non-owning handle for the display side. Stops upgrading once this
    /// surface is replaced or released.
    pub fn downgrade_target(&self) -> Weak<SurfaceTexture<D::Target>> {
        Arc::downgrade(&self.target)
    }

    pub fn staging(&self) -> &[u8] {
        &self.staging
    }

    /// Locks staging memory for writing. The lock ends when the guard drops;
    /// `present` cannot be called while it is held.
    pub fn lock_staging(&mut self) -> StagingWriteGuard<'_> {
        StagingWriteGuard {
            bytes: self.staging.as_mut_slice(),
            layout: self.layout,
            texture_id: self.target.id,
        }
    }

    /// Copies `region` from staging to the target texture.
    pub fn present(&self, region: PixelRect) -> Result<(), SurfaceDeviceError> {
        if region.is_empty() {
            return Ok(());
        }
        if !self.layout.bounds().contains_rect(&region) {
            return Err(SurfaceDeviceError::RegionOutOfBounds);
        }
        if self.staging.len() != self.layout.byte_len() {
            return Err(SurfaceDeviceError::StagingSizeMismatch);
        }
        self.device
            .upload_region(&self.target.texture, &self.staging, self.layout, region)
    }

    /// Copies `region` of `source` into staging at the same offset, then
    /// uploads it. `source_stride` is the byte length of one source row.
    pub fn upload(
        &mut self,
        region: PixelRect,
        source: &[u8],
        source_stride: usize,
    ) -> Result<(), SurfaceDeviceError> {
        {
            let mut staging = self.lock_staging();
            staging.copy_region_from(region, source, source_stride)?;
        }
        self.present(region)
    }
}

/// Scoped write access to staging memory.
pub struct StagingWriteGuard<'a> {
    bytes: &'a mut [u8],
    layout: FrameLayout,
    texture_id: TextureId,
}

impl StagingWriteGuard<'_> {
    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    pub fn texture_id(&self) -> TextureId {
        self.texture_id
    }

    /// Row-by-row copy of `region` from a source with its own stride.
    pub fn copy_region_from(
        &mut self,
        region: PixelRect,
        source: &[u8],
        source_stride: usize,
    ) -> Result<(), SurfaceDeviceError> {
        if region.is_empty() {
            return Ok(());
        }
        if !self.layout.bounds().contains_rect(&region) {
            return Err(SurfaceDeviceError::RegionOutOfBounds);
        }
        let row_bytes = region.width as usize * BYTES_PER_PIXEL;
        let source_x = region.x as usize * BYTES_PER_PIXEL;
        let needed = (region.bottom() as usize - 1) * source_stride + source_x + row_bytes;
        if source.len() < needed || source_stride < source_x + row_bytes {
            return Err(SurfaceDeviceError::SourceTooShort {
                expected: needed,
                actual: source.len(),
            });
        }
        for row in 0..region.height {
            let source_start = (region.y + row) as usize * source_stride + source_x;
            let span = self.layout.row_span(region, row);
            self.bytes[span].copy_from_slice(&source[source_start..source_start + row_bytes]);
        }
        Ok(())
    }
}

impl Deref for StagingWriteGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &*self.bytes
    }
}

impl DerefMut for StagingWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.bytes
    }
}

impl Drop for StagingWriteGuard<'_> {
    fn drop(&mut self) {
        tracing::trace!(texture_id = self.texture_id.raw(), "staging unlocked");
    }
}

/// Owns the current surface and replaces it when the size changes.
pub struct SurfaceSlot<D: SurfaceDevice> {
    device: Arc<D>,
    surface: Option<TextureSurface<D>>,
    stale: bool,
    next_texture_id: u64,
}

impl<D: SurfaceDevice> SurfaceSlot<D> {
    pub fn new(device: Arc<D>) -> Self {
        Self {
            device,
            surface: None,
            stale: false,
            next_texture_id: 1,
        }
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn surface(&self) -> Option<&TextureSurface<D>> {
        self.surface.as_ref()
    }

    pub fn surface_mut(&mut self) -> Option<&mut TextureSurface<D>> {
        self.surface.as_mut()
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Forces the next `ensure_sized` to reallocate. The current pair stays
    /// readable until then.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Switches devices. Textures from the old device are unusable, so the
    /// slot goes stale.
    pub fn replace_device(&mut self, device: Arc<D>) {
        self.device = device;
        self.stale = true;
    }

    /// Makes sure a pair of `layout` exists.
    ///
    /// When a new pair is needed, `seed` fills its staging memory and the
    /// whole surface is uploaded before the previous pair is released, so
    /// there is never a moment without a populated texture. Returns whether a
    /// new pair was created. On error the previous pair is kept.
    pub fn ensure_sized<F>(&mut self, layout: FrameLayout, seed: F) -> Result<bool, SurfaceDeviceError>
    where
        F: FnOnce(&mut StagingWriteGuard<'_>),
    {
        let reusable = !self.stale
            && self
                .surface
                .as_ref()
                .is_some_and(|surface| surface.layout() == layout);
        if reusable {
            return Ok(false);
        }

        let id = TextureId::new(self.next_texture_id);
        let mut replacement = TextureSurface::allocate(Arc::clone(&self.device), layout, id)?;
        self.next_texture_id += 1;
        {
            let mut staging = replacement.lock_staging();
            seed(&mut staging);
        }
        replacement.present(layout.bounds())?;

        let previous = self.surface.replace(replacement);
        self.stale = false;
        if let Some(previous) = previous {
            tracing::debug!(
                released_texture_id = previous.id().raw(),
                texture_id = id.raw(),
                "released previous surface textures"
            );
        }
        Ok(true)
    }

    pub fn release(&mut self) {
        if let Some(surface) = self.surface.take() {
            tracing::debug!(texture_id = surface.id().raw(), "surface textures released");
        }
    }
}
