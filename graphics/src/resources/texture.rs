//! GPU texture resource.
//!
//! The logical [`Texture`] holds pixel payloads per mip level (and per cube
//! face), the sampler configuration with its dirty-parameter bitmask, and
//! the platform impl that owns the native object. Uploads are incremental:
//! only levels with pending changes reach the driver, and sampler
//! parameters are re-sent only for bits that changed.

use bitflags::bitflags;
use parking_lot::{Mutex, MutexGuard};

use vermilion_core::sampler::{AddressMode, CompareFunction, CpuSampler, FilterMode};
use vermilion_core::texture::{CpuImage, TextureDimension};

use crate::backend::consts as gl;
use crate::backend::{Extensions, GlBackend, RawCapabilities, TextureId};
use crate::device::{UnpackCache, VramStats};
use crate::error::GraphicsError;
use crate::resources::PlatformResource;
use crate::types::{PixelFormat, TextureDescriptor};

bitflags! {
    /// Dirty bits for sampler parameters. Each bit is set when the logical
    /// value changes and cleared only after the native call is issued.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TextureParamDirty: u8 {
        const MIN_FILTER = 1 << 0;
        const MAG_FILTER = 1 << 1;
        const ADDRESS_U = 1 << 2;
        const ADDRESS_V = 1 << 3;
        const ADDRESS_W = 1 << 4;
        const COMPARE_MODE = 1 << 5;
        const COMPARE_FUNC = 1 << 6;
        const ANISOTROPY = 1 << 7;
    }
}

/// Pixel payload for one mip level (or one cube face of one level).
#[derive(Debug, Clone)]
pub enum TextureSource {
    /// Decoded image that knows its own dimensions and can be downscaled
    /// when it exceeds device limits.
    Image(CpuImage),
    /// Raw bytes sized by the format's block arithmetic for the level.
    Bytes(Vec<u8>),
}

/// Payload storage for one mip level.
#[derive(Debug)]
pub(crate) enum Level {
    Single {
        data: Option<TextureSource>,
    },
    Faces {
        data: Box<[Option<TextureSource>; 6]>,
    },
}

impl Level {
    fn empty_for(dimension: TextureDimension) -> Self {
        match dimension {
            TextureDimension::Cube => Level::Faces {
                data: Box::new([None, None, None, None, None, None]),
            },
            _ => Level::Single { data: None },
        }
    }

    pub(crate) fn has_data(&self) -> bool {
        match self {
            Level::Single { data } => data.is_some(),
            Level::Faces { data } => data.iter().any(Option::is_some),
        }
    }
}

/// A logical texture resource.
pub struct Texture {
    descriptor: TextureDescriptor,
    state: Mutex<TextureState>,
}

#[derive(Debug)]
pub(crate) struct TextureState {
    /// Effective dimensions; may shrink below the descriptor when an
    /// oversized image source is downscaled.
    pub width: u32,
    pub height: u32,
    pub levels: Vec<Level>,
    /// Per-face pending flags for level 0 of a cube map; index 0 doubles as
    /// the flag for non-cube textures.
    pub level0_updated: [bool; 6],
    pub needs_upload: bool,
    pub needs_mipmaps_upload: bool,
    pub mipmaps_uploaded: bool,
    pub sampler: CpuSampler,
    pub param_dirty: TextureParamDirty,
    /// One-time diagnostic guard for binds of an unusable texture.
    pub failed_warned: bool,
    pub platform: TexturePlatform,
}

impl Texture {
    pub(crate) fn new(descriptor: TextureDescriptor) -> Self {
        let state = TextureState {
            width: descriptor.width,
            height: descriptor.height,
            levels: vec![Level::empty_for(descriptor.dimension)],
            level0_updated: [false; 6],
            needs_upload: false,
            needs_mipmaps_upload: false,
            mipmaps_uploaded: false,
            sampler: CpuSampler::linear(),
            // all parameters are sent on first bind
            param_dirty: TextureParamDirty::all(),
            failed_warned: false,
            platform: TexturePlatform::default(),
        };
        Self {
            descriptor,
            state: Mutex::new(state),
        }
    }

    /// The descriptor the texture was created with.
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        self.descriptor.name.as_deref().unwrap_or("untitled")
    }

    /// Effective width (after any defensive downscale).
    pub fn width(&self) -> u32 {
        self.state.lock().width
    }

    /// Effective height (after any defensive downscale).
    pub fn height(&self) -> u32 {
        self.state.lock().height
    }

    /// Supply the payload for a mip level of a 2D, 3D or array texture.
    ///
    /// Level 0 schedules a full upload; higher levels schedule a mipmap
    /// upload (honored only when the texture requests mipmaps).
    pub fn set_level(&self, level: u32, source: TextureSource) {
        let mut state = self.state.lock();
        let dimension = self.descriptor.dimension;
        let level = level as usize;
        while state.levels.len() <= level {
            state.levels.push(Level::empty_for(dimension));
        }
        match &mut state.levels[level] {
            Level::Single { data } => *data = Some(source),
            Level::Faces { .. } => {
                log::warn!(
                    "Texture '{}': set_level on a cube map, use set_face_level",
                    self.name()
                );
                return;
            }
        }
        if level == 0 {
            state.level0_updated[0] = true;
            state.needs_upload = true;
            if self.descriptor.mipmaps {
                state.needs_mipmaps_upload = true;
            }
        } else {
            state.needs_mipmaps_upload = true;
        }
    }

    /// Supply the payload for one face of a cube map mip level.
    pub fn set_face_level(&self, level: u32, face: u32, source: TextureSource) {
        if face >= 6 {
            log::warn!("Texture '{}': cube face {} out of range", self.name(), face);
            return;
        }
        let mut state = self.state.lock();
        let dimension = self.descriptor.dimension;
        let level = level as usize;
        while state.levels.len() <= level {
            state.levels.push(Level::empty_for(dimension));
        }
        match &mut state.levels[level] {
            Level::Faces { data } => data[face as usize] = Some(source),
            Level::Single { .. } => {
                log::warn!(
                    "Texture '{}': set_face_level on a non-cube texture",
                    self.name()
                );
                return;
            }
        }
        if level == 0 {
            state.level0_updated[face as usize] = true;
            state.needs_upload = true;
            if self.descriptor.mipmaps {
                state.needs_mipmaps_upload = true;
            }
        } else {
            state.needs_mipmaps_upload = true;
        }
    }

    /// Mark everything stale so the next bind re-uploads all data and
    /// re-sends all sampler parameters. Used after context loss.
    pub fn dirty_all(&self) {
        let mut state = self.state.lock();
        state.level0_updated = [true; 6];
        state.needs_upload = state.levels.first().is_some_and(Level::has_data);
        state.needs_mipmaps_upload = self.descriptor.mipmaps;
        state.mipmaps_uploaded = false;
        state.param_dirty = TextureParamDirty::all();
    }

    /// Current sampler configuration.
    pub fn sampler(&self) -> CpuSampler {
        self.state.lock().sampler.clone()
    }

    /// Replace the whole sampler configuration.
    pub fn set_sampler(&self, sampler: CpuSampler) {
        let mut state = self.state.lock();
        if state.sampler != sampler {
            state.sampler = sampler;
            state.param_dirty = TextureParamDirty::all();
        }
    }

    /// Set the minification filter.
    pub fn set_min_filter(&self, filter: FilterMode) {
        let mut state = self.state.lock();
        if state.sampler.min_filter != filter {
            state.sampler.min_filter = filter;
            state.param_dirty |= TextureParamDirty::MIN_FILTER;
        }
    }

    /// Set the magnification filter.
    pub fn set_mag_filter(&self, filter: FilterMode) {
        let mut state = self.state.lock();
        if state.sampler.mag_filter != filter {
            state.sampler.mag_filter = filter;
            state.param_dirty |= TextureParamDirty::MAG_FILTER;
        }
    }

    /// Set the mipmap filter. Feeds the native min-filter state.
    pub fn set_mipmap_filter(&self, filter: FilterMode) {
        let mut state = self.state.lock();
        if state.sampler.mipmap_filter != filter {
            state.sampler.mipmap_filter = filter;
            state.param_dirty |= TextureParamDirty::MIN_FILTER;
        }
    }

    /// Set the U coordinate address mode.
    pub fn set_address_u(&self, mode: AddressMode) {
        let mut state = self.state.lock();
        if state.sampler.address_mode_u != mode {
            state.sampler.address_mode_u = mode;
            state.param_dirty |= TextureParamDirty::ADDRESS_U;
        }
    }

    /// Set the V coordinate address mode.
    pub fn set_address_v(&self, mode: AddressMode) {
        let mut state = self.state.lock();
        if state.sampler.address_mode_v != mode {
            state.sampler.address_mode_v = mode;
            state.param_dirty |= TextureParamDirty::ADDRESS_V;
        }
    }

    /// Set the W coordinate address mode.
    pub fn set_address_w(&self, mode: AddressMode) {
        let mut state = self.state.lock();
        if state.sampler.address_mode_w != mode {
            state.sampler.address_mode_w = mode;
            state.param_dirty |= TextureParamDirty::ADDRESS_W;
        }
    }

    /// Enable or disable depth comparison sampling.
    pub fn set_compare(&self, compare: Option<CompareFunction>) {
        let mut state = self.state.lock();
        if state.sampler.compare != compare {
            let mode_changed = state.sampler.compare.is_some() != compare.is_some();
            state.sampler.compare = compare;
            if mode_changed {
                state.param_dirty |= TextureParamDirty::COMPARE_MODE;
            }
            state.param_dirty |= TextureParamDirty::COMPARE_FUNC;
        }
    }

    /// Set the anisotropic filtering level.
    pub fn set_anisotropy(&self, level: u16) {
        let mut state = self.state.lock();
        if state.sampler.anisotropy_clamp != level {
            state.sampler.anisotropy_clamp = level;
            state.param_dirty |= TextureParamDirty::ANISOTROPY;
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, TextureState> {
        self.state.lock()
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("name", &self.descriptor.name)
            .field("size", &(self.descriptor.width, self.descriptor.height))
            .field("format", &self.descriptor.format)
            .field("dimension", &self.descriptor.dimension)
            .finish()
    }
}

// Ensure Texture is Send + Sync
static_assertions::assert_impl_all!(Texture: Send, Sync);

/// Native backing of a texture.
#[derive(Debug, Default)]
pub(crate) struct TexturePlatform {
    pub texture: Option<TextureId>,
    pub gl_target: u32,
    pub gl_format: u32,
    pub gl_internal_format: u32,
    pub gl_pixel_type: u32,
    /// Level 0 storage exists with these extents; a matching re-upload can
    /// go through the sub-image path.
    level0_allocated: bool,
    alloc_width: u32,
    alloc_height: u32,
    /// GPU memory currently accounted for this texture.
    pub gpu_size: u64,
    /// Format resolution failed; the texture has no usable native backing.
    pub failed: bool,
}

impl TexturePlatform {
    /// Select the native target and resolve the format triple, then create
    /// the native object.
    ///
    /// Formats backed by an optional capability fail fast with a
    /// descriptive error when the capability is absent; the texture is left
    /// without native backing and subsequent binds are a caller error.
    pub fn initialize(
        &mut self,
        gl: &dyn GlBackend,
        extensions: &Extensions,
        descriptor: &TextureDescriptor,
    ) -> Result<(), GraphicsError> {
        self.gl_target = match descriptor.dimension {
            TextureDimension::D2 => gl::TEXTURE_2D,
            TextureDimension::Cube => gl::TEXTURE_CUBE_MAP,
            TextureDimension::D3 => gl::TEXTURE_3D,
            TextureDimension::D2Array => gl::TEXTURE_2D_ARRAY,
        };

        let (format, internal, pixel_type) =
            match resolve_format(descriptor.format, extensions) {
                Ok(triple) => triple,
                Err(err) => {
                    self.failed = true;
                    return Err(err);
                }
            };
        self.gl_format = format;
        self.gl_internal_format = internal;
        self.gl_pixel_type = pixel_type;

        let handle = gl.create_texture();
        if handle.0 == 0 {
            self.failed = true;
            return Err(GraphicsError::Internal(
                "native texture creation returned a null handle".to_string(),
            ));
        }
        self.texture = Some(handle);
        Ok(())
    }

    /// True when the native object exists and is usable.
    pub fn is_initialized(&self) -> bool {
        self.texture.is_some() && !self.failed
    }

    /// True when level 0 storage has been allocated natively.
    pub fn storage_allocated(&self) -> bool {
        self.level0_allocated
    }
}

impl PlatformResource for TexturePlatform {
    fn destroy(&mut self, gl: &dyn GlBackend) {
        if let Some(texture) = self.texture.take() {
            gl.delete_texture(texture);
        }
        self.level0_allocated = false;
    }

    fn lose_context(&mut self) {
        self.texture = None;
        self.level0_allocated = false;
        self.gpu_size = 0;
    }
}

/// Resolve the abstract pixel format into the native
/// (transfer format, internal format, component type) triple.
fn resolve_format(
    format: PixelFormat,
    extensions: &Extensions,
) -> Result<(u32, u32, u32), GraphicsError> {
    let missing = |name: &str| {
        GraphicsError::CapabilityMissing(format!(
            "pixel format {format:?} requires the {name} capability"
        ))
    };

    Ok(match format {
        PixelFormat::A8 => (gl::ALPHA, gl::ALPHA, gl::UNSIGNED_BYTE),
        PixelFormat::L8 => (gl::LUMINANCE, gl::LUMINANCE, gl::UNSIGNED_BYTE),
        PixelFormat::La8 => (
            gl::LUMINANCE_ALPHA,
            gl::LUMINANCE_ALPHA,
            gl::UNSIGNED_BYTE,
        ),
        PixelFormat::Rgb565 => (gl::RGB, gl::RGB, gl::UNSIGNED_SHORT_5_6_5),
        PixelFormat::Rgba5551 => (gl::RGBA, gl::RGBA, gl::UNSIGNED_SHORT_5_5_5_1),
        PixelFormat::Rgba4 => (gl::RGBA, gl::RGBA, gl::UNSIGNED_SHORT_4_4_4_4),
        PixelFormat::Rgb8 => (gl::RGB, gl::RGB8, gl::UNSIGNED_BYTE),
        PixelFormat::Rgba8 => (gl::RGBA, gl::RGBA8, gl::UNSIGNED_BYTE),
        PixelFormat::Dxt1 => {
            let ext = extensions.compressed_s3tc.ok_or_else(|| missing("S3TC"))?;
            (gl::RGB, ext.compressed_rgb_dxt1, 0)
        }
        PixelFormat::Dxt3 => {
            let ext = extensions.compressed_s3tc.ok_or_else(|| missing("S3TC"))?;
            (gl::RGBA, ext.compressed_rgba_dxt3, 0)
        }
        PixelFormat::Dxt5 => {
            let ext = extensions.compressed_s3tc.ok_or_else(|| missing("S3TC"))?;
            (gl::RGBA, ext.compressed_rgba_dxt5, 0)
        }
        PixelFormat::Etc1 => {
            let ext = extensions.compressed_etc1.ok_or_else(|| missing("ETC1"))?;
            (gl::RGB, ext.compressed_rgb_etc1, 0)
        }
        PixelFormat::Etc2Rgb => {
            let ext = extensions.compressed_etc2.ok_or_else(|| missing("ETC2"))?;
            (gl::RGB, ext.compressed_rgb8_etc2, 0)
        }
        PixelFormat::Etc2Rgba => {
            let ext = extensions.compressed_etc2.ok_or_else(|| missing("ETC2"))?;
            (gl::RGBA, ext.compressed_rgba8_etc2_eac, 0)
        }
        PixelFormat::PvrtcRgb2 => {
            let ext = extensions.compressed_pvrtc.ok_or_else(|| missing("PVRTC"))?;
            (gl::RGB, ext.compressed_rgb_2bpp, 0)
        }
        PixelFormat::PvrtcRgba2 => {
            let ext = extensions.compressed_pvrtc.ok_or_else(|| missing("PVRTC"))?;
            (gl::RGBA, ext.compressed_rgba_2bpp, 0)
        }
        PixelFormat::PvrtcRgb4 => {
            let ext = extensions.compressed_pvrtc.ok_or_else(|| missing("PVRTC"))?;
            (gl::RGB, ext.compressed_rgb_4bpp, 0)
        }
        PixelFormat::PvrtcRgba4 => {
            let ext = extensions.compressed_pvrtc.ok_or_else(|| missing("PVRTC"))?;
            (gl::RGBA, ext.compressed_rgba_4bpp, 0)
        }
        PixelFormat::Astc4x4 => {
            let ext = extensions.compressed_astc.ok_or_else(|| missing("ASTC"))?;
            (gl::RGBA, ext.compressed_rgba_4x4, 0)
        }
        PixelFormat::AtcRgb => {
            let ext = extensions.compressed_atc.ok_or_else(|| missing("ATC"))?;
            (gl::RGB, ext.compressed_rgb, 0)
        }
        PixelFormat::AtcRgba => {
            let ext = extensions.compressed_atc.ok_or_else(|| missing("ATC"))?;
            (gl::RGBA, ext.compressed_rgba_interpolated, 0)
        }
        PixelFormat::Rgb16F => (gl::RGB, gl::RGB16F, gl::HALF_FLOAT),
        PixelFormat::Rgba16F => (gl::RGBA, gl::RGBA16F, gl::HALF_FLOAT),
        PixelFormat::Rgb32F => (gl::RGB, gl::RGB32F, gl::FLOAT),
        PixelFormat::Rgba32F => (gl::RGBA, gl::RGBA32F, gl::FLOAT),
        PixelFormat::R32F => (gl::RED, gl::R32F, gl::FLOAT),
        PixelFormat::Depth => (gl::DEPTH_COMPONENT, gl::DEPTH_COMPONENT32F, gl::FLOAT),
        PixelFormat::DepthStencil => (
            gl::DEPTH_STENCIL,
            gl::DEPTH24_STENCIL8,
            gl::UNSIGNED_INT_24_8,
        ),
        PixelFormat::Rg11B10F => (
            gl::RGB,
            gl::R11F_G11F_B10F,
            gl::UNSIGNED_INT_10F_11F_11F_REV,
        ),
        PixelFormat::Srgb8 => (gl::RGB, gl::SRGB8, gl::UNSIGNED_BYTE),
        PixelFormat::Srgba8 => (gl::RGBA, gl::SRGB8_ALPHA8, gl::UNSIGNED_BYTE),
    })
}

impl TextureState {
    /// Number of mip levels needed for a complete chain at the current
    /// effective size.
    fn required_mip_levels(&self) -> u32 {
        32 - self.width.max(self.height).max(1).leading_zeros()
    }

    /// Send dirty sampler parameters to the bound native texture.
    pub(crate) fn set_parameters(
        &mut self,
        gl: &dyn GlBackend,
        extensions: &Extensions,
        descriptor: &TextureDescriptor,
    ) {
        let flags = self.param_dirty;
        if flags.is_empty() {
            return;
        }
        let target = self.platform.gl_target;
        let sampler = &self.sampler;

        if flags.contains(TextureParamDirty::MIN_FILTER) {
            // A min filter that samples mips is degraded when the texture
            // cannot have a complete chain.
            let use_mips = descriptor.mipmaps
                && !(descriptor.format.is_compressed() && self.levels.len() == 1);
            let value = min_filter_to_native(sampler.min_filter, sampler.mipmap_filter, use_mips);
            gl.tex_parameter_i(target, gl::TEXTURE_MIN_FILTER, value as i32);
        }
        if flags.contains(TextureParamDirty::MAG_FILTER) {
            let value = match sampler.mag_filter {
                FilterMode::Nearest => gl::NEAREST,
                FilterMode::Linear => gl::LINEAR,
            };
            gl.tex_parameter_i(target, gl::TEXTURE_MAG_FILTER, value as i32);
        }
        if flags.contains(TextureParamDirty::ADDRESS_U) {
            gl.tex_parameter_i(
                target,
                gl::TEXTURE_WRAP_S,
                address_to_native(sampler.address_mode_u) as i32,
            );
        }
        if flags.contains(TextureParamDirty::ADDRESS_V) {
            gl.tex_parameter_i(
                target,
                gl::TEXTURE_WRAP_T,
                address_to_native(sampler.address_mode_v) as i32,
            );
        }
        if flags.contains(TextureParamDirty::ADDRESS_W) {
            gl.tex_parameter_i(
                target,
                gl::TEXTURE_WRAP_R,
                address_to_native(sampler.address_mode_w) as i32,
            );
        }
        if flags.contains(TextureParamDirty::COMPARE_MODE) {
            let mode = if sampler.compare.is_some() {
                gl::COMPARE_REF_TO_TEXTURE
            } else {
                gl::NONE
            };
            gl.tex_parameter_i(target, gl::TEXTURE_COMPARE_MODE, mode as i32);
        }
        if flags.contains(TextureParamDirty::COMPARE_FUNC) {
            if let Some(func) = sampler.compare {
                gl.tex_parameter_i(
                    target,
                    gl::TEXTURE_COMPARE_FUNC,
                    compare_to_native(func) as i32,
                );
            }
        }
        if flags.contains(TextureParamDirty::ANISOTROPY) {
            if let Some(ext) = &extensions.anisotropy {
                let value = (sampler.anisotropy_clamp as f32)
                    .round()
                    .clamp(1.0, ext.max_anisotropy);
                gl.tex_parameter_f(target, ext.texture_max_anisotropy, value);
            }
        }

        self.param_dirty = TextureParamDirty::empty();
    }

    /// Upload pending level data to the bound native texture.
    ///
    /// Walks mip levels from 0: level 0 always uploads when pending; higher
    /// levels upload only when mipmaps are both requested and supplied,
    /// otherwise the chain is generated natively from level 0.
    pub(crate) fn upload(
        &mut self,
        gl: &dyn GlBackend,
        caps: &RawCapabilities,
        descriptor: &TextureDescriptor,
        unpack: &mut UnpackCache,
        vram: &mut VramStats,
    ) {
        if !self.platform.is_initialized() {
            return;
        }
        // nothing to do when only an already-generated mip chain is pending
        if !self.needs_upload && self.needs_mipmaps_upload && self.mipmaps_uploaded {
            return;
        }

        let compressed = descriptor.format.is_compressed();
        let target = self.platform.gl_target;
        let required_levels = self.required_mip_levels();

        let mut mip: usize = 0;
        loop {
            let level_has_data = self.levels.get(mip).is_some_and(Level::has_data);
            if !level_has_data && mip != 0 {
                break;
            }

            if !self.needs_upload && mip == 0 {
                mip += 1;
                continue;
            }
            if mip > 0 && (!self.needs_mipmaps_upload || !descriptor.mipmaps) {
                break;
            }

            if mip == 1 && !compressed && (self.levels.len() as u32) < required_levels {
                // Explicit mips exist but not a complete chain; generate the
                // full chain from level 0 first, then overwrite the supplied
                // levels.
                gl.generate_mipmap(target);
                self.mipmaps_uploaded = true;
            }

            if level_has_data {
                self.upload_level(gl, caps, descriptor, unpack, mip);
            }
            mip += 1;
        }

        if self.needs_upload {
            self.level0_updated = [false; 6];
        }

        if !compressed
            && descriptor.mipmaps
            && self.needs_mipmaps_upload
            && self.levels.len() == 1
        {
            gl.generate_mipmap(target);
            self.mipmaps_uploaded = true;
        }

        // VRAM accounting brackets every upload.
        vram.texture -= self.platform.gpu_size;
        let effective = TextureDescriptor {
            width: self.width,
            height: self.height,
            ..descriptor.clone()
        };
        self.platform.gpu_size = effective.gpu_size();
        vram.texture += self.platform.gpu_size;
    }

    /// Allocate level 0 storage with undefined contents.
    ///
    /// Render target attachments never receive pixel payloads; the driver
    /// still needs backing storage before the framebuffer can be complete.
    /// The texture must be bound on the active unit.
    pub(crate) fn allocate_storage(
        &mut self,
        gl: &dyn GlBackend,
        descriptor: &TextureDescriptor,
        vram: &mut VramStats,
    ) {
        if !self.platform.is_initialized() || self.platform.level0_allocated {
            return;
        }
        let platform = &self.platform;
        match descriptor.dimension {
            TextureDimension::Cube => {
                for face in 0..6u32 {
                    gl.tex_image_2d(
                        gl::TEXTURE_CUBE_MAP_POSITIVE_X + face,
                        0,
                        platform.gl_internal_format,
                        self.width,
                        self.height,
                        platform.gl_format,
                        platform.gl_pixel_type,
                        None,
                    );
                }
            }
            TextureDimension::D3 | TextureDimension::D2Array => {
                gl.tex_image_3d(
                    platform.gl_target,
                    0,
                    platform.gl_internal_format,
                    self.width,
                    self.height,
                    descriptor.depth.max(1),
                    platform.gl_format,
                    platform.gl_pixel_type,
                    None,
                );
            }
            TextureDimension::D2 => {
                gl.tex_image_2d(
                    platform.gl_target,
                    0,
                    platform.gl_internal_format,
                    self.width,
                    self.height,
                    platform.gl_format,
                    platform.gl_pixel_type,
                    None,
                );
            }
        }

        self.platform.level0_allocated = true;
        self.platform.alloc_width = self.width;
        self.platform.alloc_height = self.height;

        vram.texture -= self.platform.gpu_size;
        let effective = TextureDescriptor {
            width: self.width,
            height: self.height,
            ..descriptor.clone()
        };
        self.platform.gpu_size = effective.gpu_size();
        vram.texture += self.platform.gpu_size;
    }

    fn upload_level(
        &mut self,
        gl: &dyn GlBackend,
        caps: &RawCapabilities,
        descriptor: &TextureDescriptor,
        unpack: &mut UnpackCache,
        mip: usize,
    ) {
        let compressed = descriptor.format.is_compressed();
        let platform = &self.platform;
        let target = platform.gl_target;
        let mip_w = (self.width >> mip).max(1);
        let mip_h = (self.height >> mip).max(1);

        match descriptor.dimension {
            TextureDimension::Cube => {
                let Level::Faces { data } = &self.levels[mip] else {
                    return;
                };
                let mut resized: Option<(u32, u32)> = None;
                for face in 0..6 {
                    // Level 0 flags gate the whole face column.
                    if !self.level0_updated[face] {
                        continue;
                    }
                    let Some(source) = &data[face] else {
                        continue;
                    };
                    let face_target = gl::TEXTURE_CUBE_MAP_POSITIVE_X + face as u32;
                    match source {
                        TextureSource::Image(image) => {
                            let image = image.downsample_to(caps.max_cube_map_size);
                            if mip == 0 {
                                resized = Some((image.width(), image.height()));
                            }
                            unpack.set_flip_y(gl, false);
                            unpack.set_premultiply_alpha(gl, descriptor.premultiply_alpha);
                            gl.tex_image_2d(
                                face_target,
                                mip as u32,
                                platform.gl_internal_format,
                                image.width(),
                                image.height(),
                                platform.gl_format,
                                platform.gl_pixel_type,
                                Some(image.pixels()),
                            );
                        }
                        TextureSource::Bytes(bytes) => {
                            if compressed {
                                gl.compressed_tex_image_2d(
                                    face_target,
                                    mip as u32,
                                    platform.gl_internal_format,
                                    mip_w,
                                    mip_h,
                                    bytes,
                                );
                            } else {
                                unpack.set_flip_y(gl, false);
                                unpack.set_premultiply_alpha(gl, descriptor.premultiply_alpha);
                                gl.tex_image_2d(
                                    face_target,
                                    mip as u32,
                                    platform.gl_internal_format,
                                    mip_w,
                                    mip_h,
                                    platform.gl_format,
                                    platform.gl_pixel_type,
                                    Some(bytes),
                                );
                            }
                        }
                    }
                }
                if let Some((w, h)) = resized {
                    self.width = w;
                    self.height = h;
                }
            }
            TextureDimension::D3 | TextureDimension::D2Array => {
                let Level::Single { data: Some(source) } = &self.levels[mip] else {
                    return;
                };
                // Only raw byte payloads reach the 3D path.
                let TextureSource::Bytes(bytes) = source else {
                    log::warn!("texture upload: image sources are not supported for 3D targets");
                    return;
                };
                let mip_d = match descriptor.dimension {
                    TextureDimension::D3 => (descriptor.depth >> mip).max(1),
                    _ => descriptor.depth.max(1),
                };
                if compressed {
                    gl.compressed_tex_image_3d(
                        target,
                        mip as u32,
                        platform.gl_internal_format,
                        mip_w,
                        mip_h,
                        mip_d,
                        bytes,
                    );
                } else {
                    unpack.set_flip_y(gl, false);
                    unpack.set_premultiply_alpha(gl, descriptor.premultiply_alpha);
                    gl.tex_image_3d(
                        target,
                        mip as u32,
                        platform.gl_internal_format,
                        mip_w,
                        mip_h,
                        mip_d,
                        platform.gl_format,
                        platform.gl_pixel_type,
                        Some(bytes),
                    );
                }
            }
            TextureDimension::D2 => {
                let Level::Single { data: Some(source) } = &self.levels[mip] else {
                    return;
                };
                match source {
                    TextureSource::Image(image) => {
                        let image = image.downsample_to(caps.max_texture_size);
                        if mip == 0 {
                            self.width = image.width();
                            self.height = image.height();
                        }
                        unpack.set_flip_y(gl, descriptor.flip_y);
                        unpack.set_premultiply_alpha(gl, descriptor.premultiply_alpha);
                        gl.tex_image_2d(
                            target,
                            mip as u32,
                            platform.gl_internal_format,
                            image.width(),
                            image.height(),
                            platform.gl_format,
                            platform.gl_pixel_type,
                            Some(image.pixels()),
                        );
                    }
                    TextureSource::Bytes(bytes) => {
                        if compressed {
                            gl.compressed_tex_image_2d(
                                target,
                                mip as u32,
                                platform.gl_internal_format,
                                mip_w,
                                mip_h,
                                bytes,
                            );
                        } else {
                            unpack.set_flip_y(gl, false);
                            unpack.set_premultiply_alpha(gl, descriptor.premultiply_alpha);
                            // Storage that already exists with matching
                            // extents takes the sub-region path.
                            if self.platform.level0_allocated
                                && self.platform.alloc_width == self.width
                                && self.platform.alloc_height == self.height
                            {
                                gl.tex_sub_image_2d(
                                    target,
                                    mip as u32,
                                    0,
                                    0,
                                    mip_w,
                                    mip_h,
                                    platform.gl_format,
                                    platform.gl_pixel_type,
                                    bytes,
                                );
                            } else {
                                gl.tex_image_2d(
                                    target,
                                    mip as u32,
                                    platform.gl_internal_format,
                                    mip_w,
                                    mip_h,
                                    platform.gl_format,
                                    platform.gl_pixel_type,
                                    Some(bytes),
                                );
                            }
                        }
                    }
                }
                self.mipmaps_uploaded = mip != 0;
            }
        }

        if mip == 0 {
            self.platform.level0_allocated = true;
            self.platform.alloc_width = self.width;
            self.platform.alloc_height = self.height;
        }
    }
}

fn min_filter_to_native(min: FilterMode, mip: FilterMode, use_mips: bool) -> u32 {
    if !use_mips {
        return match min {
            FilterMode::Nearest => gl::NEAREST,
            FilterMode::Linear => gl::LINEAR,
        };
    }
    match (min, mip) {
        (FilterMode::Nearest, FilterMode::Nearest) => gl::NEAREST_MIPMAP_NEAREST,
        (FilterMode::Nearest, FilterMode::Linear) => gl::NEAREST_MIPMAP_LINEAR,
        (FilterMode::Linear, FilterMode::Nearest) => gl::LINEAR_MIPMAP_NEAREST,
        (FilterMode::Linear, FilterMode::Linear) => gl::LINEAR_MIPMAP_LINEAR,
    }
}

fn address_to_native(mode: AddressMode) -> u32 {
    match mode {
        AddressMode::ClampToEdge => gl::CLAMP_TO_EDGE,
        AddressMode::Repeat => gl::REPEAT,
        AddressMode::MirrorRepeat => gl::MIRRORED_REPEAT,
    }
}

pub(crate) fn compare_to_native(func: CompareFunction) -> u32 {
    match func {
        CompareFunction::Never => gl::NEVER,
        CompareFunction::Less => gl::LESS,
        CompareFunction::Equal => gl::EQUAL,
        CompareFunction::LessEqual => gl::LEQUAL,
        CompareFunction::Greater => gl::GREATER,
        CompareFunction::NotEqual => gl::NOTEQUAL,
        CompareFunction::GreaterEqual => gl::GEQUAL,
        CompareFunction::Always => gl::ALWAYS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    #[test]
    fn test_format_table_core_formats() {
        let exts = DummyBackend::full_extensions();
        assert_eq!(
            resolve_format(PixelFormat::Rgba8, &exts).unwrap(),
            (gl::RGBA, gl::RGBA8, gl::UNSIGNED_BYTE)
        );
        assert_eq!(
            resolve_format(PixelFormat::Rgba16F, &exts).unwrap(),
            (gl::RGBA, gl::RGBA16F, gl::HALF_FLOAT)
        );
        assert_eq!(
            resolve_format(PixelFormat::DepthStencil, &exts).unwrap(),
            (gl::DEPTH_STENCIL, gl::DEPTH24_STENCIL8, gl::UNSIGNED_INT_24_8)
        );
    }

    #[test]
    fn test_format_table_reads_extension_constants() {
        let exts = DummyBackend::full_extensions();
        let (_, internal, _) = resolve_format(PixelFormat::Dxt5, &exts).unwrap();
        assert_eq!(internal, exts.compressed_s3tc.unwrap().compressed_rgba_dxt5);
    }

    #[test]
    fn test_format_table_fails_without_capability() {
        let exts = Extensions::default();
        let err = resolve_format(PixelFormat::Dxt1, &exts).unwrap_err();
        assert!(matches!(err, GraphicsError::CapabilityMissing(_)));
    }

    #[test]
    fn test_initialize_marks_failed_on_missing_capability() {
        let backend = DummyBackend::with_extensions(Extensions::default());
        let descriptor = TextureDescriptor::new_2d(4, 4, PixelFormat::Etc1);
        let texture = Texture::new(descriptor.clone());
        let mut state = texture.state();
        let result = state
            .platform
            .initialize(&backend, &backend.extensions(), &descriptor);
        assert!(result.is_err());
        assert!(state.platform.failed);
        assert!(state.platform.texture.is_none());
    }

    #[test]
    fn test_min_filter_downgrade_without_mips() {
        assert_eq!(
            min_filter_to_native(FilterMode::Linear, FilterMode::Linear, false),
            gl::LINEAR
        );
        assert_eq!(
            min_filter_to_native(FilterMode::Linear, FilterMode::Linear, true),
            gl::LINEAR_MIPMAP_LINEAR
        );
    }

    #[test]
    fn test_set_level_marks_pending() {
        let texture = Texture::new(TextureDescriptor::new_2d(4, 4, PixelFormat::Rgba8));
        texture.set_level(0, TextureSource::Bytes(vec![0u8; 64]));
        let state = texture.state();
        assert!(state.needs_upload);
        assert!(!state.needs_mipmaps_upload);
        assert!(state.level0_updated[0]);
    }

    #[test]
    fn test_set_mip_level_marks_mipmaps_pending() {
        let texture = Texture::new(TextureDescriptor::new_2d(4, 4, PixelFormat::Rgba8));
        texture.set_level(1, TextureSource::Bytes(vec![0u8; 16]));
        let state = texture.state();
        assert!(!state.needs_upload);
        assert!(state.needs_mipmaps_upload);
    }

    #[test]
    fn test_sampler_setters_track_dirty_bits() {
        let texture = Texture::new(TextureDescriptor::new_2d(4, 4, PixelFormat::Rgba8));
        // a fresh texture has everything dirty; simulate the post-bind state
        texture.state().param_dirty = TextureParamDirty::empty();

        texture.set_min_filter(FilterMode::Nearest);
        texture.set_address_u(AddressMode::Repeat);
        let state = texture.state();
        assert_eq!(
            state.param_dirty,
            TextureParamDirty::MIN_FILTER | TextureParamDirty::ADDRESS_U
        );
    }

    #[test]
    fn test_sampler_setter_noop_keeps_clean() {
        let texture = Texture::new(TextureDescriptor::new_2d(4, 4, PixelFormat::Rgba8));
        texture.state().param_dirty = TextureParamDirty::empty();
        // linear is already the default
        texture.set_min_filter(FilterMode::Linear);
        assert!(texture.state().param_dirty.is_empty());
    }
}
