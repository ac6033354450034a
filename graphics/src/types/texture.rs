//! Texture formats and descriptors.

use vermilion_core::texture::TextureDimension;

/// Abstract pixel format enumeration.
///
/// Each format maps to a native (transfer format, internal format, component
/// type) triple when the texture is initialized; block-compressed formats
/// additionally require the matching native capability to be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum PixelFormat {
    /// 8-bit alpha.
    A8,
    /// 8-bit luminance.
    L8,
    /// 8-bit luminance with 8-bit alpha.
    La8,
    /// 16-bit RGB (5/6/5 bits).
    Rgb565,
    /// 16-bit RGBA (5/5/5/1 bits).
    Rgba5551,
    /// 16-bit RGBA (4 bits per channel).
    Rgba4,
    /// 24-bit RGB.
    Rgb8,
    /// 32-bit RGBA.
    #[default]
    Rgba8,
    /// Block-compressed RGB (S3TC DXT1).
    Dxt1,
    /// Block-compressed RGBA with explicit alpha (S3TC DXT3).
    Dxt3,
    /// Block-compressed RGBA with interpolated alpha (S3TC DXT5).
    Dxt5,
    /// 48-bit half-float RGB.
    Rgb16F,
    /// 64-bit half-float RGBA.
    Rgba16F,
    /// 96-bit float RGB.
    Rgb32F,
    /// 128-bit float RGBA.
    Rgba32F,
    /// 32-bit float single channel.
    R32F,
    /// Depth component.
    Depth,
    /// Packed 24-bit depth with 8-bit stencil.
    DepthStencil,
    /// Packed 32-bit float RGB (11/11/10 bits).
    Rg11B10F,
    /// 24-bit RGB in sRGB color space.
    Srgb8,
    /// 32-bit RGBA in sRGB color space.
    Srgba8,
    /// Block-compressed RGB (ETC1).
    Etc1,
    /// Block-compressed RGB (ETC2).
    Etc2Rgb,
    /// Block-compressed RGBA (ETC2 EAC).
    Etc2Rgba,
    /// Block-compressed RGB, 2 bits per pixel (PVRTC).
    PvrtcRgb2,
    /// Block-compressed RGBA, 2 bits per pixel (PVRTC).
    PvrtcRgba2,
    /// Block-compressed RGB, 4 bits per pixel (PVRTC).
    PvrtcRgb4,
    /// Block-compressed RGBA, 4 bits per pixel (PVRTC).
    PvrtcRgba4,
    /// Block-compressed RGBA, 4x4 blocks (ASTC).
    Astc4x4,
    /// Block-compressed RGB (ATC).
    AtcRgb,
    /// Block-compressed RGBA (ATC).
    AtcRgba,
}

impl PixelFormat {
    /// Returns true for block-compressed formats.
    pub fn is_compressed(&self) -> bool {
        matches!(
            self,
            Self::Dxt1
                | Self::Dxt3
                | Self::Dxt5
                | Self::Etc1
                | Self::Etc2Rgb
                | Self::Etc2Rgba
                | Self::PvrtcRgb2
                | Self::PvrtcRgba2
                | Self::PvrtcRgb4
                | Self::PvrtcRgba4
                | Self::Astc4x4
                | Self::AtcRgb
                | Self::AtcRgba
        )
    }

    /// Returns true for depth or combined depth/stencil formats.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(self, Self::Depth | Self::DepthStencil)
    }

    /// GPU memory consumed by one mip level of the given dimensions.
    ///
    /// Uncompressed formats use the per-pixel storage size the driver
    /// actually allocates (RGB formats pad to four bytes); compressed
    /// formats use their block arithmetic.
    pub fn level_size(&self, width: u32, height: u32, depth: u32) -> u64 {
        let (width, height, depth) = (width as u64, height as u64, depth as u64);
        let pixels = width * height * depth;
        match self {
            Self::A8 | Self::L8 => pixels,
            Self::La8 | Self::Rgb565 | Self::Rgba5551 | Self::Rgba4 => pixels * 2,
            Self::Rgb8
            | Self::Rgba8
            | Self::R32F
            | Self::Depth
            | Self::DepthStencil
            | Self::Rg11B10F
            | Self::Srgb8
            | Self::Srgba8 => pixels * 4,
            Self::Rgb16F | Self::Rgba16F => pixels * 8,
            Self::Rgb32F | Self::Rgba32F => pixels * 16,
            Self::Dxt1 | Self::Etc1 | Self::Etc2Rgb | Self::AtcRgb => {
                width.div_ceil(4) * height.div_ceil(4) * 8 * depth
            }
            Self::Dxt3 | Self::Dxt5 | Self::Etc2Rgba | Self::Astc4x4 | Self::AtcRgba => {
                width.div_ceil(4) * height.div_ceil(4) * 16 * depth
            }
            Self::PvrtcRgb2 | Self::PvrtcRgba2 => width.max(16) * height.max(8) / 4 * depth,
            Self::PvrtcRgb4 | Self::PvrtcRgba4 => width.max(8) * height.max(8) / 2 * depth,
        }
    }
}

/// Descriptor for creating a texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    /// Debug name for the texture.
    pub name: Option<String>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Depth in pixels for volume textures, array length for array textures.
    pub depth: u32,
    /// Pixel format.
    pub format: PixelFormat,
    /// Dimensionality (2D, cube, 3D, 2D array).
    pub dimension: TextureDimension,
    /// Whether a full mip chain should exist (supplied or generated).
    pub mipmaps: bool,
    /// Flip image-sourced uploads vertically.
    pub flip_y: bool,
    /// Premultiply alpha on image-sourced uploads.
    pub premultiply_alpha: bool,
}

impl TextureDescriptor {
    /// Create a 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            name: None,
            width,
            height,
            depth: 1,
            format,
            dimension: TextureDimension::D2,
            mipmaps: true,
            flip_y: false,
            premultiply_alpha: false,
        }
    }

    /// Create a cube map descriptor with square faces.
    pub fn new_cube(size: u32, format: PixelFormat) -> Self {
        Self {
            dimension: TextureDimension::Cube,
            ..Self::new_2d(size, size, format)
        }
    }

    /// Create a volume texture descriptor.
    pub fn new_3d(width: u32, height: u32, depth: u32, format: PixelFormat) -> Self {
        Self {
            depth,
            dimension: TextureDimension::D3,
            ..Self::new_2d(width, height, format)
        }
    }

    /// Create a 2D array texture descriptor.
    pub fn new_2d_array(width: u32, height: u32, layers: u32, format: PixelFormat) -> Self {
        Self {
            depth: layers,
            dimension: TextureDimension::D2Array,
            ..Self::new_2d(width, height, format)
        }
    }

    /// Set the debug name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enable or disable mipmapping.
    pub fn with_mipmaps(mut self, mipmaps: bool) -> Self {
        self.mipmaps = mipmaps;
        self
    }

    /// Flip image-sourced uploads vertically.
    pub fn with_flip_y(mut self, flip_y: bool) -> Self {
        self.flip_y = flip_y;
        self
    }

    /// Number of mip levels in a full chain for these dimensions.
    pub fn mip_level_count(&self) -> u32 {
        if !self.mipmaps {
            return 1;
        }
        32 - self.width.max(self.height).max(1).leading_zeros()
    }

    /// True when both dimensions are powers of two.
    pub fn is_power_of_two(&self) -> bool {
        self.width.is_power_of_two() && self.height.is_power_of_two()
    }

    /// Total GPU memory this texture occupies, including the mip chain and
    /// all cube faces or array layers.
    pub fn gpu_size(&self) -> u64 {
        let faces = if self.dimension == TextureDimension::Cube {
            6
        } else {
            1
        };
        let depth = match self.dimension {
            TextureDimension::D3 | TextureDimension::D2Array => self.depth.max(1),
            _ => 1,
        };

        let mut total = 0;
        let (mut w, mut h, mut d) = (self.width.max(1), self.height.max(1), depth);
        for _ in 0..self.mip_level_count() {
            total += self.format.level_size(w, h, d);
            w = (w / 2).max(1);
            h = (h / 2).max(1);
            if self.dimension == TextureDimension::D3 {
                d = (d / 2).max(1);
            }
        }
        total * faces
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressed_classification() {
        assert!(PixelFormat::Dxt5.is_compressed());
        assert!(PixelFormat::Etc2Rgba.is_compressed());
        assert!(!PixelFormat::Rgba8.is_compressed());
        assert!(!PixelFormat::Rgba32F.is_compressed());
    }

    #[test]
    fn test_level_size_block_math() {
        // DXT1: 4x4 blocks of 8 bytes; a 7x5 level rounds up to 2x2 blocks.
        assert_eq!(PixelFormat::Dxt1.level_size(7, 5, 1), 2 * 2 * 8);
        assert_eq!(PixelFormat::Rgba8.level_size(16, 16, 1), 16 * 16 * 4);
    }

    #[test]
    fn test_mip_level_count() {
        let desc = TextureDescriptor::new_2d(256, 64, PixelFormat::Rgba8);
        assert_eq!(desc.mip_level_count(), 9);

        let desc = desc.with_mipmaps(false);
        assert_eq!(desc.mip_level_count(), 1);
    }

    #[test]
    fn test_gpu_size_includes_faces_and_mips() {
        let desc = TextureDescriptor::new_cube(4, PixelFormat::Rgba8).with_mipmaps(false);
        assert_eq!(desc.gpu_size(), 4 * 4 * 4 * 6);

        let desc = TextureDescriptor::new_2d(4, 4, PixelFormat::Rgba8);
        // 4x4 + 2x2 + 1x1 pixels at 4 bytes
        assert_eq!(desc.gpu_size(), (16 + 4 + 1) * 4);
    }
}
