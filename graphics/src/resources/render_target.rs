//! Render target resource.
//!
//! A [`RenderTarget`] groups color attachments and an optional depth/stencil
//! attachment into a render destination. The platform impl owns the native
//! framebuffer objects; with multisampling the originally created
//! framebuffer becomes the resolve destination and a fresh multisampled
//! framebuffer takes over rendering. When several color attachments are
//! combined with multisampling, one extra framebuffer pair per attachment
//! lets each color buffer resolve independently.

use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

use crate::backend::{FramebufferId, GlBackend, RenderbufferId};
use crate::resources::texture::Texture;
use crate::resources::PlatformResource;

/// Descriptor for creating a render target.
#[derive(Debug, Clone)]
pub struct RenderTargetDescriptor {
    /// Name used in diagnostics.
    pub name: String,
    /// Color attachments, bound at sequential attachment points.
    pub color_buffers: Vec<Arc<Texture>>,
    /// Depth (or depth/stencil) texture attachment.
    pub depth_buffer: Option<Arc<Texture>>,
    /// Allocate a depth buffer when no depth texture is supplied.
    pub depth: bool,
    /// Include a stencil component in the allocated depth buffer.
    pub stencil: bool,
    /// Multisample count; values above 1 enable MSAA.
    pub samples: u32,
    /// Resolve automatically at the end of a render block.
    pub auto_resolve: bool,
    /// Cube face rendered into when the color buffer is a cube map.
    pub face: u32,
}

impl RenderTargetDescriptor {
    /// Create a descriptor with a single color attachment.
    pub fn new(name: impl Into<String>, color_buffer: Arc<Texture>) -> Self {
        Self {
            name: name.into(),
            color_buffers: vec![color_buffer],
            depth_buffer: None,
            depth: true,
            stencil: false,
            samples: 1,
            auto_resolve: true,
            face: 0,
        }
    }

    /// Replace the color attachment list.
    pub fn with_color_buffers(mut self, buffers: Vec<Arc<Texture>>) -> Self {
        self.color_buffers = buffers;
        self
    }

    /// Attach a depth texture instead of an allocated depth buffer.
    pub fn with_depth_buffer(mut self, depth: Arc<Texture>) -> Self {
        self.depth_buffer = Some(depth);
        self.depth = true;
        self
    }

    /// Enable or disable the allocated depth buffer.
    pub fn with_depth(mut self, depth: bool) -> Self {
        self.depth = depth;
        self
    }

    /// Include a stencil component.
    pub fn with_stencil(mut self, stencil: bool) -> Self {
        self.stencil = stencil;
        self
    }

    /// Set the multisample count.
    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples.max(1);
        self
    }

    /// Control automatic resolve at the end of a render block.
    pub fn with_auto_resolve(mut self, auto_resolve: bool) -> Self {
        self.auto_resolve = auto_resolve;
        self
    }
}

/// A multisampled source framebuffer and its single-sampled resolve
/// destination for one color attachment. Exists only when MRT and
/// multisampling are combined.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FramebufferPair {
    pub msaa: FramebufferId,
    pub resolve: FramebufferId,
}

/// Key into the device's shared multisampled depth buffer cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct MsaaDepthKey {
    pub width: u32,
    pub height: u32,
    pub internal_format: u32,
    pub samples: u32,
}

/// A logical render target.
pub struct RenderTarget {
    descriptor: RenderTargetDescriptor,
    state: Mutex<RenderTargetState>,
}

#[derive(Debug, Default)]
pub(crate) struct RenderTargetState {
    pub platform: RenderTargetPlatform,
}

impl RenderTarget {
    pub(crate) fn new(descriptor: RenderTargetDescriptor) -> Self {
        Self {
            descriptor,
            state: Mutex::new(RenderTargetState::default()),
        }
    }

    /// The descriptor the target was created with.
    pub fn descriptor(&self) -> &RenderTargetDescriptor {
        &self.descriptor
    }

    /// Target name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Width in pixels, taken from the first attachment.
    pub fn width(&self) -> u32 {
        self.descriptor
            .color_buffers
            .first()
            .or(self.descriptor.depth_buffer.as_ref())
            .map(|t| t.width())
            .unwrap_or(0)
    }

    /// Height in pixels, taken from the first attachment.
    pub fn height(&self) -> u32 {
        self.descriptor
            .color_buffers
            .first()
            .or(self.descriptor.depth_buffer.as_ref())
            .map(|t| t.height())
            .unwrap_or(0)
    }

    /// Multisample count.
    pub fn samples(&self) -> u32 {
        self.descriptor.samples
    }

    /// True when the native framebuffers exist.
    pub fn is_initialized(&self) -> bool {
        self.state.lock().platform.initialized
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, RenderTargetState> {
        self.state.lock()
    }
}

impl std::fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTarget")
            .field("name", &self.descriptor.name)
            .field("colors", &self.descriptor.color_buffers.len())
            .field("samples", &self.descriptor.samples)
            .finish()
    }
}

// Ensure RenderTarget is Send + Sync
static_assertions::assert_impl_all!(RenderTarget: Send, Sync);

/// Native backing of a render target.
#[derive(Debug, Default)]
pub(crate) struct RenderTargetPlatform {
    pub initialized: bool,
    /// The framebuffer rendering happens into. Multisampled when the target
    /// requests MSAA.
    pub framebuffer: Option<FramebufferId>,
    /// The single-sampled resolve destination. This is the framebuffer that
    /// was created first; it is demoted to resolve duty when MSAA is set up.
    pub resolve_framebuffer: Option<FramebufferId>,
    /// Allocated single-sampled depth/stencil buffer.
    pub depth_renderbuffer: Option<RenderbufferId>,
    /// One multisampled color renderbuffer per color attachment.
    pub msaa_color_renderbuffers: Vec<RenderbufferId>,
    /// Own multisampled depth/stencil buffer (no depth texture supplied).
    pub msaa_depth_renderbuffer: Option<RenderbufferId>,
    /// Key into the device's shared multisampled depth buffer cache, used
    /// when a user-supplied depth texture needs a multisampled stand-in.
    pub shared_msaa_depth: Option<MsaaDepthKey>,
    /// Per-attachment resolve pairs, only under MRT + MSAA.
    pub pairs: Vec<FramebufferPair>,
    /// Completeness validation failed; draws into this target are undefined.
    pub failed: bool,
}

impl PlatformResource for RenderTargetPlatform {
    fn destroy(&mut self, gl: &dyn GlBackend) {
        for pair in self.pairs.drain(..) {
            gl.delete_framebuffer(pair.msaa);
            gl.delete_framebuffer(pair.resolve);
        }
        for rb in self.msaa_color_renderbuffers.drain(..) {
            gl.delete_renderbuffer(rb);
        }
        if let Some(rb) = self.msaa_depth_renderbuffer.take() {
            gl.delete_renderbuffer(rb);
        }
        if let Some(rb) = self.depth_renderbuffer.take() {
            gl.delete_renderbuffer(rb);
        }
        if let Some(fb) = self.resolve_framebuffer.take() {
            gl.delete_framebuffer(fb);
        }
        if let Some(fb) = self.framebuffer.take() {
            gl.delete_framebuffer(fb);
        }
        // shared depth buffers are released by the device cache
        self.shared_msaa_depth = None;
        self.initialized = false;
    }

    fn lose_context(&mut self) {
        self.framebuffer = None;
        self.resolve_framebuffer = None;
        self.depth_renderbuffer = None;
        self.msaa_color_renderbuffers.clear();
        self.msaa_depth_renderbuffer = None;
        self.shared_msaa_depth = None;
        self.pairs.clear();
        self.initialized = false;
        self.failed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PixelFormat, TextureDescriptor};

    fn color_texture(size: u32) -> Arc<Texture> {
        Arc::new(Texture::new(
            TextureDescriptor::new_2d(size, size, PixelFormat::Rgba8).with_mipmaps(false),
        ))
    }

    #[test]
    fn test_dimensions_from_first_attachment() {
        let target = RenderTarget::new(RenderTargetDescriptor::new("rt", color_texture(64)));
        assert_eq!(target.width(), 64);
        assert_eq!(target.height(), 64);
    }

    #[test]
    fn test_descriptor_builders() {
        let desc = RenderTargetDescriptor::new("rt", color_texture(32))
            .with_samples(4)
            .with_stencil(true)
            .with_auto_resolve(false);
        assert_eq!(desc.samples, 4);
        assert!(desc.stencil);
        assert!(!desc.auto_resolve);

        // samples are clamped to at least one
        let desc = RenderTargetDescriptor::new("rt", color_texture(32)).with_samples(0);
        assert_eq!(desc.samples, 1);
    }
}
