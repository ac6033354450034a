//! Logical GPU resources and their native backing objects.
//!
//! Every logical resource ([`Buffer`], [`Texture`], [`Shader`],
//! [`RenderTarget`]) is an engine-owned object holding exactly one platform
//! impl: the wrapper around the native handles. Platform impls are created
//! lazily on first use and destroyed/recreated independently of the logical
//! object across context loss; a logical resource with no live native
//! backing is uninitialized and re-initializes on next use.

pub mod buffer;
pub mod render_target;
pub mod shader;
pub mod texture;

pub use buffer::Buffer;
pub use render_target::{RenderTarget, RenderTargetDescriptor};
pub use shader::{Shader, ShaderDefinition, ShaderStatus};
pub use texture::{Texture, TextureSource};

use crate::backend::GlBackend;

/// Common lifecycle seam of the per-resource platform impls.
///
/// `destroy` releases native handles and is idempotent; `lose_context`
/// forgets them without releasing (they are already invalid driver-side).
pub trait PlatformResource {
    /// Release all native objects owned by this impl.
    fn destroy(&mut self, gl: &dyn GlBackend);

    /// Forget all native handles after a context loss.
    fn lose_context(&mut self);
}
