//! # Vermilion Graphics
//!
//! Graphics device layer for the Vermilion engine: a stateful wrapper over
//! an immediate-mode GPU API.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`GraphicsDevice`] - the state machine tying resources, shadow state
//!   and draw submission together
//! - [`backend::GlBackend`] - trait for native backend implementations,
//!   with a recording [`DummyBackend`] for tests and development
//! - [`resources`] - logical buffers, textures, shaders and render targets
//!   with lazily created native backings that survive context loss
//!
//! The device keeps a shadow copy of all driver state and only issues a
//! native call when the requested value differs from the cached one;
//! setting an already current state is free.
//!
//! ## Example
//!
//! ```ignore
//! use vermilion_graphics::{backend::DummyBackend, GraphicsDevice};
//!
//! let backend = std::sync::Arc::new(DummyBackend::new());
//! let mut device = GraphicsDevice::new(backend, 1280, 720)?;
//!
//! let shader = device.create_shader(definition);
//! device.set_shader(&shader);
//! device.set_vertex_buffer(&quad);
//! device.draw(&Primitive::triangle_strip(0, 4), 0, false);
//! ```

pub mod backend;
pub mod device;
pub mod error;
pub mod readback;
pub mod resources;
pub mod types;
pub mod uniforms;

mod vao;

// Re-export main types for convenience
pub use backend::{DummyBackend, GlBackend};
pub use device::{Capabilities, DeviceEvent, GraphicsDevice, VramStats};
pub use error::GraphicsError;
pub use readback::{PixelReadback, ReadbackStatus};
pub use resources::{
    Buffer, RenderTarget, RenderTargetDescriptor, Shader, ShaderDefinition, ShaderStatus, Texture,
    TextureSource,
};
pub use types::{
    BlendState, BufferUsage, ClearFlags, ClearOptions, CullMode, DepthState, IndexFormat,
    PixelFormat, Primitive, PrimitiveType, Rect, RenderPassDesc, StencilState, TextureDescriptor,
    VertexElement, VertexFormat, VertexSemantic,
};
pub use uniforms::{UniformScope, UniformSlot, UniformValue};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_backend_name() {
        let backend = DummyBackend::new();
        assert_eq!(backend.name(), "Dummy");
    }
}
