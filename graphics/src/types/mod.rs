//! Shared type definitions for the graphics system.

pub mod buffer;
pub mod common;
pub mod pass;
pub mod texture;
pub mod vertex;

pub use buffer::{BufferTarget, BufferUsage, IndexFormat};
pub use common::{
    BlendEquation, BlendFactor, BlendState, ClearFlags, ClearOptions, CullMode, DepthState,
    Primitive, PrimitiveType, Rect, StencilFace, StencilOp, StencilState,
};
pub use pass::{ColorOps, DepthStencilOps, RenderPassDesc};
pub use texture::{PixelFormat, TextureDescriptor};
pub use vertex::{PlacedElement, VertexDataType, VertexElement, VertexFormat, VertexSemantic};

// Re-export CPU-side types from core so collaborators need a single import
// path for descriptor building.
pub use vermilion_core::sampler::{AddressMode, CompareFunction, CpuSampler, FilterMode};
pub use vermilion_core::texture::{CpuImage, TextureDimension};
