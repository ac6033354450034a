//! CPU-side texture types.
//!
//! Provides [`CpuImage`] for holding decoded image pixel data, along with
//! the [`TextureDimension`] enum shared between CPU and GPU code.

mod types;

pub use types::{CpuImage, TextureDimension};
