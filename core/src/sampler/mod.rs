//! CPU-side sampler types.
//!
//! Provides [`CpuSampler`], the format-agnostic description of how a
//! texture is sampled, plus the [`FilterMode`], [`AddressMode`], and
//! [`CompareFunction`] enums shared between CPU and GPU code.

mod types;

pub use types::{AddressMode, CompareFunction, CpuSampler, FilterMode};
