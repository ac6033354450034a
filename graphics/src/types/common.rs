//! Common types shared across the graphics system.

use bitflags::bitflags;
use vermilion_core::sampler::CompareFunction;

// ============================================================================
// Primitives
// ============================================================================

/// Primitive topology of a draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveType {
    /// Individual points.
    Points,
    /// Individual line segments.
    Lines,
    /// Connected line segments, closed back to the first vertex.
    LineLoop,
    /// Connected line segments.
    LineStrip,
    /// Individual triangles.
    #[default]
    Triangles,
    /// Connected strip of triangles.
    TriangleStrip,
    /// Fan of triangles sharing the first vertex.
    TriangleFan,
}

/// Description of one draw call over the currently bound buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Primitive {
    /// Topology to render.
    pub kind: PrimitiveType,
    /// Offset of the first index or vertex to dispatch.
    pub base: u32,
    /// Number of indices or vertices to dispatch.
    pub count: u32,
    /// Read the currently set index buffer instead of raw vertex order.
    pub indexed: bool,
}

impl Primitive {
    /// A non-indexed triangle list.
    pub fn triangles(base: u32, count: u32) -> Self {
        Self {
            kind: PrimitiveType::Triangles,
            base,
            count,
            indexed: false,
        }
    }

    /// An indexed triangle list.
    pub fn indexed_triangles(base: u32, count: u32) -> Self {
        Self {
            kind: PrimitiveType::Triangles,
            base,
            count,
            indexed: true,
        }
    }

    /// A non-indexed triangle strip.
    pub fn triangle_strip(base: u32, count: u32) -> Self {
        Self {
            kind: PrimitiveType::TriangleStrip,
            base,
            count,
            indexed: false,
        }
    }
}

/// Rectangle in pixel coordinates, used for viewports and scissors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    /// X coordinate of the lower-left corner.
    pub x: i32,
    /// Y coordinate of the lower-left corner.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Create a new rectangle.
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a rectangle from dimensions with origin at (0, 0).
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }
}

// ============================================================================
// Face culling
// ============================================================================

/// Triangle face culling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// No culling.
    None,
    /// Cull back faces.
    #[default]
    Back,
    /// Cull front faces.
    Front,
    /// Cull both faces (only points and lines are rasterized).
    FrontAndBack,
}

// ============================================================================
// Blending
// ============================================================================

/// Blend factor applied to source or destination color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// Factor of zero.
    Zero,
    /// Factor of one.
    One,
    /// Source color.
    SrcColor,
    /// One minus source color.
    OneMinusSrcColor,
    /// Destination color.
    DstColor,
    /// One minus destination color.
    OneMinusDstColor,
    /// Source alpha.
    SrcAlpha,
    /// Source alpha, clamped against destination alpha.
    SrcAlphaSaturate,
    /// One minus source alpha.
    OneMinusSrcAlpha,
    /// Destination alpha.
    DstAlpha,
    /// One minus destination alpha.
    OneMinusDstAlpha,
}

/// Blend equation combining source and destination terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendEquation {
    /// Source plus destination.
    #[default]
    Add,
    /// Source minus destination.
    Subtract,
    /// Destination minus source.
    ReverseSubtract,
    /// Component-wise minimum.
    Min,
    /// Component-wise maximum.
    Max,
}

/// Complete blend configuration.
///
/// The device only issues the native calls for the pieces that actually
/// changed against its cached state, so setting an identical state twice is
/// free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    /// Whether blending is enabled.
    pub enabled: bool,
    /// Blend equation for the color channels.
    pub equation: BlendEquation,
    /// Blend equation for the alpha channel.
    pub alpha_equation: BlendEquation,
    /// Source factor for the color channels.
    pub src: BlendFactor,
    /// Destination factor for the color channels.
    pub dst: BlendFactor,
    /// Source factor for the alpha channel.
    pub src_alpha: BlendFactor,
    /// Destination factor for the alpha channel.
    pub dst_alpha: BlendFactor,
}

impl BlendState {
    /// Classic alpha blending: `src * srcAlpha + dst * (1 - srcAlpha)`.
    pub fn alpha() -> Self {
        Self {
            enabled: true,
            src: BlendFactor::SrcAlpha,
            dst: BlendFactor::OneMinusSrcAlpha,
            src_alpha: BlendFactor::SrcAlpha,
            dst_alpha: BlendFactor::OneMinusSrcAlpha,
            ..Default::default()
        }
    }

    /// Additive blending.
    pub fn additive() -> Self {
        Self {
            enabled: true,
            src: BlendFactor::One,
            dst: BlendFactor::One,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::One,
            ..Default::default()
        }
    }

    /// True when color and alpha use different factors.
    pub fn separate_func(&self) -> bool {
        self.src != self.src_alpha || self.dst != self.dst_alpha
    }

    /// True when color and alpha use different equations.
    pub fn separate_equation(&self) -> bool {
        self.equation != self.alpha_equation
    }
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            enabled: false,
            equation: BlendEquation::Add,
            alpha_equation: BlendEquation::Add,
            src: BlendFactor::One,
            dst: BlendFactor::Zero,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
        }
    }
}

// ============================================================================
// Depth
// ============================================================================

/// Depth test and write configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    /// Whether the depth test is enabled.
    pub test: bool,
    /// Depth comparison function.
    pub func: CompareFunction,
    /// Whether depth writes are enabled.
    pub write: bool,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test: true,
            func: CompareFunction::LessEqual,
            write: true,
        }
    }
}

// ============================================================================
// Stencil
// ============================================================================

/// Operation applied to the stencil buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOp {
    /// Keep the current value.
    #[default]
    Keep,
    /// Set the value to zero.
    Zero,
    /// Replace the value with the reference value.
    Replace,
    /// Increment the value, clamping at the maximum.
    Increment,
    /// Increment the value, wrapping to zero.
    IncrementWrap,
    /// Decrement the value, clamping at zero.
    Decrement,
    /// Decrement the value, wrapping to the maximum.
    DecrementWrap,
    /// Bitwise invert the value.
    Invert,
}

/// Per-face stencil configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFace {
    /// Comparison function.
    pub func: CompareFunction,
    /// Reference value for the comparison.
    pub ref_value: u32,
    /// Mask applied to both reference and stored value before comparing.
    pub read_mask: u32,
    /// Operation when the stencil test fails.
    pub fail: StencilOp,
    /// Operation when the stencil test passes but the depth test fails.
    pub zfail: StencilOp,
    /// Operation when both tests pass.
    pub zpass: StencilOp,
    /// Bit mask controlling which stencil bits are written.
    pub write_mask: u32,
}

impl Default for StencilFace {
    fn default() -> Self {
        Self {
            func: CompareFunction::Always,
            ref_value: 0,
            read_mask: 0xFF,
            fail: StencilOp::Keep,
            zfail: StencilOp::Keep,
            zpass: StencilOp::Keep,
            write_mask: 0xFF,
        }
    }
}

/// Complete stencil configuration for front and back faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StencilState {
    /// Whether the stencil test is enabled.
    pub enabled: bool,
    /// Front-face configuration.
    pub front: StencilFace,
    /// Back-face configuration.
    pub back: StencilFace,
}

impl StencilState {
    /// True when front and back faces share an identical configuration.
    pub fn is_uniform(&self) -> bool {
        self.front == self.back
    }
}

// ============================================================================
// Clearing
// ============================================================================

bitflags! {
    /// Buffers affected by a clear operation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        /// Clear the color buffer.
        const COLOR = 1 << 0;
        /// Clear the depth buffer.
        const DEPTH = 1 << 1;
        /// Clear the stencil buffer.
        const STENCIL = 1 << 2;
    }
}

impl Default for ClearFlags {
    fn default() -> Self {
        Self::COLOR | Self::DEPTH
    }
}

/// Options controlling a clear operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearOptions {
    /// Color to clear the color buffer to.
    pub color: [f32; 4],
    /// Depth value to clear the depth buffer to.
    pub depth: f32,
    /// Stencil value to clear the stencil buffer to.
    pub stencil: u32,
    /// Which buffers to clear.
    pub flags: ClearFlags,
}

impl Default for ClearOptions {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.0, 1.0],
            depth: 1.0,
            stencil: 0,
            flags: ClearFlags::default(),
        }
    }
}

impl ClearOptions {
    /// Clear only the color buffer to the given color.
    pub fn color_only(color: [f32; 4]) -> Self {
        Self {
            color,
            flags: ClearFlags::COLOR,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_state_separate_detection() {
        let state = BlendState::alpha();
        assert!(!state.separate_func());

        let state = BlendState {
            src_alpha: BlendFactor::One,
            ..BlendState::alpha()
        };
        assert!(state.separate_func());
    }

    #[test]
    fn test_default_clear_flags() {
        let options = ClearOptions::default();
        assert!(options.flags.contains(ClearFlags::COLOR));
        assert!(options.flags.contains(ClearFlags::DEPTH));
        assert!(!options.flags.contains(ClearFlags::STENCIL));
    }

    #[test]
    fn test_stencil_uniform() {
        let state = StencilState::default();
        assert!(state.is_uniform());

        let state = StencilState {
            front: StencilFace {
                ref_value: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(!state.is_uniform());
    }
}
