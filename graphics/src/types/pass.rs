//! Render pass descriptions.

/// Load/store operations for one color attachment over a render pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorOps {
    /// Clear the attachment to this color at pass start.
    pub clear: Option<[f32; 4]>,
    /// Keep the attachment contents after the pass. When false (and no
    /// resolve is requested) the attachment is invalidated at pass end.
    pub store: bool,
    /// Resolve the multisampled attachment at pass end.
    pub resolve: bool,
    /// Regenerate the attachment's mip chain at pass end.
    pub mipmaps: bool,
}

impl Default for ColorOps {
    fn default() -> Self {
        Self {
            clear: None,
            store: true,
            resolve: true,
            mipmaps: false,
        }
    }
}

impl ColorOps {
    /// Clear to the given color, keep the result.
    pub fn clear_to(color: [f32; 4]) -> Self {
        Self {
            clear: Some(color),
            ..Default::default()
        }
    }
}

/// Load/store operations for the depth/stencil attachment over a render pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilOps {
    /// Clear depth to this value at pass start.
    pub clear_depth: Option<f32>,
    /// Clear stencil to this value at pass start.
    pub clear_stencil: Option<u32>,
    /// Keep depth contents after the pass.
    pub store_depth: bool,
    /// Keep stencil contents after the pass.
    pub store_stencil: bool,
}

impl Default for DepthStencilOps {
    fn default() -> Self {
        Self {
            clear_depth: Some(1.0),
            clear_stencil: None,
            store_depth: false,
            store_stencil: false,
        }
    }
}

/// Description of one render pass: a group of draws sharing a single target.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDesc {
    /// Pass name used in diagnostics.
    pub name: String,
    /// Per-color-attachment operations, index-aligned with the target's
    /// color buffers. A pass rendering to the backbuffer uses index 0.
    pub color_ops: Vec<ColorOps>,
    /// Depth/stencil operations.
    pub depth_stencil_ops: DepthStencilOps,
}

impl RenderPassDesc {
    /// Create a pass description with a single color attachment.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color_ops: vec![ColorOps::default()],
            depth_stencil_ops: DepthStencilOps::default(),
        }
    }

    /// Replace the color operations list.
    pub fn with_color_ops(mut self, ops: Vec<ColorOps>) -> Self {
        self.color_ops = ops;
        self
    }

    /// Replace the depth/stencil operations.
    pub fn with_depth_stencil_ops(mut self, ops: DepthStencilOps) -> Self {
        self.depth_stencil_ops = ops;
        self
    }
}
