//! GPU backend abstraction layer.
//!
//! This module defines [`GlBackend`], the trait every native backend
//! implements: a thin, immediate-mode command surface shaped after the GL
//! family of APIs. The graphics device issues calls through this trait and
//! keeps its own shadow copy of native state so that redundant calls never
//! reach the driver.
//!
//! # Available Backends
//!
//! - [`dummy`] (default): recording no-op backend for testing and
//!   development. Every call is logged and counted, which is what the test
//!   suite asserts against.
//!
//! Real driver backends live out of tree; anything that can satisfy this
//! trait (and the handle semantics below) can sit underneath the device.
//!
//! # Handle semantics
//!
//! All handles are opaque, non-zero identifiers minted by the backend. A
//! handle stays valid until the matching `delete_*` call or until the
//! context is lost, after which the device forgets handles without deleting
//! them (they are already invalid driver-side).

pub mod consts;
pub mod dummy;

pub use dummy::DummyBackend;

// ============================================================================
// Handles
// ============================================================================

macro_rules! backend_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub u32);
    };
}

backend_handle!(
    /// Handle to a native buffer object.
    BufferId
);
backend_handle!(
    /// Handle to a native texture object.
    TextureId
);
backend_handle!(
    /// Handle to a native renderbuffer object.
    RenderbufferId
);
backend_handle!(
    /// Handle to a native framebuffer object.
    FramebufferId
);
backend_handle!(
    /// Handle to one compiled shader stage.
    ShaderStageId
);
backend_handle!(
    /// Handle to a linked shader program.
    ProgramId
);
backend_handle!(
    /// Handle to a vertex array object.
    VaoId
);
backend_handle!(
    /// Handle to a fence inserted into the command stream.
    FenceId
);

/// Location of a uniform within a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub i32);

/// Result of a non-blocking fence wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// The fence was already signaled when the wait was issued.
    AlreadySignaled,
    /// The fence signaled during the wait.
    ConditionSatisfied,
    /// The wait timed out before the fence signaled.
    TimeoutExpired,
    /// The wait failed; the fence is unusable.
    WaitFailed,
}

impl SyncStatus {
    /// True when the fence has signaled.
    pub fn is_signaled(&self) -> bool {
        matches!(self, Self::AlreadySignaled | Self::ConditionSatisfied)
    }
}

/// Active attribute or uniform reported by program introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderVariableInfo {
    /// Variable name as declared in the source.
    pub name: String,
    /// Native type constant (e.g. [`consts::FLOAT_VEC4`]).
    pub gl_type: u32,
    /// Array element count; 1 for non-arrays.
    pub array_size: u32,
}

// ============================================================================
// Capabilities and extensions
// ============================================================================

/// Device limits queried from the native context.
///
/// Queried once at construction and re-queried after every context
/// restoration, since a restored context may land on a different adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCapabilities {
    /// Maximum 2D texture dimension.
    pub max_texture_size: u32,
    /// Maximum cube map face dimension.
    pub max_cube_map_size: u32,
    /// Maximum renderbuffer dimension.
    pub max_renderbuffer_size: u32,
    /// Maximum 3D texture dimension.
    pub max_3d_texture_size: u32,
    /// Texture units available to the fragment stage.
    pub max_fragment_textures: u32,
    /// Texture units available across all stages combined.
    pub max_combined_textures: u32,
    /// Texture units available to the vertex stage.
    pub max_vertex_textures: u32,
    /// Uniform vectors available to the vertex stage.
    pub max_vertex_uniform_vectors: u32,
    /// Uniform vectors available to the fragment stage.
    pub max_fragment_uniform_vectors: u32,
    /// Maximum simultaneous draw buffers.
    pub max_draw_buffers: u32,
    /// Maximum color attachments on one framebuffer.
    pub max_color_attachments: u32,
    /// Maximum multisample count.
    pub max_samples: u32,
    /// Unmasked renderer string, empty if unavailable.
    pub renderer: String,
    /// Unmasked vendor string, empty if unavailable.
    pub vendor: String,
}

impl Default for RawCapabilities {
    fn default() -> Self {
        Self {
            max_texture_size: 4096,
            max_cube_map_size: 4096,
            max_renderbuffer_size: 4096,
            max_3d_texture_size: 256,
            max_fragment_textures: 16,
            max_combined_textures: 32,
            max_vertex_textures: 4,
            max_vertex_uniform_vectors: 256,
            max_fragment_uniform_vectors: 224,
            max_draw_buffers: 8,
            max_color_attachments: 8,
            max_samples: 4,
            renderer: String::new(),
            vendor: String::new(),
        }
    }
}

/// Native constants for the S3TC block compression capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct S3tcConstants {
    pub compressed_rgb_dxt1: u32,
    pub compressed_rgba_dxt3: u32,
    pub compressed_rgba_dxt5: u32,
}

/// Native constants for the ETC1 block compression capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Etc1Constants {
    pub compressed_rgb_etc1: u32,
}

/// Native constants for the ETC2 block compression capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Etc2Constants {
    pub compressed_rgb8_etc2: u32,
    pub compressed_rgba8_etc2_eac: u32,
}

/// Native constants for the PVRTC block compression capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PvrtcConstants {
    pub compressed_rgb_2bpp: u32,
    pub compressed_rgba_2bpp: u32,
    pub compressed_rgb_4bpp: u32,
    pub compressed_rgba_4bpp: u32,
}

/// Native constants for the ASTC block compression capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AstcConstants {
    pub compressed_rgba_4x4: u32,
}

/// Native constants for the ATC block compression capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtcConstants {
    pub compressed_rgb: u32,
    pub compressed_rgba_interpolated: u32,
}

/// Native constants for the anisotropic filtering capability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnisotropyConstants {
    /// The `tex_parameter_f` parameter name for max anisotropy.
    pub texture_max_anisotropy: u32,
    /// Largest anisotropy value the device accepts.
    pub max_anisotropy: f32,
}

/// Optional native capabilities and their extension constants.
///
/// A `None` entry means the capability is absent on this device; formats or
/// features that need it must fail fast at resource-initialization time
/// rather than at draw time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extensions {
    /// S3TC (DXT) compressed texture support.
    pub compressed_s3tc: Option<S3tcConstants>,
    /// ETC1 compressed texture support.
    pub compressed_etc1: Option<Etc1Constants>,
    /// ETC2 compressed texture support.
    pub compressed_etc2: Option<Etc2Constants>,
    /// PVRTC compressed texture support.
    pub compressed_pvrtc: Option<PvrtcConstants>,
    /// ASTC compressed texture support.
    pub compressed_astc: Option<AstcConstants>,
    /// ATC compressed texture support.
    pub compressed_atc: Option<AtcConstants>,
    /// Anisotropic filtering support.
    pub anisotropy: Option<AnisotropyConstants>,
    /// Float texture sampling.
    pub texture_float: bool,
    /// Half-float texture sampling.
    pub texture_half_float: bool,
    /// Linear filtering of float textures.
    pub texture_float_linear: bool,
    /// Rendering into float color attachments.
    pub color_buffer_float: bool,
    /// Rendering into half-float color attachments.
    pub color_buffer_half_float: bool,
    /// 32-bit index buffer support.
    pub uint_element: bool,
}

// ============================================================================
// Backend trait
// ============================================================================

/// The immediate-mode native GPU API.
///
/// Methods take `&self`: driver handles are interior state of the backend
/// and the device holds the only reference. None of these calls report
/// errors; failures at this level are detected through the explicit status
/// queries (`get_shader_compile_status`, `check_framebuffer_status`, fence
/// waits) per the no-exceptions-at-the-hardware-boundary contract.
pub trait GlBackend {
    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Query device limits.
    fn capabilities(&self) -> RawCapabilities;

    /// Query optional capabilities and their native constants.
    fn extensions(&self) -> Extensions;

    // --- Buffers ---

    /// Create a buffer object.
    fn create_buffer(&self) -> BufferId;
    /// Delete a buffer object.
    fn delete_buffer(&self, buffer: BufferId);
    /// Bind a buffer to a target, or unbind with `None`.
    fn bind_buffer(&self, target: u32, buffer: Option<BufferId>);
    /// Allocate storage for the bound buffer and upload `data`.
    fn buffer_data(&self, target: u32, data: &[u8], usage: u32);
    /// Allocate `size` bytes of uninitialized storage for the bound buffer.
    fn buffer_data_size(&self, target: u32, size: usize, usage: u32);
    /// Upload `data` into the bound buffer at `offset` without reallocating.
    fn buffer_sub_data(&self, target: u32, offset: usize, data: &[u8]);
    /// Read back a byte range of the bound buffer.
    fn get_buffer_sub_data(&self, target: u32, offset: usize, dest: &mut [u8]);

    // --- Textures ---

    /// Create a texture object.
    fn create_texture(&self) -> TextureId;
    /// Delete a texture object.
    fn delete_texture(&self, texture: TextureId);
    /// Select the active texture unit.
    fn active_texture(&self, unit: u32);
    /// Bind a texture to a target on the active unit.
    fn bind_texture(&self, target: u32, texture: TextureId);
    /// Set an integer sampler parameter on the bound texture.
    fn tex_parameter_i(&self, target: u32, pname: u32, value: i32);
    /// Set a float sampler parameter on the bound texture.
    fn tex_parameter_f(&self, target: u32, pname: u32, value: f32);
    /// Upload a full 2D mip level. `None` data allocates uninitialized.
    #[allow(clippy::too_many_arguments)]
    fn tex_image_2d(
        &self,
        target: u32,
        level: u32,
        internal_format: u32,
        width: u32,
        height: u32,
        format: u32,
        component_type: u32,
        data: Option<&[u8]>,
    );
    /// Update a sub-region of an existing 2D mip level.
    #[allow(clippy::too_many_arguments)]
    fn tex_sub_image_2d(
        &self,
        target: u32,
        level: u32,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        format: u32,
        component_type: u32,
        data: &[u8],
    );
    /// Upload a full compressed 2D mip level.
    #[allow(clippy::too_many_arguments)]
    fn compressed_tex_image_2d(
        &self,
        target: u32,
        level: u32,
        internal_format: u32,
        width: u32,
        height: u32,
        data: &[u8],
    );
    /// Upload a full 3D/array mip level. `None` data allocates uninitialized.
    #[allow(clippy::too_many_arguments)]
    fn tex_image_3d(
        &self,
        target: u32,
        level: u32,
        internal_format: u32,
        width: u32,
        height: u32,
        depth: u32,
        format: u32,
        component_type: u32,
        data: Option<&[u8]>,
    );
    /// Upload a full compressed 3D/array mip level.
    #[allow(clippy::too_many_arguments)]
    fn compressed_tex_image_3d(
        &self,
        target: u32,
        level: u32,
        internal_format: u32,
        width: u32,
        height: u32,
        depth: u32,
        data: &[u8],
    );
    /// Generate the mip chain for the bound texture from level 0.
    fn generate_mipmap(&self, target: u32);
    /// Set vertical flip for subsequent unpacked uploads.
    fn pixel_store_flip_y(&self, flip: bool);
    /// Set alpha premultiplication for subsequent unpacked uploads.
    fn pixel_store_premultiply_alpha(&self, premultiply: bool);

    // --- Shaders and programs ---

    /// Create a shader stage object of the given kind.
    fn create_shader(&self, stage: u32) -> ShaderStageId;
    /// Delete a shader stage object.
    fn delete_shader(&self, shader: ShaderStageId);
    /// Attach source code to a shader stage.
    fn shader_source(&self, shader: ShaderStageId, source: &str);
    /// Compile a shader stage.
    fn compile_shader(&self, shader: ShaderStageId);
    /// Query compile success of a shader stage.
    fn get_shader_compile_status(&self, shader: ShaderStageId) -> bool;
    /// Fetch the driver's compile log for a shader stage.
    fn get_shader_info_log(&self, shader: ShaderStageId) -> String;
    /// Create a program object.
    fn create_program(&self) -> ProgramId;
    /// Delete a program object.
    fn delete_program(&self, program: ProgramId);
    /// Attach a compiled stage to a program.
    fn attach_shader(&self, program: ProgramId, shader: ShaderStageId);
    /// Bind a vertex attribute name to a fixed slot. Must precede linking.
    fn bind_attrib_location(&self, program: ProgramId, location: u32, name: &str);
    /// Register transform feedback varyings. Must precede linking.
    fn transform_feedback_varyings(&self, program: ProgramId, names: &[String], interleaved: bool);
    /// Link a program.
    fn link_program(&self, program: ProgramId);
    /// Query link success of a program.
    fn get_program_link_status(&self, program: ProgramId) -> bool;
    /// Fetch the driver's link log for a program.
    fn get_program_info_log(&self, program: ProgramId) -> String;
    /// List active vertex attributes of a linked program.
    fn get_active_attributes(&self, program: ProgramId) -> Vec<ShaderVariableInfo>;
    /// List active uniforms of a linked program.
    fn get_active_uniforms(&self, program: ProgramId) -> Vec<ShaderVariableInfo>;
    /// Look up a uniform location by name.
    fn get_uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;
    /// Select the program for subsequent draws, or unbind with `None`.
    fn use_program(&self, program: Option<ProgramId>);

    // --- Uniform upload ---

    /// Upload a single integer (also services bools and samplers).
    fn uniform1i(&self, location: UniformLocation, value: i32);
    /// Upload an integer array.
    fn uniform1iv(&self, location: UniformLocation, values: &[i32]);
    /// Upload a single float.
    fn uniform1f(&self, location: UniformLocation, value: f32);
    /// Upload a float array.
    fn uniform1fv(&self, location: UniformLocation, values: &[f32]);
    /// Upload vec2 data.
    fn uniform2fv(&self, location: UniformLocation, values: &[f32]);
    /// Upload vec3 data.
    fn uniform3fv(&self, location: UniformLocation, values: &[f32]);
    /// Upload vec4 data.
    fn uniform4fv(&self, location: UniformLocation, values: &[f32]);
    /// Upload ivec2 data.
    fn uniform2iv(&self, location: UniformLocation, values: &[i32]);
    /// Upload ivec3 data.
    fn uniform3iv(&self, location: UniformLocation, values: &[i32]);
    /// Upload ivec4 data.
    fn uniform4iv(&self, location: UniformLocation, values: &[i32]);
    /// Upload a 2x2 matrix.
    fn uniform_matrix2fv(&self, location: UniformLocation, values: &[f32]);
    /// Upload a 3x3 matrix.
    fn uniform_matrix3fv(&self, location: UniformLocation, values: &[f32]);
    /// Upload one or more 4x4 matrices.
    fn uniform_matrix4fv(&self, location: UniformLocation, values: &[f32]);

    // --- Vertex arrays ---

    /// Create a vertex array object.
    fn create_vertex_array(&self) -> VaoId;
    /// Delete a vertex array object.
    fn delete_vertex_array(&self, vao: VaoId);
    /// Bind a vertex array object, or unbind with `None`.
    fn bind_vertex_array(&self, vao: Option<VaoId>);
    /// Enable an attribute slot in the bound VAO.
    fn enable_vertex_attrib_array(&self, location: u32);
    /// Describe attribute data sourced from the bound array buffer.
    #[allow(clippy::too_many_arguments)]
    fn vertex_attrib_pointer(
        &self,
        location: u32,
        components: u32,
        data_type: u32,
        normalized: bool,
        stride: u32,
        offset: u32,
    );
    /// Set the instancing divisor of an attribute slot.
    fn vertex_attrib_divisor(&self, location: u32, divisor: u32);

    // --- Framebuffers and renderbuffers ---

    /// Create a framebuffer object.
    fn create_framebuffer(&self) -> FramebufferId;
    /// Delete a framebuffer object.
    fn delete_framebuffer(&self, framebuffer: FramebufferId);
    /// Bind a framebuffer, or bind the backbuffer with `None`.
    fn bind_framebuffer(&self, target: u32, framebuffer: Option<FramebufferId>);
    /// Attach a texture mip level to the bound framebuffer.
    fn framebuffer_texture_2d(
        &self,
        target: u32,
        attachment: u32,
        tex_target: u32,
        texture: TextureId,
        level: u32,
    );
    /// Attach a renderbuffer to the bound framebuffer.
    fn framebuffer_renderbuffer(&self, target: u32, attachment: u32, renderbuffer: RenderbufferId);
    /// Create a renderbuffer object.
    fn create_renderbuffer(&self) -> RenderbufferId;
    /// Delete a renderbuffer object.
    fn delete_renderbuffer(&self, renderbuffer: RenderbufferId);
    /// Bind a renderbuffer, or unbind with `None`.
    fn bind_renderbuffer(&self, renderbuffer: Option<RenderbufferId>);
    /// Allocate single-sampled renderbuffer storage.
    fn renderbuffer_storage(&self, internal_format: u32, width: u32, height: u32);
    /// Allocate multisampled renderbuffer storage.
    fn renderbuffer_storage_multisample(
        &self,
        samples: u32,
        internal_format: u32,
        width: u32,
        height: u32,
    );
    /// Validate the bound framebuffer's attachment configuration.
    fn check_framebuffer_status(&self, target: u32) -> u32;
    /// Copy a region between the bound read and draw framebuffers.
    #[allow(clippy::too_many_arguments)]
    fn blit_framebuffer(
        &self,
        src_x0: i32,
        src_y0: i32,
        src_x1: i32,
        src_y1: i32,
        dst_x0: i32,
        dst_y0: i32,
        dst_x1: i32,
        dst_y1: i32,
        mask: u32,
        filter: u32,
    );
    /// Hint that attachments of the bound framebuffer may be discarded.
    fn invalidate_framebuffer(&self, target: u32, attachments: &[u32]);

    // --- Render state ---

    /// Enable a state capability.
    fn enable(&self, capability: u32);
    /// Disable a state capability.
    fn disable(&self, capability: u32);
    /// Set blend factors for color and alpha together.
    fn blend_func(&self, src: u32, dst: u32);
    /// Set blend factors separately for color and alpha.
    fn blend_func_separate(&self, src: u32, dst: u32, src_alpha: u32, dst_alpha: u32);
    /// Set the blend equation for color and alpha together.
    fn blend_equation(&self, equation: u32);
    /// Set blend equations separately for color and alpha.
    fn blend_equation_separate(&self, equation: u32, alpha_equation: u32);
    /// Set the color channel write mask.
    fn color_mask(&self, r: bool, g: bool, b: bool, a: bool);
    /// Set the depth comparison function.
    fn depth_func(&self, func: u32);
    /// Enable or disable depth writes.
    fn depth_mask(&self, write: bool);
    /// Set the stencil function for both faces.
    fn stencil_func(&self, func: u32, reference: u32, mask: u32);
    /// Set the stencil function for one face.
    fn stencil_func_separate(&self, face: u32, func: u32, reference: u32, mask: u32);
    /// Set stencil operations for both faces.
    fn stencil_op(&self, fail: u32, zfail: u32, zpass: u32);
    /// Set stencil operations for one face.
    fn stencil_op_separate(&self, face: u32, fail: u32, zfail: u32, zpass: u32);
    /// Set the stencil write mask for both faces.
    fn stencil_mask(&self, mask: u32);
    /// Set the stencil write mask for one face.
    fn stencil_mask_separate(&self, face: u32, mask: u32);
    /// Select which faces are culled.
    fn cull_face(&self, mode: u32);
    /// Set the viewport rectangle.
    fn viewport(&self, x: i32, y: i32, width: u32, height: u32);
    /// Set the scissor rectangle.
    fn scissor(&self, x: i32, y: i32, width: u32, height: u32);
    /// Set the clear color.
    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32);
    /// Set the clear depth value.
    fn clear_depth(&self, depth: f32);
    /// Set the clear stencil value.
    fn clear_stencil(&self, stencil: u32);
    /// Clear the buffers selected by `mask`.
    fn clear(&self, mask: u32);
    /// Set the depth bias values.
    fn polygon_offset(&self, factor: f32, units: f32);

    // --- Draws ---

    /// Issue a non-indexed draw.
    fn draw_arrays(&self, mode: u32, first: u32, count: u32);
    /// Issue a non-indexed instanced draw.
    fn draw_arrays_instanced(&self, mode: u32, first: u32, count: u32, instances: u32);
    /// Issue an indexed draw; `offset` is in bytes into the index buffer.
    fn draw_elements(&self, mode: u32, count: u32, index_type: u32, offset: usize);
    /// Issue an indexed instanced draw.
    fn draw_elements_instanced(
        &self,
        mode: u32,
        count: u32,
        index_type: u32,
        offset: usize,
        instances: u32,
    );
    /// Begin transform feedback capture.
    fn begin_transform_feedback(&self, mode: u32);
    /// End transform feedback capture.
    fn end_transform_feedback(&self);
    /// Bind a buffer to an indexed binding point (transform feedback).
    fn bind_buffer_base(&self, target: u32, index: u32, buffer: Option<BufferId>);

    // --- Readback and synchronization ---

    /// Read pixels from the bound read framebuffer into `dest`.
    #[allow(clippy::too_many_arguments)]
    fn read_pixels(
        &self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        format: u32,
        component_type: u32,
        dest: &mut [u8],
    );
    /// Read pixels into the bound pixel-pack buffer at offset zero.
    fn read_pixels_to_pack_buffer(
        &self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        format: u32,
        component_type: u32,
    );
    /// Insert a fence into the command stream.
    fn fence_sync(&self) -> FenceId;
    /// Wait on a fence without blocking beyond `timeout_ns`.
    fn client_wait_sync(&self, fence: FenceId, timeout_ns: u64) -> SyncStatus;
    /// Delete a fence.
    fn delete_sync(&self, fence: FenceId);
    /// Flush pending commands to the driver.
    fn flush(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_status_signaled() {
        assert!(SyncStatus::AlreadySignaled.is_signaled());
        assert!(SyncStatus::ConditionSatisfied.is_signaled());
        assert!(!SyncStatus::TimeoutExpired.is_signaled());
        assert!(!SyncStatus::WaitFailed.is_signaled());
    }
}
