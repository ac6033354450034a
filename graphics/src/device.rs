//! Graphics device.
//!
//! The [`GraphicsDevice`] is the stateful integration point over the native
//! backend: it owns the shadow copy of all driver state, the texture
//! unit/slot table, the shader compile caches, the vertex array cache, and
//! the lifecycle of every native object. A native call is only issued when
//! the shadow state disagrees with the requested value; setting an already
//! current value is free. The device survives context loss by forgetting
//! native handles and rebuilding them from retained CPU-side data on
//! restore.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::backend::consts as gl;
use crate::backend::{
    Extensions, FramebufferId, GlBackend, ProgramId, RawCapabilities, RenderbufferId,
    ShaderStageId, TextureId, VaoId,
};
use crate::error::GraphicsError;
use crate::readback::{PixelReadback, ReadbackStatus};
use crate::resources::buffer::BufferState;
use crate::resources::render_target::{FramebufferPair, MsaaDepthKey, RenderTargetDescriptor};
use crate::resources::shader::{ShaderInput, ShaderState};
use crate::resources::texture::compare_to_native;
use crate::resources::{
    Buffer, PlatformResource, RenderTarget, Shader, ShaderDefinition, ShaderStatus, Texture,
};
use crate::types::{
    BlendState, BufferTarget, BufferUsage, ClearFlags, ClearOptions, CullMode, DepthState,
    IndexFormat, Primitive, PrimitiveType, Rect, RenderPassDesc, StencilState, TextureDescriptor,
    VertexDataType, VertexFormat,
};
use crate::uniforms::{UniformScope, UniformType, UniformValue};
use crate::vao::{vao_key, VaoCache};
use vermilion_core::texture::TextureDimension;

/// Lifecycle events observable on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The native context was lost; all native handles are invalid.
    Lost,
    /// The native context was restored; resources re-initialize lazily.
    Restored,
}

/// GPU memory accounting, updated around every native allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VramStats {
    /// Bytes held by textures.
    pub texture: u64,
    /// Bytes held by vertex buffers.
    pub vertex_buffer: u64,
    /// Bytes held by index buffers.
    pub index_buffer: u64,
}

impl VramStats {
    fn apply(counter: &mut u64, delta: i64) {
        if delta >= 0 {
            *counter += delta as u64;
        } else {
            *counter = counter.saturating_sub((-delta) as u64);
        }
    }
}

/// Cached pixel-unpack state, so uploads only touch the driver when the
/// flip/premultiply configuration actually changes.
#[derive(Debug, Default)]
pub struct UnpackCache {
    flip_y: bool,
    premultiply_alpha: bool,
}

impl UnpackCache {
    pub(crate) fn set_flip_y(&mut self, gl: &dyn GlBackend, flip: bool) {
        if self.flip_y != flip {
            gl.pixel_store_flip_y(flip);
            self.flip_y = flip;
        }
    }

    pub(crate) fn set_premultiply_alpha(&mut self, gl: &dyn GlBackend, premultiply: bool) {
        if self.premultiply_alpha != premultiply {
            gl.pixel_store_premultiply_alpha(premultiply);
            self.premultiply_alpha = premultiply;
        }
    }
}

/// Device limits and derived values.
///
/// Discovered once at construction and re-discovered after every context
/// restoration.
#[derive(Debug, Clone, PartialEq)]
pub struct Capabilities {
    /// Raw limits reported by the backend.
    pub raw: RawCapabilities,
    /// Largest anisotropy value usable on this device (1.0 = unsupported).
    pub max_anisotropy: f32,
    /// Bones addressable by a skinning shader, derived from the vertex
    /// uniform budget after reserving space for a typical heavyweight
    /// shader.
    pub bone_limit: u32,
    /// Rendering into float color attachments is possible.
    pub texture_float_renderable: bool,
    /// Rendering into half-float color attachments is possible.
    pub texture_half_float_renderable: bool,
}

impl Capabilities {
    fn derive(raw: RawCapabilities, extensions: &Extensions) -> Self {
        let mut uniforms = raw.max_vertex_uniform_vectors as i64;
        uniforms -= 4 * 4; // model/view/projection style matrices
        uniforms -= 8; // light positions
        uniforms -= 1; // eye position
        uniforms -= 4 * 4; // texture transforms
        let bone_limit = ((uniforms.max(0) / 3) as u32).min(128);

        Self {
            max_anisotropy: extensions
                .anisotropy
                .as_ref()
                .map(|a| a.max_anisotropy)
                .unwrap_or(1.0),
            bone_limit,
            texture_float_renderable: extensions.color_buffer_float,
            texture_half_float_renderable: extensions.color_buffer_half_float
                || extensions.color_buffer_float,
            raw,
        }
    }
}

#[derive(Debug)]
struct MsaaDepthEntry {
    renderbuffer: RenderbufferId,
    refs: u32,
}

/// The graphics device.
///
/// Exactly one logical thread owns the device and issues native calls; all
/// mutating operations take `&mut self` and no internal locking guards the
/// shadow state.
pub struct GraphicsDevice {
    gl: Arc<dyn GlBackend>,
    caps: Capabilities,
    extensions: Extensions,
    /// Uniform value namespace shared by all shaders on this device.
    pub scope: UniformScope,

    width: u32,
    height: u32,
    pending_resize: Option<(u32, u32)>,
    lost: bool,
    inside_render_pass: bool,

    // shadow render state
    blend: BlendState,
    depth: DepthState,
    stencil: StencilState,
    cull_mode: CullMode,
    viewport: Rect,
    scissor: Rect,
    color_write: [bool; 4],
    clear_color: [f32; 4],
    clear_depth: f32,
    clear_stencil: u32,
    depth_bias_enabled: bool,
    depth_bias: (f32, f32),
    alpha_to_coverage: bool,
    raster: bool,
    unpack: UnpackCache,

    // shadow binding state
    active_texture_unit: u32,
    /// Per unit: one slot per target kind (2D, cube, 3D, 2D array).
    texture_units: Vec<[Option<TextureId>; 4]>,
    /// `None` means the real binding is unknown and must be re-issued.
    bound_framebuffer: Option<Option<FramebufferId>>,
    current_program: Option<ProgramId>,
    bound_vao: Option<VaoId>,

    // bound resources
    shader: Option<Arc<Shader>>,
    vertex_buffers: Vec<Arc<Buffer>>,
    index_buffer: Option<Arc<Buffer>>,
    render_target: Option<Arc<RenderTarget>>,
    transform_feedback_buffer: Option<Arc<Buffer>>,

    // device-owned caches
    vertex_shader_cache: HashMap<String, ShaderStageId>,
    fragment_shader_cache: HashMap<String, ShaderStageId>,
    vao_cache: VaoCache,
    msaa_depth_cache: HashMap<MsaaDepthKey, MsaaDepthEntry>,

    // resource registries (weak; pruned opportunistically)
    shaders: Vec<Weak<Shader>>,
    buffers: Vec<Weak<Buffer>>,
    textures: Vec<Weak<Texture>>,
    targets: Vec<Weak<RenderTarget>>,

    observers: Vec<Box<dyn FnMut(DeviceEvent) + Send>>,
    vram: VramStats,
    draw_calls_per_frame: u32,
    next_resource_id: u64,
}

fn collect_live<T>(registry: &mut Vec<Weak<T>>) -> Vec<Arc<T>> {
    registry.retain(|weak| weak.strong_count() > 0);
    registry.iter().filter_map(Weak::upgrade).collect()
}

impl GraphicsDevice {
    /// Create a device over a native backend with the given backbuffer size.
    /// The backend is shared (`Arc`) so embedders and tests can keep a
    /// reference of their own.
    ///
    /// Fails only when the backend reports no usable limits at all; every
    /// later hardware-boundary failure degrades instead of erroring.
    pub fn new(gl: Arc<dyn GlBackend>, width: u32, height: u32) -> Result<Self, GraphicsError> {
        let raw = gl.capabilities();
        if raw.max_texture_size == 0 || raw.max_combined_textures == 0 {
            return Err(GraphicsError::InitializationFailed(format!(
                "backend '{}' reports no usable context",
                gl.name()
            )));
        }
        let extensions = gl.extensions();
        let caps = Capabilities::derive(raw, &extensions);

        log::info!(
            "GraphicsDevice: created over '{}' backend ({}x{}), renderer '{}'",
            gl.name(),
            width,
            height,
            caps.raw.renderer
        );

        let mut device = Self {
            gl,
            caps,
            extensions,
            scope: UniformScope::new(),
            width,
            height,
            pending_resize: None,
            lost: false,
            inside_render_pass: false,
            blend: BlendState::default(),
            depth: DepthState::default(),
            stencil: StencilState::default(),
            cull_mode: CullMode::Back,
            viewport: Rect::default(),
            scissor: Rect::default(),
            color_write: [true; 4],
            clear_color: [0.0; 4],
            clear_depth: 1.0,
            clear_stencil: 0,
            depth_bias_enabled: false,
            depth_bias: (0.0, 0.0),
            alpha_to_coverage: false,
            raster: true,
            unpack: UnpackCache::default(),
            active_texture_unit: 0,
            texture_units: Vec::new(),
            bound_framebuffer: None,
            current_program: None,
            bound_vao: None,
            shader: None,
            vertex_buffers: Vec::new(),
            index_buffer: None,
            render_target: None,
            transform_feedback_buffer: None,
            vertex_shader_cache: HashMap::new(),
            fragment_shader_cache: HashMap::new(),
            vao_cache: VaoCache::new(),
            msaa_depth_cache: HashMap::new(),
            shaders: Vec::new(),
            buffers: Vec::new(),
            textures: Vec::new(),
            targets: Vec::new(),
            observers: Vec::new(),
            vram: VramStats::default(),
            draw_calls_per_frame: 0,
            next_resource_id: 0,
        };
        device.initialize_render_state();
        device.initialize_context_caches();
        Ok(device)
    }

    /// Device capabilities.
    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Optional native capabilities.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// GPU memory accounting.
    pub fn vram(&self) -> VramStats {
        self.vram
    }

    /// True while the context is lost.
    pub fn is_lost(&self) -> bool {
        self.lost
    }

    /// Backbuffer width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Backbuffer height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Draw calls issued since the last `frame_start`.
    pub fn draw_call_count(&self) -> u32 {
        self.draw_calls_per_frame
    }

    /// Currently bound shader.
    pub fn shader(&self) -> Option<&Arc<Shader>> {
        self.shader.as_ref()
    }

    /// Currently active render target (`None` = backbuffer).
    pub fn render_target(&self) -> Option<&Arc<RenderTarget>> {
        self.render_target.as_ref()
    }

    /// Subscribe to context lifecycle events.
    pub fn on_device_event(&mut self, observer: Box<dyn FnMut(DeviceEvent) + Send>) {
        self.observers.push(observer);
    }

    fn fire(&mut self, event: DeviceEvent) {
        let mut observers = std::mem::take(&mut self.observers);
        for observer in observers.iter_mut() {
            observer(event);
        }
        self.observers = observers;
    }

    // ========================================================================
    // Initialization
    // ========================================================================

    /// Force the native render state to a known baseline and reset the
    /// shadow copy to match.
    fn initialize_render_state(&mut self) {
        let gl = self.gl.as_ref();

        gl.disable(gl::BLEND);
        gl.blend_func(gl::ONE, gl::ZERO);
        gl.blend_equation(gl::FUNC_ADD);
        self.blend = BlendState::default();

        gl.color_mask(true, true, true, true);
        self.color_write = [true; 4];

        gl.enable(gl::CULL_FACE);
        gl.cull_face(gl::BACK);
        self.cull_mode = CullMode::Back;

        gl.enable(gl::DEPTH_TEST);
        gl.depth_func(gl::LEQUAL);
        gl.depth_mask(true);
        self.depth = DepthState::default();

        gl.disable(gl::STENCIL_TEST);
        gl.stencil_func(gl::ALWAYS, 0, 0xFF);
        gl.stencil_op(gl::KEEP, gl::KEEP, gl::KEEP);
        gl.stencil_mask(0xFF);
        self.stencil = StencilState::default();

        gl.disable(gl::SAMPLE_ALPHA_TO_COVERAGE);
        gl.disable(gl::RASTERIZER_DISCARD);
        self.alpha_to_coverage = false;
        self.raster = true;

        gl.disable(gl::POLYGON_OFFSET_FILL);
        self.depth_bias_enabled = false;
        self.depth_bias = (0.0, 0.0);

        gl.clear_depth(1.0);
        self.clear_depth = 1.0;
        gl.clear_color(0.0, 0.0, 0.0, 0.0);
        self.clear_color = [0.0; 4];
        gl.clear_stencil(0);
        self.clear_stencil = 0;

        gl.enable(gl::SCISSOR_TEST);
        self.viewport = Rect::default();
        self.scissor = Rect::default();

        gl.pixel_store_flip_y(false);
        gl.pixel_store_premultiply_alpha(false);
        self.unpack = UnpackCache::default();
    }

    /// Reset all binding caches to their post-context-creation state.
    fn initialize_context_caches(&mut self) {
        self.active_texture_unit = 0;
        self.texture_units =
            vec![[None; 4]; self.caps.raw.max_combined_textures.max(1) as usize];
        self.bound_framebuffer = None;
        self.current_program = None;
        self.bound_vao = None;
        self.shader = None;
        self.vertex_buffers.clear();
        self.index_buffer = None;
        self.render_target = None;
        self.transform_feedback_buffer = None;
    }

    // ========================================================================
    // Resource factories
    // ========================================================================

    fn next_id(&mut self) -> u64 {
        self.next_resource_id += 1;
        self.next_resource_id
    }

    /// Create a vertex buffer holding `data` laid out as `format`.
    pub fn create_vertex_buffer(
        &mut self,
        format: VertexFormat,
        usage: BufferUsage,
        data: Vec<u8>,
    ) -> Arc<Buffer> {
        let id = self.next_id();
        log::trace!(
            "GraphicsDevice: created vertex buffer #{id} ({} bytes)",
            data.len()
        );
        let buffer = Arc::new(Buffer::new_vertex(id, format, usage, data));
        self.buffers.push(Arc::downgrade(&buffer));
        buffer
    }

    /// Create a vertex buffer from a typed slice.
    pub fn create_vertex_buffer_from<T: bytemuck::NoUninit>(
        &mut self,
        format: VertexFormat,
        usage: BufferUsage,
        data: &[T],
    ) -> Arc<Buffer> {
        self.create_vertex_buffer(format, usage, bytemuck::cast_slice(data).to_vec())
    }

    /// Create an index buffer holding `data` as `format` entries.
    pub fn create_index_buffer(
        &mut self,
        format: IndexFormat,
        usage: BufferUsage,
        data: Vec<u8>,
    ) -> Arc<Buffer> {
        if format == IndexFormat::U32 && !self.extensions.uint_element {
            log::warn!("GraphicsDevice: 32-bit indices requested without uint-element support");
        }
        let id = self.next_id();
        log::trace!(
            "GraphicsDevice: created index buffer #{id} ({} bytes)",
            data.len()
        );
        let buffer = Arc::new(Buffer::new_index(id, format, usage, data));
        self.buffers.push(Arc::downgrade(&buffer));
        buffer
    }

    /// Create a texture. The native object is created lazily on first bind.
    pub fn create_texture(
        &mut self,
        descriptor: TextureDescriptor,
    ) -> Result<Arc<Texture>, GraphicsError> {
        if descriptor.width == 0 || descriptor.height == 0 {
            return Err(GraphicsError::InvalidParameter(
                "texture dimensions cannot be zero".to_string(),
            ));
        }
        if matches!(
            descriptor.dimension,
            TextureDimension::D3 | TextureDimension::D2Array
        ) && descriptor.depth == 0
        {
            return Err(GraphicsError::InvalidParameter(
                "texture depth/layer count cannot be zero".to_string(),
            ));
        }
        log::trace!(
            "GraphicsDevice: created texture {:?} ({}x{}, {:?})",
            descriptor.name,
            descriptor.width,
            descriptor.height,
            descriptor.format
        );
        let texture = Arc::new(Texture::new(descriptor));
        self.textures.push(Arc::downgrade(&texture));
        Ok(texture)
    }

    /// Create and compile a shader. Link results are verified on first use.
    pub fn create_shader(&mut self, definition: ShaderDefinition) -> Arc<Shader> {
        log::trace!("GraphicsDevice: created shader '{}'", definition.name);
        let shader = Arc::new(Shader::new(definition));
        {
            let mut state = shader.state();
            state.compile_and_link(
                self.gl.as_ref(),
                shader.definition(),
                &mut self.vertex_shader_cache,
                &mut self.fragment_shader_cache,
            );
        }
        self.shaders.push(Arc::downgrade(&shader));
        shader
    }

    /// Create a render target. Native framebuffers are created lazily when
    /// the target is first rendered into.
    pub fn create_render_target(
        &mut self,
        mut descriptor: RenderTargetDescriptor,
    ) -> Result<Arc<RenderTarget>, GraphicsError> {
        if descriptor.color_buffers.is_empty() && descriptor.depth_buffer.is_none() {
            return Err(GraphicsError::InvalidParameter(
                "render target needs at least one attachment".to_string(),
            ));
        }
        if descriptor.color_buffers.len() > self.caps.raw.max_color_attachments as usize {
            return Err(GraphicsError::InvalidParameter(format!(
                "render target '{}' requests {} color attachments, device supports {}",
                descriptor.name,
                descriptor.color_buffers.len(),
                self.caps.raw.max_color_attachments
            )));
        }
        descriptor.samples = descriptor.samples.clamp(1, self.caps.raw.max_samples.max(1));
        log::trace!(
            "GraphicsDevice: created render target '{}' ({} colors, {} samples)",
            descriptor.name,
            descriptor.color_buffers.len(),
            descriptor.samples
        );
        let target = Arc::new(RenderTarget::new(descriptor));
        self.targets.push(Arc::downgrade(&target));
        Ok(target)
    }

    // ========================================================================
    // Resource destruction
    // ========================================================================

    /// Release a buffer's native storage. Idempotent.
    pub fn destroy_buffer(&mut self, buffer: &Arc<Buffer>) {
        let mut state = buffer.state();
        let delta = -(state.platform.allocated_len() as i64);
        match buffer.target() {
            BufferTarget::Vertex => VramStats::apply(&mut self.vram.vertex_buffer, delta),
            BufferTarget::Index => VramStats::apply(&mut self.vram.index_buffer, delta),
        }
        state.platform.destroy(self.gl.as_ref());
        state.dirty = true;
    }

    /// Release a texture's native object and scrub it from the unit table
    /// and from any uniform slot that still references it. Idempotent.
    pub fn destroy_texture(&mut self, texture: &Arc<Texture>) {
        let native = {
            let mut state = texture.state();
            let native = state.platform.texture;
            VramStats::apply(
                &mut self.vram.texture,
                -(state.platform.gpu_size as i64),
            );
            state.platform.gpu_size = 0;
            state.platform.destroy(self.gl.as_ref());
            native
        };
        self.scope.remove_texture(texture);
        if let Some(native) = native {
            for unit in &mut self.texture_units {
                for slot in unit.iter_mut() {
                    if *slot == Some(native) {
                        *slot = None;
                    }
                }
            }
        }
        texture.dirty_all();
    }

    /// Release a shader's native program and evict its sources from the
    /// compile caches. Idempotent.
    pub fn destroy_shader(&mut self, shader: &Arc<Shader>) {
        if let Some(current) = &self.shader {
            if Arc::ptr_eq(current, shader) {
                self.use_program(None);
                self.shader = None;
            }
        }
        let definition = shader.definition();
        if let Some(stage) = self.vertex_shader_cache.remove(&definition.vshader) {
            self.gl.delete_shader(stage);
        }
        if let Some(stage) = self.fragment_shader_cache.remove(&definition.fshader) {
            self.gl.delete_shader(stage);
        }
        shader.state().platform.destroy(self.gl.as_ref());
    }

    /// Release a render target's framebuffers and any shared depth buffer
    /// reference. Idempotent.
    pub fn destroy_render_target(&mut self, target: &Arc<RenderTarget>) {
        let shared = {
            let mut state = target.state();
            let shared = state.platform.shared_msaa_depth.take();
            state.platform.destroy(self.gl.as_ref());
            shared
        };
        if let Some(key) = shared {
            self.release_shared_msaa_depth(key);
        }
        if let Some(current) = &self.render_target {
            if Arc::ptr_eq(current, target) {
                self.render_target = None;
            }
        }
    }

    /// Tear the device down: every tracked resource loses its native
    /// backing and all caches are flushed.
    pub fn destroy(&mut self) {
        log::info!("GraphicsDevice: destroying");
        for shader in collect_live(&mut self.shaders) {
            shader.state().platform.destroy(self.gl.as_ref());
        }
        for (_, stage) in self.vertex_shader_cache.drain() {
            self.gl.delete_shader(stage);
        }
        for (_, stage) in self.fragment_shader_cache.drain() {
            self.gl.delete_shader(stage);
        }
        for target in collect_live(&mut self.targets) {
            target.state().platform.destroy(self.gl.as_ref());
        }
        for (_, entry) in self.msaa_depth_cache.drain() {
            self.gl.delete_renderbuffer(entry.renderbuffer);
        }
        for texture in collect_live(&mut self.textures) {
            texture.state().platform.destroy(self.gl.as_ref());
        }
        for buffer in collect_live(&mut self.buffers) {
            buffer.state().platform.destroy(self.gl.as_ref());
        }
        self.vao_cache.clear(self.gl.as_ref());
        self.vram = VramStats::default();
        self.initialize_context_caches();
    }

    // ========================================================================
    // Frame lifecycle
    // ========================================================================

    /// Request a backbuffer resize, applied at the next `frame_start`.
    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.pending_resize = Some((width, height));
    }

    /// Begin a frame: applies pending backbuffer resizes and resets
    /// per-frame statistics.
    pub fn frame_start(&mut self) {
        if let Some((width, height)) = self.pending_resize.take() {
            if width != self.width || height != self.height {
                log::debug!(
                    "GraphicsDevice: backbuffer resized {}x{} -> {}x{}",
                    self.width,
                    self.height,
                    width,
                    height
                );
                self.width = width;
                self.height = height;
            }
        }
        self.draw_calls_per_frame = 0;
    }

    /// End a frame.
    pub fn frame_end(&mut self) {
        log::trace!(
            "GraphicsDevice: frame end ({} draw calls)",
            self.draw_calls_per_frame
        );
    }

    // ========================================================================
    // Render state setters
    // ========================================================================

    /// Set the blend configuration. Only changed pieces reach the driver.
    pub fn set_blend_state(&mut self, state: &BlendState) {
        let gl = self.gl.as_ref();
        let cached = &self.blend;

        if state.enabled != cached.enabled {
            if state.enabled {
                gl.enable(gl::BLEND);
            } else {
                gl.disable(gl::BLEND);
            }
        }

        let funcs_changed = state.src != cached.src
            || state.dst != cached.dst
            || state.src_alpha != cached.src_alpha
            || state.dst_alpha != cached.dst_alpha;
        if funcs_changed {
            if state.separate_func() {
                gl.blend_func_separate(
                    blend_factor_to_native(state.src),
                    blend_factor_to_native(state.dst),
                    blend_factor_to_native(state.src_alpha),
                    blend_factor_to_native(state.dst_alpha),
                );
            } else {
                gl.blend_func(
                    blend_factor_to_native(state.src),
                    blend_factor_to_native(state.dst),
                );
            }
        }

        let equations_changed =
            state.equation != cached.equation || state.alpha_equation != cached.alpha_equation;
        if equations_changed {
            if state.separate_equation() {
                gl.blend_equation_separate(
                    blend_equation_to_native(state.equation),
                    blend_equation_to_native(state.alpha_equation),
                );
            } else {
                gl.blend_equation(blend_equation_to_native(state.equation));
            }
        }

        self.blend = *state;
    }

    /// Set the depth test/write configuration.
    pub fn set_depth_state(&mut self, state: &DepthState) {
        let gl = self.gl.as_ref();
        let cached = &self.depth;

        if state.test != cached.test {
            if state.test {
                gl.enable(gl::DEPTH_TEST);
            } else {
                gl.disable(gl::DEPTH_TEST);
            }
        }
        if state.func != cached.func {
            gl.depth_func(compare_to_native(state.func));
        }
        if state.write != cached.write {
            gl.depth_mask(state.write);
        }

        self.depth = *state;
    }

    /// Set the stencil configuration.
    pub fn set_stencil_state(&mut self, state: &StencilState) {
        let gl = self.gl.as_ref();
        let cached = self.stencil;

        if state.enabled != cached.enabled {
            if state.enabled {
                gl.enable(gl::STENCIL_TEST);
            } else {
                gl.disable(gl::STENCIL_TEST);
            }
        }

        if state.is_uniform() {
            let face = &state.front;
            let func_changed = (face.func, face.ref_value, face.read_mask)
                != (cached.front.func, cached.front.ref_value, cached.front.read_mask)
                || (face.func, face.ref_value, face.read_mask)
                    != (cached.back.func, cached.back.ref_value, cached.back.read_mask);
            if func_changed {
                gl.stencil_func(compare_to_native(face.func), face.ref_value, face.read_mask);
            }
            let ops_changed = (face.fail, face.zfail, face.zpass)
                != (cached.front.fail, cached.front.zfail, cached.front.zpass)
                || (face.fail, face.zfail, face.zpass)
                    != (cached.back.fail, cached.back.zfail, cached.back.zpass);
            if ops_changed {
                gl.stencil_op(
                    stencil_op_to_native(face.fail),
                    stencil_op_to_native(face.zfail),
                    stencil_op_to_native(face.zpass),
                );
            }
            if face.write_mask != cached.front.write_mask
                || face.write_mask != cached.back.write_mask
            {
                gl.stencil_mask(face.write_mask);
            }
        } else {
            for (native_face, face, cached_face) in [
                (gl::FRONT, &state.front, &cached.front),
                (gl::BACK, &state.back, &cached.back),
            ] {
                if (face.func, face.ref_value, face.read_mask)
                    != (cached_face.func, cached_face.ref_value, cached_face.read_mask)
                {
                    gl.stencil_func_separate(
                        native_face,
                        compare_to_native(face.func),
                        face.ref_value,
                        face.read_mask,
                    );
                }
                if (face.fail, face.zfail, face.zpass)
                    != (cached_face.fail, cached_face.zfail, cached_face.zpass)
                {
                    gl.stencil_op_separate(
                        native_face,
                        stencil_op_to_native(face.fail),
                        stencil_op_to_native(face.zfail),
                        stencil_op_to_native(face.zpass),
                    );
                }
                if face.write_mask != cached_face.write_mask {
                    gl.stencil_mask_separate(native_face, face.write_mask);
                }
            }
        }

        self.stencil = *state;
    }

    /// Set the face culling mode.
    pub fn set_cull_mode(&mut self, mode: CullMode) {
        if mode == self.cull_mode {
            return;
        }
        let gl = self.gl.as_ref();
        match mode {
            CullMode::None => gl.disable(gl::CULL_FACE),
            _ => {
                if self.cull_mode == CullMode::None {
                    gl.enable(gl::CULL_FACE);
                }
                gl.cull_face(cull_mode_to_native(mode));
            }
        }
        self.cull_mode = mode;
    }

    /// Current culling mode.
    pub fn cull_mode(&self) -> CullMode {
        self.cull_mode
    }

    /// Set the viewport rectangle.
    pub fn set_viewport(&mut self, rect: Rect) {
        if rect != self.viewport {
            self.gl.viewport(rect.x, rect.y, rect.width, rect.height);
            self.viewport = rect;
        }
    }

    /// Set the scissor rectangle.
    pub fn set_scissor(&mut self, rect: Rect) {
        if rect != self.scissor {
            self.gl.scissor(rect.x, rect.y, rect.width, rect.height);
            self.scissor = rect;
        }
    }

    /// Set the color channel write mask.
    pub fn set_color_write(&mut self, r: bool, g: bool, b: bool, a: bool) {
        if self.color_write != [r, g, b, a] {
            self.gl.color_mask(r, g, b, a);
            self.color_write = [r, g, b, a];
        }
    }

    /// Enable or disable depth bias.
    pub fn set_depth_bias(&mut self, enabled: bool) {
        if self.depth_bias_enabled != enabled {
            if enabled {
                self.gl.enable(gl::POLYGON_OFFSET_FILL);
            } else {
                self.gl.disable(gl::POLYGON_OFFSET_FILL);
            }
            self.depth_bias_enabled = enabled;
        }
    }

    /// Set the depth bias values.
    pub fn set_depth_bias_values(&mut self, constant: f32, slope: f32) {
        if self.depth_bias != (constant, slope) {
            self.gl.polygon_offset(slope, constant);
            self.depth_bias = (constant, slope);
        }
    }

    /// Enable or disable alpha-to-coverage.
    pub fn set_alpha_to_coverage(&mut self, enabled: bool) {
        if self.alpha_to_coverage != enabled {
            if enabled {
                self.gl.enable(gl::SAMPLE_ALPHA_TO_COVERAGE);
            } else {
                self.gl.disable(gl::SAMPLE_ALPHA_TO_COVERAGE);
            }
            self.alpha_to_coverage = enabled;
        }
    }

    /// Enable or disable rasterization entirely (transform feedback only).
    pub fn set_raster(&mut self, enabled: bool) {
        if self.raster != enabled {
            if enabled {
                self.gl.disable(gl::RASTERIZER_DISCARD);
            } else {
                self.gl.enable(gl::RASTERIZER_DISCARD);
            }
            self.raster = enabled;
        }
    }

    fn set_clear_color_value(&mut self, color: [f32; 4]) {
        if self.clear_color != color {
            self.gl.clear_color(color[0], color[1], color[2], color[3]);
            self.clear_color = color;
        }
    }

    fn set_clear_depth_value(&mut self, depth: f32) {
        if self.clear_depth != depth {
            self.gl.clear_depth(depth);
            self.clear_depth = depth;
        }
    }

    fn set_clear_stencil_value(&mut self, stencil: u32) {
        if self.clear_stencil != stencil {
            self.gl.clear_stencil(stencil);
            self.clear_stencil = stencil;
        }
    }

    /// Clear the currently bound render destination.
    pub fn clear(&mut self, options: &ClearOptions) {
        let flags = options.flags;
        if flags.is_empty() {
            return;
        }

        if flags.contains(ClearFlags::COLOR) {
            self.set_clear_color_value(options.color);
        }
        let reenable_depth_mask = flags.contains(ClearFlags::DEPTH) && !self.depth.write;
        if flags.contains(ClearFlags::DEPTH) {
            self.set_clear_depth_value(options.depth);
            if reenable_depth_mask {
                // the clear must be able to write depth
                self.gl.depth_mask(true);
            }
        }
        if flags.contains(ClearFlags::STENCIL) {
            self.set_clear_stencil_value(options.stencil);
        }

        self.gl.clear(clear_flags_to_native(flags));

        if reenable_depth_mask {
            self.gl.depth_mask(false);
        }
    }

    // ========================================================================
    // Texture binding
    // ========================================================================

    fn slot_of_target(target: u32) -> usize {
        match target {
            gl::TEXTURE_2D => 0,
            gl::TEXTURE_CUBE_MAP => 1,
            gl::TEXTURE_3D => 2,
            _ => 3,
        }
    }

    /// Activate a texture unit if it is not already active.
    fn active_texture(&mut self, unit: u32) {
        if self.active_texture_unit != unit {
            self.gl.active_texture(unit);
            self.active_texture_unit = unit;
        }
    }

    /// Bind a texture on the currently active unit, skipping the native
    /// call when the unit/slot already holds it.
    fn bind_texture_current_unit(&mut self, target: u32, texture: TextureId) {
        let unit = self.active_texture_unit as usize;
        let slot = Self::slot_of_target(target);
        if self.texture_units[unit][slot] != Some(texture) {
            self.gl.bind_texture(target, texture);
            self.texture_units[unit][slot] = Some(texture);
        }
    }

    /// Bind a texture on a specific unit, activating the unit only when the
    /// bind is actually needed.
    fn bind_texture_on_unit(&mut self, target: u32, texture: TextureId, unit: u32) {
        let slot = Self::slot_of_target(target);
        if self.texture_units[unit as usize][slot] != Some(texture) {
            self.active_texture(unit);
            self.gl.bind_texture(target, texture);
            self.texture_units[unit as usize][slot] = Some(texture);
        }
    }

    /// Make a texture current on a unit, lazily creating its native object
    /// and flushing pending parameter/pixel changes.
    ///
    /// Returns false when the texture has no usable native backing.
    pub fn set_texture(&mut self, texture: &Arc<Texture>, unit: u32) -> bool {
        let descriptor = texture.descriptor();
        let mut state = texture.state();

        if state.platform.texture.is_none() && !state.platform.failed {
            if let Err(err) =
                state
                    .platform
                    .initialize(self.gl.as_ref(), &self.extensions, descriptor)
            {
                log::error!(
                    "GraphicsDevice: failed to initialize texture '{}': {}",
                    texture.name(),
                    err
                );
            }
        }
        if !state.platform.is_initialized() {
            if !state.failed_warned {
                log::error!(
                    "GraphicsDevice: texture '{}' bound without usable native backing",
                    texture.name()
                );
                state.failed_warned = true;
            }
            return false;
        }

        let target = state.platform.gl_target;
        let native = state.platform.texture.expect("checked above");

        if !state.param_dirty.is_empty() || state.needs_upload || state.needs_mipmaps_upload {
            self.active_texture(unit);
            self.bind_texture_current_unit(target, native);

            if !state.param_dirty.is_empty() {
                state.set_parameters(self.gl.as_ref(), &self.extensions, descriptor);
            }
            if state.needs_upload || state.needs_mipmaps_upload {
                state.upload(
                    self.gl.as_ref(),
                    &self.caps.raw,
                    descriptor,
                    &mut self.unpack,
                    &mut self.vram,
                );
                state.needs_upload = false;
                state.needs_mipmaps_upload = false;
            }
        } else {
            self.bind_texture_on_unit(target, native, unit);
        }
        true
    }

    // ========================================================================
    // Shader binding
    // ========================================================================

    fn use_program(&mut self, program: Option<ProgramId>) {
        if self.current_program != program {
            self.gl.use_program(program);
            self.current_program = program;
        }
    }

    /// Set the active shader for subsequent draws.
    ///
    /// Returns false (with a one-time diagnostic) when the shader failed to
    /// compile or link; the previous shader stays active.
    pub fn set_shader(&mut self, shader: &Arc<Shader>) -> bool {
        {
            let mut state = shader.state();
            match state.status {
                ShaderStatus::Failed => {
                    if !state.warned_failed {
                        log::warn!(
                            "GraphicsDevice: ignoring failed shader '{}'",
                            shader.name()
                        );
                        state.warned_failed = true;
                    }
                    return false;
                }
                ShaderStatus::Uninitialized => {
                    state.compile_and_link(
                        self.gl.as_ref(),
                        shader.definition(),
                        &mut self.vertex_shader_cache,
                        &mut self.fragment_shader_cache,
                    );
                }
                _ => {}
            }
            if state.status == ShaderStatus::Compiling
                && !state.post_link(self.gl.as_ref(), shader.definition(), &mut self.scope)
            {
                return false;
            }
        }

        let already_current = self
            .shader
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, shader));
        if !already_current {
            let program = shader.state().platform.program;
            self.use_program(program);
            self.shader = Some(Arc::clone(shader));
        }
        true
    }

    // ========================================================================
    // Vertex/index buffer binding
    // ========================================================================

    /// Stage a vertex buffer for the next draw. Multiple calls stack.
    pub fn set_vertex_buffer(&mut self, buffer: &Arc<Buffer>) {
        if buffer.target() != BufferTarget::Vertex {
            log::warn!("GraphicsDevice: set_vertex_buffer called with an index buffer");
            return;
        }
        self.vertex_buffers.push(Arc::clone(buffer));
    }

    /// Set the index buffer for subsequent indexed draws.
    pub fn set_index_buffer(&mut self, buffer: Option<&Arc<Buffer>>) {
        if let Some(buffer) = buffer {
            if buffer.target() != BufferTarget::Index {
                log::warn!("GraphicsDevice: set_index_buffer called with a vertex buffer");
                return;
            }
        }
        self.index_buffer = buffer.map(Arc::clone);
    }

    /// Set the buffer capturing transform feedback output.
    pub fn set_transform_feedback_buffer(&mut self, buffer: Option<&Arc<Buffer>>) {
        self.transform_feedback_buffer = buffer.map(Arc::clone);
    }

    /// Overwrite a sub-range of a buffer and push it to the native object
    /// in place when one exists; otherwise the change rides along with the
    /// next full upload.
    pub fn update_buffer_range(&mut self, buffer: &Arc<Buffer>, offset: usize, data: &[u8]) {
        let mut state = buffer.state();
        let end = offset + data.len();
        if end > state.data.len() {
            log::warn!(
                "GraphicsDevice: buffer range {}..{} exceeds buffer length {}",
                offset,
                end,
                state.data.len()
            );
            return;
        }
        let had_pending_changes = state.dirty;
        state.data[offset..end].copy_from_slice(data);

        // a buffer with older pending changes (or no native storage yet)
        // takes the full upload path on next use instead
        if !state.platform.is_initialized() || had_pending_changes {
            state.dirty = true;
            return;
        }
        if buffer.target() == BufferTarget::Index {
            self.unbind_vao();
        }
        state
            .platform
            .upload_range(self.gl.as_ref(), buffer.target(), offset, data);
    }

    fn unbind_vao(&mut self) {
        self.bound_vao = None;
        self.gl.bind_vertex_array(None);
    }

    fn unlock_buffer(&mut self, buffer: &Arc<Buffer>) {
        let mut state = buffer.state();
        if !state.dirty {
            return;
        }
        let BufferState {
            data, platform, ..
        } = &mut *state;
        let delta = platform.unlock(self.gl.as_ref(), buffer.target(), buffer.usage(), data);
        match buffer.target() {
            BufferTarget::Vertex => VramStats::apply(&mut self.vram.vertex_buffer, delta),
            BufferTarget::Index => VramStats::apply(&mut self.vram.index_buffer, delta),
        }
        state.dirty = false;
    }

    /// Build a native vertex array from an ordered buffer set.
    fn create_vertex_array_object(&mut self, buffers: &[Arc<Buffer>]) -> VaoId {
        let gl = self.gl.as_ref();
        let vao = gl.create_vertex_array();
        gl.bind_vertex_array(Some(vao));
        // the index buffer binding must not be captured here
        gl.bind_buffer(gl::ELEMENT_ARRAY_BUFFER, None);

        let mut slot_zero_used = false;
        for buffer in buffers {
            let state = buffer.state();
            gl.bind_buffer(gl::ARRAY_BUFFER, state.platform.buffer);
            let Some(format) = buffer.format() else {
                continue;
            };
            for placed in format.elements() {
                let location = placed.element.semantic.location();
                if location == 0 {
                    slot_zero_used = true;
                }
                gl.vertex_attrib_pointer(
                    location,
                    placed.element.components,
                    vertex_data_type_to_native(placed.element.data_type),
                    placed.element.normalize,
                    format.stride(),
                    placed.offset,
                );
                gl.enable_vertex_attrib_array(location);
                if state.instancing {
                    gl.vertex_attrib_divisor(location, 1);
                }
            }
        }

        gl.bind_vertex_array(None);
        gl.bind_buffer(gl::ARRAY_BUFFER, None);
        self.bound_vao = None;

        if !slot_zero_used {
            log::warn!(
                "GraphicsDevice: no vertex attribute occupies slot 0, which some drivers penalize"
            );
        }
        vao
    }

    /// Upload pending buffer data and bind the vertex array for the staged
    /// buffer set, reusing a cached vertex array when the buffer identities
    /// and layouts match a previous draw.
    fn set_buffers(&mut self) {
        let staged = std::mem::take(&mut self.vertex_buffers);

        for buffer in &staged {
            self.unlock_buffer(buffer);
        }
        if let Some(index_buffer) = self.index_buffer.clone() {
            if index_buffer.state().dirty {
                // uploading the index buffer must not touch the bound VAO
                self.unbind_vao();
                self.unlock_buffer(&index_buffer);
            }
        }

        if !staged.is_empty() {
            let vao = if staged.len() == 1 {
                // a lone buffer keeps its VAO; layouts are immutable
                let existing = staged[0].state().platform.vao;
                match existing {
                    Some(vao) => vao,
                    None => {
                        let vao = self.create_vertex_array_object(&staged);
                        staged[0].state().platform.vao = Some(vao);
                        vao
                    }
                }
            } else {
                let key = vao_key(&staged);
                match self.vao_cache.get(&key) {
                    Some(vao) => vao,
                    None => {
                        let vao = self.create_vertex_array_object(&staged);
                        self.vao_cache.insert(key, vao);
                        vao
                    }
                }
            };

            if self.bound_vao != Some(vao) {
                self.bound_vao = Some(vao);
                self.gl.bind_vertex_array(Some(vao));
            }
        }

        // The element binding lives inside the VAO, so it is re-issued
        // unconditionally; the cache cannot know what the VAO captured.
        let element = self
            .index_buffer
            .as_ref()
            .and_then(|buffer| buffer.state().platform.buffer);
        self.gl.bind_buffer(gl::ELEMENT_ARRAY_BUFFER, element);
    }

    // ========================================================================
    // Draw
    // ========================================================================

    /// Submit a primitive for rendering.
    ///
    /// `instances` of zero issues a plain draw; a positive count issues an
    /// instanced draw. `keep_buffers` skips vertex/index buffer binding and
    /// reuses whatever the previous draw set up (multi-view rendering).
    ///
    /// The draw is skipped (returning false, logging once) when no usable
    /// shader is set or a sampler required by the shader has no bound
    /// value; a skipped draw issues no native call at all.
    pub fn draw(&mut self, primitive: &Primitive, instances: u32, keep_buffers: bool) -> bool {
        let Some(shader) = self.shader.clone() else {
            log::debug!("GraphicsDevice: draw with no shader set, skipped");
            return false;
        };
        if !shader.is_ready() {
            let mut state = shader.state();
            if !state.warned_failed {
                log::warn!(
                    "GraphicsDevice: draw with unusable shader '{}', skipped",
                    shader.name()
                );
                state.warned_failed = true;
            }
            return false;
        }

        // Validate sampler bindings before any native work so that an
        // aborted draw leaves no device-visible trace.
        {
            let mut state = shader.state();
            let missing = state
                .samplers
                .iter()
                .find(|sampler| {
                    !sampler
                        .slot
                        .as_ref()
                        .is_some_and(|slot| slot.has_value())
                })
                .map(|sampler| sampler.name.clone());
            if let Some(name) = missing {
                if !state.warned_samplers.contains(&name) {
                    log::error!(
                        "GraphicsDevice: draw skipped, sampler '{}' of shader '{}' has no \
                         bound texture",
                        name,
                        shader.name()
                    );
                    state.warned_samplers.push(name);
                }
                return false;
            }
        }

        if !keep_buffers {
            self.set_buffers();
        }

        // Commit samplers: bind each texture to a unit and point the
        // sampler uniform at the unit, skipping both when already current.
        let mut state = shader.state();
        let mut texture_unit: u32 = 0;
        {
            let ShaderState { samplers, .. } = &mut *state;
            for sampler in samplers.iter_mut() {
                let Some(slot) = &sampler.slot else {
                    continue;
                };
                let (value, _) = slot.value_and_version();
                match value {
                    Some(UniformValue::Texture(texture)) => {
                        self.set_texture(&texture, texture_unit);
                        if sampler.sampler_unit != Some(texture_unit) {
                            self.gl.uniform1i(sampler.location, texture_unit as i32);
                            sampler.sampler_unit = Some(texture_unit);
                        }
                        texture_unit += 1;
                    }
                    Some(UniformValue::TextureArray(textures)) => {
                        let mut units = Vec::with_capacity(textures.len());
                        for texture in &textures {
                            self.set_texture(texture, texture_unit);
                            units.push(texture_unit as i32);
                            texture_unit += 1;
                        }
                        self.gl.uniform1iv(sampler.location, &units);
                    }
                    _ => {
                        log::debug!(
                            "GraphicsDevice: sampler '{}' holds a non-texture value",
                            sampler.name
                        );
                    }
                }
            }
        }

        // Commit uniforms whose value stamp moved past what this program
        // last saw.
        {
            let ShaderState { uniforms, .. } = &mut *state;
            for uniform in uniforms.iter_mut() {
                let Some(slot) = &uniform.slot else {
                    continue;
                };
                let (value, version) = slot.value_and_version();
                if uniform.version != Some(version) {
                    uniform.version = Some(version);
                    if let Some(value) = value {
                        commit_uniform(self.gl.as_ref(), uniform, &value);
                    }
                }
            }
        }
        drop(state);

        let feedback = self.transform_feedback_buffer.clone();
        if let Some(feedback) = &feedback {
            self.unlock_buffer(feedback);
            self.gl.bind_buffer_base(
                gl::TRANSFORM_FEEDBACK_BUFFER,
                0,
                feedback.state().platform.buffer,
            );
            self.gl.begin_transform_feedback(gl::POINTS);
        }

        let mode = primitive_type_to_native(primitive.kind);
        if primitive.indexed {
            let Some(index_buffer) = self.index_buffer.clone() else {
                log::error!("GraphicsDevice: indexed draw with no index buffer set, skipped");
                return false;
            };
            let format = index_buffer.index_format().unwrap_or_default();
            let index_type = index_format_to_native(format);
            let offset = primitive.base as usize * format.bytes_per_index() as usize;
            if instances > 0 {
                self.gl
                    .draw_elements_instanced(mode, primitive.count, index_type, offset, instances);
            } else {
                self.gl
                    .draw_elements(mode, primitive.count, index_type, offset);
            }
        } else if instances > 0 {
            self.gl
                .draw_arrays_instanced(mode, primitive.base, primitive.count, instances);
        } else {
            self.gl.draw_arrays(mode, primitive.base, primitive.count);
        }

        if feedback.is_some() {
            self.gl.end_transform_feedback();
            self.gl
                .bind_buffer_base(gl::TRANSFORM_FEEDBACK_BUFFER, 0, None);
        }

        self.draw_calls_per_frame += 1;
        true
    }

    // ========================================================================
    // Framebuffers and render targets
    // ========================================================================

    fn set_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        if self.bound_framebuffer != Some(framebuffer) {
            self.gl.bind_framebuffer(gl::FRAMEBUFFER, framebuffer);
            self.bound_framebuffer = Some(framebuffer);
        }
    }

    /// Set the render destination for subsequent draws. `None` selects the
    /// backbuffer. Takes effect at the next render block.
    pub fn set_render_target(&mut self, target: Option<&Arc<RenderTarget>>) {
        self.render_target = target.map(Arc::clone);
    }

    /// Bind (and lazily initialize) the current render target.
    pub fn update_begin(&mut self) {
        self.bound_vao = None;

        if let Some(target) = self.render_target.clone() {
            if !target.is_initialized() {
                self.init_render_target(&target);
            }
            let framebuffer = target.state().platform.framebuffer;
            self.set_framebuffer(framebuffer);
        } else {
            self.set_framebuffer(None);
        }
    }

    /// Finish the current render block: resolve multisampling and
    /// regenerate mip chains where requested.
    pub fn update_end(&mut self) {
        self.unbind_vao();

        if let Some(target) = self.render_target.clone() {
            let descriptor = target.descriptor();
            if let Some(color) = descriptor.color_buffers.first() {
                if color.descriptor().mipmaps {
                    self.generate_texture_mipmaps(&Arc::clone(color));
                }
            }
            if target.samples() > 1 && descriptor.auto_resolve {
                let depth = descriptor.depth_buffer.is_some();
                self.resolve_render_target(&target, true, depth);
            }
        }
    }

    fn generate_texture_mipmaps(&mut self, texture: &Arc<Texture>) {
        let (target, native) = {
            let state = texture.state();
            (state.platform.gl_target, state.platform.texture)
        };
        let Some(native) = native else {
            return;
        };
        // park the bind on the last unit to avoid disturbing sampler binds
        self.active_texture(self.caps.raw.max_combined_textures - 1);
        self.bind_texture_current_unit(target, native);
        self.gl.generate_mipmap(target);
    }

    /// Allocate undefined level 0 storage for a texture that never received
    /// pixel data, so it can serve as a framebuffer attachment.
    fn ensure_attachment_storage(&mut self, texture: &Arc<Texture>) {
        let descriptor = texture.descriptor();
        let mut state = texture.state();
        if !state.platform.is_initialized() || state.platform.storage_allocated() {
            return;
        }
        let target = state.platform.gl_target;
        let native = state.platform.texture.expect("initialized");
        self.active_texture(0);
        self.bind_texture_current_unit(target, native);
        state.allocate_storage(self.gl.as_ref(), descriptor, &mut self.vram);
    }

    fn check_framebuffer(&mut self, name: &str, what: &str) -> bool {
        let status = self.gl.check_framebuffer_status(gl::FRAMEBUFFER);
        if status != gl::FRAMEBUFFER_COMPLETE {
            log::error!(
                "GraphicsDevice: render target '{}' {} is incomplete: {}",
                name,
                what,
                gl::framebuffer_status_str(status)
            );
            return false;
        }
        true
    }

    fn acquire_shared_msaa_depth(&mut self, key: MsaaDepthKey) -> RenderbufferId {
        if let Some(entry) = self.msaa_depth_cache.get_mut(&key) {
            entry.refs += 1;
            return entry.renderbuffer;
        }
        let gl = self.gl.as_ref();
        let renderbuffer = gl.create_renderbuffer();
        gl.bind_renderbuffer(Some(renderbuffer));
        gl.renderbuffer_storage_multisample(
            key.samples,
            key.internal_format,
            key.width,
            key.height,
        );
        gl.bind_renderbuffer(None);
        self.msaa_depth_cache
            .insert(key, MsaaDepthEntry { renderbuffer, refs: 1 });
        renderbuffer
    }

    fn release_shared_msaa_depth(&mut self, key: MsaaDepthKey) {
        if let Some(entry) = self.msaa_depth_cache.get_mut(&key) {
            entry.refs -= 1;
            if entry.refs == 0 {
                let entry = self.msaa_depth_cache.remove(&key).expect("present");
                self.gl.delete_renderbuffer(entry.renderbuffer);
            }
        }
    }

    /// Create the native framebuffers for a render target.
    ///
    /// Without multisampling a single framebuffer receives all attachments.
    /// With multisampling that framebuffer is demoted to resolve duty and a
    /// fresh multisampled framebuffer takes over rendering; under MRT one
    /// additional framebuffer pair per color attachment enables independent
    /// per-attachment resolves.
    pub(crate) fn init_render_target(&mut self, target: &Arc<RenderTarget>) {
        if target.is_initialized() {
            return;
        }
        let descriptor = target.descriptor().clone();
        let width = target.width();
        let height = target.height();

        // attachments need native objects and storage before attaching
        for color in &descriptor.color_buffers {
            self.set_texture(color, 0);
            self.ensure_attachment_storage(color);
        }
        if let Some(depth) = &descriptor.depth_buffer {
            self.set_texture(depth, 0);
            self.ensure_attachment_storage(depth);
        }

        let msaa = descriptor.samples > 1;
        let first_framebuffer = self.gl.create_framebuffer();
        self.set_framebuffer(Some(first_framebuffer));

        for (index, color) in descriptor.color_buffers.iter().enumerate() {
            let color_state = color.state();
            let Some(native) = color_state.platform.texture else {
                continue;
            };
            let tex_target = color_attach_target(color, descriptor.face);
            self.gl.framebuffer_texture_2d(
                gl::FRAMEBUFFER,
                gl::COLOR_ATTACHMENT0 + index as u32,
                tex_target,
                native,
                0,
            );
        }

        if let Some(depth_texture) = &descriptor.depth_buffer {
            let depth_state = depth_texture.state();
            if let Some(native) = depth_state.platform.texture {
                let attachment = if descriptor.stencil {
                    gl::DEPTH_STENCIL_ATTACHMENT
                } else {
                    gl::DEPTH_ATTACHMENT
                };
                let tex_target = color_attach_target(depth_texture, descriptor.face);
                self.gl
                    .framebuffer_texture_2d(gl::FRAMEBUFFER, attachment, tex_target, native, 0);
            }
        } else if descriptor.depth && !msaa {
            // a multisampled target keeps its depth in the MSAA framebuffer
            let gl_ref = self.gl.as_ref();
            let renderbuffer = gl_ref.create_renderbuffer();
            gl_ref.bind_renderbuffer(Some(renderbuffer));
            if descriptor.stencil {
                gl_ref.renderbuffer_storage(gl::DEPTH24_STENCIL8, width, height);
                gl_ref.framebuffer_renderbuffer(
                    gl::FRAMEBUFFER,
                    gl::DEPTH_STENCIL_ATTACHMENT,
                    renderbuffer,
                );
            } else {
                gl_ref.renderbuffer_storage(gl::DEPTH_COMPONENT16, width, height);
                gl_ref.framebuffer_renderbuffer(
                    gl::FRAMEBUFFER,
                    gl::DEPTH_ATTACHMENT,
                    renderbuffer,
                );
            }
            gl_ref.bind_renderbuffer(None);
            target.state().platform.depth_renderbuffer = Some(renderbuffer);
        }

        let mut failed = !self.check_framebuffer(&descriptor.name, "framebuffer");

        if msaa {
            // The framebuffer just built becomes the resolve destination;
            // rendering moves to a new multisampled framebuffer.
            let render_framebuffer = self.gl.create_framebuffer();
            self.set_framebuffer(Some(render_framebuffer));

            let mut msaa_colors = Vec::with_capacity(descriptor.color_buffers.len());
            for (index, color) in descriptor.color_buffers.iter().enumerate() {
                let internal_format = color.state().platform.gl_internal_format;
                let gl_ref = self.gl.as_ref();
                let renderbuffer = gl_ref.create_renderbuffer();
                gl_ref.bind_renderbuffer(Some(renderbuffer));
                gl_ref.renderbuffer_storage_multisample(
                    descriptor.samples,
                    internal_format,
                    width,
                    height,
                );
                gl_ref.framebuffer_renderbuffer(
                    gl::FRAMEBUFFER,
                    gl::COLOR_ATTACHMENT0 + index as u32,
                    renderbuffer,
                );
                msaa_colors.push(renderbuffer);
            }

            let mut shared_depth = None;
            let mut own_depth = None;
            if descriptor.depth || descriptor.depth_buffer.is_some() {
                let internal_format = if descriptor.stencil {
                    gl::DEPTH24_STENCIL8
                } else {
                    gl::DEPTH_COMPONENT32F
                };
                let attachment = if descriptor.stencil {
                    gl::DEPTH_STENCIL_ATTACHMENT
                } else {
                    gl::DEPTH_ATTACHMENT
                };
                if descriptor.depth_buffer.is_some() {
                    // depth textures share one multisampled stand-in per
                    // size/format/sample-count across render targets
                    let key = MsaaDepthKey {
                        width,
                        height,
                        internal_format,
                        samples: descriptor.samples,
                    };
                    let renderbuffer = self.acquire_shared_msaa_depth(key);
                    self.gl
                        .framebuffer_renderbuffer(gl::FRAMEBUFFER, attachment, renderbuffer);
                    shared_depth = Some(key);
                } else {
                    let gl_ref = self.gl.as_ref();
                    let renderbuffer = gl_ref.create_renderbuffer();
                    gl_ref.bind_renderbuffer(Some(renderbuffer));
                    gl_ref.renderbuffer_storage_multisample(
                        descriptor.samples,
                        internal_format,
                        width,
                        height,
                    );
                    gl_ref.framebuffer_renderbuffer(gl::FRAMEBUFFER, attachment, renderbuffer);
                    gl_ref.bind_renderbuffer(None);
                    own_depth = Some(renderbuffer);
                }
            }

            failed |= !self.check_framebuffer(&descriptor.name, "multisampled framebuffer");

            // The main multisampled framebuffer cannot resolve into
            // texture-backed destinations in one blit under MRT, so each
            // color attachment gets its own source/destination pair.
            let mut pairs = Vec::new();
            if descriptor.color_buffers.len() > 1 {
                for (index, color) in descriptor.color_buffers.iter().enumerate() {
                    let msaa_framebuffer = self.gl.create_framebuffer();
                    self.set_framebuffer(Some(msaa_framebuffer));
                    self.gl.framebuffer_renderbuffer(
                        gl::FRAMEBUFFER,
                        gl::COLOR_ATTACHMENT0,
                        msaa_colors[index],
                    );
                    failed |= !self.check_framebuffer(&descriptor.name, "resolve pair source");

                    let resolve_framebuffer = self.gl.create_framebuffer();
                    self.set_framebuffer(Some(resolve_framebuffer));
                    if let Some(native) = color.state().platform.texture {
                        let tex_target = color_attach_target(color, descriptor.face);
                        self.gl.framebuffer_texture_2d(
                            gl::FRAMEBUFFER,
                            gl::COLOR_ATTACHMENT0,
                            tex_target,
                            native,
                            0,
                        );
                    }
                    failed |=
                        !self.check_framebuffer(&descriptor.name, "resolve pair destination");

                    pairs.push(FramebufferPair {
                        msaa: msaa_framebuffer,
                        resolve: resolve_framebuffer,
                    });
                }
                self.set_framebuffer(Some(render_framebuffer));
            }

            let mut state = target.state();
            state.platform.resolve_framebuffer = Some(first_framebuffer);
            state.platform.framebuffer = Some(render_framebuffer);
            state.platform.msaa_color_renderbuffers = msaa_colors;
            state.platform.msaa_depth_renderbuffer = own_depth;
            state.platform.shared_msaa_depth = shared_depth;
            state.platform.pairs = pairs;
            state.platform.failed = failed;
            state.platform.initialized = true;
        } else {
            let mut state = target.state();
            state.platform.framebuffer = Some(first_framebuffer);
            state.platform.failed = failed;
            state.platform.initialized = true;
        }
    }

    /// Blit the multisampled framebuffer into its single-sampled resolve
    /// destination.
    ///
    /// Blitting honors the scissor rectangle, so the scissor is forced to
    /// the full target size first. Under MRT each color attachment resolves
    /// through its own framebuffer pair.
    pub fn resolve_render_target(&mut self, target: &Arc<RenderTarget>, color: bool, depth: bool) {
        let (render_fb, resolve_fb, pairs) = {
            let state = target.state();
            (
                state.platform.framebuffer,
                state.platform.resolve_framebuffer,
                state.platform.pairs.clone(),
            )
        };
        let (Some(render_fb), Some(resolve_fb)) = (render_fb, resolve_fb) else {
            log::debug!(
                "GraphicsDevice: resolve on single-sampled target '{}' ignored",
                target.name()
            );
            return;
        };

        let width = target.width();
        let height = target.height();
        self.set_scissor(Rect::from_dimensions(width, height));

        let gl_ref = self.gl.as_ref();
        if !pairs.is_empty() {
            if color {
                for pair in &pairs {
                    gl_ref.bind_framebuffer(gl::READ_FRAMEBUFFER, Some(pair.msaa));
                    gl_ref.bind_framebuffer(gl::DRAW_FRAMEBUFFER, Some(pair.resolve));
                    gl_ref.blit_framebuffer(
                        0,
                        0,
                        width as i32,
                        height as i32,
                        0,
                        0,
                        width as i32,
                        height as i32,
                        gl::COLOR_BUFFER_BIT,
                        gl::NEAREST,
                    );
                }
            }
            if depth {
                gl_ref.bind_framebuffer(gl::READ_FRAMEBUFFER, Some(render_fb));
                gl_ref.bind_framebuffer(gl::DRAW_FRAMEBUFFER, Some(resolve_fb));
                gl_ref.blit_framebuffer(
                    0,
                    0,
                    width as i32,
                    height as i32,
                    0,
                    0,
                    width as i32,
                    height as i32,
                    gl::DEPTH_BUFFER_BIT,
                    gl::NEAREST,
                );
            }
        } else {
            let mut mask = 0;
            if color {
                mask |= gl::COLOR_BUFFER_BIT;
            }
            if depth {
                mask |= gl::DEPTH_BUFFER_BIT;
            }
            if mask == 0 {
                return;
            }
            gl_ref.bind_framebuffer(gl::READ_FRAMEBUFFER, Some(render_fb));
            gl_ref.bind_framebuffer(gl::DRAW_FRAMEBUFFER, Some(resolve_fb));
            gl_ref.blit_framebuffer(
                0,
                0,
                width as i32,
                height as i32,
                0,
                0,
                width as i32,
                height as i32,
                mask,
                gl::NEAREST,
            );
        }

        // the read/draw binds above invalidated the framebuffer shadow
        self.bound_framebuffer = None;
        self.set_framebuffer(Some(render_fb));
    }

    /// Copy between render targets (or the backbuffer) with a region blit.
    pub fn copy_render_target(
        &mut self,
        source: Option<&Arc<RenderTarget>>,
        dest: Option<&Arc<RenderTarget>>,
        color: bool,
        depth: bool,
    ) -> bool {
        if color {
            match (source, dest) {
                (Some(source), None) => {
                    if source.descriptor().color_buffers.is_empty() {
                        log::error!(
                            "GraphicsDevice: can't copy empty color buffer to backbuffer"
                        );
                        return false;
                    }
                }
                (Some(source), Some(dest)) => {
                    let source_format = source
                        .descriptor()
                        .color_buffers
                        .first()
                        .map(|t| t.descriptor().format);
                    let dest_format = dest
                        .descriptor()
                        .color_buffers
                        .first()
                        .map(|t| t.descriptor().format);
                    let (Some(source_format), Some(dest_format)) = (source_format, dest_format)
                    else {
                        log::error!(
                            "GraphicsDevice: can't copy color, a render target has no color \
                             buffer"
                        );
                        return false;
                    };
                    if source_format != dest_format {
                        log::error!(
                            "GraphicsDevice: can't copy render targets of different color \
                             formats"
                        );
                        return false;
                    }
                }
                _ => {}
            }
        }
        if depth {
            if let (Some(source), Some(dest)) = (source, dest) {
                let source_depth = source.descriptor().depth_buffer.is_some()
                    || source.descriptor().depth;
                let dest_depth =
                    dest.descriptor().depth_buffer.is_some() || dest.descriptor().depth;
                if !source_depth || !dest_depth {
                    log::error!(
                        "GraphicsDevice: can't copy depth, a render target has no depth buffer"
                    );
                    return false;
                }
            }
        }

        if let Some(dest) = dest {
            if !dest.is_initialized() {
                self.init_render_target(dest);
            }
        }
        if let Some(source) = source {
            if !source.is_initialized() {
                self.init_render_target(source);
            }
        }

        let (width, height) = match (source, dest) {
            (Some(source), _) => (source.width(), source.height()),
            (None, Some(dest)) => (dest.width(), dest.height()),
            (None, None) => (self.width, self.height),
        };

        let read = source.and_then(|t| t.state().platform.framebuffer);
        let draw = dest.and_then(|t| t.state().platform.framebuffer);

        let gl_ref = self.gl.as_ref();
        gl_ref.bind_framebuffer(gl::READ_FRAMEBUFFER, read);
        gl_ref.bind_framebuffer(gl::DRAW_FRAMEBUFFER, draw);
        let mut mask = 0;
        if color {
            mask |= gl::COLOR_BUFFER_BIT;
        }
        if depth {
            mask |= gl::DEPTH_BUFFER_BIT;
        }
        gl_ref.blit_framebuffer(
            0,
            0,
            width as i32,
            height as i32,
            0,
            0,
            width as i32,
            height as i32,
            mask,
            gl::NEAREST,
        );

        // restore the draw framebuffer of the active target
        self.bound_framebuffer = None;
        let current = self
            .render_target
            .as_ref()
            .and_then(|t| t.state().platform.framebuffer);
        self.set_framebuffer(current);
        true
    }

    // ========================================================================
    // Render passes
    // ========================================================================

    /// Begin a render pass: binds (initializing if needed) the given
    /// target, sets viewport and scissor to the full target size, and
    /// performs the requested clears. Nesting passes is a programmer error
    /// and is reported, not tolerated silently.
    pub fn start_render_pass(
        &mut self,
        target: Option<&Arc<RenderTarget>>,
        pass: &RenderPassDesc,
    ) {
        if self.inside_render_pass {
            log::error!(
                "GraphicsDevice: render pass '{}' started inside another render pass",
                pass.name
            );
        }
        self.set_render_target(target);
        self.update_begin();

        let (width, height) = match &self.render_target {
            Some(target) => (target.width(), target.height()),
            None => (self.width, self.height),
        };
        self.set_viewport(Rect::from_dimensions(width, height));
        self.set_scissor(Rect::from_dimensions(width, height));

        let mut flags = ClearFlags::empty();
        let mut options = ClearOptions {
            flags: ClearFlags::empty(),
            ..Default::default()
        };
        if let Some(color) = pass.color_ops.first().and_then(|ops| ops.clear) {
            flags |= ClearFlags::COLOR;
            options.color = color;
        }
        if let Some(depth) = pass.depth_stencil_ops.clear_depth {
            flags |= ClearFlags::DEPTH;
            options.depth = depth;
        }
        if let Some(stencil) = pass.depth_stencil_ops.clear_stencil {
            flags |= ClearFlags::STENCIL;
            options.stencil = stencil;
        }
        if !flags.is_empty() {
            options.flags = flags;
            self.clear(&options);
        }

        self.inside_render_pass = true;
    }

    /// End a render pass: invalidates attachments that need not persist,
    /// resolves multisampling, and regenerates mip chains where requested.
    pub fn end_render_pass(&mut self, pass: &RenderPassDesc) {
        self.unbind_vao();

        if let Some(target) = self.render_target.clone() {
            let mut invalidate = Vec::new();
            for (index, ops) in pass.color_ops.iter().enumerate() {
                if !(ops.store || ops.resolve) {
                    invalidate.push(gl::COLOR_ATTACHMENT0 + index as u32);
                }
            }
            if !pass.depth_stencil_ops.store_depth {
                invalidate.push(gl::DEPTH_ATTACHMENT);
            }
            if !pass.depth_stencil_ops.store_stencil {
                invalidate.push(gl::STENCIL_ATTACHMENT);
            }
            if !invalidate.is_empty() {
                self.gl
                    .invalidate_framebuffer(gl::DRAW_FRAMEBUFFER, &invalidate);
            }

            if target.samples() > 1
                && target.descriptor().auto_resolve
                && pass.color_ops.iter().any(|ops| ops.resolve)
            {
                let depth =
                    pass.depth_stencil_ops.store_depth && target.descriptor().depth_buffer.is_some();
                self.resolve_render_target(&target, true, depth);
            }

            for (index, ops) in pass.color_ops.iter().enumerate() {
                if !ops.mipmaps {
                    continue;
                }
                if let Some(color) = target.descriptor().color_buffers.get(index) {
                    if color.descriptor().mipmaps {
                        self.generate_texture_mipmaps(&Arc::clone(color));
                    }
                }
            }
        }

        self.inside_render_pass = false;
    }

    // ========================================================================
    // Readback
    // ========================================================================

    /// Synchronously read pixels from the bound framebuffer as RGBA8.
    pub fn read_pixels(&mut self, x: u32, y: u32, width: u32, height: u32, dest: &mut [u8]) {
        self.gl
            .read_pixels(x, y, width, height, gl::RGBA, gl::UNSIGNED_BYTE, dest);
    }

    /// Start an asynchronous pixel readback.
    ///
    /// Copies the region into a staging buffer and fences the copy; poll
    /// the returned handle with [`Self::poll_readback`]. Abandoning the
    /// handle leaks fence and staging buffer until the driver signals.
    pub fn read_pixels_async(&mut self, x: u32, y: u32, width: u32, height: u32) -> PixelReadback {
        let byte_len = (width as usize) * (height as usize) * 4;
        let gl_ref = self.gl.as_ref();
        let buffer = gl_ref.create_buffer();
        gl_ref.bind_buffer(gl::PIXEL_PACK_BUFFER, Some(buffer));
        gl_ref.buffer_data_size(gl::PIXEL_PACK_BUFFER, byte_len, gl::STREAM_READ);
        gl_ref.read_pixels_to_pack_buffer(x, y, width, height, gl::RGBA, gl::UNSIGNED_BYTE);
        gl_ref.bind_buffer(gl::PIXEL_PACK_BUFFER, None);
        let fence = gl_ref.fence_sync();
        gl_ref.flush();
        PixelReadback {
            buffer,
            fence,
            byte_len,
            finished: false,
        }
    }

    /// Poll an asynchronous readback without blocking.
    pub fn poll_readback(&mut self, readback: &mut PixelReadback) -> ReadbackStatus {
        if readback.finished {
            return ReadbackStatus::Failed;
        }
        let gl_ref = self.gl.as_ref();
        let status = gl_ref.client_wait_sync(readback.fence, 0);
        if status.is_signaled() {
            let mut data = vec![0u8; readback.byte_len];
            gl_ref.bind_buffer(gl::PIXEL_PACK_BUFFER, Some(readback.buffer));
            gl_ref.get_buffer_sub_data(gl::PIXEL_PACK_BUFFER, 0, &mut data);
            gl_ref.bind_buffer(gl::PIXEL_PACK_BUFFER, None);
            gl_ref.delete_buffer(readback.buffer);
            gl_ref.delete_sync(readback.fence);
            readback.finished = true;
            ReadbackStatus::Ready(data)
        } else if status == crate::backend::SyncStatus::WaitFailed {
            gl_ref.delete_buffer(readback.buffer);
            gl_ref.delete_sync(readback.fence);
            readback.finished = true;
            ReadbackStatus::Failed
        } else {
            ReadbackStatus::Pending
        }
    }

    // ========================================================================
    // Context loss and restoration
    // ========================================================================

    /// Handle a context-loss event: every native handle is forgotten (not
    /// released) and the device refuses real work until restored.
    pub fn lose_context(&mut self) {
        if self.lost {
            return;
        }
        self.lost = true;
        log::warn!("GraphicsDevice: context lost");

        for shader in collect_live(&mut self.shaders) {
            shader.state().lose_context();
        }
        for texture in collect_live(&mut self.textures) {
            {
                let mut state = texture.state();
                VramStats::apply(&mut self.vram.texture, -(state.platform.gpu_size as i64));
                state.platform.lose_context();
            }
            texture.dirty_all();
        }
        for buffer in collect_live(&mut self.buffers) {
            let mut state = buffer.state();
            let delta = -(state.platform.allocated_len() as i64);
            match buffer.target() {
                BufferTarget::Vertex => VramStats::apply(&mut self.vram.vertex_buffer, delta),
                BufferTarget::Index => VramStats::apply(&mut self.vram.index_buffer, delta),
            }
            state.platform.lose_context();
            state.dirty = true;
        }
        for target in collect_live(&mut self.targets) {
            target.state().platform.lose_context();
        }

        self.vao_cache.forget();
        self.msaa_depth_cache.clear();
        self.vertex_shader_cache.clear();
        self.fragment_shader_cache.clear();

        self.fire(DeviceEvent::Lost);
    }

    /// Handle a context-restored event: capabilities are re-discovered,
    /// render state is re-baselined, shaders recompile, and buffers
    /// re-upload from their retained data. Textures re-upload lazily on
    /// next bind.
    pub fn restore_context(&mut self) {
        if !self.lost {
            return;
        }
        log::info!("GraphicsDevice: context restored");

        // a restored context may land on a different adapter
        let raw = self.gl.capabilities();
        self.extensions = self.gl.extensions();
        self.caps = Capabilities::derive(raw, &self.extensions);

        self.initialize_render_state();
        self.initialize_context_caches();
        self.lost = false;

        for shader in collect_live(&mut self.shaders) {
            let mut state = shader.state();
            state.compile_and_link(
                self.gl.as_ref(),
                shader.definition(),
                &mut self.vertex_shader_cache,
                &mut self.fragment_shader_cache,
            );
        }
        for buffer in collect_live(&mut self.buffers) {
            self.unlock_buffer(&buffer);
        }

        self.fire(DeviceEvent::Restored);
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("backend", &self.gl.name())
            .field("size", &(self.width, self.height))
            .field("lost", &self.lost)
            .finish()
    }
}

fn color_attach_target(texture: &Arc<Texture>, face: u32) -> u32 {
    if texture.descriptor().dimension == TextureDimension::Cube {
        gl::TEXTURE_CUBE_MAP_POSITIVE_X + face
    } else {
        gl::TEXTURE_2D
    }
}

/// Commit one non-sampler uniform through the typed dispatch.
///
/// Scalar and vector commits short-circuit when the incoming value equals
/// what the binding last received; matrix and array commits always upload.
fn commit_uniform(gl: &dyn GlBackend, input: &mut ShaderInput, value: &UniformValue) {
    use UniformType as T;
    use UniformValue as V;

    let cheap_compare = matches!(
        input.ty,
        T::Bool
            | T::Int
            | T::Float
            | T::Vec2
            | T::Vec3
            | T::Vec4
            | T::IVec2
            | T::IVec3
            | T::IVec4
            | T::BVec2
            | T::BVec3
            | T::BVec4
    );
    if cheap_compare && input.committed.as_ref() == Some(value) {
        return;
    }

    match (input.ty, value) {
        (T::Bool, V::Bool(v)) => gl.uniform1i(input.location, *v as i32),
        (T::Bool | T::Int, V::Int(v)) => gl.uniform1i(input.location, *v),
        (T::Float, V::Float(v)) => gl.uniform1f(input.location, *v),
        (T::Vec2, V::Vec2(v)) => gl.uniform2fv(input.location, v),
        (T::Vec3, V::Vec3(v)) => gl.uniform3fv(input.location, v),
        (T::Vec4, V::Vec4(v)) => gl.uniform4fv(input.location, v),
        (T::IVec2 | T::BVec2, V::IVec2(v)) => gl.uniform2iv(input.location, v),
        (T::IVec3 | T::BVec3, V::IVec3(v)) => gl.uniform3iv(input.location, v),
        (T::IVec4 | T::BVec4, V::IVec4(v)) => gl.uniform4iv(input.location, v),
        (T::Mat2, V::Mat2(v)) => gl.uniform_matrix2fv(input.location, v),
        (T::Mat3, V::Mat3(v)) => gl.uniform_matrix3fv(input.location, v),
        (T::Mat4, V::Mat4(v)) => gl.uniform_matrix4fv(input.location, v),
        (T::FloatArray, V::FloatArray(v)) => gl.uniform1fv(input.location, v),
        (T::Vec2Array, V::FloatArray(v)) => gl.uniform2fv(input.location, v),
        (T::Vec3Array, V::FloatArray(v)) => gl.uniform3fv(input.location, v),
        (T::Vec4Array, V::FloatArray(v)) => gl.uniform4fv(input.location, v),
        (T::IntArray, V::IntArray(v)) => gl.uniform1iv(input.location, v),
        (T::Mat4Array, V::FloatArray(v)) => gl.uniform_matrix4fv(input.location, v),
        _ => {
            log::debug!(
                "GraphicsDevice: uniform '{}' value does not match its declared type {:?}",
                input.name,
                input.ty
            );
            return;
        }
    }

    if cheap_compare {
        input.committed = Some(value.clone());
    }
}

// ============================================================================
// Native constant mappings
// ============================================================================

fn primitive_type_to_native(kind: PrimitiveType) -> u32 {
    match kind {
        PrimitiveType::Points => gl::POINTS,
        PrimitiveType::Lines => gl::LINES,
        PrimitiveType::LineLoop => gl::LINE_LOOP,
        PrimitiveType::LineStrip => gl::LINE_STRIP,
        PrimitiveType::Triangles => gl::TRIANGLES,
        PrimitiveType::TriangleStrip => gl::TRIANGLE_STRIP,
        PrimitiveType::TriangleFan => gl::TRIANGLE_FAN,
    }
}

fn blend_factor_to_native(factor: crate::types::BlendFactor) -> u32 {
    use crate::types::BlendFactor as F;
    match factor {
        F::Zero => gl::ZERO,
        F::One => gl::ONE,
        F::SrcColor => gl::SRC_COLOR,
        F::OneMinusSrcColor => gl::ONE_MINUS_SRC_COLOR,
        F::DstColor => gl::DST_COLOR,
        F::OneMinusDstColor => gl::ONE_MINUS_DST_COLOR,
        F::SrcAlpha => gl::SRC_ALPHA,
        F::SrcAlphaSaturate => gl::SRC_ALPHA_SATURATE,
        F::OneMinusSrcAlpha => gl::ONE_MINUS_SRC_ALPHA,
        F::DstAlpha => gl::DST_ALPHA,
        F::OneMinusDstAlpha => gl::ONE_MINUS_DST_ALPHA,
    }
}

fn blend_equation_to_native(equation: crate::types::BlendEquation) -> u32 {
    use crate::types::BlendEquation as E;
    match equation {
        E::Add => gl::FUNC_ADD,
        E::Subtract => gl::FUNC_SUBTRACT,
        E::ReverseSubtract => gl::FUNC_REVERSE_SUBTRACT,
        E::Min => gl::MIN,
        E::Max => gl::MAX,
    }
}

fn stencil_op_to_native(op: crate::types::StencilOp) -> u32 {
    use crate::types::StencilOp as O;
    match op {
        O::Keep => gl::KEEP,
        O::Zero => gl::ZERO,
        O::Replace => gl::REPLACE,
        O::Increment => gl::INCR,
        O::IncrementWrap => gl::INCR_WRAP,
        O::Decrement => gl::DECR,
        O::DecrementWrap => gl::DECR_WRAP,
        O::Invert => gl::INVERT,
    }
}

fn cull_mode_to_native(mode: CullMode) -> u32 {
    match mode {
        CullMode::None | CullMode::Back => gl::BACK,
        CullMode::Front => gl::FRONT,
        CullMode::FrontAndBack => gl::FRONT_AND_BACK,
    }
}

fn clear_flags_to_native(flags: ClearFlags) -> u32 {
    let mut mask = 0;
    if flags.contains(ClearFlags::COLOR) {
        mask |= gl::COLOR_BUFFER_BIT;
    }
    if flags.contains(ClearFlags::DEPTH) {
        mask |= gl::DEPTH_BUFFER_BIT;
    }
    if flags.contains(ClearFlags::STENCIL) {
        mask |= gl::STENCIL_BUFFER_BIT;
    }
    mask
}

fn index_format_to_native(format: IndexFormat) -> u32 {
    match format {
        IndexFormat::U8 => gl::UNSIGNED_BYTE,
        IndexFormat::U16 => gl::UNSIGNED_SHORT,
        IndexFormat::U32 => gl::UNSIGNED_INT,
    }
}

fn vertex_data_type_to_native(data_type: VertexDataType) -> u32 {
    match data_type {
        VertexDataType::I8 => gl::BYTE,
        VertexDataType::U8 => gl::UNSIGNED_BYTE,
        VertexDataType::I16 => gl::SHORT,
        VertexDataType::U16 => gl::UNSIGNED_SHORT,
        VertexDataType::I32 => gl::INT,
        VertexDataType::U32 => gl::UNSIGNED_INT,
        VertexDataType::F32 => gl::FLOAT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    fn test_device() -> (GraphicsDevice, Arc<DummyBackend>) {
        // the device shares the backend, so the test keeps inspecting calls
        let backend = Arc::new(DummyBackend::new());
        let device = GraphicsDevice::new(backend.clone(), 800, 600).unwrap();
        backend.clear_calls();
        (device, backend)
    }

    #[test]
    fn test_blend_state_idempotent() {
        let (mut device, backend) = test_device();
        let state = BlendState::alpha();
        device.set_blend_state(&state);
        let enables = backend.call_count("enable");
        let funcs = backend.call_count("blend_func") + backend.call_count("blend_func_separate");
        assert!(enables >= 1);
        assert!(funcs >= 1);

        device.set_blend_state(&state);
        assert_eq!(backend.call_count("enable"), enables);
        assert_eq!(
            backend.call_count("blend_func") + backend.call_count("blend_func_separate"),
            funcs
        );
    }

    #[test]
    fn test_viewport_scissor_idempotent() {
        let (mut device, backend) = test_device();
        device.set_viewport(Rect::from_dimensions(640, 480));
        device.set_viewport(Rect::from_dimensions(640, 480));
        assert_eq!(backend.call_count("viewport"), 1);

        device.set_scissor(Rect::new(10, 10, 100, 100));
        device.set_scissor(Rect::new(10, 10, 100, 100));
        assert_eq!(backend.call_count("scissor"), 1);
    }

    #[test]
    fn test_cull_mode_idempotent_and_disable() {
        let (mut device, backend) = test_device();
        device.set_cull_mode(CullMode::Back);
        assert_eq!(backend.call_count("cull_face"), 0);

        device.set_cull_mode(CullMode::Front);
        assert_eq!(backend.call_count("cull_face"), 1);

        device.set_cull_mode(CullMode::None);
        assert_eq!(backend.call_count("disable"), 1);

        device.set_cull_mode(CullMode::Front);
        assert_eq!(backend.call_count("enable"), 1);
        assert_eq!(backend.call_count("cull_face"), 2);
    }

    #[test]
    fn test_depth_state_partial_updates() {
        let (mut device, backend) = test_device();
        let mut state = DepthState::default();
        device.set_depth_state(&state);
        assert_eq!(backend.call_count("depth_func"), 0);
        assert_eq!(backend.call_count("depth_mask"), 0);

        state.write = false;
        device.set_depth_state(&state);
        assert_eq!(backend.call_count("depth_mask"), 1);
        assert_eq!(backend.call_count("depth_func"), 0);
    }

    #[test]
    fn test_stencil_state_idempotent() {
        let (mut device, backend) = test_device();
        let state = StencilState {
            enabled: true,
            ..Default::default()
        };
        device.set_stencil_state(&state);
        let calls = backend.calls().len();
        device.set_stencil_state(&state);
        assert_eq!(backend.calls().len(), calls);
    }

    #[test]
    fn test_capabilities_bone_limit() {
        let raw = RawCapabilities {
            max_vertex_uniform_vectors: 256,
            ..Default::default()
        };
        let caps = Capabilities::derive(raw, &DummyBackend::full_extensions());
        // 256 - 16 - 8 - 1 - 16 = 215; 215 / 3 = 71
        assert_eq!(caps.bone_limit, 71);

        let raw = RawCapabilities {
            max_vertex_uniform_vectors: 4096,
            ..Default::default()
        };
        let caps = Capabilities::derive(raw, &DummyBackend::full_extensions());
        assert_eq!(caps.bone_limit, 128);
    }

    #[test]
    fn test_clear_respects_depth_write_shadow() {
        let (mut device, backend) = test_device();
        device.set_depth_state(&DepthState {
            write: false,
            ..Default::default()
        });
        backend.clear_calls();

        device.clear(&ClearOptions::default());
        // mask forced on for the clear, then restored
        assert_eq!(backend.call_count("depth_mask"), 2);
        assert_eq!(backend.call_count("clear"), 1);
    }

    #[test]
    fn test_clear_skips_cached_clear_values() {
        let (mut device, backend) = test_device();
        let options = ClearOptions {
            color: [0.5, 0.5, 0.5, 1.0],
            ..Default::default()
        };
        device.clear(&options);
        assert_eq!(backend.call_count("clear_color"), 1);

        device.clear(&options);
        assert_eq!(backend.call_count("clear_color"), 1);
        assert_eq!(backend.call_count("clear"), 2);
    }

    #[test]
    fn test_frame_start_applies_resize() {
        let (mut device, _backend) = test_device();
        device.set_resolution(1024, 768);
        assert_eq!(device.width(), 800);
        device.frame_start();
        assert_eq!(device.width(), 1024);
        assert_eq!(device.height(), 768);
    }

    #[test]
    fn test_new_rejects_dead_context() {
        let backend = Arc::new(DummyBackend::with_capabilities(RawCapabilities {
            max_texture_size: 0,
            ..Default::default()
        }));
        let result = GraphicsDevice::new(backend, 100, 100);
        assert!(matches!(
            result,
            Err(GraphicsError::InitializationFailed(_))
        ));
    }

    #[test]
    fn test_device_events_fire_once_per_transition() {
        let (mut device, _backend) = test_device();
        let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = events.clone();
        device.on_device_event(Box::new(move |event| sink.lock().push(event)));

        device.lose_context();
        device.lose_context();
        device.restore_context();
        device.restore_context();

        assert_eq!(
            *events.lock(),
            vec![DeviceEvent::Lost, DeviceEvent::Restored]
        );
    }
}
