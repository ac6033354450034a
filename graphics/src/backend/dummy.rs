//! Dummy GPU backend for testing and development.
//!
//! This backend performs no GPU work but records every call it receives,
//! in order, with per-name counts. The test suite uses it as the spy
//! native layer: redundant-call coalescing, draw skipping, and cache reuse
//! are all asserted by inspecting the recorded call stream.
//!
//! Introspection is simulated by scanning attached shader sources for
//! `attribute`/`in`/`uniform` declarations, so the compile, link and
//! post-link pipeline runs end-to-end without a driver. Failure paths are
//! reachable through the injection knobs: a forced compile error for
//! sources containing a marker string, a forced framebuffer status, and a
//! configurable number of fence polls before signaling.

use parking_lot::Mutex;
use std::collections::HashMap;

use super::consts as gl;
use super::{
    AnisotropyConstants, AstcConstants, AtcConstants, BufferId, Etc1Constants, Etc2Constants,
    Extensions, FenceId, FramebufferId, GlBackend, ProgramId, PvrtcConstants, RawCapabilities,
    RenderbufferId, S3tcConstants, ShaderStageId, ShaderVariableInfo, SyncStatus, TextureId,
    UniformLocation, VaoId,
};

/// One recorded native call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Call name, e.g. `"uniform4fv"`.
    pub name: &'static str,
    /// Formatted arguments.
    pub detail: String,
}

#[derive(Debug, Default)]
struct ShaderRecord {
    stage: u32,
    source: String,
    compiled: bool,
    compile_ok: bool,
}

#[derive(Debug, Default)]
struct ProgramRecord {
    shaders: Vec<ShaderStageId>,
    linked: bool,
    locations: HashMap<String, i32>,
    next_location: i32,
}

#[derive(Debug, Default)]
struct DummyState {
    calls: Vec<Call>,
    next_handle: u32,
    shaders: HashMap<u32, ShaderRecord>,
    programs: HashMap<u32, ProgramRecord>,
    fences: HashMap<u32, u32>,
    // injection knobs
    fail_compile_marker: Option<(String, u32, String)>,
    framebuffer_status: u32,
    fence_polls_until_signal: u32,
    link_fails: bool,
}

/// Recording no-op GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    state: Mutex<DummyState>,
    capabilities: RawCapabilities,
    extensions: Extensions,
}

impl DummyBackend {
    /// Create a new dummy backend with default capabilities and the full
    /// extension set.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DummyState {
                framebuffer_status: gl::FRAMEBUFFER_COMPLETE,
                ..Default::default()
            }),
            capabilities: RawCapabilities::default(),
            extensions: Self::full_extensions(),
        }
    }

    /// Create a dummy backend with a specific extension set.
    pub fn with_extensions(extensions: Extensions) -> Self {
        Self {
            extensions,
            ..Self::new()
        }
    }

    /// Create a dummy backend with specific capabilities.
    pub fn with_capabilities(capabilities: RawCapabilities) -> Self {
        Self {
            capabilities,
            ..Self::new()
        }
    }

    /// The full extension set with canonical native constant values.
    pub fn full_extensions() -> Extensions {
        Extensions {
            compressed_s3tc: Some(S3tcConstants {
                compressed_rgb_dxt1: 0x83F0,
                compressed_rgba_dxt3: 0x83F2,
                compressed_rgba_dxt5: 0x83F3,
            }),
            compressed_etc1: Some(Etc1Constants {
                compressed_rgb_etc1: 0x8D64,
            }),
            compressed_etc2: Some(Etc2Constants {
                compressed_rgb8_etc2: 0x9274,
                compressed_rgba8_etc2_eac: 0x9278,
            }),
            compressed_pvrtc: Some(PvrtcConstants {
                compressed_rgb_2bpp: 0x8C01,
                compressed_rgba_2bpp: 0x8C03,
                compressed_rgb_4bpp: 0x8C00,
                compressed_rgba_4bpp: 0x8C02,
            }),
            compressed_astc: Some(AstcConstants {
                compressed_rgba_4x4: 0x93B0,
            }),
            compressed_atc: Some(AtcConstants {
                compressed_rgb: 0x8C92,
                compressed_rgba_interpolated: 0x87EE,
            }),
            anisotropy: Some(AnisotropyConstants {
                texture_max_anisotropy: 0x84FE,
                max_anisotropy: 16.0,
            }),
            texture_float: true,
            texture_half_float: true,
            texture_float_linear: true,
            color_buffer_float: true,
            color_buffer_half_float: true,
            uint_element: true,
        }
    }

    // --- Test inspection API ---

    /// All recorded calls in order.
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Number of recorded calls with the given name.
    pub fn call_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.name == name)
            .count()
    }

    /// Detail string of the most recent call with the given name.
    pub fn last_call(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .calls
            .iter()
            .rev()
            .find(|c| c.name == name)
            .map(|c| c.detail.clone())
    }

    /// Forget all recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    // --- Failure injection ---

    /// Force shader compilation to fail for sources containing `marker`,
    /// reporting an error at `line` with the given message.
    pub fn fail_compile_containing(&self, marker: &str, line: u32, message: &str) {
        self.state.lock().fail_compile_marker =
            Some((marker.to_string(), line, message.to_string()));
    }

    /// Force program linking to fail.
    pub fn fail_link(&self, fail: bool) {
        self.state.lock().link_fails = fail;
    }

    /// Force `check_framebuffer_status` to report the given status.
    pub fn set_framebuffer_status(&self, status: u32) {
        self.state.lock().framebuffer_status = status;
    }

    /// Number of `client_wait_sync` polls before a new fence signals.
    pub fn set_fence_polls_until_signal(&self, polls: u32) {
        self.state.lock().fence_polls_until_signal = polls;
    }

    fn record(&self, name: &'static str, detail: String) {
        log::trace!("DummyBackend: {name}({detail})");
        self.state.lock().calls.push(Call { name, detail });
    }

    fn alloc(&self) -> u32 {
        let mut state = self.state.lock();
        state.next_handle += 1;
        state.next_handle
    }

    /// Map a GLSL type keyword to its native type constant.
    fn glsl_type(keyword: &str) -> Option<u32> {
        Some(match keyword {
            "float" => gl::FLOAT,
            "vec2" => gl::FLOAT_VEC2,
            "vec3" => gl::FLOAT_VEC3,
            "vec4" => gl::FLOAT_VEC4,
            "int" => gl::INT,
            "ivec2" => gl::INT_VEC2,
            "ivec3" => gl::INT_VEC3,
            "ivec4" => gl::INT_VEC4,
            "bool" => gl::BOOL,
            "bvec2" => gl::BOOL_VEC2,
            "bvec3" => gl::BOOL_VEC3,
            "bvec4" => gl::BOOL_VEC4,
            "mat2" => gl::FLOAT_MAT2,
            "mat3" => gl::FLOAT_MAT3,
            "mat4" => gl::FLOAT_MAT4,
            "sampler2D" => gl::SAMPLER_2D,
            "samplerCube" => gl::SAMPLER_CUBE,
            "sampler3D" => gl::SAMPLER_3D,
            "sampler2DShadow" => gl::SAMPLER_2D_SHADOW,
            "samplerCubeShadow" => gl::SAMPLER_CUBE_SHADOW,
            "sampler2DArray" => gl::SAMPLER_2D_ARRAY,
            _ => return None,
        })
    }

    /// Scan a source for declarations introduced by any of `keywords`.
    ///
    /// Handles `keyword type name;` and `keyword type name[N];` forms, which
    /// covers the declaration style the engine's shader collaborators emit.
    fn scan_declarations(source: &str, keywords: &[&str]) -> Vec<ShaderVariableInfo> {
        let mut out: Vec<ShaderVariableInfo> = Vec::new();
        for line in source.lines() {
            let line = line.trim();
            let mut words = line.split_whitespace();
            let Some(first) = words.next() else {
                continue;
            };
            if !keywords.contains(&first) {
                continue;
            }
            let Some(ty) = words.next().and_then(Self::glsl_type) else {
                continue;
            };
            let Some(raw_name) = words.next() else {
                continue;
            };
            let raw_name = raw_name.trim_end_matches(';');
            let (name, array_size) = match raw_name.split_once('[') {
                Some((name, rest)) => {
                    let count = rest
                        .trim_end_matches(']')
                        .parse::<u32>()
                        .unwrap_or(1)
                        .max(1);
                    (name, count)
                }
                None => (raw_name, 1),
            };
            if name.is_empty() || out.iter().any(|v| v.name == name) {
                continue;
            }
            out.push(ShaderVariableInfo {
                name: name.to_string(),
                gl_type: ty,
                array_size,
            });
        }
        out
    }

    fn program_sources(&self, program: ProgramId) -> Vec<(u32, String)> {
        let state = self.state.lock();
        let Some(record) = state.programs.get(&program.0) else {
            return Vec::new();
        };
        record
            .shaders
            .iter()
            .filter_map(|id| state.shaders.get(&id.0))
            .map(|s| (s.stage, s.source.clone()))
            .collect()
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GlBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn capabilities(&self) -> RawCapabilities {
        self.capabilities.clone()
    }

    fn extensions(&self) -> Extensions {
        self.extensions.clone()
    }

    // --- Buffers ---

    fn create_buffer(&self) -> BufferId {
        let id = self.alloc();
        self.record("create_buffer", format!("-> {id}"));
        BufferId(id)
    }

    fn delete_buffer(&self, buffer: BufferId) {
        self.record("delete_buffer", format!("{}", buffer.0));
    }

    fn bind_buffer(&self, target: u32, buffer: Option<BufferId>) {
        self.record(
            "bind_buffer",
            format!("{target:#x}, {:?}", buffer.map(|b| b.0)),
        );
    }

    fn buffer_data(&self, target: u32, data: &[u8], usage: u32) {
        self.record(
            "buffer_data",
            format!("{target:#x}, {} bytes, {usage:#x}", data.len()),
        );
    }

    fn buffer_data_size(&self, target: u32, size: usize, usage: u32) {
        self.record(
            "buffer_data_size",
            format!("{target:#x}, {size} bytes, {usage:#x}"),
        );
    }

    fn buffer_sub_data(&self, target: u32, offset: usize, data: &[u8]) {
        self.record(
            "buffer_sub_data",
            format!("{target:#x}, +{offset}, {} bytes", data.len()),
        );
    }

    fn get_buffer_sub_data(&self, target: u32, offset: usize, dest: &mut [u8]) {
        self.record(
            "get_buffer_sub_data",
            format!("{target:#x}, +{offset}, {} bytes", dest.len()),
        );
        dest.fill(0);
    }

    // --- Textures ---

    fn create_texture(&self) -> TextureId {
        let id = self.alloc();
        self.record("create_texture", format!("-> {id}"));
        TextureId(id)
    }

    fn delete_texture(&self, texture: TextureId) {
        self.record("delete_texture", format!("{}", texture.0));
    }

    fn active_texture(&self, unit: u32) {
        self.record("active_texture", format!("{unit}"));
    }

    fn bind_texture(&self, target: u32, texture: TextureId) {
        self.record("bind_texture", format!("{target:#x}, {}", texture.0));
    }

    fn tex_parameter_i(&self, target: u32, pname: u32, value: i32) {
        self.record(
            "tex_parameter_i",
            format!("{target:#x}, {pname:#x}, {value}"),
        );
    }

    fn tex_parameter_f(&self, target: u32, pname: u32, value: f32) {
        self.record(
            "tex_parameter_f",
            format!("{target:#x}, {pname:#x}, {value}"),
        );
    }

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
    ) {
        self.record(
            "tex_image_2d",
            format!(
                "{target:#x}, level {level}, {internal_format:#x}, {width}x{height}, \
                 {format:#x}/{component_type:#x}, {:?} bytes",
                data.map(<[u8]>::len)
            ),
        );
    }

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
    ) {
        self.record(
            "tex_sub_image_2d",
            format!(
                "{target:#x}, level {level}, ({x},{y}) {width}x{height}, \
                 {format:#x}/{component_type:#x}, {} bytes",
                data.len()
            ),
        );
    }

    fn compressed_tex_image_2d(
        &self,
        target: u32,
        level: u32,
        internal_format: u32,
        width: u32,
        height: u32,
        data: &[u8],
    ) {
        self.record(
            "compressed_tex_image_2d",
            format!(
                "{target:#x}, level {level}, {internal_format:#x}, {width}x{height}, {} bytes",
                data.len()
            ),
        );
    }

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
    ) {
        self.record(
            "tex_image_3d",
            format!(
                "{target:#x}, level {level}, {internal_format:#x}, {width}x{height}x{depth}, \
                 {format:#x}/{component_type:#x}, {:?} bytes",
                data.map(<[u8]>::len)
            ),
        );
    }

    fn compressed_tex_image_3d(
        &self,
        target: u32,
        level: u32,
        internal_format: u32,
        width: u32,
        height: u32,
        depth: u32,
        data: &[u8],
    ) {
        self.record(
            "compressed_tex_image_3d",
            format!(
                "{target:#x}, level {level}, {internal_format:#x}, {width}x{height}x{depth}, \
                 {} bytes",
                data.len()
            ),
        );
    }

    fn generate_mipmap(&self, target: u32) {
        self.record("generate_mipmap", format!("{target:#x}"));
    }

    fn pixel_store_flip_y(&self, flip: bool) {
        self.record("pixel_store_flip_y", format!("{flip}"));
    }

    fn pixel_store_premultiply_alpha(&self, premultiply: bool) {
        self.record("pixel_store_premultiply_alpha", format!("{premultiply}"));
    }

    // --- Shaders and programs ---

    fn create_shader(&self, stage: u32) -> ShaderStageId {
        let id = self.alloc();
        self.record("create_shader", format!("{stage:#x} -> {id}"));
        self.state.lock().shaders.insert(
            id,
            ShaderRecord {
                stage,
                ..Default::default()
            },
        );
        ShaderStageId(id)
    }

    fn delete_shader(&self, shader: ShaderStageId) {
        self.record("delete_shader", format!("{}", shader.0));
        self.state.lock().shaders.remove(&shader.0);
    }

    fn shader_source(&self, shader: ShaderStageId, source: &str) {
        self.record(
            "shader_source",
            format!("{}, {} chars", shader.0, source.len()),
        );
        if let Some(record) = self.state.lock().shaders.get_mut(&shader.0) {
            record.source = source.to_string();
        }
    }

    fn compile_shader(&self, shader: ShaderStageId) {
        self.record("compile_shader", format!("{}", shader.0));
        let mut state = self.state.lock();
        let failed = state
            .fail_compile_marker
            .as_ref()
            .map(|(marker, _, _)| {
                state
                    .shaders
                    .get(&shader.0)
                    .is_some_and(|s| s.source.contains(marker.as_str()))
            })
            .unwrap_or(false);
        if let Some(record) = state.shaders.get_mut(&shader.0) {
            record.compiled = true;
            record.compile_ok = !failed;
        }
    }

    fn get_shader_compile_status(&self, shader: ShaderStageId) -> bool {
        self.state
            .lock()
            .shaders
            .get(&shader.0)
            .map(|s| s.compile_ok)
            .unwrap_or(false)
    }

    fn get_shader_info_log(&self, shader: ShaderStageId) -> String {
        let state = self.state.lock();
        let ok = state
            .shaders
            .get(&shader.0)
            .map(|s| s.compile_ok)
            .unwrap_or(false);
        if ok {
            return String::new();
        }
        match &state.fail_compile_marker {
            Some((_, line, message)) => format!("ERROR: 0:{line}: {message}"),
            None => "ERROR: 0:1: unknown error".to_string(),
        }
    }

    fn create_program(&self) -> ProgramId {
        let id = self.alloc();
        self.record("create_program", format!("-> {id}"));
        self.state.lock().programs.insert(id, ProgramRecord::default());
        ProgramId(id)
    }

    fn delete_program(&self, program: ProgramId) {
        self.record("delete_program", format!("{}", program.0));
        self.state.lock().programs.remove(&program.0);
    }

    fn attach_shader(&self, program: ProgramId, shader: ShaderStageId) {
        self.record("attach_shader", format!("{}, {}", program.0, shader.0));
        if let Some(record) = self.state.lock().programs.get_mut(&program.0) {
            record.shaders.push(shader);
        }
    }

    fn bind_attrib_location(&self, program: ProgramId, location: u32, name: &str) {
        self.record(
            "bind_attrib_location",
            format!("{}, {location}, {name}", program.0),
        );
    }

    fn transform_feedback_varyings(&self, program: ProgramId, names: &[String], interleaved: bool) {
        self.record(
            "transform_feedback_varyings",
            format!("{}, {names:?}, interleaved: {interleaved}", program.0),
        );
    }

    fn link_program(&self, program: ProgramId) {
        self.record("link_program", format!("{}", program.0));
        if let Some(record) = self.state.lock().programs.get_mut(&program.0) {
            record.linked = true;
        }
    }

    fn get_program_link_status(&self, program: ProgramId) -> bool {
        let state = self.state.lock();
        if state.link_fails {
            return false;
        }
        state
            .programs
            .get(&program.0)
            .map(|p| p.linked)
            .unwrap_or(false)
    }

    fn get_program_info_log(&self, program: ProgramId) -> String {
        if self.get_program_link_status(program) {
            String::new()
        } else {
            "link failed".to_string()
        }
    }

    fn get_active_attributes(&self, program: ProgramId) -> Vec<ShaderVariableInfo> {
        for (stage, source) in self.program_sources(program) {
            if stage == gl::VERTEX_SHADER {
                return Self::scan_declarations(&source, &["attribute", "in"]);
            }
        }
        Vec::new()
    }

    fn get_active_uniforms(&self, program: ProgramId) -> Vec<ShaderVariableInfo> {
        let mut out: Vec<ShaderVariableInfo> = Vec::new();
        for (_, source) in self.program_sources(program) {
            for var in Self::scan_declarations(&source, &["uniform"]) {
                if !out.iter().any(|v| v.name == var.name) {
                    out.push(var);
                }
            }
        }
        out
    }

    fn get_uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let mut state = self.state.lock();
        let record = state.programs.get_mut(&program.0)?;
        let next = &mut record.next_location;
        let location = *record.locations.entry(name.to_string()).or_insert_with(|| {
            let loc = *next;
            *next += 1;
            loc
        });
        Some(UniformLocation(location))
    }

    fn use_program(&self, program: Option<ProgramId>) {
        self.record("use_program", format!("{:?}", program.map(|p| p.0)));
    }

    // --- Uniform upload ---

    fn uniform1i(&self, location: UniformLocation, value: i32) {
        self.record("uniform1i", format!("@{}, {value}", location.0));
    }

    fn uniform1iv(&self, location: UniformLocation, values: &[i32]) {
        self.record("uniform1iv", format!("@{}, {values:?}", location.0));
    }

    fn uniform1f(&self, location: UniformLocation, value: f32) {
        self.record("uniform1f", format!("@{}, {value}", location.0));
    }

    fn uniform1fv(&self, location: UniformLocation, values: &[f32]) {
        self.record("uniform1fv", format!("@{}, {values:?}", location.0));
    }

    fn uniform2fv(&self, location: UniformLocation, values: &[f32]) {
        self.record("uniform2fv", format!("@{}, {values:?}", location.0));
    }

    fn uniform3fv(&self, location: UniformLocation, values: &[f32]) {
        self.record("uniform3fv", format!("@{}, {values:?}", location.0));
    }

    fn uniform4fv(&self, location: UniformLocation, values: &[f32]) {
        self.record("uniform4fv", format!("@{}, {values:?}", location.0));
    }

    fn uniform2iv(&self, location: UniformLocation, values: &[i32]) {
        self.record("uniform2iv", format!("@{}, {values:?}", location.0));
    }

    fn uniform3iv(&self, location: UniformLocation, values: &[i32]) {
        self.record("uniform3iv", format!("@{}, {values:?}", location.0));
    }

    fn uniform4iv(&self, location: UniformLocation, values: &[i32]) {
        self.record("uniform4iv", format!("@{}, {values:?}", location.0));
    }

    fn uniform_matrix2fv(&self, location: UniformLocation, values: &[f32]) {
        self.record(
            "uniform_matrix2fv",
            format!("@{}, {} floats", location.0, values.len()),
        );
    }

    fn uniform_matrix3fv(&self, location: UniformLocation, values: &[f32]) {
        self.record(
            "uniform_matrix3fv",
            format!("@{}, {} floats", location.0, values.len()),
        );
    }

    fn uniform_matrix4fv(&self, location: UniformLocation, values: &[f32]) {
        self.record(
            "uniform_matrix4fv",
            format!("@{}, {} floats", location.0, values.len()),
        );
    }

    // --- Vertex arrays ---

    fn create_vertex_array(&self) -> VaoId {
        let id = self.alloc();
        self.record("create_vertex_array", format!("-> {id}"));
        VaoId(id)
    }

    fn delete_vertex_array(&self, vao: VaoId) {
        self.record("delete_vertex_array", format!("{}", vao.0));
    }

    fn bind_vertex_array(&self, vao: Option<VaoId>) {
        self.record("bind_vertex_array", format!("{:?}", vao.map(|v| v.0)));
    }

    fn enable_vertex_attrib_array(&self, location: u32) {
        self.record("enable_vertex_attrib_array", format!("{location}"));
    }

    fn vertex_attrib_pointer(
        &self,
        location: u32,
        components: u32,
        data_type: u32,
        normalized: bool,
        stride: u32,
        offset: u32,
    ) {
        self.record(
            "vertex_attrib_pointer",
            format!("{location}, {components} x {data_type:#x}, norm {normalized}, stride {stride}, +{offset}"),
        );
    }

    fn vertex_attrib_divisor(&self, location: u32, divisor: u32) {
        self.record("vertex_attrib_divisor", format!("{location}, {divisor}"));
    }

    // --- Framebuffers and renderbuffers ---

    fn create_framebuffer(&self) -> FramebufferId {
        let id = self.alloc();
        self.record("create_framebuffer", format!("-> {id}"));
        FramebufferId(id)
    }

    fn delete_framebuffer(&self, framebuffer: FramebufferId) {
        self.record("delete_framebuffer", format!("{}", framebuffer.0));
    }

    fn bind_framebuffer(&self, target: u32, framebuffer: Option<FramebufferId>) {
        self.record(
            "bind_framebuffer",
            format!("{target:#x}, {:?}", framebuffer.map(|f| f.0)),
        );
    }

    fn framebuffer_texture_2d(
        &self,
        target: u32,
        attachment: u32,
        tex_target: u32,
        texture: TextureId,
        level: u32,
    ) {
        self.record(
            "framebuffer_texture_2d",
            format!(
                "{target:#x}, {attachment:#x}, {tex_target:#x}, {}, level {level}",
                texture.0
            ),
        );
    }

    fn framebuffer_renderbuffer(&self, target: u32, attachment: u32, renderbuffer: RenderbufferId) {
        self.record(
            "framebuffer_renderbuffer",
            format!("{target:#x}, {attachment:#x}, {}", renderbuffer.0),
        );
    }

    fn create_renderbuffer(&self) -> RenderbufferId {
        let id = self.alloc();
        self.record("create_renderbuffer", format!("-> {id}"));
        RenderbufferId(id)
    }

    fn delete_renderbuffer(&self, renderbuffer: RenderbufferId) {
        self.record("delete_renderbuffer", format!("{}", renderbuffer.0));
    }

    fn bind_renderbuffer(&self, renderbuffer: Option<RenderbufferId>) {
        self.record(
            "bind_renderbuffer",
            format!("{:?}", renderbuffer.map(|r| r.0)),
        );
    }

    fn renderbuffer_storage(&self, internal_format: u32, width: u32, height: u32) {
        self.record(
            "renderbuffer_storage",
            format!("{internal_format:#x}, {width}x{height}"),
        );
    }

    fn renderbuffer_storage_multisample(
        &self,
        samples: u32,
        internal_format: u32,
        width: u32,
        height: u32,
    ) {
        self.record(
            "renderbuffer_storage_multisample",
            format!("{samples} samples, {internal_format:#x}, {width}x{height}"),
        );
    }

    fn check_framebuffer_status(&self, target: u32) -> u32 {
        self.record("check_framebuffer_status", format!("{target:#x}"));
        self.state.lock().framebuffer_status
    }

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
    ) {
        self.record(
            "blit_framebuffer",
            format!(
                "({src_x0},{src_y0})-({src_x1},{src_y1}) -> \
                 ({dst_x0},{dst_y0})-({dst_x1},{dst_y1}), mask {mask:#x}, filter {filter:#x}"
            ),
        );
    }

    fn invalidate_framebuffer(&self, target: u32, attachments: &[u32]) {
        self.record(
            "invalidate_framebuffer",
            format!("{target:#x}, {attachments:#x?}"),
        );
    }

    // --- Render state ---

    fn enable(&self, capability: u32) {
        self.record("enable", format!("{capability:#x}"));
    }

    fn disable(&self, capability: u32) {
        self.record("disable", format!("{capability:#x}"));
    }

    fn blend_func(&self, src: u32, dst: u32) {
        self.record("blend_func", format!("{src:#x}, {dst:#x}"));
    }

    fn blend_func_separate(&self, src: u32, dst: u32, src_alpha: u32, dst_alpha: u32) {
        self.record(
            "blend_func_separate",
            format!("{src:#x}, {dst:#x}, {src_alpha:#x}, {dst_alpha:#x}"),
        );
    }

    fn blend_equation(&self, equation: u32) {
        self.record("blend_equation", format!("{equation:#x}"));
    }

    fn blend_equation_separate(&self, equation: u32, alpha_equation: u32) {
        self.record(
            "blend_equation_separate",
            format!("{equation:#x}, {alpha_equation:#x}"),
        );
    }

    fn color_mask(&self, r: bool, g: bool, b: bool, a: bool) {
        self.record("color_mask", format!("{r}, {g}, {b}, {a}"));
    }

    fn depth_func(&self, func: u32) {
        self.record("depth_func", format!("{func:#x}"));
    }

    fn depth_mask(&self, write: bool) {
        self.record("depth_mask", format!("{write}"));
    }

    fn stencil_func(&self, func: u32, reference: u32, mask: u32) {
        self.record("stencil_func", format!("{func:#x}, {reference}, {mask:#x}"));
    }

    fn stencil_func_separate(&self, face: u32, func: u32, reference: u32, mask: u32) {
        self.record(
            "stencil_func_separate",
            format!("{face:#x}, {func:#x}, {reference}, {mask:#x}"),
        );
    }

    fn stencil_op(&self, fail: u32, zfail: u32, zpass: u32) {
        self.record("stencil_op", format!("{fail:#x}, {zfail:#x}, {zpass:#x}"));
    }

    fn stencil_op_separate(&self, face: u32, fail: u32, zfail: u32, zpass: u32) {
        self.record(
            "stencil_op_separate",
            format!("{face:#x}, {fail:#x}, {zfail:#x}, {zpass:#x}"),
        );
    }

    fn stencil_mask(&self, mask: u32) {
        self.record("stencil_mask", format!("{mask:#x}"));
    }

    fn stencil_mask_separate(&self, face: u32, mask: u32) {
        self.record("stencil_mask_separate", format!("{face:#x}, {mask:#x}"));
    }

    fn cull_face(&self, mode: u32) {
        self.record("cull_face", format!("{mode:#x}"));
    }

    fn viewport(&self, x: i32, y: i32, width: u32, height: u32) {
        self.record("viewport", format!("({x},{y}) {width}x{height}"));
    }

    fn scissor(&self, x: i32, y: i32, width: u32, height: u32) {
        self.record("scissor", format!("({x},{y}) {width}x{height}"));
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        self.record("clear_color", format!("{r}, {g}, {b}, {a}"));
    }

    fn clear_depth(&self, depth: f32) {
        self.record("clear_depth", format!("{depth}"));
    }

    fn clear_stencil(&self, stencil: u32) {
        self.record("clear_stencil", format!("{stencil}"));
    }

    fn clear(&self, mask: u32) {
        self.record("clear", format!("{mask:#x}"));
    }

    fn polygon_offset(&self, factor: f32, units: f32) {
        self.record("polygon_offset", format!("{factor}, {units}"));
    }

    // --- Draws ---

    fn draw_arrays(&self, mode: u32, first: u32, count: u32) {
        self.record("draw_arrays", format!("{mode:#x}, {first}, {count}"));
    }

    fn draw_arrays_instanced(&self, mode: u32, first: u32, count: u32, instances: u32) {
        self.record(
            "draw_arrays_instanced",
            format!("{mode:#x}, {first}, {count}, {instances} instances"),
        );
    }

    fn draw_elements(&self, mode: u32, count: u32, index_type: u32, offset: usize) {
        self.record(
            "draw_elements",
            format!("{mode:#x}, {count}, {index_type:#x}, +{offset}"),
        );
    }

    fn draw_elements_instanced(
        &self,
        mode: u32,
        count: u32,
        index_type: u32,
        offset: usize,
        instances: u32,
    ) {
        self.record(
            "draw_elements_instanced",
            format!("{mode:#x}, {count}, {index_type:#x}, +{offset}, {instances} instances"),
        );
    }

    fn begin_transform_feedback(&self, mode: u32) {
        self.record("begin_transform_feedback", format!("{mode:#x}"));
    }

    fn end_transform_feedback(&self) {
        self.record("end_transform_feedback", String::new());
    }

    fn bind_buffer_base(&self, target: u32, index: u32, buffer: Option<BufferId>) {
        self.record(
            "bind_buffer_base",
            format!("{target:#x}, {index}, {:?}", buffer.map(|b| b.0)),
        );
    }

    // --- Readback and synchronization ---

    fn read_pixels(
        &self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        format: u32,
        component_type: u32,
        dest: &mut [u8],
    ) {
        self.record(
            "read_pixels",
            format!("({x},{y}) {width}x{height}, {format:#x}/{component_type:#x}"),
        );
        dest.fill(0);
    }

    fn read_pixels_to_pack_buffer(
        &self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        format: u32,
        component_type: u32,
    ) {
        self.record(
            "read_pixels_to_pack_buffer",
            format!("({x},{y}) {width}x{height}, {format:#x}/{component_type:#x}"),
        );
    }

    fn fence_sync(&self) -> FenceId {
        let id = self.alloc();
        self.record("fence_sync", format!("-> {id}"));
        let mut state = self.state.lock();
        let polls = state.fence_polls_until_signal;
        state.fences.insert(id, polls);
        FenceId(id)
    }

    fn client_wait_sync(&self, fence: FenceId, timeout_ns: u64) -> SyncStatus {
        self.record(
            "client_wait_sync",
            format!("{}, timeout {timeout_ns}", fence.0),
        );
        let mut state = self.state.lock();
        match state.fences.get_mut(&fence.0) {
            Some(0) => SyncStatus::AlreadySignaled,
            Some(remaining) => {
                *remaining -= 1;
                if *remaining == 0 {
                    SyncStatus::ConditionSatisfied
                } else {
                    SyncStatus::TimeoutExpired
                }
            }
            None => SyncStatus::WaitFailed,
        }
    }

    fn delete_sync(&self, fence: FenceId) {
        self.record("delete_sync", format!("{}", fence.0));
        self.state.lock().fences.remove(&fence.0);
    }

    fn flush(&self) {
        self.record("flush", String::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_recording() {
        let backend = DummyBackend::new();
        backend.enable(gl::BLEND);
        backend.enable(gl::DEPTH_TEST);
        assert_eq!(backend.call_count("enable"), 2);
        assert_eq!(backend.call_count("disable"), 0);

        backend.clear_calls();
        assert_eq!(backend.call_count("enable"), 0);
    }

    #[test]
    fn test_declaration_scan() {
        let source = "\
            precision highp float;\n\
            attribute vec3 vertex_position;\n\
            in vec2 vertex_texCoord0;\n\
            uniform mat4 matrix_model;\n\
            uniform vec4 tints[4];\n\
            uniform sampler2D texture_diffuse;\n\
            void main() {}\n";
        let attrs = DummyBackend::scan_declarations(source, &["attribute", "in"]);
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].name, "vertex_position");
        assert_eq!(attrs[0].gl_type, gl::FLOAT_VEC3);

        let uniforms = DummyBackend::scan_declarations(source, &["uniform"]);
        assert_eq!(uniforms.len(), 3);
        assert_eq!(uniforms[1].name, "tints");
        assert_eq!(uniforms[1].array_size, 4);
        assert_eq!(uniforms[2].gl_type, gl::SAMPLER_2D);
    }

    #[test]
    fn test_compile_failure_injection() {
        let backend = DummyBackend::new();
        backend.fail_compile_containing("BROKEN", 3, "undeclared identifier");

        let good = backend.create_shader(gl::VERTEX_SHADER);
        backend.shader_source(good, "void main() {}");
        backend.compile_shader(good);
        assert!(backend.get_shader_compile_status(good));

        let bad = backend.create_shader(gl::FRAGMENT_SHADER);
        backend.shader_source(bad, "void main() { BROKEN; }");
        backend.compile_shader(bad);
        assert!(!backend.get_shader_compile_status(bad));
        assert!(backend.get_shader_info_log(bad).starts_with("ERROR: 0:3:"));
    }

    #[test]
    fn test_fence_polling() {
        let backend = DummyBackend::new();
        backend.set_fence_polls_until_signal(2);
        let fence = backend.fence_sync();
        assert_eq!(
            backend.client_wait_sync(fence, 0),
            SyncStatus::TimeoutExpired
        );
        assert_eq!(
            backend.client_wait_sync(fence, 0),
            SyncStatus::ConditionSatisfied
        );
        assert_eq!(
            backend.client_wait_sync(fence, 0),
            SyncStatus::AlreadySignaled
        );
    }

    #[test]
    fn test_uniform_locations_stable() {
        let backend = DummyBackend::new();
        let program = backend.create_program();
        let a = backend.get_uniform_location(program, "uColor").unwrap();
        let b = backend.get_uniform_location(program, "uScale").unwrap();
        let a2 = backend.get_uniform_location(program, "uColor").unwrap();
        assert_eq!(a, a2);
        assert_ne!(a, b);
    }
}
