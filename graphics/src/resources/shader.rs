//! GPU shader resource.
//!
//! A [`Shader`] owns a vertex/fragment source pair plus the attribute
//! semantic map, and moves through a small state machine:
//! `Uninitialized -> Compiling -> { Ready | Failed }`. Context loss drops
//! any state back to `Uninitialized`. Stage compilation is deduplicated
//! through the device's per-stage source caches so shared chunks compile
//! once per device.

use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::consts as gl;
use crate::backend::{GlBackend, ProgramId, ShaderStageId, UniformLocation};
use crate::resources::PlatformResource;
use crate::types::VertexSemantic;
use crate::uniforms::{UniformScope, UniformSlot, UniformType, UniformValue, Version};

/// Source pair and interface description of a shader program.
#[derive(Debug, Clone)]
pub struct ShaderDefinition {
    /// Name used in diagnostics.
    pub name: String,
    /// Vertex stage source.
    pub vshader: String,
    /// Fragment stage source.
    pub fshader: String,
    /// Map from attribute name (as declared in the vertex source) to its
    /// semantic, which fixes the attribute slot.
    pub attributes: Vec<(String, VertexSemantic)>,
    /// Register `out_`-prefixed transform feedback varyings before linking.
    pub use_transform_feedback: bool,
}

impl ShaderDefinition {
    /// Create a definition from a source pair.
    pub fn new(name: impl Into<String>, vshader: impl Into<String>, fshader: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vshader: vshader.into(),
            fshader: fshader.into(),
            attributes: Vec::new(),
            use_transform_feedback: false,
        }
    }

    /// Map an attribute name to a semantic.
    pub fn with_attribute(mut self, name: impl Into<String>, semantic: VertexSemantic) -> Self {
        self.attributes.push((name.into(), semantic));
        self
    }

    /// Enable transform feedback output naming.
    pub fn with_transform_feedback(mut self) -> Self {
        self.use_transform_feedback = true;
        self
    }

    fn semantic_of(&self, name: &str) -> Option<VertexSemantic> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| *s)
    }
}

/// Lifecycle state of a shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStatus {
    /// No native objects exist.
    Uninitialized,
    /// Stages compiled and program linked; success not yet verified.
    Compiling,
    /// Verified and introspected; usable for draws.
    Ready,
    /// Compilation or linking failed; never retried until context restore.
    Failed,
}

/// One introspected shader binding: an attribute, uniform, or sampler.
#[derive(Debug)]
pub struct ShaderInput {
    /// Name as reported by introspection.
    pub name: String,
    /// Attribute semantic; `None` for uniforms and samplers.
    pub semantic: Option<VertexSemantic>,
    /// Classified type.
    pub ty: UniformType,
    /// Array element count.
    pub array_size: u32,
    /// Native binding location.
    pub location: UniformLocation,
    /// The scope slot this binding reads from.
    pub slot: Option<Arc<UniformSlot>>,
    /// Stamp of the last value committed to this binding.
    pub version: Option<Version>,
    /// Last scalar/vector value committed, for equality short-circuiting.
    pub committed: Option<UniformValue>,
    /// Texture unit last written to a sampler binding.
    pub sampler_unit: Option<u32>,
}

/// A logical shader resource.
pub struct Shader {
    definition: ShaderDefinition,
    state: Mutex<ShaderState>,
}

#[derive(Debug, Default)]
pub(crate) struct ShaderState {
    pub status: ShaderStatus,
    pub attributes: Vec<ShaderInput>,
    pub uniforms: Vec<ShaderInput>,
    pub samplers: Vec<ShaderInput>,
    pub platform: ShaderPlatform,
    /// One-time diagnostic guards.
    pub warned_failed: bool,
    pub warned_samplers: Vec<String>,
}

impl Default for ShaderStatus {
    fn default() -> Self {
        Self::Uninitialized
    }
}

impl Shader {
    pub(crate) fn new(definition: ShaderDefinition) -> Self {
        Self {
            definition,
            state: Mutex::new(ShaderState::default()),
        }
    }

    /// The definition the shader was created from.
    pub fn definition(&self) -> &ShaderDefinition {
        &self.definition
    }

    /// Shader name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Current lifecycle state.
    pub fn status(&self) -> ShaderStatus {
        self.state.lock().status
    }

    /// True when the shader is usable for draws.
    pub fn is_ready(&self) -> bool {
        self.status() == ShaderStatus::Ready
    }

    /// True when the shader failed compilation or linking.
    pub fn is_failed(&self) -> bool {
        self.status() == ShaderStatus::Failed
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, ShaderState> {
        self.state.lock()
    }
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("name", &self.definition.name)
            .field("status", &self.status())
            .finish()
    }
}

// Ensure Shader is Send + Sync
static_assertions::assert_impl_all!(Shader: Send, Sync);

/// Native backing of a shader program.
#[derive(Debug, Default)]
pub(crate) struct ShaderPlatform {
    pub program: Option<ProgramId>,
    pub vertex_shader: Option<ShaderStageId>,
    pub fragment_shader: Option<ShaderStageId>,
}

impl PlatformResource for ShaderPlatform {
    fn destroy(&mut self, gl: &dyn GlBackend) {
        // Stage objects belong to the device's compile caches and may be
        // shared with other programs; only the program is released here.
        if let Some(program) = self.program.take() {
            gl.delete_program(program);
        }
        self.vertex_shader = None;
        self.fragment_shader = None;
    }

    fn lose_context(&mut self) {
        self.program = None;
        self.vertex_shader = None;
        self.fragment_shader = None;
    }
}

impl ShaderState {
    /// Compile both stages (through the per-stage caches), bind attribute
    /// slots, and link. Success is verified later in [`Self::post_link`].
    pub(crate) fn compile_and_link(
        &mut self,
        gl: &dyn GlBackend,
        definition: &ShaderDefinition,
        vertex_cache: &mut HashMap<String, ShaderStageId>,
        fragment_cache: &mut HashMap<String, ShaderStageId>,
    ) {
        let vertex_shader =
            compile_stage(gl, vertex_cache, gl::VERTEX_SHADER, &definition.vshader);
        let fragment_shader =
            compile_stage(gl, fragment_cache, gl::FRAGMENT_SHADER, &definition.fshader);

        let program = gl.create_program();
        gl.attach_shader(program, vertex_shader);
        gl.attach_shader(program, fragment_shader);

        if definition.use_transform_feedback {
            let out_names: Vec<String> = definition
                .attributes
                .iter()
                .map(|(name, _)| format!("out_{name}"))
                .collect();
            gl.transform_feedback_varyings(program, &out_names, true);
        }

        // Bind every declared attribute to its fixed semantic slot before
        // linking. Two attributes landing on one slot is suspicious but not
        // fatal; the link result decides.
        let mut taken: HashMap<u32, &str> = HashMap::new();
        for (name, semantic) in &definition.attributes {
            let location = semantic.location();
            if let Some(previous) = taken.get(&location) {
                log::warn!(
                    "Shader '{}': attributes '{}' and '{}' are both mapped to slot {}",
                    definition.name,
                    previous,
                    name,
                    location
                );
            }
            taken.insert(location, name);
            gl.bind_attrib_location(program, location, name);
        }

        gl.link_program(program);

        self.platform.program = Some(program);
        self.platform.vertex_shader = Some(vertex_shader);
        self.platform.fragment_shader = Some(fragment_shader);
        self.status = ShaderStatus::Compiling;
    }

    /// Verify compile and link results, then introspect the program into
    /// typed input records. Returns false (and marks the shader failed) on
    /// any error; a failed shader is never retried.
    pub(crate) fn post_link(
        &mut self,
        gl: &dyn GlBackend,
        definition: &ShaderDefinition,
        scope: &mut UniformScope,
    ) -> bool {
        let Some(program) = self.platform.program else {
            return false;
        };

        if !self.check_stage(gl, definition, true) || !self.check_stage(gl, definition, false) {
            self.status = ShaderStatus::Failed;
            return false;
        }

        if !gl.get_program_link_status(program) {
            log::error!(
                "Shader '{}': failed to link program. Error: {}",
                definition.name,
                gl.get_program_info_log(program)
            );
            self.status = ShaderStatus::Failed;
            return false;
        }

        self.attributes.clear();
        self.uniforms.clear();
        self.samplers.clear();

        for info in gl.get_active_attributes(program) {
            let semantic = definition.semantic_of(&info.name);
            if semantic.is_none() {
                log::error!(
                    "Shader '{}': vertex attribute '{}' is not mapped to a semantic",
                    definition.name,
                    info.name
                );
                continue;
            }
            let Some(ty) = UniformType::from_native(info.gl_type, info.array_size) else {
                continue;
            };
            let location = semantic.map(|s| s.location()).unwrap_or(0);
            self.attributes.push(ShaderInput {
                name: info.name,
                semantic,
                ty,
                array_size: info.array_size,
                location: UniformLocation(location as i32),
                slot: None,
                version: None,
                committed: None,
                sampler_unit: None,
            });
        }

        for info in gl.get_active_uniforms(program) {
            let Some(location) = gl.get_uniform_location(program, &info.name) else {
                continue;
            };
            let Some(ty) = UniformType::from_native(info.gl_type, info.array_size) else {
                log::debug!(
                    "Shader '{}': uniform '{}' has an unsupported type ({:#x}), skipped",
                    definition.name,
                    info.name,
                    info.gl_type
                );
                continue;
            };
            let input = ShaderInput {
                slot: Some(scope.resolve(&info.name)),
                name: info.name,
                semantic: None,
                ty,
                array_size: info.array_size,
                location,
                version: None,
                committed: None,
                sampler_unit: None,
            };
            if ty.is_sampler() {
                self.samplers.push(input);
            } else {
                self.uniforms.push(input);
            }
        }

        self.status = ShaderStatus::Ready;
        true
    }

    fn check_stage(&self, gl: &dyn GlBackend, definition: &ShaderDefinition, vertex: bool) -> bool {
        let (stage, source, kind) = if vertex {
            (
                self.platform.vertex_shader,
                &definition.vshader,
                "vertex",
            )
        } else {
            (
                self.platform.fragment_shader,
                &definition.fshader,
                "fragment",
            )
        };
        let Some(stage) = stage else {
            return false;
        };
        if gl.get_shader_compile_status(stage) {
            return true;
        }
        let info_log = gl.get_shader_info_log(stage);
        let window = error_window(source, &info_log);
        log::error!(
            "Shader '{}': failed to compile {} shader:\n\n{}\n{}",
            definition.name,
            kind,
            info_log,
            window
        );
        false
    }

    /// Drop back to `Uninitialized`, clearing native handles and
    /// introspection results.
    pub(crate) fn lose_context(&mut self) {
        self.platform.lose_context();
        self.attributes.clear();
        self.uniforms.clear();
        self.samplers.clear();
        self.status = ShaderStatus::Uninitialized;
        self.warned_failed = false;
        self.warned_samplers.clear();
    }
}

/// Compile one stage through the per-device source cache, so identical
/// source strings compile exactly once per device.
fn compile_stage(
    gl: &dyn GlBackend,
    cache: &mut HashMap<String, ShaderStageId>,
    stage_kind: u32,
    source: &str,
) -> ShaderStageId {
    if let Some(&stage) = cache.get(source) {
        return stage;
    }
    let stage = gl.create_shader(stage_kind);
    gl.shader_source(stage, source);
    gl.compile_shader(stage);
    cache.insert(source.to_string(), stage);
    stage
}

/// Render a numbered source window around the first reported error line.
///
/// Compile logs of the form `ERROR: <file>:<line>: <message>` narrow the
/// window to the error line plus the five lines before and after it;
/// anything else falls back to the full numbered source.
fn error_window(source: &str, info_log: &str) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let mut from = 0usize;
    let mut to = lines.len();

    if let Some(line) = parse_error_line(info_log) {
        let line = line as usize;
        from = line.saturating_sub(6);
        to = (line + 5).min(lines.len());
    }

    let mut out = String::new();
    for (index, text) in lines.iter().enumerate().take(to).skip(from) {
        // compile logs report 1-based line numbers
        out.push_str(&format!("{}:\t{}\n", index + 1, text));
    }
    out
}

fn parse_error_line(info_log: &str) -> Option<u32> {
    let rest = info_log.strip_prefix("ERROR:")?.trim_start();
    let mut parts = rest.splitn(3, ':');
    let _file = parts.next()?;
    parts.next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_line_parsing() {
        assert_eq!(parse_error_line("ERROR: 0:12: 'foo' undeclared"), Some(12));
        assert_eq!(parse_error_line("warning: something"), None);
        assert_eq!(parse_error_line("ERROR: garbage"), None);
    }

    #[test]
    fn test_error_window_is_bounded() {
        let source: String = (1..=40)
            .map(|i| format!("line {i}\n"))
            .collect();
        let window = error_window(&source, "ERROR: 0:20: bad");
        let lines: Vec<&str> = window.lines().collect();
        // error line plus five before and after
        assert_eq!(lines.len(), 11);
        assert!(lines[0].starts_with("15:"));
        assert!(lines[10].starts_with("25:"));
    }

    #[test]
    fn test_error_window_fallback_full_source() {
        let window = error_window("a\nb\nc", "something inscrutable");
        assert_eq!(window.lines().count(), 3);
        assert!(window.starts_with("1:"));
    }

    #[test]
    fn test_definition_builder() {
        let def = ShaderDefinition::new("test", "vs", "fs")
            .with_attribute("vertex_position", VertexSemantic::Position)
            .with_attribute("vertex_normal", VertexSemantic::Normal);
        assert_eq!(def.semantic_of("vertex_normal"), Some(VertexSemantic::Normal));
        assert_eq!(def.semantic_of("missing"), None);
    }
}
