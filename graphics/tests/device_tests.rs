//! Integration tests for the graphics device over the recording dummy
//! backend.
//!
//! The dummy backend records every native call it receives, which lets
//! these tests assert the device's central contract: state setters and
//! binds coalesce, draws skip cleanly on missing bindings, caches reuse
//! native objects, and a context loss round-trip restores everything from
//! retained CPU-side data.

use std::sync::Arc;

use rstest::rstest;

use vermilion_graphics::backend::consts as gl;
use vermilion_graphics::backend::{DummyBackend, Extensions};
use vermilion_graphics::types::ColorOps;
use vermilion_graphics::uniforms::UniformValue;
use vermilion_graphics::{
    BlendState, BufferUsage, DepthState, GraphicsDevice, IndexFormat, PixelFormat, Primitive,
    RenderPassDesc, RenderTargetDescriptor, ShaderDefinition, TextureDescriptor, TextureSource,
    VertexElement, VertexFormat, VertexSemantic,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn test_device() -> (GraphicsDevice, Arc<DummyBackend>) {
    init_logging();
    let backend = Arc::new(DummyBackend::new());
    let device = GraphicsDevice::new(backend.clone(), 800, 600).unwrap();
    backend.clear_calls();
    (device, backend)
}

fn position_format() -> VertexFormat {
    VertexFormat::new(&[VertexElement::float(VertexSemantic::Position, 2)])
}

/// Two-triangle-strip quad covering clip space.
fn quad_vertices() -> [f32; 8] {
    [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0]
}

fn passthrough_definition() -> ShaderDefinition {
    ShaderDefinition::new(
        "passthrough",
        "attribute vec2 vertex_position;\n\
         uniform vec4 uColor;\n\
         varying vec4 color;\n\
         void main() {\n\
             color = uColor;\n\
             gl_Position = vec4(vertex_position, 0.0, 1.0);\n\
         }\n",
        "precision mediump float;\n\
         varying vec4 color;\n\
         void main() { gl_FragColor = color; }\n",
    )
    .with_attribute("vertex_position", VertexSemantic::Position)
}

fn textured_definition() -> ShaderDefinition {
    ShaderDefinition::new(
        "textured",
        "attribute vec2 vertex_position;\n\
         varying vec2 uv;\n\
         void main() {\n\
             uv = vertex_position * 0.5 + 0.5;\n\
             gl_Position = vec4(vertex_position, 0.0, 1.0);\n\
         }\n",
        "precision mediump float;\n\
         varying vec2 uv;\n\
         uniform sampler2D texture_diffuse;\n\
         void main() { gl_FragColor = texture2D(texture_diffuse, uv); }\n",
    )
    .with_attribute("vertex_position", VertexSemantic::Position)
}

fn created_ids(backend: &DummyBackend, call: &str) -> Vec<u32> {
    backend
        .calls()
        .iter()
        .filter(|c| c.name == call)
        .filter_map(|c| c.detail.strip_prefix("-> ").and_then(|s| s.parse().ok()))
        .collect()
}

fn draw_quad(device: &mut GraphicsDevice, quad: &Arc<vermilion_graphics::Buffer>) -> bool {
    device.set_vertex_buffer(quad);
    device.draw(&Primitive::triangle_strip(0, 4), 0, false)
}

// ============================================================================
// Version-stamped uniform commits
// ============================================================================

/// A quad and a passthrough shader with one vec4 uniform: two draws with an
/// unchanged value must produce exactly one native `uniform4fv`; changing
/// the value produces exactly one more.
#[test]
fn test_uniform_version_stamp_skip() {
    let (mut device, backend) = test_device();
    let quad = device.create_vertex_buffer_from(
        position_format(),
        BufferUsage::Static,
        quad_vertices().as_slice(),
    );
    let shader = device.create_shader(passthrough_definition());
    assert!(device.set_shader(&shader));

    let color = device.scope.resolve("uColor");
    color.set_value(UniformValue::Vec4([1.0, 0.0, 0.0, 1.0]));

    assert!(draw_quad(&mut device, &quad));
    assert!(draw_quad(&mut device, &quad));
    assert_eq!(backend.call_count("uniform4fv"), 1);
    assert_eq!(backend.call_count("draw_arrays"), 2);

    color.set_value(UniformValue::Vec4([0.0, 1.0, 0.0, 1.0]));
    assert!(draw_quad(&mut device, &quad));
    assert_eq!(backend.call_count("uniform4fv"), 2);
}

/// Re-publishing an identical value bumps the stamp, but the committed
/// value cache still suppresses the redundant native upload.
#[test]
fn test_identical_value_republish_skips_upload() {
    let (mut device, backend) = test_device();
    let quad = device.create_vertex_buffer_from(
        position_format(),
        BufferUsage::Static,
        quad_vertices().as_slice(),
    );
    let shader = device.create_shader(passthrough_definition());
    assert!(device.set_shader(&shader));

    let color = device.scope.resolve("uColor");
    color.set_value(UniformValue::Vec4([0.2, 0.4, 0.6, 1.0]));
    assert!(draw_quad(&mut device, &quad));

    color.set_value(UniformValue::Vec4([0.2, 0.4, 0.6, 1.0]));
    assert!(draw_quad(&mut device, &quad));
    assert_eq!(backend.call_count("uniform4fv"), 1);
}

// ============================================================================
// Draw skip on missing sampler
// ============================================================================

/// A draw against a shader whose sampler has no bound value must issue no
/// native call at all: no draw, no texture bind, no buffer bind.
#[test]
fn test_draw_skip_on_missing_sampler() {
    let (mut device, backend) = test_device();
    let quad = device.create_vertex_buffer_from(
        position_format(),
        BufferUsage::Static,
        quad_vertices().as_slice(),
    );
    let shader = device.create_shader(textured_definition());
    assert!(device.set_shader(&shader));
    backend.clear_calls();

    device.set_vertex_buffer(&quad);
    assert!(!device.draw(&Primitive::triangle_strip(0, 4), 0, false));

    assert_eq!(backend.call_count("draw_arrays"), 0);
    assert_eq!(backend.call_count("draw_elements"), 0);
    assert_eq!(backend.call_count("bind_texture"), 0);
    assert_eq!(backend.call_count("active_texture"), 0);
    assert_eq!(backend.call_count("bind_buffer"), 0);
    assert_eq!(backend.call_count("bind_vertex_array"), 0);

    // recoverable: once the binding is supplied the draw proceeds
    let texture = device
        .create_texture(TextureDescriptor::new_2d(4, 4, PixelFormat::Rgba8).with_mipmaps(false))
        .unwrap();
    texture.set_level(0, TextureSource::Bytes(vec![255u8; 4 * 4 * 4]));
    device
        .scope
        .resolve("texture_diffuse")
        .set_value(UniformValue::Texture(Arc::clone(&texture)));

    assert!(draw_quad(&mut device, &quad));
    assert_eq!(backend.call_count("draw_arrays"), 1);
}

// ============================================================================
// Texture unit/slot cache
// ============================================================================

/// The second draw with the same texture resident on the same unit must
/// skip the native bind/activate pair entirely.
#[test]
fn test_texture_unit_cache_skips_rebinds() {
    let (mut device, backend) = test_device();
    let quad = device.create_vertex_buffer_from(
        position_format(),
        BufferUsage::Static,
        quad_vertices().as_slice(),
    );
    let shader = device.create_shader(textured_definition());
    assert!(device.set_shader(&shader));

    let texture = device
        .create_texture(TextureDescriptor::new_2d(4, 4, PixelFormat::Rgba8).with_mipmaps(false))
        .unwrap();
    texture.set_level(0, TextureSource::Bytes(vec![0u8; 4 * 4 * 4]));
    device
        .scope
        .resolve("texture_diffuse")
        .set_value(UniformValue::Texture(Arc::clone(&texture)));

    assert!(draw_quad(&mut device, &quad));
    let binds = backend.call_count("bind_texture");
    let activates = backend.call_count("active_texture");
    assert!(binds >= 1);

    assert!(draw_quad(&mut device, &quad));
    assert_eq!(backend.call_count("bind_texture"), binds);
    assert_eq!(backend.call_count("active_texture"), activates);
}

// ============================================================================
// VAO cache reuse
// ============================================================================

/// Draws sharing buffer identities and layouts reuse one native vertex
/// array; a layout (buffer set) change allocates a new one.
#[test]
fn test_vao_cache_reuse() {
    let (mut device, backend) = test_device();
    let shader = device.create_shader(passthrough_definition());
    assert!(device.set_shader(&shader));
    device
        .scope
        .resolve("uColor")
        .set_value(UniformValue::Vec4([1.0; 4]));

    let positions = device.create_vertex_buffer_from(
        position_format(),
        BufferUsage::Static,
        quad_vertices().as_slice(),
    );
    let uvs = device.create_vertex_buffer_from(
        VertexFormat::new(&[VertexElement::float(VertexSemantic::TexCoord(0), 2)]),
        BufferUsage::Static,
        quad_vertices().as_slice(),
    );

    // two buffers: layout-keyed cache path
    device.set_vertex_buffer(&positions);
    device.set_vertex_buffer(&uvs);
    assert!(device.draw(&Primitive::triangle_strip(0, 4), 0, false));
    assert_eq!(backend.call_count("create_vertex_array"), 1);

    device.set_vertex_buffer(&positions);
    device.set_vertex_buffer(&uvs);
    assert!(device.draw(&Primitive::triangle_strip(0, 4), 0, false));
    assert_eq!(backend.call_count("create_vertex_array"), 1);

    // a different buffer set is a different layout key
    let other = device.create_vertex_buffer_from(
        position_format(),
        BufferUsage::Static,
        quad_vertices().as_slice(),
    );
    device.set_vertex_buffer(&other);
    device.set_vertex_buffer(&uvs);
    assert!(device.draw(&Primitive::triangle_strip(0, 4), 0, false));
    assert_eq!(backend.call_count("create_vertex_array"), 2);
}

/// A buffer drawn on its own keeps its vertex array across draws.
#[test]
fn test_single_buffer_vao_reuse() {
    let (mut device, backend) = test_device();
    let shader = device.create_shader(passthrough_definition());
    assert!(device.set_shader(&shader));
    device
        .scope
        .resolve("uColor")
        .set_value(UniformValue::Vec4([1.0; 4]));

    let quad = device.create_vertex_buffer_from(
        position_format(),
        BufferUsage::Static,
        quad_vertices().as_slice(),
    );
    assert!(draw_quad(&mut device, &quad));
    assert!(draw_quad(&mut device, &quad));
    assert_eq!(backend.call_count("create_vertex_array"), 1);
}

// ============================================================================
// Buffers
// ============================================================================

/// Indexed draws translate the primitive base into a byte offset using the
/// index format.
#[test]
fn test_indexed_draw_offsets() {
    let (mut device, backend) = test_device();
    let shader = device.create_shader(passthrough_definition());
    assert!(device.set_shader(&shader));
    device
        .scope
        .resolve("uColor")
        .set_value(UniformValue::Vec4([1.0; 4]));

    let quad = device.create_vertex_buffer_from(
        position_format(),
        BufferUsage::Static,
        quad_vertices().as_slice(),
    );
    let indices: [u16; 6] = [0, 1, 2, 2, 1, 3];
    let index_buffer = device.create_index_buffer(
        IndexFormat::U16,
        BufferUsage::Static,
        bytemuck::cast_slice(indices.as_slice()).to_vec(),
    );
    device.set_index_buffer(Some(&index_buffer));

    device.set_vertex_buffer(&quad);
    assert!(device.draw(&Primitive::indexed_triangles(3, 3), 0, false));
    let detail = backend.last_call("draw_elements").unwrap();
    // base 3 at two bytes per index
    assert!(detail.contains("+6"), "unexpected detail: {detail}");
}

/// A partial update of an already-uploaded buffer goes through the
/// sub-range path without reallocating native storage.
#[test]
fn test_partial_buffer_update() {
    let (mut device, backend) = test_device();
    let shader = device.create_shader(passthrough_definition());
    assert!(device.set_shader(&shader));
    device
        .scope
        .resolve("uColor")
        .set_value(UniformValue::Vec4([1.0; 4]));

    let quad = device.create_vertex_buffer_from(
        position_format(),
        BufferUsage::Dynamic,
        quad_vertices().as_slice(),
    );
    assert!(draw_quad(&mut device, &quad));
    assert_eq!(backend.call_count("buffer_data"), 1);

    device.update_buffer_range(&quad, 8, bytemuck::cast_slice([0.5f32, 0.5].as_slice()));
    assert_eq!(backend.call_count("buffer_sub_data"), 1);
    assert_eq!(backend.call_count("buffer_data"), 1);

    // the next draw has nothing left to upload
    assert!(draw_quad(&mut device, &quad));
    assert_eq!(backend.call_count("buffer_data"), 1);
    assert_eq!(backend.call_count("buffer_sub_data"), 1);
}

// ============================================================================
// Context loss round trip
// ============================================================================

/// Loss then restore leaves every resource re-initializable to the same
/// GPU-visible state without the caller re-supplying any data.
#[test]
fn test_context_loss_round_trip() {
    let (mut device, backend) = test_device();
    let quad = device.create_vertex_buffer_from(
        position_format(),
        BufferUsage::Static,
        quad_vertices().as_slice(),
    );
    let shader = device.create_shader(passthrough_definition());
    assert!(device.set_shader(&shader));
    let color = device.scope.resolve("uColor");
    color.set_value(UniformValue::Vec4([0.1, 0.2, 0.3, 1.0]));
    assert!(draw_quad(&mut device, &quad));

    let texture = device
        .create_texture(TextureDescriptor::new_2d(2, 2, PixelFormat::Rgba8).with_mipmaps(false))
        .unwrap();
    texture.set_level(0, TextureSource::Bytes(vec![7u8; 16]));
    assert!(device.set_texture(&texture, 0));

    let uploads_before = backend.call_count("tex_image_2d");
    let compiles_before = backend.call_count("compile_shader");
    let buffer_uploads_before = backend.call_count("buffer_data");
    assert_eq!(backend.call_count("uniform4fv"), 1);

    device.lose_context();
    assert!(device.is_lost());
    // handles are forgotten, never released
    assert_eq!(backend.call_count("delete_buffer"), 0);
    assert_eq!(backend.call_count("delete_texture"), 0);
    assert_eq!(backend.call_count("delete_program"), 0);
    assert_eq!(backend.call_count("delete_vertex_array"), 0);

    device.restore_context();
    assert!(!device.is_lost());
    // shaders recompiled and buffers re-uploaded from retained data
    assert_eq!(backend.call_count("compile_shader"), compiles_before + 2);
    assert_eq!(backend.call_count("buffer_data"), buffer_uploads_before + 1);

    // textures re-upload lazily on next bind
    assert!(device.set_texture(&texture, 0));
    assert_eq!(backend.call_count("tex_image_2d"), uploads_before + 1);

    // the retained uniform value is re-committed to the fresh program
    assert!(device.set_shader(&shader));
    assert!(draw_quad(&mut device, &quad));
    assert_eq!(backend.call_count("uniform4fv"), 2);
}

// ============================================================================
// Render targets, MSAA and MRT
// ============================================================================

fn color_texture(device: &mut GraphicsDevice, size: u32) -> Arc<vermilion_graphics::Texture> {
    device
        .create_texture(
            TextureDescriptor::new_2d(size, size, PixelFormat::Rgba8)
                .with_name("rt-color")
                .with_mipmaps(false),
        )
        .unwrap()
}

/// A multisampled target demotes its first framebuffer to resolve duty:
/// the resolve blit must read from the second (multisampled) framebuffer
/// and write into the first, with the scissor forced to full size.
#[test]
fn test_msaa_resolve_inversion() {
    let (mut device, backend) = test_device();
    let color = color_texture(&mut device, 8);
    let target = device
        .create_render_target(RenderTargetDescriptor::new("msaa-rt", color).with_samples(4))
        .unwrap();

    let pass = RenderPassDesc::new("scene");
    device.start_render_pass(Some(&target), &pass);

    let framebuffers = created_ids(&backend, "create_framebuffer");
    assert_eq!(framebuffers.len(), 2);
    let (resolve_fb, render_fb) = (framebuffers[0], framebuffers[1]);

    // multisampled storage allocated for color and depth
    assert_eq!(backend.call_count("renderbuffer_storage_multisample"), 2);

    backend.clear_calls();
    device.end_render_pass(&pass);

    assert_eq!(backend.call_count("blit_framebuffer"), 1);
    let binds = backend.calls();
    let read_bind = binds
        .iter()
        .find(|c| c.name == "bind_framebuffer" && c.detail.starts_with("0x8ca8"))
        .expect("read framebuffer bound for resolve");
    let draw_bind = binds
        .iter()
        .find(|c| c.name == "bind_framebuffer" && c.detail.starts_with("0x8ca9"))
        .expect("draw framebuffer bound for resolve");
    assert!(
        read_bind.detail.ends_with(&format!("Some({render_fb})")),
        "resolve must read from the multisampled framebuffer: {}",
        read_bind.detail
    );
    assert!(
        draw_bind.detail.ends_with(&format!("Some({resolve_fb})")),
        "resolve must write into the original framebuffer: {}",
        draw_bind.detail
    );

    // blit covers the full target, under a full-size scissor
    let blit = backend.last_call("blit_framebuffer").unwrap();
    assert!(blit.starts_with("(0,0)-(8,8) -> (0,0)-(8,8)"), "{blit}");
}

/// MRT + MSAA allocates one framebuffer pair per color attachment and
/// resolves each color attachment with its own blit.
#[test]
fn test_mrt_msaa_framebuffer_pairs() {
    let (mut device, backend) = test_device();
    let color0 = color_texture(&mut device, 8);
    let color1 = color_texture(&mut device, 8);
    let target = device
        .create_render_target(
            RenderTargetDescriptor::new("mrt", Arc::clone(&color0))
                .with_color_buffers(vec![color0, color1])
                .with_samples(4),
        )
        .unwrap();

    let pass = RenderPassDesc::new("gbuffer")
        .with_color_ops(vec![ColorOps::default(), ColorOps::default()]);
    device.start_render_pass(Some(&target), &pass);

    // base + msaa framebuffers plus one pair (msaa + resolve) per color
    assert_eq!(created_ids(&backend, "create_framebuffer").len(), 6);

    backend.clear_calls();
    device.end_render_pass(&pass);
    // one independent color blit per attachment
    assert_eq!(backend.call_count("blit_framebuffer"), 2);
}

/// Single-sampled targets create exactly one framebuffer and never resolve.
#[test]
fn test_single_sample_target_has_no_resolve_path() {
    let (mut device, backend) = test_device();
    let color = color_texture(&mut device, 8);
    let target = device
        .create_render_target(RenderTargetDescriptor::new("plain", color))
        .unwrap();

    let pass = RenderPassDesc::new("scene");
    device.start_render_pass(Some(&target), &pass);
    device.end_render_pass(&pass);

    assert_eq!(created_ids(&backend, "create_framebuffer").len(), 1);
    assert_eq!(backend.call_count("blit_framebuffer"), 0);
}

/// Two multisampled targets sharing a depth texture of the same size,
/// format and sample count share one multisampled depth renderbuffer.
#[test]
fn test_shared_msaa_depth_buffer() {
    let (mut device, backend) = test_device();
    let depth_format = PixelFormat::Depth;
    let make_target = |device: &mut GraphicsDevice, name: &str| {
        let color = color_texture(device, 16);
        let depth = device
            .create_texture(
                TextureDescriptor::new_2d(16, 16, depth_format).with_mipmaps(false),
            )
            .unwrap();
        device
            .create_render_target(
                RenderTargetDescriptor::new(name, color)
                    .with_depth_buffer(depth)
                    .with_samples(4),
            )
            .unwrap()
    };
    let target_a = make_target(&mut device, "a");
    let target_b = make_target(&mut device, "b");

    let pass = RenderPassDesc::new("pass");
    device.start_render_pass(Some(&target_a), &pass);
    device.end_render_pass(&pass);
    let depth_allocations = backend
        .calls()
        .iter()
        .filter(|c| {
            c.name == "renderbuffer_storage_multisample"
                && c.detail.contains(&format!("{:#x}", gl::DEPTH_COMPONENT32F))
        })
        .count();
    assert_eq!(depth_allocations, 1);

    device.start_render_pass(Some(&target_b), &pass);
    device.end_render_pass(&pass);
    let depth_allocations = backend
        .calls()
        .iter()
        .filter(|c| {
            c.name == "renderbuffer_storage_multisample"
                && c.detail.contains(&format!("{:#x}", gl::DEPTH_COMPONENT32F))
        })
        .count();
    // the second target reuses the first target's multisampled depth buffer
    assert_eq!(depth_allocations, 1);
}

/// An incomplete framebuffer is reported at validation time, identifying
/// the target by name, and does not crash anything.
#[test]
fn test_framebuffer_incomplete_is_surfaced_at_init() {
    let (mut device, backend) = test_device();
    backend.set_framebuffer_status(gl::FRAMEBUFFER_UNSUPPORTED);

    let color = color_texture(&mut device, 8);
    let target = device
        .create_render_target(RenderTargetDescriptor::new("broken", color))
        .unwrap();
    let pass = RenderPassDesc::new("scene");
    device.start_render_pass(Some(&target), &pass);
    device.end_render_pass(&pass);

    assert!(backend.call_count("check_framebuffer_status") >= 1);
    assert!(target.is_initialized());
}

// ============================================================================
// Shader failure handling
// ============================================================================

/// A shader with a compile error is marked failed, never retried, and
/// every draw against it is skipped without native calls.
#[test]
fn test_failed_shader_never_retried() {
    let (mut device, backend) = test_device();
    backend.fail_compile_containing("BROKEN", 2, "undeclared identifier");

    let definition = ShaderDefinition::new(
        "bad",
        "attribute vec2 vertex_position;\n\
         void main() { BROKEN; }\n",
        "void main() {}\n",
    )
    .with_attribute("vertex_position", VertexSemantic::Position);
    let shader = device.create_shader(definition);

    assert!(!device.set_shader(&shader));
    assert!(shader.is_failed());

    let compiles = backend.call_count("compile_shader");
    backend.clear_calls();

    // never retried, and draws skip with no native work
    assert!(!device.set_shader(&shader));
    let quad = device.create_vertex_buffer_from(
        position_format(),
        BufferUsage::Static,
        quad_vertices().as_slice(),
    );
    device.set_vertex_buffer(&quad);
    assert!(!device.draw(&Primitive::triangle_strip(0, 4), 0, false));
    assert_eq!(backend.call_count("compile_shader"), 0);
    assert_eq!(backend.call_count("draw_arrays"), 0);
    assert!(compiles >= 1);
}

/// Identical stage sources compile once per device thanks to the per-stage
/// compile caches.
#[test]
fn test_stage_compile_cache_dedupes_sources() {
    let (mut device, backend) = test_device();
    let first = device.create_shader(passthrough_definition());
    let second = device.create_shader(passthrough_definition());
    assert!(device.set_shader(&first));
    assert!(device.set_shader(&second));
    // one vertex and one fragment compile despite two programs
    assert_eq!(backend.call_count("compile_shader"), 2);
    assert_eq!(backend.call_count("create_program"), 2);
}

// ============================================================================
// Texture capabilities
// ============================================================================

#[rstest]
#[case::dxt1(PixelFormat::Dxt1)]
#[case::etc2(PixelFormat::Etc2Rgba)]
#[case::astc(PixelFormat::Astc4x4)]
#[case::pvrtc(PixelFormat::PvrtcRgb4)]
fn test_compressed_format_requires_capability(#[case] format: PixelFormat) {
    init_logging();
    let backend = Arc::new(DummyBackend::with_extensions(Extensions::default()));
    let mut device = GraphicsDevice::new(backend.clone(), 100, 100).unwrap();
    backend.clear_calls();

    let texture = device
        .create_texture(TextureDescriptor::new_2d(4, 4, format))
        .unwrap();
    texture.set_level(0, TextureSource::Bytes(vec![0u8; 8]));

    // initialization fails fast; no native texture is ever created
    assert!(!device.set_texture(&texture, 0));
    assert_eq!(backend.call_count("create_texture"), 0);
    assert_eq!(backend.call_count("bind_texture"), 0);
}

/// Cube maps upload all six faces independently.
#[test]
fn test_cubemap_uploads_six_faces() {
    let (mut device, backend) = test_device();
    let texture = device
        .create_texture(TextureDescriptor::new_cube(4, PixelFormat::Rgba8).with_mipmaps(false))
        .unwrap();
    for face in 0..6 {
        texture.set_face_level(0, face, TextureSource::Bytes(vec![face as u8; 4 * 4 * 4]));
    }
    assert!(device.set_texture(&texture, 0));
    assert_eq!(backend.call_count("tex_image_2d"), 6);
}

/// Mipmaps are generated natively when requested but not supplied.
#[test]
fn test_mipmap_generation_when_not_supplied() {
    let (mut device, backend) = test_device();
    let texture = device
        .create_texture(TextureDescriptor::new_2d(8, 8, PixelFormat::Rgba8))
        .unwrap();
    texture.set_level(0, TextureSource::Bytes(vec![0u8; 8 * 8 * 4]));
    assert!(device.set_texture(&texture, 0));
    assert_eq!(backend.call_count("generate_mipmap"), 1);
}

/// VRAM accounting brackets uploads and drops to zero on destruction.
#[test]
fn test_vram_accounting() {
    let (mut device, _backend) = test_device();
    let descriptor = TextureDescriptor::new_2d(8, 8, PixelFormat::Rgba8).with_mipmaps(false);
    let expected = descriptor.gpu_size();
    let texture = device.create_texture(descriptor).unwrap();
    texture.set_level(0, TextureSource::Bytes(vec![0u8; 8 * 8 * 4]));
    assert!(device.set_texture(&texture, 0));
    assert_eq!(device.vram().texture, expected);

    device.destroy_texture(&texture);
    assert_eq!(device.vram().texture, 0);
}

// ============================================================================
// Asynchronous readback
// ============================================================================

/// The async readback never blocks: it polls the fence and only copies
/// once the driver signals.
#[test]
fn test_async_readback_polls_until_signaled() {
    use vermilion_graphics::ReadbackStatus;

    let (mut device, backend) = test_device();
    backend.set_fence_polls_until_signal(2);

    let mut readback = device.read_pixels_async(0, 0, 4, 4);
    assert_eq!(backend.call_count("fence_sync"), 1);
    assert_eq!(backend.call_count("read_pixels_to_pack_buffer"), 1);

    assert_eq!(device.poll_readback(&mut readback), ReadbackStatus::Pending);
    assert_eq!(backend.call_count("get_buffer_sub_data"), 0);

    match device.poll_readback(&mut readback) {
        ReadbackStatus::Ready(data) => assert_eq!(data.len(), 4 * 4 * 4),
        other => panic!("expected Ready, got {other:?}"),
    }
    assert_eq!(backend.call_count("get_buffer_sub_data"), 1);
    assert_eq!(backend.call_count("delete_sync"), 1);
}

// ============================================================================
// State setters at the integration level
// ============================================================================

#[rstest]
#[case::alpha(BlendState::alpha())]
#[case::additive(BlendState::additive())]
#[case::disabled(BlendState::default())]
fn test_blend_state_idempotent(#[case] state: BlendState) {
    let (mut device, backend) = test_device();
    device.set_blend_state(&state);
    let calls = backend.calls().len();
    device.set_blend_state(&state);
    device.set_blend_state(&state);
    assert_eq!(backend.calls().len(), calls);
}

#[test]
fn test_depth_state_idempotent() {
    let (mut device, backend) = test_device();
    let state = DepthState {
        write: false,
        ..Default::default()
    };
    device.set_depth_state(&state);
    let calls = backend.calls().len();
    device.set_depth_state(&state);
    assert_eq!(backend.calls().len(), calls);
}
