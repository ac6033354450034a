//! GPU buffer resource.

use parking_lot::{Mutex, MutexGuard};

use crate::backend::consts as gl;
use crate::backend::{BufferId, GlBackend, VaoId};
use crate::resources::PlatformResource;
use crate::types::{BufferTarget, BufferUsage, IndexFormat, VertexFormat};

/// A logical vertex or index buffer.
///
/// The buffer retains its byte contents CPU-side so that a lost context can
/// be restored without the caller re-supplying data. The native object is
/// created lazily the first time the buffer is drawn with.
pub struct Buffer {
    id: u64,
    target: BufferTarget,
    usage: BufferUsage,
    format: Option<VertexFormat>,
    index_format: Option<IndexFormat>,
    state: Mutex<BufferState>,
}

#[derive(Debug)]
pub(crate) struct BufferState {
    /// Retained contents, uploaded on unlock.
    pub data: Vec<u8>,
    /// True when `data` has changes the native buffer has not seen.
    pub dirty: bool,
    /// Attribute data advances per instance instead of per vertex.
    pub instancing: bool,
    pub platform: BufferPlatform,
}

impl Buffer {
    pub(crate) fn new_vertex(id: u64, format: VertexFormat, usage: BufferUsage, data: Vec<u8>) -> Self {
        Self {
            id,
            target: BufferTarget::Vertex,
            usage,
            format: Some(format),
            index_format: None,
            state: Mutex::new(BufferState {
                data,
                dirty: true,
                instancing: false,
                platform: BufferPlatform::default(),
            }),
        }
    }

    pub(crate) fn new_index(id: u64, format: IndexFormat, usage: BufferUsage, data: Vec<u8>) -> Self {
        Self {
            id,
            target: BufferTarget::Index,
            usage,
            format: None,
            index_format: Some(format),
            state: Mutex::new(BufferState {
                data,
                dirty: true,
                instancing: false,
                platform: BufferPlatform::default(),
            }),
        }
    }

    /// Logical identity of the buffer, stable for its whole lifetime.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Binding target of the buffer.
    pub fn target(&self) -> BufferTarget {
        self.target
    }

    /// Usage hint the native storage was allocated with.
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Vertex layout; `None` for index buffers.
    pub fn format(&self) -> Option<&VertexFormat> {
        self.format.as_ref()
    }

    /// Index entry format; `None` for vertex buffers.
    pub fn index_format(&self) -> Option<IndexFormat> {
        self.index_format
    }

    /// Current byte length of the contents.
    pub fn len(&self) -> usize {
        self.state.lock().data.len()
    }

    /// True when the buffer holds no data.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of vertices held, derived from the layout stride.
    pub fn num_vertices(&self) -> usize {
        match &self.format {
            Some(format) if format.stride() > 0 => self.len() / format.stride() as usize,
            _ => 0,
        }
    }

    /// Number of indices held.
    pub fn num_indices(&self) -> usize {
        match self.index_format {
            Some(format) => self.len() / format.bytes_per_index() as usize,
            None => 0,
        }
    }

    /// Replace the full contents. The native buffer updates on next use.
    pub fn set_data(&self, data: Vec<u8>) {
        let mut state = self.state.lock();
        state.data = data;
        state.dirty = true;
    }

    /// Overwrite a sub-range of the contents. The native buffer updates on
    /// next use; the range must lie within the current length.
    pub fn set_data_range(&self, offset: usize, bytes: &[u8]) {
        let mut state = self.state.lock();
        let end = offset + bytes.len();
        if end > state.data.len() {
            log::warn!(
                "Buffer::set_data_range: range {}..{} exceeds buffer length {}",
                offset,
                end,
                state.data.len()
            );
            return;
        }
        state.data[offset..end].copy_from_slice(bytes);
        state.dirty = true;
    }

    /// Mark attribute data as advancing per instance.
    pub fn set_instancing(&self, instancing: bool) {
        self.state.lock().instancing = instancing;
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock()
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("usage", &self.usage)
            .field("len", &self.len())
            .finish()
    }
}

// Ensure Buffer is Send + Sync
static_assertions::assert_impl_all!(Buffer: Send, Sync);

/// Native backing of a buffer.
#[derive(Debug, Default)]
pub(crate) struct BufferPlatform {
    /// Native buffer handle, `None` until first unlock.
    pub buffer: Option<BufferId>,
    /// Byte length of the allocated native storage.
    allocated_len: usize,
    /// Single-buffer vertex array fast path: a buffer drawn on its own keeps
    /// its VAO here instead of going through the layout-keyed cache.
    pub vao: Option<VaoId>,
}

impl BufferPlatform {
    fn native_target(target: BufferTarget) -> u32 {
        match target {
            BufferTarget::Vertex => gl::ARRAY_BUFFER,
            BufferTarget::Index => gl::ELEMENT_ARRAY_BUFFER,
        }
    }

    fn native_usage(usage: BufferUsage) -> u32 {
        match usage {
            BufferUsage::Static => gl::STATIC_DRAW,
            BufferUsage::Dynamic => gl::DYNAMIC_DRAW,
            BufferUsage::Stream => gl::STREAM_DRAW,
            BufferUsage::GpuDynamic => gl::DYNAMIC_COPY,
        }
    }

    /// Create the native buffer on first call and upload the full contents;
    /// afterwards re-upload in place, reallocating only on a length change.
    ///
    /// Returns the size delta of the native allocation for VRAM accounting.
    pub fn unlock(
        &mut self,
        gl: &dyn GlBackend,
        target: BufferTarget,
        usage: BufferUsage,
        data: &[u8],
    ) -> i64 {
        let gl_target = Self::native_target(target);

        if self.buffer.is_none() {
            let handle = gl.create_buffer();
            if handle.0 == 0 {
                log::error!("BufferPlatform: native buffer creation returned a null handle");
                return 0;
            }
            self.buffer = Some(handle);
        }

        gl.bind_buffer(gl_target, self.buffer);

        let previous_len = self.allocated_len;
        if self.allocated_len == data.len() && !data.is_empty() {
            gl.buffer_sub_data(gl_target, 0, data);
        } else {
            gl.buffer_data(gl_target, data, Self::native_usage(usage));
            self.allocated_len = data.len();
        }

        self.allocated_len as i64 - previous_len as i64
    }

    /// Upload a sub-range into existing native storage.
    pub fn upload_range(
        &mut self,
        gl: &dyn GlBackend,
        target: BufferTarget,
        offset: usize,
        data: &[u8],
    ) {
        if self.buffer.is_none() {
            return;
        }
        let gl_target = Self::native_target(target);
        gl.bind_buffer(gl_target, self.buffer);
        gl.buffer_sub_data(gl_target, offset, data);
    }

    /// Byte length of the native allocation.
    pub fn allocated_len(&self) -> usize {
        self.allocated_len
    }

    /// True when the native buffer exists.
    pub fn is_initialized(&self) -> bool {
        self.buffer.is_some()
    }
}

impl PlatformResource for BufferPlatform {
    fn destroy(&mut self, gl: &dyn GlBackend) {
        if let Some(vao) = self.vao.take() {
            gl.delete_vertex_array(vao);
        }
        if let Some(buffer) = self.buffer.take() {
            gl.delete_buffer(buffer);
        }
        self.allocated_len = 0;
    }

    fn lose_context(&mut self) {
        self.buffer = None;
        self.vao = None;
        self.allocated_len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::types::{VertexElement, VertexSemantic};

    fn quad_buffer() -> Buffer {
        let format = VertexFormat::new(&[VertexElement::float(VertexSemantic::Position, 2)]);
        Buffer::new_vertex(1, format, BufferUsage::Static, vec![0u8; 32])
    }

    #[test]
    fn test_unlock_creates_then_reuses() {
        let backend = DummyBackend::new();
        let buffer = quad_buffer();
        let mut state = buffer.state();
        let data = state.data.clone();

        state
            .platform
            .unlock(&backend, BufferTarget::Vertex, BufferUsage::Static, &data);
        assert_eq!(backend.call_count("create_buffer"), 1);
        assert_eq!(backend.call_count("buffer_data"), 1);

        // Same length: re-upload without reallocation.
        state
            .platform
            .unlock(&backend, BufferTarget::Vertex, BufferUsage::Static, &data);
        assert_eq!(backend.call_count("create_buffer"), 1);
        assert_eq!(backend.call_count("buffer_data"), 1);
        assert_eq!(backend.call_count("buffer_sub_data"), 1);
    }

    #[test]
    fn test_unlock_reallocates_on_length_change() {
        let backend = DummyBackend::new();
        let buffer = quad_buffer();
        let mut state = buffer.state();

        let data = state.data.clone();
        state
            .platform
            .unlock(&backend, BufferTarget::Vertex, BufferUsage::Static, &data);

        state.data = vec![0u8; 64];
        let data = state.data.clone();
        state
            .platform
            .unlock(&backend, BufferTarget::Vertex, BufferUsage::Static, &data);
        assert_eq!(backend.call_count("buffer_data"), 2);
        assert_eq!(backend.call_count("buffer_sub_data"), 0);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let backend = DummyBackend::new();
        let buffer = quad_buffer();
        let mut state = buffer.state();
        let data = state.data.clone();
        state
            .platform
            .unlock(&backend, BufferTarget::Vertex, BufferUsage::Static, &data);

        state.platform.destroy(&backend);
        state.platform.destroy(&backend);
        assert_eq!(backend.call_count("delete_buffer"), 1);
    }

    #[test]
    fn test_lose_context_forgets_without_delete() {
        let backend = DummyBackend::new();
        let buffer = quad_buffer();
        let mut state = buffer.state();
        let data = state.data.clone();
        state
            .platform
            .unlock(&backend, BufferTarget::Vertex, BufferUsage::Static, &data);

        state.platform.lose_context();
        assert_eq!(backend.call_count("delete_buffer"), 0);
        assert!(!state.platform.is_initialized());
    }

    #[test]
    fn test_set_data_range_bounds() {
        let buffer = quad_buffer();
        buffer.set_data_range(28, &[1, 2, 3, 4]);
        assert_eq!(buffer.state().data[28..32], [1, 2, 3, 4]);

        // out of bounds is rejected
        buffer.set_data_range(30, &[1, 2, 3, 4]);
        assert_eq!(buffer.state().data[28..32], [1, 2, 3, 4]);
    }

    #[test]
    fn test_vertex_count_from_stride() {
        let buffer = quad_buffer();
        assert_eq!(buffer.num_vertices(), 4);
        assert_eq!(buffer.num_indices(), 0);
    }
}
