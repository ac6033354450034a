//! Vertex array object cache.
//!
//! Draw calls sharing the same set of vertex buffers and attribute layouts
//! reuse one native VAO. The cache key concatenates each buffer's logical
//! identity with its layout hash; entries are never invalidated one by one,
//! the whole cache is dropped on device destruction or context loss. A
//! single buffer drawn on its own skips the cache and keeps its VAO on the
//! buffer itself.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{GlBackend, VaoId};
use crate::resources::Buffer;

/// One (buffer identity, layout hash) pair per staged vertex buffer.
pub(crate) type VaoKey = Vec<(u64, u64)>;

/// Build the cache key for an ordered vertex buffer set.
pub(crate) fn vao_key(buffers: &[Arc<Buffer>]) -> VaoKey {
    buffers
        .iter()
        .map(|buffer| {
            let layout = buffer.format().map(|f| f.layout_hash()).unwrap_or(0);
            (buffer.id(), layout)
        })
        .collect()
}

/// Content-keyed cache of native vertex array objects.
#[derive(Debug, Default)]
pub(crate) struct VaoCache {
    map: HashMap<VaoKey, VaoId>,
}

impl VaoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &VaoKey) -> Option<VaoId> {
        self.map.get(key).copied()
    }

    pub fn insert(&mut self, key: VaoKey, vao: VaoId) {
        self.map.insert(key, vao);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Delete every cached VAO and empty the cache.
    pub fn clear(&mut self, gl: &dyn GlBackend) {
        for (_, vao) in self.map.drain() {
            gl.delete_vertex_array(vao);
        }
    }

    /// Empty the cache without deleting handles (context loss).
    pub fn forget(&mut self) {
        self.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::types::{BufferUsage, VertexElement, VertexFormat, VertexSemantic};

    fn vertex_buffer(id: u64, components: u32) -> Arc<Buffer> {
        let format = VertexFormat::new(&[VertexElement::float(VertexSemantic::Position, components)]);
        Arc::new(Buffer::new_vertex(
            id,
            format,
            BufferUsage::Static,
            vec![0u8; 48],
        ))
    }

    #[test]
    fn test_key_tracks_identity_and_layout() {
        let a = vertex_buffer(1, 3);
        let b = vertex_buffer(2, 3);
        let key_ab = vao_key(&[Arc::clone(&a), Arc::clone(&b)]);
        let key_ba = vao_key(&[b, Arc::clone(&a)]);
        assert_ne!(key_ab, key_ba);

        let a_again = vertex_buffer(1, 3);
        let key_a1 = vao_key(&[Arc::clone(&a)]);
        let key_a2 = vao_key(&[a_again]);
        assert_eq!(key_a1, key_a2);

        let different_layout = vertex_buffer(1, 2);
        assert_ne!(key_a1, vao_key(&[different_layout]));
    }

    #[test]
    fn test_clear_deletes_forget_does_not() {
        let backend = DummyBackend::new();
        let mut cache = VaoCache::new();
        cache.insert(vec![(1, 2)], backend.create_vertex_array());
        cache.insert(vec![(3, 4)], backend.create_vertex_array());

        let mut forgotten = VaoCache::new();
        forgotten.insert(vec![(5, 6)], backend.create_vertex_array());
        forgotten.forget();
        assert_eq!(forgotten.len(), 0);
        assert_eq!(backend.call_count("delete_vertex_array"), 0);

        cache.clear(&backend);
        assert_eq!(cache.len(), 0);
        assert_eq!(backend.call_count("delete_vertex_array"), 2);
    }
}
