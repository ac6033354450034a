//! Uniform value scope with version-stamped change tracking.
//!
//! Collaborators publish values into named [`UniformSlot`]s resolved from
//! the device's [`UniformScope`]. Every slot carries a monotonically
//! increasing version stamp; at draw time the device compares each shader
//! binding's last-committed stamp against the slot stamp and only re-uploads
//! values that actually changed. Equal stamps imply an identical value.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::consts as gl;
use crate::resources::texture::Texture;

/// A (global id, revision) pair identifying one published value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Version {
    /// Identity of the slot the value lives in.
    pub global_id: u64,
    /// Revision of the slot's value, bumped on every publish.
    pub revision: u64,
}

/// Classified type of a shader uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Bool,
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
    IVec2,
    IVec3,
    IVec4,
    BVec2,
    BVec3,
    BVec4,
    Mat2,
    Mat3,
    Mat4,
    FloatArray,
    Vec2Array,
    Vec3Array,
    Vec4Array,
    IntArray,
    Mat4Array,
    Texture2D,
    TextureCube,
    Texture3D,
    Texture2DShadow,
    TextureCubeShadow,
    Texture2DArray,
}

impl UniformType {
    /// Classify a native introspection type.
    ///
    /// Unknown native types return `None`; the caller skips those bindings
    /// rather than guessing.
    pub fn from_native(gl_type: u32, array_size: u32) -> Option<Self> {
        let scalar = match gl_type {
            gl::BOOL => Self::Bool,
            gl::INT => Self::Int,
            gl::FLOAT => Self::Float,
            gl::FLOAT_VEC2 => Self::Vec2,
            gl::FLOAT_VEC3 => Self::Vec3,
            gl::FLOAT_VEC4 => Self::Vec4,
            gl::INT_VEC2 => Self::IVec2,
            gl::INT_VEC3 => Self::IVec3,
            gl::INT_VEC4 => Self::IVec4,
            gl::BOOL_VEC2 => Self::BVec2,
            gl::BOOL_VEC3 => Self::BVec3,
            gl::BOOL_VEC4 => Self::BVec4,
            gl::FLOAT_MAT2 => Self::Mat2,
            gl::FLOAT_MAT3 => Self::Mat3,
            gl::FLOAT_MAT4 => Self::Mat4,
            gl::SAMPLER_2D => Self::Texture2D,
            gl::SAMPLER_CUBE => Self::TextureCube,
            gl::SAMPLER_3D => Self::Texture3D,
            gl::SAMPLER_2D_SHADOW => Self::Texture2DShadow,
            gl::SAMPLER_CUBE_SHADOW => Self::TextureCubeShadow,
            gl::SAMPLER_2D_ARRAY => Self::Texture2DArray,
            _ => return None,
        };
        if array_size <= 1 {
            return Some(scalar);
        }
        // Arrays of the types the commit path supports; samplers stay as-is
        // (a sampler array binds one unit per element).
        Some(match scalar {
            Self::Float => Self::FloatArray,
            Self::Vec2 => Self::Vec2Array,
            Self::Vec3 => Self::Vec3Array,
            Self::Vec4 => Self::Vec4Array,
            Self::Int | Self::Bool => Self::IntArray,
            Self::Mat4 => Self::Mat4Array,
            other => other,
        })
    }

    /// Uniforms sampling a texture kind are samplers; everything else is a
    /// plain uniform.
    pub fn is_sampler(&self) -> bool {
        matches!(
            self,
            Self::Texture2D
                | Self::TextureCube
                | Self::Texture3D
                | Self::Texture2DShadow
                | Self::TextureCubeShadow
                | Self::Texture2DArray
        )
    }
}

/// A value published into a uniform slot.
#[derive(Debug, Clone)]
pub enum UniformValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    IVec2([i32; 2]),
    IVec3([i32; 3]),
    IVec4([i32; 4]),
    Mat2([f32; 4]),
    Mat3([f32; 9]),
    Mat4([f32; 16]),
    /// Flat float array (also used for vecN arrays, N floats per element).
    FloatArray(Vec<f32>),
    /// Flat integer array.
    IntArray(Vec<i32>),
    /// One texture to sample.
    Texture(Arc<Texture>),
    /// Texture per sampler-array element.
    TextureArray(Vec<Arc<Texture>>),
}

impl PartialEq for UniformValue {
    fn eq(&self, other: &Self) -> bool {
        use UniformValue::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Vec2(a), Vec2(b)) => a == b,
            (Vec3(a), Vec3(b)) => a == b,
            (Vec4(a), Vec4(b)) => a == b,
            (IVec2(a), IVec2(b)) => a == b,
            (IVec3(a), IVec3(b)) => a == b,
            (IVec4(a), IVec4(b)) => a == b,
            (Mat2(a), Mat2(b)) => a == b,
            (Mat3(a), Mat3(b)) => a == b,
            (Mat4(a), Mat4(b)) => a == b,
            (FloatArray(a), FloatArray(b)) => a == b,
            (IntArray(a), IntArray(b)) => a == b,
            (Texture(a), Texture(b)) => Arc::ptr_eq(a, b),
            (TextureArray(a), TextureArray(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Arc::ptr_eq(x, y))
            }
            _ => false,
        }
    }
}

#[derive(Debug, Default)]
struct SlotState {
    value: Option<UniformValue>,
    revision: u64,
}

/// A named uniform binding point holding a version-stamped value.
#[derive(Debug)]
pub struct UniformSlot {
    name: String,
    global_id: u64,
    state: Mutex<SlotState>,
}

impl UniformSlot {
    fn new(name: String, global_id: u64) -> Self {
        Self {
            name,
            global_id,
            state: Mutex::new(SlotState::default()),
        }
    }

    /// The slot name as shaders declare it.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publish a new value, bumping the revision.
    pub fn set_value(&self, value: UniformValue) {
        let mut state = self.state.lock();
        state.value = Some(value);
        state.revision += 1;
    }

    /// Clear the slot, bumping the revision.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        if state.value.is_some() {
            state.value = None;
            state.revision += 1;
        }
    }

    /// Current value (cloned) together with its version stamp.
    pub fn value_and_version(&self) -> (Option<UniformValue>, Version) {
        let state = self.state.lock();
        (
            state.value.clone(),
            Version {
                global_id: self.global_id,
                revision: state.revision,
            },
        )
    }

    /// True when a value is currently published.
    pub fn has_value(&self) -> bool {
        self.state.lock().value.is_some()
    }
}

/// Device-owned namespace of uniform slots.
///
/// Slots are created on first resolve and live as long as the scope;
/// resolving the same name always returns the same slot.
#[derive(Debug, Default)]
pub struct UniformScope {
    slots: HashMap<String, Arc<UniformSlot>>,
    next_global_id: u64,
}

impl UniformScope {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a slot by name, creating it if needed.
    pub fn resolve(&mut self, name: &str) -> Arc<UniformSlot> {
        if let Some(slot) = self.slots.get(name) {
            return Arc::clone(slot);
        }
        self.next_global_id += 1;
        let slot = Arc::new(UniformSlot::new(name.to_string(), self.next_global_id));
        self.slots.insert(name.to_string(), Arc::clone(&slot));
        slot
    }

    /// Look up a slot without creating it.
    pub fn get(&self, name: &str) -> Option<Arc<UniformSlot>> {
        self.slots.get(name).map(Arc::clone)
    }

    /// Clear every slot that references the given texture.
    ///
    /// Called when a texture is destroyed so stale bindings cannot be
    /// committed later.
    pub fn remove_texture(&self, texture: &Arc<Texture>) {
        for slot in self.slots.values() {
            let mut state = slot.state.lock();
            let references = match &state.value {
                Some(UniformValue::Texture(t)) => Arc::ptr_eq(t, texture),
                Some(UniformValue::TextureArray(list)) => {
                    list.iter().any(|t| Arc::ptr_eq(t, texture))
                }
                _ => false,
            };
            if references {
                state.value = None;
                state.revision += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_returns_same_slot() {
        let mut scope = UniformScope::new();
        let a = scope.resolve("matrix_model");
        let b = scope.resolve("matrix_model");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_version_monotonic() {
        let mut scope = UniformScope::new();
        let slot = scope.resolve("uColor");
        let (_, v0) = slot.value_and_version();

        slot.set_value(UniformValue::Vec4([1.0, 0.0, 0.0, 1.0]));
        let (_, v1) = slot.value_and_version();
        assert_eq!(v0.global_id, v1.global_id);
        assert!(v1.revision > v0.revision);

        slot.set_value(UniformValue::Vec4([1.0, 0.0, 0.0, 1.0]));
        let (_, v2) = slot.value_and_version();
        assert!(v2.revision > v1.revision);
    }

    #[test]
    fn test_distinct_slots_distinct_ids() {
        let mut scope = UniformScope::new();
        let a = scope.resolve("a");
        let b = scope.resolve("b");
        let (_, va) = a.value_and_version();
        let (_, vb) = b.value_and_version();
        assert_ne!(va.global_id, vb.global_id);
    }

    #[test]
    fn test_sampler_classification() {
        assert!(UniformType::Texture2D.is_sampler());
        assert!(UniformType::TextureCubeShadow.is_sampler());
        assert!(UniformType::Texture2DArray.is_sampler());
        assert!(!UniformType::Vec4.is_sampler());
        assert!(!UniformType::Mat4Array.is_sampler());
    }

    #[test]
    fn test_from_native_arrays() {
        assert_eq!(
            UniformType::from_native(gl::FLOAT_VEC4, 8),
            Some(UniformType::Vec4Array)
        );
        assert_eq!(
            UniformType::from_native(gl::FLOAT_MAT4, 60),
            Some(UniformType::Mat4Array)
        );
        assert_eq!(
            UniformType::from_native(gl::SAMPLER_2D, 4),
            Some(UniformType::Texture2D)
        );
        assert_eq!(UniformType::from_native(0xFFFF, 1), None);
    }
}
