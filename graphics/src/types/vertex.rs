//! Vertex layout descriptions.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Semantic meaning of a vertex attribute.
///
/// Every semantic owns a fixed attribute slot; shaders bind their declared
/// attributes to these slots before linking so that vertex layouts stay
/// compatible across programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexSemantic {
    /// Vertex position.
    Position,
    /// Vertex normal.
    Normal,
    /// Vertex tangent.
    Tangent,
    /// Skinning blend weights.
    BlendWeight,
    /// Skinning blend indices.
    BlendIndices,
    /// Vertex color.
    Color,
    /// Texture coordinate set 0-7.
    TexCoord(u8),
    /// General purpose attribute slot 14.
    Attr14,
    /// General purpose attribute slot 15.
    Attr15,
}

impl VertexSemantic {
    /// The fixed attribute slot this semantic binds to.
    pub fn location(&self) -> u32 {
        match self {
            Self::Position => 0,
            Self::Normal => 1,
            Self::Tangent => 2,
            Self::BlendWeight => 3,
            Self::BlendIndices => 4,
            Self::Color => 5,
            Self::TexCoord(set) => 6 + (*set as u32).min(7),
            Self::Attr14 => 14,
            Self::Attr15 => 15,
        }
    }
}

/// Storage type of a vertex attribute component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexDataType {
    /// Signed 8-bit integer.
    I8,
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 16-bit integer.
    I16,
    /// Unsigned 16-bit integer.
    U16,
    /// Signed 32-bit integer.
    I32,
    /// Unsigned 32-bit integer.
    U32,
    /// 32-bit float.
    #[default]
    F32,
}

impl VertexDataType {
    /// Size of one component in bytes.
    pub fn size(&self) -> u32 {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
        }
    }
}

/// One attribute within a vertex layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexElement {
    /// Attribute semantic, determining the attribute slot.
    pub semantic: VertexSemantic,
    /// Number of components (1-4).
    pub components: u32,
    /// Component storage type.
    pub data_type: VertexDataType,
    /// Normalize integer data to [0, 1] / [-1, 1] on fetch.
    pub normalize: bool,
}

impl VertexElement {
    /// Create a float attribute with the given component count.
    pub fn float(semantic: VertexSemantic, components: u32) -> Self {
        Self {
            semantic,
            components,
            data_type: VertexDataType::F32,
            normalize: false,
        }
    }

    /// Byte size of the attribute.
    pub fn size(&self) -> u32 {
        self.components * self.data_type.size()
    }
}

/// An element placed within an interleaved layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlacedElement {
    /// The attribute description.
    pub element: VertexElement,
    /// Byte offset of the attribute within one vertex.
    pub offset: u32,
}

/// Complete interleaved vertex layout.
///
/// The layout hash identifies the attribute configuration (not the buffer
/// contents); together with the buffer identity it keys the device's vertex
/// array cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexFormat {
    elements: Vec<PlacedElement>,
    stride: u32,
    layout_hash: u64,
}

impl VertexFormat {
    /// Build an interleaved layout from an ordered attribute list.
    pub fn new(elements: &[VertexElement]) -> Self {
        let mut placed = Vec::with_capacity(elements.len());
        let mut offset = 0;
        for element in elements {
            placed.push(PlacedElement {
                element: *element,
                offset,
            });
            offset += element.size();
        }

        let mut hasher = DefaultHasher::new();
        for p in &placed {
            p.hash(&mut hasher);
        }
        offset.hash(&mut hasher);

        Self {
            elements: placed,
            stride: offset,
            layout_hash: hasher.finish(),
        }
    }

    /// Attributes in declaration order with their computed offsets.
    pub fn elements(&self) -> &[PlacedElement] {
        &self.elements
    }

    /// Byte stride of one vertex.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Hash identifying this attribute configuration.
    pub fn layout_hash(&self) -> u64 {
        self.layout_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semantic_locations_unique() {
        let semantics = [
            VertexSemantic::Position,
            VertexSemantic::Normal,
            VertexSemantic::Tangent,
            VertexSemantic::BlendWeight,
            VertexSemantic::BlendIndices,
            VertexSemantic::Color,
            VertexSemantic::TexCoord(0),
            VertexSemantic::TexCoord(7),
            VertexSemantic::Attr14,
            VertexSemantic::Attr15,
        ];
        let mut seen = std::collections::HashSet::new();
        for s in semantics {
            assert!(seen.insert(s.location()), "duplicate slot for {s:?}");
            assert!(s.location() < 16);
        }
    }

    #[test]
    fn test_format_offsets_and_stride() {
        let format = VertexFormat::new(&[
            VertexElement::float(VertexSemantic::Position, 3),
            VertexElement::float(VertexSemantic::TexCoord(0), 2),
        ]);
        assert_eq!(format.stride(), 20);
        assert_eq!(format.elements()[0].offset, 0);
        assert_eq!(format.elements()[1].offset, 12);
    }

    #[test]
    fn test_layout_hash_distinguishes_layouts() {
        let a = VertexFormat::new(&[VertexElement::float(VertexSemantic::Position, 3)]);
        let b = VertexFormat::new(&[VertexElement::float(VertexSemantic::Position, 2)]);
        let c = VertexFormat::new(&[VertexElement::float(VertexSemantic::Position, 3)]);
        assert_ne!(a.layout_hash(), b.layout_hash());
        assert_eq!(a.layout_hash(), c.layout_hash());
    }
}
