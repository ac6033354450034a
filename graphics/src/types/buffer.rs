//! Buffer types.

/// Usage hint describing how often buffer contents change.
///
/// The hint is forwarded to the driver when native storage is allocated; it
/// never restricts what the caller may do, but picking the right one lets
/// the driver place the allocation sensibly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    /// Contents are set once and drawn many times.
    #[default]
    Static,
    /// Contents are updated occasionally.
    Dynamic,
    /// Contents are updated every frame.
    Stream,
    /// Contents are written by the GPU itself (transform feedback output).
    GpuDynamic,
}

/// Native binding target of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attribute data.
    Vertex,
    /// Index data.
    Index,
}

/// Storage format of index buffer entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    /// 8-bit unsigned indices.
    U8,
    /// 16-bit unsigned indices.
    #[default]
    U16,
    /// 32-bit unsigned indices. Requires the uint-element capability.
    U32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub fn bytes_per_index(&self) -> u32 {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_sizes() {
        assert_eq!(IndexFormat::U8.bytes_per_index(), 1);
        assert_eq!(IndexFormat::U16.bytes_per_index(), 2);
        assert_eq!(IndexFormat::U32.bytes_per_index(), 4);
    }
}
