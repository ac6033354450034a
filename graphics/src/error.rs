//! Graphics error types.

use std::fmt;

/// Errors that can occur in the graphics system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Failed to initialize the graphics device.
    InitializationFailed(String),
    /// An abstract format or feature has no native equivalent on this device.
    CapabilityMissing(String),
    /// Shader stage compilation or program linking failed.
    ShaderCompileFailed(String),
    /// The driver rejected a framebuffer attachment configuration.
    FramebufferIncomplete(String),
    /// The GPU context was lost.
    ContextLost,
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// An internal error occurred.
    Internal(String),
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializationFailed(msg) => write!(f, "initialization failed: {msg}"),
            Self::CapabilityMissing(msg) => write!(f, "capability missing: {msg}"),
            Self::ShaderCompileFailed(msg) => write!(f, "shader compile failed: {msg}"),
            Self::FramebufferIncomplete(msg) => write!(f, "framebuffer incomplete: {msg}"),
            Self::ContextLost => write!(f, "GPU context lost"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for GraphicsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::ContextLost;
        assert_eq!(err.to_string(), "GPU context lost");

        let err = GraphicsError::CapabilityMissing("S3TC compression".to_string());
        assert_eq!(err.to_string(), "capability missing: S3TC compression");
    }
}
