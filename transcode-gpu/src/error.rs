//! GPU error types.

use thiserror::Error;
use transcode_core::error::Error as CoreError;

/// Result type for GPU operations.
pub type Result<T> = std::result::Result<T, GpuError>;

/// Rendering surface and shader errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// EGL/GL context setup failed.
    #[error("GL context initialization failed: {0}")]
    InitializationFailed(String),

    /// Shader compilation or program link failed.
    #[error("Shader compilation failed: {0}")]
    ShaderCompilationFailed(String),

    /// Invalid surface dimensions.
    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// No frame arrived on the output surface in time.
    #[error("Frame wait timed out after {0}ms")]
    Timeout(u64),

    /// The surface was used after release.
    #[error("Surface released")]
    Released,
}

impl From<GpuError> for CoreError {
    fn from(err: GpuError) -> Self {
        match err {
            GpuError::InvalidDimensions { .. } => CoreError::InvalidParameter(err.to_string()),
            other => CoreError::Codec(other.to_string().into()),
        }
    }
}
