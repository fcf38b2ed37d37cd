//! HEVC-specific error types.

use thiserror::Error;
use transcode_core::error::{CodecError, Error as CoreError};

/// HEVC-specific error type.
#[derive(Error, Debug)]
pub enum HevcError {
    /// NAL unit parsing error.
    #[error("NAL unit error: {0}")]
    NalUnit(#[from] NalError),

    /// Sequence Parameter Set error.
    #[error("SPS error: {0}")]
    Sps(String),

    /// Underlying bit reader failure.
    #[error("Bitstream error: {0}")]
    Core(#[from] CoreError),
}

/// NAL unit specific errors.
#[derive(Error, Debug)]
pub enum NalError {
    /// Invalid NAL unit header.
    #[error("Invalid NAL unit header")]
    InvalidHeader,

    /// Truncated NAL unit.
    #[error("Truncated NAL unit: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    /// A NAL unit of another type was passed where a specific one is required.
    #[error("Unexpected NAL unit type: expected {expected}, got {got}")]
    UnexpectedType { expected: u8, got: u8 },
}

/// Result type for HEVC operations.
pub type Result<T> = std::result::Result<T, HevcError>;

impl From<HevcError> for CoreError {
    fn from(err: HevcError) -> Self {
        match err {
            HevcError::Core(inner) => inner,
            HevcError::NalUnit(nal) => CoreError::Codec(CodecError::InvalidNalUnit(nal.to_string())),
            HevcError::Sps(msg) => CoreError::Codec(CodecError::InvalidParameterSet(msg)),
        }
    }
}
