//! Error types shared by every crate in the workspace.
//!
//! The top-level [`Error`] enumerates the failure kinds a conversion or
//! packaging run can surface. Subsystems report through the nested enums
//! ([`ContainerError`], [`MuxingError`], [`CodecError`], [`BitstreamError`])
//! which convert into [`Error`] with `?`.

use thiserror::Error;

/// Main error type for conversion and packaging operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The source has no usable track, or required metadata is missing.
    #[error("Bad media: {0}")]
    BadMedia(String),

    /// No encoder is available for the requested output codec.
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// Container parsing or packaging error.
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    /// Invalid muxer state transition or track configuration.
    #[error("Muxing error: {0}")]
    Muxing(#[from] MuxingError),

    /// Codec error.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Bitstream parsing error.
    #[error("Bitstream error: {0}")]
    Bitstream(#[from] BitstreamError),

    /// I/O error from the source reader or the sink writer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid parameter provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Cooperative cancellation.
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Container format errors.
#[derive(Error, Debug)]
pub enum ContainerError {
    /// Unknown top-level atom, missing `ftyp`, or otherwise broken layout.
    #[error("Malformed container: {0}")]
    Malformed(String),

    /// A `cmov` (compressed movie) atom was found inside `moov`.
    #[error("Compressed moov atoms are not supported")]
    CompressedMoovUnsupported,
}

impl From<String> for ContainerError {
    fn from(s: String) -> Self {
        ContainerError::Malformed(s)
    }
}

impl From<&str> for ContainerError {
    fn from(s: &str) -> Self {
        ContainerError::Malformed(s.to_string())
    }
}

/// Muxer state and track errors.
#[derive(Error, Debug)]
pub enum MuxingError {
    /// Operation not allowed in the muxer's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Two tracks were registered with the same id.
    #[error("Duplicate track id {0}")]
    DuplicateTrackId(u32),

    /// A sample referenced a track index that was never added.
    #[error("Unknown track index {0}")]
    UnknownTrack(usize),

    /// The media format cannot be stored in an MP4 track.
    #[error("Unsupported track format: {0}")]
    UnsupportedFormat(String),

    /// A sample arrived after the writer was closed.
    #[error("Writer already closed")]
    Closed,
}

/// Codec errors.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Codec was used before being configured.
    #[error("Codec not configured")]
    NotConfigured,

    /// Codec configuration error.
    #[error("Codec configuration error: {0}")]
    Config(String),

    /// Invalid NAL unit.
    #[error("Invalid NAL unit: {0}")]
    InvalidNalUnit(String),

    /// Invalid parameter set.
    #[error("Invalid parameter set: {0}")]
    InvalidParameterSet(String),

    /// The output format changed more than once.
    #[error("Output format changed twice")]
    FormatChangedTwice,

    /// Generic codec error message.
    #[error("{0}")]
    Other(String),
}

impl From<String> for CodecError {
    fn from(s: String) -> Self {
        CodecError::Other(s)
    }
}

impl From<&str> for CodecError {
    fn from(s: &str) -> Self {
        CodecError::Other(s.to_string())
    }
}

/// Bitstream parsing errors.
#[derive(Error, Debug)]
pub enum BitstreamError {
    /// Unexpected end of bitstream.
    #[error("Unexpected end of bitstream")]
    UnexpectedEnd,

    /// A definite NAL unit was requested from an empty buffer.
    #[error("Truncated NAL stream")]
    Truncated,

    /// Invalid syntax element value.
    #[error("Invalid syntax element: {element} = {value}")]
    InvalidSyntax { element: String, value: i64 },

    /// Exp-Golomb decoding error.
    #[error("Exp-Golomb decoding error: value too large")]
    ExpGolombOverflow,

    /// Generic bitstream error message.
    #[error("{0}")]
    Other(String),
}

impl From<String> for BitstreamError {
    fn from(s: String) -> Self {
        BitstreamError::Other(s)
    }
}

impl From<&str> for BitstreamError {
    fn from(s: &str) -> Self {
        BitstreamError::Other(s.to_string())
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid parameter error.
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }

    /// Create a bad media error.
    pub fn bad_media(msg: impl Into<String>) -> Self {
        Error::BadMedia(msg.into())
    }

    /// Create a muxer invalid-state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::Muxing(MuxingError::InvalidState(msg.into()))
    }

    /// Create a malformed-container error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::Container(ContainerError::Malformed(msg.into()))
    }

    /// Check if this is the cooperative cancellation result.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
