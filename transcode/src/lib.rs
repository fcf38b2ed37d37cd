//! # Transcode
//!
//! Video conversion to MP4: trim, rescale and re-encode a source file with
//! a platform media stack, then package the result for streaming.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use transcode::{ConversionPreset, ConvertOptions, VideoConverter};
//!
//! fn convert(backend: impl transcode::MediaBackend) -> transcode::Result<()> {
//!     let options = ConvertOptions::from_preset(ConversionPreset::P720)
//!         .time_range(2_000_000, 7_000_000)
//!         .streamable(true);
//!
//!     let mut converter = VideoConverter::new(backend, "input.mp4", options)?
//!         .on_progress(|percent| {
//!             println!("{percent}%");
//!             false
//!         });
//!     converter.convert("output.mp4".as_ref())?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - `transcode-core`: errors, bitstream and NAL scanning, buffer and format types
//! - `transcode-codecs`: the polled codec interface, H.264 and AAC parameter parsing
//! - `transcode-hevc`: H.265 parameter set parsing
//! - `transcode-containers`: demuxer/muxer traits, the streaming MP4 muxer and fast-start
//! - `transcode-gpu`: scaling shader and render surfaces
//!
//! This crate holds the conversion options and the pipeline controller that
//! drives a [`MediaBackend`].

mod backend;
mod converter;
mod options;
mod presets;
mod progress;

pub use transcode_core::{
    error::{CodecError, ContainerError, Error, MuxingError, Result},
    BitrateMode, BufferFlags, BufferInfo, MediaFormat, VideoCodec,
};

pub use transcode_codecs::{CodecInfo, MediaCodec, OutputEvent};
pub use transcode_containers::{fast_start, fast_start_in_place, Demuxer, FastStartOutcome, Mp4Info, Muxer, SeekMode, StreamingMuxer};
pub use transcode_gpu::{InputSurface, OutputSurface};

pub use backend::{MediaBackend, SurfaceEncoder};
pub use converter::{ConvertReport, ConvertStats, Outcome, ProgressListener, VideoConverter};
pub use options::{
    ConvertOptions, FrameSize, DEFAULT_AUDIO_BITRATE, DEFAULT_VIDEO_BITRATE, OUTPUT_AUDIO_MIME,
    OUTPUT_VIDEO_FRAME_RATE, OUTPUT_VIDEO_IFRAME_INTERVAL, TIMEOUT,
};
pub use presets::{estimate_size, short_side_size, ConversionPlan, ConversionPreset};
pub use progress::{ProgressHandle, ProgressState, Stage};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string.
pub fn version() -> &'static str {
    VERSION
}
