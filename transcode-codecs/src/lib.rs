//! # Transcode Codecs
//!
//! Codec-side building blocks for the conversion pipeline:
//!
//! - [`MediaCodec`] - the polled buffer-exchange interface every decoder and
//!   encoder implements
//! - [`video::h264`] - NAL header classification and SPS parsing
//! - [`audio::aac`] - sampling frequency table and AudioSpecificConfig

pub mod audio;
pub mod traits;
pub mod video;

pub use traits::{CodecInfo, MediaCodec, OutputEvent};
