//! # Transcode Core
//!
//! Core types shared by the conversion pipeline and the MP4 packager:
//! - Error taxonomy
//! - Bit reader/writer and Annex-B NAL unit scanning
//! - Buffer metadata and owned media samples
//! - Typed media formats
//! - Rational time comparison and timescale helpers

pub mod error;
pub mod bitstream;
pub mod packet;
pub mod format;
pub mod rational;

pub use error::{Error, Result};
pub use bitstream::{BitReader, BitWriter, NalUnits};
pub use packet::{BufferFlags, BufferInfo, MediaSample};
pub use format::{BitrateMode, ColorFormat, MediaFormat, VideoCodec};
pub use rational::Rational;
