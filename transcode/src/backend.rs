//! The platform media stack the converter drives.
//!
//! A backend opens demuxers over the source, creates the four codecs and the
//! two GL surfaces. Every object it returns is owned by the converter and
//! released by it, so implementations only construct and configure.

use std::path::Path;
use transcode_codecs::{CodecInfo, MediaCodec};
use transcode_containers::Demuxer;
use transcode_core::{MediaFormat, Result};
use transcode_gpu::{InputSurface, OutputSurface};

/// An encoder fed from a window surface, with that surface.
pub struct SurfaceEncoder {
    /// The configured and started encoder.
    pub encoder: Box<dyn MediaCodec>,
    /// The surface frames are drawn onto.
    pub surface: Box<dyn InputSurface>,
}

/// Factory for the components of one conversion.
pub trait MediaBackend {
    /// The first encoder able to produce `mime`, if any.
    fn select_encoder(&self, mime: &str) -> Option<CodecInfo>;

    /// Open an independent demuxer over `source`. No track is selected yet.
    fn open_demuxer(&mut self, source: &Path) -> Result<Box<dyn Demuxer>>;

    /// Configure and start a surface-fed video encoder for `format`.
    fn create_video_encoder(&mut self, format: &MediaFormat) -> Result<SurfaceEncoder>;

    /// Create the texture surface the video decoder renders into.
    fn create_output_surface(&mut self) -> Result<Box<dyn OutputSurface>>;

    /// Configure and start a video decoder rendering into `surface`.
    fn create_video_decoder(&mut self, format: &MediaFormat, surface: &mut dyn OutputSurface) -> Result<Box<dyn MediaCodec>>;

    /// Configure and start an audio decoder producing PCM.
    fn create_audio_decoder(&mut self, format: &MediaFormat) -> Result<Box<dyn MediaCodec>>;

    /// Configure and start a buffer-fed audio encoder for `format`.
    fn create_audio_encoder(&mut self, format: &MediaFormat) -> Result<Box<dyn MediaCodec>>;
}
