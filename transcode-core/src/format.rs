//! Typed media formats exchanged between extractors, codecs and muxers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// MIME type of H.264 / AVC video.
pub const MIME_VIDEO_AVC: &str = "video/avc";
/// MIME type of H.265 / HEVC video.
pub const MIME_VIDEO_HEVC: &str = "video/hevc";
/// MIME type of AAC audio in LATM/raw access units.
pub const MIME_AUDIO_AAC: &str = "audio/mp4a-latm";
/// MIME type of decoded PCM audio.
pub const MIME_AUDIO_RAW: &str = "audio/raw";

/// Target video codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// H.264 / AVC.
    #[default]
    H264,
    /// H.265 / HEVC.
    H265,
}

impl VideoCodec {
    /// MIME type handed to the encoder factory.
    pub fn mime(&self) -> &'static str {
        match self {
            Self::H264 => MIME_VIDEO_AVC,
            Self::H265 => MIME_VIDEO_HEVC,
        }
    }

    /// Sample entry FourCC written in `stsd`.
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            Self::H264 => *b"avc1",
            Self::H265 => *b"hvc1",
        }
    }

    /// Look up a codec by MIME type.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            MIME_VIDEO_AVC => Some(Self::H264),
            MIME_VIDEO_HEVC => Some(Self::H265),
            _ => None,
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H264 => write!(f, "H.264"),
            Self::H265 => write!(f, "H.265"),
        }
    }
}

/// Encoder rate control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitrateMode {
    /// Variable bitrate.
    #[default]
    Vbr,
    /// Constant bitrate.
    Cbr,
    /// Constant quality.
    Cq,
}

/// Pixel source an encoder reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorFormat {
    /// Frames arrive through an input surface.
    Surface,
    /// Frames arrive as YUV 4:2:0 byte buffers.
    Yuv420Flexible,
}

/// AAC Low Complexity audio object type.
pub const AAC_PROFILE_LC: u32 = 2;

/// A media format description.
///
/// Mirrors the key/value formats a platform media stack reports, with the
/// keys this crate needs lifted into typed fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaFormat {
    /// MIME type, e.g. `video/avc`.
    pub mime: String,
    /// Coded width in pixels.
    pub width: Option<u32>,
    /// Coded height in pixels.
    pub height: Option<u32>,
    /// Clockwise display rotation in degrees (0, 90, 180, 270).
    pub rotation: i32,
    /// Stream duration in microseconds.
    pub duration_us: Option<i64>,
    /// Audio sample rate in Hz.
    pub sample_rate: Option<u32>,
    /// Audio channel count.
    pub channel_count: Option<u32>,
    /// Average bitrate in bits per second.
    pub bit_rate: Option<u32>,
    /// Rate control mode.
    pub bitrate_mode: Option<BitrateMode>,
    /// AAC audio object type.
    pub aac_profile: Option<u32>,
    /// Nominal frame rate.
    pub frame_rate: Option<u32>,
    /// Key frame interval in seconds.
    pub i_frame_interval: Option<u32>,
    /// Encoder pixel source.
    pub color_format: Option<ColorFormat>,
    /// Codec-specific data (`csd-0`, `csd-1`, ...).
    pub csd: Vec<Vec<u8>>,
    /// Explicit MP4 track id.
    pub track_id: Option<u32>,
    /// ISO-639-2 language code.
    pub language: Option<String>,
}

impl MediaFormat {
    /// Create a video format.
    pub fn video(mime: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            mime: mime.into(),
            width: Some(width),
            height: Some(height),
            ..Default::default()
        }
    }

    /// Create an audio format.
    pub fn audio(mime: impl Into<String>, sample_rate: u32, channel_count: u32) -> Self {
        Self {
            mime: mime.into(),
            sample_rate: Some(sample_rate),
            channel_count: Some(channel_count),
            ..Default::default()
        }
    }

    /// Check if the MIME type is `video/*`.
    pub fn is_video(&self) -> bool {
        self.mime.starts_with("video/")
    }

    /// Check if the MIME type is `audio/*`.
    pub fn is_audio(&self) -> bool {
        self.mime.starts_with("audio/")
    }

    /// Codec-specific data buffer `index`, if present.
    pub fn csd(&self, index: usize) -> Option<&[u8]> {
        self.csd.get(index).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_codec_mime_round_trip() {
        for codec in [VideoCodec::H264, VideoCodec::H265] {
            assert_eq!(VideoCodec::from_mime(codec.mime()), Some(codec));
        }
        assert_eq!(VideoCodec::from_mime("video/x-vnd.on2.vp8"), None);
        assert_eq!(VideoCodec::H265.fourcc(), *b"hvc1");
    }

    #[test]
    fn test_media_kind() {
        let video = MediaFormat::video(MIME_VIDEO_AVC, 1920, 1080);
        assert!(video.is_video());
        assert!(!video.is_audio());

        let audio = MediaFormat::audio(MIME_AUDIO_AAC, 48_000, 2);
        assert!(audio.is_audio());
        assert_eq!(audio.csd(0), None);
    }
}
