//! Conversion presets and output planning.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use transcode_core::VideoCodec;

/// Named target quality: short side, codec and bitrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConversionPreset {
    /// 240p H.264.
    #[serde(rename = "240p")]
    P240,
    /// 360p H.264.
    #[serde(rename = "360p")]
    P360,
    /// 480p H.264.
    #[serde(rename = "480p")]
    P480,
    /// 720p H.264.
    #[default]
    #[serde(rename = "720p")]
    P720,
    /// 720p H.265 at half the H.264 bitrate.
    #[serde(rename = "720p-h265")]
    P720H265,
    /// 1080p H.264.
    #[serde(rename = "1080p")]
    P1080,
    /// 1080p H.265 at half the H.264 bitrate.
    #[serde(rename = "1080p-h265")]
    P1080H265,
}

impl ConversionPreset {
    /// Every preset, smallest first.
    pub const ALL: [ConversionPreset; 7] = [
        Self::P240,
        Self::P360,
        Self::P480,
        Self::P720,
        Self::P720H265,
        Self::P1080,
        Self::P1080H265,
    ];

    /// Get preset name as string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P240 => "240p",
            Self::P360 => "360p",
            Self::P480 => "480p",
            Self::P720 => "720p",
            Self::P720H265 => "720p-h265",
            Self::P1080 => "1080p",
            Self::P1080H265 => "1080p-h265",
        }
    }

    /// Target length of the shorter side in pixels.
    pub fn short_side(&self) -> u32 {
        match self {
            Self::P240 => 240,
            Self::P360 => 360,
            Self::P480 => 480,
            Self::P720 | Self::P720H265 => 720,
            Self::P1080 | Self::P1080H265 => 1080,
        }
    }

    /// Target codec.
    pub fn codec(&self) -> VideoCodec {
        match self {
            Self::P720H265 | Self::P1080H265 => VideoCodec::H265,
            _ => VideoCodec::H264,
        }
    }

    /// Video bitrate in bits per second.
    pub fn video_bitrate(&self) -> u32 {
        match self {
            Self::P240 => 1_333_000,
            Self::P360 => 2_000_000,
            Self::P480 => 2_666_000,
            Self::P720 => 4_000_000,
            Self::P720H265 => 2_000_000,
            Self::P1080 => 6_000_000,
            Self::P1080H265 => 3_000_000,
        }
    }

    /// Audio bitrate in bits per second.
    pub fn audio_bitrate(&self) -> u32 {
        match self {
            Self::P240 => 64_000,
            Self::P360 => 96_000,
            Self::P480 => 128_000,
            _ => 192_000,
        }
    }

    /// Plan a conversion of a `width`x`height` source lasting `duration_us`.
    pub fn plan(&self, width: u32, height: u32, duration_us: i64) -> ConversionPlan {
        let (dst_width, dst_height) = short_side_size(width, height, self.short_side());
        ConversionPlan {
            preset: *self,
            codec: self.codec(),
            width: dst_width,
            height: dst_height,
            video_bitrate: self.video_bitrate(),
            audio_bitrate: self.audio_bitrate(),
            duration_us,
            estimated_bytes: estimate_size(self.video_bitrate(), self.audio_bitrate(), duration_us),
        }
    }
}

impl fmt::Display for ConversionPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversionPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|preset| preset.as_str() == lower)
            .ok_or_else(|| format!("unknown preset '{}'", s))
    }
}

/// Resolved output of a preset for a given source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionPlan {
    /// Preset the plan was made from.
    pub preset: ConversionPreset,
    /// Target codec.
    pub codec: VideoCodec,
    /// Output width.
    pub width: u32,
    /// Output height.
    pub height: u32,
    /// Video bitrate in bits per second.
    pub video_bitrate: u32,
    /// Audio bitrate in bits per second.
    pub audio_bitrate: u32,
    /// Duration of the converted range.
    pub duration_us: i64,
    /// Expected output size in bytes.
    pub estimated_bytes: u64,
}

/// Scale `width`x`height` so the shorter side is `res`, rounding the longer
/// side down to a multiple of 4.
pub fn short_side_size(width: u32, height: u32, res: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (res, res);
    }
    let scaled = |long: u32, short: u32| ((u64::from(long) * u64::from(res) / u64::from(short)) as u32) & !3;
    if width <= height {
        (res, scaled(height, width))
    } else {
        (scaled(width, height), res)
    }
}

/// Expected output size in bytes for the given bitrates.
pub fn estimate_size(video_bitrate: u32, audio_bitrate: u32, duration_us: i64) -> u64 {
    let bits_per_second = u64::from(video_bitrate) + u64::from(audio_bitrate);
    let duration = u64::try_from(duration_us).unwrap_or(0);
    (u128::from(bits_per_second) * u128::from(duration) / 8 / 1_000_000) as u64
}
