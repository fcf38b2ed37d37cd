//! Conversion options and codec settings.

use std::time::Duration;
use transcode_core::format::{AAC_PROFILE_LC, MIME_AUDIO_AAC};
use transcode_core::{BitrateMode, Error, Result, VideoCodec};

use crate::presets::{short_side_size, ConversionPreset};

/// How long a single codec poll may block.
pub const TIMEOUT: Duration = Duration::from_millis(10);

/// Nominal encoder frame rate. The real rate follows the source timestamps;
/// the encoder only needs it to place key frames.
pub const OUTPUT_VIDEO_FRAME_RATE: u32 = 30;

/// Seconds between key frames.
pub const OUTPUT_VIDEO_IFRAME_INTERVAL: u32 = 10;

/// MIME type of the audio encoder output.
pub const OUTPUT_AUDIO_MIME: &str = MIME_AUDIO_AAC;

/// Default target video bitrate.
pub const DEFAULT_VIDEO_BITRATE: u32 = 2_000_000;

/// Default target audio bitrate.
pub const DEFAULT_AUDIO_BITRATE: u32 = 128_000;

/// Target frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSize {
    /// Encode at exactly this size (before rotation).
    Exact {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
    },
    /// Scale the shorter source side to this many pixels, keeping aspect.
    ShortSide(u32),
}

impl FrameSize {
    /// Resolve against the source display size.
    pub fn resolve(&self, src_width: u32, src_height: u32) -> (u32, u32) {
        match *self {
            FrameSize::Exact { width, height } => (width, height),
            FrameSize::ShortSide(res) => short_side_size(src_width, src_height, res),
        }
    }
}

/// Options for one conversion run, built with consuming setters.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertOptions {
    /// Target bitstream.
    pub video_codec: VideoCodec,
    /// Target size; `None` keeps the source size.
    pub size: Option<FrameSize>,
    /// Target average video bitrate in bits per second.
    pub video_bitrate: u32,
    /// Video rate control.
    pub bitrate_mode: BitrateMode,
    /// Target AAC bitrate in bits per second.
    pub audio_bitrate: u32,
    /// AAC audio object type.
    pub aac_profile: u32,
    /// Nominal frame rate handed to the encoder.
    pub frame_rate: u32,
    /// Key frame interval in seconds.
    pub i_frame_interval: u32,
    /// Trim start in microseconds, 0 for the beginning.
    pub time_from_us: i64,
    /// Trim end in microseconds, 0 for the end of the source.
    pub time_to_us: i64,
    /// Move `moov` ahead of the media data once the file is written.
    pub streamable: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ConvertOptions {
    /// Create options with the default codec settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            video_codec: VideoCodec::H264,
            size: None,
            video_bitrate: DEFAULT_VIDEO_BITRATE,
            bitrate_mode: BitrateMode::Vbr,
            audio_bitrate: DEFAULT_AUDIO_BITRATE,
            aac_profile: AAC_PROFILE_LC,
            frame_rate: OUTPUT_VIDEO_FRAME_RATE,
            i_frame_interval: OUTPUT_VIDEO_IFRAME_INTERVAL,
            time_from_us: 0,
            time_to_us: 0,
            streamable: false,
        }
    }

    /// Options matching a preset: short-side sizing, codec and bitrates.
    #[must_use]
    pub fn from_preset(preset: ConversionPreset) -> Self {
        Self::new()
            .video_codec(preset.codec())
            .short_side(preset.short_side())
            .video_bitrate(preset.video_bitrate())
            .audio_bitrate(preset.audio_bitrate())
    }

    /// Set the target codec.
    #[must_use]
    pub fn video_codec(mut self, codec: VideoCodec) -> Self {
        self.video_codec = codec;
        self
    }

    /// Encode at an exact frame size, given in display orientation.
    ///
    /// Encoders work in 16x16 macroblocks; other sizes are accepted with a
    /// warning but may be padded or rejected by the hardware.
    #[must_use]
    pub fn frame_size(mut self, width: u32, height: u32) -> Self {
        self.size = Some(FrameSize::Exact { width, height });
        self
    }

    /// Scale the shorter side to `res` pixels.
    #[must_use]
    pub fn short_side(mut self, res: u32) -> Self {
        self.size = Some(FrameSize::ShortSide(res));
        self
    }

    /// Set the video bitrate.
    #[must_use]
    pub fn video_bitrate(mut self, bps: u32) -> Self {
        self.video_bitrate = bps;
        self
    }

    /// Set the video rate control mode.
    #[must_use]
    pub fn bitrate_mode(mut self, mode: BitrateMode) -> Self {
        self.bitrate_mode = mode;
        self
    }

    /// Set the audio bitrate.
    #[must_use]
    pub fn audio_bitrate(mut self, bps: u32) -> Self {
        self.audio_bitrate = bps;
        self
    }

    /// Set the AAC audio object type.
    #[must_use]
    pub fn aac_profile(mut self, profile: u32) -> Self {
        self.aac_profile = profile;
        self
    }

    /// Set the nominal encoder frame rate.
    #[must_use]
    pub fn frame_rate(mut self, fps: u32) -> Self {
        self.frame_rate = fps;
        self
    }

    /// Set the key frame interval in seconds.
    #[must_use]
    pub fn i_frame_interval(mut self, seconds: u32) -> Self {
        self.i_frame_interval = seconds;
        self
    }

    /// Set the trim window without checking it. See [`set_time_range`](Self::set_time_range).
    #[must_use]
    pub fn time_range(mut self, from_us: i64, to_us: i64) -> Self {
        self.time_from_us = from_us;
        self.time_to_us = to_us;
        self
    }

    /// Set the trim window in microseconds.
    ///
    /// `0, 0` converts the whole source and `to == 0` runs to the end. An
    /// empty or inverted window is rejected and leaves the options unchanged.
    pub fn set_time_range(&mut self, from_us: i64, to_us: i64) -> Result<()> {
        check_time_range(from_us, to_us).map_err(Error::InvalidParameter)?;
        self.time_from_us = from_us;
        self.time_to_us = to_us;
        Ok(())
    }

    /// Run the fast-start packager on the finished file.
    #[must_use]
    pub fn streamable(mut self, enable: bool) -> Self {
        self.streamable = enable;
        self
    }

    /// Trim window resolved against the source duration: `(from, to)` in
    /// microseconds.
    pub fn window(&self, duration_us: i64) -> (i64, i64) {
        let from = self.time_from_us.max(0);
        let to = if self.time_to_us > 0 { self.time_to_us } else { duration_us };
        (from, to)
    }

    /// Validate the options.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.video_bitrate == 0 {
            return Err("Video bitrate must be positive".into());
        }
        if self.audio_bitrate == 0 {
            return Err("Audio bitrate must be positive".into());
        }
        if self.frame_rate == 0 {
            return Err("Frame rate must be positive".into());
        }
        match self.size {
            Some(FrameSize::Exact { width, height }) if width == 0 || height == 0 => {
                return Err(format!("Invalid frame size {}x{}", width, height));
            }
            Some(FrameSize::ShortSide(0)) => return Err("Short side must be positive".into()),
            _ => {}
        }
        check_time_range(self.time_from_us, self.time_to_us)
    }
}

fn check_time_range(from_us: i64, to_us: i64) -> std::result::Result<(), String> {
    if from_us < 0 || to_us < 0 {
        return Err(format!("Negative time range {}..{}", from_us, to_us));
    }
    if to_us > 0 && from_us == to_us {
        return Err(format!("Empty time range {}..{}", from_us, to_us));
    }
    if to_us != 0 && to_us < from_us {
        return Err(format!("Inverted time range {}..{}", from_us, to_us));
    }
    Ok(())
}
