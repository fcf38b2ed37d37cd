//! AAC track: `mp4a` sample entry with an `esds` descriptor, and one sample
//! per raw AAC frame.

use super::track::{Handler, TrackDescription};
use super::{make_box, make_full_box, write_u32_be};
use transcode_codecs::audio::aac::{AacProfile, AudioSpecificConfig, SAMPLES_PER_FRAME};
use transcode_core::error::{Error, Result};
use transcode_core::MediaSample;

const ES_DESCRIPTOR_TAG: u8 = 0x03;
const DECODER_CONFIG_DESCRIPTOR_TAG: u8 = 0x04;
const DECODER_SPECIFIC_INFO_TAG: u8 = 0x05;
const SL_CONFIG_DESCRIPTOR_TAG: u8 = 0x06;

/// ISO/IEC 14496-3 audio.
const OBJECT_TYPE_AUDIO: u8 = 0x40;
/// Audio stream type.
const STREAM_TYPE_AUDIO: u8 = 0x05;
const BUFFER_SIZE_DB: u32 = 1536;

/// AAC track builder.
#[derive(Debug, Clone)]
pub struct AacTrack {
    avg_bitrate: u32,
    max_bitrate: u32,
    sample_rate: u32,
    channel_count: u32,
    profile: u8,
    language: String,
}

impl AacTrack {
    /// Create a track. `profile` is the AAC audio object type.
    pub fn new(avg_bitrate: u32, max_bitrate: u32, sample_rate: u32, channel_count: u32, profile: u8) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::invalid_param("AAC sample rate must be positive"));
        }
        if channel_count == 0 {
            return Err(Error::invalid_param("AAC channel count must be positive"));
        }
        Ok(Self {
            avg_bitrate,
            max_bitrate,
            sample_rate,
            channel_count,
            profile,
            language: "und".to_string(),
        })
    }

    /// Create an AAC-LC track with equal average and maximum bitrate.
    pub fn lc(bitrate: u32, sample_rate: u32, channel_count: u32) -> Result<Self> {
        Self::new(bitrate, bitrate, sample_rate, channel_count, AacProfile::Lc.object_type())
    }

    /// Set the `mdhd` language.
    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = language.into();
    }

    /// Sample rate, which is also the track timescale.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Wrap one raw AAC access unit as a sample of 1024 ticks.
    pub fn process_sample(&self, frame: &[u8]) -> MediaSample {
        MediaSample::new(frame.to_vec(), u64::from(SAMPLES_PER_FRAME), true)
    }

    /// The AudioSpecificConfig carried in `esds`.
    pub fn audio_specific_config(&self) -> AudioSpecificConfig {
        AudioSpecificConfig::new(self.profile, self.sample_rate, self.channel_count)
    }

    /// Build the `esds` box.
    pub fn esds(&self) -> Vec<u8> {
        let asc = self.audio_specific_config().to_bytes();

        let mut decoder_config = Vec::with_capacity(13 + asc.len() + 2);
        decoder_config.push(OBJECT_TYPE_AUDIO);
        decoder_config.push((STREAM_TYPE_AUDIO << 2) | 0x01); // upstream 0, reserved 1
        decoder_config.extend_from_slice(&BUFFER_SIZE_DB.to_be_bytes()[1..]);
        decoder_config.extend_from_slice(&write_u32_be(self.max_bitrate));
        decoder_config.extend_from_slice(&write_u32_be(self.avg_bitrate));
        decoder_config.extend_from_slice(&descriptor(DECODER_SPECIFIC_INFO_TAG, &asc));

        let mut es = Vec::new();
        es.extend_from_slice(&[0, 0]); // ES_ID
        es.push(0); // flags
        es.extend_from_slice(&descriptor(DECODER_CONFIG_DESCRIPTOR_TAG, &decoder_config));
        es.extend_from_slice(&descriptor(SL_CONFIG_DESCRIPTOR_TAG, &[0x02]));

        make_full_box(b"esds", 0, 0, &descriptor(ES_DESCRIPTOR_TAG, &es))
    }

    /// Build the `mp4a` sample entry.
    pub fn sample_entry(&self) -> Vec<u8> {
        // Seven channels are signalled as eight.
        let channels = if self.channel_count == 7 { 8 } else { self.channel_count };

        let mut data = Vec::new();
        data.extend_from_slice(&[0u8; 6]); // reserved
        data.extend_from_slice(&[0, 1]); // data reference index
        data.extend_from_slice(&[0u8; 8]); // reserved
        data.extend_from_slice(&(channels as u16).to_be_bytes());
        data.extend_from_slice(&16u16.to_be_bytes()); // sample size
        data.extend_from_slice(&[0u8; 4]); // pre-defined and reserved
        data.extend_from_slice(&write_u32_be(self.sample_rate.min(0xFFFF) << 16));
        data.extend_from_slice(&self.esds());

        make_box(b"mp4a", &data)
    }

    /// Describe the track for the writer.
    pub fn description(&self) -> TrackDescription {
        TrackDescription {
            handler: Handler::Sound,
            timescale: self.sample_rate,
            language: self.language.clone(),
            sample_entry: self.sample_entry(),
            width: 0,
            height: 0,
            rotation: 0,
            track_id: None,
        }
    }
}

/// Encode an MPEG-4 descriptor with a single-byte length where it fits and
/// the four-byte expandable form otherwise.
fn descriptor(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 5);
    out.push(tag);
    let len = payload.len() as u32;
    if len < 0x80 {
        out.push(len as u8);
    } else {
        out.push(0x80 | ((len >> 21) & 0x7F) as u8);
        out.push(0x80 | ((len >> 14) & 0x7F) as u8);
        out.push(0x80 | ((len >> 7) & 0x7F) as u8);
        out.push((len & 0x7F) as u8);
    }
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_esds_layout() {
        let track = AacTrack::lc(128_000, 44_100, 2).unwrap();
        let esds = track.esds();
        assert_eq!(&esds[4..8], b"esds");
        let body = &esds[12..];
        assert_eq!(body[0], ES_DESCRIPTOR_TAG);
        assert_eq!(body[1] as usize, body.len() - 2);
        assert_eq!(&body[2..5], &[0, 0, 0]);
        assert_eq!(body[5], DECODER_CONFIG_DESCRIPTOR_TAG);
        assert_eq!(body[7], 0x40);
        assert_eq!(body[8], 0x15);
        assert_eq!(&body[9..12], &[0x00, 0x06, 0x00]);
        assert_eq!(&body[12..16], &128_000u32.to_be_bytes());
        assert_eq!(&body[16..20], &128_000u32.to_be_bytes());
        assert_eq!(&body[20..24], &[DECODER_SPECIFIC_INFO_TAG, 2, 0x12, 0x10]);
        assert_eq!(&body[24..], &[SL_CONFIG_DESCRIPTOR_TAG, 1, 0x02]);
    }

    #[test]
    fn test_sample_entry() {
        let track = AacTrack::lc(96_000, 48_000, 7).unwrap();
        let entry = track.sample_entry();
        assert_eq!(&entry[4..8], b"mp4a");
        assert_eq!(u16::from_be_bytes([entry[14], entry[15]]), 1);
        assert_eq!(u16::from_be_bytes([entry[24], entry[25]]), 8);
        assert_eq!(u16::from_be_bytes([entry[26], entry[27]]), 16);
        assert_eq!(u32::from_be_bytes([entry[32], entry[33], entry[34], entry[35]]), 48_000 << 16);
        assert_eq!(&entry[40..44], b"esds");
    }

    #[test]
    fn test_unknown_rate_uses_index_zero() {
        let track = AacTrack::lc(64_000, 7_350, 1).unwrap();
        assert_eq!(track.audio_specific_config().sampling_frequency_index, 0);
        assert_eq!(track.description().timescale, 7_350);
    }

    #[test]
    fn test_samples() {
        let track = AacTrack::lc(64_000, 22_050, 1).unwrap();
        let sample = track.process_sample(&[0x21, 0x10, 0x04]);
        assert_eq!(sample.duration, 1024);
        assert!(sample.is_sync);
        assert_eq!(sample.size(), 3);
        assert_eq!(track.description().language, "und");
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(AacTrack::lc(64_000, 0, 2).is_err());
        assert!(AacTrack::lc(64_000, 44_100, 0).is_err());
    }

    #[test]
    fn test_long_descriptor_length() {
        let d = descriptor(0x05, &[0u8; 200]);
        assert_eq!(&d[..5], &[0x05, 0x80, 0x80, 0x81, 0x48]);
        assert_eq!(d.len(), 205);
    }
}
