//! H.264 track: groups NAL units into access units and describes the track
//! with an `avc1` sample entry.

use super::access_unit::AccessUnitAssembler;
use super::track::{visual_sample_entry, Handler, TrackDescription};
use super::{make_box, VIDEO_TIMESCALE};
use tracing::debug;
use transcode_codecs::video::h264::{first_mb_in_slice_is_zero, NalHeader, NalUnitType, SequenceParameterSet};
use transcode_core::error::{CodecError, Result};
use transcode_core::MediaSample;

/// Default duration of one frame at 30 fps in 90 kHz ticks.
pub const DEFAULT_FRAME_TICK: u64 = 3000;

/// H.264 access-unit accumulator.
#[derive(Debug)]
pub struct AvcTrack {
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
    sps_info: Option<SequenceParameterSet>,
    assembler: AccessUnitAssembler,
    language: String,
}

impl AvcTrack {
    /// Create an unconfigured track with the default frame tick.
    pub fn new() -> Self {
        Self::with_frame_tick(DEFAULT_FRAME_TICK)
    }

    /// Create a track whose lone or last sample defaults to `frame_tick`.
    pub fn with_frame_tick(frame_tick: u64) -> Self {
        Self {
            sps: None,
            pps: None,
            sps_info: None,
            assembler: AccessUnitAssembler::new(VIDEO_TIMESCALE, frame_tick),
            language: "eng".to_string(),
        }
    }

    /// Install the parameter sets (NAL payloads without start codes).
    pub fn configure(&mut self, sps: &[u8], pps: &[u8]) -> Result<()> {
        self.set_sps(sps)?;
        self.pps = Some(pps.to_vec());
        Ok(())
    }

    fn set_sps(&mut self, sps: &[u8]) -> Result<()> {
        let info = SequenceParameterSet::parse_nal(sps)?;
        debug!(
            profile = info.profile_idc,
            level = info.level_idc,
            width = info.width(),
            height = info.height(),
            "H.264 SPS"
        );
        self.sps_info = Some(info);
        self.sps = Some(sps.to_vec());
        Ok(())
    }

    /// Set the `mdhd` language.
    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = language.into();
    }

    /// Parsed SPS, once configured.
    pub fn sps(&self) -> Option<&SequenceParameterSet> {
        self.sps_info.as_ref()
    }

    /// Feed one NAL unit payload. Returns a sample when an earlier access
    /// unit is complete.
    ///
    /// In-band SPS/PPS replace the configured parameter sets.
    pub fn consume_nal(&mut self, nal: &[u8], pts_us: i64) -> Result<Option<MediaSample>> {
        let header = NalHeader::parse(nal)?;
        let nal_type = header.nal_type;

        let mut sample = None;
        if self.assembler.seen_vcl() {
            let boundary = if nal_type.is_vcl() {
                first_mb_in_slice_is_zero(nal)
            } else {
                nal_type.ends_access_unit()
            };
            if boundary {
                sample = self.assembler.end_access_unit();
            }
        }

        match nal_type {
            NalUnitType::Sps => self.set_sps(nal)?,
            NalUnitType::Pps => self.pps = Some(nal.to_vec()),
            _ => {}
        }

        if !nal_type.is_dropped_from_samples() {
            self.assembler.append(nal, pts_us);
        }
        if nal_type.is_vcl() {
            self.assembler.mark_vcl(nal_type == NalUnitType::IdrSlice, true);
        }

        Ok(sample)
    }

    /// Terminate the last access unit and release the remaining samples.
    pub fn finish(&mut self) -> Vec<MediaSample> {
        self.assembler.finish()
    }

    /// Build the `avcC` decoder configuration record.
    pub fn avcc(&self) -> Result<Vec<u8>> {
        let (sps, pps) = match (&self.sps, &self.pps) {
            (Some(sps), Some(pps)) => (sps, pps),
            _ => return Err(CodecError::NotConfigured.into()),
        };
        if sps.len() < 4 {
            return Err(CodecError::InvalidParameterSet("SPS shorter than 4 bytes".into()).into());
        }

        let mut data = Vec::with_capacity(11 + sps.len() + pps.len());
        data.push(1); // configurationVersion
        data.push(sps[1]); // AVCProfileIndication
        data.push(sps[2]); // profile_compatibility
        data.push(sps[3]); // AVCLevelIndication
        data.push(0xFC | 3); // lengthSizeMinusOne
        data.push(0xE0 | 1); // numOfSequenceParameterSets
        data.extend_from_slice(&(sps.len() as u16).to_be_bytes());
        data.extend_from_slice(sps);
        data.push(1); // numOfPictureParameterSets
        data.extend_from_slice(&(pps.len() as u16).to_be_bytes());
        data.extend_from_slice(pps);
        Ok(data)
    }

    /// Describe the track for the writer.
    pub fn description(&self) -> Result<TrackDescription> {
        let info = self.sps_info.as_ref().ok_or(CodecError::NotConfigured)?;
        let avcc = make_box(b"avcC", &self.avcc()?);
        let (width, height) = (info.width(), info.height());
        Ok(TrackDescription {
            handler: Handler::Video,
            timescale: VIDEO_TIMESCALE,
            language: self.language.clone(),
            sample_entry: visual_sample_entry(b"avc1", width, height, "AVC Coding", &avcc),
            width,
            height,
            rotation: 0,
            track_id: None,
        })
    }
}

impl Default for AvcTrack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use transcode_core::BitWriter;

    /// Baseline 1280x720 SPS: profile 66, level 31, poc type 2.
    fn sps_nal() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(66, 8);
        w.write_bits(0xC0, 8);
        w.write_bits(31, 8);
        w.write_ue(0); // sps id
        w.write_ue(0); // log2_max_frame_num_minus4
        w.write_ue(2); // pic_order_cnt_type
        w.write_ue(1); // max_num_ref_frames
        w.write_bit(false); // gaps
        w.write_ue(79); // width in mbs - 1
        w.write_ue(44); // height in map units - 1
        w.write_bit(true); // frame_mbs_only
        w.write_bit(true); // direct_8x8
        w.write_bit(false); // cropping
        w.write_bit(false); // vui
        w.write_rbsp_trailing_bits();
        let mut nal = vec![0x67];
        nal.extend_from_slice(w.data());
        nal
    }

    fn configured() -> AvcTrack {
        let mut track = AvcTrack::new();
        track.configure(&sps_nal(), &[0x68, 0xCE, 0x38, 0x80]).unwrap();
        track
    }

    #[test]
    fn test_description() {
        let track = configured();
        let desc = track.description().unwrap();
        assert_eq!(desc.handler, Handler::Video);
        assert_eq!((desc.width, desc.height), (1280, 720));
        assert_eq!(desc.language, "eng");
        assert_eq!(desc.sample_entry_type(), Some(*b"avc1"));
        assert_eq!(&desc.sample_entry[86 + 4..86 + 8], b"avcC");
    }

    #[test]
    fn test_avcc_layout() {
        let track = configured();
        let sps = sps_nal();
        let avcc = track.avcc().unwrap();
        assert_eq!(&avcc[..6], &[1, 66, 0xC0, 31, 0xFF, 0xE1]);
        assert_eq!(u16::from_be_bytes([avcc[6], avcc[7]]) as usize, sps.len());
        assert_eq!(&avcc[8..8 + sps.len()], sps.as_slice());
        assert_eq!(avcc[8 + sps.len()], 1);
        assert_eq!(&avcc[avcc.len() - 4..], &[0x68, 0xCE, 0x38, 0x80]);
    }

    #[test]
    fn test_unconfigured_track() {
        let track = AvcTrack::new();
        assert!(track.avcc().is_err());
        assert!(track.description().is_err());
    }

    #[test]
    fn test_access_unit_boundaries() {
        let mut track = configured();
        let idr = [0x65, 0x88, 0x84];
        let slice = [0x41, 0x9A, 0x02];
        let second_slice = [0x41, 0x40, 0x01];

        assert!(track.consume_nal(&[0x09, 0xF0], 0).unwrap().is_none());
        assert!(track.consume_nal(&idr, 0).unwrap().is_none());
        // A continuation slice of the same picture stays in the unit.
        assert!(track.consume_nal(&second_slice, 0).unwrap().is_none());
        // A new picture closes the IDR unit, which is held for its duration.
        assert!(track.consume_nal(&slice, 33_333).unwrap().is_none());
        // SEI after a slice opens the next unit and releases the IDR one.
        let first = track.consume_nal(&[0x06, 0x05, 0x01], 66_667).unwrap().unwrap();
        assert!(first.is_sync);
        assert_eq!(first.duration, 3000);
        // AUD dropped, two slices kept.
        assert_eq!(first.data.len(), 2 * 4 + idr.len() + second_slice.len());

        // No slice seen yet in the SEI unit, so this one joins it.
        assert!(track.consume_nal(&[0x41, 0x9A, 0x03], 66_667).unwrap().is_none());

        let samples = track.finish();
        assert_eq!(samples.len(), 2);
        assert!(!samples[0].is_sync);
        assert_eq!(samples[0].duration, 3000);
        assert_eq!(samples[0].data, [&[0, 0, 0, 3][..], &slice[..]].concat());
        assert_eq!(samples[1].data.len(), 2 * 4 + 3 + 3);
        assert_eq!(samples[1].duration, 3000);
    }

    #[test]
    fn test_in_band_parameter_sets_are_not_sample_data() {
        let mut track = AvcTrack::new();
        track.consume_nal(&sps_nal(), 0).unwrap();
        track.consume_nal(&[0x68, 0xCE, 0x38, 0x80], 0).unwrap();
        track.consume_nal(&[0x65, 0x88, 0x84], 0).unwrap();
        let samples = track.finish();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].data, vec![0, 0, 0, 3, 0x65, 0x88, 0x84]);
        assert!(track.description().is_ok());
    }
}
