//! H.265 track: access-unit grouping and the `hvc1`/`hvcC` sample entry.

use super::access_unit::AccessUnitAssembler;
use super::avc::DEFAULT_FRAME_TICK;
use super::track::{visual_sample_entry, Handler, TrackDescription};
use super::{make_box, VIDEO_TIMESCALE};
use tracing::{debug, trace};
use transcode_core::bitstream::NalUnits;
use transcode_core::error::{CodecError, Result};
use transcode_core::MediaSample;
use transcode_hevc::{first_slice_segment_in_pic, NalUnitHeader, NalUnitType, Sps};

/// H.265 access-unit accumulator.
#[derive(Debug)]
pub struct HevcTrack {
    vps: Vec<Vec<u8>>,
    sps: Vec<Vec<u8>>,
    pps: Vec<Vec<u8>>,
    sps_info: Option<Sps>,
    assembler: AccessUnitAssembler,
    language: String,
}

impl HevcTrack {
    /// Create an unconfigured track.
    pub fn new() -> Self {
        Self {
            vps: Vec::new(),
            sps: Vec::new(),
            pps: Vec::new(),
            sps_info: None,
            assembler: AccessUnitAssembler::new(VIDEO_TIMESCALE, DEFAULT_FRAME_TICK),
            language: "eng".to_string(),
        }
    }

    /// Collect VPS, SPS and PPS from an Annex-B codec-specific-data buffer.
    ///
    /// Other NAL types in `csd` are ignored.
    pub fn configure(&mut self, csd: &[u8]) -> Result<()> {
        for nal in NalUnits::new(csd) {
            let header = NalUnitHeader::parse(nal)?;
            self.store_parameter_set(header.nal_unit_type, nal)?;
        }
        if self.sps_info.is_none() {
            return Err(CodecError::InvalidParameterSet("no SPS in HEVC codec config".into()).into());
        }
        Ok(())
    }

    fn store_parameter_set(&mut self, nal_type: NalUnitType, nal: &[u8]) -> Result<()> {
        match nal_type {
            NalUnitType::VPS => self.vps.push(nal.to_vec()),
            NalUnitType::SPS => {
                let info = Sps::parse_nal(nal)?;
                debug!(
                    profile = info.profile_tier_level.general_profile_idc,
                    level = info.profile_tier_level.general_level_idc,
                    width = info.width(),
                    height = info.height(),
                    "H.265 SPS"
                );
                self.sps_info = Some(info);
                self.sps.push(nal.to_vec());
            }
            NalUnitType::PPS => self.pps.push(nal.to_vec()),
            _ => {}
        }
        Ok(())
    }

    /// Set the `mdhd` language.
    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = language.into();
    }

    /// Parsed SPS, once configured.
    pub fn sps(&self) -> Option<&Sps> {
        self.sps_info.as_ref()
    }

    /// Feed one NAL unit payload. Returns a sample when an earlier access
    /// unit is complete.
    pub fn consume_nal(&mut self, nal: &[u8], pts_us: i64) -> Result<Option<MediaSample>> {
        let nal_type = NalUnitHeader::parse(nal)?.nal_unit_type;
        trace!(%nal_type, len = nal.len(), "HEVC NAL");

        let mut sample = None;
        if self.assembler.seen_vcl() {
            let boundary = if nal_type.is_vcl() {
                first_slice_segment_in_pic(nal)
            } else {
                nal_type.starts_access_unit()
            };
            if boundary {
                sample = self.assembler.end_access_unit();
            }
        }

        let missing = match nal_type {
            NalUnitType::VPS => self.vps.is_empty(),
            NalUnitType::SPS => self.sps.is_empty(),
            NalUnitType::PPS => self.pps.is_empty(),
            _ => false,
        };
        if missing {
            self.store_parameter_set(nal_type, nal)?;
        }

        if !nal_type.is_dropped_from_samples() {
            self.assembler.append(nal, pts_us);
        }
        if nal_type.is_vcl() {
            self.assembler.mark_vcl(nal_type.is_idr(), false);
        }

        Ok(sample)
    }

    /// Terminate the last access unit and release the remaining samples.
    pub fn finish(&mut self) -> Vec<MediaSample> {
        self.assembler.finish()
    }

    /// Build the `hvcC` decoder configuration record.
    pub fn hvcc(&self) -> Result<Vec<u8>> {
        let sps = self.sps_info.as_ref().ok_or(CodecError::NotConfigured)?;
        let ptl = &sps.profile_tier_level;

        let mut data = Vec::new();
        data.push(1); // configurationVersion
        data.push(
            (ptl.general_profile_space << 6)
                | (u8::from(ptl.general_tier_flag) << 5)
                | (ptl.general_profile_idc & 0x1F),
        );
        data.extend_from_slice(&ptl.general_profile_compatibility_flags.to_be_bytes());
        data.extend_from_slice(&ptl.general_constraint_indicator_flags.to_be_bytes()[2..]);
        data.push(ptl.general_level_idc);
        data.extend_from_slice(&0xF000u16.to_be_bytes()); // min_spatial_segmentation_idc
        data.push(0xFC); // parallelismType
        data.push(0xFC | (sps.chroma_format_idc & 0x03));
        data.push(0xF8 | (sps.bit_depth_luma_minus8 & 0x07));
        data.push(0xF8 | (sps.bit_depth_chroma_minus8 & 0x07));
        data.extend_from_slice(&0u16.to_be_bytes()); // avgFrameRate
        // constantFrameRate 0, numTemporalLayers 0, lengthSizeMinusOne 3
        data.push((u8::from(sps.sps_temporal_id_nesting_flag) << 2) | 0x03);

        let arrays = [
            (NalUnitType::SPS, &self.sps),
            (NalUnitType::VPS, &self.vps),
            (NalUnitType::PPS, &self.pps),
        ];
        data.push(arrays.iter().filter(|(_, nals)| !nals.is_empty()).count() as u8);
        for (nal_type, nals) in arrays.iter().filter(|(_, nals)| !nals.is_empty()) {
            data.push(nal_type.0 & 0x3F); // array_completeness 0
            data.extend_from_slice(&(nals.len() as u16).to_be_bytes());
            for nal in nals.iter() {
                data.extend_from_slice(&(nal.len() as u16).to_be_bytes());
                data.extend_from_slice(nal);
            }
        }
        Ok(data)
    }

    /// Describe the track for the writer.
    pub fn description(&self) -> Result<TrackDescription> {
        let sps = self.sps_info.as_ref().ok_or(CodecError::NotConfigured)?;
        let hvcc = make_box(b"hvcC", &self.hvcc()?);
        let (width, height) = (sps.width(), sps.height());
        Ok(TrackDescription {
            handler: Handler::Video,
            timescale: VIDEO_TIMESCALE,
            language: self.language.clone(),
            sample_entry: visual_sample_entry(b"hvc1", width, height, "HEVC Coding", &hvcc),
            width,
            height,
            rotation: 0,
            track_id: None,
        })
    }
}

impl Default for HevcTrack {
    fn default() -> Self {
        Self::new()
    }
}
