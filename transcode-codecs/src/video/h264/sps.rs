//! Sequence Parameter Set (SPS) parsing.

use super::H264Profile;
use transcode_core::bitstream::{remove_emulation_prevention, BitReader};
use tracing::trace;
use transcode_core::error::{CodecError, Result};

/// The SPS fields needed to describe a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceParameterSet {
    /// Profile IDC.
    pub profile_idc: u8,
    /// Constraint set flags byte (profile compatibility in `avcC`).
    pub constraint_set_flags: u8,
    /// Level IDC.
    pub level_idc: u8,
    /// SPS ID (0-31).
    pub sps_id: u8,
    /// Chroma format IDC (0=mono, 1=4:2:0, 2=4:2:2, 3=4:4:4).
    pub chroma_format_idc: u8,
    /// Luma bit depth.
    pub bit_depth_luma: u8,
    /// Chroma bit depth.
    pub bit_depth_chroma: u8,
    /// Picture order count type (0-2).
    pub pic_order_cnt_type: u8,
    /// Picture width in macroblocks minus 1.
    pub pic_width_in_mbs_minus1: u32,
    /// Picture height in map units minus 1.
    pub pic_height_in_map_units_minus1: u32,
    /// Frame MBS only flag.
    pub frame_mbs_only_flag: bool,
    /// Frame cropping offsets (left, right, top, bottom), in crop units.
    pub frame_crop: Option<[u32; 4]>,
}

impl SequenceParameterSet {
    /// Parse an SPS NAL unit, header byte included, emulation prevention still applied.
    pub fn parse_nal(nal: &[u8]) -> Result<Self> {
        if nal.len() < 2 || nal[0] & 0x1F != 7 {
            return Err(CodecError::InvalidParameterSet("not an SPS NAL unit".into()).into());
        }
        let sps = Self::parse(&remove_emulation_prevention(&nal[1..]))?;
        trace!(
            profile_idc = sps.profile_idc,
            level_idc = sps.level_idc,
            width = sps.width(),
            height = sps.height(),
            "parsed SPS"
        );
        Ok(sps)
    }

    /// Parse an SPS from RBSP data.
    pub fn parse(rbsp: &[u8]) -> Result<Self> {
        let mut reader = BitReader::new(rbsp);
        let profile_idc = reader.read_bits(8)? as u8;
        let constraint_set_flags = reader.read_bits(8)? as u8;
        let level_idc = reader.read_bits(8)? as u8;
        let sps_id = reader.read_ue()?;
        if sps_id > 31 {
            return Err(CodecError::InvalidParameterSet(format!(
                "SPS ID {} out of range",
                sps_id
            ))
            .into());
        }

        let (chroma_format_idc, bit_depth_luma, bit_depth_chroma) =
            if H264Profile::has_chroma_info(profile_idc) {
                let chroma_format_idc = reader.read_ue()? as u8;
                if chroma_format_idc == 3 {
                    reader.read_flag()?; // separate_colour_plane_flag
                }
                let luma = reader.read_ue()? as u8 + 8;
                let chroma = reader.read_ue()? as u8 + 8;
                reader.read_flag()?; // qpprime_y_zero_transform_bypass_flag
                if reader.read_flag()? {
                    let lists = if chroma_format_idc == 3 { 12 } else { 8 };
                    for i in 0..lists {
                        if reader.read_flag()? {
                            skip_scaling_list(&mut reader, if i < 6 { 16 } else { 64 })?;
                        }
                    }
                }
                (chroma_format_idc, luma, chroma)
            } else {
                (1, 8, 8)
            };

        reader.read_ue()?; // log2_max_frame_num_minus4
        let pic_order_cnt_type = reader.read_ue()? as u8;
        match pic_order_cnt_type {
            0 => {
                reader.read_ue()?; // log2_max_pic_order_cnt_lsb_minus4
            }
            1 => {
                reader.read_flag()?;
                reader.read_se()?;
                reader.read_se()?;
                let cycle = reader.read_ue()?;
                if cycle > 255 {
                    return Err(CodecError::InvalidParameterSet(
                        "num_ref_frames_in_pic_order_cnt_cycle too large".into(),
                    )
                    .into());
                }
                for _ in 0..cycle {
                    reader.read_se()?;
                }
            }
            _ => {}
        }

        reader.read_ue()?; // max_num_ref_frames
        reader.read_flag()?; // gaps_in_frame_num_value_allowed_flag
        let pic_width_in_mbs_minus1 = reader.read_ue()?;
        let pic_height_in_map_units_minus1 = reader.read_ue()?;
        let frame_mbs_only_flag = reader.read_flag()?;
        if !frame_mbs_only_flag {
            reader.read_flag()?; // mb_adaptive_frame_field_flag
        }
        reader.read_flag()?; // direct_8x8_inference_flag
        let frame_crop = if reader.read_flag()? {
            Some([
                reader.read_ue()?,
                reader.read_ue()?,
                reader.read_ue()?,
                reader.read_ue()?,
            ])
        } else {
            None
        };

        Ok(Self {
            profile_idc,
            constraint_set_flags,
            level_idc,
            sps_id: sps_id as u8,
            chroma_format_idc,
            bit_depth_luma,
            bit_depth_chroma,
            pic_order_cnt_type,
            pic_width_in_mbs_minus1,
            pic_height_in_map_units_minus1,
            frame_mbs_only_flag,
            frame_crop,
        })
    }

    /// Get the profile.
    pub fn profile(&self) -> Option<H264Profile> {
        H264Profile::from_idc(self.profile_idc)
    }

    /// Picture width in pixels after cropping.
    pub fn width(&self) -> u32 {
        let width = self
            .pic_width_in_mbs_minus1
            .saturating_add(1)
            .saturating_mul(16);
        match self.frame_crop {
            Some([left, right, _, _]) => {
                let unit: u32 = if self.chroma_format_idc == 0 { 1 } else { 2 };
                width.saturating_sub(unit.saturating_mul(left.saturating_add(right)))
            }
            None => width,
        }
    }

    /// Picture height in pixels after cropping.
    pub fn height(&self) -> u32 {
        let field_factor: u32 = if self.frame_mbs_only_flag { 1 } else { 2 };
        let height = self
            .pic_height_in_map_units_minus1
            .saturating_add(1)
            .saturating_mul(16 * field_factor);
        match self.frame_crop {
            Some([_, _, top, bottom]) => {
                let unit = (if self.chroma_format_idc == 0 { 1 } else { 2 }) * field_factor;
                height.saturating_sub(unit.saturating_mul(top.saturating_add(bottom)))
            }
            None => height,
        }
    }
}

fn skip_scaling_list(reader: &mut BitReader<'_>, size: usize) -> Result<()> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta = reader.read_se()?;
            next_scale = (last_scale + delta + 256) % 256;
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}
