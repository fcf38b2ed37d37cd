//! HEVC NAL unit header, profile/tier/level and SPS parsing.

use crate::error::{HevcError, NalError, Result};
use std::fmt;
use transcode_core::bitstream::{remove_emulation_prevention, BitReader};

/// HEVC NAL unit type (6-bit `nal_unit_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NalUnitType(pub u8);

impl NalUnitType {
    /// IDR with RADL pictures.
    pub const IDR_W_RADL: Self = Self(19);
    /// IDR without leading pictures.
    pub const IDR_N_LP: Self = Self(20);
    /// Video parameter set.
    pub const VPS: Self = Self(32);
    /// Sequence parameter set.
    pub const SPS: Self = Self(33);
    /// Picture parameter set.
    pub const PPS: Self = Self(34);
    /// Access unit delimiter.
    pub const AUD: Self = Self(35);
    /// End of sequence.
    pub const EOS: Self = Self(36);
    /// End of bitstream.
    pub const EOB: Self = Self(37);
    /// Filler data.
    pub const FD: Self = Self(38);
    /// Prefix SEI.
    pub const PREFIX_SEI: Self = Self(39);

    /// Coded slice segment (types 0..=31).
    pub fn is_vcl(&self) -> bool {
        self.0 <= 31
    }

    /// IDR picture.
    pub fn is_idr(&self) -> bool {
        *self == Self::IDR_W_RADL || *self == Self::IDR_N_LP
    }

    /// Non-VCL units that start a new access unit when they follow a slice.
    pub fn starts_access_unit(&self) -> bool {
        matches!(self.0, 32..=37 | 39 | 41..=44 | 48..=55)
    }

    /// Parameter sets, delimiters, end markers and filler never reach sample data.
    pub fn is_dropped_from_samples(&self) -> bool {
        matches!(self.0, 32..=38)
    }
}

impl fmt::Display for NalUnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            19 => write!(f, "IDR_W_RADL"),
            20 => write!(f, "IDR_N_LP"),
            21 => write!(f, "CRA_NUT"),
            32 => write!(f, "VPS_NUT"),
            33 => write!(f, "SPS_NUT"),
            34 => write!(f, "PPS_NUT"),
            35 => write!(f, "AUD_NUT"),
            39 => write!(f, "PREFIX_SEI_NUT"),
            40 => write!(f, "SUFFIX_SEI_NUT"),
            n => write!(f, "NAL_{}", n),
        }
    }
}

/// Two-byte HEVC NAL unit header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnitHeader {
    /// NAL unit type.
    pub nal_unit_type: NalUnitType,
    /// Layer ID.
    pub nuh_layer_id: u8,
    /// Temporal ID plus 1.
    pub nuh_temporal_id_plus1: u8,
}

impl NalUnitHeader {
    /// Parse the header of a NAL unit payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(NalError::Truncated {
                expected: 2,
                got: data.len(),
            }
            .into());
        }
        let header = u16::from_be_bytes([data[0], data[1]]);
        if header & 0x8000 != 0 {
            return Err(NalError::InvalidHeader.into());
        }
        Ok(Self {
            nal_unit_type: NalUnitType(((header & 0x7E00) >> 9) as u8),
            nuh_layer_id: ((header & 0x01F8) >> 3) as u8,
            nuh_temporal_id_plus1: (header & 0x7) as u8,
        })
    }
}

/// `first_slice_segment_in_pic_flag`: the first bit after the two header bytes.
pub fn first_slice_segment_in_pic(nal: &[u8]) -> bool {
    nal.get(2).is_some_and(|b| b & 0x80 != 0)
}

/// General profile, tier and level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProfileTierLevel {
    /// General profile space.
    pub general_profile_space: u8,
    /// General tier flag.
    pub general_tier_flag: bool,
    /// General profile IDC.
    pub general_profile_idc: u8,
    /// 32 profile compatibility flags, flag 0 in the most significant bit.
    pub general_profile_compatibility_flags: u32,
    /// 48 constraint indicator flags (progressive, interlaced, ... reserved).
    pub general_constraint_indicator_flags: u64,
    /// General level IDC.
    pub general_level_idc: u8,
}

impl ProfileTierLevel {
    /// Parse `profile_tier_level(1, max_num_sub_layers_minus1)`.
    pub fn parse(reader: &mut BitReader<'_>, max_num_sub_layers_minus1: u8) -> Result<Self> {
        let general_profile_space = reader.read_bits(2)? as u8;
        let general_tier_flag = reader.read_flag()?;
        let general_profile_idc = reader.read_bits(5)? as u8;
        let general_profile_compatibility_flags = reader.read_bits(32)?;
        let general_constraint_indicator_flags = reader.read_bits_u64(48)?;
        let general_level_idc = reader.read_bits(8)? as u8;

        let mut profile_present = [false; 8];
        let mut level_present = [false; 8];
        for i in 0..max_num_sub_layers_minus1 as usize {
            profile_present[i] = reader.read_flag()?;
            level_present[i] = reader.read_flag()?;
        }
        if max_num_sub_layers_minus1 > 0 {
            for _ in max_num_sub_layers_minus1..8 {
                reader.skip(2)?; // reserved_zero_2bits
            }
        }
        for i in 0..max_num_sub_layers_minus1 as usize {
            if profile_present[i] {
                reader.skip(88)?;
            }
            if level_present[i] {
                reader.skip(8)?;
            }
        }

        Ok(Self {
            general_profile_space,
            general_tier_flag,
            general_profile_idc,
            general_profile_compatibility_flags,
            general_constraint_indicator_flags,
            general_level_idc,
        })
    }
}

/// The SPS fields carried by `hvcC` and the visual sample entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sps {
    /// VPS ID.
    pub sps_video_parameter_set_id: u8,
    /// Maximum sub-layers minus 1.
    pub sps_max_sub_layers_minus1: u8,
    /// Temporal ID nesting flag.
    pub sps_temporal_id_nesting_flag: bool,
    /// Profile, tier, level info.
    pub profile_tier_level: ProfileTierLevel,
    /// SPS ID.
    pub sps_seq_parameter_set_id: u32,
    /// Chroma format IDC.
    pub chroma_format_idc: u8,
    /// Picture width in luma samples.
    pub pic_width_in_luma_samples: u32,
    /// Picture height in luma samples.
    pub pic_height_in_luma_samples: u32,
    /// Conformance window offsets (left, right, top, bottom), in chroma units.
    pub conformance_window: Option<[u32; 4]>,
    /// Bit depth luma minus 8.
    pub bit_depth_luma_minus8: u8,
    /// Bit depth chroma minus 8.
    pub bit_depth_chroma_minus8: u8,
}

impl Sps {
    /// Parse an SPS NAL unit (two-byte header included, emulation prevention still applied).
    pub fn parse_nal(nal: &[u8]) -> Result<Self> {
        let header = NalUnitHeader::parse(nal)?;
        if header.nal_unit_type != NalUnitType::SPS {
            return Err(NalError::UnexpectedType {
                expected: NalUnitType::SPS.0,
                got: header.nal_unit_type.0,
            }
            .into());
        }
        Self::parse(&remove_emulation_prevention(&nal[2..]))
    }

    /// Parse SPS from RBSP data.
    pub fn parse(rbsp: &[u8]) -> Result<Self> {
        let mut reader = BitReader::new(rbsp);

        let sps_video_parameter_set_id = reader.read_bits(4)? as u8;
        let sps_max_sub_layers_minus1 = reader.read_bits(3)? as u8;
        if sps_max_sub_layers_minus1 > 6 {
            return Err(HevcError::Sps(format!(
                "sps_max_sub_layers_minus1 {} out of range",
                sps_max_sub_layers_minus1
            )));
        }
        let sps_temporal_id_nesting_flag = reader.read_flag()?;
        let profile_tier_level = ProfileTierLevel::parse(&mut reader, sps_max_sub_layers_minus1)?;

        let sps_seq_parameter_set_id = reader.read_ue()?;
        let chroma_format_idc = reader.read_ue()?;
        if chroma_format_idc > 3 {
            return Err(HevcError::Sps(format!(
                "chroma_format_idc {} out of range",
                chroma_format_idc
            )));
        }
        if chroma_format_idc == 3 {
            reader.read_flag()?; // separate_colour_plane_flag
        }
        let pic_width_in_luma_samples = reader.read_ue()?;
        let pic_height_in_luma_samples = reader.read_ue()?;
        let conformance_window = if reader.read_flag()? {
            Some([
                reader.read_ue()?,
                reader.read_ue()?,
                reader.read_ue()?,
                reader.read_ue()?,
            ])
        } else {
            None
        };
        let bit_depth_luma_minus8 = reader.read_ue()? as u8;
        let bit_depth_chroma_minus8 = reader.read_ue()? as u8;

        Ok(Self {
            sps_video_parameter_set_id,
            sps_max_sub_layers_minus1,
            sps_temporal_id_nesting_flag,
            profile_tier_level,
            sps_seq_parameter_set_id,
            chroma_format_idc: chroma_format_idc as u8,
            pic_width_in_luma_samples,
            pic_height_in_luma_samples,
            conformance_window,
            bit_depth_luma_minus8,
            bit_depth_chroma_minus8,
        })
    }

    /// Display width after the conformance window.
    pub fn width(&self) -> u32 {
        let sub_width_c = if matches!(self.chroma_format_idc, 1 | 2) { 2 } else { 1 };
        match self.conformance_window {
            Some([left, right, _, _]) => self
                .pic_width_in_luma_samples
                .saturating_sub(sub_width_c * left.saturating_add(right)),
            None => self.pic_width_in_luma_samples,
        }
    }

    /// Display height after the conformance window.
    pub fn height(&self) -> u32 {
        let sub_height_c = if self.chroma_format_idc == 1 { 2 } else { 1 };
        match self.conformance_window {
            Some([_, _, top, bottom]) => self
                .pic_height_in_luma_samples
                .saturating_sub(sub_height_c * top.saturating_add(bottom)),
            None => self.pic_height_in_luma_samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transcode_core::bitstream::BitWriter;

    /// Main profile, level 5.1, 3840x2160 with a 4:2:0 conformance window.
    pub(crate) fn uhd_sps_rbsp() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(0, 4); // vps id
        w.write_bits(0, 3); // max_sub_layers_minus1
        w.write_bit(true); // temporal_id_nesting
        w.write_bits(0, 2); // profile space
        w.write_bit(false); // tier
        w.write_bits(1, 5); // profile idc
        w.write_bits(0x6000_0000, 32);
        w.write_bits(0x9000, 16); // progressive + frame-only, upper 16 of 48
        w.write_bits(0, 32);
        w.write_bits(153, 8); // level 5.1
        w.write_ue(0); // sps id
        w.write_ue(1); // chroma 4:2:0
        w.write_ue(3840);
        w.write_ue(2160);
        w.write_bit(false);
        w.write_ue(0);
        w.write_ue(0);
        w.write_rbsp_trailing_bits();
        w.into_data()
    }

    #[test]
    fn test_header_parse() {
        let header = NalUnitHeader::parse(&[0x40, 0x01]).unwrap();
        assert_eq!(header.nal_unit_type, NalUnitType::VPS);
        assert_eq!(header.nuh_temporal_id_plus1, 1);

        let header = NalUnitHeader::parse(&[0x26, 0x01, 0xAF]).unwrap();
        assert_eq!(header.nal_unit_type, NalUnitType::IDR_W_RADL);
        assert!(header.nal_unit_type.is_vcl());
        assert!(header.nal_unit_type.is_idr());

        assert!(NalUnitHeader::parse(&[0x26]).is_err());
        assert!(NalUnitHeader::parse(&[0xA6, 0x01]).is_err());
    }

    #[test]
    fn test_access_unit_classes() {
        for t in [32, 33, 34, 35, 36, 37, 39, 41, 44, 48, 55] {
            assert!(NalUnitType(t).starts_access_unit(), "type {}", t);
        }
        for t in [0, 1, 19, 38, 40, 45, 47, 56, 63] {
            assert!(!NalUnitType(t).starts_access_unit(), "type {}", t);
        }
        assert!(NalUnitType::FD.is_dropped_from_samples());
        assert!(!NalUnitType::PREFIX_SEI.is_dropped_from_samples());
    }

    #[test]
    fn test_first_slice_flag() {
        assert!(first_slice_segment_in_pic(&[0x02, 0x01, 0xD0]));
        assert!(!first_slice_segment_in_pic(&[0x02, 0x01, 0x50]));
        assert!(!first_slice_segment_in_pic(&[0x02, 0x01]));
    }

    #[test]
    fn test_sps_parse() {
        let sps = Sps::parse(&uhd_sps_rbsp()).unwrap();
        assert!(sps.sps_temporal_id_nesting_flag);
        assert_eq!(sps.profile_tier_level.general_profile_idc, 1);
        assert_eq!(sps.profile_tier_level.general_profile_compatibility_flags, 0x6000_0000);
        assert_eq!(
            sps.profile_tier_level.general_constraint_indicator_flags,
            0x9000_0000_0000
        );
        assert_eq!(sps.profile_tier_level.general_level_idc, 153);
        assert_eq!(sps.chroma_format_idc, 1);
        assert_eq!((sps.width(), sps.height()), (3840, 2160));
    }

    #[test]
    fn test_sps_parse_nal_rejects_pps() {
        let err = Sps::parse_nal(&[0x44, 0x01, 0xC1]).unwrap_err();
        assert!(matches!(
            err,
            HevcError::NalUnit(NalError::UnexpectedType { expected: 33, got: 34 })
        ));
    }
}
