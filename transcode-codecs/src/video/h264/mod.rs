//! H.264/AVC NAL unit classification and SPS parsing.
//!
//! Only the syntax the MP4 packager needs is parsed: NAL headers, the slice
//! header's `first_mb_in_slice` test, and the SPS fields that feed `avcC`.

mod nal;
mod sps;

pub use nal::{first_mb_in_slice_is_zero, NalHeader, NalUnitType};
pub use sps::SequenceParameterSet;

/// H.264 profile definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum H264Profile {
    /// Baseline profile.
    Baseline = 66,
    /// Main profile.
    Main = 77,
    /// Extended profile.
    Extended = 88,
    /// High profile.
    High = 100,
    /// High 10 profile (10-bit).
    High10 = 110,
    /// High 4:2:2 profile.
    High422 = 122,
    /// High 4:4:4 Predictive profile.
    High444 = 244,
}

impl H264Profile {
    /// Create from profile_idc value.
    pub fn from_idc(idc: u8) -> Option<Self> {
        match idc {
            66 => Some(Self::Baseline),
            77 => Some(Self::Main),
            88 => Some(Self::Extended),
            100 => Some(Self::High),
            110 => Some(Self::High10),
            122 => Some(Self::High422),
            244 => Some(Self::High444),
            _ => None,
        }
    }

    /// Profiles whose SPS carries the chroma format and bit depth fields.
    pub fn has_chroma_info(idc: u8) -> bool {
        matches!(
            idc,
            100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
        )
    }
}
