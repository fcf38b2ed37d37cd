//! NAL unit header parsing.

use transcode_core::error::{CodecError, Result};

/// NAL unit type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    /// Non-IDR slice.
    Slice,
    /// Slice data partition A, B or C.
    SliceData(u8),
    /// IDR slice.
    IdrSlice,
    /// Supplemental enhancement information (SEI).
    Sei,
    /// Sequence parameter set (SPS).
    Sps,
    /// Picture parameter set (PPS).
    Pps,
    /// Access unit delimiter.
    Aud,
    /// End of sequence.
    EndOfSequence,
    /// End of stream.
    EndOfStream,
    /// Filler data.
    Filler,
    /// SPS extension.
    SpsExt,
    /// Prefix NAL unit, subset SPS, depth parameter set, or reserved 17/18.
    Extension(u8),
    /// Auxiliary slice or slice extension (19..=21).
    SliceExt(u8),
    /// Unspecified or reserved.
    Other(u8),
}

impl NalUnitType {
    /// Create from raw NAL unit type value.
    pub fn from_u8(value: u8) -> Self {
        match value & 0x1F {
            1 => Self::Slice,
            n @ 2..=4 => Self::SliceData(n),
            5 => Self::IdrSlice,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::Filler,
            13 => Self::SpsExt,
            n @ 14..=18 => Self::Extension(n),
            n @ 19..=21 => Self::SliceExt(n),
            n => Self::Other(n),
        }
    }

    /// Coded slice of a primary picture (types 1..=5).
    pub fn is_vcl(&self) -> bool {
        matches!(self, Self::Slice | Self::SliceData(_) | Self::IdrSlice)
    }

    /// Non-VCL units that terminate an open access unit when they follow a slice.
    pub fn ends_access_unit(&self) -> bool {
        matches!(
            self,
            Self::Sei
                | Self::Sps
                | Self::Pps
                | Self::Aud
                | Self::EndOfSequence
                | Self::EndOfStream
                | Self::Extension(_)
        )
    }

    /// Units kept out of sample data: parameter sets, delimiters, filler and end markers.
    pub fn is_dropped_from_samples(&self) -> bool {
        matches!(
            self,
            Self::Sps | Self::Pps | Self::Aud | Self::Filler | Self::EndOfSequence | Self::EndOfStream
        )
    }
}

/// Parsed one-byte NAL unit header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader {
    /// NAL reference IDC (0-3).
    pub nal_ref_idc: u8,
    /// NAL unit type.
    pub nal_type: NalUnitType,
}

impl NalHeader {
    /// Parse the header byte of a NAL unit payload.
    pub fn parse(nal: &[u8]) -> Result<Self> {
        let header = *nal
            .first()
            .ok_or_else(|| CodecError::InvalidNalUnit("Empty NAL unit".into()))?;
        if header & 0x80 != 0 {
            return Err(CodecError::InvalidNalUnit("Forbidden zero bit is set".into()).into());
        }
        Ok(Self {
            nal_ref_idc: (header >> 5) & 3,
            nal_type: NalUnitType::from_u8(header),
        })
    }
}

/// True if a slice NAL starts a new picture.
///
/// `first_mb_in_slice` is the first ue(v) of the slice header; it is zero
/// exactly when the first payload bit is set.
pub fn first_mb_in_slice_is_zero(nal: &[u8]) -> bool {
    nal.get(1).is_some_and(|b| b & 0x80 != 0)
}
