//! H.265/HEVC bitstream parsing for MP4 packaging.
//!
//! Provides NAL unit header classification (VCL vs non-VCL, access unit
//! boundaries, parameter sets) and a sequence parameter set parser that
//! extracts the profile/tier/level and picture fields carried by `hvcC`.

mod error;
mod nal;

pub use error::{HevcError, NalError, Result};
pub use nal::{first_slice_segment_in_pic, NalUnitHeader, NalUnitType, ProfileTierLevel, Sps};
