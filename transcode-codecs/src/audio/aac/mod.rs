//! AAC stream configuration: sampling frequency index and AudioSpecificConfig.

mod config;

pub use config::{sampling_frequency_index, AudioSpecificConfig, SAMPLING_FREQUENCIES};

/// AAC profile (audio object type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AacProfile {
    /// Main profile.
    Main,
    /// Low Complexity profile.
    #[default]
    Lc,
    /// Scalable Sampling Rate profile.
    Ssr,
    /// Long Term Prediction profile.
    Ltp,
    /// High Efficiency AAC (SBR).
    HeAac,
    /// High Efficiency AAC v2 (SBR + PS).
    HeAacV2,
}

impl AacProfile {
    /// Get profile from object type.
    pub fn from_object_type(object_type: u32) -> Option<Self> {
        match object_type {
            1 => Some(AacProfile::Main),
            2 => Some(AacProfile::Lc),
            3 => Some(AacProfile::Ssr),
            4 => Some(AacProfile::Ltp),
            5 => Some(AacProfile::HeAac),
            29 => Some(AacProfile::HeAacV2),
            _ => None,
        }
    }

    /// Get object type from profile.
    pub fn object_type(&self) -> u8 {
        match self {
            AacProfile::Main => 1,
            AacProfile::Lc => 2,
            AacProfile::Ssr => 3,
            AacProfile::Ltp => 4,
            AacProfile::HeAac => 5,
            AacProfile::HeAacV2 => 29,
        }
    }
}

/// Samples per AAC access unit.
pub const SAMPLES_PER_FRAME: u32 = 1024;
