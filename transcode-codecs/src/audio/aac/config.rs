use transcode_core::bitstream::{BitReader, BitWriter};
use transcode_core::error::{CodecError, Result};

/// Sampling frequencies in index order.
pub const SAMPLING_FREQUENCIES: [u32; 12] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000,
];

/// Map a sample rate to its `samplingFrequencyIndex`. Unknown rates map to 0.
pub fn sampling_frequency_index(sample_rate: u32) -> u8 {
    SAMPLING_FREQUENCIES
        .iter()
        .position(|&rate| rate == sample_rate)
        .unwrap_or(0) as u8
}

/// Two-byte AudioSpecificConfig for the object types the muxer writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    /// Audio object type (2 = AAC LC).
    pub object_type: u8,
    /// Sampling frequency index.
    pub sampling_frequency_index: u8,
    /// Channel configuration.
    pub channel_config: u8,
}

impl AudioSpecificConfig {
    /// Build a config from stream parameters.
    pub fn new(object_type: u8, sample_rate: u32, channel_count: u32) -> Self {
        Self {
            object_type,
            sampling_frequency_index: sampling_frequency_index(sample_rate),
            channel_config: channel_count.min(15) as u8,
        }
    }

    /// Parse the leading fields of an AudioSpecificConfig.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = BitReader::new(data);
        let object_type = reader.read_bits(5)? as u8;
        let sampling_frequency_index = reader.read_bits(4)? as u8;
        if sampling_frequency_index == 15 {
            return Err(CodecError::Config("explicit AAC sample rates are not supported".into()).into());
        }
        let channel_config = reader.read_bits(4)? as u8;
        Ok(Self {
            object_type,
            sampling_frequency_index,
            channel_config,
        })
    }

    /// Serialise: 5-bit object type, 4-bit frequency index, 4-bit channel config, 3 zero bits.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BitWriter::new();
        writer.write_bits(u32::from(self.object_type), 5);
        writer.write_bits(u32::from(self.sampling_frequency_index), 4);
        writer.write_bits(u32::from(self.channel_config), 4);
        writer.write_bits(0, 3);
        writer.into_data()
    }

    /// Sample rate for the stored index.
    pub fn sample_rate(&self) -> Option<u32> {
        SAMPLING_FREQUENCIES
            .get(self.sampling_frequency_index as usize)
            .copied()
    }
}
