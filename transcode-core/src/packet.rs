//! Buffer metadata exchanged between extractors, codecs and the muxer.

use bitflags::bitflags;

bitflags! {
    /// Flags attached to a media buffer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u32 {
        /// The buffer holds a sync sample (key frame).
        const SYNC_FRAME = 0x0001;
        /// The buffer holds codec-specific data rather than media.
        const CODEC_CONFIG = 0x0002;
        /// Last buffer of the stream.
        const END_OF_STREAM = 0x0004;
    }
}

/// Describes the payload of a codec or muxer buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferInfo {
    /// Offset of the payload within the buffer.
    pub offset: usize,
    /// Payload size in bytes. Zero for a bare end-of-stream marker.
    pub size: usize,
    /// Presentation time in microseconds.
    pub presentation_time_us: i64,
    /// Buffer flags.
    pub flags: BufferFlags,
}

impl BufferInfo {
    /// Create buffer info for a payload.
    pub fn new(offset: usize, size: usize, presentation_time_us: i64, flags: BufferFlags) -> Self {
        Self {
            offset,
            size,
            presentation_time_us,
            flags,
        }
    }

    /// Check if the sync-frame flag is set.
    pub fn is_sync(&self) -> bool {
        self.flags.contains(BufferFlags::SYNC_FRAME)
    }

    /// Check if the buffer carries codec-specific data.
    pub fn is_codec_config(&self) -> bool {
        self.flags.contains(BufferFlags::CODEC_CONFIG)
    }

    /// Check if the end-of-stream flag is set.
    pub fn is_end_of_stream(&self) -> bool {
        self.flags.contains(BufferFlags::END_OF_STREAM)
    }
}

/// A sample with owned payload, as accepted by the MP4 writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSample {
    /// Sample bytes, already in container format (length-prefixed NALs or raw AAC).
    pub data: Vec<u8>,
    /// Duration in track timescale units.
    pub duration: u64,
    /// Composition offset (presentation minus decode time) in track timescale units.
    pub composition_offset: i64,
    /// Whether decoding can start at this sample.
    pub is_sync: bool,
}

impl MediaSample {
    /// Create a sample with no composition offset.
    pub fn new(data: Vec<u8>, duration: u64, is_sync: bool) -> Self {
        Self {
            data,
            duration,
            composition_offset: 0,
            is_sync,
        }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}
