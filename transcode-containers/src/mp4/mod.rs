//! MP4/ISOBMFF packaging.
//!
//! The write side is a single forward pass: [`Mp4Writer`] emits `ftyp`, then
//! interleaved `mdat` chunks, then `moov`. The codec-facing track
//! accumulators ([`AvcTrack`], [`HevcTrack`], [`AacTrack`]) turn encoder
//! output into [`MediaSample`](transcode_core::MediaSample)s plus a
//! [`TrackDescription`] for the sample table. [`fast_start`] relocates the
//! `moov` of a finished file, and [`Mp4Info`] reads enough of a file back to
//! inspect its tables.

mod aac;
mod access_unit;
mod atoms;
mod avc;
mod faststart;
mod hevc;
mod muxer;
mod reader;
mod tables;
mod track;
mod writer;

pub use aac::AacTrack;
pub use atoms::{scan_top_level, AtomHeader, FtypAtom, StblInfo};
pub use avc::AvcTrack;
pub use faststart::{fast_start, fast_start_bytes, fast_start_in_place, FastStartOutcome};
pub use hevc::HevcTrack;
pub use muxer::StreamingMuxer;
pub use reader::{Mp4Info, TopLevelAtom, TrackInfo};
pub use tables::SampleTables;
pub use track::{Handler, TrackDescription};
pub use writer::Mp4Writer;

use transcode_core::error::{BitstreamError, Result};

/// Default video timescale (ticks per second).
pub const VIDEO_TIMESCALE: u32 = 90_000;

/// Chunks are sealed once they hold this many seconds of media.
pub const CHUNK_SECONDS: u64 = 2;

/// Top-level atom types the fast-start packager accepts.
pub const TOP_LEVEL_TYPES: [[u8; 4]; 9] = [
    *b"free", *b"junk", *b"mdat", *b"moov", *b"pnot", *b"skip", *b"wide", *b"PICT", *b"ftyp",
];

/// MP4 brand types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mp4Brand {
    /// ISO Base Media File.
    Isom,
    /// MP4 version 2.
    Mp42,
    /// Unknown brand.
    Unknown([u8; 4]),
}

impl Mp4Brand {
    /// Parse brand from 4 bytes.
    pub fn from_bytes(bytes: &[u8; 4]) -> Self {
        match bytes {
            b"isom" => Mp4Brand::Isom,
            b"mp42" => Mp4Brand::Mp42,
            _ => Mp4Brand::Unknown(*bytes),
        }
    }

    /// Convert to bytes.
    pub fn to_bytes(&self) -> [u8; 4] {
        match self {
            Mp4Brand::Isom => *b"isom",
            Mp4Brand::Mp42 => *b"mp42",
            Mp4Brand::Unknown(b) => *b,
        }
    }
}

/// Sample entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEntryType {
    /// AVC/H.264.
    Avc1,
    /// HEVC/H.265.
    Hvc1,
    /// AAC.
    Mp4a,
    /// Unknown.
    Unknown([u8; 4]),
}

impl SampleEntryType {
    /// Parse from 4 bytes.
    pub fn from_bytes(bytes: &[u8; 4]) -> Self {
        match bytes {
            b"avc1" => SampleEntryType::Avc1,
            b"hvc1" => SampleEntryType::Hvc1,
            b"mp4a" => SampleEntryType::Mp4a,
            _ => SampleEntryType::Unknown(*bytes),
        }
    }

    /// Convert to bytes.
    pub fn to_bytes(&self) -> [u8; 4] {
        match self {
            SampleEntryType::Avc1 => *b"avc1",
            SampleEntryType::Hvc1 => *b"hvc1",
            SampleEntryType::Mp4a => *b"mp4a",
            SampleEntryType::Unknown(b) => *b,
        }
    }

    /// Check if this is a video type.
    pub fn is_video(&self) -> bool {
        matches!(self, SampleEntryType::Avc1 | SampleEntryType::Hvc1)
    }
}

/// Read a 32-bit big-endian integer.
fn read_u32_be(data: &[u8]) -> Result<u32> {
    if data.len() < 4 {
        return Err(BitstreamError::Other("Not enough data for u32".into()).into());
    }
    Ok(u32::from_be_bytes([data[0], data[1], data[2], data[3]]))
}

/// Read a 64-bit big-endian integer.
fn read_u64_be(data: &[u8]) -> Result<u64> {
    if data.len() < 8 {
        return Err(BitstreamError::Other("Not enough data for u64".into()).into());
    }
    Ok(u64::from_be_bytes([
        data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
    ]))
}

/// Write a 32-bit big-endian integer.
fn write_u32_be(value: u32) -> [u8; 4] {
    value.to_be_bytes()
}

/// Write a 64-bit big-endian integer.
fn write_u64_be(value: u64) -> [u8; 8] {
    value.to_be_bytes()
}

/// Wrap `payload` in a box of type `fourcc`.
fn make_box(fourcc: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(payload.len() + 8);
    result.extend_from_slice(&write_u32_be((payload.len() + 8) as u32));
    result.extend_from_slice(fourcc);
    result.extend_from_slice(payload);
    result
}

/// Wrap `payload` in a full box (version and 24-bit flags prepended).
fn make_full_box(fourcc: &[u8; 4], version: u8, flags: u32, payload: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(payload.len() + 4);
    data.push(version);
    data.extend_from_slice(&flags.to_be_bytes()[1..]);
    data.extend_from_slice(payload);
    make_box(fourcc, &data)
}
