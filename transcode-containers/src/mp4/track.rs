//! Static description of a track: everything `moov` needs besides the
//! sample tables.

use super::{make_box, write_u32_be};
use serde::Serialize;

/// Media handler of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Handler {
    /// Video (`vide`).
    Video,
    /// Audio (`soun`).
    Sound,
}

impl Handler {
    /// Handler type written in `hdlr`.
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            Handler::Video => *b"vide",
            Handler::Sound => *b"soun",
        }
    }

    /// Handler name written in `hdlr`.
    pub fn name(&self) -> &'static str {
        match self {
            Handler::Video => "VideoHandler",
            Handler::Sound => "SoundHandler",
        }
    }
}

/// Per-track metadata fixed before the first sample is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDescription {
    /// Media handler.
    pub handler: Handler,
    /// Ticks per second of sample durations.
    pub timescale: u32,
    /// ISO-639-2 language code.
    pub language: String,
    /// The complete sample entry box (`avc1`, `hvc1`, `mp4a`) for `stsd`.
    pub sample_entry: Vec<u8>,
    /// Display width, video only.
    pub width: u32,
    /// Display height, video only.
    pub height: u32,
    /// Clockwise rotation applied through the `tkhd` matrix.
    pub rotation: i32,
    /// Explicit track id; assigned by the writer when `None`.
    pub track_id: Option<u32>,
}

impl TrackDescription {
    /// Check if this is a video track.
    pub fn is_video(&self) -> bool {
        self.handler == Handler::Video
    }

    /// Fourcc of the sample entry.
    pub fn sample_entry_type(&self) -> Option<[u8; 4]> {
        self.sample_entry
            .get(4..8)
            .map(|t| [t[0], t[1], t[2], t[3]])
    }
}

const FIXED_ONE: u32 = 0x0001_0000;
const FIXED_MINUS_ONE: u32 = 0xFFFF_0000;
const W_ONE: u32 = 0x4000_0000;

/// `tkhd`/`mvhd` transformation matrix for a clockwise rotation.
///
/// Angles other than 90, 180 and 270 give the identity.
pub fn rotation_matrix(degrees: i32) -> [u32; 9] {
    match degrees.rem_euclid(360) {
        90 => [0, FIXED_ONE, 0, FIXED_MINUS_ONE, 0, 0, 0, 0, W_ONE],
        180 => [FIXED_MINUS_ONE, 0, 0, 0, FIXED_MINUS_ONE, 0, 0, 0, W_ONE],
        270 => [0, FIXED_MINUS_ONE, 0, FIXED_ONE, 0, 0, 0, 0, W_ONE],
        _ => [FIXED_ONE, 0, 0, 0, FIXED_ONE, 0, 0, 0, W_ONE],
    }
}

/// Pack a three-letter ISO-639-2 code into the 15-bit `mdhd` form.
///
/// Codes that are not three lowercase letters pack as `und`.
pub fn pack_language(code: &str) -> u16 {
    let bytes = code.as_bytes();
    if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_lowercase) {
        return pack_language("und");
    }
    bytes
        .iter()
        .fold(0u16, |acc, &c| (acc << 5) | (c - 0x60) as u16)
}

/// Inverse of [`pack_language`].
pub fn unpack_language(packed: u16) -> String {
    [10u16, 5, 0]
        .iter()
        .map(|shift| (((packed >> shift) & 0x1F) as u8 + 0x60) as char)
        .collect()
}

/// Build a `VisualSampleEntry` box around a decoder configuration box.
pub(crate) fn visual_sample_entry(
    fourcc: &[u8; 4],
    width: u32,
    height: u32,
    compressor: &str,
    config: &[u8],
) -> Vec<u8> {
    let mut data = Vec::with_capacity(78 + config.len());
    data.extend_from_slice(&[0u8; 6]); // reserved
    data.extend_from_slice(&[0, 1]); // data reference index
    data.extend_from_slice(&[0u8; 16]); // pre-defined and reserved
    data.extend_from_slice(&(width as u16).to_be_bytes());
    data.extend_from_slice(&(height as u16).to_be_bytes());
    data.extend_from_slice(&write_u32_be(0x0048_0000)); // 72 dpi
    data.extend_from_slice(&write_u32_be(0x0048_0000));
    data.extend_from_slice(&[0u8; 4]); // reserved
    data.extend_from_slice(&[0, 1]); // frame count

    let mut name = [0u8; 32];
    let len = compressor.len().min(31);
    name[0] = len as u8;
    name[1..=len].copy_from_slice(&compressor.as_bytes()[..len]);
    data.extend_from_slice(&name);

    data.extend_from_slice(&[0, 0x18]); // depth
    data.extend_from_slice(&[0xFF, 0xFF]); // pre-defined
    data.extend_from_slice(config);

    make_box(fourcc, &data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_packing() {
        assert_eq!(pack_language("und"), 0x55C4);
        assert_eq!(unpack_language(pack_language("eng")), "eng");
        assert_eq!(pack_language("EN"), 0x55C4);
    }

    #[test]
    fn test_rotation_matrix() {
        assert_eq!(rotation_matrix(0), rotation_matrix(360));
        assert_eq!(rotation_matrix(-90), rotation_matrix(270));
        assert_eq!(rotation_matrix(45), rotation_matrix(0));
        assert_eq!(rotation_matrix(90)[1], FIXED_ONE);
        assert_eq!(rotation_matrix(90)[3], FIXED_MINUS_ONE);
    }

    #[test]
    fn test_visual_sample_entry_layout() {
        let entry = visual_sample_entry(b"hvc1", 1920, 1080, "HEVC Coding", &[]);
        assert_eq!(entry.len(), 86);
        assert_eq!(&entry[4..8], b"hvc1");
        assert_eq!(u16::from_be_bytes([entry[14], entry[15]]), 1);
        assert_eq!(u16::from_be_bytes([entry[32], entry[33]]), 1920);
        assert_eq!(u16::from_be_bytes([entry[34], entry[35]]), 1080);
        assert_eq!(entry[50], 11);
        assert_eq!(&entry[51..62], b"HEVC Coding");
        assert_eq!(&entry[82..84], &[0, 0x18]);
    }
}
