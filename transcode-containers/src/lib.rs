//! Container support for the converter.
//!
//! The [`Demuxer`] and [`Muxer`] traits are the seams between the conversion
//! pipeline and the media stack. The [`mp4`] module implements the muxing
//! side in full: a streaming MP4 writer, the muxer façade over it, and the
//! fast-start packager.

pub mod mp4;
pub mod traits;

pub use mp4::{fast_start, fast_start_bytes, fast_start_in_place, FastStartOutcome, Mp4Info, Mp4Writer, StreamingMuxer};
pub use traits::{find_track, Demuxer, Muxer, SeekMode};
