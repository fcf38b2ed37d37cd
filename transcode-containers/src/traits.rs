//! Container traits for demuxing and muxing.
//!
//! Both are polled, single-threaded interfaces in the style of a platform
//! media stack: a demuxer is a cursor over interleaved samples of the
//! selected tracks, a muxer accepts encoder output buffers.

use transcode_core::error::Result;
use transcode_core::{BufferFlags, BufferInfo, MediaFormat};

/// Where a seek lands relative to the requested time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekMode {
    /// The sync sample at or before the target (default).
    #[default]
    PreviousSync,
    /// The sync sample at or after the target.
    NextSync,
    /// Whichever sync sample is closest.
    ClosestSync,
}

/// Demuxer over one source.
pub trait Demuxer {
    /// Number of tracks in the source.
    fn track_count(&self) -> usize;

    /// Format of track `index`.
    fn track_format(&self, index: usize) -> Result<MediaFormat>;

    /// Include track `index` in the samples returned by [`read_sample_data`](Self::read_sample_data).
    fn select_track(&mut self, index: usize) -> Result<()>;

    /// Move every selected track to a sync sample near `time_us`.
    fn seek_to(&mut self, time_us: i64, mode: SeekMode) -> Result<()>;

    /// Copy the current sample into `buf`, replacing its contents.
    ///
    /// Returns the sample size, or `None` once the selected tracks are exhausted.
    fn read_sample_data(&mut self, buf: &mut Vec<u8>) -> Result<Option<usize>>;

    /// Presentation time of the current sample, `None` when exhausted.
    fn sample_time(&self) -> Option<i64>;

    /// Flags of the current sample.
    fn sample_flags(&self) -> BufferFlags;

    /// Step to the next sample. Returns `false` when there is none.
    fn advance(&mut self) -> bool;

    /// Release the source.
    fn release(&mut self) -> Result<()>;
}

/// Find the first track whose MIME type starts with `prefix`.
pub fn find_track<D: Demuxer + ?Sized>(demuxer: &D, prefix: &str) -> Result<Option<(usize, MediaFormat)>> {
    for index in 0..demuxer.track_count() {
        let format = demuxer.track_format(index)?;
        if format.mime.starts_with(prefix) {
            return Ok(Some((index, format)));
        }
    }
    Ok(None)
}

/// Muxer accepting encoder output.
pub trait Muxer {
    /// Register a track. Returns its index for [`write_sample_data`](Self::write_sample_data).
    fn add_track(&mut self, format: &MediaFormat) -> Result<usize>;

    /// Clockwise rotation the player should apply to the video track.
    fn set_orientation_hint(&mut self, degrees: i32) -> Result<()>;

    /// Start muxing. Tracks can no longer be added.
    fn start(&mut self) -> Result<()>;

    /// Write one encoder output buffer. `data[info.offset..info.offset + info.size]`
    /// is the payload.
    fn write_sample_data(&mut self, track: usize, data: &[u8], info: &BufferInfo) -> Result<()>;

    /// Flush the remaining samples and finalize the output.
    fn stop(&mut self) -> Result<()>;

    /// Release the muxer and its sink.
    fn release(&mut self) -> Result<()>;
}
