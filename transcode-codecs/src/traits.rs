//! Polled codec interface.
//!
//! Codecs are driven by the pipeline through a buffer-exchange protocol:
//! the caller dequeues an input slot, fills it, queues it back, then polls
//! for output with a bounded timeout. All calls happen on the pipeline's
//! worker thread.
//!
//! ```ignore
//! if let Some(index) = decoder.dequeue_input_buffer(TIMEOUT)? {
//!     let size = extractor.read_sample_data(decoder.input_buffer(index)?)?;
//!     decoder.queue_input_buffer(index, BufferInfo::new(0, size, pts, flags))?;
//! }
//! match decoder.dequeue_output_buffer(TIMEOUT)? {
//!     OutputEvent::Buffer { index, info } => decoder.release_output_buffer(index, true)?,
//!     OutputEvent::FormatChanged | OutputEvent::TryAgainLater => {}
//! }
//! ```

use std::time::Duration;
use transcode_core::{BufferInfo, MediaFormat, Result};

/// Information about a codec instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecInfo {
    /// Codec name as reported by the media stack.
    pub name: String,
    /// MIME type handled by the codec.
    pub mime: String,
    /// Whether this instance encodes.
    pub is_encoder: bool,
}

/// Result of polling a codec for output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEvent {
    /// Nothing available within the timeout.
    TryAgainLater,
    /// The output format is now known (or changed); see [`MediaCodec::output_format`].
    FormatChanged,
    /// An output buffer is ready.
    Buffer {
        /// Slot index to pass to [`MediaCodec::output_buffer`] and
        /// [`MediaCodec::release_output_buffer`].
        index: usize,
        /// Payload description.
        info: BufferInfo,
    },
}

/// A hardware or software codec driven by polling.
pub trait MediaCodec {
    /// Get codec information.
    fn codec_info(&self) -> CodecInfo;

    /// Claim a free input slot, waiting up to `timeout`.
    fn dequeue_input_buffer(&mut self, timeout: Duration) -> Result<Option<usize>>;

    /// Access the storage behind an input slot. The caller overwrites it.
    fn input_buffer(&mut self, index: usize) -> Result<&mut Vec<u8>>;

    /// Hand a filled input slot back to the codec.
    fn queue_input_buffer(&mut self, index: usize, info: BufferInfo) -> Result<()>;

    /// Poll for output, waiting up to `timeout`.
    fn dequeue_output_buffer(&mut self, timeout: Duration) -> Result<OutputEvent>;

    /// Read the payload of an output slot.
    fn output_buffer(&self, index: usize) -> Result<&[u8]>;

    /// Return an output slot. Decoders bound to a surface render the frame when `render` is set.
    fn release_output_buffer(&mut self, index: usize, render: bool) -> Result<()>;

    /// Format reported by the last [`OutputEvent::FormatChanged`].
    fn output_format(&self) -> Option<MediaFormat>;

    /// Signal end of stream to an encoder fed from a surface.
    fn signal_end_of_input_stream(&mut self) -> Result<()>;

    /// Stop processing; buffers are invalidated.
    fn stop(&mut self) -> Result<()>;

    /// Free the codec.
    fn release(&mut self) -> Result<()>;
}
