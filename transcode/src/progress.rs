//! Shared progress and cancellation state.

use parking_lot::RwLock;
use std::sync::Arc;

/// Phase of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    /// Not started.
    #[default]
    Idle,
    /// Opening the source and creating codecs.
    Preparing,
    /// Running the main loop.
    Converting,
    /// Releasing resources and finalizing the output.
    Finishing,
    /// Relocating `moov` to the front of the output.
    FastStart,
    /// Finished, cancelled or failed.
    Done,
}

/// Snapshot of a conversion's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressState {
    /// Percent of the trim window muxed so far.
    pub percent: u8,
    /// Current phase.
    pub stage: Stage,
    /// Whether cancellation was requested.
    pub cancel_requested: bool,
}

/// Cloneable handle for observing and cancelling a running conversion from
/// another thread.
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle {
    state: Arc<RwLock<ProgressState>>,
}

impl ProgressHandle {
    /// Create a fresh handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the conversion to stop at its next loop iteration.
    pub fn cancel(&self) {
        self.state.write().cancel_requested = true;
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.state.read().cancel_requested
    }

    /// Last reported percent.
    pub fn percent(&self) -> u8 {
        self.state.read().percent
    }

    /// Current phase.
    pub fn stage(&self) -> Stage {
        self.state.read().stage
    }

    /// Copy of the whole state.
    pub fn snapshot(&self) -> ProgressState {
        *self.state.read()
    }

    pub(crate) fn set_percent(&self, percent: u8) {
        self.state.write().percent = percent;
    }

    pub(crate) fn set_stage(&self, stage: Stage) {
        self.state.write().stage = stage;
    }
}
