//! Access-unit assembly shared by the AVC and HEVC tracks.
//!
//! NAL units are appended length-prefixed. A finished access unit is held
//! back until the next one starts, because its duration is the distance to
//! the next unit's presentation time.

use transcode_core::MediaSample;

const MICROS_PER_SECOND: i64 = 1_000_000;

#[derive(Debug)]
struct HeldSample {
    data: Vec<u8>,
    is_sync: bool,
    pts_us: i64,
}

#[derive(Debug)]
pub(crate) struct AccessUnitAssembler {
    timescale: u32,
    frame_tick: u64,
    data: Vec<u8>,
    pts_us: Option<i64>,
    seen_vcl: bool,
    is_sync: bool,
    held: Option<HeldSample>,
    last_duration: Option<u64>,
    emitted: u64,
}

impl AccessUnitAssembler {
    pub(crate) fn new(timescale: u32, frame_tick: u64) -> Self {
        Self {
            timescale,
            frame_tick,
            data: Vec::new(),
            pts_us: None,
            seen_vcl: false,
            is_sync: false,
            held: None,
            last_duration: None,
            emitted: 0,
        }
    }

    /// Whether the access unit under construction holds a slice.
    pub(crate) fn seen_vcl(&self) -> bool {
        self.seen_vcl
    }

    /// Append one NAL unit payload as a 4-byte length plus bytes.
    pub(crate) fn append(&mut self, nal: &[u8], pts_us: i64) {
        self.pts_us.get_or_insert(pts_us);
        self.data.extend_from_slice(&(nal.len() as u32).to_be_bytes());
        self.data.extend_from_slice(nal);
    }

    /// Note that the unit contains a slice. `is_sync` replaces the unit's
    /// sync state when `sticky` is false and is or-ed into it otherwise.
    pub(crate) fn mark_vcl(&mut self, is_sync: bool, sticky: bool) {
        self.is_sync = if sticky { self.is_sync || is_sync } else { is_sync };
        self.seen_vcl = true;
    }

    /// Close the unit under construction. Returns the previously held unit,
    /// now that its duration is known.
    pub(crate) fn end_access_unit(&mut self) -> Option<MediaSample> {
        let data = std::mem::take(&mut self.data);
        let pts_us = self.pts_us.take();
        let is_sync = std::mem::replace(&mut self.is_sync, false);
        self.seen_vcl = false;

        let pts_us = match pts_us {
            Some(pts) if !data.is_empty() => pts,
            _ => return None,
        };

        let next = HeldSample {
            data,
            is_sync,
            pts_us,
        };
        let previous = self.held.replace(next)?;
        let duration = self
            .ticks(pts_us)
            .saturating_sub(self.ticks(previous.pts_us));
        Some(self.emit(previous, duration))
    }

    /// Close the last unit and release everything still held.
    ///
    /// The final sample repeats its predecessor's duration, or the nominal
    /// frame tick when it is the only sample.
    pub(crate) fn finish(&mut self) -> Vec<MediaSample> {
        let mut samples: Vec<MediaSample> = self.end_access_unit().into_iter().collect();
        if let Some(last) = self.held.take() {
            let duration = self.last_duration.unwrap_or(self.frame_tick);
            samples.push(self.emit(last, duration));
        }
        samples
    }

    /// Number of samples released so far.
    pub(crate) fn emitted(&self) -> u64 {
        self.emitted
    }

    fn emit(&mut self, held: HeldSample, duration: u64) -> MediaSample {
        self.last_duration = Some(duration);
        self.emitted += 1;
        MediaSample::new(held.data, duration, held.is_sync)
    }

    /// Presentation time in track ticks, rounded to the nearest tick so that
    /// consecutive durations sum to the exact span.
    fn ticks(&self, pts_us: i64) -> u64 {
        let pts = pts_us.max(0) as i128;
        let ts = self.timescale as i128;
        ((pts * ts + (MICROS_PER_SECOND as i128) / 2) / MICROS_PER_SECOND as i128) as u64
    }
}
