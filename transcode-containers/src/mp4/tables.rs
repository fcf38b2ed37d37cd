//! Incrementally built sample tables (`stts`, `ctts`, `stsc`, `stsz`,
//! `stco`/`co64`, `stss`).

use super::{make_full_box, write_u32_be, write_u64_be};
use transcode_core::MediaSample;

/// The sample tables of one track.
///
/// Samples are recorded when their chunk is sealed; chunk offsets when the
/// chunk is written. Run-length tables are kept compressed as they grow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleTables {
    /// (sample_count, sample_delta)
    stts: Vec<(u32, u32)>,
    /// (sample_count, composition offset)
    ctts: Vec<(u32, i32)>,
    /// (first_chunk, samples_per_chunk, sample_description_index)
    stsc: Vec<(u32, u32, u32)>,
    stsz: Vec<u32>,
    chunk_offsets: Vec<u64>,
    /// 1-based sync sample numbers.
    stss: Vec<u32>,
}

impl SampleTables {
    /// Create empty tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sealed chunk of `samples` as 1-based chunk `chunk_number`.
    pub fn add_chunk(&mut self, chunk_number: u32, samples: &[MediaSample]) {
        let count = samples.len() as u32;
        if self.stsc.last().map_or(true, |&(_, per_chunk, _)| per_chunk != count) {
            self.stsc.push((chunk_number, count, 1));
        }

        for sample in samples {
            self.add_sample(sample);
        }
    }

    fn add_sample(&mut self, sample: &MediaSample) {
        let number = self.stsz.len() as u32 + 1;
        self.stsz.push(sample.size() as u32);

        let delta = sample.duration as u32;
        match self.stts.last_mut() {
            Some((count, last)) if *last == delta => *count += 1,
            _ => self.stts.push((1, delta)),
        }

        let offset = sample.composition_offset as i32;
        match self.ctts.last_mut() {
            Some((count, last)) if *last == offset => *count += 1,
            _ => self.ctts.push((1, offset)),
        }

        if sample.is_sync {
            self.stss.push(number);
        }
    }

    /// Record the file offset of the next written chunk.
    pub fn add_chunk_offset(&mut self, offset: u64) {
        self.chunk_offsets.push(offset);
    }

    /// Number of samples recorded.
    pub fn sample_count(&self) -> usize {
        self.stsz.len()
    }

    /// Number of chunk offsets recorded.
    pub fn chunk_count(&self) -> usize {
        self.chunk_offsets.len()
    }

    /// Sum of all sample durations.
    pub fn total_duration(&self) -> u64 {
        self.stts
            .iter()
            .map(|&(count, delta)| count as u64 * delta as u64)
            .sum()
    }

    /// Run-length `stts` entries.
    pub fn stts_entries(&self) -> &[(u32, u32)] {
        &self.stts
    }

    /// Run-length `stsc` entries.
    pub fn stsc_entries(&self) -> &[(u32, u32, u32)] {
        &self.stsc
    }

    /// Sync sample numbers.
    pub fn sync_samples(&self) -> &[u32] {
        &self.stss
    }

    /// Sample sizes.
    pub fn sample_sizes(&self) -> &[u32] {
        &self.stsz
    }

    /// Chunk offsets.
    pub fn chunk_offsets(&self) -> &[u64] {
        &self.chunk_offsets
    }

    /// Expand `stts` back into one duration per sample.
    pub fn durations(&self) -> Vec<u32> {
        self.stts
            .iter()
            .flat_map(|&(count, delta)| std::iter::repeat(delta).take(count as usize))
            .collect()
    }

    /// Whether any sample carries a composition offset.
    pub fn has_composition_offsets(&self) -> bool {
        self.ctts.iter().any(|&(_, offset)| offset != 0)
    }

    /// Build `stts`.
    pub fn build_stts(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + self.stts.len() * 8);
        data.extend_from_slice(&write_u32_be(self.stts.len() as u32));
        for &(count, delta) in &self.stts {
            data.extend_from_slice(&write_u32_be(count));
            data.extend_from_slice(&write_u32_be(delta));
        }
        make_full_box(b"stts", 0, 0, &data)
    }

    /// Build `ctts` (version 1, signed offsets), or `None` when every offset is zero.
    pub fn build_ctts(&self) -> Option<Vec<u8>> {
        if !self.has_composition_offsets() {
            return None;
        }
        let mut data = Vec::with_capacity(4 + self.ctts.len() * 8);
        data.extend_from_slice(&write_u32_be(self.ctts.len() as u32));
        for &(count, offset) in &self.ctts {
            data.extend_from_slice(&write_u32_be(count));
            data.extend_from_slice(&offset.to_be_bytes());
        }
        Some(make_full_box(b"ctts", 1, 0, &data))
    }

    /// Build `stsc`.
    pub fn build_stsc(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + self.stsc.len() * 12);
        data.extend_from_slice(&write_u32_be(self.stsc.len() as u32));
        for &(first_chunk, samples, desc_idx) in &self.stsc {
            data.extend_from_slice(&write_u32_be(first_chunk));
            data.extend_from_slice(&write_u32_be(samples));
            data.extend_from_slice(&write_u32_be(desc_idx));
        }
        make_full_box(b"stsc", 0, 0, &data)
    }

    /// Build `stsz` with per-sample sizes.
    pub fn build_stsz(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(8 + self.stsz.len() * 4);
        data.extend_from_slice(&write_u32_be(0)); // sample size (variable)
        data.extend_from_slice(&write_u32_be(self.stsz.len() as u32));
        for &size in &self.stsz {
            data.extend_from_slice(&write_u32_be(size));
        }
        make_full_box(b"stsz", 0, 0, &data)
    }

    /// Build `stco`, or `co64` once any offset needs 64 bits.
    pub fn build_stco(&self) -> Vec<u8> {
        let use_64bit = self.chunk_offsets.iter().any(|&o| o > u32::MAX as u64);

        let mut data = Vec::new();
        data.extend_from_slice(&write_u32_be(self.chunk_offsets.len() as u32));
        for &offset in &self.chunk_offsets {
            if use_64bit {
                data.extend_from_slice(&write_u64_be(offset));
            } else {
                data.extend_from_slice(&write_u32_be(offset as u32));
            }
        }

        let box_type = if use_64bit { b"co64" } else { b"stco" };
        make_full_box(box_type, 0, 0, &data)
    }

    /// Build `stss`, or `None` when no sample is a sync sample.
    pub fn build_stss(&self) -> Option<Vec<u8>> {
        if self.stss.is_empty() {
            return None;
        }
        let mut data = Vec::with_capacity(4 + self.stss.len() * 4);
        data.extend_from_slice(&write_u32_be(self.stss.len() as u32));
        for &number in &self.stss {
            data.extend_from_slice(&write_u32_be(number));
        }
        Some(make_full_box(b"stss", 0, 0, &data))
    }
}
