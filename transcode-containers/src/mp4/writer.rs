//! Streaming MP4 writer.
//!
//! Produces `ftyp`, then `mdat` chunks, then `moov`, strictly sequentially:
//! the sink is never seeked, so output can be consumed while it is written.
//! Samples are buffered per track into chunks of at least two seconds;
//! chunks from different tracks are written in order of their start time.

use std::collections::VecDeque;
use std::io::Write;

use super::atoms::FtypAtom;
use super::tables::SampleTables;
use super::track::{pack_language, rotation_matrix, Handler, TrackDescription};
use super::{make_box, make_full_box, write_u32_be, write_u64_be, CHUNK_SECONDS};
use tracing::{debug, info, trace};
use transcode_core::error::{Error, MuxingError, Result};
use transcode_core::rational::lcm;
use transcode_core::MediaSample;

/// A sealed run of samples from one track, written as one `mdat`.
#[derive(Debug)]
struct Chunk {
    samples: Vec<MediaSample>,
    duration: u64,
}

impl Chunk {
    fn payload_size(&self) -> u64 {
        self.samples.iter().map(|s| s.size() as u64).sum()
    }
}

#[derive(Debug)]
struct TrackState {
    desc: TrackDescription,
    track_id: u32,
    /// Start time of the next chunk to be sealed.
    next_chunk_create_start: u64,
    /// Start time of the next chunk to be written.
    next_chunk_write_start: u64,
    /// Start time of the next sample; the track duration once closed.
    next_sample_start: u64,
    samples: Vec<MediaSample>,
    queue: VecDeque<Chunk>,
    next_chunk_number: u32,
    tables: SampleTables,
}

impl TrackState {
    fn new(desc: TrackDescription, track_id: u32) -> Self {
        Self {
            desc,
            track_id,
            next_chunk_create_start: 0,
            next_chunk_write_start: 0,
            next_sample_start: 0,
            samples: Vec::new(),
            queue: VecDeque::new(),
            next_chunk_number: 1,
            tables: SampleTables::new(),
        }
    }

    fn timescale(&self) -> u64 {
        u64::from(self.desc.timescale)
    }

    fn is_chunk_ready(&self) -> bool {
        self.next_sample_start >= self.next_chunk_create_start + CHUNK_SECONDS * self.timescale()
    }

    /// Seal the buffered samples into a chunk and record them in the tables.
    fn seal_chunk(&mut self) -> Option<Chunk> {
        if self.samples.is_empty() {
            return None;
        }
        let samples = std::mem::take(&mut self.samples);
        self.tables.add_chunk(self.next_chunk_number, &samples);
        self.next_chunk_number += 1;

        let duration = self.next_sample_start - self.next_chunk_create_start;
        self.next_chunk_create_start += duration;
        trace!(
            track_id = self.track_id,
            samples = samples.len(),
            duration,
            "chunk sealed"
        );
        Some(Chunk { samples, duration })
    }
}

/// Single-pass MP4 writer over any byte sink.
pub struct Mp4Writer<W: Write> {
    sink: W,
    tracks: Vec<TrackState>,
    /// Track indices ordered by next chunk write time.
    order: Vec<usize>,
    bytes_written: u64,
}

impl<W: Write> Mp4Writer<W> {
    /// Create a writer for `tracks` and write `ftyp`.
    ///
    /// Explicit track ids must be unique; tracks without one get the next
    /// id after the largest in use.
    pub fn new(mut sink: W, tracks: Vec<TrackDescription>) -> Result<Self> {
        if tracks.is_empty() {
            return Err(Error::invalid_state("MP4 writer needs at least one track"));
        }

        let mut ids: Vec<u32> = Vec::with_capacity(tracks.len());
        for desc in &tracks {
            if desc.timescale == 0 {
                return Err(Error::invalid_param("track timescale must be positive"));
            }
            if let Some(id) = desc.track_id {
                if id == 0 || ids.contains(&id) {
                    return Err(MuxingError::DuplicateTrackId(id).into());
                }
                ids.push(id);
            }
        }

        let mut next_id = ids.iter().copied().max().unwrap_or(0);
        let tracks: Vec<TrackState> = tracks
            .into_iter()
            .map(|desc| {
                let id = desc.track_id.unwrap_or_else(|| {
                    next_id += 1;
                    next_id
                });
                TrackState::new(desc, id)
            })
            .collect();

        let ftyp = FtypAtom::mp42();
        ftyp.write(&mut sink)?;

        for track in &tracks {
            debug!(
                track_id = track.track_id,
                handler = ?track.desc.handler,
                timescale = track.desc.timescale,
                "track registered"
            );
        }

        Ok(Self {
            sink,
            order: (0..tracks.len()).collect(),
            tracks,
            bytes_written: ftyp.size(),
        })
    }

    /// Number of bytes written to the sink so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Number of tracks.
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// The id assigned to track `index`.
    pub fn track_id(&self, index: usize) -> Option<u32> {
        self.tracks.get(index).map(|t| t.track_id)
    }

    /// Sample tables recorded so far for track `index`.
    pub fn tables(&self, index: usize) -> Option<&SampleTables> {
        self.tracks.get(index).map(|t| &t.tables)
    }

    /// Append a sample to track `index`.
    ///
    /// When the track has buffered at least two seconds, those samples are
    /// sealed into a chunk first. Only the track that is currently earliest
    /// drives writing; chunks of the other tracks wait in their queues.
    pub fn accept_sample(&mut self, index: usize, sample: MediaSample) -> Result<()> {
        let track = self
            .tracks
            .get_mut(index)
            .ok_or(MuxingError::UnknownTrack(index))?;

        if track.is_chunk_ready() {
            if let Some(chunk) = track.seal_chunk() {
                track.queue.push_back(chunk);
            }
            if self.order[0] == index {
                self.drain_leading()?;
            } else {
                trace!(
                    track_id = self.tracks[index].track_id,
                    queued = self.tracks[index].queue.len(),
                    "track delayed"
                );
            }
        }

        let track = &mut self.tracks[index];
        track.next_sample_start += sample.duration;
        track.samples.push(sample);
        Ok(())
    }

    /// Write chunks while the earliest track has one queued.
    fn drain_leading(&mut self) -> Result<()> {
        loop {
            let first = self.order[0];
            let Some(chunk) = self.tracks[first].queue.pop_front() else {
                return Ok(());
            };
            self.write_chunk(first, chunk)?;
            self.sort_tracks();
        }
    }

    /// Stable sort by next write time, compared across timescales.
    fn sort_tracks(&mut self) {
        let tracks = &self.tracks;
        self.order.sort_by(|&a, &b| {
            let lhs = u128::from(tracks[a].next_chunk_write_start) * u128::from(tracks[b].timescale());
            let rhs = u128::from(tracks[b].next_chunk_write_start) * u128::from(tracks[a].timescale());
            lhs.cmp(&rhs)
        });
    }

    fn write_chunk(&mut self, index: usize, chunk: Chunk) -> Result<()> {
        let payload = chunk.payload_size();
        let header = if payload + 8 > u64::from(u32::MAX) {
            let mut h = vec![0, 0, 0, 1];
            h.extend_from_slice(b"mdat");
            h.extend_from_slice(&write_u64_be(payload + 16));
            h
        } else {
            let mut h = write_u32_be((payload + 8) as u32).to_vec();
            h.extend_from_slice(b"mdat");
            h
        };

        let track = &mut self.tracks[index];
        track
            .tables
            .add_chunk_offset(self.bytes_written + header.len() as u64);

        self.sink.write_all(&header)?;
        for sample in &chunk.samples {
            self.sink.write_all(&sample.data)?;
        }
        self.bytes_written += header.len() as u64 + payload;

        track.next_chunk_write_start += chunk.duration;
        debug!(
            track_id = track.track_id,
            samples = chunk.samples.len(),
            bytes = payload,
            start = track.next_chunk_write_start - chunk.duration,
            timescale = track.desc.timescale,
            "chunk written"
        );
        Ok(())
    }

    /// Flush every track's remaining samples, write `moov` and return the sink.
    pub fn close(self) -> Result<W> {
        self.finish().map(|(sink, _)| sink)
    }

    /// Like [`close`](Self::close), also returning the total bytes written.
    pub fn finish(mut self) -> Result<(W, u64)> {
        for index in self.order.clone() {
            let track = &mut self.tracks[index];
            if let Some(chunk) = track.seal_chunk() {
                track.queue.push_back(chunk);
            }
        }

        loop {
            self.sort_tracks();
            let next = self
                .order
                .iter()
                .copied()
                .find(|&i| !self.tracks[i].queue.is_empty());
            let Some(index) = next else { break };
            if let Some(chunk) = self.tracks[index].queue.pop_front() {
                self.write_chunk(index, chunk)?;
            }
        }

        let moov = self.build_moov();
        self.sink.write_all(&moov)?;
        self.sink.flush()?;
        self.bytes_written += moov.len() as u64;

        info!(
            tracks = self.tracks.len(),
            bytes = self.bytes_written,
            "MP4 written"
        );
        Ok((self.sink, self.bytes_written))
    }

    fn movie_timescale(&self) -> u64 {
        self.tracks
            .iter()
            .fold(1, |acc, t| lcm(acc, t.timescale()))
    }

    /// Track duration expressed in the movie timescale.
    fn movie_duration(track: &TrackState, movie_timescale: u64) -> u64 {
        track.next_sample_start * (movie_timescale / track.timescale())
    }

    fn build_moov(&self) -> Vec<u8> {
        let movie_timescale = self.movie_timescale();
        let duration = self
            .tracks
            .iter()
            .map(|t| Self::movie_duration(t, movie_timescale))
            .max()
            .unwrap_or(0);
        let next_track_id = self.tracks.iter().map(|t| t.track_id).max().unwrap_or(0) + 1;

        let mut moov = build_mvhd(movie_timescale as u32, duration, next_track_id);
        for track in &self.tracks {
            moov.extend_from_slice(&build_trak(
                track,
                Self::movie_duration(track, movie_timescale),
            ));
        }
        make_box(b"moov", &moov)
    }
}

fn push_matrix(data: &mut Vec<u8>, matrix: &[u32; 9]) {
    for value in matrix {
        data.extend_from_slice(&write_u32_be(*value));
    }
}

fn build_mvhd(timescale: u32, duration: u64, next_track_id: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(108);
    data.extend_from_slice(&write_u64_be(0)); // creation time
    data.extend_from_slice(&write_u64_be(0)); // modification time
    data.extend_from_slice(&write_u32_be(timescale));
    data.extend_from_slice(&write_u64_be(duration));
    data.extend_from_slice(&write_u32_be(0x0001_0000)); // rate 1.0
    data.extend_from_slice(&[0x01, 0x00]); // volume 1.0
    data.extend_from_slice(&[0u8; 10]); // reserved
    push_matrix(&mut data, &rotation_matrix(0));
    data.extend_from_slice(&[0u8; 24]); // pre-defined
    data.extend_from_slice(&write_u32_be(next_track_id));
    make_full_box(b"mvhd", 1, 0, &data)
}

fn build_trak(track: &TrackState, movie_duration: u64) -> Vec<u8> {
    let mut trak = build_tkhd(track, movie_duration);
    trak.extend_from_slice(&build_mdia(track));
    make_box(b"trak", &trak)
}

fn build_tkhd(track: &TrackState, duration: u64) -> Vec<u8> {
    let desc = &track.desc;
    let mut data = Vec::with_capacity(92);
    data.extend_from_slice(&write_u64_be(0)); // creation time
    data.extend_from_slice(&write_u64_be(0)); // modification time
    data.extend_from_slice(&write_u32_be(track.track_id));
    data.extend_from_slice(&[0u8; 4]); // reserved
    data.extend_from_slice(&write_u64_be(duration));
    data.extend_from_slice(&[0u8; 8]); // reserved
    data.extend_from_slice(&[0u8; 4]); // layer and alternate group
    match desc.handler {
        Handler::Sound => data.extend_from_slice(&[0x01, 0x00]),
        Handler::Video => data.extend_from_slice(&[0, 0]),
    }
    data.extend_from_slice(&[0u8; 2]); // reserved
    push_matrix(&mut data, &rotation_matrix(desc.rotation));
    data.extend_from_slice(&write_u32_be(desc.width << 16));
    data.extend_from_slice(&write_u32_be(desc.height << 16));
    // enabled | in movie
    make_full_box(b"tkhd", 1, 0x03, &data)
}

fn build_mdia(track: &TrackState) -> Vec<u8> {
    let mut mdia = build_mdhd(track);
    mdia.extend_from_slice(&build_hdlr(track.desc.handler));
    mdia.extend_from_slice(&build_minf(track));
    make_box(b"mdia", &mdia)
}

fn build_mdhd(track: &TrackState) -> Vec<u8> {
    let mut data = Vec::with_capacity(32);
    data.extend_from_slice(&write_u64_be(0)); // creation time
    data.extend_from_slice(&write_u64_be(0)); // modification time
    data.extend_from_slice(&write_u32_be(track.desc.timescale));
    data.extend_from_slice(&write_u64_be(track.next_sample_start));
    data.extend_from_slice(&pack_language(&track.desc.language).to_be_bytes());
    data.extend_from_slice(&[0, 0]); // pre-defined
    make_full_box(b"mdhd", 1, 0, &data)
}

fn build_hdlr(handler: Handler) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&[0u8; 4]); // pre-defined
    data.extend_from_slice(&handler.fourcc());
    data.extend_from_slice(&[0u8; 12]); // reserved
    data.extend_from_slice(handler.name().as_bytes());
    data.push(0);
    make_full_box(b"hdlr", 0, 0, &data)
}

fn build_minf(track: &TrackState) -> Vec<u8> {
    let mut minf = match track.desc.handler {
        Handler::Video => make_full_box(b"vmhd", 0, 1, &[0u8; 8]),
        Handler::Sound => make_full_box(b"smhd", 0, 0, &[0u8; 4]),
    };

    let url = make_full_box(b"url ", 0, 1, &[]);
    let mut dref = write_u32_be(1).to_vec();
    dref.extend_from_slice(&url);
    minf.extend_from_slice(&make_box(b"dinf", &make_full_box(b"dref", 0, 0, &dref)));

    minf.extend_from_slice(&build_stbl(track));
    make_box(b"minf", &minf)
}

fn build_stbl(track: &TrackState) -> Vec<u8> {
    let tables = &track.tables;

    let mut stsd = write_u32_be(1).to_vec();
    stsd.extend_from_slice(&track.desc.sample_entry);

    let mut stbl = make_full_box(b"stsd", 0, 0, &stsd);
    stbl.extend_from_slice(&tables.build_stts());
    if let Some(ctts) = tables.build_ctts() {
        stbl.extend_from_slice(&ctts);
    }
    stbl.extend_from_slice(&tables.build_stsc());
    stbl.extend_from_slice(&tables.build_stsz());
    stbl.extend_from_slice(&tables.build_stco());
    if let Some(stss) = tables.build_stss() {
        stbl.extend_from_slice(&stss);
    }
    make_box(b"stbl", &stbl)
}
