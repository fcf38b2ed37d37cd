//! Streaming MP4 muxer: the [`Muxer`] façade over [`Mp4Writer`].
//!
//! Video encoder output (Annex-B) is split into NAL units and grouped into
//! access units by the codec's track accumulator; AAC output is one sample
//! per buffer. Nothing is written before [`start`](Muxer::start), and the
//! sink is never seeked.

use std::io::Write;

use super::aac::AacTrack;
use super::avc::AvcTrack;
use super::hevc::HevcTrack;
use super::track::TrackDescription;
use super::writer::Mp4Writer;
use crate::traits::Muxer;
use tracing::{debug, info, trace, warn};
use transcode_codecs::audio::aac::AacProfile;
use transcode_core::bitstream::{find_start_code, strip_start_code, NalUnits};
use transcode_core::error::{Error, MuxingError, Result};
use transcode_core::format::{MIME_AUDIO_AAC, AAC_PROFILE_LC};
use transcode_core::{BufferInfo, MediaFormat, MediaSample, VideoCodec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MuxerState {
    Initialized,
    Started,
    Stopped,
    Released,
}

#[derive(Debug)]
enum TrackKind {
    Avc(AvcTrack),
    Hevc(HevcTrack),
    Aac(AacTrack),
}

#[derive(Debug)]
struct MuxerTrack {
    kind: TrackKind,
    track_id: Option<u32>,
    samples: u64,
}

impl MuxerTrack {
    fn is_video(&self) -> bool {
        !matches!(self.kind, TrackKind::Aac(_))
    }

    fn description(&self, rotation: i32) -> Result<TrackDescription> {
        let mut desc = match &self.kind {
            TrackKind::Avc(t) => t.description()?,
            TrackKind::Hevc(t) => t.description()?,
            TrackKind::Aac(t) => t.description(),
        };
        desc.track_id = self.track_id;
        if desc.is_video() {
            desc.rotation = rotation;
        }
        Ok(desc)
    }
}

/// MP4 muxer writing a `ftyp`/`mdat`+/`moov` file to any byte sink.
pub struct StreamingMuxer<W: Write> {
    sink: Option<W>,
    writer: Option<Mp4Writer<W>>,
    output: Option<W>,
    tracks: Vec<MuxerTrack>,
    rotation: i32,
    state: MuxerState,
    bytes_written: u64,
}

impl<W: Write> StreamingMuxer<W> {
    /// Create a muxer over `sink`.
    pub fn new(sink: W) -> Self {
        Self {
            sink: Some(sink),
            writer: None,
            output: None,
            tracks: Vec::new(),
            rotation: 0,
            state: MuxerState::Initialized,
            bytes_written: 0,
        }
    }

    /// Bytes written to the sink so far.
    pub fn bytes_written(&self) -> u64 {
        self.writer
            .as_ref()
            .map_or(self.bytes_written, Mp4Writer::bytes_written)
    }

    /// Number of samples written to track `index`.
    pub fn sample_count(&self, index: usize) -> Option<u64> {
        self.tracks.get(index).map(|t| t.samples)
    }

    /// Take back the sink once the muxer has stopped.
    pub fn into_inner(self) -> Option<W> {
        self.output
    }

    fn require(&self, state: MuxerState, action: &str) -> Result<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(Error::invalid_state(format!(
                "{} requires a {:?} muxer, it is {:?}",
                action, state, self.state
            )))
        }
    }

    fn video_track(format: &MediaFormat) -> Result<TrackKind> {
        let codec = VideoCodec::from_mime(&format.mime)
            .ok_or_else(|| MuxingError::UnsupportedFormat(format.mime.clone()))?;
        let csd0 = format
            .csd(0)
            .ok_or_else(|| MuxingError::UnsupportedFormat(format!("{} track without csd-0", format.mime)))?;

        let mut kind = match codec {
            VideoCodec::H264 => {
                let pps = format
                    .csd(1)
                    .ok_or_else(|| MuxingError::UnsupportedFormat("H.264 track without csd-1".into()))?;
                let mut track = AvcTrack::new();
                track.configure(strip_start_code(csd0), strip_start_code(pps))?;
                TrackKind::Avc(track)
            }
            VideoCodec::H265 => {
                let mut track = HevcTrack::new();
                track.configure(csd0)?;
                TrackKind::Hevc(track)
            }
        };

        if let Some(language) = &format.language {
            match &mut kind {
                TrackKind::Avc(t) => t.set_language(language.clone()),
                TrackKind::Hevc(t) => t.set_language(language.clone()),
                TrackKind::Aac(_) => {}
            }
        }
        Ok(kind)
    }

    fn audio_track(format: &MediaFormat) -> Result<TrackKind> {
        if format.mime != MIME_AUDIO_AAC {
            return Err(MuxingError::UnsupportedFormat(format.mime.clone()).into());
        }
        let sample_rate = format
            .sample_rate
            .ok_or_else(|| MuxingError::UnsupportedFormat("audio track without sample rate".into()))?;
        let channels = format
            .channel_count
            .ok_or_else(|| MuxingError::UnsupportedFormat("audio track without channel count".into()))?;
        let bit_rate = format.bit_rate.unwrap_or(0);
        let object_type = format.aac_profile.unwrap_or(AAC_PROFILE_LC);
        let profile = AacProfile::from_object_type(object_type)
            .ok_or_else(|| MuxingError::UnsupportedFormat(format!("AAC object type {}", object_type)))?;

        let mut track = AacTrack::new(bit_rate, bit_rate, sample_rate, channels, profile.object_type())?;
        if let Some(language) = &format.language {
            track.set_language(language.clone());
        }
        Ok(TrackKind::Aac(track))
    }

    fn push(writer: &mut Mp4Writer<W>, track: &mut MuxerTrack, index: usize, sample: MediaSample) -> Result<()> {
        track.samples += 1;
        writer.accept_sample(index, sample)
    }
}

impl<W: Write> Muxer for StreamingMuxer<W> {
    fn add_track(&mut self, format: &MediaFormat) -> Result<usize> {
        self.require(MuxerState::Initialized, "add_track")?;

        let kind = if format.is_video() {
            if self.tracks.iter().any(MuxerTrack::is_video) {
                return Err(MuxingError::UnsupportedFormat("more than one video track".into()).into());
            }
            Self::video_track(format)?
        } else if format.is_audio() {
            Self::audio_track(format)?
        } else {
            return Err(MuxingError::UnsupportedFormat(format.mime.clone()).into());
        };

        if let Some(id) = format.track_id {
            if self.tracks.iter().any(|t| t.track_id == Some(id)) {
                return Err(MuxingError::DuplicateTrackId(id).into());
            }
        }

        self.tracks.push(MuxerTrack {
            kind,
            track_id: format.track_id,
            samples: 0,
        });
        let index = self.tracks.len() - 1;
        debug!(index, mime = %format.mime, "track added");
        Ok(index)
    }

    fn set_orientation_hint(&mut self, degrees: i32) -> Result<()> {
        self.require(MuxerState::Initialized, "set_orientation_hint")?;
        if !matches!(degrees, 0 | 90 | 180 | 270) {
            return Err(Error::invalid_param(format!(
                "orientation hint must be 0, 90, 180 or 270, got {}",
                degrees
            )));
        }
        self.rotation = degrees;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.require(MuxerState::Initialized, "start")?;
        let descriptions = self
            .tracks
            .iter()
            .map(|t| t.description(self.rotation))
            .collect::<Result<Vec<_>>>()?;
        let sink = self
            .sink
            .take()
            .ok_or_else(|| Error::invalid_state("muxer sink already consumed"))?;

        self.writer = Some(Mp4Writer::new(sink, descriptions)?);
        self.state = MuxerState::Started;
        info!(tracks = self.tracks.len(), rotation = self.rotation, "muxer started");
        Ok(())
    }

    fn write_sample_data(&mut self, index: usize, data: &[u8], info: &BufferInfo) -> Result<()> {
        self.require(MuxerState::Started, "write_sample_data")?;
        let track = self
            .tracks
            .get_mut(index)
            .ok_or(MuxingError::UnknownTrack(index))?;
        let payload = info
            .offset
            .checked_add(info.size)
            .and_then(|end| data.get(info.offset..end))
            .ok_or_else(|| {
                Error::invalid_param(format!(
                    "buffer of {} bytes has no range {}+{}",
                    data.len(),
                    info.offset,
                    info.size
                ))
            })?;
        if info.is_codec_config() {
            trace!(index, "codec config buffer ignored");
            return Ok(());
        }
        let Some(writer) = self.writer.as_mut() else {
            return Err(Error::invalid_state("muxer has no writer"));
        };

        let pts = info.presentation_time_us;
        let mut samples = Vec::new();
        match &mut track.kind {
            TrackKind::Aac(aac) => samples.push(aac.process_sample(payload)),
            TrackKind::Avc(avc) => {
                if find_start_code(payload).is_none() {
                    samples.extend(avc.consume_nal(payload, pts)?);
                } else {
                    for nal in NalUnits::new(payload) {
                        samples.extend(avc.consume_nal(nal, pts)?);
                    }
                }
            }
            TrackKind::Hevc(hevc) => {
                if find_start_code(payload).is_none() {
                    samples.extend(hevc.consume_nal(payload, pts)?);
                } else {
                    for nal in NalUnits::new(payload) {
                        samples.extend(hevc.consume_nal(nal, pts)?);
                    }
                }
            }
        }

        for sample in samples {
            Self::push(writer, track, index, sample)?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.require(MuxerState::Started, "stop")?;
        self.state = MuxerState::Stopped;
        let Some(mut writer) = self.writer.take() else {
            return Err(Error::invalid_state("muxer has no writer"));
        };

        for (index, track) in self.tracks.iter_mut().enumerate() {
            let rest = match &mut track.kind {
                TrackKind::Avc(t) => t.finish(),
                TrackKind::Hevc(t) => t.finish(),
                TrackKind::Aac(_) => Vec::new(),
            };
            for sample in rest {
                Self::push(&mut writer, track, index, sample)?;
            }
        }

        let (sink, written) = writer.finish()?;
        self.bytes_written = written;
        self.output = Some(sink);

        for (index, track) in self.tracks.iter().enumerate() {
            debug!(index, samples = track.samples, "track finished");
        }
        info!("muxer stopped");
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if self.state == MuxerState::Started {
            warn!("muxer released without stop, output is incomplete");
        }
        self.writer = None;
        self.sink = None;
        self.state = MuxerState::Released;
        Ok(())
    }
}
