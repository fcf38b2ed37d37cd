//! In-memory media stack for driving the converter in tests.
//!
//! The fake codecs pass payloads through unchanged, except the video
//! encoder, which turns every frame swapped onto its input surface into an
//! Annex-B access unit with parameter sets matching the requested size.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use transcode::{
    BufferFlags, BufferInfo, CodecInfo, Demuxer, Error, InputSurface, MediaBackend, MediaCodec, MediaFormat,
    OutputEvent, OutputSurface, Result, SeekMode, SurfaceEncoder, VideoCodec,
};
use transcode_core::error::CodecError;
use transcode_core::format::{MIME_AUDIO_AAC, MIME_AUDIO_RAW, MIME_VIDEO_AVC, MIME_VIDEO_HEVC};
use transcode_core::BitWriter;
use transcode_gpu::GpuError;

/// Decoder and encoder queue depth.
const QUEUE_DEPTH: usize = 4;

/// Shared record of what the stack was asked to do.
pub type Log = Rc<RefCell<Vec<String>>>;

// =============================================================================
// Sources
// =============================================================================

/// One track of a fake source.
#[derive(Debug, Clone)]
pub struct FakeTrack {
    pub format: MediaFormat,
    /// `(pts_us, sync, payload)` in decode order.
    pub samples: Vec<(i64, bool, Vec<u8>)>,
}

impl FakeTrack {
    /// `seconds` of 30 fps H.264 with a key frame every second.
    pub fn video(width: u32, height: u32, seconds: i64) -> Self {
        let mut format = MediaFormat::video(MIME_VIDEO_AVC, width, height);
        format.duration_us = Some(seconds * 1_000_000);
        let samples = (0..seconds * 30)
            .map(|i| {
                let sync = i % 30 == 0;
                let payload = vec![if sync { 0x65 } else { 0x41 }, (i % 251) as u8 + 1, 0x5A];
                (i * 1_000_000 / 30, sync, payload)
            })
            .collect();
        Self { format, samples }
    }

    /// `seconds` of stereo AAC at `sample_rate`, 1024 samples per frame.
    pub fn audio(sample_rate: u32, seconds: i64) -> Self {
        let mut format = MediaFormat::audio(MIME_AUDIO_AAC, sample_rate, 2);
        format.duration_us = Some(seconds * 1_000_000);
        let mut samples = Vec::new();
        let mut i = 0i64;
        loop {
            let pts = i * 1024 * 1_000_000 / i64::from(sample_rate);
            if pts >= seconds * 1_000_000 {
                break;
            }
            samples.push((pts, true, vec![0x21, (i % 256) as u8, 0x40, 0x99]));
            i += 1;
        }
        Self { format, samples }
    }

    pub fn rotated(mut self, degrees: i32) -> Self {
        self.format.rotation = degrees;
        self
    }
}

/// Number of frames in `track` whose pts falls in `from..=to`.
pub fn frames_between(track: &FakeTrack, from_us: i64, to_us: i64) -> usize {
    track
        .samples
        .iter()
        .filter(|(pts, _, _)| *pts >= from_us && *pts <= to_us)
        .count()
}

pub struct FakeDemuxer {
    tracks: Rc<Vec<FakeTrack>>,
    selected: Option<usize>,
    cursor: usize,
    log: Log,
    fail_release: bool,
}

impl FakeDemuxer {
    fn current(&self) -> Option<&(i64, bool, Vec<u8>)> {
        self.tracks.get(self.selected?)?.samples.get(self.cursor)
    }

    fn kind(&self) -> &'static str {
        match self.selected.map(|i| self.tracks[i].format.is_video()) {
            Some(true) => "video",
            Some(false) => "audio",
            None => "idle",
        }
    }
}

impl Demuxer for FakeDemuxer {
    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_format(&self, index: usize) -> Result<MediaFormat> {
        self.tracks
            .get(index)
            .map(|t| t.format.clone())
            .ok_or_else(|| Error::invalid_param(format!("no track {}", index)))
    }

    fn select_track(&mut self, index: usize) -> Result<()> {
        self.selected = Some(index);
        self.cursor = 0;
        Ok(())
    }

    fn seek_to(&mut self, time_us: i64, mode: SeekMode) -> Result<()> {
        assert_eq!(mode, SeekMode::PreviousSync);
        let Some(track) = self.selected.map(|i| &self.tracks[i]) else {
            return Ok(());
        };
        self.cursor = track
            .samples
            .iter()
            .rposition(|(pts, sync, _)| *sync && *pts <= time_us)
            .unwrap_or(0);
        self.log.borrow_mut().push(format!("seek {} demuxer {}", self.kind(), time_us));
        Ok(())
    }

    fn read_sample_data(&mut self, buf: &mut Vec<u8>) -> Result<Option<usize>> {
        let Some((_, _, payload)) = self.current() else {
            return Ok(None);
        };
        buf.clear();
        buf.extend_from_slice(payload);
        Ok(Some(buf.len()))
    }

    fn sample_time(&self) -> Option<i64> {
        self.current().map(|s| s.0)
    }

    fn sample_flags(&self) -> BufferFlags {
        match self.current() {
            Some((_, true, _)) => BufferFlags::SYNC_FRAME,
            _ => BufferFlags::empty(),
        }
    }

    fn advance(&mut self) -> bool {
        self.cursor += 1;
        self.current().is_some()
    }

    fn release(&mut self) -> Result<()> {
        let name = format!("{} demuxer", self.kind());
        self.log.borrow_mut().push(format!("release {}", name));
        if self.fail_release {
            return Err(CodecError::Other(format!("{} release failed", name)).into());
        }
        Ok(())
    }
}

// =============================================================================
// Surfaces
// =============================================================================

/// Frames rendered by the video decoder and not yet drawn.
#[derive(Debug, Default)]
pub struct TextureState {
    pub pending: VecDeque<i64>,
    pub drawn: usize,
    pub shader: Option<String>,
}

/// What the encoder surface has submitted.
#[derive(Debug, Default)]
pub struct EncoderFeed {
    pub frames: VecDeque<Option<i64>>,
    pub submitted: usize,
    next_pts_ns: i64,
}

pub struct FakeOutputSurface {
    state: Rc<RefCell<TextureState>>,
    log: Log,
    fail_wait: bool,
    fail_release: bool,
}

impl OutputSurface for FakeOutputSurface {
    fn await_new_image(&mut self) -> transcode_gpu::Result<()> {
        if self.fail_wait {
            return Err(GpuError::Timeout(2500));
        }
        match self.state.borrow_mut().pending.pop_front() {
            Some(_) => Ok(()),
            None => Err(GpuError::Timeout(2500)),
        }
    }

    fn draw_image(&mut self) -> transcode_gpu::Result<()> {
        self.state.borrow_mut().drawn += 1;
        Ok(())
    }

    fn change_fragment_shader(&mut self, source: &str) -> transcode_gpu::Result<()> {
        self.state.borrow_mut().shader = Some(source.to_string());
        Ok(())
    }

    fn release(&mut self) -> transcode_gpu::Result<()> {
        self.log.borrow_mut().push("release output surface".into());
        if self.fail_release {
            return Err(GpuError::Released);
        }
        Ok(())
    }
}

pub struct FakeInputSurface {
    feed: Rc<RefCell<EncoderFeed>>,
    log: Log,
}

impl InputSurface for FakeInputSurface {
    fn make_current(&mut self) -> transcode_gpu::Result<()> {
        self.log.borrow_mut().push("make current".into());
        Ok(())
    }

    fn set_presentation_time(&mut self, nanos: i64) -> transcode_gpu::Result<()> {
        self.feed.borrow_mut().next_pts_ns = nanos;
        Ok(())
    }

    fn swap_buffers(&mut self) -> transcode_gpu::Result<()> {
        let mut feed = self.feed.borrow_mut();
        let pts_us = feed.next_pts_ns / 1000;
        feed.frames.push_back(Some(pts_us));
        feed.submitted += 1;
        Ok(())
    }

    fn release(&mut self) -> transcode_gpu::Result<()> {
        self.log.borrow_mut().push("release input surface".into());
        Ok(())
    }
}

// =============================================================================
// Codecs
// =============================================================================

enum Role {
    /// Passes samples through and renders into the texture on release.
    VideoDecoder(Rc<RefCell<TextureState>>),
    /// Passes samples through as PCM.
    AudioDecoder,
    /// Passes PCM through as AAC frames.
    AudioEncoder,
    /// Encodes surface frames.
    VideoEncoder {
        codec: VideoCodec,
        feed: Rc<RefCell<EncoderFeed>>,
        config_sent: bool,
        frames: u64,
    },
}

pub struct FakeCodec {
    name: &'static str,
    role: Role,
    mime: String,
    is_encoder: bool,
    format: MediaFormat,
    inputs: Vec<Vec<u8>>,
    ready: VecDeque<(Vec<u8>, BufferInfo)>,
    outputs: Vec<Option<Vec<u8>>>,
    announced: bool,
    input_ended: bool,
    log: Log,
    fail_release: bool,
}

impl FakeCodec {
    fn new(name: &'static str, role: Role, mime: &str, is_encoder: bool, format: MediaFormat, log: Log) -> Self {
        Self {
            name,
            role,
            mime: mime.to_string(),
            is_encoder,
            format,
            inputs: vec![Vec::new(); QUEUE_DEPTH],
            ready: VecDeque::new(),
            outputs: Vec::new(),
            announced: false,
            input_ended: false,
            log,
            fail_release: false,
        }
    }

    /// Pull frames the input surface submitted into the output queue.
    fn encode_surface_frames(&mut self) {
        let Role::VideoEncoder {
            codec,
            feed,
            config_sent,
            frames,
        } = &mut self.role
        else {
            return;
        };
        let mut feed = feed.borrow_mut();
        if !*config_sent && !feed.frames.is_empty() {
            let config = self.format.csd.concat();
            let info = BufferInfo::new(0, config.len(), 0, BufferFlags::CODEC_CONFIG);
            self.ready.push_back((config, info));
            *config_sent = true;
        }
        while let Some(frame) = feed.frames.pop_front() {
            match frame {
                Some(pts) => {
                    let idr = *frames % 30 == 0;
                    let data = encoded_frame(*codec, *frames, idr);
                    let flags = if idr { BufferFlags::SYNC_FRAME } else { BufferFlags::empty() };
                    self.ready.push_back((data.clone(), BufferInfo::new(0, data.len(), pts, flags)));
                    *frames += 1;
                }
                None => {
                    self.ready
                        .push_back((Vec::new(), BufferInfo::new(0, 0, 0, BufferFlags::END_OF_STREAM)));
                }
            }
        }
    }

    fn release_error(&self) -> Result<()> {
        if self.fail_release {
            return Err(CodecError::Other(format!("{} release failed", self.name)).into());
        }
        Ok(())
    }
}

impl MediaCodec for FakeCodec {
    fn codec_info(&self) -> CodecInfo {
        CodecInfo {
            name: format!("fake.{}", self.name.replace(' ', ".")),
            mime: self.mime.clone(),
            is_encoder: self.is_encoder,
        }
    }

    fn dequeue_input_buffer(&mut self, _timeout: Duration) -> Result<Option<usize>> {
        if self.input_ended || self.ready.len() >= QUEUE_DEPTH {
            return Ok(None);
        }
        Ok(Some(0))
    }

    fn input_buffer(&mut self, index: usize) -> Result<&mut Vec<u8>> {
        self.inputs
            .get_mut(index)
            .ok_or_else(|| Error::invalid_param(format!("no input slot {}", index)))
    }

    fn queue_input_buffer(&mut self, index: usize, info: BufferInfo) -> Result<()> {
        if matches!(self.role, Role::VideoEncoder { .. }) {
            return Err(Error::invalid_state("surface encoder takes no input buffers"));
        }
        let data = self.inputs[index][info.offset..info.offset + info.size].to_vec();
        if info.is_end_of_stream() {
            self.input_ended = true;
        }
        self.ready.push_back((data, info));
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, _timeout: Duration) -> Result<OutputEvent> {
        self.encode_surface_frames();
        if self.ready.is_empty() {
            return Ok(OutputEvent::TryAgainLater);
        }
        if !self.announced {
            self.announced = true;
            return Ok(OutputEvent::FormatChanged);
        }
        let Some((data, info)) = self.ready.pop_front() else {
            return Ok(OutputEvent::TryAgainLater);
        };
        self.outputs.push(Some(data));
        Ok(OutputEvent::Buffer {
            index: self.outputs.len() - 1,
            info,
        })
    }

    fn output_buffer(&self, index: usize) -> Result<&[u8]> {
        self.outputs
            .get(index)
            .and_then(Option::as_deref)
            .ok_or_else(|| Error::invalid_state(format!("output slot {} not dequeued", index)))
    }

    fn release_output_buffer(&mut self, index: usize, render: bool) -> Result<()> {
        if self.outputs.get_mut(index).and_then(Option::take).is_none() {
            return Err(Error::invalid_state(format!("output slot {} released twice", index)));
        }
        if render {
            let Role::VideoDecoder(texture) = &self.role else {
                return Err(Error::invalid_state(format!("{} cannot render", self.name)));
            };
            texture.borrow_mut().pending.push_back(index as i64);
        }
        Ok(())
    }

    fn output_format(&self) -> Option<MediaFormat> {
        self.announced.then(|| self.format.clone())
    }

    fn signal_end_of_input_stream(&mut self) -> Result<()> {
        let Role::VideoEncoder { feed, .. } = &self.role else {
            return Err(Error::invalid_state("not a surface encoder"));
        };
        feed.borrow_mut().frames.push_back(None);
        self.log.borrow_mut().push(format!("end of input {}", self.name));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.log.borrow_mut().push(format!("stop {}", self.name));
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.log.borrow_mut().push(format!("release {}", self.name));
        self.release_error()
    }
}

// =============================================================================
// Bitstream fixtures
// =============================================================================

/// H.264 Main profile SPS for a `width`x`height` frame, with start code.
pub fn avc_sps(width: u32, height: u32) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bits(77, 8);
    w.write_bits(0x40, 8);
    w.write_bits(31, 8);
    w.write_ue(0);
    w.write_ue(0);
    w.write_ue(2);
    w.write_ue(1);
    w.write_bit(false);
    w.write_ue(width.div_ceil(16) - 1);
    w.write_ue(height.div_ceil(16) - 1);
    w.write_bit(true);
    w.write_bit(true);
    w.write_bit(false);
    w.write_bit(false);
    w.write_rbsp_trailing_bits();
    let mut sps = vec![0, 0, 0, 1, 0x67];
    sps.extend_from_slice(w.data());
    sps
}

/// H.265 Main profile SPS NAL (no start code).
pub fn hevc_sps(width: u32, height: u32) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bits(0, 4);
    w.write_bits(0, 3);
    w.write_bit(true);
    w.write_bits(0, 2);
    w.write_bit(false);
    w.write_bits(1, 5);
    w.write_bits(0x6000_0000, 32);
    w.write_bits(0x9000, 16);
    w.write_bits(0, 32);
    w.write_bits(123, 8);
    w.write_ue(0);
    w.write_ue(1);
    w.write_ue(width);
    w.write_ue(height);
    w.write_bit(false);
    w.write_ue(0);
    w.write_ue(0);
    w.write_rbsp_trailing_bits();
    let mut nal = vec![0x42, 0x01];
    nal.extend_from_slice(w.data());
    nal
}

fn encoder_csd(codec: VideoCodec, width: u32, height: u32) -> Vec<Vec<u8>> {
    match codec {
        VideoCodec::H264 => vec![avc_sps(width, height), vec![0, 0, 0, 1, 0x68, 0xEE, 0x3C, 0x80]],
        VideoCodec::H265 => {
            let mut csd = vec![0, 0, 0, 1, 0x40, 0x01, 0x0C, 0x01, 0, 0, 0, 1];
            csd.extend_from_slice(&hevc_sps(width, height));
            csd.extend_from_slice(&[0, 0, 0, 1, 0x44, 0x01, 0xC1, 0x72]);
            vec![csd]
        }
    }
}

/// One Annex-B access unit. Payload bytes are non-zero and vary per frame.
fn encoded_frame(codec: VideoCodec, index: u64, idr: bool) -> Vec<u8> {
    let fill = std::iter::repeat((index % 250) as u8 + 1).take(16 + (index % 11) as usize);
    match codec {
        VideoCodec::H264 => [0, 0, 0, 1, 0x09, 0xF0, 0, 0, 0, 1, if idr { 0x65 } else { 0x41 }, 0x88]
            .into_iter()
            .chain(fill)
            .collect(),
        VideoCodec::H265 => [0, 0, 0, 1, if idr { 0x26 } else { 0x02 }, 0x01, 0xAF]
            .into_iter()
            .chain(fill)
            .collect(),
    }
}

// =============================================================================
// Backend
// =============================================================================

/// Builder-style fake stack.
pub struct FakeBackend {
    pub tracks: Rc<Vec<FakeTrack>>,
    /// MIME types with an encoder.
    pub encoders: Vec<&'static str>,
    /// Resource names whose release fails.
    pub fail_release: Vec<&'static str>,
    /// Make every frame wait on the texture time out.
    pub fail_render: bool,
    pub log: Log,
    /// Format the video encoder was configured with.
    pub video_encoder_format: Rc<RefCell<Option<MediaFormat>>>,
    /// Format the audio encoder was configured with.
    pub audio_encoder_format: Rc<RefCell<Option<MediaFormat>>>,
    pub texture: Rc<RefCell<TextureState>>,
    pub feed: Rc<RefCell<EncoderFeed>>,
}

impl FakeBackend {
    pub fn new(tracks: Vec<FakeTrack>) -> Self {
        Self {
            tracks: Rc::new(tracks),
            encoders: vec![MIME_VIDEO_AVC, MIME_AUDIO_AAC],
            fail_release: Vec::new(),
            fail_render: false,
            log: Log::default(),
            video_encoder_format: Rc::default(),
            audio_encoder_format: Rc::default(),
            texture: Rc::default(),
            feed: Rc::default(),
        }
    }

    pub fn with_encoders(mut self, encoders: &[&'static str]) -> Self {
        self.encoders = encoders.to_vec();
        self
    }

    pub fn failing_release(mut self, names: &[&'static str]) -> Self {
        self.fail_release = names.to_vec();
        self
    }

    pub fn failing_render(mut self) -> Self {
        self.fail_render = true;
        self
    }

    /// The `release ...` entries of the log, in order.
    pub fn releases(log: &Log) -> Vec<String> {
        log.borrow()
            .iter()
            .filter(|e| e.starts_with("release "))
            .cloned()
            .collect()
    }

    fn fails(&self, name: &str) -> bool {
        self.fail_release.iter().any(|n| *n == name)
    }

    fn codec(&self, name: &'static str, role: Role, mime: &str, is_encoder: bool, format: MediaFormat) -> Box<dyn MediaCodec> {
        let mut codec = FakeCodec::new(name, role, mime, is_encoder, format, self.log.clone());
        codec.fail_release = self.fails(name);
        self.log.borrow_mut().push(format!("create {}", name));
        Box::new(codec)
    }
}

impl MediaBackend for FakeBackend {
    fn select_encoder(&self, mime: &str) -> Option<CodecInfo> {
        self.encoders.iter().any(|m| *m == mime).then(|| CodecInfo {
            name: format!("fake.encoder.{}", mime),
            mime: mime.to_string(),
            is_encoder: true,
        })
    }

    fn open_demuxer(&mut self, _source: &Path) -> Result<Box<dyn Demuxer>> {
        Ok(Box::new(FakeDemuxer {
            tracks: self.tracks.clone(),
            selected: None,
            cursor: 0,
            log: self.log.clone(),
            fail_release: false,
        }))
    }

    fn create_video_encoder(&mut self, format: &MediaFormat) -> Result<SurfaceEncoder> {
        let codec = VideoCodec::from_mime(&format.mime).ok_or_else(|| Error::UnsupportedCodec(format.mime.clone()))?;
        let (Some(width), Some(height)) = (format.width, format.height) else {
            return Err(Error::invalid_param("video encoder format without size"));
        };
        *self.video_encoder_format.borrow_mut() = Some(format.clone());

        let mut output = MediaFormat::video(format.mime.clone(), width, height);
        output.csd = encoder_csd(codec, width, height);
        let role = Role::VideoEncoder {
            codec,
            feed: self.feed.clone(),
            config_sent: false,
            frames: 0,
        };
        let encoder = self.codec("video encoder", role, &format.mime, true, output);
        let surface = Box::new(FakeInputSurface {
            feed: self.feed.clone(),
            log: self.log.clone(),
        });
        Ok(SurfaceEncoder { encoder, surface })
    }

    fn create_output_surface(&mut self) -> Result<Box<dyn OutputSurface>> {
        Ok(Box::new(FakeOutputSurface {
            state: self.texture.clone(),
            log: self.log.clone(),
            fail_wait: self.fail_render,
            fail_release: self.fails("output surface"),
        }))
    }

    fn create_video_decoder(&mut self, format: &MediaFormat, _surface: &mut dyn OutputSurface) -> Result<Box<dyn MediaCodec>> {
        let output = MediaFormat::video("video/raw", format.width.unwrap_or(0), format.height.unwrap_or(0));
        let role = Role::VideoDecoder(self.texture.clone());
        Ok(self.codec("video decoder", role, &format.mime, false, output))
    }

    fn create_audio_decoder(&mut self, format: &MediaFormat) -> Result<Box<dyn MediaCodec>> {
        let output = MediaFormat::audio(MIME_AUDIO_RAW, format.sample_rate.unwrap_or(0), format.channel_count.unwrap_or(0));
        Ok(self.codec("audio decoder", Role::AudioDecoder, &format.mime, false, output))
    }

    fn create_audio_encoder(&mut self, format: &MediaFormat) -> Result<Box<dyn MediaCodec>> {
        if !self.encoders.iter().any(|m| *m == format.mime) {
            return Err(Error::UnsupportedCodec(format.mime.clone()));
        }
        *self.audio_encoder_format.borrow_mut() = Some(format.clone());
        let mut output = MediaFormat::audio(MIME_AUDIO_AAC, format.sample_rate.unwrap_or(0), format.channel_count.unwrap_or(0));
        output.bit_rate = format.bit_rate;
        Ok(self.codec("audio encoder", Role::AudioEncoder, MIME_AUDIO_AAC, true, output))
    }
}

/// The H.265 MIME type, for encoder lists.
pub const HEVC: &str = MIME_VIDEO_HEVC;
