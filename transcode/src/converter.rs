//! The conversion pipeline controller.
//!
//! One [`VideoConverter`] run opens two demuxers over the source, decodes
//! video into a GL texture, scales it onto the encoder's input surface,
//! re-encodes audio from PCM, and muxes both encoders into an MP4. The loop
//! is a single-threaded pump: every iteration moves at most one buffer
//! through each stage, each poll waiting at most [`TIMEOUT`].

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use transcode_codecs::{MediaCodec, OutputEvent};
use transcode_containers::{fast_start_bytes, fast_start_in_place, find_track, Demuxer, Muxer, SeekMode, StreamingMuxer};
use transcode_core::error::CodecError;
use transcode_core::{BufferFlags, BufferInfo, ColorFormat, Error, MediaFormat, Result};
use transcode_gpu::{install_shader, render_frame, InputSurface, OutputSurface, ScaleGeometry};

use crate::backend::{MediaBackend, SurfaceEncoder};
use crate::options::{ConvertOptions, OUTPUT_AUDIO_MIME, TIMEOUT};
use crate::progress::{ProgressHandle, Stage};

/// Progress listener. Receives the percent of the trim window muxed so far
/// and returns `true` to cancel.
pub type ProgressListener = Box<dyn FnMut(u8) -> bool + Send>;

/// How a conversion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every track reached end of stream.
    Completed,
    /// The listener or a [`ProgressHandle`] stopped the run. The output is
    /// finalized but partial.
    Cancelled,
}

/// Counters collected during a conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertStats {
    /// Video samples handed to the muxer.
    pub video_samples: u64,
    /// Audio samples handed to the muxer.
    pub audio_samples: u64,
    /// Size of the output, when the muxer owned a sink.
    pub bytes_written: Option<u64>,
    /// Largest presentation time muxed, in microseconds.
    pub last_pts_us: i64,
    /// Wall time of the run.
    pub elapsed: Duration,
}

/// Result of a conversion that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertReport {
    /// How the run ended.
    pub outcome: Outcome,
    /// Collected counters.
    pub stats: ConvertStats,
}

impl ConvertReport {
    /// Check if the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.outcome == Outcome::Cancelled
    }
}

/// Converts one source file with a [`MediaBackend`].
pub struct VideoConverter<B: MediaBackend> {
    backend: B,
    source: PathBuf,
    options: ConvertOptions,
    listener: Option<ProgressListener>,
    handle: ProgressHandle,
}

impl<B: MediaBackend> VideoConverter<B> {
    /// Create a converter for `source`.
    ///
    /// Fails with [`Error::Config`] for invalid options and
    /// [`Error::UnsupportedCodec`] when the backend has no encoder for the
    /// requested video codec.
    pub fn new(backend: B, source: impl Into<PathBuf>, options: ConvertOptions) -> Result<Self> {
        options.validate().map_err(Error::Config)?;

        let mime = options.video_codec.mime();
        match backend.select_encoder(mime) {
            Some(info) => debug!(codec = %info.name, mime, "video encoder found"),
            None => {
                error!(mime, "unable to find an appropriate codec");
                return Err(Error::UnsupportedCodec(mime.to_string()));
            }
        }

        Ok(Self {
            backend,
            source: source.into(),
            options,
            listener: None,
            handle: ProgressHandle::new(),
        })
    }

    /// Set the progress listener.
    #[must_use]
    pub fn on_progress<F>(mut self, listener: F) -> Self
    where
        F: FnMut(u8) -> bool + Send + 'static,
    {
        self.listener = Some(Box::new(listener));
        self
    }

    /// Handle for observing or cancelling the run from another thread.
    pub fn progress_handle(&self) -> ProgressHandle {
        self.handle.clone()
    }

    /// The options in effect.
    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// The backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Convert into the file at `output`, replacing it.
    ///
    /// With [`ConvertOptions::streamable`] set, a completed output is then
    /// rewritten with `moov` first. A cancelled output is left as written.
    pub fn convert(&mut self, output: &Path) -> Result<ConvertReport> {
        info!(source = %self.source.display(), output = %output.display(), "converting");
        let (result, muxer) = self.execute(|| Ok(StreamingMuxer::new(BufWriter::new(File::create(output)?))));
        let mut report = result?;
        report.stats.bytes_written = muxer.as_ref().map(StreamingMuxer::bytes_written);
        // Close the file before it is rewritten.
        drop(muxer);

        if report.outcome == Outcome::Completed && self.options.streamable {
            self.handle.set_stage(Stage::FastStart);
            let outcome = fast_start_in_place(output);
            self.handle.set_stage(Stage::Done);
            debug!(?outcome, "fast-start finished");
            outcome?;
        }
        Ok(report)
    }

    /// Convert into memory and return the MP4 bytes.
    pub fn convert_to_vec(&mut self) -> Result<(ConvertReport, Vec<u8>)> {
        let (result, muxer) = self.execute(|| Ok(StreamingMuxer::new(Vec::new())));
        let mut report = result?;
        let mut bytes = muxer.and_then(StreamingMuxer::into_inner).unwrap_or_default();
        if report.outcome == Outcome::Completed && self.options.streamable && !bytes.is_empty() {
            bytes = fast_start_bytes(&bytes)?;
        }
        report.stats.bytes_written = Some(bytes.len() as u64);
        Ok((report, bytes))
    }

    /// Acquire, pump and release. The muxer is returned so the caller can
    /// take its sink back.
    fn execute<M: Muxer>(&mut self, open: impl FnOnce() -> Result<M>) -> (Result<ConvertReport>, Option<M>) {
        let started = Instant::now();
        self.handle.set_stage(Stage::Preparing);

        let mut resources = Resources::default();
        let mut muxer = None;
        let result = self.prepare(&mut resources).and_then(|source| {
            let muxer = muxer.insert(open()?);
            self.handle.set_stage(Stage::Converting);
            self.pump(&mut resources, muxer, &source)
        });

        self.handle.set_stage(Stage::Finishing);
        let result = resources.release(result, muxer.as_mut().map(|m| m as &mut dyn Muxer));
        self.handle.set_stage(Stage::Done);

        let result = result.map(|(outcome, mut stats)| {
            stats.elapsed = started.elapsed();
            info!(
                ?outcome,
                video_samples = stats.video_samples,
                audio_samples = stats.audio_samples,
                elapsed_ms = stats.elapsed.as_millis() as u64,
                "conversion finished"
            );
            ConvertReport { outcome, stats }
        });
        (result, muxer)
    }

    /// Open the source and create every codec and surface.
    fn prepare(&mut self, res: &mut Resources) -> Result<Source> {
        let mut source = Source::default();

        let mut demuxer = self.backend.open_demuxer(&self.source)?;
        if let Some((index, format)) = find_track(demuxer.as_ref(), "video/")? {
            demuxer.select_track(index)?;
            res.video_demuxer = Some(demuxer);
            self.prepare_video(res, &format)?;
            source.duration_us = format.duration_us.unwrap_or(0);
            source.rotation = format.rotation.rem_euclid(360);
            source.has_video = true;
        } else {
            demuxer.release()?;
        }

        let mut demuxer = self.backend.open_demuxer(&self.source)?;
        if let Some((index, format)) = find_track(demuxer.as_ref(), "audio/")? {
            demuxer.select_track(index)?;
            res.audio_demuxer = Some(demuxer);
            self.prepare_audio(res, &format)?;
            if source.duration_us == 0 {
                source.duration_us = format.duration_us.unwrap_or(0);
            }
            source.has_audio = true;
        } else {
            demuxer.release()?;
        }

        if !source.has_video && !source.has_audio {
            error!(source = %self.source.display(), "no video and audio tracks");
            return Err(Error::bad_media("no video and audio tracks"));
        }
        Ok(source)
    }

    fn prepare_video(&mut self, res: &mut Resources, input: &MediaFormat) -> Result<()> {
        let (Some(src_width), Some(src_height)) = (input.width, input.height) else {
            return Err(Error::bad_media("video track without dimensions"));
        };

        // Sizes are given in display orientation; the encoder works in the
        // stored orientation and the muxer carries the rotation.
        let rotated = input.rotation.rem_euclid(180) == 90;
        let (display_width, display_height) = if rotated {
            (src_height, src_width)
        } else {
            (src_width, src_height)
        };
        let (width, height) = self
            .options
            .size
            .map_or((display_width, display_height), |size| size.resolve(display_width, display_height));
        let (width, height) = if rotated { (height, width) } else { (width, height) };
        if width % 16 != 0 || height % 16 != 0 {
            warn!(width, height, "width or height not multiple of 16");
        }

        let format = MediaFormat {
            mime: self.options.video_codec.mime().to_string(),
            width: Some(width),
            height: Some(height),
            color_format: Some(ColorFormat::Surface),
            bit_rate: Some(self.options.video_bitrate),
            bitrate_mode: Some(self.options.bitrate_mode),
            frame_rate: Some(self.options.frame_rate),
            i_frame_interval: Some(self.options.i_frame_interval),
            ..Default::default()
        };
        debug!(?format, "video encoder format");

        let SurfaceEncoder { encoder, surface } = self.backend.create_video_encoder(&format)?;
        res.video_encoder = Some(encoder);
        res.input_surface.insert(surface).make_current()?;

        let output = res.output_surface.insert(self.backend.create_output_surface()?);
        install_shader(
            output.as_mut(),
            ScaleGeometry {
                src_width,
                src_height,
                dst_width: width,
                dst_height: height,
            },
        )?;
        res.video_decoder = Some(self.backend.create_video_decoder(input, output.as_mut())?);

        info!(
            src = %format!("{}x{}", src_width, src_height),
            dst = %format!("{}x{}", width, height),
            rotation = input.rotation,
            codec = %self.options.video_codec,
            "video branch ready"
        );
        Ok(())
    }

    fn prepare_audio(&mut self, res: &mut Resources, input: &MediaFormat) -> Result<()> {
        let (Some(sample_rate), Some(channels)) = (input.sample_rate, input.channel_count) else {
            return Err(Error::bad_media("audio track without sample rate or channel count"));
        };
        if self.backend.select_encoder(OUTPUT_AUDIO_MIME).is_none() {
            error!(mime = OUTPUT_AUDIO_MIME, "unable to find an appropriate codec");
            return Err(Error::UnsupportedCodec(OUTPUT_AUDIO_MIME.to_string()));
        }

        let mut format = MediaFormat::audio(OUTPUT_AUDIO_MIME, sample_rate, channels);
        format.bit_rate = Some(self.options.audio_bitrate);
        format.aac_profile = Some(self.options.aac_profile);

        res.audio_encoder = Some(self.backend.create_audio_encoder(&format)?);
        res.audio_decoder = Some(self.backend.create_audio_decoder(input)?);
        info!(sample_rate, channels, bitrate = self.options.audio_bitrate, "audio branch ready");
        Ok(())
    }

    /// Run the main loop until both encoders reach end of stream or the run
    /// is cancelled.
    fn pump(&mut self, res: &mut Resources, muxer: &mut dyn Muxer, source: &Source) -> Result<(Outcome, ConvertStats)> {
        let (from_us, to_us) = self.options.window(source.duration_us);
        if from_us > 0 {
            for (track, demuxer) in [("video", res.video_demuxer.as_deref_mut()), ("audio", res.audio_demuxer.as_deref_mut())] {
                if let Some(demuxer) = demuxer {
                    demuxer.seek_to(from_us, SeekMode::PreviousSync)?;
                    info!(track, target_us = from_us, landed_us = ?demuxer.sample_time(), "seek");
                }
            }
        }

        let mut pump = Pump::new(res, from_us, self.options.time_to_us);
        let mut cancelled = self.handle.is_cancelled();
        while !cancelled && !pump.finished() {
            pump.step(res, muxer)?;
            cancelled = self.report_progress(&mut pump, from_us, to_us);

            if !pump.muxing && pump.ready_to_mux() {
                pump.start_muxing(muxer, source.rotation)?;
                res.muxer_started = true;
            }
            cancelled |= self.handle.is_cancelled();
        }

        debug!(
            extracted = ?(pump.video_extracted, pump.audio_extracted),
            decoded = ?(pump.video_decoded, pump.audio_decoded),
            encoded = ?(pump.video.samples, pump.audio.samples),
            "pipeline drained"
        );
        if pump.pending_audio.is_some() && !cancelled {
            warn!("decoded audio buffer left pending");
        }

        let outcome = if cancelled {
            info!(percent = pump.percent, "conversion cancelled");
            Outcome::Cancelled
        } else {
            Outcome::Completed
        };
        Ok((
            outcome,
            ConvertStats {
                video_samples: pump.video.samples,
                audio_samples: pump.audio.samples,
                bytes_written: None,
                last_pts_us: pump.muxing_pts,
                elapsed: Duration::ZERO,
            },
        ))
    }

    /// Publish a changed percent. Returns `true` if the listener asked to
    /// cancel.
    fn report_progress(&mut self, pump: &mut Pump, from_us: i64, to_us: i64) -> bool {
        if to_us <= from_us {
            return false;
        }
        let percent = (100 * (pump.muxing_pts - from_us) / (to_us - from_us)).clamp(0, 100) as u8;
        if percent == pump.percent {
            return false;
        }
        pump.percent = percent;
        self.handle.set_percent(percent);
        self.listener.as_mut().is_some_and(|listener| listener(percent))
    }
}

#[derive(Debug, Default)]
struct Source {
    has_video: bool,
    has_audio: bool,
    duration_us: i64,
    rotation: i32,
}

/// Everything acquired for one run, released in reverse order of creation.
#[derive(Default)]
struct Resources {
    video_demuxer: Option<Box<dyn Demuxer>>,
    video_encoder: Option<Box<dyn MediaCodec>>,
    input_surface: Option<Box<dyn InputSurface>>,
    output_surface: Option<Box<dyn OutputSurface>>,
    video_decoder: Option<Box<dyn MediaCodec>>,
    audio_demuxer: Option<Box<dyn Demuxer>>,
    audio_encoder: Option<Box<dyn MediaCodec>>,
    audio_decoder: Option<Box<dyn MediaCodec>>,
    muxer_started: bool,
}

impl Resources {
    /// Release everything, keeping the first error. The muxer was acquired
    /// last and goes first.
    fn release<T>(&mut self, result: Result<T>, muxer: Option<&mut dyn Muxer>) -> Result<T> {
        let mut failure = ConvertFailure::default();

        if let Some(muxer) = muxer {
            if self.muxer_started {
                failure.record("muxer", muxer.stop());
            }
            failure.record("muxer", muxer.release());
        }
        if let Some(mut codec) = self.audio_decoder.take() {
            failure.record("audio decoder", stop_and_release(codec.as_mut()));
        }
        if let Some(mut codec) = self.audio_encoder.take() {
            failure.record("audio encoder", stop_and_release(codec.as_mut()));
        }
        if let Some(mut demuxer) = self.audio_demuxer.take() {
            failure.record("audio demuxer", demuxer.release());
        }
        if let Some(mut codec) = self.video_decoder.take() {
            failure.record("video decoder", stop_and_release(codec.as_mut()));
        }
        if let Some(mut surface) = self.output_surface.take() {
            failure.record("output surface", surface.release().map_err(Error::from));
        }
        if let Some(mut surface) = self.input_surface.take() {
            failure.record("input surface", surface.release().map_err(Error::from));
        }
        if let Some(mut codec) = self.video_encoder.take() {
            failure.record("video encoder", stop_and_release(codec.as_mut()));
        }
        if let Some(mut demuxer) = self.video_demuxer.take() {
            failure.record("video demuxer", demuxer.release());
        }
        self.muxer_started = false;

        failure.resolve(result)
    }
}

fn stop_and_release(codec: &mut dyn MediaCodec) -> Result<()> {
    let stopped = codec.stop();
    let released = codec.release();
    stopped.and(released)
}

/// The first error of a run and the later ones it suppressed.
#[derive(Debug, Default)]
struct ConvertFailure {
    error: Option<Error>,
    suppressed: Vec<String>,
}

impl ConvertFailure {
    fn record(&mut self, resource: &'static str, result: Result<()>) {
        if let Err(err) = result {
            error!(resource, error = %err, "error while releasing");
            if self.error.is_none() {
                self.error = Some(err);
            } else {
                self.suppressed.push(format!("{}: {}", resource, err));
            }
        }
    }

    fn resolve<T>(mut self, result: Result<T>) -> Result<T> {
        let error = match result {
            Ok(value) => match self.error.take() {
                None => return Ok(value),
                Some(err) => err,
            },
            Err(err) => {
                error!(error = %err, "error converting");
                if let Some(release) = self.error.take() {
                    self.suppressed.insert(0, release.to_string());
                }
                err
            }
        };
        if !self.suppressed.is_empty() {
            warn!(error = %error, suppressed = ?self.suppressed, "conversion failed with suppressed errors");
        }
        Err(error)
    }
}

enum Feed {
    Busy,
    Queued,
    EndOfStream,
}

/// Move one demuxed sample into `decoder`, or end its input once the
/// demuxer runs dry or passes `to_us`.
fn feed_decoder(demuxer: &mut dyn Demuxer, decoder: &mut dyn MediaCodec, to_us: i64) -> Result<Feed> {
    let Some(index) = decoder.dequeue_input_buffer(TIMEOUT)? else {
        return Ok(Feed::Busy);
    };
    let size = demuxer.read_sample_data(decoder.input_buffer(index)?)?;
    match (size, demuxer.sample_time()) {
        (Some(size), Some(pts)) if to_us <= 0 || pts <= to_us => {
            let flags = demuxer.sample_flags() & BufferFlags::SYNC_FRAME;
            decoder.queue_input_buffer(index, BufferInfo::new(0, size, pts, flags))?;
            demuxer.advance();
            Ok(Feed::Queued)
        }
        _ => {
            decoder.queue_input_buffer(index, BufferInfo::new(0, 0, 0, BufferFlags::END_OF_STREAM))?;
            Ok(Feed::EndOfStream)
        }
    }
}

/// Encoder side of one branch.
#[derive(Debug, Default)]
struct EncoderBranch {
    name: &'static str,
    format: Option<MediaFormat>,
    track: Option<usize>,
    done: bool,
    samples: u64,
}

impl EncoderBranch {
    fn new(name: &'static str, present: bool) -> Self {
        Self {
            name,
            done: !present,
            ..Default::default()
        }
    }

    /// Whether samples may flow: until the output format is known, and
    /// again once the muxer runs.
    fn open(&self, muxing: bool) -> bool {
        self.format.is_none() || muxing
    }

    /// Poll the encoder once and mux what it produced.
    fn drain(&mut self, encoder: &mut dyn MediaCodec, muxer: &mut dyn Muxer, muxing: bool, muxing_pts: &mut i64) -> Result<()> {
        match encoder.dequeue_output_buffer(TIMEOUT)? {
            OutputEvent::TryAgainLater => {}
            OutputEvent::FormatChanged => {
                if self.track.is_some() {
                    return Err(CodecError::FormatChangedTwice.into());
                }
                let format = encoder
                    .output_format()
                    .ok_or_else(|| CodecError::Other(format!("{} encoder reported no output format", self.name)))?;
                debug!(branch = self.name, mime = %format.mime, "encoder output format changed");
                self.format = Some(format);
            }
            OutputEvent::Buffer { index, info } => {
                if !muxing {
                    return Err(Error::invalid_state("should have added track before processing output"));
                }
                if info.is_codec_config() {
                    encoder.release_output_buffer(index, false)?;
                    return Ok(());
                }
                if info.size != 0 {
                    let track = self
                        .track
                        .ok_or_else(|| Error::invalid_state(format!("no {} track registered", self.name)))?;
                    muxer.write_sample_data(track, encoder.output_buffer(index)?, &info)?;
                    *muxing_pts = (*muxing_pts).max(info.presentation_time_us);
                    self.samples += 1;
                }
                if info.is_end_of_stream() {
                    debug!(branch = self.name, samples = self.samples, "encoder: EOS");
                    self.done = true;
                }
                encoder.release_output_buffer(index, false)?;
            }
        }
        Ok(())
    }
}

/// Loop state of one run.
struct Pump {
    from_us: i64,
    to_us: i64,
    video_extractor_done: bool,
    video_decoder_done: bool,
    audio_extractor_done: bool,
    audio_decoder_done: bool,
    pending_audio: Option<(usize, BufferInfo)>,
    video: EncoderBranch,
    audio: EncoderBranch,
    muxing: bool,
    muxing_pts: i64,
    percent: u8,
    video_extracted: u64,
    video_decoded: u64,
    audio_extracted: u64,
    audio_decoded: u64,
}

impl Pump {
    fn new(res: &Resources, from_us: i64, to_us: i64) -> Self {
        Self {
            from_us,
            to_us,
            video_extractor_done: res.video_demuxer.is_none(),
            video_decoder_done: res.video_decoder.is_none(),
            audio_extractor_done: res.audio_demuxer.is_none(),
            audio_decoder_done: res.audio_decoder.is_none(),
            pending_audio: None,
            video: EncoderBranch::new("video", res.video_encoder.is_some()),
            audio: EncoderBranch::new("audio", res.audio_encoder.is_some()),
            muxing: false,
            muxing_pts: 0,
            percent: 0,
            video_extracted: 0,
            video_decoded: 0,
            audio_extracted: 0,
            audio_decoded: 0,
        }
    }

    fn finished(&self) -> bool {
        self.video.done && self.audio.done
    }

    /// Every present encoder has reported its output format.
    fn ready_to_mux(&self) -> bool {
        let ready = |branch: &EncoderBranch| branch.done || branch.format.is_some();
        ready(&self.video) && ready(&self.audio) && (self.video.format.is_some() || self.audio.format.is_some())
    }

    fn start_muxing(&mut self, muxer: &mut dyn Muxer, rotation: i32) -> Result<()> {
        if let Some(format) = &self.video.format {
            let track = muxer.add_track(format)?;
            debug!(track, "muxer: adding video track");
            self.video.track = Some(track);
            if rotation != 0 {
                muxer.set_orientation_hint(rotation)?;
            }
        }
        if let Some(format) = &self.audio.format {
            let track = muxer.add_track(format)?;
            debug!(track, "muxer: adding audio track");
            self.audio.track = Some(track);
        }
        muxer.start()?;
        info!("muxer started");
        self.muxing = true;
        Ok(())
    }

    /// One iteration: each stage moves at most one buffer.
    fn step(&mut self, res: &mut Resources, muxer: &mut dyn Muxer) -> Result<()> {
        let video_open = self.video.open(self.muxing);
        let audio_open = self.audio.open(self.muxing);

        if !self.video_extractor_done && video_open {
            if let (Some(demuxer), Some(decoder)) = (res.video_demuxer.as_deref_mut(), res.video_decoder.as_deref_mut()) {
                match feed_decoder(demuxer, decoder, self.to_us)? {
                    Feed::Queued => self.video_extracted += 1,
                    Feed::EndOfStream => {
                        debug!(samples = self.video_extracted, "video extractor: EOS");
                        self.video_extractor_done = true;
                    }
                    Feed::Busy => {}
                }
            }
        }

        if !self.audio_extractor_done && audio_open {
            if let (Some(demuxer), Some(decoder)) = (res.audio_demuxer.as_deref_mut(), res.audio_decoder.as_deref_mut()) {
                match feed_decoder(demuxer, decoder, self.to_us)? {
                    Feed::Queued => self.audio_extracted += 1,
                    Feed::EndOfStream => {
                        debug!(samples = self.audio_extracted, "audio extractor: EOS");
                        self.audio_extractor_done = true;
                    }
                    Feed::Busy => {}
                }
            }
        }

        if !self.video_decoder_done && video_open {
            self.drain_video_decoder(res)?;
        }

        if !self.audio_decoder_done && self.pending_audio.is_none() && audio_open {
            self.drain_audio_decoder(res)?;
        }

        if self.pending_audio.is_some() {
            self.feed_audio_encoder(res)?;
        }

        if !self.video.done && video_open {
            if let Some(encoder) = res.video_encoder.as_deref_mut() {
                self.video.drain(encoder, muxer, self.muxing, &mut self.muxing_pts)?;
            }
        }

        if !self.audio.done && audio_open {
            if let Some(encoder) = res.audio_encoder.as_deref_mut() {
                self.audio.drain(encoder, muxer, self.muxing, &mut self.muxing_pts)?;
            }
        }
        Ok(())
    }

    /// Render one decoded frame through the shader onto the encoder surface.
    /// Frames before the trim start are decoded but not rendered.
    fn drain_video_decoder(&mut self, res: &mut Resources) -> Result<()> {
        let (Some(decoder), Some(encoder), Some(output), Some(input)) = (
            res.video_decoder.as_deref_mut(),
            res.video_encoder.as_deref_mut(),
            res.output_surface.as_deref_mut(),
            res.input_surface.as_deref_mut(),
        ) else {
            return Ok(());
        };

        match decoder.dequeue_output_buffer(TIMEOUT)? {
            OutputEvent::TryAgainLater => {}
            OutputEvent::FormatChanged => {
                debug!(format = ?decoder.output_format(), "video decoder: output format changed");
            }
            OutputEvent::Buffer { index, info } => {
                if info.is_codec_config() {
                    decoder.release_output_buffer(index, false)?;
                    return Ok(());
                }
                let render = info.size != 0 && info.presentation_time_us >= self.from_us;
                decoder.release_output_buffer(index, render)?;
                if render {
                    render_frame(output, input, info.presentation_time_us)?;
                    self.video_decoded += 1;
                }
                if info.is_end_of_stream() {
                    debug!(frames = self.video_decoded, "video decoder: EOS");
                    self.video_decoder_done = true;
                    encoder.signal_end_of_input_stream()?;
                }
            }
        }
        Ok(())
    }

    /// Take one decoded PCM buffer and hold it until the encoder has room.
    fn drain_audio_decoder(&mut self, res: &mut Resources) -> Result<()> {
        let Some(decoder) = res.audio_decoder.as_deref_mut() else {
            return Ok(());
        };

        match decoder.dequeue_output_buffer(TIMEOUT)? {
            OutputEvent::TryAgainLater => {}
            OutputEvent::FormatChanged => {
                debug!(format = ?decoder.output_format(), "audio decoder: output format changed");
            }
            OutputEvent::Buffer { index, info } => {
                let before_window = info.presentation_time_us < self.from_us && !info.is_end_of_stream();
                if info.is_codec_config() || before_window {
                    decoder.release_output_buffer(index, false)?;
                    return Ok(());
                }
                self.pending_audio = Some((index, info));
                self.audio_decoded += 1;
            }
        }
        Ok(())
    }

    /// Copy the pending PCM buffer into a free encoder input slot.
    fn feed_audio_encoder(&mut self, res: &mut Resources) -> Result<()> {
        let (Some((pending, info)), Some(decoder), Some(encoder)) = (
            self.pending_audio,
            res.audio_decoder.as_deref_mut(),
            res.audio_encoder.as_deref_mut(),
        ) else {
            return Ok(());
        };
        let Some(slot) = encoder.dequeue_input_buffer(TIMEOUT)? else {
            return Ok(());
        };

        let pcm = decoder.output_buffer(pending)?;
        let payload = pcm.get(info.offset..info.offset + info.size).ok_or_else(|| {
            CodecError::Other(format!(
                "decoded audio range {}..{} exceeds buffer of {} bytes",
                info.offset,
                info.offset + info.size,
                pcm.len()
            ))
        })?;
        let input = encoder.input_buffer(slot)?;
        input.clear();
        input.extend_from_slice(payload);
        encoder.queue_input_buffer(slot, BufferInfo::new(0, info.size, info.presentation_time_us, info.flags))?;

        decoder.release_output_buffer(pending, false)?;
        self.pending_audio = None;
        if info.is_end_of_stream() {
            debug!(buffers = self.audio_decoded, "audio decoder: EOS");
            self.audio_decoder_done = true;
        }
        Ok(())
    }
}
