//! End-to-end conversion tests over the in-memory media stack.

mod support;

use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use support::{frames_between, FakeBackend, FakeTrack, HEVC};
use transcode::{ConvertOptions, Error, Mp4Info, Outcome, Stage, VideoCodec, VideoConverter};
use transcode_core::format::{MIME_AUDIO_AAC, MIME_VIDEO_AVC};
use transcode_gpu::shaders::IDENTITY_FRAGMENT_SHADER;

fn source_4s() -> Vec<FakeTrack> {
    vec![FakeTrack::video(1920, 1080, 4), FakeTrack::audio(44_100, 4)]
}

/// Record every percent the listener sees.
fn recording_listener(seen: &Arc<Mutex<Vec<u8>>>) -> impl FnMut(u8) -> bool + Send + 'static {
    let seen = Arc::clone(seen);
    move |percent| {
        seen.lock().push(percent);
        false
    }
}

// =============================================================================
// Whole-stream conversion
// =============================================================================

#[test]
fn test_whole_stream_streamable() {
    let backend = FakeBackend::new(source_4s());
    let encoder_format = backend.video_encoder_format.clone();
    let audio_format = backend.audio_encoder_format.clone();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let options = ConvertOptions::new().short_side(720).streamable(true);
    let mut converter = VideoConverter::new(backend, "in.mp4", options)
        .unwrap()
        .on_progress(recording_listener(&seen));
    let handle = converter.progress_handle();
    let (report, bytes) = converter.convert_to_vec().unwrap();

    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.stats.video_samples, 120);
    assert_eq!(report.stats.audio_samples, 173);
    assert_eq!(report.stats.bytes_written, Some(bytes.len() as u64));
    assert_eq!(handle.stage(), Stage::Done);

    let format = encoder_format.borrow().clone().unwrap();
    assert_eq!((format.width, format.height), (Some(1280), Some(720)));
    assert_eq!(format.mime, MIME_VIDEO_AVC);
    assert_eq!(format.bit_rate, Some(2_000_000));
    assert_eq!(format.frame_rate, Some(30));
    assert_eq!(format.i_frame_interval, Some(10));

    let audio = audio_format.borrow().clone().unwrap();
    assert_eq!(audio.mime, MIME_AUDIO_AAC);
    assert_eq!((audio.sample_rate, audio.channel_count), (Some(44_100), Some(2)));
    assert_eq!(audio.bit_rate, Some(128_000));
    assert_eq!(audio.aac_profile, Some(2));

    let info = Mp4Info::from_bytes(&bytes).unwrap();
    assert!(info.is_fast_start());
    let video = info.video_track().unwrap();
    assert_eq!(video.sample_entry, "avc1");
    assert_eq!((video.width, video.height), (1280, 720));
    assert_eq!(video.sample_count, 120);
    assert_eq!(video.sync_sample_count, Some(4));
    assert_eq!(info.audio_track().unwrap().sample_count, 173);

    let seen = seen.lock();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "progress not increasing: {:?}", seen);
    assert!(*seen.last().unwrap() >= 99);
}

#[test]
fn test_convert_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.mp4");

    let options = ConvertOptions::new().streamable(false);
    let mut converter = VideoConverter::new(FakeBackend::new(source_4s()), "in.mp4", options).unwrap();
    let report = converter.convert(&output).unwrap();

    let bytes = std::fs::read(&output).unwrap();
    assert_eq!(report.stats.bytes_written, Some(bytes.len() as u64));
    let info = Mp4Info::from_bytes(&bytes).unwrap();
    assert!(!info.is_fast_start());
    assert_eq!(info.atoms.last().unwrap().kind, "moov");
    // No resize requested: the source size is kept.
    assert_eq!(info.video_track().unwrap().width, 1920);
}

#[test]
fn test_convert_to_file_streamable() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.mp4");

    let options = ConvertOptions::new().short_side(360).streamable(true);
    let mut converter = VideoConverter::new(FakeBackend::new(source_4s()), "in.mp4", options).unwrap();
    converter.convert(&output).unwrap();

    let info = Mp4Info::read(&mut std::fs::File::open(&output).unwrap()).unwrap();
    assert!(info.is_fast_start());
    assert_eq!(info.video_track().unwrap().sample_count, 120);
}

// =============================================================================
// Trimming
// =============================================================================

#[test]
fn test_trim_window() {
    let tracks = vec![FakeTrack::video(1280, 720, 5), FakeTrack::audio(44_100, 5)];
    let backend = FakeBackend::new(tracks.clone());
    let log = backend.log.clone();

    let options = ConvertOptions::new().time_range(2_500_000, 3_000_000);
    let mut converter = VideoConverter::new(backend, "in.mp4", options).unwrap();
    let (report, bytes) = converter.convert_to_vec().unwrap();

    let expected_video = frames_between(&tracks[0], 2_500_000, 3_000_000);
    assert_eq!(expected_video, 16);
    assert_eq!(report.stats.video_samples, 16);
    assert_eq!(report.stats.audio_samples, 22);
    assert_eq!(report.stats.last_pts_us, 3_000_000);

    // Both demuxers seek to the key frame before the window.
    let seeks: Vec<String> = log.borrow().iter().filter(|e| e.starts_with("seek")).cloned().collect();
    assert_eq!(seeks, vec!["seek video demuxer 2500000", "seek audio demuxer 2500000"]);

    let info = Mp4Info::from_bytes(&bytes).unwrap();
    let video = info.video_track().unwrap();
    assert_eq!(video.sample_count, 16);
    assert_eq!(video.tables.stss.as_deref(), Some(&[1][..]));
    assert_eq!(info.audio_track().unwrap().sample_count, 22);
}

#[test]
fn test_trim_to_end() {
    let tracks = vec![FakeTrack::video(640, 480, 3)];
    let options = ConvertOptions::new().time_range(2_000_000, 0);
    let mut converter = VideoConverter::new(FakeBackend::new(tracks.clone()), "in.mp4", options).unwrap();
    let (report, _) = converter.convert_to_vec().unwrap();

    assert_eq!(report.stats.video_samples as usize, frames_between(&tracks[0], 2_000_000, 3_000_000));
    assert_eq!(report.stats.video_samples, 30);
}

// =============================================================================
// Geometry
// =============================================================================

#[test]
fn test_rotated_source() {
    let backend = FakeBackend::new(vec![FakeTrack::video(1920, 1080, 2).rotated(90)]);
    let encoder_format = backend.video_encoder_format.clone();

    // 720 is the short side of the portrait display size.
    let options = ConvertOptions::new().short_side(720);
    let mut converter = VideoConverter::new(backend, "in.mp4", options).unwrap();
    let (_, bytes) = converter.convert_to_vec().unwrap();

    let format = encoder_format.borrow().clone().unwrap();
    assert_eq!((format.width, format.height), (Some(1280), Some(720)));

    let info = Mp4Info::from_bytes(&bytes).unwrap();
    assert_eq!(info.video_track().unwrap().rotation, Some(90));
}

#[test]
fn test_shader_choice() {
    let backend = FakeBackend::new(vec![FakeTrack::video(1920, 1080, 1)]);
    let texture = backend.texture.clone();
    let mut converter = VideoConverter::new(backend, "in.mp4", ConvertOptions::new().short_side(720)).unwrap();
    converter.convert_to_vec().unwrap();
    assert_eq!(texture.borrow().shader.as_deref(), Some(IDENTITY_FRAGMENT_SHADER));
    assert_eq!(texture.borrow().drawn, 30);

    let backend = FakeBackend::new(vec![FakeTrack::video(3840, 2160, 1)]);
    let texture = backend.texture.clone();
    let mut converter = VideoConverter::new(backend, "in.mp4", ConvertOptions::new().short_side(360)).unwrap();
    converter.convert_to_vec().unwrap();
    let shader = texture.borrow().shader.clone().unwrap();
    assert_ne!(shader, IDENTITY_FRAGMENT_SHADER);
    assert!(shader.contains("finalColor"));
}

#[test]
fn test_exact_frame_size() {
    let backend = FakeBackend::new(vec![FakeTrack::video(1920, 1080, 1)]);
    let encoder_format = backend.video_encoder_format.clone();
    let options = ConvertOptions::new().frame_size(1000, 562);
    let mut converter = VideoConverter::new(backend, "in.mp4", options).unwrap();
    converter.convert_to_vec().unwrap();

    let format = encoder_format.borrow().clone().unwrap();
    assert_eq!((format.width, format.height), (Some(1000), Some(562)));
}

// =============================================================================
// Track combinations
// =============================================================================

#[test]
fn test_video_only() {
    let backend = FakeBackend::new(vec![FakeTrack::video(640, 480, 2)]);
    let log = backend.log.clone();
    let mut converter = VideoConverter::new(backend, "in.mp4", ConvertOptions::new()).unwrap();
    let (report, bytes) = converter.convert_to_vec().unwrap();

    assert_eq!(report.stats.audio_samples, 0);
    let info = Mp4Info::from_bytes(&bytes).unwrap();
    assert_eq!(info.tracks.len(), 1);
    assert!(info.audio_track().is_none());
    // The audio demuxer found nothing and was closed right away.
    assert!(log.borrow().iter().any(|e| e == "release idle demuxer"));
    assert!(!log.borrow().iter().any(|e| e == "create audio encoder"));
}

#[test]
fn test_audio_only() {
    let backend = FakeBackend::new(vec![FakeTrack::audio(48_000, 2)]);
    let log = backend.log.clone();
    let mut converter = VideoConverter::new(backend, "in.mp4", ConvertOptions::new()).unwrap();
    let (report, bytes) = converter.convert_to_vec().unwrap();

    assert_eq!(report.stats.video_samples, 0);
    assert_eq!(report.stats.audio_samples, 94);
    let info = Mp4Info::from_bytes(&bytes).unwrap();
    assert!(info.video_track().is_none());
    assert_eq!(info.audio_track().unwrap().timescale, 48_000);
    assert!(!log.borrow().iter().any(|e| e == "make current"));
}

#[test]
fn test_no_tracks() {
    let backend = FakeBackend::new(Vec::new());
    let log = backend.log.clone();
    let mut converter = VideoConverter::new(backend, "in.mp4", ConvertOptions::new()).unwrap();
    let err = converter.convert_to_vec().unwrap_err();

    assert!(matches!(err, Error::BadMedia(_)), "{}", err);
    assert_eq!(FakeBackend::releases(&log), vec!["release idle demuxer", "release idle demuxer"]);
}

// =============================================================================
// Codec selection
// =============================================================================

#[test]
fn test_missing_video_encoder() {
    let backend = FakeBackend::new(source_4s());
    let options = ConvertOptions::new().video_codec(VideoCodec::H265);
    match VideoConverter::new(backend, "in.mp4", options) {
        Err(Error::UnsupportedCodec(mime)) => assert_eq!(mime, HEVC),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("converter created without an H.265 encoder"),
    }
}

#[test]
fn test_missing_audio_encoder() {
    let backend = FakeBackend::new(source_4s()).with_encoders(&[MIME_VIDEO_AVC]);
    let log = backend.log.clone();
    let mut converter = VideoConverter::new(backend, "in.mp4", ConvertOptions::new()).unwrap();

    match converter.convert_to_vec() {
        Err(Error::UnsupportedCodec(mime)) => assert_eq!(mime, MIME_AUDIO_AAC),
        other => panic!("unexpected result: {:?}", other.map(|(report, _)| report)),
    }
    // The video branch was already built and is torn down.
    assert_eq!(
        FakeBackend::releases(&log),
        vec![
            "release audio demuxer",
            "release video decoder",
            "release output surface",
            "release input surface",
            "release video encoder",
            "release video demuxer",
        ]
    );
}

#[test]
fn test_invalid_options() {
    let options = ConvertOptions::new().time_range(3_000_000, 1_000_000);
    assert!(matches!(
        VideoConverter::new(FakeBackend::new(source_4s()), "in.mp4", options),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_hevc_output() {
    let backend = FakeBackend::new(source_4s()).with_encoders(&[HEVC, MIME_AUDIO_AAC]);
    let options = ConvertOptions::new().video_codec(VideoCodec::H265).short_side(720);
    let mut converter = VideoConverter::new(backend, "in.mp4", options).unwrap();
    let (report, bytes) = converter.convert_to_vec().unwrap();
    assert_eq!(report.stats.video_samples, 120);

    let info = Mp4Info::from_bytes(&bytes).unwrap();
    let video = info.video_track().unwrap();
    assert_eq!(video.sample_entry, "hvc1");
    assert_eq!((video.width, video.height), (1280, 720));
    assert_eq!(video.sample_count, 120);

    // hvcC carries the encoder's profile.
    let sps = transcode_hevc::Sps::parse_nal(&support::hevc_sps(1280, 720)).unwrap();
    let at = bytes.windows(4).position(|w| w == b"hvcC").unwrap();
    assert_eq!(bytes[at + 4], 1);
    assert_eq!(bytes[at + 5] & 0x1F, sps.profile_tier_level.general_profile_idc);
}

// =============================================================================
// Cancellation
// =============================================================================

#[test]
fn test_cancel_from_listener() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("partial.mp4");

    let options = ConvertOptions::new().streamable(true);
    let mut converter = VideoConverter::new(FakeBackend::new(source_4s()), "in.mp4", options)
        .unwrap()
        .on_progress(|percent| percent >= 50);
    let handle = converter.progress_handle();
    let report = converter.convert(&output).unwrap();

    assert!(report.is_cancelled());
    assert!(handle.percent() >= 50);
    assert!(report.stats.video_samples < 120);

    // The partial output is finalized but left as written.
    let info = Mp4Info::from_bytes(&std::fs::read(&output).unwrap()).unwrap();
    assert!(!info.is_fast_start());
    assert!(info.video_track().unwrap().sample_count > 0);
}

#[test]
fn test_cancel_before_start() {
    let backend = FakeBackend::new(source_4s());
    let log = backend.log.clone();
    let mut converter = VideoConverter::new(backend, "in.mp4", ConvertOptions::new()).unwrap();
    converter.progress_handle().cancel();

    let (report, bytes) = converter.convert_to_vec().unwrap();
    assert_eq!(report.outcome, Outcome::Cancelled);
    assert!(bytes.is_empty());
    assert_eq!(FakeBackend::releases(&log).len(), 8);
}

// =============================================================================
// Release
// =============================================================================

#[test]
fn test_release_order() {
    let backend = FakeBackend::new(source_4s());
    let log = backend.log.clone();
    let mut converter = VideoConverter::new(backend, "in.mp4", ConvertOptions::new()).unwrap();
    converter.convert_to_vec().unwrap();

    assert_eq!(
        FakeBackend::releases(&log),
        vec![
            "release audio decoder",
            "release audio encoder",
            "release audio demuxer",
            "release video decoder",
            "release output surface",
            "release input surface",
            "release video encoder",
            "release video demuxer",
        ]
    );
    // Every codec is stopped before it is released.
    let log = log.borrow();
    for codec in ["audio decoder", "audio encoder", "video decoder", "video encoder"] {
        let stop = log.iter().position(|e| *e == format!("stop {}", codec)).unwrap();
        let release = log.iter().position(|e| *e == format!("release {}", codec)).unwrap();
        assert!(stop < release, "{} released before stop", codec);
    }
    assert!(log.iter().any(|e| e == "end of input video encoder"));
}

#[test]
fn test_first_release_error_wins() {
    let backend = FakeBackend::new(source_4s()).failing_release(&["audio decoder", "video encoder"]);
    let log = backend.log.clone();
    let mut converter = VideoConverter::new(backend, "in.mp4", ConvertOptions::new()).unwrap();

    let err = converter.convert_to_vec().unwrap_err();
    assert_eq!(err.to_string(), "Codec error: audio decoder release failed");
    // A failed release does not stop the rest.
    assert_eq!(FakeBackend::releases(&log).len(), 8);
}

#[test]
fn test_conversion_error_beats_release_error() {
    let backend = FakeBackend::new(source_4s())
        .failing_render()
        .failing_release(&["video encoder"]);
    let log = backend.log.clone();
    let mut converter = VideoConverter::new(backend, "in.mp4", ConvertOptions::new()).unwrap();

    let err = converter.convert_to_vec().unwrap_err();
    assert_eq!(err.to_string(), "Codec error: Frame wait timed out after 2500ms");
    assert_eq!(FakeBackend::releases(&log).len(), 8);
}
