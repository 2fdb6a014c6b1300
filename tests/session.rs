mod support;

use std::sync::atomic::Ordering;

use livemux::livemux_codec::{find_encoder, CodecId, MediaKind};
use livemux::{EncoderSet, SessionConfig, SessionState, Sink, StreamError, StreamSession};
use support::{
    flv_tags, metadata_number, packets, BrokenPipe, ClosablePipe, MuxEvent, RecordingEncoder, RecordingMuxer,
    SharedBuffer,
};

const TAG_AUDIO: u8 = 8;
const TAG_VIDEO: u8 = 9;
const TAG_SCRIPT: u8 = 18;

fn push_gray_frame(session: &mut StreamSession, width: u32, height: u32, shade: u8) {
    let row = vec![shade; width as usize * 3];
    for y in 0..height {
        session.push_video_scanline(y, &row).unwrap();
    }
    session.push_video_frame().unwrap();
}

fn recording_session(config: SessionConfig) -> (
    StreamSession,
    std::sync::Arc<std::sync::Mutex<Vec<MuxEvent>>>,
    std::sync::Arc<std::sync::Mutex<support::EncoderLog>>,
    std::sync::Arc<std::sync::Mutex<support::EncoderLog>>,
) {
    let (muxer, events) = RecordingMuxer::new();
    let (video, video_log) =
        RecordingEncoder::wrap(find_encoder(CodecId::ScreenVideo).unwrap().create());
    let (audio, audio_log) =
        RecordingEncoder::wrap(find_encoder(CodecId::PcmS16Le).unwrap().create());
    let mut session = StreamSession::new();
    session
        .init_with(
            Box::new(muxer),
            Sink::stream(std::io::sink()),
            config,
            EncoderSet {
                video: Some(video),
                audio: Some(audio),
            },
        )
        .unwrap();
    (session, events, video_log, audio_log)
}

#[test]
fn test_video_pts_step_one_tick_per_frame() {
    let (mut session, events, _, _) = recording_session(SessionConfig::new(320, 240, 25));
    for i in 0..25 {
        push_gray_frame(&mut session, 320, 240, i as u8);
    }
    session.cleanup().unwrap();

    let video = packets(&events, 0);
    assert_eq!(video.len(), 25);
    let pts: Vec<i64> = video.iter().map(|p| p.pts).collect();
    assert_eq!(pts, (0..25).collect::<Vec<_>>());
    assert!(video.iter().all(|p| p.duration == 1 && p.dts == p.pts));
    assert_eq!(session.frames(), 25);
}

#[test]
fn test_full_frame_pushes_encode_immediately() {
    let (mut session, events, _, audio_log) =
        recording_session(SessionConfig::new(64, 64, 25).variable_frame_samples(1000));
    assert_eq!(session.audio_frame_bytes(), Some(4000));

    let block = vec![1u8; 4000];
    for i in 0..10 {
        session.push_audio_samples(1000, &block).unwrap();
        assert_eq!(session.audio_buffered_bytes(), Some(0));
        assert_eq!(audio_log.lock().unwrap().frames.len(), i + 1);
    }
    session.cleanup().unwrap();

    let audio = packets(&events, 1);
    let pts: Vec<i64> = audio.iter().map(|p| p.pts).collect();
    assert_eq!(pts, (0..10).map(|i| i * 1000).collect::<Vec<_>>());
    assert!(audio.iter().all(|p| p.size == 4000));
}

#[test]
fn test_cleanup_drains_both_encoders_before_trailer() {
    let (mut session, events, video_log, audio_log) =
        recording_session(SessionConfig::new(64, 64, 25).variable_frame_samples(1000));
    push_gray_frame(&mut session, 64, 64, 10);
    session.push_audio_samples(1500, &[0u8; 6000]).unwrap();
    assert_eq!(session.audio_buffered_bytes(), Some(2000));

    session.cleanup().unwrap();
    assert_eq!(session.state(), SessionState::Closed);

    for log in [&video_log, &audio_log] {
        let log = log.lock().unwrap();
        assert_eq!(log.flushes, 1);
        assert!(log.drained);
    }
    // The partial frame went out short at cleanup.
    assert_eq!(audio_log.lock().unwrap().frames, [(0, 1000), (1000, 500)]);

    let events = events.lock().unwrap();
    assert_eq!(events.first(), Some(&MuxEvent::StreamAdded { index: 0, codec: CodecId::ScreenVideo }));
    assert_eq!(events.last(), Some(&MuxEvent::Trailer));
    let header = events.iter().position(|e| *e == MuxEvent::Header).unwrap();
    assert!(events[header + 1..]
        .iter()
        .all(|e| matches!(e, MuxEvent::Packet(_) | MuxEvent::Trailer)));
}

#[test]
fn test_scanline_past_last_row_rejected() {
    let (mut session, _, _, _) = recording_session(SessionConfig::new(32, 16, 25));
    let row = vec![0u8; 32 * 3];
    session.push_video_scanline(15, &row).unwrap();
    assert!(matches!(
        session.push_video_scanline(16, &row),
        Err(StreamError::ScanlineOutOfRange { row: 16, height: 16 })
    ));
}

#[test]
fn test_flv_file_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.flv");

    let mut session = StreamSession::new();
    session
        .init(path.as_path(), SessionConfig::new(320, 240, 25))
        .unwrap();
    for i in 0..25 {
        push_gray_frame(&mut session, 320, 240, (i * 10) as u8);
    }
    session.cleanup().unwrap();

    let data = std::fs::read(&path).unwrap();
    let tags = flv_tags(&data);
    assert_eq!(tags[0].tag_type, TAG_SCRIPT);

    let video: Vec<_> = tags.iter().filter(|t| t.tag_type == TAG_VIDEO).collect();
    assert_eq!(video.len(), 25);
    for (n, tag) in video.iter().enumerate() {
        assert_eq!(tag.timestamp, n as u32 * 40);
        assert_eq!(tag.body[0] & 0x0f, 3);
    }
    // Keyframe every 12 frames.
    assert_eq!(video[0].body[0] >> 4, 1);
    assert_eq!(video[1].body[0] >> 4, 2);
    assert_eq!(video[12].body[0] >> 4, 1);
    assert!(tags.iter().all(|t| t.tag_type != TAG_AUDIO));

    assert_eq!(metadata_number(&data, "duration"), Some(1.0));
    assert_eq!(metadata_number(&data, "filesize"), Some(data.len() as f64));
    assert_eq!(metadata_number(&data, "width"), Some(320.0));
}

#[test]
fn test_live_sink_interleaves_audio_and_video() {
    let (buffer, bytes) = SharedBuffer::new();
    let mut session = StreamSession::new();
    session
        .init(Sink::stream(buffer), SessionConfig::new(64, 64, 25).variable_frame_samples(1764))
        .unwrap();
    // 40 ms of audio per video frame.
    for i in 0..5 {
        push_gray_frame(&mut session, 64, 64, i * 40);
        session.push_audio_samples(1764, &vec![0u8; 1764 * 4]).unwrap();
    }
    session.cleanup().unwrap();

    let data = bytes.lock().unwrap().clone();
    let tags = flv_tags(&data);
    let timestamps: Vec<u32> = tags.iter().skip(1).map(|t| t.timestamp).collect();
    assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(tags.iter().filter(|t| t.tag_type == TAG_AUDIO).count(), 5);
    assert_eq!(tags.iter().filter(|t| t.tag_type == TAG_VIDEO).count(), 5);
    // Not seekable: metadata keeps its placeholders.
    assert_eq!(metadata_number(&data, "duration"), Some(0.0));
}

#[test]
fn test_missing_directory_is_io_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("out.flv");
    let mut session = StreamSession::new();
    assert!(matches!(
        session.init(path.as_path(), SessionConfig::new(64, 64, 25)),
        Err(StreamError::IoFailure(_))
    ));
    session.cleanup().unwrap();
}

#[test]
fn test_broken_sink_fails_header() {
    let mut session = StreamSession::new();
    assert!(matches!(
        session.init(Sink::stream(BrokenPipe), SessionConfig::new(64, 64, 25)),
        Err(StreamError::HeaderWriteFailure(_))
    ));
    assert_eq!(session.state(), SessionState::Uninitialized);
    session.cleanup().unwrap();
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_unlisted_sample_rate_falls_back() {
    // PCM advertises its rates, so an unlisted preference falls back to the
    // first listed one instead of failing.
    let mut session = StreamSession::new();
    session
        .init(
            Sink::stream(std::io::sink()),
            SessionConfig::new(64, 64, 25).sample_rate(48000),
        )
        .unwrap();
    assert_eq!(session.audio().unwrap().params().sample_rate, 5512);
    session.cleanup().unwrap();
}

#[test]
fn test_sink_failure_mid_stream_reaches_caller() {
    let (pipe, closed) = ClosablePipe::new();
    let mut session = StreamSession::new();
    session
        .init(Sink::stream(pipe), SessionConfig::new(64, 64, 25).variable_frame_samples(1764))
        .unwrap();
    closed.store(true, Ordering::SeqCst);

    // Video waits in the interleave queue until audio arrives.
    push_gray_frame(&mut session, 64, 64, 0);
    assert!(matches!(
        session.push_audio_samples(1764, &vec![0u8; 1764 * 4]),
        Err(StreamError::MuxWriteFailure {
            kind: MediaKind::Audio,
            ..
        })
    ));
    assert_eq!(session.audio_samples(), 0);

    assert!(matches!(
        session.cleanup(),
        Err(StreamError::TrailerWriteFailure(_))
    ));
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_sink_failure_at_trailer_reaches_caller() {
    let (pipe, closed) = ClosablePipe::new();
    let mut session = StreamSession::new();
    session
        .init(Sink::stream(pipe), SessionConfig::new(64, 64, 25))
        .unwrap();
    push_gray_frame(&mut session, 64, 64, 0);
    closed.store(true, Ordering::SeqCst);

    assert!(matches!(
        session.cleanup(),
        Err(StreamError::TrailerWriteFailure(_))
    ));
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.frames(), 1);
}
