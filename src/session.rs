//! Session lifecycle: `init`, ingestion, `cleanup`.

use std::io;

use livemux_codec::Encoder;
use tracing::{error, info, warn};

use crate::error::{Result, StreamError};
use crate::frame_buffer::SOURCE_SAMPLE_BYTES;
use crate::mux::{create_muxer, Muxer};
use crate::pipeline::{AudioPipeline, VideoPipeline};
use crate::writer::InterleavedWriter;
use crate::{ContainerFormat, MuxError, OutputTarget, SessionConfig, Sink};

/// Lifecycle of a [`StreamSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Not opened yet, or `init` failed part way.
    #[default]
    Uninitialized,
    /// Header written; ingestion calls are accepted.
    Opened,
    /// Trailer written and everything released. Terminal.
    Closed,
}

/// Encoders to use instead of the registry lookup.
#[derive(Default)]
pub struct EncoderSet {
    pub video: Option<Box<dyn Encoder>>,
    pub audio: Option<Box<dyn Encoder>>,
}

/// One recording: a container with up to one video and one audio stream.
///
/// All calls are synchronous; each ingestion call converts, encodes and
/// writes before returning.
///
/// ```ignore
/// let mut session = StreamSession::new();
/// session.init("out.flv", SessionConfig::new(320, 240, 25))?;
/// for row in 0..240 {
///     session.push_video_scanline(row, &pixels[row as usize])?;
/// }
/// session.push_video_frame()?;
/// session.push_audio_samples(samples.len() / 4, &samples)?;
/// session.cleanup()?;
/// ```
#[derive(Debug, Default)]
pub struct StreamSession {
    state: SessionState,
    writer: Option<InterleavedWriter>,
    video: Option<VideoPipeline>,
    audio: Option<AudioPipeline>,
    header_written: bool,
    frames: u64,
    audio_samples: u64,
}

impl StreamSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the output and both streams, and write the container header.
    ///
    /// The container comes from `config.format`, else the target's file
    /// extension. On failure the session may hold partially opened
    /// resources; call [`cleanup`](Self::cleanup) regardless.
    pub fn init(&mut self, target: impl Into<OutputTarget>, config: SessionConfig) -> Result<()> {
        let target = target.into();
        let format = match (config.format, target.path()) {
            (Some(format), _) => format,
            (None, Some(path)) => ContainerFormat::from_path(path).ok_or_else(|| {
                error!(path = %path.display(), "could not deduce output format from file extension");
                StreamError::UnsupportedFormat(format!("no container for {}", path.display()))
            })?,
            (None, None) => ContainerFormat::default(),
        };
        self.init_with(create_muxer(format), target, config, EncoderSet::default())
    }

    /// Like [`init`](Self::init), with an explicit muxer and optional
    /// encoder overrides.
    pub fn init_with(
        &mut self,
        muxer: Box<dyn Muxer>,
        target: impl Into<OutputTarget>,
        config: SessionConfig,
        encoders: EncoderSet,
    ) -> Result<()> {
        if self.state != SessionState::Uninitialized || self.writer.is_some() {
            return Err(StreamError::InvalidState {
                operation: "init",
                state: self.state,
            });
        }
        let target = target.into();
        info!(
            format = muxer.name(),
            width = config.width,
            height = config.height,
            fps = config.fps,
            "initializing stream session"
        );

        let writer = self.writer.insert(InterleavedWriter::new(muxer));
        let muxer = writer.muxer_mut();

        let video_codec = config.video_codec.or(muxer.default_video_codec());
        self.video = match (encoders.video, video_codec) {
            (Some(encoder), _) => Some(VideoPipeline::open_with_encoder(encoder, muxer, &config)?),
            (None, Some(codec)) => Some(VideoPipeline::open(muxer, &config, codec)?),
            (None, None) => None,
        };
        let audio_codec = config.audio_codec.or(muxer.default_audio_codec());
        self.audio = match (encoders.audio, audio_codec) {
            (Some(encoder), _) => Some(AudioPipeline::open_with_encoder(encoder, muxer, &config)?),
            (None, Some(codec)) => Some(AudioPipeline::open(muxer, &config, codec)?),
            (None, None) => None,
        };

        if !muxer.flags().no_file {
            let sink = match target {
                OutputTarget::Path(path) => Sink::create(&path).map_err(|e| {
                    error!(path = %path.display(), error = %e, "could not open output");
                    StreamError::IoFailure(e)
                })?,
                OutputTarget::Sink(sink) => sink,
            };
            muxer.open(sink).map_err(|e| {
                error!(error = %e, "could not attach output");
                StreamError::IoFailure(match e {
                    MuxError::Io(e) => e,
                    other => io::Error::other(other),
                })
            })?;
        }

        muxer.write_header().map_err(|e| {
            error!(error = %e, "error occurred when writing header");
            StreamError::HeaderWriteFailure(e)
        })?;
        self.header_written = true;
        self.state = SessionState::Opened;
        info!(
            video = self.video.is_some(),
            audio = self.audio.is_some(),
            "stream session opened"
        );
        Ok(())
    }

    fn ensure_opened(&self, operation: &'static str) -> Result<()> {
        if self.state == SessionState::Opened {
            Ok(())
        } else {
            Err(StreamError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Copy one RGB24 row (`width * 3` bytes) into the pending video frame.
    pub fn push_video_scanline(&mut self, row: u32, pixels: &[u8]) -> Result<()> {
        self.ensure_opened("push_video_scanline")?;
        match &mut self.video {
            Some(video) => video.write_scanline(row, pixels),
            None => Ok(()),
        }
    }

    /// Encode the scanlines written so far as the next video frame.
    pub fn push_video_frame(&mut self) -> Result<()> {
        self.ensure_opened("push_video_frame")?;
        let (Some(video), Some(writer)) = (&mut self.video, &mut self.writer) else {
            return Ok(());
        };
        video.encode_frame(writer)?;
        self.frames += 1;
        Ok(())
    }

    /// Queue `sample_count` interleaved stereo S16 samples.
    pub fn push_audio_samples(&mut self, sample_count: usize, data: &[u8]) -> Result<()> {
        self.ensure_opened("push_audio_samples")?;
        let expected = sample_count.checked_mul(SOURCE_SAMPLE_BYTES);
        if expected != Some(data.len()) {
            return Err(StreamError::SampleLength {
                samples: sample_count,
                expected: expected.unwrap_or(usize::MAX),
                actual: data.len(),
            });
        }
        let (Some(audio), Some(writer)) = (&mut self.audio, &mut self.writer) else {
            return Ok(());
        };
        audio.push_samples(data, writer)?;
        self.audio_samples += sample_count as u64;
        Ok(())
    }

    /// Drain both encoders, write the trailer and release everything.
    ///
    /// Safe to call after a failed `init` and more than once.
    pub fn cleanup(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        let result = self.finish();

        // Pipelines go before the muxer they registered with.
        self.video = None;
        self.audio = None;
        self.writer = None;
        self.state = SessionState::Closed;
        info!(
            frames = self.frames,
            audio_samples = self.audio_samples,
            "stream session closed"
        );
        result
    }

    fn finish(&mut self) -> Result<()> {
        if !self.header_written {
            return Ok(());
        }
        self.header_written = false;
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };

        let mut result = Ok(());
        if let Some(video) = &mut self.video {
            result = video.flush(writer);
        }
        if let Some(audio) = &mut self.audio {
            let flushed = audio.flush(writer);
            if result.is_ok() {
                result = flushed;
            }
        }

        let trailer = writer.muxer_mut().write_trailer().map_err(|e| {
            error!(error = %e, "error occurred when writing trailer");
            StreamError::TrailerWriteFailure(e)
        });
        result.and(trailer)
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Video frames encoded so far.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Producer audio samples accepted so far.
    #[must_use]
    pub fn audio_samples(&self) -> u64 {
        self.audio_samples
    }

    /// Bytes staged toward the next audio frame.
    #[must_use]
    pub fn audio_buffered_bytes(&self) -> Option<usize> {
        self.audio.as_ref().map(AudioPipeline::accumulated_bytes)
    }

    /// Producer bytes that make up one audio encoder frame.
    #[must_use]
    pub fn audio_frame_bytes(&self) -> Option<usize> {
        self.audio.as_ref().map(AudioPipeline::frame_bytes)
    }

    #[must_use]
    pub fn video(&self) -> Option<&VideoPipeline> {
        self.video.as_ref()
    }

    #[must_use]
    pub fn audio(&self) -> Option<&AudioPipeline> {
        self.audio.as_ref()
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if self.state == SessionState::Opened {
            if let Err(e) = self.cleanup() {
                warn!(error = %e, "cleanup on drop failed");
            }
        }
    }
}
