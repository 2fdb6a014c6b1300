//! Per-stream encoding pipelines.
//!
//! Opening a pipeline resolves the encoder's advertised capabilities against
//! the session's preferences, registers the stream with the muxer, opens the
//! encoder and prepares the frame buffers.

use livemux_codec::{
    find_encoder, ChannelLayout, CodecError, CodecId, CodecParameters, Encoder, MediaKind,
    PixelFormat, Resampler, ResamplerConfig, SampleFormat,
};
use tracing::{debug, error};

use crate::error::{Result, StreamError};
use crate::frame_buffer::{AudioFrameBuffer, VideoFrameBuffer, SOURCE_SAMPLE_BYTES};
use crate::mux::{Muxer, StreamInfo, StreamParameters};
use crate::pump::{pump, EncoderStage, PumpStatus};
use crate::writer::InterleavedWriter;
use crate::{MuxError, SessionConfig};

/// Prefer `preferred` if the encoder lists it, else the encoder's first
/// option. An encoder that lists nothing accepts anything.
fn choose<T: Copy + PartialEq>(advertised: Option<&[T]>, preferred: T) -> T {
    match advertised {
        Some(options) if !options.contains(&preferred) => options.first().copied().unwrap_or(preferred),
        _ => preferred,
    }
}

fn create_encoder(codec: CodecId) -> Result<Box<dyn Encoder>> {
    find_encoder(codec)
        .map(|info| info.create())
        .ok_or_else(|| {
            error!(codec = codec.name(), "codec not found");
            StreamError::UnsupportedFormat(format!("no encoder for {}", codec.name()))
        })
}

fn stream_failure(kind: MediaKind, err: MuxError) -> StreamError {
    error!(%kind, error = %err, "could not allocate stream");
    match err {
        MuxError::UnsupportedCodec { .. } | MuxError::UnsupportedParameter { .. } => {
            StreamError::UnsupportedFormat(err.to_string())
        }
        other => StreamError::AllocationFailure(other.to_string()),
    }
}

fn open_failure(kind: MediaKind, source: CodecError) -> StreamError {
    error!(%kind, error = %source, "could not open codec");
    StreamError::CodecOpenFailure { kind, source }
}

/// Register the stream, open the encoder and publish its final parameters.
fn open_stage(
    mut encoder: Box<dyn Encoder>,
    muxer: &mut dyn Muxer,
    params: &CodecParameters,
) -> Result<EncoderStage> {
    let kind = params.kind();
    if encoder.info().kind() != kind {
        return Err(StreamError::UnsupportedFormat(format!(
            "{} is not a {kind} encoder",
            encoder.info().name
        )));
    }
    let stream = muxer
        .add_stream(StreamParameters::from(params))
        .map_err(|e| stream_failure(kind, e))?;
    encoder.open(params).map_err(|e| open_failure(kind, e))?;
    muxer
        .set_stream_parameters(
            stream.index,
            StreamParameters::from(params).extradata(encoder.extradata()),
        )
        .map_err(|e| stream_failure(kind, e))?;
    debug!(
        %kind,
        encoder = encoder.info().name,
        stream = stream.index,
        encoder_time_base = %params.time_base,
        stream_time_base = %stream.time_base,
        "opened stream"
    );
    Ok(EncoderStage::new(encoder, kind, params.time_base, stream))
}

/// The video elementary stream.
#[derive(Debug)]
pub struct VideoPipeline {
    stage: EncoderStage,
    buffer: VideoFrameBuffer,
    params: CodecParameters,
}

impl VideoPipeline {
    /// Open a pipeline with the registered encoder for `codec`.
    pub fn open(muxer: &mut dyn Muxer, config: &SessionConfig, codec: CodecId) -> Result<Self> {
        Self::open_with_encoder(create_encoder(codec)?, muxer, config)
    }

    pub fn open_with_encoder(
        encoder: Box<dyn Encoder>,
        muxer: &mut dyn Muxer,
        config: &SessionConfig,
    ) -> Result<Self> {
        if config.fps == 0 {
            return Err(open_failure(
                MediaKind::Video,
                CodecError::invalid_param("frame rate must be non-zero"),
            ));
        }
        let info = encoder.info();
        let params = CodecParameters::video(info.id, config.width, config.height, config.fps)
            .bit_rate(config.video_bit_rate)
            .gop_size(config.gop_size)
            .pixel_format(choose(info.pixel_formats, PixelFormat::Yuv420p))
            .global_header(muxer.flags().global_header);

        let stage = open_stage(encoder, muxer, &params)?;
        let buffer = VideoFrameBuffer::new(params.width, params.height, params.pixel_format)?;
        Ok(Self {
            stage,
            buffer,
            params,
        })
    }

    pub fn write_scanline(&mut self, row: u32, pixels: &[u8]) -> Result<()> {
        self.buffer.write_scanline(row, pixels)
    }

    /// Convert the staged scanlines and encode them as the next frame.
    pub fn encode_frame(&mut self, writer: &mut InterleavedWriter) -> Result<PumpStatus> {
        let frame = self.buffer.produce_next_frame()?;
        pump(&mut self.stage, Some(&frame), writer)
    }

    /// Drain the encoder. Does nothing once drained.
    pub fn flush(&mut self, writer: &mut InterleavedWriter) -> Result<()> {
        if self.stage.is_finished() {
            return Ok(());
        }
        pump(&mut self.stage, None, writer)?;
        debug!(
            frames = self.stage.frames_sent(),
            packets = self.stage.packets(),
            "video stream drained"
        );
        Ok(())
    }

    #[must_use]
    pub fn params(&self) -> &CodecParameters {
        &self.params
    }

    #[must_use]
    pub fn stage(&self) -> &EncoderStage {
        &self.stage
    }

    #[must_use]
    pub fn stream(&self) -> &StreamInfo {
        self.stage.stream()
    }

    #[must_use]
    pub fn next_pts(&self) -> i64 {
        self.buffer.next_pts()
    }
}

/// The audio elementary stream.
#[derive(Debug)]
pub struct AudioPipeline {
    stage: EncoderStage,
    buffer: AudioFrameBuffer,
    params: CodecParameters,
}

impl AudioPipeline {
    /// Open a pipeline with the registered encoder for `codec`.
    pub fn open(muxer: &mut dyn Muxer, config: &SessionConfig, codec: CodecId) -> Result<Self> {
        Self::open_with_encoder(create_encoder(codec)?, muxer, config)
    }

    pub fn open_with_encoder(
        encoder: Box<dyn Encoder>,
        muxer: &mut dyn Muxer,
        config: &SessionConfig,
    ) -> Result<Self> {
        let kind = MediaKind::Audio;
        let info = encoder.info();
        let params = CodecParameters::audio(
            info.id,
            choose(info.sample_rates, config.sample_rate),
            choose(info.channel_layouts, config.channel_layout),
        )
        .bit_rate(config.audio_bit_rate)
        .sample_format(choose(info.sample_formats, SampleFormat::S16))
        .global_header(muxer.flags().global_header);
        let variable = info.variable_frame_size;

        let stage = open_stage(encoder, muxer, &params)?;

        let frame_samples = if variable {
            config.variable_frame_samples
        } else {
            stage.frame_size().ok_or_else(|| {
                open_failure(kind, CodecError::invalid_param("encoder reports no frame size"))
            })?
        };
        if frame_samples == 0 {
            return Err(open_failure(kind, CodecError::invalid_param("frame size must be non-zero")));
        }
        if !variable && config.input_sample_rate != params.sample_rate {
            return Err(open_failure(
                kind,
                CodecError::invalid_param(format!(
                    "fixed-size frames need input at {} Hz, got {} Hz",
                    params.sample_rate, config.input_sample_rate
                )),
            ));
        }

        let resampler = Resampler::new(ResamplerConfig {
            in_layout: ChannelLayout::Stereo,
            in_rate: config.input_sample_rate,
            in_format: SampleFormat::S16,
            out_layout: params.channel_layout,
            out_rate: params.sample_rate,
            out_format: params.sample_format,
        })
        .map_err(|source| {
            error!(error = %source, "could not initialize the resampling context");
            StreamError::ConversionFailure { kind, source }
        })?;
        debug!(
            frame_samples,
            variable,
            in_rate = config.input_sample_rate,
            out_rate = params.sample_rate,
            "audio frame buffer ready"
        );
        let buffer = AudioFrameBuffer::new(resampler, frame_samples, variable, params.time_base);
        Ok(Self {
            stage,
            buffer,
            params,
        })
    }

    /// Accumulate interleaved stereo S16 bytes, encoding every full frame.
    pub fn push_samples(&mut self, data: &[u8], writer: &mut InterleavedWriter) -> Result<()> {
        let stage = &mut self.stage;
        self.buffer
            .push_samples(data, |frame| pump(stage, Some(frame), writer).map(|_| ()))
    }

    /// Submit any partial frame, drain the resampler, then drain the encoder.
    pub fn flush(&mut self, writer: &mut InterleavedWriter) -> Result<()> {
        if self.stage.is_finished() {
            return Ok(());
        }
        let stage = &mut self.stage;
        self.buffer
            .flush(|frame| pump(stage, Some(frame), writer).map(|_| ()))?;
        pump(&mut self.stage, None, writer)?;
        debug!(
            samples = self.buffer.delivered(),
            packets = self.stage.packets(),
            "audio stream drained"
        );
        Ok(())
    }

    /// Bytes staged toward the next encoder frame.
    #[must_use]
    pub fn accumulated_bytes(&self) -> usize {
        self.buffer.accumulated()
    }

    /// Producer bytes per encoder frame.
    #[must_use]
    pub fn frame_bytes(&self) -> usize {
        self.buffer.frame_bytes()
    }

    /// Producer samples per encoder frame.
    #[must_use]
    pub fn frame_samples(&self) -> usize {
        self.buffer.frame_bytes() / SOURCE_SAMPLE_BYTES
    }

    #[must_use]
    pub fn params(&self) -> &CodecParameters {
        &self.params
    }

    #[must_use]
    pub fn stage(&self) -> &EncoderStage {
        &self.stage
    }

    #[must_use]
    pub fn stream(&self) -> &StreamInfo {
        self.stage.stream()
    }
}
