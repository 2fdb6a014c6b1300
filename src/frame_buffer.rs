//! Source/native frame pairs and the conversion between them.
//!
//! The producer writes RGB24 scanlines and interleaved stereo S16 sample
//! blocks; the encoder wants its own native layout. Each buffer owns one
//! reusable frame of each kind.

use livemux_codec::{
    rescale, AudioFrame, ChannelLayout, CodecError, Frame, MediaKind, PixelFormat, Rational,
    Resampler, SampleFormat, ScaleFlags, Scaler, VideoFrame,
};
use tracing::debug;

use crate::error::{Result, StreamError};

/// Bytes per interleaved stereo S16 sample group, the producer's audio layout.
pub const SOURCE_SAMPLE_BYTES: usize = 4;

fn video_conversion(source: CodecError) -> StreamError {
    StreamError::ConversionFailure {
        kind: MediaKind::Video,
        source,
    }
}

fn audio_conversion(source: CodecError) -> StreamError {
    StreamError::ConversionFailure {
        kind: MediaKind::Audio,
        source,
    }
}

/// Scanline staging for the video pipeline.
#[derive(Debug)]
pub struct VideoFrameBuffer {
    source: VideoFrame,
    native: VideoFrame,
    /// Created on the first [`produce_next_frame`](Self::produce_next_frame).
    scaler: Option<Scaler>,
    next_pts: i64,
}

impl VideoFrameBuffer {
    pub fn new(width: u32, height: u32, native_format: PixelFormat) -> Result<Self> {
        let alloc = |format| {
            VideoFrame::alloc(format, width, height).map_err(|e| {
                StreamError::AllocationFailure(format!("could not allocate {width}x{height} frame: {e}"))
            })
        };
        Ok(Self {
            source: alloc(PixelFormat::Rgb24)?,
            native: alloc(native_format)?,
            scaler: None,
            next_pts: 0,
        })
    }

    /// Copy one RGB24 row into the source frame.
    pub fn write_scanline(&mut self, row: u32, pixels: &[u8]) -> Result<()> {
        let (width, height) = (self.source.width, self.source.height);
        if row >= height {
            return Err(StreamError::ScanlineOutOfRange { row, height });
        }
        let expected = width as usize * 3;
        if pixels.len() != expected {
            return Err(StreamError::ScanlineLength {
                expected,
                actual: pixels.len(),
            });
        }
        let stride = self.source.linesize(0);
        let planes = self.source.planes_mut().map_err(video_conversion)?;
        let start = row as usize * stride;
        planes[0][start..start + expected].copy_from_slice(pixels);
        Ok(())
    }

    /// Convert the staged scanlines into the native frame and stamp it with
    /// the next presentation timestamp.
    ///
    /// The returned frame shares planes with the buffer; an encoder that keeps
    /// it forces a copy on the next call.
    pub fn produce_next_frame(&mut self) -> Result<Frame> {
        if self.native.ensure_exclusive() {
            debug!(pts = self.next_pts, "native video frame still referenced, copied");
        }
        let scaler = match &mut self.scaler {
            Some(scaler) => scaler,
            slot @ None => slot.insert(
                Scaler::new(
                    (self.source.width, self.source.height),
                    self.source.format,
                    (self.native.width, self.native.height),
                    self.native.format,
                    ScaleFlags::Bicubic,
                )
                .map_err(video_conversion)?,
            ),
        };
        scaler
            .scale(&self.source, &mut self.native)
            .map_err(video_conversion)?;
        self.native.pts = self.next_pts;
        self.next_pts += 1;
        Ok(Frame::Video(self.native.clone()))
    }

    /// Timestamp the next produced frame will carry.
    #[must_use]
    pub fn next_pts(&self) -> i64 {
        self.next_pts
    }
}

/// Sample accumulator for the audio pipeline.
///
/// Producer bytes are staged until exactly one encoder frame is full; only
/// full frames are converted and submitted, except by [`flush`](Self::flush).
#[derive(Debug)]
pub struct AudioFrameBuffer {
    source: AudioFrame,
    native: AudioFrame,
    resampler: Resampler,
    /// Bytes of `source` filled for the current frame.
    accumulated: usize,
    /// Copy of the staged bytes taken before a push that submits a frame.
    saved: Vec<u8>,
    /// Native samples handed to the encoder so far.
    delivered: i64,
    out_rate: u32,
    encoder_time_base: Rational,
    variable_frame_size: bool,
}

impl AudioFrameBuffer {
    /// `frame_samples` is the number of producer samples per encoder frame.
    pub fn new(
        resampler: Resampler,
        frame_samples: usize,
        variable_frame_size: bool,
        encoder_time_base: Rational,
    ) -> Self {
        let config = *resampler.config();
        let source = AudioFrame::alloc(
            SampleFormat::S16,
            ChannelLayout::Stereo,
            config.in_rate,
            frame_samples,
        );
        let native = AudioFrame::alloc(
            config.out_format,
            config.out_layout,
            config.out_rate,
            resampler.output_bound(frame_samples),
        );
        Self {
            source,
            native,
            resampler,
            accumulated: 0,
            saved: Vec::new(),
            delivered: 0,
            out_rate: config.out_rate,
            encoder_time_base,
            variable_frame_size,
        }
    }

    /// Capacity of one encoder frame in producer bytes.
    #[must_use]
    pub fn frame_bytes(&self) -> usize {
        self.source.capacity() * SOURCE_SAMPLE_BYTES
    }

    #[must_use]
    pub fn accumulated(&self) -> usize {
        self.accumulated
    }

    /// Native samples submitted to the encoder.
    #[must_use]
    pub fn delivered(&self) -> i64 {
        self.delivered
    }

    /// Presentation timestamp of a frame starting after `delivered` samples.
    #[must_use]
    pub fn pts_for(&self, delivered: i64) -> i64 {
        rescale(delivered, Rational::new(1, self.out_rate as i64), self.encoder_time_base)
    }

    /// Stage `data`, calling `encode` for every frame that fills up.
    ///
    /// On error the accumulator and the bytes it covers are restored to
    /// their state before the call.
    pub fn push_samples<F>(&mut self, data: &[u8], mut encode: F) -> Result<()>
    where
        F: FnMut(&Frame) -> Result<()>,
    {
        let before = self.accumulated;
        // Only a submitting push overwrites the staged prefix.
        let overwrites = before > 0 && before + data.len() >= self.frame_bytes();
        if overwrites {
            let planes = self.source.planes_mut().map_err(audio_conversion)?;
            self.saved.clear();
            self.saved.extend_from_slice(&planes[0][..before]);
        }

        let Err(e) = self.stage(data, &mut encode) else {
            return Ok(());
        };
        self.accumulated = before;
        if overwrites {
            let planes = self.source.planes_mut().map_err(audio_conversion)?;
            planes[0][..before].copy_from_slice(&self.saved);
        }
        Err(e)
    }

    fn stage<F>(&mut self, mut data: &[u8], encode: &mut F) -> Result<()>
    where
        F: FnMut(&Frame) -> Result<()>,
    {
        let frame_bytes = self.frame_bytes();
        while !data.is_empty() {
            let take = data.len().min(frame_bytes - self.accumulated);
            let planes = self.source.planes_mut().map_err(audio_conversion)?;
            planes[0][self.accumulated..self.accumulated + take].copy_from_slice(&data[..take]);
            self.accumulated += take;
            data = &data[take..];

            if self.accumulated == frame_bytes {
                self.submit_accumulated(encode)?;
                self.accumulated = 0;
            }
        }
        Ok(())
    }

    /// Submit whatever is staged, then drain the resampler.
    ///
    /// A partial frame goes out short when the encoder takes variable frame
    /// sizes, otherwise it is padded with silence.
    pub fn flush<F>(&mut self, mut encode: F) -> Result<()>
    where
        F: FnMut(&Frame) -> Result<()>,
    {
        if self.accumulated > 0 {
            if !self.variable_frame_size {
                let frame_bytes = self.frame_bytes();
                let planes = self.source.planes_mut().map_err(audio_conversion)?;
                planes[0][self.accumulated..frame_bytes].fill(0);
                self.accumulated = frame_bytes;
            }
            self.submit_accumulated(&mut encode)?;
            self.accumulated = 0;
        }
        while self.resampler.delay(self.out_rate) > 0 {
            if self.convert_and_encode(None, &mut encode)? == 0 {
                break;
            }
        }
        Ok(())
    }

    fn submit_accumulated<F>(&mut self, encode: &mut F) -> Result<()>
    where
        F: FnMut(&Frame) -> Result<()>,
    {
        let samples = self.accumulated / SOURCE_SAMPLE_BYTES;
        self.source.set_nb_samples(samples).map_err(audio_conversion)?;
        self.convert_and_encode(Some(samples), encode)?;
        Ok(())
    }

    /// Resample the staged source (`None` drains) into the native frame and
    /// submit it. Returns the number of native samples produced.
    fn convert_and_encode<F>(&mut self, input_samples: Option<usize>, encode: &mut F) -> Result<usize>
    where
        F: FnMut(&Frame) -> Result<()>,
    {
        let bound = self.resampler.output_bound(input_samples.unwrap_or(0));
        if bound > self.native.capacity() {
            debug!(
                capacity = self.native.capacity(),
                bound, "growing native audio frame"
            );
            self.native = AudioFrame::alloc(self.native.format, self.native.layout, self.out_rate, bound);
        }
        self.native.ensure_exclusive();

        let input = input_samples.map(|_| &self.source);
        let produced = self
            .resampler
            .convert(&mut self.native, input)
            .map_err(audio_conversion)?;
        if produced == 0 {
            return Ok(0);
        }
        self.native.set_nb_samples(produced).map_err(audio_conversion)?;
        self.native.pts = self.pts_for(self.delivered);
        encode(&Frame::Audio(self.native.clone()))?;
        self.delivered += produced as i64;
        Ok(produced)
    }
}
