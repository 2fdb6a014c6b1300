//! Sample rate, format and channel layout conversion.
//!
//! Linear interpolation between neighbouring input samples. The read position
//! advances in exact integer steps of `in_rate / out_rate` so long runs never
//! drift. With equal rates the conversion only changes format/layout and holds
//! no samples back.

use crate::timebase::{rescale_rnd, Rounding};
use crate::{AudioFrame, ChannelLayout, CodecError, SampleFormat};

/// Geometry of both sides of a [`Resampler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResamplerConfig {
    pub in_layout: ChannelLayout,
    pub in_rate: u32,
    pub in_format: SampleFormat,
    pub out_layout: ChannelLayout,
    pub out_rate: u32,
    pub out_format: SampleFormat,
}

/// Stateful audio converter.
#[derive(Debug)]
pub struct Resampler {
    config: ResamplerConfig,
    /// Input samples not yet consumed, one vector per input channel.
    pending: Vec<Vec<f32>>,
    /// Integer read position into `pending`.
    pos: usize,
    /// Fractional read position, in units of `1 / out_rate` input samples.
    frac: u64,
}

impl Resampler {
    pub fn new(config: ResamplerConfig) -> Result<Self, CodecError> {
        if config.in_rate == 0 || config.out_rate == 0 {
            return Err(CodecError::invalid_param("sample rate must be non-zero"));
        }
        Ok(Self {
            pending: vec![Vec::new(); config.in_layout.channels()],
            pos: 0,
            frac: 0,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ResamplerConfig {
        &self.config
    }

    /// Buffered input, expressed in samples at `base_rate`, rounded up.
    #[must_use]
    pub fn delay(&self, base_rate: u32) -> i64 {
        let buffered = self.pending[0].len().saturating_sub(self.pos) as i64;
        rescale_rnd(buffered, base_rate as i64, self.config.in_rate as i64, Rounding::Up)
    }

    /// Upper bound on the output produced by feeding `in_samples` more input.
    #[must_use]
    pub fn output_bound(&self, in_samples: usize) -> usize {
        let delayed = self.delay(self.config.in_rate);
        rescale_rnd(
            delayed + in_samples as i64,
            self.config.out_rate as i64,
            self.config.in_rate as i64,
            Rounding::Up,
        )
        .max(0) as usize
    }

    /// Feed `input` (its first `nb_samples()` samples) and write as many
    /// converted samples as fit into `output`, starting at sample 0.
    ///
    /// `None` drains everything still buffered. Returns the number of samples
    /// per channel written; anything that did not fit stays buffered.
    pub fn convert(
        &mut self,
        output: &mut AudioFrame,
        input: Option<&AudioFrame>,
    ) -> Result<usize, CodecError> {
        if output.format != self.config.out_format || output.layout != self.config.out_layout {
            return Err(CodecError::FrameMismatch(format!(
                "output frame is {:?}/{:?}, resampler produces {:?}/{:?}",
                output.format, output.layout, self.config.out_format, self.config.out_layout
            )));
        }
        let draining = match input {
            Some(frame) => {
                self.push_input(frame)?;
                false
            }
            None => true,
        };

        let capacity = output.capacity();
        let mut produced: Vec<Vec<f32>> = vec![Vec::with_capacity(capacity); self.pending.len()];
        let (in_rate, out_rate) = (self.config.in_rate as u64, self.config.out_rate as u64);
        let available = self.pending[0].len();
        while produced[0].len() < capacity && self.pos < available {
            let needs_next = self.frac != 0;
            if needs_next && self.pos + 1 >= available && !draining {
                break;
            }
            for (channel, samples) in self.pending.iter().enumerate() {
                let a = samples[self.pos];
                let value = if needs_next {
                    let b = samples.get(self.pos + 1).copied().unwrap_or(a);
                    let t = self.frac as f32 / out_rate as f32;
                    a + (b - a) * t
                } else {
                    a
                };
                produced[channel].push(value);
            }
            self.frac += in_rate;
            self.pos += (self.frac / out_rate) as usize;
            self.frac %= out_rate;
        }

        let consumed = self.pos.min(available);
        for samples in &mut self.pending {
            samples.drain(..consumed);
        }
        self.pos -= consumed;
        if draining && self.pos >= self.pending[0].len() {
            for samples in &mut self.pending {
                samples.clear();
            }
            self.pos = 0;
            self.frac = 0;
        }

        let written = produced[0].len();
        self.write_output(output, &produced)?;
        Ok(written)
    }

    fn push_input(&mut self, frame: &AudioFrame) -> Result<(), CodecError> {
        if frame.format != self.config.in_format
            || frame.layout != self.config.in_layout
            || frame.sample_rate != self.config.in_rate
        {
            return Err(CodecError::FrameMismatch(format!(
                "input frame is {:?}/{:?}@{}, resampler expects {:?}/{:?}@{}",
                frame.format,
                frame.layout,
                frame.sample_rate,
                self.config.in_format,
                self.config.in_layout,
                self.config.in_rate
            )));
        }
        let channels = self.pending.len();
        let bps = frame.format.bytes_per_sample();
        for i in 0..frame.nb_samples() {
            for (ch, samples) in self.pending.iter_mut().enumerate() {
                let (plane, offset) = if frame.format.is_planar() {
                    (ch, i * bps)
                } else {
                    (0, (i * channels + ch) * bps)
                };
                samples.push(read_sample(frame.format, &frame.plane(plane)[offset..offset + bps]));
            }
        }
        Ok(())
    }

    fn write_output(&self, output: &mut AudioFrame, produced: &[Vec<f32>]) -> Result<(), CodecError> {
        let format = output.format;
        let out_channels = output.layout.channels();
        let bps = format.bytes_per_sample();
        let planes = output.planes_mut()?;
        for i in 0..produced[0].len() {
            for ch in 0..out_channels {
                let value = match (produced.len(), out_channels) {
                    (1, _) => produced[0][i],
                    (_, 1) => (produced[0][i] + produced[1][i]) * 0.5,
                    _ => produced[ch][i],
                };
                let (plane, offset) = if format.is_planar() {
                    (ch, i * bps)
                } else {
                    (0, (i * out_channels + ch) * bps)
                };
                write_sample(format, value, &mut planes[plane][offset..offset + bps]);
            }
        }
        Ok(())
    }
}

fn read_sample(format: SampleFormat, bytes: &[u8]) -> f32 {
    match format {
        SampleFormat::S16 | SampleFormat::S16p => {
            i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32768.0
        }
        SampleFormat::F32 | SampleFormat::F32p => {
            f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        }
    }
}

fn write_sample(format: SampleFormat, value: f32, out: &mut [u8]) {
    match format {
        SampleFormat::S16 | SampleFormat::S16p => {
            let s = (value * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
            out.copy_from_slice(&s.to_le_bytes());
        }
        SampleFormat::F32 | SampleFormat::F32p => out.copy_from_slice(&value.to_le_bytes()),
    }
}
