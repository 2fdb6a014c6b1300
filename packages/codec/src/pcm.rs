//! Linear PCM "encoder": packs interleaved S16 frames into packets as is.

use bytes::BytesMut;

use crate::{
    ChannelLayout, CodecError, CodecId, CodecParameters, Encoder, EncoderInfo, Frame, Packet,
    SampleFormat,
};

pub(crate) static INFO: EncoderInfo = EncoderInfo {
    sample_formats: Some(&[SampleFormat::S16]),
    sample_rates: Some(&[5512, 11025, 22050, 44100]),
    channel_layouts: Some(&[ChannelLayout::Mono, ChannelLayout::Stereo]),
    variable_frame_size: true,
    ..EncoderInfo::new(
        CodecId::PcmS16Le,
        "pcm_s16le",
        "PCM signed 16-bit little-endian",
        PcmS16LeEncoder::boxed,
    )
};

/// Signed 16-bit little-endian PCM.
#[derive(Debug, Default)]
pub struct PcmS16LeEncoder {
    params: Option<CodecParameters>,
    staged: BytesMut,
    staged_pts: i64,
    staged_samples: i64,
    ready: bool,
    flushing: bool,
}

impl PcmS16LeEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn boxed() -> Box<dyn Encoder> {
        Box::new(Self::new())
    }
}

impl Encoder for PcmS16LeEncoder {
    fn info(&self) -> &'static EncoderInfo {
        &INFO
    }

    fn open(&mut self, params: &CodecParameters) -> Result<(), CodecError> {
        if params.sample_format != SampleFormat::S16 {
            return Err(CodecError::UnsupportedSampleFormat(params.sample_format));
        }
        if !INFO
            .sample_rates
            .is_some_and(|rates| rates.contains(&params.sample_rate))
        {
            return Err(CodecError::invalid_param(format!(
                "sample rate {} not supported",
                params.sample_rate
            )));
        }
        self.params = Some(params.clone());
        Ok(())
    }

    fn send_frame(&mut self, frame: Option<&Frame>) -> Result<(), CodecError> {
        let params = self.params.as_ref().ok_or(CodecError::NotOpened)?;
        if self.flushing {
            return Err(CodecError::AlreadyFlushed);
        }
        if self.ready {
            return Err(CodecError::OutputPending);
        }
        let frame = match frame {
            None => {
                self.flushing = true;
                return Ok(());
            }
            Some(Frame::Audio(frame)) => frame,
            Some(Frame::Video(_)) => {
                return Err(CodecError::FrameMismatch("video frame sent to audio encoder".into()));
            }
        };
        if frame.format != SampleFormat::S16 || frame.layout != params.channel_layout {
            return Err(CodecError::FrameMismatch(format!(
                "expected S16 {:?}, got {:?} {:?}",
                params.channel_layout, frame.format, frame.layout
            )));
        }

        self.staged.clear();
        self.staged.extend_from_slice(frame.data(0));
        self.staged_pts = frame.pts;
        self.staged_samples = frame.nb_samples() as i64;
        self.ready = true;
        Ok(())
    }

    fn receive_packet(&mut self, packet: &mut Packet) -> Result<(), CodecError> {
        if self.params.is_none() {
            return Err(CodecError::NotOpened);
        }
        if self.ready {
            self.ready = false;
            packet.fill(&self.staged, self.staged_pts, self.staged_samples, true);
            return Ok(());
        }
        if self.flushing {
            Err(CodecError::EndOfStream)
        } else {
            Err(CodecError::NeedMoreInput)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AudioFrame;

    fn opened() -> PcmS16LeEncoder {
        let mut encoder = PcmS16LeEncoder::new();
        encoder
            .open(&CodecParameters::audio(CodecId::PcmS16Le, 44100, ChannelLayout::Stereo))
            .unwrap();
        encoder
    }

    #[test]
    fn test_send_receive_cycle() {
        let mut encoder = opened();
        let mut frame = AudioFrame::alloc(SampleFormat::S16, ChannelLayout::Stereo, 44100, 4);
        frame.pts = 441;
        frame.planes_mut().unwrap()[0][0] = 9;

        let mut packet = Packet::default();
        assert!(matches!(encoder.receive_packet(&mut packet), Err(CodecError::NeedMoreInput)));

        encoder.send_frame(Some(&frame.into())).unwrap();
        encoder.receive_packet(&mut packet).unwrap();
        assert_eq!(packet.data.len(), 16);
        assert_eq!(packet.data[0], 9);
        assert_eq!(packet.pts, 441);
        assert_eq!(packet.duration, 4);
        assert!(matches!(encoder.receive_packet(&mut packet), Err(CodecError::NeedMoreInput)));
    }

    #[test]
    fn test_flush_signals_end_of_stream() {
        let mut encoder = opened();
        encoder.send_frame(None).unwrap();
        let mut packet = Packet::default();
        assert!(matches!(encoder.receive_packet(&mut packet), Err(CodecError::EndOfStream)));
        assert!(matches!(encoder.send_frame(None), Err(CodecError::AlreadyFlushed)));
    }

    #[test]
    fn test_rejects_unadvertised_rate() {
        let mut encoder = PcmS16LeEncoder::new();
        let params = CodecParameters::audio(CodecId::PcmS16Le, 48000, ChannelLayout::Stereo);
        assert!(encoder.open(&params).is_err());
    }

    #[test]
    fn test_send_before_open() {
        let mut encoder = PcmS16LeEncoder::new();
        assert!(matches!(encoder.send_frame(None), Err(CodecError::NotOpened)));
    }
}
