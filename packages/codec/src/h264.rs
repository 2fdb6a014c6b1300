//! H.264 encoder backed by OpenH264.

use bytes::BytesMut;
use openh264::encoder::{BitRate, Encoder as OpenH264Encoder, EncoderConfig, FrameRate};
use openh264::formats::YUVSource;
use openh264::OpenH264API;
use tracing::debug;

use crate::{
    CodecError, CodecId, CodecParameters, Encoder, EncoderInfo, Frame, Packet, PixelFormat,
    VideoFrame,
};

pub(crate) static INFO: EncoderInfo = EncoderInfo {
    pixel_formats: Some(&[PixelFormat::Yuv420p]),
    ..EncoderInfo::new(CodecId::H264, "libopenh264", "OpenH264 H.264 / AVC", H264Encoder::boxed)
};

/// Software H.264 encoder producing Annex B access units with in-band
/// parameter sets.
#[derive(Default)]
pub struct H264Encoder {
    params: Option<CodecParameters>,
    inner: Option<OpenH264Encoder>,
    frames_since_key: u32,
    staged: BytesMut,
    staged_pts: i64,
    staged_key: bool,
    ready: bool,
    flushing: bool,
}

impl std::fmt::Debug for H264Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("H264Encoder")
            .field("params", &self.params)
            .field("frames_since_key", &self.frames_since_key)
            .finish()
    }
}

impl H264Encoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn boxed() -> Box<dyn Encoder> {
        Box::new(Self::new())
    }
}

impl Encoder for H264Encoder {
    fn info(&self) -> &'static EncoderInfo {
        &INFO
    }

    fn open(&mut self, params: &CodecParameters) -> Result<(), CodecError> {
        if params.pixel_format != PixelFormat::Yuv420p {
            return Err(CodecError::UnsupportedPixelFormat(params.pixel_format));
        }
        if params.width % 2 != 0 || params.height % 2 != 0 || params.width == 0 || params.height == 0 {
            return Err(CodecError::InvalidDimensions {
                width: params.width,
                height: params.height,
            });
        }
        let fps = params.time_base.invert().as_f64() as f32;
        let config = EncoderConfig::new()
            .bitrate(BitRate::from_bps(params.bit_rate as u32))
            .max_frame_rate(FrameRate::from_hz(fps));
        let inner = OpenH264Encoder::with_api_config(OpenH264API::from_source(), config)
            .map_err(|e| CodecError::generic(format!("failed to create H.264 encoder: {:?}", e)))?;
        debug!(width = params.width, height = params.height, fps, "openh264 encoder opened");

        self.inner = Some(inner);
        self.params = Some(params.clone());
        Ok(())
    }

    fn send_frame(&mut self, frame: Option<&Frame>) -> Result<(), CodecError> {
        let (Some(params), Some(inner)) = (self.params.as_ref(), self.inner.as_mut()) else {
            return Err(CodecError::NotOpened);
        };
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
            Some(Frame::Video(frame)) => frame,
            Some(Frame::Audio(_)) => {
                return Err(CodecError::FrameMismatch("audio frame sent to video encoder".into()));
            }
        };
        if frame.width != params.width || frame.height != params.height || frame.format != PixelFormat::Yuv420p {
            return Err(CodecError::FrameMismatch(format!(
                "expected {}x{} Yuv420p, got {}x{} {:?}",
                params.width, params.height, frame.width, frame.height, frame.format
            )));
        }

        if params.gop_size > 0 && self.frames_since_key >= params.gop_size {
            inner.force_intra_frame();
            self.frames_since_key = 0;
        }
        let bitstream = inner
            .encode(&YuvPlanes(frame))
            .map_err(|e| CodecError::generic(format!("H.264 encode failed: {:?}", e)))?;
        let data = bitstream.to_vec();
        self.frames_since_key += 1;

        self.staged.clear();
        self.staged.extend_from_slice(&data);
        self.staged_pts = frame.pts;
        self.staged_key = contains_idr(&data);
        if self.staged_key {
            self.frames_since_key = 1;
        }
        // OpenH264 may skip a frame under rate control; nothing to emit then.
        self.ready = !data.is_empty();
        Ok(())
    }

    fn receive_packet(&mut self, packet: &mut Packet) -> Result<(), CodecError> {
        if self.params.is_none() {
            return Err(CodecError::NotOpened);
        }
        if self.ready {
            self.ready = false;
            packet.fill(&self.staged, self.staged_pts, 1, self.staged_key);
            return Ok(());
        }
        if self.flushing {
            Err(CodecError::EndOfStream)
        } else {
            Err(CodecError::NeedMoreInput)
        }
    }
}

/// True if an Annex B buffer carries an IDR slice (NAL type 5).
fn contains_idr(data: &[u8]) -> bool {
    data.windows(4)
        .any(|w| w[0] == 0 && w[1] == 0 && w[2] == 1 && w[3] & 0x1f == 5)
}

struct YuvPlanes<'a>(&'a VideoFrame);

impl YUVSource for YuvPlanes<'_> {
    fn dimensions(&self) -> (usize, usize) {
        (self.0.width as usize, self.0.height as usize)
    }

    fn strides(&self) -> (usize, usize, usize) {
        (self.0.linesize(0), self.0.linesize(1), self.0.linesize(2))
    }

    fn y(&self) -> &[u8] {
        self.0.plane(0)
    }

    fn u(&self) -> &[u8] {
        self.0.plane(1)
    }

    fn v(&self) -> &[u8] {
        self.0.plane(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_idr() {
        assert!(contains_idr(&[0, 0, 0, 1, 0x65, 0x88]));
        assert!(!contains_idr(&[0, 0, 0, 1, 0x41, 0x9a]));
    }

    #[test]
    fn test_first_frame_is_keyframe() {
        let mut encoder = H264Encoder::new();
        let params = CodecParameters::video(CodecId::H264, 64, 64, 25);
        encoder.open(&params).unwrap();

        let frame = VideoFrame::alloc(PixelFormat::Yuv420p, 64, 64).unwrap();
        encoder.send_frame(Some(&Frame::Video(frame))).unwrap();
        let mut packet = Packet::default();
        encoder.receive_packet(&mut packet).unwrap();
        assert!(packet.keyframe);
        assert!(!packet.is_empty());
    }
}
