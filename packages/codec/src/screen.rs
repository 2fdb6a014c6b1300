//! Screen Video (FLV codec id 3) encoder.
//!
//! The picture is split into 64x64 blocks, scanned from the bottom-left
//! corner. Each block is stored as bottom-up BGR rows compressed with zlib.
//! Inter frames send a zero-length block for every block identical to the
//! previous picture, which is why the last submitted frame is retained.

use std::io::Write;

use bytes::{BufMut, BytesMut};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::trace;

use crate::{
    CodecError, CodecId, CodecParameters, Encoder, EncoderInfo, Frame, Packet, PixelFormat,
    VideoFrame,
};

pub(crate) static INFO: EncoderInfo = EncoderInfo {
    pixel_formats: Some(&[PixelFormat::Bgr24]),
    ..EncoderInfo::new(
        CodecId::ScreenVideo,
        "flashsv",
        "Flash Screen Video v1",
        ScreenVideoEncoder::boxed,
    )
};

/// Block edge length in pixels. Must be a multiple of 16, at most 256.
const BLOCK_SIZE: usize = 64;

/// Largest width/height the 12-bit header fields can carry.
const MAX_DIMENSION: u32 = 4095;

/// Flash Screen Video encoder.
#[derive(Debug, Default)]
pub struct ScreenVideoEncoder {
    params: Option<CodecParameters>,
    /// Last submitted picture, reference for inter frames.
    previous: Option<VideoFrame>,
    frames_since_key: u32,
    staged: BytesMut,
    staged_pts: i64,
    staged_key: bool,
    ready: bool,
    flushing: bool,
}

impl ScreenVideoEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn boxed() -> Box<dyn Encoder> {
        Box::new(Self::new())
    }

    fn encode_picture(&mut self, frame: &VideoFrame, keyframe: bool) -> Result<(), CodecError> {
        let (width, height) = (frame.width as usize, frame.height as usize);
        let reference = if keyframe { None } else { self.previous.as_ref() };

        self.staged.clear();
        let block_code = ((BLOCK_SIZE / 16 - 1) as u16) << 12;
        self.staged.put_u16(block_code | width as u16);
        self.staged.put_u16(block_code | height as u16);

        let mut raw = Vec::with_capacity(BLOCK_SIZE * BLOCK_SIZE * 3);
        let mut unchanged = 0usize;
        for block_row in 0..height.div_ceil(BLOCK_SIZE) {
            // Block rows count up from the bottom of the picture.
            let bottom = height - block_row * BLOCK_SIZE;
            let top = bottom.saturating_sub(BLOCK_SIZE);
            for block_col in 0..width.div_ceil(BLOCK_SIZE) {
                let left = block_col * BLOCK_SIZE;
                let right = (left + BLOCK_SIZE).min(width);

                raw.clear();
                for y in (top..bottom).rev() {
                    raw.extend_from_slice(&frame.row(0, y)[left * 3..right * 3]);
                }

                if let Some(prev) = reference {
                    let same = (top..bottom)
                        .all(|y| prev.row(0, y)[left * 3..right * 3] == frame.row(0, y)[left * 3..right * 3]);
                    if same {
                        self.staged.put_u16(0);
                        unchanged += 1;
                        continue;
                    }
                }

                let mut zlib = ZlibEncoder::new(Vec::new(), Compression::default());
                zlib.write_all(&raw)?;
                let compressed = zlib.finish()?;
                let size = u16::try_from(compressed.len()).map_err(|_| {
                    CodecError::generic(format!("compressed block too large: {} bytes", compressed.len()))
                })?;
                self.staged.put_u16(size);
                self.staged.extend_from_slice(&compressed);
            }
        }
        trace!(
            pts = frame.pts,
            keyframe,
            unchanged,
            bytes = self.staged.len(),
            "screen video picture encoded"
        );
        Ok(())
    }
}

impl Encoder for ScreenVideoEncoder {
    fn info(&self) -> &'static EncoderInfo {
        &INFO
    }

    fn open(&mut self, params: &CodecParameters) -> Result<(), CodecError> {
        if params.pixel_format != PixelFormat::Bgr24 {
            return Err(CodecError::UnsupportedPixelFormat(params.pixel_format));
        }
        if params.width == 0
            || params.height == 0
            || params.width > MAX_DIMENSION
            || params.height > MAX_DIMENSION
        {
            return Err(CodecError::InvalidDimensions {
                width: params.width,
                height: params.height,
            });
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
                self.previous = None;
                return Ok(());
            }
            Some(Frame::Video(frame)) => frame,
            Some(Frame::Audio(_)) => {
                return Err(CodecError::FrameMismatch("audio frame sent to video encoder".into()));
            }
        };
        if frame.width != params.width
            || frame.height != params.height
            || frame.format != PixelFormat::Bgr24
        {
            return Err(CodecError::FrameMismatch(format!(
                "expected {}x{} Bgr24, got {}x{} {:?}",
                params.width, params.height, frame.width, frame.height, frame.format
            )));
        }

        let gop = params.gop_size;
        let keyframe = self.previous.is_none() || (gop > 0 && self.frames_since_key >= gop);
        self.encode_picture(frame, keyframe)?;

        self.frames_since_key = if keyframe { 1 } else { self.frames_since_key + 1 };
        self.previous = Some(frame.clone());
        self.staged_pts = frame.pts;
        self.staged_key = keyframe;
        self.ready = true;
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
