//! The submit/drain loop shared by the video and audio pipelines.

use livemux_codec::{CodecError, Encoder, Frame, MediaKind, Packet, Rational};
use tracing::error;

use crate::mux::StreamInfo;
use crate::writer::InterleavedWriter;
use crate::StreamError;

/// Outcome of one [`pump`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStatus {
    /// Zero or more packets were written; the encoder accepts more frames.
    More,
    /// The flush frame was submitted and the encoder has nothing left.
    Done,
}

/// An opened encoder bound to its container stream.
pub struct EncoderStage {
    encoder: Box<dyn Encoder>,
    kind: MediaKind,
    time_base: Rational,
    stream: StreamInfo,
    /// Reused for every packet.
    packet: Packet,
    frames_sent: u64,
    packets: u64,
    finished: bool,
}

impl std::fmt::Debug for EncoderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderStage")
            .field("encoder", &self.encoder.info().name)
            .field("kind", &self.kind)
            .field("time_base", &self.time_base)
            .field("stream", &self.stream)
            .field("frames_sent", &self.frames_sent)
            .field("packets", &self.packets)
            .field("finished", &self.finished)
            .finish()
    }
}

impl EncoderStage {
    pub(crate) fn new(
        encoder: Box<dyn Encoder>,
        kind: MediaKind,
        time_base: Rational,
        stream: StreamInfo,
    ) -> Self {
        Self {
            encoder,
            kind,
            time_base,
            stream,
            packet: Packet::with_capacity(64 * 1024),
            frames_sent: 0,
            packets: 0,
            finished: false,
        }
    }

    #[must_use]
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    #[must_use]
    pub fn stream(&self) -> &StreamInfo {
        &self.stream
    }

    /// Samples per frame the encoder requires, if fixed.
    #[must_use]
    pub fn frame_size(&self) -> Option<usize> {
        self.encoder.frame_size()
    }

    /// Frames submitted, not counting the flush.
    #[must_use]
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Packets written to the container.
    #[must_use]
    pub fn packets(&self) -> u64 {
        self.packets
    }

    /// Whether the encoder has been drained.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Submit `frame` (or the flush signal, `None`) and write every packet the
/// encoder makes available.
pub fn pump(
    stage: &mut EncoderStage,
    frame: Option<&Frame>,
    writer: &mut InterleavedWriter,
) -> Result<PumpStatus, StreamError> {
    let kind = stage.kind;
    let encode_failure = |source: CodecError| {
        error!(%kind, error = %source, "error encoding frame");
        StreamError::EncodeFailure { kind, source }
    };

    stage.encoder.send_frame(frame).map_err(encode_failure)?;
    if frame.is_some() {
        stage.frames_sent += 1;
    }

    loop {
        match stage.encoder.receive_packet(&mut stage.packet) {
            Err(CodecError::NeedMoreInput) if frame.is_some() => return Ok(PumpStatus::More),
            Err(CodecError::EndOfStream) if frame.is_none() => {
                stage.finished = true;
                return Ok(PumpStatus::Done);
            }
            Err(e) => return Err(encode_failure(e)),
            Ok(()) => {
                let result = writer.write(&mut stage.packet, stage.time_base, &stage.stream);
                stage.packet.unref();
                result.map_err(|source| {
                    error!(%kind, error = %source, "error while writing frame");
                    StreamError::MuxWriteFailure { kind, source }
                })?;
                stage.packets += 1;
            }
        }
    }
}
