//! Error types for encoder and converter operations.

use thiserror::Error;

use crate::{CodecId, PixelFormat, SampleFormat};

/// Errors that can occur while configuring or driving an encoder, scaler or
/// resampler.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The encoder cannot produce a packet until it receives more input.
    ///
    /// This is part of the normal send/receive flow, not a failure.
    #[error("encoder needs more input")]
    NeedMoreInput,

    /// The encoder has been flushed and every buffered packet was returned.
    #[error("end of stream")]
    EndOfStream,

    /// A frame was sent while a packet is still waiting to be received.
    #[error("encoder output must be drained before sending another frame")]
    OutputPending,

    /// A frame was sent after the flush frame.
    #[error("encoder already flushed")]
    AlreadyFlushed,

    /// `send_frame`/`receive_packet` called before `open`.
    #[error("encoder not opened")]
    NotOpened,

    /// The encoder is not compiled into this build.
    #[error("unsupported codec: {0:?}")]
    UnsupportedCodec(CodecId),

    /// Unsupported pixel format.
    #[error("unsupported pixel format: {0:?}")]
    UnsupportedPixelFormat(PixelFormat),

    /// Unsupported sample format.
    #[error("unsupported sample format: {0:?}")]
    UnsupportedSampleFormat(SampleFormat),

    /// Invalid parameter passed to `open`.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Invalid frame dimensions.
    #[error("invalid frame dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// The frame handed to the encoder does not match its configuration.
    #[error("frame mismatch: {0}")]
    FrameMismatch(String),

    /// Pixel or sample conversion error.
    #[error("conversion error: {0}")]
    ConversionError(String),

    /// Bitstream compression failed.
    #[error("compression failed: {0}")]
    Compression(#[from] std::io::Error),

    /// Error reported by a backend library.
    #[error("encoder error: {0}")]
    Generic(String),
}

impl CodecError {
    /// Create an InvalidParam error with a message.
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Self::InvalidParam(msg.into())
    }

    /// Create a ConversionError with a message.
    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::ConversionError(msg.into())
    }

    /// Create a Generic error with a message.
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// True for the two non-error signals of the receive side of the
    /// encode protocol.
    #[must_use]
    pub fn is_flow_signal(&self) -> bool {
        matches!(self, Self::NeedMoreInput | Self::EndOfStream)
    }
}
