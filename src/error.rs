//! Error types for the session and the container layer.

use std::io;

use livemux_codec::{CodecError, CodecId, MediaKind};
use thiserror::Error;

use crate::session::SessionState;

/// Errors raised by a [`Muxer`](crate::mux::Muxer) or its [`Sink`](crate::Sink).
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{format} cannot carry {codec:?}")]
    UnsupportedCodec { codec: CodecId, format: &'static str },

    #[error("{format} cannot carry parameter: {detail}")]
    UnsupportedParameter { format: &'static str, detail: String },

    #[error("no stream with index {0}")]
    InvalidStream(usize),

    #[error("muxer is {0}")]
    InvalidState(&'static str),

    #[error("invalid packet data: {0}")]
    InvalidData(String),
}

/// Errors surfaced by [`StreamSession`](crate::StreamSession).
///
/// Each variant names the phase that failed.
#[derive(Debug, Error)]
pub enum StreamError {
    /// No encoder or container exists for what was requested.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Stream or context allocation failed.
    #[error("allocation failed: {0}")]
    AllocationFailure(String),

    /// The encoder rejected its configuration.
    #[error("could not open {kind} codec")]
    CodecOpenFailure {
        kind: MediaKind,
        #[source]
        source: CodecError,
    },

    /// The output sink could not be opened.
    #[error("could not open output")]
    IoFailure(#[source] io::Error),

    /// The container header could not be written.
    #[error("error occurred when writing header")]
    HeaderWriteFailure(#[source] MuxError),

    /// The encoder failed while encoding or flushing.
    #[error("error encoding {kind} frame")]
    EncodeFailure {
        kind: MediaKind,
        #[source]
        source: CodecError,
    },

    /// A packet could not be written to the container.
    #[error("error while writing {kind} packet")]
    MuxWriteFailure {
        kind: MediaKind,
        #[source]
        source: MuxError,
    },

    /// Scaler or resampler setup or conversion failed.
    #[error("{kind} conversion failed")]
    ConversionFailure {
        kind: MediaKind,
        #[source]
        source: CodecError,
    },

    /// The container trailer could not be written.
    #[error("error occurred when writing trailer")]
    TrailerWriteFailure(#[source] MuxError),

    /// An ingestion or lifecycle call was made in the wrong state.
    #[error("{operation} called while session is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// A scanline row outside `0..height`.
    #[error("scanline row {row} out of range (height {height})")]
    ScanlineOutOfRange { row: u32, height: u32 },

    /// A scanline whose byte length is not `width * 3`.
    #[error("scanline is {actual} bytes, expected {expected}")]
    ScanlineLength { expected: usize, actual: usize },

    /// An audio push whose byte length disagrees with its sample count.
    #[error("audio push of {samples} samples carries {actual} bytes, expected {expected}")]
    SampleLength {
        samples: usize,
        expected: usize,
        actual: usize,
    },
}

/// Result alias used throughout the session layer.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;
