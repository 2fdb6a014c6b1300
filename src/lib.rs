//! Live audio/video muxing for scanline-driven producers.
//!
//! A [`StreamSession`] takes raw RGB24 scanlines and interleaved stereo S16
//! sample blocks as an application produces them, converts them to each
//! encoder's native format, drives the encoders and writes the packets into
//! a time-synchronised container.
//!
//! # Quick Start
//!
//! ```ignore
//! use livemux::{SessionConfig, StreamSession};
//!
//! let mut session = StreamSession::new();
//! session.init("capture.flv", SessionConfig::new(320, 240, 25))?;
//!
//! for row in 0..240 {
//!     session.push_video_scanline(row, &scanline)?;
//! }
//! session.push_video_frame()?;
//! session.push_audio_samples(735, &pcm)?;
//!
//! session.cleanup()?;
//! ```
//!
//! # Feature Flags
//!
//! - `openh264` - H.264 video through OpenH264

pub mod avc;
mod config;
mod error;
pub mod frame_buffer;
pub mod mux;
pub mod pipeline;
pub mod pump;
mod session;
mod sink;
pub mod writer;

pub use config::{ContainerFormat, SessionConfig};
pub use error::{MuxError, Result, StreamError};
pub use pipeline::{AudioPipeline, VideoPipeline};
pub use pump::{pump, EncoderStage, PumpStatus};
pub use session::{EncoderSet, SessionState, StreamSession};
pub use sink::{OutputTarget, Sink};
pub use writer::InterleavedWriter;

pub use livemux_codec;
