//! Codec-side building blocks for livemux.
//!
//! This crate holds everything an encoding pipeline talks to below the
//! container layer:
//!
//! - media types, rational timebases and exact timestamp rescaling
//! - raw [`VideoFrame`]/[`AudioFrame`] buffers with copy-on-write planes
//! - the push/pull [`Encoder`] trait and a registry of built-in encoders
//! - the [`Scaler`] (pixel format conversion) and [`Resampler`] (sample rate,
//!   format and layout conversion)
//!
//! # Quick Start
//!
//! ```ignore
//! use livemux_codec::{find_encoder, CodecId, CodecParameters, PixelFormat};
//!
//! let info = find_encoder(CodecId::ScreenVideo).expect("built in");
//! let mut encoder = info.create();
//! encoder.open(
//!     &CodecParameters::video(CodecId::ScreenVideo, 320, 240, 25)
//!         .pixel_format(PixelFormat::Bgr24),
//! )?;
//! ```
//!
//! # Feature Flags
//!
//! - `openh264` - Software H.264 encoding via OpenH264 (built from source)

mod encoder;
mod error;
mod frame;
mod packet;
mod pcm;
mod resample;
mod scale;
mod screen;
pub mod timebase;
mod types;

#[cfg(feature = "openh264")]
mod h264;

pub use encoder::{encoders, find_encoder, find_encoder_by_name, Encoder, EncoderInfo};
pub use error::CodecError;
pub use frame::{AudioFrame, Frame, VideoFrame};
pub use packet::Packet;
pub use pcm::PcmS16LeEncoder;
pub use resample::{Resampler, ResamplerConfig};
pub use scale::{ScaleFlags, Scaler};
pub use screen::ScreenVideoEncoder;
pub use timebase::{compare_ts, rescale, rescale_rnd, rescale_with, Rational, Rounding};
pub use types::{ChannelLayout, CodecId, CodecParameters, MediaKind, PixelFormat, SampleFormat};

#[cfg(feature = "openh264")]
pub use h264::H264Encoder;
