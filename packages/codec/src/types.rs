//! Core media types shared by encoders, converters and the muxing layer.

use crate::Rational;

/// Encoder identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    /// Flash Screen Video v1 (zlib-compressed BGR blocks).
    ScreenVideo,
    /// H.264/AVC.
    H264,
    /// Signed 16-bit little-endian linear PCM.
    PcmS16Le,
}

impl CodecId {
    /// Media kind this codec carries.
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        match self {
            Self::ScreenVideo | Self::H264 => MediaKind::Video,
            Self::PcmS16Le => MediaKind::Audio,
        }
    }

    /// Short codec name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ScreenVideo => "flashsv",
            Self::H264 => "h264",
            Self::PcmS16Le => "pcm_s16le",
        }
    }
}

/// Elementary stream kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Video => f.write_str("video"),
            Self::Audio => f.write_str("audio"),
        }
    }
}

/// Pixel format for video frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Packed RGB, 8 bits per channel.
    Rgb24,
    /// Packed BGR, 8 bits per channel.
    Bgr24,
    /// Planar YUV 4:2:0 (Y, U, V planes).
    Yuv420p,
    /// YUV 4:2:0, Y plane plus interleaved UV plane.
    Nv12,
}

impl PixelFormat {
    /// Number of planes.
    #[must_use]
    pub fn plane_count(&self) -> usize {
        match self {
            Self::Rgb24 | Self::Bgr24 => 1,
            Self::Nv12 => 2,
            Self::Yuv420p => 3,
        }
    }

    /// Bytes of pixel data in one row of `plane` for a frame `width` pixels wide.
    #[must_use]
    pub fn plane_row_bytes(&self, plane: usize, width: u32) -> usize {
        let w = width as usize;
        let chroma_w = w.div_ceil(2);
        match (self, plane) {
            (Self::Rgb24 | Self::Bgr24, _) => w * 3,
            (_, 0) => w,
            (Self::Nv12, _) => chroma_w * 2,
            (_, _) => chroma_w,
        }
    }

    /// Number of rows in `plane` for a frame `height` pixels high.
    #[must_use]
    pub fn plane_rows(&self, plane: usize, height: u32) -> usize {
        let h = height as usize;
        match (self, plane) {
            (Self::Rgb24 | Self::Bgr24, _) | (_, 0) => h,
            _ => h.div_ceil(2),
        }
    }

    /// Returns true if chroma is stored apart from luma.
    #[must_use]
    pub fn is_planar(&self) -> bool {
        matches!(self, Self::Nv12 | Self::Yuv420p)
    }
}

/// Audio sample format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Interleaved signed 16-bit.
    S16,
    /// Planar signed 16-bit.
    S16p,
    /// Interleaved 32-bit float.
    F32,
    /// Planar 32-bit float.
    F32p,
}

impl SampleFormat {
    /// Bytes per single-channel sample.
    #[must_use]
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::S16 | Self::S16p => 2,
            Self::F32 | Self::F32p => 4,
        }
    }

    /// Returns true if each channel lives in its own plane.
    #[must_use]
    pub fn is_planar(&self) -> bool {
        matches!(self, Self::S16p | Self::F32p)
    }
}

/// Channel layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    /// Number of channels in the layout.
    #[must_use]
    pub fn channels(&self) -> usize {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
        }
    }
}

/// Encoder configuration handed to [`Encoder::open`](crate::Encoder::open).
///
/// Built by the pipeline after resolving the encoder's advertised
/// capabilities against the session's preferences.
#[derive(Debug, Clone)]
pub struct CodecParameters {
    /// Codec to configure.
    pub codec: CodecId,
    /// Target bit rate in bits per second.
    pub bit_rate: u64,
    /// Encoder time base (1/fps for video, 1/sample_rate for audio).
    pub time_base: Rational,
    /// Frame width in pixels (video).
    pub width: u32,
    /// Frame height in pixels (video).
    pub height: u32,
    /// Native pixel format (video).
    pub pixel_format: PixelFormat,
    /// Keyframe interval in frames (video).
    pub gop_size: u32,
    /// Native sample format (audio).
    pub sample_format: SampleFormat,
    /// Sample rate in Hz (audio).
    pub sample_rate: u32,
    /// Channel layout (audio).
    pub channel_layout: ChannelLayout,
    /// Emit stream headers out-of-band instead of repeating them in the
    /// bitstream.
    pub global_header: bool,
}

impl CodecParameters {
    /// Parameters for a video encoder.
    #[must_use]
    pub fn video(codec: CodecId, width: u32, height: u32, fps: u32) -> Self {
        Self {
            codec,
            bit_rate: 750_000,
            time_base: Rational::new(1, fps as i64),
            width,
            height,
            pixel_format: PixelFormat::Yuv420p,
            gop_size: 12,
            sample_format: SampleFormat::S16,
            sample_rate: 0,
            channel_layout: ChannelLayout::Stereo,
            global_header: false,
        }
    }

    /// Parameters for an audio encoder.
    #[must_use]
    pub fn audio(codec: CodecId, sample_rate: u32, channel_layout: ChannelLayout) -> Self {
        Self {
            codec,
            bit_rate: 64_000,
            time_base: Rational::new(1, sample_rate as i64),
            width: 0,
            height: 0,
            pixel_format: PixelFormat::Yuv420p,
            gop_size: 0,
            sample_format: SampleFormat::S16,
            sample_rate,
            channel_layout,
            global_header: false,
        }
    }

    /// Set the target bit rate.
    #[must_use]
    pub fn bit_rate(mut self, bit_rate: u64) -> Self {
        self.bit_rate = bit_rate;
        self
    }

    /// Set the native pixel format.
    #[must_use]
    pub fn pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = format;
        self
    }

    /// Set the keyframe interval.
    #[must_use]
    pub fn gop_size(mut self, gop_size: u32) -> Self {
        self.gop_size = gop_size;
        self
    }

    /// Set the native sample format.
    #[must_use]
    pub fn sample_format(mut self, format: SampleFormat) -> Self {
        self.sample_format = format;
        self
    }

    /// Request out-of-band stream headers.
    #[must_use]
    pub fn global_header(mut self, enable: bool) -> Self {
        self.global_header = enable;
        self
    }

    /// Media kind of the configured codec.
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.codec.kind()
    }
}
