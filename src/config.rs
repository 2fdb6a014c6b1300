//! Session configuration.

use std::path::Path;

use livemux_codec::{ChannelLayout, CodecId};

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerFormat {
    /// Flash Video, a streaming-friendly container with no index.
    #[default]
    Flv,
}

impl ContainerFormat {
    /// Short format name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Flv => "flv",
        }
    }

    /// Look a format up by its short name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "flv" => Some(Self::Flv),
            _ => None,
        }
    }

    /// Guess the format from a file extension. Paths without an extension
    /// (pipes, device nodes) get the default format.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            None => Some(Self::default()),
            Some(ext) => Self::from_name(ext),
        }
    }
}

impl std::fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration for one recording session.
///
/// ```ignore
/// let config = SessionConfig::new(320, 240, 25)
///     .video_bit_rate(1_000_000)
///     .input_sample_rate(48_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Picture width in pixels. Must be even.
    pub width: u32,
    /// Picture height in pixels. Must be even.
    pub height: u32,
    /// Frames per second; the video timebase is `1/fps`.
    pub fps: u32,
    /// Video target bit rate.
    pub video_bit_rate: u64,
    /// Audio target bit rate.
    pub audio_bit_rate: u64,
    /// Keyframe interval in frames.
    pub gop_size: u32,
    /// Preferred encoder sample rate, used if the encoder supports it.
    pub sample_rate: u32,
    /// Preferred encoder channel layout, used if the encoder supports it.
    pub channel_layout: ChannelLayout,
    /// Rate of the interleaved stereo S16 samples the producer pushes.
    pub input_sample_rate: u32,
    /// Samples per encoder frame for encoders that accept any frame size.
    pub variable_frame_samples: usize,
    /// Container override; otherwise guessed from the output path.
    pub format: Option<ContainerFormat>,
    /// Video codec override; otherwise the container's default.
    pub video_codec: Option<CodecId>,
    /// Audio codec override; otherwise the container's default.
    pub audio_codec: Option<CodecId>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            fps: 25,
            video_bit_rate: 750_000,
            audio_bit_rate: 64_000,
            gop_size: 12,
            sample_rate: 44_100,
            channel_layout: ChannelLayout::Stereo,
            input_sample_rate: 44_100,
            variable_frame_samples: 10_000,
            format: None,
            video_codec: None,
            audio_codec: None,
        }
    }
}

impl SessionConfig {
    /// Create a configuration for the given picture size and frame rate.
    #[must_use]
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            ..Default::default()
        }
    }

    /// Set the video bit rate in bits per second.
    #[must_use]
    pub fn video_bit_rate(mut self, bit_rate: u64) -> Self {
        self.video_bit_rate = bit_rate;
        self
    }

    /// Set the audio bit rate in bits per second.
    #[must_use]
    pub fn audio_bit_rate(mut self, bit_rate: u64) -> Self {
        self.audio_bit_rate = bit_rate;
        self
    }

    /// Set the keyframe interval.
    #[must_use]
    pub fn gop_size(mut self, gop_size: u32) -> Self {
        self.gop_size = gop_size;
        self
    }

    /// Set the preferred encoder sample rate.
    #[must_use]
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set the preferred encoder channel layout.
    #[must_use]
    pub fn channel_layout(mut self, layout: ChannelLayout) -> Self {
        self.channel_layout = layout;
        self
    }

    /// Set the rate of the samples the producer pushes.
    #[must_use]
    pub fn input_sample_rate(mut self, sample_rate: u32) -> Self {
        self.input_sample_rate = sample_rate;
        self
    }

    /// Set the frame size used with variable-frame-size audio encoders.
    #[must_use]
    pub fn variable_frame_samples(mut self, samples: usize) -> Self {
        self.variable_frame_samples = samples;
        self
    }

    /// Force the output container.
    #[must_use]
    pub fn format(mut self, format: ContainerFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Override the video codec.
    #[must_use]
    pub fn video_codec(mut self, codec: CodecId) -> Self {
        self.video_codec = Some(codec);
        self
    }

    /// Override the audio codec.
    #[must_use]
    pub fn audio_codec(mut self, codec: CodecId) -> Self {
        self.audio_codec = Some(codec);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_path() {
        assert_eq!(ContainerFormat::from_path(Path::new("out.flv")), Some(ContainerFormat::Flv));
        assert_eq!(ContainerFormat::from_path(Path::new("OUT.FLV")), Some(ContainerFormat::Flv));
        assert_eq!(ContainerFormat::from_path(Path::new("/dev/stdout")), Some(ContainerFormat::Flv));
        assert_eq!(ContainerFormat::from_path(Path::new("out.mkv")), None);
    }

    #[test]
    fn test_builder_keeps_defaults() {
        let config = SessionConfig::new(640, 480, 30).gop_size(30);
        assert_eq!(config.width, 640);
        assert_eq!(config.gop_size, 30);
        assert_eq!(config.video_bit_rate, 750_000);
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.variable_frame_samples, 10_000);
    }
}
