//! Encoder trait and the registry of built-in encoders.

use crate::{
    ChannelLayout, CodecError, CodecId, CodecParameters, Frame, MediaKind, Packet, PixelFormat,
    SampleFormat,
};

/// Push/pull encoder.
///
/// Frames go in with [`send_frame`](Encoder::send_frame), packets come out with
/// [`receive_packet`](Encoder::receive_packet). After every send the caller
/// must call `receive_packet` until it returns
/// [`CodecError::NeedMoreInput`]. Sending `None` starts the flush; from then
/// on `receive_packet` returns the buffered packets followed by
/// [`CodecError::EndOfStream`].
///
/// # Example
///
/// ```ignore
/// use livemux_codec::{find_encoder, CodecId, CodecParameters, CodecError, Packet};
///
/// let info = find_encoder(CodecId::ScreenVideo).unwrap();
/// let mut encoder = info.create();
/// encoder.open(&CodecParameters::video(CodecId::ScreenVideo, 320, 240, 25))?;
///
/// encoder.send_frame(Some(&frame))?;
/// let mut packet = Packet::default();
/// loop {
///     match encoder.receive_packet(&mut packet) {
///         Ok(()) => { /* write packet */ packet.unref(); }
///         Err(CodecError::NeedMoreInput) => break,
///         Err(e) => return Err(e),
///     }
/// }
/// ```
pub trait Encoder: Send {
    /// Static description of this encoder.
    fn info(&self) -> &'static EncoderInfo;

    /// Configure the encoder. Must be called once before any frame is sent.
    fn open(&mut self, params: &CodecParameters) -> Result<(), CodecError>;

    /// Submit a frame, or `None` to start draining.
    fn send_frame(&mut self, frame: Option<&Frame>) -> Result<(), CodecError>;

    /// Retrieve the next packet into `packet`.
    fn receive_packet(&mut self, packet: &mut Packet) -> Result<(), CodecError>;

    /// Samples per channel the encoder requires in every audio frame, or
    /// `None` if any size is accepted (or for video).
    fn frame_size(&self) -> Option<usize> {
        None
    }

    /// Out-of-band stream header, if the encoder was opened with
    /// `global_header` and produces one.
    fn extradata(&self) -> Option<&[u8]> {
        None
    }
}

/// Static description of an encoder implementation.
#[derive(Debug)]
pub struct EncoderInfo {
    /// Codec produced.
    pub id: CodecId,
    /// Short name.
    pub name: &'static str,
    /// Human readable name.
    pub long_name: &'static str,
    /// Accepted pixel formats (`None` = any).
    pub pixel_formats: Option<&'static [PixelFormat]>,
    /// Accepted sample formats (`None` = any).
    pub sample_formats: Option<&'static [SampleFormat]>,
    /// Accepted sample rates (`None` = any).
    pub sample_rates: Option<&'static [u32]>,
    /// Accepted channel layouts (`None` = any).
    pub channel_layouts: Option<&'static [ChannelLayout]>,
    /// Audio frames may carry any number of samples.
    pub variable_frame_size: bool,
    pub(crate) constructor: fn() -> Box<dyn Encoder>,
}

impl EncoderInfo {
    pub(crate) const fn new(
        id: CodecId,
        name: &'static str,
        long_name: &'static str,
        constructor: fn() -> Box<dyn Encoder>,
    ) -> Self {
        Self {
            id,
            name,
            long_name,
            pixel_formats: None,
            sample_formats: None,
            sample_rates: None,
            channel_layouts: None,
            variable_frame_size: false,
            constructor,
        }
    }

    /// Media kind of the produced codec.
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.id.kind()
    }

    /// Create a fresh, unopened encoder instance.
    #[must_use]
    pub fn create(&self) -> Box<dyn Encoder> {
        (self.constructor)()
    }
}

static ENCODERS: &[&EncoderInfo] = &[
    &crate::screen::INFO,
    &crate::pcm::INFO,
    #[cfg(feature = "openh264")]
    &crate::h264::INFO,
];

/// Look up a compiled-in encoder for `id`.
#[must_use]
pub fn find_encoder(id: CodecId) -> Option<&'static EncoderInfo> {
    ENCODERS.iter().copied().find(|info| info.id == id)
}

/// Look up a compiled-in encoder by its short name.
#[must_use]
pub fn find_encoder_by_name(name: &str) -> Option<&'static EncoderInfo> {
    ENCODERS.iter().copied().find(|info| info.name == name)
}

/// Every compiled-in encoder.
pub fn encoders() -> impl Iterator<Item = &'static EncoderInfo> {
    ENCODERS.iter().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_builtin_encoders() {
        let screen = find_encoder(CodecId::ScreenVideo).unwrap();
        assert_eq!(screen.name, "flashsv");
        assert_eq!(screen.kind(), MediaKind::Video);

        let pcm = find_encoder_by_name("pcm_s16le").unwrap();
        assert_eq!(pcm.id, CodecId::PcmS16Le);
        assert!(pcm.variable_frame_size);
    }

    #[cfg(not(feature = "openh264"))]
    #[test]
    fn test_h264_absent_without_feature() {
        assert!(find_encoder(CodecId::H264).is_none());
    }

    #[test]
    fn test_create_returns_matching_encoder() {
        for info in encoders() {
            assert_eq!(info.create().info().id, info.id);
        }
    }
}
