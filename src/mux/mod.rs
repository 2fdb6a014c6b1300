//! Container muxers.
//!
//! A [`Muxer`] receives stream descriptions, then a header call, then packets
//! already rescaled to each stream's timebase, then a trailer call. Packets may
//! arrive in any cross-stream order; [`InterleaveQueue`] restores timestamp
//! order before anything reaches the sink.

mod flv;
mod interleave;

pub use flv::FlvMuxer;
pub use interleave::{InterleaveQueue, QueuedPacket};

use livemux_codec::{ChannelLayout, CodecId, CodecParameters, MediaKind, Packet, Rational};

use crate::{ContainerFormat, MuxError, Sink};

/// Container capabilities that influence encoder configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MuxerFlags {
    /// Codec headers are stored once, out of band.
    pub global_header: bool,
    /// The muxer writes no bytes and needs no sink.
    pub no_file: bool,
}

/// Description of one elementary stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamParameters {
    pub codec: CodecId,
    /// Timebase the packets will be expressed in, as requested by the encoder.
    pub time_base: Rational,
    pub bit_rate: u64,
    pub width: u32,
    pub height: u32,
    pub sample_rate: u32,
    pub channel_layout: ChannelLayout,
    /// Out-of-band codec header, if the encoder produced one.
    pub extradata: Option<Vec<u8>>,
}

impl StreamParameters {
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.codec.kind()
    }

    /// Attach (or clear) the codec header.
    #[must_use]
    pub fn extradata(mut self, extradata: Option<&[u8]>) -> Self {
        self.extradata = extradata.map(<[u8]>::to_vec);
        self
    }
}

impl From<&CodecParameters> for StreamParameters {
    fn from(params: &CodecParameters) -> Self {
        Self {
            codec: params.codec,
            time_base: params.time_base,
            bit_rate: params.bit_rate,
            width: params.width,
            height: params.height,
            sample_rate: params.sample_rate,
            channel_layout: params.channel_layout,
            extradata: None,
        }
    }
}

/// A registered stream as assigned by the muxer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub index: usize,
    /// Timebase packets for this stream must be expressed in.
    pub time_base: Rational,
}

/// A container writer.
pub trait Muxer: Send {
    /// Short container name.
    fn name(&self) -> &'static str;

    fn flags(&self) -> MuxerFlags;

    /// Video codec used when the configuration does not name one, or `None`
    /// if the container carries no video.
    fn default_video_codec(&self) -> Option<CodecId>;

    /// Audio codec used when the configuration does not name one, or `None`
    /// if the container carries no audio.
    fn default_audio_codec(&self) -> Option<CodecId>;

    /// Register a stream. Must be called before [`write_header`](Muxer::write_header).
    fn add_stream(&mut self, params: StreamParameters) -> Result<StreamInfo, MuxError>;

    /// Replace a stream's parameters once its encoder is open.
    fn set_stream_parameters(&mut self, index: usize, params: StreamParameters) -> Result<(), MuxError>;

    /// Attach the output.
    fn open(&mut self, sink: Sink) -> Result<(), MuxError>;

    fn write_header(&mut self) -> Result<(), MuxError>;

    /// Queue a packet for interleaved output. The payload is taken out of
    /// `packet`; timestamps must already be in the stream's timebase.
    fn write_interleaved(&mut self, packet: &mut Packet) -> Result<(), MuxError>;

    /// Flush queued packets and finish the file.
    fn write_trailer(&mut self) -> Result<(), MuxError>;
}

/// Create the muxer for `format`.
#[must_use]
pub fn create_muxer(format: ContainerFormat) -> Box<dyn Muxer> {
    match format {
        ContainerFormat::Flv => Box::new(FlvMuxer::new()),
    }
}
