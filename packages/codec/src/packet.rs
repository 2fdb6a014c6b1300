//! Compressed packets.

use bytes::BytesMut;

/// A compressed unit produced by an encoder.
///
/// The pipeline owns one packet per stream and hands it to
/// [`Encoder::receive_packet`](crate::Encoder::receive_packet) repeatedly;
/// [`unref`](Packet::unref) keeps the payload allocation for the next call.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    /// Compressed payload.
    pub data: BytesMut,
    /// Presentation timestamp.
    pub pts: i64,
    /// Decode timestamp.
    pub dts: i64,
    /// Duration in the same timebase as `pts`.
    pub duration: i64,
    /// Index of the container stream this packet belongs to.
    pub stream_index: usize,
    /// Whether the packet can be decoded on its own.
    pub keyframe: bool,
}

impl Packet {
    /// Create an empty packet with a payload capacity hint.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            ..Default::default()
        }
    }

    /// Clear payload and fields, keeping the allocation.
    pub fn unref(&mut self) {
        self.data.clear();
        self.pts = 0;
        self.dts = 0;
        self.duration = 0;
        self.stream_index = 0;
        self.keyframe = false;
    }

    /// True if the packet carries no payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Fill the packet with timing and a payload copied from `data`.
    pub fn fill(&mut self, data: &[u8], pts: i64, duration: i64, keyframe: bool) {
        self.data.clear();
        self.data.extend_from_slice(data);
        self.pts = pts;
        self.dts = pts;
        self.duration = duration;
        self.keyframe = keyframe;
    }
}
