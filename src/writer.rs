//! Hands encoded packets to the muxer in the stream's timebase.

use livemux_codec::{rescale, Packet, Rational};
use tracing::trace;

use crate::mux::{Muxer, StreamInfo};
use crate::MuxError;

/// Owns the container muxer for the lifetime of a session.
pub struct InterleavedWriter {
    muxer: Box<dyn Muxer>,
    packets_written: u64,
}

impl std::fmt::Debug for InterleavedWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterleavedWriter")
            .field("muxer", &self.muxer.name())
            .field("packets_written", &self.packets_written)
            .finish()
    }
}

impl InterleavedWriter {
    #[must_use]
    pub fn new(muxer: Box<dyn Muxer>) -> Self {
        Self {
            muxer,
            packets_written: 0,
        }
    }

    pub fn muxer_mut(&mut self) -> &mut dyn Muxer {
        self.muxer.as_mut()
    }

    /// Packets handed to the muxer so far.
    #[must_use]
    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    /// Rescale `packet` from `encoder_time_base` to the stream's timebase, tag
    /// it with the stream index and submit it for interleaved output.
    pub fn write(
        &mut self,
        packet: &mut Packet,
        encoder_time_base: Rational,
        stream: &StreamInfo,
    ) -> Result<(), MuxError> {
        packet.pts = rescale(packet.pts, encoder_time_base, stream.time_base);
        packet.dts = rescale(packet.dts, encoder_time_base, stream.time_base);
        packet.duration = rescale(packet.duration, encoder_time_base, stream.time_base);
        packet.stream_index = stream.index;

        log_packet(packet, stream.time_base);
        self.muxer.write_interleaved(packet)?;
        self.packets_written += 1;
        Ok(())
    }
}

fn log_packet(packet: &Packet, time_base: Rational) {
    let seconds = |ts: i64| ts as f64 * time_base.as_f64();
    trace!(
        stream = packet.stream_index,
        pts = packet.pts,
        pts_time = seconds(packet.pts),
        dts = packet.dts,
        dts_time = seconds(packet.dts),
        duration = packet.duration,
        duration_time = seconds(packet.duration),
        size = packet.data.len(),
        keyframe = packet.keyframe,
        "packet"
    );
}
