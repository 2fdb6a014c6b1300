//! Cross-stream packet interleaving.

use std::cmp::Ordering;
use std::collections::VecDeque;

use bytes::Bytes;
use livemux_codec::{compare_ts, Packet, Rational};

/// How far one stream may run ahead of a silent one before packets are
/// released anyway, in microseconds.
const MAX_INTERLEAVE_DELTA_US: i64 = 10_000_000;

const MICROS: Rational = Rational::new(1, 1_000_000);

/// A packet waiting in the interleaving buffer.
#[derive(Debug, Clone)]
pub struct QueuedPacket {
    pub stream_index: usize,
    pub pts: i64,
    pub dts: i64,
    pub duration: i64,
    pub keyframe: bool,
    pub data: Bytes,
}

impl QueuedPacket {
    /// Copy the payload and timing out of `packet`, leaving it empty.
    ///
    /// The packet keeps its allocation so the encoder can refill it.
    pub fn take(packet: &mut Packet) -> Self {
        let queued = Self {
            stream_index: packet.stream_index,
            pts: packet.pts,
            dts: packet.dts,
            duration: packet.duration,
            keyframe: packet.keyframe,
            data: Bytes::copy_from_slice(&packet.data),
        };
        packet.data.clear();
        queued
    }
}

/// Per-stream FIFOs released in dts order.
///
/// A packet is released once every stream has something queued (so nothing
/// earlier can still arrive), or once the queued span exceeds the maximum
/// interleave delta.
#[derive(Debug, Default)]
pub struct InterleaveQueue {
    queues: Vec<VecDeque<QueuedPacket>>,
    time_bases: Vec<Rational>,
}

impl InterleaveQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stream; returns its index.
    pub fn add_stream(&mut self, time_base: Rational) -> usize {
        self.queues.push(VecDeque::new());
        self.time_bases.push(time_base);
        self.queues.len() - 1
    }

    pub fn push(&mut self, packet: QueuedPacket) {
        self.queues[packet.stream_index].push_back(packet);
    }

    /// Number of queued packets across all streams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Next packet that can be written without breaking dts order.
    pub fn pop_ready(&mut self) -> Option<QueuedPacket> {
        let all_queued = self.queues.iter().all(|q| !q.is_empty());
        if all_queued || self.span_us() > MAX_INTERLEAVE_DELTA_US {
            self.pop_earliest()
        } else {
            None
        }
    }

    /// Next packet regardless of missing streams. Used when flushing.
    pub fn pop_earliest(&mut self) -> Option<QueuedPacket> {
        let mut best: Option<usize> = None;
        for (index, queue) in self.queues.iter().enumerate() {
            let Some(head) = queue.front() else { continue };
            let earlier = match best {
                None => true,
                Some(b) => {
                    let other = &self.queues[b][0];
                    compare_ts(head.dts, self.time_bases[index], other.dts, self.time_bases[b])
                        == Ordering::Less
                }
            };
            if earlier {
                best = Some(index);
            }
        }
        best.and_then(|index| self.queues[index].pop_front())
    }

    /// Distance between the earliest queued head and the latest queued tail.
    fn span_us(&self) -> i64 {
        let to_us = |p: &QueuedPacket| livemux_codec::rescale(p.dts, self.time_bases[p.stream_index], MICROS);
        let first = self.queues.iter().filter_map(VecDeque::front).map(to_us).min();
        let last = self.queues.iter().filter_map(VecDeque::back).map(to_us).max();
        match (first, last) {
            (Some(first), Some(last)) => last - first,
            _ => 0,
        }
    }
}
