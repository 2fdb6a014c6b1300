//! FLV (Flash Video) muxer.
//!
//! # Layout
//!
//! ```text
//! header      "FLV" 0x01 flags u32(9)
//! u32(0)      PreviousTagSize0
//! tag         type u8, size u24, timestamp u24 + ext u8, stream id u24, data
//! u32         PreviousTagSize = 11 + data size
//! ...
//! ```
//!
//! The first tag is an `onMetaData` script tag (AMF0). Tag timestamps are
//! milliseconds; packets keep the timebase their stream asked for and are
//! converted here.

use bytes::BufMut;
use livemux_codec::{rescale, ChannelLayout, CodecId, MediaKind, Packet, Rational};
use tracing::{debug, trace};

use super::{InterleaveQueue, Muxer, MuxerFlags, QueuedPacket, StreamInfo, StreamParameters};
use crate::avc;
use crate::{MuxError, Sink};

const FORMAT: &str = "flv";

const MILLIS: Rational = Rational::new(1, 1000);

const TAG_AUDIO: u8 = 8;
const TAG_VIDEO: u8 = 9;
const TAG_SCRIPT: u8 = 18;

const TAG_HEADER_LEN: usize = 11;

const HAS_AUDIO: u8 = 0x04;
const HAS_VIDEO: u8 = 0x01;

const FRAME_KEY: u8 = 1;
const FRAME_INTER: u8 = 2;

const VIDEO_SCREEN: u8 = 3;
const VIDEO_AVC: u8 = 7;

const AVC_SEQUENCE_HEADER: u8 = 0;
const AVC_NALU: u8 = 1;
const AVC_END_OF_SEQUENCE: u8 = 2;

const AUDIO_PCM_LE: u8 = 3;

const AMF_NUMBER: u8 = 0x00;
const AMF_BOOLEAN: u8 = 0x01;
const AMF_STRING: u8 = 0x02;
const AMF_ECMA_ARRAY: u8 = 0x08;
const AMF_OBJECT_END: u8 = 0x09;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    New,
    Opened,
    Writing,
    Finished,
}

#[derive(Debug)]
struct FlvStream {
    params: StreamParameters,
    sequence_header_sent: bool,
    last_ms: i64,
}

/// FLV muxer. Carries one video stream (Screen Video or H.264) and one audio
/// stream (linear PCM).
#[derive(Debug)]
pub struct FlvMuxer {
    state: State,
    sink: Option<Sink>,
    streams: Vec<FlvStream>,
    queue: InterleaveQueue,
    /// Offset of the `duration` number in the metadata tag.
    duration_offset: Option<u64>,
    /// Offset of the `filesize` number in the metadata tag.
    filesize_offset: Option<u64>,
    /// End of the latest packet written, in milliseconds.
    end_ms: i64,
    tags_written: u64,
}

impl Default for FlvMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl FlvMuxer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::New,
            sink: None,
            streams: Vec::new(),
            queue: InterleaveQueue::new(),
            duration_offset: None,
            filesize_offset: None,
            end_ms: 0,
            tags_written: 0,
        }
    }

    fn stream_of(&self, kind: MediaKind) -> Option<&FlvStream> {
        self.streams.iter().find(|s| s.params.kind() == kind)
    }

    fn sink(&mut self) -> Result<&mut Sink, MuxError> {
        self.sink.as_mut().ok_or(MuxError::InvalidState("not opened"))
    }

    fn write_tag(&mut self, tag_type: u8, timestamp_ms: i64, body: &[u8]) -> Result<(), MuxError> {
        let ts = timestamp_ms.clamp(0, u32::MAX as i64) as u32;
        let mut header = Vec::with_capacity(TAG_HEADER_LEN);
        header.put_u8(tag_type);
        header.put_uint(body.len() as u64, 3);
        header.put_uint((ts & 0x00ff_ffff) as u64, 3);
        header.put_u8((ts >> 24) as u8);
        header.put_uint(0, 3);

        let sink = self.sink()?;
        sink.write_all(&header)?;
        sink.write_all(body)?;
        sink.write_all(&((TAG_HEADER_LEN + body.len()) as u32).to_be_bytes())?;
        self.tags_written += 1;
        Ok(())
    }

    fn write_metadata(&mut self) -> Result<(), MuxError> {
        let video = self.stream_of(MediaKind::Video).map(|s| s.params.clone());
        let audio = self.stream_of(MediaKind::Audio).map(|s| s.params.clone());

        let mut body = Vec::new();
        body.put_u8(AMF_STRING);
        amf_string(&mut body, "onMetaData");
        body.put_u8(AMF_ECMA_ARRAY);
        let count_at = body.len();
        body.put_u32(0);

        let mut count = 0u32;
        let mut number = |body: &mut Vec<u8>, key: &str, value: f64| -> usize {
            count += 1;
            amf_string(body, key);
            body.put_u8(AMF_NUMBER);
            let at = body.len();
            body.put_f64(value);
            at
        };

        let duration_at = number(&mut body, "duration", 0.0);
        if let Some(video) = &video {
            number(&mut body, "width", video.width as f64);
            number(&mut body, "height", video.height as f64);
            number(&mut body, "videodatarate", video.bit_rate as f64 / 1024.0);
            number(&mut body, "framerate", video.time_base.invert().as_f64());
            number(&mut body, "videocodecid", video_codec_id(video.codec)? as f64);
        }
        if let Some(audio) = &audio {
            number(&mut body, "audiodatarate", audio.bit_rate as f64 / 1024.0);
            number(&mut body, "audiosamplerate", audio.sample_rate as f64);
            number(&mut body, "audiosamplesize", 16.0);
            number(&mut body, "audiocodecid", AUDIO_PCM_LE as f64);
        }
        let filesize_at = number(&mut body, "filesize", 0.0);
        if let Some(audio) = &audio {
            count += 1;
            amf_string(&mut body, "stereo");
            body.put_u8(AMF_BOOLEAN);
            body.put_u8(u8::from(audio.channel_layout == ChannelLayout::Stereo));
        }
        body[count_at..count_at + 4].copy_from_slice(&count.to_be_bytes());
        amf_string(&mut body, "");
        body.put_u8(AMF_OBJECT_END);

        let body_start = self.sink()?.position() + TAG_HEADER_LEN as u64;
        self.duration_offset = Some(body_start + duration_at as u64);
        self.filesize_offset = Some(body_start + filesize_at as u64);
        self.write_tag(TAG_SCRIPT, 0, &body)
    }

    fn write_packet(&mut self, packet: QueuedPacket) -> Result<(), MuxError> {
        let stream = self
            .streams
            .get(packet.stream_index)
            .ok_or(MuxError::InvalidStream(packet.stream_index))?;
        let time_base = stream.params.time_base;
        let codec = stream.params.codec;
        let dts_ms = rescale(packet.dts, time_base, MILLIS);
        let pts_ms = rescale(packet.pts, time_base, MILLIS);
        let end_ms = rescale(packet.dts + packet.duration, time_base, MILLIS);

        let frame_type = if packet.keyframe { FRAME_KEY } else { FRAME_INTER };
        match codec {
            CodecId::ScreenVideo => {
                let mut body = Vec::with_capacity(1 + packet.data.len());
                body.put_u8(frame_type << 4 | VIDEO_SCREEN);
                body.put_slice(&packet.data);
                self.write_tag(TAG_VIDEO, dts_ms, &body)?;
            }
            CodecId::H264 => self.write_avc(packet.stream_index, &packet, dts_ms, pts_ms)?,
            CodecId::PcmS16Le => {
                let stream = &self.streams[packet.stream_index];
                let flags = audio_flags(&stream.params)?;
                let mut body = Vec::with_capacity(1 + packet.data.len());
                body.put_u8(flags);
                body.put_slice(&packet.data);
                self.write_tag(TAG_AUDIO, dts_ms, &body)?;
            }
        }

        let stream = &mut self.streams[packet.stream_index];
        stream.last_ms = dts_ms;
        self.end_ms = self.end_ms.max(end_ms);
        Ok(())
    }

    fn write_avc(
        &mut self,
        index: usize,
        packet: &QueuedPacket,
        dts_ms: i64,
        pts_ms: i64,
    ) -> Result<(), MuxError> {
        let parsed = avc::parse_annex_b(&packet.data);

        if !self.streams[index].sequence_header_sent {
            let record = match (&self.streams[index].params.extradata, parsed.sps, parsed.pps) {
                (Some(extradata), _, _) => extradata.clone(),
                (None, Some(sps), Some(pps)) => avc::avc_decoder_config(sps, pps),
                _ => {
                    return Err(MuxError::InvalidData(
                        "first H.264 packet carries no SPS/PPS".into(),
                    ))
                }
            };
            let mut body = Vec::with_capacity(5 + record.len());
            body.put_u8(FRAME_KEY << 4 | VIDEO_AVC);
            body.put_u8(AVC_SEQUENCE_HEADER);
            body.put_uint(0, 3);
            body.put_slice(&record);
            self.write_tag(TAG_VIDEO, dts_ms, &body)?;
            self.streams[index].sequence_header_sent = true;
            debug!(bytes = record.len(), "AVC sequence header written");
        }

        let frame_type = if parsed.is_keyframe || packet.keyframe {
            FRAME_KEY
        } else {
            FRAME_INTER
        };
        let nalus = avc::annexb_to_avcc(&parsed.nals);
        let cts = (pts_ms - dts_ms).clamp(-(1 << 23), (1 << 23) - 1) as i32;
        let mut body = Vec::with_capacity(5 + nalus.len());
        body.put_u8(frame_type << 4 | VIDEO_AVC);
        body.put_u8(AVC_NALU);
        body.put_uint((cts as u32 & 0x00ff_ffff) as u64, 3);
        body.put_slice(&nalus);
        self.write_tag(TAG_VIDEO, dts_ms, &body)
    }

    fn patch_number(&mut self, offset: Option<u64>, value: f64) -> Result<(), MuxError> {
        let Some(offset) = offset else {
            return Ok(());
        };
        let sink = self.sink()?;
        let end = sink.position();
        sink.seek_to(offset)?;
        sink.write_all(&value.to_be_bytes())?;
        sink.seek_to(end)?;
        Ok(())
    }
}

impl Muxer for FlvMuxer {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn flags(&self) -> MuxerFlags {
        MuxerFlags::default()
    }

    fn default_video_codec(&self) -> Option<CodecId> {
        Some(CodecId::ScreenVideo)
    }

    fn default_audio_codec(&self) -> Option<CodecId> {
        Some(CodecId::PcmS16Le)
    }

    fn add_stream(&mut self, params: StreamParameters) -> Result<StreamInfo, MuxError> {
        if self.state != State::New && self.state != State::Opened {
            return Err(MuxError::InvalidState("past header"));
        }
        if self.stream_of(params.kind()).is_some() {
            return Err(MuxError::UnsupportedParameter {
                format: FORMAT,
                detail: format!("more than one {} stream", params.kind()),
            });
        }
        match params.kind() {
            MediaKind::Video => {
                video_codec_id(params.codec)?;
            }
            MediaKind::Audio => {
                audio_flags(&params)?;
            }
        }

        let index = self.queue.add_stream(params.time_base);
        let info = StreamInfo {
            index,
            time_base: params.time_base,
        };
        debug!(index, codec = params.codec.name(), time_base = %params.time_base, "flv stream added");
        self.streams.push(FlvStream {
            params,
            sequence_header_sent: false,
            last_ms: 0,
        });
        Ok(info)
    }

    fn set_stream_parameters(&mut self, index: usize, params: StreamParameters) -> Result<(), MuxError> {
        let stream = self.streams.get_mut(index).ok_or(MuxError::InvalidStream(index))?;
        if params.codec != stream.params.codec || params.time_base != stream.params.time_base {
            return Err(MuxError::UnsupportedParameter {
                format: FORMAT,
                detail: "codec or timebase changed after add_stream".into(),
            });
        }
        stream.params = params;
        Ok(())
    }

    fn open(&mut self, sink: Sink) -> Result<(), MuxError> {
        if self.state != State::New {
            return Err(MuxError::InvalidState("already opened"));
        }
        self.sink = Some(sink);
        self.state = State::Opened;
        Ok(())
    }

    fn write_header(&mut self) -> Result<(), MuxError> {
        if self.state != State::Opened {
            return Err(MuxError::InvalidState("not ready for a header"));
        }
        let mut flags = 0u8;
        if self.stream_of(MediaKind::Audio).is_some() {
            flags |= HAS_AUDIO;
        }
        if self.stream_of(MediaKind::Video).is_some() {
            flags |= HAS_VIDEO;
        }
        let mut header = Vec::with_capacity(13);
        header.put_slice(b"FLV");
        header.put_u8(1);
        header.put_u8(flags);
        header.put_u32(9);
        header.put_u32(0);
        self.sink()?.write_all(&header)?;

        self.write_metadata()?;
        self.state = State::Writing;
        Ok(())
    }

    fn write_interleaved(&mut self, packet: &mut Packet) -> Result<(), MuxError> {
        if self.state != State::Writing {
            return Err(MuxError::InvalidState("not writing packets"));
        }
        if packet.stream_index >= self.streams.len() {
            return Err(MuxError::InvalidStream(packet.stream_index));
        }
        self.queue.push(QueuedPacket::take(packet));
        while let Some(ready) = self.queue.pop_ready() {
            self.write_packet(ready)?;
        }
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<(), MuxError> {
        if self.state != State::Writing {
            return Err(MuxError::InvalidState("not writing packets"));
        }
        while let Some(queued) = self.queue.pop_earliest() {
            self.write_packet(queued)?;
        }

        if let Some(index) = self.streams.iter().position(|s| s.params.codec == CodecId::H264) {
            let last_ms = self.streams[index].last_ms;
            let mut body = Vec::with_capacity(5);
            body.put_u8(FRAME_KEY << 4 | VIDEO_AVC);
            body.put_u8(AVC_END_OF_SEQUENCE);
            body.put_uint(0, 3);
            self.write_tag(TAG_VIDEO, last_ms, &body)?;
        }

        let seekable = self.sink()?.is_seekable();
        if seekable {
            let filesize = self.sink()?.position() as f64;
            let duration = self.end_ms as f64 / 1000.0;
            self.patch_number(self.duration_offset, duration)?;
            self.patch_number(self.filesize_offset, filesize)?;
            trace!(duration, filesize, "flv metadata patched");
        }
        self.sink()?.flush()?;
        self.state = State::Finished;
        debug!(tags = self.tags_written, "flv trailer written");
        Ok(())
    }
}

fn amf_string(buf: &mut Vec<u8>, value: &str) {
    buf.put_u16(value.len() as u16);
    buf.put_slice(value.as_bytes());
}

fn video_codec_id(codec: CodecId) -> Result<u8, MuxError> {
    match codec {
        CodecId::ScreenVideo => Ok(VIDEO_SCREEN),
        CodecId::H264 => Ok(VIDEO_AVC),
        other => Err(MuxError::UnsupportedCodec {
            codec: other,
            format: FORMAT,
        }),
    }
}

/// First byte of every audio tag: format, rate index, 16-bit, channels.
fn audio_flags(params: &StreamParameters) -> Result<u8, MuxError> {
    if params.codec != CodecId::PcmS16Le {
        return Err(MuxError::UnsupportedCodec {
            codec: params.codec,
            format: FORMAT,
        });
    }
    let rate_index = match params.sample_rate {
        5512 => 0,
        11025 => 1,
        22050 => 2,
        44100 => 3,
        other => {
            return Err(MuxError::UnsupportedParameter {
                format: FORMAT,
                detail: format!("sample rate {other}"),
            })
        }
    };
    let stereo = u8::from(params.channel_layout == ChannelLayout::Stereo);
    Ok(AUDIO_PCM_LE << 4 | rate_index << 2 | 1 << 1 | stereo)
}
