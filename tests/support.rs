use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use livemux::livemux_codec::{
    CodecError, CodecId, CodecParameters, Encoder, EncoderInfo, Frame, Packet,
};
use livemux::mux::{Muxer, MuxerFlags, StreamInfo, StreamParameters};
use livemux::{MuxError, Sink};

/// Thread-safe buffer that captures all writes for reuse in tests.
#[allow(dead_code)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Creates a new shared buffer and returns it along with a handle to the
    /// stored bytes.
    #[allow(dead_code)]
    pub fn new() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let inner = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                inner: inner.clone(),
            },
            inner,
        )
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.inner.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A writer whose every write fails.
#[allow(dead_code)]
pub struct BrokenPipe;

impl Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A writer that accepts everything until its switch is flipped, then fails.
#[allow(dead_code)]
pub struct ClosablePipe {
    closed: Arc<AtomicBool>,
}

impl ClosablePipe {
    #[allow(dead_code)]
    pub fn new() -> (Self, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        (
            Self {
                closed: closed.clone(),
            },
            closed,
        )
    }
}

impl Write for ClosablePipe {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// One FLV tag as found in a file.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct FlvTag {
    pub tag_type: u8,
    pub timestamp: u32,
    pub body: Vec<u8>,
}

/// Split an FLV file into tags, checking the header and back pointers.
#[allow(dead_code)]
pub fn flv_tags(data: &[u8]) -> Vec<FlvTag> {
    assert_eq!(&data[..3], b"FLV");
    assert_eq!(u32::from_be_bytes([data[5], data[6], data[7], data[8]]), 9);
    let mut tags = Vec::new();
    let mut pos = 13;
    while pos + 11 <= data.len() {
        let size = u32::from_be_bytes([0, data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        let timestamp = u32::from_be_bytes([data[pos + 7], data[pos + 4], data[pos + 5], data[pos + 6]]);
        let body = data[pos + 11..pos + 11 + size].to_vec();
        let end = pos + 11 + size;
        let back = u32::from_be_bytes([data[end], data[end + 1], data[end + 2], data[end + 3]]);
        assert_eq!(back as usize, 11 + size);
        tags.push(FlvTag {
            tag_type: data[pos],
            timestamp,
            body,
        });
        pos = end + 4;
    }
    assert_eq!(pos, data.len());
    tags
}

/// Read a numeric `onMetaData` property.
#[allow(dead_code)]
pub fn metadata_number(data: &[u8], key: &str) -> Option<f64> {
    let mut needle = (key.len() as u16).to_be_bytes().to_vec();
    needle.extend_from_slice(key.as_bytes());
    needle.push(0x00);
    let at = data.windows(needle.len()).position(|w| w == needle)? + needle.len();
    let bytes: [u8; 8] = data[at..at + 8].try_into().ok()?;
    Some(f64::from_be_bytes(bytes))
}

#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPacket {
    pub stream_index: usize,
    pub pts: i64,
    pub dts: i64,
    pub duration: i64,
    pub size: usize,
    pub keyframe: bool,
}

#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxEvent {
    StreamAdded { index: usize, codec: CodecId },
    Header,
    Packet(RecordedPacket),
    Trailer,
}

/// A muxer that writes nothing and records every call.
#[allow(dead_code)]
pub struct RecordingMuxer {
    streams: Vec<StreamParameters>,
    events: Arc<Mutex<Vec<MuxEvent>>>,
}

impl RecordingMuxer {
    #[allow(dead_code)]
    pub fn new() -> (Self, Arc<Mutex<Vec<MuxEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                streams: Vec::new(),
                events: events.clone(),
            },
            events,
        )
    }

    fn record(&self, event: MuxEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl Muxer for RecordingMuxer {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn flags(&self) -> MuxerFlags {
        MuxerFlags {
            global_header: false,
            no_file: true,
        }
    }

    fn default_video_codec(&self) -> Option<CodecId> {
        Some(CodecId::ScreenVideo)
    }

    fn default_audio_codec(&self) -> Option<CodecId> {
        Some(CodecId::PcmS16Le)
    }

    fn add_stream(&mut self, params: StreamParameters) -> Result<StreamInfo, MuxError> {
        let info = StreamInfo {
            index: self.streams.len(),
            time_base: params.time_base,
        };
        self.record(MuxEvent::StreamAdded {
            index: info.index,
            codec: params.codec,
        });
        self.streams.push(params);
        Ok(info)
    }

    fn set_stream_parameters(&mut self, index: usize, params: StreamParameters) -> Result<(), MuxError> {
        let slot = self.streams.get_mut(index).ok_or(MuxError::InvalidStream(index))?;
        *slot = params;
        Ok(())
    }

    fn open(&mut self, _sink: Sink) -> Result<(), MuxError> {
        Err(MuxError::InvalidState("recording muxer takes no sink"))
    }

    fn write_header(&mut self) -> Result<(), MuxError> {
        self.record(MuxEvent::Header);
        Ok(())
    }

    fn write_interleaved(&mut self, packet: &mut Packet) -> Result<(), MuxError> {
        self.record(MuxEvent::Packet(RecordedPacket {
            stream_index: packet.stream_index,
            pts: packet.pts,
            dts: packet.dts,
            duration: packet.duration,
            size: packet.data.len(),
            keyframe: packet.keyframe,
        }));
        packet.data.clear();
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<(), MuxError> {
        self.record(MuxEvent::Trailer);
        Ok(())
    }
}

/// Packets recorded for `stream_index`.
#[allow(dead_code)]
pub fn packets(events: &Mutex<Vec<MuxEvent>>, stream_index: usize) -> Vec<RecordedPacket> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            MuxEvent::Packet(p) if p.stream_index == stream_index => Some(p.clone()),
            _ => None,
        })
        .collect()
}

/// What a wrapped encoder was asked to do.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct EncoderLog {
    /// `(pts, samples)` of every frame submitted; samples is 0 for video.
    pub frames: Vec<(i64, usize)>,
    /// Audio sample bytes in submission order.
    pub audio: Vec<u8>,
    pub flushes: usize,
    pub drained: bool,
}

/// Delegates to a real encoder, logging every frame.
#[allow(dead_code)]
pub struct RecordingEncoder {
    inner: Box<dyn Encoder>,
    log: Arc<Mutex<EncoderLog>>,
}

impl RecordingEncoder {
    #[allow(dead_code)]
    pub fn wrap(inner: Box<dyn Encoder>) -> (Box<dyn Encoder>, Arc<Mutex<EncoderLog>>) {
        let log = Arc::new(Mutex::new(EncoderLog::default()));
        (
            Box::new(Self {
                inner,
                log: log.clone(),
            }),
            log,
        )
    }
}

impl Encoder for RecordingEncoder {
    fn info(&self) -> &'static EncoderInfo {
        self.inner.info()
    }

    fn open(&mut self, params: &CodecParameters) -> Result<(), CodecError> {
        self.inner.open(params)
    }

    fn send_frame(&mut self, frame: Option<&Frame>) -> Result<(), CodecError> {
        {
            let mut log = self.log.lock().unwrap();
            match frame {
                Some(Frame::Audio(audio)) => {
                    log.frames.push((audio.pts, audio.nb_samples()));
                    log.audio.extend_from_slice(audio.data(0));
                }
                Some(Frame::Video(video)) => log.frames.push((video.pts, 0)),
                None => log.flushes += 1,
            }
        }
        self.inner.send_frame(frame)
    }

    fn receive_packet(&mut self, packet: &mut Packet) -> Result<(), CodecError> {
        let result = self.inner.receive_packet(packet);
        if matches!(result, Err(CodecError::EndOfStream)) {
            self.log.lock().unwrap().drained = true;
        }
        result
    }

    fn frame_size(&self) -> Option<usize> {
        self.inner.frame_size()
    }

    fn extradata(&self) -> Option<&[u8]> {
        self.inner.extradata()
    }
}
