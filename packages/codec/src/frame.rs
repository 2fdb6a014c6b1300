//! Raw video and audio frames.
//!
//! Plane storage sits behind an [`Arc`] so an encoder can keep a reference to a
//! frame it was handed (e.g. as the reference picture for the next inter frame)
//! without copying. Writers must call `ensure_exclusive()` before mutating a
//! frame that may have been submitted; mutation through `planes_mut()` on a
//! shared frame is refused.

use std::sync::Arc;

use crate::{ChannelLayout, CodecError, PixelFormat, SampleFormat};

/// Line size alignment for video planes.
const LINE_ALIGN: usize = 32;

const MAX_PLANES: usize = 3;

/// A raw video picture.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format of the planes.
    pub format: PixelFormat,
    /// Presentation timestamp in encoder timebase ticks.
    pub pts: i64,
    linesize: [usize; MAX_PLANES],
    planes: Arc<Vec<Vec<u8>>>,
}

impl VideoFrame {
    /// Allocate a zeroed frame with 32-byte aligned rows.
    pub fn alloc(format: PixelFormat, width: u32, height: u32) -> Result<Self, CodecError> {
        if width == 0 || height == 0 {
            return Err(CodecError::InvalidDimensions { width, height });
        }
        let mut linesize = [0usize; MAX_PLANES];
        let mut planes = Vec::with_capacity(format.plane_count());
        for plane in 0..format.plane_count() {
            let stride = format.plane_row_bytes(plane, width).next_multiple_of(LINE_ALIGN);
            linesize[plane] = stride;
            planes.push(vec![0u8; stride * format.plane_rows(plane, height)]);
        }
        Ok(Self {
            width,
            height,
            format,
            pts: 0,
            linesize,
            planes: Arc::new(planes),
        })
    }

    /// Bytes between the starts of two consecutive rows of `plane`.
    #[must_use]
    pub fn linesize(&self, plane: usize) -> usize {
        self.linesize[plane]
    }

    /// Raw plane storage including row padding.
    #[must_use]
    pub fn plane(&self, plane: usize) -> &[u8] {
        &self.planes[plane]
    }

    /// Pixel bytes of row `y` of `plane`, without padding.
    #[must_use]
    pub fn row(&self, plane: usize, y: usize) -> &[u8] {
        let start = y * self.linesize[plane];
        &self.planes[plane][start..start + self.format.plane_row_bytes(plane, self.width)]
    }

    /// Mutable access to every plane. Fails if another holder shares them.
    pub fn planes_mut(&mut self) -> Result<&mut [Vec<u8>], CodecError> {
        Arc::get_mut(&mut self.planes)
            .map(Vec::as_mut_slice)
            .ok_or_else(|| CodecError::conversion("video frame is shared; make it exclusive first"))
    }

    /// Returns true if an encoder (or anything else) still holds these planes.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.planes) > 1
    }

    /// Copy-on-write: give this frame its own planes if they are shared.
    ///
    /// Returns true if a copy was made.
    pub fn ensure_exclusive(&mut self) -> bool {
        let shared = self.is_shared();
        Arc::make_mut(&mut self.planes);
        shared
    }

    /// True if both frames point at the same plane storage.
    #[must_use]
    pub fn shares_planes_with(&self, other: &VideoFrame) -> bool {
        Arc::ptr_eq(&self.planes, &other.planes)
    }
}

/// A block of raw audio samples.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Sample format of the planes.
    pub format: SampleFormat,
    /// Channel layout.
    pub layout: ChannelLayout,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Presentation timestamp in encoder timebase ticks.
    pub pts: i64,
    nb_samples: usize,
    capacity: usize,
    planes: Arc<Vec<Vec<u8>>>,
}

impl AudioFrame {
    /// Allocate a zeroed (silent) frame able to hold `capacity` samples per
    /// channel. `nb_samples` starts at `capacity`.
    #[must_use]
    pub fn alloc(
        format: SampleFormat,
        layout: ChannelLayout,
        sample_rate: u32,
        capacity: usize,
    ) -> Self {
        let channels = layout.channels();
        let planes = if format.is_planar() {
            (0..channels)
                .map(|_| vec![0u8; capacity * format.bytes_per_sample()])
                .collect()
        } else {
            vec![vec![0u8; capacity * channels * format.bytes_per_sample()]]
        };
        Self {
            format,
            layout,
            sample_rate,
            pts: 0,
            nb_samples: capacity,
            capacity,
            planes: Arc::new(planes),
        }
    }

    /// Number of valid samples per channel.
    #[must_use]
    pub fn nb_samples(&self) -> usize {
        self.nb_samples
    }

    /// Allocated samples per channel.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Set the number of valid samples per channel.
    pub fn set_nb_samples(&mut self, nb_samples: usize) -> Result<(), CodecError> {
        if nb_samples > self.capacity {
            return Err(CodecError::conversion(format!(
                "{} samples exceed frame capacity {}",
                nb_samples, self.capacity
            )));
        }
        self.nb_samples = nb_samples;
        Ok(())
    }

    /// Number of planes (one per channel for planar formats, otherwise one).
    #[must_use]
    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    /// Bytes occupied by one sample across all channels of a single plane.
    #[must_use]
    pub fn bytes_per_group(&self) -> usize {
        if self.format.is_planar() {
            self.format.bytes_per_sample()
        } else {
            self.format.bytes_per_sample() * self.layout.channels()
        }
    }

    /// Whole plane storage (capacity, not just valid samples).
    #[must_use]
    pub fn plane(&self, plane: usize) -> &[u8] {
        &self.planes[plane]
    }

    /// Valid bytes of `plane`.
    #[must_use]
    pub fn data(&self, plane: usize) -> &[u8] {
        &self.planes[plane][..self.nb_samples * self.bytes_per_group()]
    }

    /// Mutable access to every plane. Fails if another holder shares them.
    pub fn planes_mut(&mut self) -> Result<&mut [Vec<u8>], CodecError> {
        Arc::get_mut(&mut self.planes)
            .map(Vec::as_mut_slice)
            .ok_or_else(|| CodecError::conversion("audio frame is shared; make it exclusive first"))
    }

    /// Returns true if an encoder (or anything else) still holds these planes.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.planes) > 1
    }

    /// Copy-on-write: give this frame its own planes if they are shared.
    ///
    /// Returns true if a copy was made.
    pub fn ensure_exclusive(&mut self) -> bool {
        let shared = self.is_shared();
        Arc::make_mut(&mut self.planes);
        shared
    }
}

/// A raw frame as handed to an encoder.
#[derive(Debug, Clone)]
pub enum Frame {
    Video(VideoFrame),
    Audio(AudioFrame),
}

impl Frame {
    /// Presentation timestamp in encoder timebase ticks.
    #[must_use]
    pub fn pts(&self) -> i64 {
        match self {
            Self::Video(frame) => frame.pts,
            Self::Audio(frame) => frame.pts,
        }
    }
}

impl From<VideoFrame> for Frame {
    fn from(frame: VideoFrame) -> Self {
        Self::Video(frame)
    }
}

impl From<AudioFrame> for Frame {
    fn from(frame: AudioFrame) -> Self {
        Self::Audio(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_alloc_aligns_rows() {
        let frame = VideoFrame::alloc(PixelFormat::Rgb24, 10, 4).unwrap();
        assert_eq!(frame.linesize(0), 32);
        assert_eq!(frame.plane(0).len(), 32 * 4);
        assert_eq!(frame.row(0, 3).len(), 30);
    }

    #[test]
    fn test_video_alloc_rejects_empty() {
        assert!(matches!(
            VideoFrame::alloc(PixelFormat::Yuv420p, 0, 4),
            Err(CodecError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_ensure_exclusive_copies_only_when_shared() {
        let mut frame = VideoFrame::alloc(PixelFormat::Bgr24, 16, 16).unwrap();
        assert!(!frame.ensure_exclusive());

        let held = frame.clone();
        assert!(frame.is_shared());
        assert!(frame.planes_mut().is_err());

        assert!(frame.ensure_exclusive());
        assert!(!frame.shares_planes_with(&held));
        frame.planes_mut().unwrap()[0][0] = 7;
        assert_eq!(held.plane(0)[0], 0);
    }

    #[test]
    fn test_audio_planar_layout() {
        let frame = AudioFrame::alloc(SampleFormat::F32p, ChannelLayout::Stereo, 48000, 128);
        assert_eq!(frame.plane_count(), 2);
        assert_eq!(frame.bytes_per_group(), 4);
        assert_eq!(frame.plane(1).len(), 512);

        let packed = AudioFrame::alloc(SampleFormat::S16, ChannelLayout::Stereo, 44100, 10);
        assert_eq!(packed.plane_count(), 1);
        assert_eq!(packed.bytes_per_group(), 4);
        assert_eq!(packed.data(0).len(), 40);
    }

    #[test]
    fn test_audio_nb_samples_bounded_by_capacity() {
        let mut frame = AudioFrame::alloc(SampleFormat::S16, ChannelLayout::Mono, 8000, 4);
        assert!(frame.set_nb_samples(5).is_err());
        frame.set_nb_samples(2).unwrap();
        assert_eq!(frame.data(0).len(), 4);
    }
}
