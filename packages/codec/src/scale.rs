//! Pixel format conversion.
//!
//! Converts producer RGB24 pictures into whatever an encoder accepts. Both
//! sides must have the same dimensions; this converter never resizes.

use crate::{CodecError, PixelFormat, VideoFrame};

/// Interpolation quality requested for the conversion context.
///
/// Only meaningful when resizing; kept so callers state their intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleFlags {
    FastBilinear,
    Bilinear,
    #[default]
    Bicubic,
}

/// A conversion context bound to fixed source and destination geometry.
#[derive(Debug, Clone)]
pub struct Scaler {
    width: u32,
    height: u32,
    src_format: PixelFormat,
    dst_format: PixelFormat,
    flags: ScaleFlags,
}

impl Scaler {
    /// Create a context converting `src_format` pictures to `dst_format`.
    pub fn new(
        (src_width, src_height): (u32, u32),
        src_format: PixelFormat,
        (dst_width, dst_height): (u32, u32),
        dst_format: PixelFormat,
        flags: ScaleFlags,
    ) -> Result<Self, CodecError> {
        if src_width == 0 || src_height == 0 {
            return Err(CodecError::InvalidDimensions {
                width: src_width,
                height: src_height,
            });
        }
        if (src_width, src_height) != (dst_width, dst_height) {
            return Err(CodecError::conversion(format!(
                "resizing {}x{} to {}x{} is not supported",
                src_width, src_height, dst_width, dst_height
            )));
        }
        if src_format != PixelFormat::Rgb24 {
            return Err(CodecError::UnsupportedPixelFormat(src_format));
        }
        Ok(Self {
            width: src_width,
            height: src_height,
            src_format,
            dst_format,
            flags,
        })
    }

    /// Requested interpolation quality.
    #[must_use]
    pub fn flags(&self) -> ScaleFlags {
        self.flags
    }

    /// Convert `src` into `dst`. `dst` must not be shared.
    pub fn scale(&self, src: &VideoFrame, dst: &mut VideoFrame) -> Result<(), CodecError> {
        self.check(src, self.src_format, "source")?;
        self.check(dst, self.dst_format, "destination")?;

        match self.dst_format {
            PixelFormat::Rgb24 => self.copy_packed(src, dst, false),
            PixelFormat::Bgr24 => self.copy_packed(src, dst, true),
            PixelFormat::Yuv420p => self.rgb_to_yuv420p(src, dst),
            PixelFormat::Nv12 => self.rgb_to_nv12(src, dst),
        }
    }

    fn check(&self, frame: &VideoFrame, format: PixelFormat, side: &str) -> Result<(), CodecError> {
        if frame.width != self.width || frame.height != self.height || frame.format != format {
            return Err(CodecError::FrameMismatch(format!(
                "{} frame is {}x{} {:?}, context expects {}x{} {:?}",
                side, frame.width, frame.height, frame.format, self.width, self.height, format
            )));
        }
        Ok(())
    }

    fn copy_packed(&self, src: &VideoFrame, dst: &mut VideoFrame, swap: bool) -> Result<(), CodecError> {
        let stride = dst.linesize(0);
        let plane = &mut dst.planes_mut()?[0];
        for y in 0..self.height as usize {
            let row = src.row(0, y);
            let out = &mut plane[y * stride..y * stride + row.len()];
            if swap {
                for (o, i) in out.chunks_exact_mut(3).zip(row.chunks_exact(3)) {
                    o[0] = i[2];
                    o[1] = i[1];
                    o[2] = i[0];
                }
            } else {
                out.copy_from_slice(row);
            }
        }
        Ok(())
    }

    fn write_luma(&self, src: &VideoFrame, plane: &mut [u8], stride: usize) {
        for y in 0..self.height as usize {
            let row = src.row(0, y);
            let out = &mut plane[y * stride..y * stride + self.width as usize];
            for (o, px) in out.iter_mut().zip(row.chunks_exact(3)) {
                *o = luma(px[0], px[1], px[2]);
            }
        }
    }

    fn rgb_to_yuv420p(&self, src: &VideoFrame, dst: &mut VideoFrame) -> Result<(), CodecError> {
        let (y_stride, u_stride, v_stride) = (dst.linesize(0), dst.linesize(1), dst.linesize(2));
        let planes = dst.planes_mut()?;
        let (y_plane, chroma) = planes.split_at_mut(1);
        let (u_plane, v_plane) = chroma.split_at_mut(1);

        self.write_luma(src, &mut y_plane[0], y_stride);
        for cy in 0..(self.height as usize).div_ceil(2) {
            for cx in 0..(self.width as usize).div_ceil(2) {
                let (u, v) = self.chroma_at(src, cx * 2, cy * 2);
                u_plane[0][cy * u_stride + cx] = u;
                v_plane[0][cy * v_stride + cx] = v;
            }
        }
        Ok(())
    }

    fn rgb_to_nv12(&self, src: &VideoFrame, dst: &mut VideoFrame) -> Result<(), CodecError> {
        let (y_stride, uv_stride) = (dst.linesize(0), dst.linesize(1));
        let planes = dst.planes_mut()?;
        let (y_plane, uv_plane) = planes.split_at_mut(1);

        self.write_luma(src, &mut y_plane[0], y_stride);
        for cy in 0..(self.height as usize).div_ceil(2) {
            for cx in 0..(self.width as usize).div_ceil(2) {
                let (u, v) = self.chroma_at(src, cx * 2, cy * 2);
                let idx = cy * uv_stride + cx * 2;
                uv_plane[0][idx] = u;
                uv_plane[0][idx + 1] = v;
            }
        }
        Ok(())
    }

    /// Average chroma of the 2x2 block at (x, y), clamped at the edges.
    fn chroma_at(&self, src: &VideoFrame, x: usize, y: usize) -> (u8, u8) {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut sum = [0i32; 3];
        for dy in 0..2 {
            let row = src.row(0, (y + dy).min(h - 1));
            for dx in 0..2 {
                let idx = (x + dx).min(w - 1) * 3;
                sum[0] += row[idx] as i32;
                sum[1] += row[idx + 1] as i32;
                sum[2] += row[idx + 2] as i32;
            }
        }
        let (r, g, b) = (sum[0] / 4, sum[1] / 4, sum[2] / 4);

        // BT.601
        let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
        let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
        (u.clamp(0, 255) as u8, v.clamp(0, 255) as u8)
    }
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    // BT.601
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    y.clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_rgb(width: u32, height: u32, rgb: [u8; 3]) -> VideoFrame {
        let mut frame = VideoFrame::alloc(PixelFormat::Rgb24, width, height).unwrap();
        let stride = frame.linesize(0);
        let plane = &mut frame.planes_mut().unwrap()[0];
        for y in 0..height as usize {
            for px in plane[y * stride..y * stride + width as usize * 3].chunks_exact_mut(3) {
                px.copy_from_slice(&rgb);
            }
        }
        frame
    }

    #[test]
    fn test_rgb_to_yuv420p_red() {
        let src = solid_rgb(4, 4, [255, 0, 0]);
        let mut dst = VideoFrame::alloc(PixelFormat::Yuv420p, 4, 4).unwrap();
        let scaler = Scaler::new((4, 4), PixelFormat::Rgb24, (4, 4), PixelFormat::Yuv420p, ScaleFlags::Bicubic)
            .unwrap();
        scaler.scale(&src, &mut dst).unwrap();

        // Y of pure red is about 82 in BT.601 studio range.
        assert!(dst.row(0, 0).iter().all(|&y| y > 60 && y < 100));
        assert!(dst.row(2, 1)[0] > 200);
        assert!(dst.row(1, 1)[0] < 128);
    }

    #[test]
    fn test_rgb_to_bgr_swaps_channels() {
        let src = solid_rgb(3, 2, [1, 2, 3]);
        let mut dst = VideoFrame::alloc(PixelFormat::Bgr24, 3, 2).unwrap();
        let scaler = Scaler::new((3, 2), PixelFormat::Rgb24, (3, 2), PixelFormat::Bgr24, ScaleFlags::default())
            .unwrap();
        scaler.scale(&src, &mut dst).unwrap();
        assert_eq!(dst.row(0, 1), &[3, 2, 1, 3, 2, 1, 3, 2, 1]);
    }

    #[test]
    fn test_nv12_interleaves_chroma() {
        let src = solid_rgb(2, 2, [128, 128, 128]);
        let mut dst = VideoFrame::alloc(PixelFormat::Nv12, 2, 2).unwrap();
        let scaler = Scaler::new((2, 2), PixelFormat::Rgb24, (2, 2), PixelFormat::Nv12, ScaleFlags::default())
            .unwrap();
        scaler.scale(&src, &mut dst).unwrap();
        assert_eq!(dst.row(1, 0), &[128, 128]);
    }

    #[test]
    fn test_rejects_resize_and_shared_destination() {
        assert!(Scaler::new((4, 4), PixelFormat::Rgb24, (8, 8), PixelFormat::Rgb24, ScaleFlags::Bicubic).is_err());

        let scaler = Scaler::new((4, 4), PixelFormat::Rgb24, (4, 4), PixelFormat::Bgr24, ScaleFlags::Bicubic).unwrap();
        let src = solid_rgb(4, 4, [0, 0, 0]);
        let mut dst = VideoFrame::alloc(PixelFormat::Bgr24, 4, 4).unwrap();
        let _held = dst.clone();
        assert!(scaler.scale(&src, &mut dst).is_err());
    }
}
