//! Bilinear resize from an arbitrary raw frame to fixed-size RGB24.
//!
//! For each destination pixel the source coordinate is `dst * src / dst_dim`;
//! the four neighbouring source pixels are blended horizontally, then
//! vertically. Channel order is remapped through
//! [`PixelFormat::rgb_offsets`], and every row is addressed through the
//! frame's stride.

use crate::error::CastError;
use crate::pipeline::types::{PixelFormat, RawFrame, ResampledFrame, TargetSize};

#[derive(Debug, Clone, Copy)]
pub struct FrameResampler {
    target: TargetSize,
}

impl FrameResampler {
    pub fn new(target: TargetSize) -> Self {
        Self { target }
    }

    /// Resample `src` into a freshly allocated frame.
    pub fn resample(&self, src: &RawFrame<'_>) -> Result<ResampledFrame, CastError> {
        let mut out = vec![0u8; self.target.frame_len()];
        self.resample_into(src, &mut out)?;
        ResampledFrame::new(self.target, out.into())
    }

    /// Resample `src` into `dst`, which must be exactly one target frame.
    ///
    /// On error `dst` is left untouched.
    pub fn resample_into(&self, src: &RawFrame<'_>, dst: &mut [u8]) -> Result<(), CastError> {
        if dst.len() != self.target.frame_len() {
            return Err(CastError::InvalidFrame(format!(
                "output buffer is {} bytes, target {} needs {}",
                dst.len(),
                self.target,
                self.target.frame_len()
            )));
        }
        src.validate()?;

        if src.format == PixelFormat::Rgb8
            && src.width == self.target.width
            && src.height == self.target.height
        {
            self.copy_rows(src, dst);
            return Ok(());
        }

        let (src_w, src_h) = (src.width as usize, src.height as usize);
        let (dst_w, dst_h) = (self.target.width as usize, self.target.height as usize);
        let bpp = src.format.bytes_per_pixel();
        let channels = src.format.rgb_offsets();
        let x_ratio = src_w as f32 / dst_w as f32;
        let y_ratio = src_h as f32 / dst_h as f32;

        for y in 0..dst_h {
            let sy = y as f32 * y_ratio;
            let y0 = (sy as usize).min(src_h - 1);
            let y1 = (y0 + 1).min(src_h - 1);
            let y_frac = sy - y0 as f32;
            let row0 = src.row(y0 as u32);
            let row1 = src.row(y1 as u32);

            for x in 0..dst_w {
                let sx = x as f32 * x_ratio;
                let x0 = (sx as usize).min(src_w - 1);
                let x1 = (x0 + 1).min(src_w - 1);
                let x_frac = sx - x0 as f32;
                let out = (y * dst_w + x) * 3;

                for (c, &offset) in channels.iter().enumerate() {
                    let c00 = row0[x0 * bpp + offset] as f32;
                    let c10 = row0[x1 * bpp + offset] as f32;
                    let c01 = row1[x0 * bpp + offset] as f32;
                    let c11 = row1[x1 * bpp + offset] as f32;

                    let top = c00 * (1.0 - x_frac) + c10 * x_frac;
                    let bottom = c01 * (1.0 - x_frac) + c11 * x_frac;
                    let value = top * (1.0 - y_frac) + bottom * y_frac;
                    dst[out + c] = value.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
        Ok(())
    }

    /// Identity path for sources already at the target size (bridge frames).
    fn copy_rows(&self, src: &RawFrame<'_>, dst: &mut [u8]) {
        let row_bytes = self.target.width as usize * 3;
        for (y, out) in dst.chunks_exact_mut(row_bytes).enumerate() {
            out.copy_from_slice(&src.row(y as u32)[..row_bytes]);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_bgra(width: u32, height: u32, stride: usize, rgb: [u8; 3]) -> Vec<u8> {
        let mut data = vec![0xEE; stride * height as usize];
        for y in 0..height as usize {
            for x in 0..width as usize {
                let p = y * stride + x * 4;
                data[p..p + 4].copy_from_slice(&[rgb[2], rgb[1], rgb[0], 255]);
            }
        }
        data
    }

    #[test]
    fn output_length_is_fixed_for_any_source() {
        let target = TargetSize::new(90, 50).unwrap();
        let r = FrameResampler::new(target);
        for (w, h) in [(1920, 1080), (90, 50), (7, 3), (1, 1), (300, 20)] {
            let stride = w as usize * 4 + 12;
            let data = solid_bgra(w, h, stride, [1, 2, 3]);
            let raw = RawFrame {
                width: w,
                height: h,
                stride,
                format: PixelFormat::Bgra8,
                data: &data,
            };
            assert_eq!(r.resample(&raw).unwrap().as_bytes().len(), 13500, "{w}x{h}");
        }
    }

    #[test]
    fn uniform_source_stays_uniform() {
        let color = [200, 17, 93];
        let data = solid_bgra(333, 171, 333 * 4 + 20, color);
        let raw = RawFrame {
            width: 333,
            height: 171,
            stride: 333 * 4 + 20,
            format: PixelFormat::Bgra8,
            data: &data,
        };
        for (w, h) in [(90, 50), (1, 1), (500, 400)] {
            let out = FrameResampler::new(TargetSize::new(w, h).unwrap())
                .resample(&raw)
                .unwrap();
            assert!(out.as_bytes().chunks(3).all(|px| px == color), "{w}x{h}");
        }
    }

    #[test]
    fn bgr_source_is_reordered() {
        // Left pixel pure blue, right pixel pure red, 24-bit rows padded to 4 bytes.
        let data = vec![255, 0, 0, 0, 0, 255, 0, 0];
        let raw = RawFrame {
            width: 2,
            height: 1,
            stride: 8,
            format: PixelFormat::Bgr8,
            data: &data,
        };
        let out = FrameResampler::new(TargetSize::new(2, 1).unwrap())
            .resample(&raw)
            .unwrap();
        assert_eq!(out.pixel(0, 0), Some([0, 0, 255]));
        assert_eq!(out.pixel(1, 0), Some([255, 0, 0]));
    }

    #[test]
    fn upscale_blends_between_neighbours() {
        let data = vec![0, 0, 0, 100, 100, 100];
        let raw = RawFrame {
            width: 2,
            height: 1,
            stride: 6,
            format: PixelFormat::Rgb8,
            data: &data,
        };
        let out = FrameResampler::new(TargetSize::new(4, 1).unwrap())
            .resample(&raw)
            .unwrap();
        assert_eq!(out.pixel(0, 0), Some([0, 0, 0]));
        assert_eq!(out.pixel(1, 0), Some([50, 50, 50]));
        assert_eq!(out.pixel(2, 0), Some([100, 100, 100]));
        assert_eq!(out.pixel(3, 0), Some([100, 100, 100]));
    }

    #[test]
    fn identity_copy_skips_row_padding() {
        let target = TargetSize::new(2, 2).unwrap();
        let data = vec![1, 2, 3, 4, 5, 6, 0, 0, 7, 8, 9, 10, 11, 12, 0, 0];
        let raw = RawFrame {
            width: 2,
            height: 2,
            stride: 8,
            format: PixelFormat::Rgb8,
            data: &data,
        };
        let out = FrameResampler::new(target).resample(&raw).unwrap();
        assert_eq!(out.as_bytes(), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn wrong_output_buffer_rejected() {
        let data = vec![0u8; 12];
        let raw = RawFrame {
            width: 2,
            height: 2,
            stride: 6,
            format: PixelFormat::Rgb8,
            data: &data,
        };
        let r = FrameResampler::new(TargetSize::new(2, 2).unwrap());
        let mut small = vec![0u8; 11];
        assert!(r.resample_into(&raw, &mut small).is_err());
    }
}
