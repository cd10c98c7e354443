//! Shared frame types for the capture → resample → send pipeline.
//!
//! [`RawFrame`] borrows a backend-owned buffer and is only valid until
//! the next capture call. [`ResampledFrame`] is the fixed-size RGB24
//! output that travels to the slot and the wire.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::CastError;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout for raw captured frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 4 bytes per pixel: Blue, Green, Red, Alpha (DXGI default).
    Bgra8,
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
    /// 3 bytes per pixel: Blue, Green, Red (24-bit DIB).
    Bgr8,
    /// 3 bytes per pixel: Red, Green, Blue.
    Rgb8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => 4,
            PixelFormat::Bgr8 | PixelFormat::Rgb8 => 3,
        }
    }

    /// Byte offsets of the red, green and blue channels within a pixel.
    pub const fn rgb_offsets(self) -> [usize; 3] {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Bgr8 => [2, 1, 0],
            PixelFormat::Rgba8 | PixelFormat::Rgb8 => [0, 1, 2],
        }
    }
}

// ── RawFrame ─────────────────────────────────────────────────────

/// A raw, uncompressed screen capture borrowed from its backend.
///
/// The `data` buffer holds `height` rows of `stride` bytes each.
/// `stride` may be larger than `width * bytes_per_pixel` due to
/// GPU or DIB row alignment.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub width: u32,
    pub height: u32,
    /// Row pitch in **bytes**.
    pub stride: usize,
    pub format: PixelFormat,
    pub data: &'a [u8],
}

impl<'a> RawFrame<'a> {
    /// Check that the buffer covers every row the geometry describes.
    pub fn validate(&self) -> Result<(), CastError> {
        if self.width == 0 || self.height == 0 {
            return Err(CastError::InvalidFrame(format!(
                "empty frame {}x{}",
                self.width, self.height
            )));
        }
        let row_bytes = self.width as usize * self.format.bytes_per_pixel();
        if self.stride < row_bytes {
            return Err(CastError::InvalidFrame(format!(
                "stride {} shorter than row of {row_bytes} bytes",
                self.stride
            )));
        }
        let needed = self.stride * (self.height as usize - 1) + row_bytes;
        if self.data.len() < needed {
            return Err(CastError::InvalidFrame(format!(
                "buffer holds {} bytes, geometry needs {needed}",
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Returns a row slice (including possible padding bytes).
    pub fn row(&self, y: u32) -> &'a [u8] {
        let start = y as usize * self.stride;
        let end = (start + self.stride).min(self.data.len());
        &self.data[start..end]
    }
}

// ── TargetSize ───────────────────────────────────────────────────

/// Fixed output resolution of the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    pub fn new(width: u32, height: u32) -> Result<Self, CastError> {
        if width == 0 || height == 0 {
            return Err(CastError::InvalidConfiguration(format!(
                "target dimensions must be positive, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }

    /// Size of one RGB24 frame: `width * height * 3`.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl Default for TargetSize {
    fn default() -> Self {
        Self {
            width: 90,
            height: 50,
        }
    }
}

impl std::fmt::Display for TargetSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ── ResampledFrame ───────────────────────────────────────────────

/// Tightly packed RGB24 frame at the target resolution.
///
/// The length is always exactly `width * height * 3`; the constructor
/// refuses anything else. Cloning shares the underlying buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResampledFrame {
    size: TargetSize,
    data: Bytes,
}

impl ResampledFrame {
    pub fn new(size: TargetSize, data: Bytes) -> Result<Self, CastError> {
        if data.len() != size.frame_len() {
            return Err(CastError::InvalidFrame(format!(
                "{size} frame needs {} bytes, got {}",
                size.frame_len(),
                data.len()
            )));
        }
        Ok(Self { size, data })
    }

    /// Copy `rgb` into a new frame.
    pub fn copy_from(size: TargetSize, rgb: &[u8]) -> Result<Self, CastError> {
        Self::new(size, Bytes::copy_from_slice(rgb))
    }

    pub fn size(&self) -> TargetSize {
        self.size
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    /// RGB triplet at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        let i = (y as usize * self.size.width as usize + x as usize) * 3;
        Some([self.data[i], self.data[i + 1], self.data[i + 2]])
    }
}
