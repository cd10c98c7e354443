//! Synthetic capture source.
//!
//! Produces BGRA frames with padded rows, the same shape the desktop
//! backends deliver, so the full pipeline can run on machines without
//! a capturable display.

use std::time::Duration;

use crate::error::CastError;
use crate::pipeline::capture::{BackendKind, Capabilities, Capture, CaptureBackend};
use crate::pipeline::types::{PixelFormat, RawFrame};

/// Row alignment applied to generated frames.
const ROW_ALIGN: usize = 64;

const BAR_COLORS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Every pixel the same RGB color.
    Solid([u8; 3]),
    /// Eight vertical color bars scrolling one step per frame.
    Bars,
}

pub struct PatternCapture {
    width: u32,
    height: u32,
    stride: usize,
    pattern: Pattern,
    buffer: Vec<u8>,
    frame_number: u64,
}

impl PatternCapture {
    pub fn new(width: u32, height: u32, pattern: Pattern) -> Self {
        let stride = (width as usize * 4).div_ceil(ROW_ALIGN) * ROW_ALIGN;
        Self {
            width,
            height,
            stride,
            pattern,
            buffer: Vec::new(),
            frame_number: 0,
        }
    }

    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::new(width, height, Pattern::Solid(rgb))
    }

    pub fn bars(width: u32, height: u32) -> Self {
        Self::new(width, height, Pattern::Bars)
    }

    fn render(&mut self) {
        let bar_width = (self.width as usize / BAR_COLORS.len()).max(1);
        let shift = self.frame_number as usize * 2;
        for y in 0..self.height as usize {
            let row = &mut self.buffer[y * self.stride..y * self.stride + self.width as usize * 4];
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let rgb = match self.pattern {
                    Pattern::Solid(rgb) => rgb,
                    Pattern::Bars => BAR_COLORS[((x + shift) / bar_width) % BAR_COLORS.len()],
                };
                px.copy_from_slice(&[rgb[2], rgb[1], rgb[0], 0xFF]);
            }
        }
    }
}

impl CaptureBackend for PatternCapture {
    fn kind(&self) -> BackendKind {
        BackendKind::TestPattern
    }

    fn initialize(&mut self) -> Result<Capabilities, CastError> {
        if self.width == 0 || self.height == 0 {
            return Err(CastError::BackendInit {
                backend: BackendKind::TestPattern,
                reason: format!("empty pattern {}x{}", self.width, self.height),
            });
        }
        self.buffer = vec![0; self.stride * self.height as usize];
        self.frame_number = 0;
        self.render();
        Ok(Capabilities::new(
            BackendKind::TestPattern,
            false,
            self.width,
            self.height,
        ))
    }

    fn capture_once(&mut self, _timeout: Duration) -> Result<Capture<'_>, CastError> {
        if self.buffer.is_empty() {
            return Err(CastError::BackendLost {
                backend: BackendKind::TestPattern,
                reason: "pattern not initialised".into(),
            });
        }
        if self.pattern == Pattern::Bars {
            self.frame_number += 1;
            self.render();
        }
        Ok(Capture::Frame(RawFrame {
            width: self.width,
            height: self.height,
            stride: self.stride,
            format: PixelFormat::Bgra8,
            data: &self.buffer,
        }))
    }
}
