//! GDI `BitBlt` screen capture (the SoftwareBlit backend).
//!
//! Copies the screen device context into an off-screen bitmap and reads
//! the rows back as a top-down 24-bit DIB. Slower than duplication but
//! available on every Windows desktop.

use std::time::Duration;

use crate::error::CastError;
use crate::pipeline::capture::{BackendKind, Capabilities, Capture, CaptureBackend};
#[cfg(target_os = "windows")]
use crate::pipeline::types::{PixelFormat, RawFrame};

/// Row pitch of a 24-bit DIB: rows are padded to 4-byte boundaries.
pub fn dib_stride(width: u32) -> usize {
    (width as usize * 3 + 3) & !3
}

pub struct GdiCapture {
    #[cfg(target_os = "windows")]
    surface: Option<platform::BlitSurface>,
    #[cfg(target_os = "windows")]
    buffer: Vec<u8>,
}

impl GdiCapture {
    pub fn new() -> Self {
        Self {
            #[cfg(target_os = "windows")]
            surface: None,
            #[cfg(target_os = "windows")]
            buffer: Vec::new(),
        }
    }
}

impl Default for GdiCapture {
    fn default() -> Self {
        Self::new()
    }
}

// ── Windows implementation ───────────────────────────────────────

#[cfg(target_os = "windows")]
mod platform {
    use windows::Win32::Foundation::HWND;
    use windows::Win32::Graphics::Gdi::*;
    use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

    use super::dib_stride;

    /// Screen DC, memory DC and the bitmap selected into it.
    pub(super) struct BlitSurface {
        screen_dc: HDC,
        mem_dc: HDC,
        bitmap: HBITMAP,
        previous: HGDIOBJ,
        pub(super) width: u32,
        pub(super) height: u32,
    }

    impl BlitSurface {
        pub(super) fn open() -> Result<Self, String> {
            unsafe {
                let width = GetSystemMetrics(SM_CXSCREEN);
                let height = GetSystemMetrics(SM_CYSCREEN);
                if width <= 0 || height <= 0 {
                    return Err("no screen reported by GetSystemMetrics".into());
                }

                let screen_dc = GetDC(HWND::default());
                if screen_dc.is_invalid() {
                    return Err("GetDC(NULL) failed".into());
                }
                let mem_dc = CreateCompatibleDC(screen_dc);
                if mem_dc.is_invalid() {
                    ReleaseDC(HWND::default(), screen_dc);
                    return Err("CreateCompatibleDC failed".into());
                }
                let bitmap = CreateCompatibleBitmap(screen_dc, width, height);
                if bitmap.is_invalid() {
                    let _ = DeleteDC(mem_dc);
                    ReleaseDC(HWND::default(), screen_dc);
                    return Err("CreateCompatibleBitmap failed".into());
                }
                let previous = SelectObject(mem_dc, bitmap);

                Ok(Self {
                    screen_dc,
                    mem_dc,
                    bitmap,
                    previous,
                    width: width as u32,
                    height: height as u32,
                })
            }
        }

        /// Blit the screen and read it back into `buffer` as BGR rows.
        pub(super) fn grab(&self, buffer: &mut Vec<u8>) -> Result<usize, String> {
            let stride = dib_stride(self.width);
            buffer.resize(stride * self.height as usize, 0);

            unsafe {
                BitBlt(
                    self.mem_dc,
                    0,
                    0,
                    self.width as i32,
                    self.height as i32,
                    self.screen_dc,
                    0,
                    0,
                    SRCCOPY,
                )
                .map_err(|e| format!("BitBlt failed: {e}"))?;

                let mut info = BITMAPINFO {
                    bmiHeader: BITMAPINFOHEADER {
                        biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                        biWidth: self.width as i32,
                        // Negative height requests a top-down DIB.
                        biHeight: -(self.height as i32),
                        biPlanes: 1,
                        biBitCount: 24,
                        biCompression: BI_RGB.0,
                        ..Default::default()
                    },
                    ..Default::default()
                };
                let lines = GetDIBits(
                    self.mem_dc,
                    self.bitmap,
                    0,
                    self.height,
                    Some(buffer.as_mut_ptr().cast()),
                    &mut info,
                    DIB_RGB_COLORS,
                );
                if lines == 0 {
                    return Err("GetDIBits returned no scanlines".into());
                }
            }
            Ok(stride)
        }
    }

    impl Drop for BlitSurface {
        fn drop(&mut self) {
            unsafe {
                SelectObject(self.mem_dc, self.previous);
                let _ = DeleteObject(self.bitmap);
                let _ = DeleteDC(self.mem_dc);
                ReleaseDC(HWND::default(), self.screen_dc);
            }
        }
    }
}

// GDI handles are process-wide; the backend is used by one thread at a time.
#[cfg(target_os = "windows")]
unsafe impl Send for GdiCapture {}

#[cfg(target_os = "windows")]
impl CaptureBackend for GdiCapture {
    fn kind(&self) -> BackendKind {
        BackendKind::SoftwareBlit
    }

    fn initialize(&mut self) -> Result<Capabilities, CastError> {
        let surface = platform::BlitSurface::open().map_err(|reason| CastError::BackendInit {
            backend: BackendKind::SoftwareBlit,
            reason,
        })?;
        let caps = Capabilities::new(BackendKind::SoftwareBlit, false, surface.width, surface.height);
        self.buffer = Vec::with_capacity(dib_stride(surface.width) * surface.height as usize);
        self.surface = Some(surface);
        Ok(caps)
    }

    fn capture_once(&mut self, _timeout: Duration) -> Result<Capture<'_>, CastError> {
        let Some(surface) = self.surface.as_ref() else {
            return Err(CastError::BackendLost {
                backend: BackendKind::SoftwareBlit,
                reason: "blit surface not initialised".into(),
            });
        };
        let stride = surface
            .grab(&mut self.buffer)
            .map_err(|reason| CastError::BackendLost {
                backend: BackendKind::SoftwareBlit,
                reason,
            })?;
        Ok(Capture::Frame(RawFrame {
            width: surface.width,
            height: surface.height,
            stride,
            format: PixelFormat::Bgr8,
            data: &self.buffer,
        }))
    }
}

// ── Non-Windows stub ─────────────────────────────────────────────

#[cfg(not(target_os = "windows"))]
impl CaptureBackend for GdiCapture {
    fn kind(&self) -> BackendKind {
        BackendKind::SoftwareBlit
    }

    fn initialize(&mut self) -> Result<Capabilities, CastError> {
        Err(CastError::BackendInit {
            backend: BackendKind::SoftwareBlit,
            reason: "GDI capture is only available on Windows".into(),
        })
    }

    fn capture_once(&mut self, _timeout: Duration) -> Result<Capture<'_>, CastError> {
        Err(CastError::BackendLost {
            backend: BackendKind::SoftwareBlit,
            reason: "not supported on this platform".into(),
        })
    }
}
