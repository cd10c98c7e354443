//! DXGI Desktop Duplication screen capture for Windows.
//!
//! Uses the Direct3D 11 Desktop Duplication API to obtain GPU-backed
//! screen frames with minimal CPU cost.
//!
//! # Platform
//!
//! This module is **Windows-only**. On other platforms the type is
//! still defined but initialisation fails, which moves the fallback
//! chain on to the next backend.

use std::time::Duration;

#[cfg(target_os = "windows")]
use tracing::warn;

use crate::error::CastError;
use crate::pipeline::capture::{BackendKind, Capabilities, Capture, CaptureBackend};
use crate::pipeline::types::{PixelFormat, RawFrame};

/// Consecutive acquire failures tolerated before the backend gives up.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
const MAX_CONSECUTIVE_FAILURES: u32 = 8;

/// `AcquireNextFrame` reads `u32::MAX` as INFINITE; stay one below it.
const MAX_ACQUIRE_TIMEOUT_MS: u32 = u32::MAX - 1;

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn acquire_timeout_ms(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis())
        .unwrap_or(MAX_ACQUIRE_TIMEOUT_MS)
        .min(MAX_ACQUIRE_TIMEOUT_MS)
}

/// DXGI-based screen capturer (the HardwareDuplication backend).
///
/// Wraps the `IDXGIOutputDuplication` pipeline:
///
/// 1. Create a D3D11 device.
/// 2. Enumerate outputs and duplicate the target monitor.
/// 3. Create a CPU-readable staging texture.
/// 4. On each [`capture_once`](CaptureBackend::capture_once):
///    - `AcquireNextFrame` (blocks up to the timeout).
///    - Copy the desktop texture to the staging texture.
///    - Map, copy into the owned buffer, unmap, release.
///
/// # Safety
///
/// All unsafe FFI calls are confined to the `platform` module.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
pub struct DxgiCapture {
    monitor_index: u32,
    width: u32,
    height: u32,
    /// Row pitch of the last mapped staging texture.
    stride: usize,
    buffer: Vec<u8>,
    consecutive_failures: u32,
    #[cfg(target_os = "windows")]
    session: Option<platform::DuplicationSession>,
}

impl DxgiCapture {
    /// Capturer for monitor `monitor_index` (0 = primary).
    pub fn new(monitor_index: u32) -> Self {
        Self {
            monitor_index,
            width: 0,
            height: 0,
            stride: 0,
            buffer: Vec::new(),
            consecutive_failures: 0,
            #[cfg(target_os = "windows")]
            session: None,
        }
    }

    #[cfg_attr(not(target_os = "windows"), allow(dead_code))]
    fn frame(&self) -> RawFrame<'_> {
        RawFrame {
            width: self.width,
            height: self.height,
            stride: self.stride,
            format: PixelFormat::Bgra8,
            data: &self.buffer,
        }
    }

    fn lost(&self, reason: String) -> CastError {
        CastError::BackendLost {
            backend: BackendKind::HardwareDuplication,
            reason,
        }
    }
}

// ── Windows implementation ───────────────────────────────────────

#[cfg(target_os = "windows")]
mod platform {
    use windows::{
        Win32::Graphics::{
            Direct3D::D3D_DRIVER_TYPE_HARDWARE,
            Direct3D11::*,
            Dxgi::{Common::*, *},
        },
        core::Interface,
    };

    pub(super) enum AcquireError {
        /// The duplication interface was invalidated (mode change,
        /// secure desktop, another process took over).
        AccessLost(String),
        Failed(String),
    }

    pub(super) struct DuplicationSession {
        #[allow(dead_code)]
        device: ID3D11Device,
        context: ID3D11DeviceContext,
        duplication: IDXGIOutputDuplication,
        staging_texture: ID3D11Texture2D,
        pub(super) width: u32,
        pub(super) height: u32,
    }

    impl DuplicationSession {
        pub(super) fn open(monitor_index: u32) -> Result<Self, String> {
            unsafe { Self::open_inner(monitor_index) }
        }

        unsafe fn open_inner(monitor_index: u32) -> Result<Self, String> {
            // 1. Create D3D11 device + immediate context.
            let mut device = None;
            let mut context = None;
            unsafe {
                D3D11CreateDevice(
                    None,
                    D3D_DRIVER_TYPE_HARDWARE,
                    None,
                    D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                    None,
                    D3D11_SDK_VERSION,
                    Some(&mut device),
                    None,
                    Some(&mut context),
                )
                .map_err(|e| format!("D3D11CreateDevice failed: {e}"))?;
            }
            let device: ID3D11Device = device.ok_or("D3D11 device is None")?;
            let context: ID3D11DeviceContext = context.ok_or("D3D11 context is None")?;

            // 2. Device → Adapter → Output.
            let dxgi_device: IDXGIDevice = device
                .cast()
                .map_err(|e| format!("cast to IDXGIDevice failed: {e}"))?;
            let adapter = unsafe {
                dxgi_device
                    .GetAdapter()
                    .map_err(|e| format!("GetAdapter failed: {e}"))?
            };
            let output: IDXGIOutput = unsafe {
                adapter
                    .EnumOutputs(monitor_index)
                    .map_err(|e| format!("EnumOutputs({monitor_index}) failed: {e}"))?
            };

            // 3. Duplicate the output.
            let output1: IDXGIOutput1 = output
                .cast()
                .map_err(|e| format!("cast to IDXGIOutput1 failed: {e}"))?;
            let duplication = unsafe {
                output1
                    .DuplicateOutput(&device)
                    .map_err(|e| format!("DuplicateOutput failed: {e}"))?
            };

            let dup_desc = unsafe { duplication.GetDesc() };
            let width = dup_desc.ModeDesc.Width;
            let height = dup_desc.ModeDesc.Height;

            // 4. CPU-readable staging texture covering the whole output.
            let staging_desc = D3D11_TEXTURE2D_DESC {
                Width: width,
                Height: height,
                MipLevels: 1,
                ArraySize: 1,
                Format: DXGI_FORMAT_B8G8R8A8_UNORM,
                SampleDesc: DXGI_SAMPLE_DESC {
                    Count: 1,
                    Quality: 0,
                },
                Usage: D3D11_USAGE_STAGING,
                BindFlags: 0,
                CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
                MiscFlags: 0,
            };
            let mut staging_texture = None;
            unsafe {
                device
                    .CreateTexture2D(&staging_desc, None, Some(&mut staging_texture))
                    .map_err(|e| format!("CreateTexture2D (staging) failed: {e}"))?;
            }
            let staging_texture = staging_texture.ok_or("staging texture is None")?;

            Ok(Self {
                device,
                context,
                duplication,
                staging_texture,
                width,
                height,
            })
        }

        /// Copy the next desktop frame into `buffer`.
        ///
        /// Returns the row pitch, or `None` when no frame arrived within
        /// `timeout_ms`.
        pub(super) fn acquire(
            &self,
            timeout_ms: u32,
            buffer: &mut Vec<u8>,
        ) -> Result<Option<usize>, AcquireError> {
            unsafe { self.acquire_inner(timeout_ms, buffer) }
        }

        unsafe fn acquire_inner(
            &self,
            timeout_ms: u32,
            buffer: &mut Vec<u8>,
        ) -> Result<Option<usize>, AcquireError> {
            let mut frame_info = DXGI_OUTDUPL_FRAME_INFO::default();
            let mut resource = None;

            match unsafe {
                self.duplication
                    .AcquireNextFrame(timeout_ms, &mut frame_info, &mut resource)
            } {
                Ok(()) => {}
                Err(e) if e.code() == DXGI_ERROR_WAIT_TIMEOUT => return Ok(None),
                Err(e) if e.code() == DXGI_ERROR_ACCESS_LOST => {
                    return Err(AcquireError::AccessLost(format!("{e}")));
                }
                Err(e) => {
                    return Err(AcquireError::Failed(format!("AcquireNextFrame failed: {e}")));
                }
            }

            let resource = match resource {
                Some(r) => r,
                None => {
                    let _ = unsafe { self.duplication.ReleaseFrame() };
                    return Err(AcquireError::Failed("acquired resource is None".into()));
                }
            };
            let texture: ID3D11Texture2D = resource.cast().map_err(|e| {
                let _ = unsafe { self.duplication.ReleaseFrame() };
                AcquireError::Failed(format!("cast to ID3D11Texture2D failed: {e}"))
            })?;

            // Copy GPU texture → staging texture, then release the frame early.
            unsafe {
                self.context.CopyResource(&self.staging_texture, &texture);
            }
            let _ = unsafe { self.duplication.ReleaseFrame() };

            let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
            unsafe {
                self.context
                    .Map(&self.staging_texture, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
                    .map_err(|e| AcquireError::Failed(format!("Map failed: {e}")))?;
            }

            let stride = mapped.RowPitch as usize;
            let total_bytes = stride * self.height as usize;
            let src = unsafe { std::slice::from_raw_parts(mapped.pData as *const u8, total_bytes) };
            buffer.clear();
            buffer.extend_from_slice(src);

            unsafe { self.context.Unmap(&self.staging_texture, 0) };

            Ok(Some(stride))
        }
    }
}

// The COM handles are only ever touched by the thread that currently
// owns the backend.
#[cfg(target_os = "windows")]
unsafe impl Send for DxgiCapture {}

#[cfg(target_os = "windows")]
impl CaptureBackend for DxgiCapture {
    fn kind(&self) -> BackendKind {
        BackendKind::HardwareDuplication
    }

    fn initialize(&mut self) -> Result<Capabilities, CastError> {
        let session = platform::DuplicationSession::open(self.monitor_index).map_err(|reason| {
            CastError::BackendInit {
                backend: BackendKind::HardwareDuplication,
                reason,
            }
        })?;
        self.width = session.width;
        self.height = session.height;
        self.stride = session.width as usize * 4;
        self.buffer = Vec::with_capacity(self.stride * session.height as usize);
        self.session = Some(session);
        self.consecutive_failures = 0;
        Ok(Capabilities::new(
            BackendKind::HardwareDuplication,
            true,
            self.width,
            self.height,
        ))
    }

    fn capture_once(&mut self, timeout: Duration) -> Result<Capture<'_>, CastError> {
        use platform::AcquireError;

        let timeout_ms = acquire_timeout_ms(timeout);
        let Some(session) = self.session.as_ref() else {
            return Err(self.lost("duplication session not initialised".into()));
        };

        match session.acquire(timeout_ms, &mut self.buffer) {
            Ok(Some(stride)) => {
                self.stride = stride;
                self.consecutive_failures = 0;
                Ok(Capture::Frame(self.frame()))
            }
            Ok(None) => Ok(Capture::NoNewFrame),
            Err(AcquireError::AccessLost(reason)) => {
                warn!("desktop duplication access lost ({reason}); reinitialising");
                self.session = None;
                match platform::DuplicationSession::open(self.monitor_index) {
                    Ok(session) => {
                        self.width = session.width;
                        self.height = session.height;
                        self.session = Some(session);
                        Ok(Capture::NoNewFrame)
                    }
                    Err(e) => Err(self.lost(format!("{reason}; reinitialise failed: {e}"))),
                }
            }
            Err(AcquireError::Failed(reason)) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    return Err(self.lost(reason));
                }
                warn!("desktop duplication capture failed: {reason}");
                Ok(Capture::NoNewFrame)
            }
        }
    }
}

// ── Non-Windows stub ─────────────────────────────────────────────

#[cfg(not(target_os = "windows"))]
impl CaptureBackend for DxgiCapture {
    fn kind(&self) -> BackendKind {
        BackendKind::HardwareDuplication
    }

    /// DXGI is only available on Windows.
    fn initialize(&mut self) -> Result<Capabilities, CastError> {
        Err(CastError::BackendInit {
            backend: BackendKind::HardwareDuplication,
            reason: format!(
                "DXGI Desktop Duplication is only available on Windows (monitor {})",
                self.monitor_index
            ),
        })
    }

    fn capture_once(&mut self, _timeout: Duration) -> Result<Capture<'_>, CastError> {
        Err(self.lost("not supported on this platform".into()))
    }
}
