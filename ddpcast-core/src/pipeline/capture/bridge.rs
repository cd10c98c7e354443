//! Capture performed by another runtime or process.
//!
//! The bridge owns the platform capture service and hands back frames
//! that are already RGB24 at the target size, so the resampler runs
//! its identity path. Calls are synchronous request/response.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::CastError;
use crate::pipeline::capture::{BackendKind, Capabilities, Capture, CaptureBackend};
use crate::pipeline::types::{PixelFormat, RawFrame, TargetSize};

/// Narrow contract of an out-of-process capture service.
pub trait CaptureBridge: Send + Sync {
    /// Begin capturing at `target`. May fail with
    /// [`CastError::PermissionDenied`] when the user refuses consent.
    fn start_capture(&self, target: TargetSize) -> Result<(), CastError>;

    fn stop_capture(&self) -> Result<(), CastError>;

    fn is_capturing(&self) -> bool;

    /// Latest RGB24 frame at the target size, or `None` if nothing is
    /// available yet.
    fn capture_frame(&self) -> Option<Vec<u8>>;
}

/// PlatformBridge backend.
pub struct BridgeCapture {
    bridge: Arc<dyn CaptureBridge>,
    target: TargetSize,
    frame: Vec<u8>,
    started: bool,
}

impl BridgeCapture {
    pub fn new(bridge: Arc<dyn CaptureBridge>, target: TargetSize) -> Self {
        Self {
            bridge,
            target,
            frame: Vec::new(),
            started: false,
        }
    }
}

impl CaptureBackend for BridgeCapture {
    fn kind(&self) -> BackendKind {
        BackendKind::PlatformBridge
    }

    fn initialize(&mut self) -> Result<Capabilities, CastError> {
        self.bridge.start_capture(self.target).map_err(|e| match e {
            CastError::PermissionDenied => CastError::PermissionDenied,
            other => CastError::BackendInit {
                backend: BackendKind::PlatformBridge,
                reason: other.to_string(),
            },
        })?;
        self.started = true;
        Ok(Capabilities::new(
            BackendKind::PlatformBridge,
            false,
            self.target.width,
            self.target.height,
        ))
    }

    fn capture_once(&mut self, _timeout: Duration) -> Result<Capture<'_>, CastError> {
        if !self.bridge.is_capturing() {
            return Err(CastError::BackendLost {
                backend: BackendKind::PlatformBridge,
                reason: "bridge stopped capturing".into(),
            });
        }
        let Some(frame) = self.bridge.capture_frame() else {
            return Ok(Capture::NoNewFrame);
        };
        if frame.len() != self.target.frame_len() {
            warn!(
                "bridge frame has {} bytes, expected {} for {}",
                frame.len(),
                self.target.frame_len(),
                self.target
            );
            return Ok(Capture::NoNewFrame);
        }
        self.frame = frame;
        Ok(Capture::Frame(RawFrame {
            width: self.target.width,
            height: self.target.height,
            stride: self.target.width as usize * 3,
            format: PixelFormat::Rgb8,
            data: &self.frame,
        }))
    }
}

impl Drop for BridgeCapture {
    fn drop(&mut self) {
        if self.started {
            if let Err(e) = self.bridge.stop_capture() {
                debug!("bridge stop failed: {e}");
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
