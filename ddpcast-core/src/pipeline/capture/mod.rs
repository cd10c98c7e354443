//! Capture backends and the fallback chain that picks one.
//!
//! | Backend        | Mechanism                                  |
//! |----------------|--------------------------------------------|
//! | `dxgi`         | DXGI Desktop Duplication (GPU, Windows)    |
//! | `gdi`          | GDI `BitBlt` + `GetDIBits` (CPU, Windows)  |
//! | `bridge`       | Capture service in another runtime         |
//! | `pattern`      | Synthetic test pattern, any platform       |
//!
//! A [`BackendChain`] holds the variants in priority order. Selection
//! pops variants until one initialises; whatever remains is available
//! for a single runtime fallback.

pub mod bridge;
pub mod dxgi;
pub mod gdi;
pub mod pattern;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CastError;
use crate::pipeline::types::{RawFrame, TargetSize};

pub use bridge::{BridgeCapture, CaptureBridge};
pub use dxgi::DxgiCapture;
pub use gdi::GdiCapture;
pub use pattern::{Pattern, PatternCapture};

// ── BackendKind ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    HardwareDuplication,
    SoftwareBlit,
    PlatformBridge,
    TestPattern,
}

impl BackendKind {
    /// Human-readable name of the capture mechanism.
    pub fn capture_method(self) -> &'static str {
        match self {
            BackendKind::HardwareDuplication => "Desktop Duplication API",
            BackendKind::SoftwareBlit => "GDI BitBlt",
            BackendKind::PlatformBridge => "Platform capture bridge",
            BackendKind::TestPattern => "Test pattern",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::HardwareDuplication => write!(f, "hardware duplication"),
            BackendKind::SoftwareBlit => write!(f, "software blit"),
            BackendKind::PlatformBridge => write!(f, "platform bridge"),
            BackendKind::TestPattern => write!(f, "test pattern"),
        }
    }
}

// ── Capabilities ─────────────────────────────────────────────────

/// What an initialised backend reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub backend: BackendKind,
    pub capture_method: &'static str,
    pub hardware_accelerated: bool,
    pub screen_width: u32,
    pub screen_height: u32,
}

impl Capabilities {
    pub fn new(backend: BackendKind, hardware_accelerated: bool, width: u32, height: u32) -> Self {
        Self {
            backend,
            capture_method: backend.capture_method(),
            hardware_accelerated,
            screen_width: width,
            screen_height: height,
        }
    }
}

// ── CaptureBackend ───────────────────────────────────────────────

/// Result of one capture call.
#[derive(Debug)]
pub enum Capture<'a> {
    /// A frame borrowed from the backend; valid until the next call.
    Frame(RawFrame<'a>),
    /// Nothing new within the timeout; the caller reuses its last output.
    NoNewFrame,
}

/// One screen-capture strategy.
///
/// Implementations own their native handles exclusively. They are
/// moved onto the capture thread after [`initialize`](Self::initialize)
/// succeeds and dropped there when the session ends.
pub trait CaptureBackend: Send {
    fn kind(&self) -> BackendKind;

    /// Acquire native resources and describe the source.
    ///
    /// Fails with [`CastError::BackendInit`] when no usable output
    /// exists, or [`CastError::PermissionDenied`] when consent is refused.
    fn initialize(&mut self) -> Result<Capabilities, CastError>;

    /// Produce the next frame, blocking at most `timeout`.
    ///
    /// Transient session loss is handled internally with one
    /// reinitialisation; [`CastError::BackendLost`] means the caller
    /// should fall back.
    fn capture_once(&mut self, timeout: Duration) -> Result<Capture<'_>, CastError>;
}

/// Builds a fresh chain for every session start.
pub type BackendFactory = Arc<dyn Fn(TargetSize) -> BackendChain + Send + Sync>;

// ── BackendChain ─────────────────────────────────────────────────

/// An initialised backend together with its capability descriptor.
pub struct ActiveBackend {
    pub backend: Box<dyn CaptureBackend>,
    pub capabilities: Capabilities,
}

impl std::fmt::Debug for ActiveBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveBackend")
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Capture backends in fixed priority order.
#[derive(Default)]
pub struct BackendChain {
    pending: VecDeque<Box<dyn CaptureBackend>>,
}

impl BackendChain {
    pub fn new(backends: Vec<Box<dyn CaptureBackend>>) -> Self {
        Self {
            pending: backends.into(),
        }
    }

    /// HardwareDuplication, then SoftwareBlit.
    pub fn desktop() -> Self {
        Self::new(vec![
            Box::new(DxgiCapture::new(0)),
            Box::new(GdiCapture::new()),
        ])
    }

    /// A single PlatformBridge backend.
    pub fn bridge(bridge: Arc<dyn CaptureBridge>, target: TargetSize) -> Self {
        Self::new(vec![Box::new(BridgeCapture::new(bridge, target))])
    }

    pub fn push(&mut self, backend: Box<dyn CaptureBackend>) {
        self.pending.push_back(backend);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Initialise the remaining backends in order; the first to succeed wins.
    ///
    /// Terminal errors (permission refused) stop the walk immediately.
    pub fn select(&mut self) -> Result<ActiveBackend, CastError> {
        if self.pending.is_empty() {
            return Err(CastError::AllBackendsFailed(
                "no capture backends left".into(),
            ));
        }

        let mut failures = Vec::new();
        while let Some(mut backend) = self.pending.pop_front() {
            let kind = backend.kind();
            match backend.initialize() {
                Ok(capabilities) => {
                    info!(
                        "capture backend: {} ({}x{}, hardware accelerated: {})",
                        capabilities.capture_method,
                        capabilities.screen_width,
                        capabilities.screen_height,
                        capabilities.hardware_accelerated,
                    );
                    return Ok(ActiveBackend {
                        backend,
                        capabilities,
                    });
                }
                Err(e) if e.is_terminal() => return Err(e),
                Err(e) => {
                    warn!("{kind} backend unavailable: {e}");
                    failures.push(e.to_string());
                }
            }
        }
        Err(CastError::AllBackendsFailed(failures.join("; ")))
    }
}

// ── Tests ────────────────────────────────────────────────────────
