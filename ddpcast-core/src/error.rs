//! Domain-specific error types for the mirroring pipeline.
//!
//! All fallible operations return `Result<T, CastError>`.
//! Backend-local failures are recovered inside the capture layer; only
//! start-time and stop-time outcomes reach the controller's caller.

use thiserror::Error;

use crate::pipeline::capture::BackendKind;

/// The canonical error type for the capture → resample → DDP pipeline.
#[derive(Debug, Error)]
pub enum CastError {
    // ── Session Errors ───────────────────────────────────────────
    /// The platform consent flow refused screen capture.
    #[error("screen capture permission denied")]
    PermissionDenied,

    /// Target dimensions, interval, or destination are unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A lifecycle transition was requested from the wrong state.
    #[error("invalid state transition: {0}")]
    InvalidTransition(&'static str),

    // ── Capture Errors ───────────────────────────────────────────
    /// A capture backend could not be brought up.
    #[error("{backend} backend failed to initialise: {reason}")]
    BackendInit { backend: BackendKind, reason: String },

    /// Every backend in the fallback chain failed to initialise.
    #[error("all capture backends failed: {0}")]
    AllBackendsFailed(String),

    /// The capture session was invalidated (mode switch, secure desktop…).
    #[error("capture session lost: {0}")]
    CaptureLost(String),

    /// A backend lost its session and could not reinitialise.
    #[error("{backend} backend lost: {reason}")]
    BackendLost { backend: BackendKind, reason: String },

    /// A raw frame's geometry does not match its buffer.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The capture thread panicked or could not be spawned.
    #[error("capture thread failure: {0}")]
    CaptureThread(String),

    // ── Network Errors ───────────────────────────────────────────
    /// The outbound datagram socket could not be opened.
    #[error("failed to bind datagram socket: {0}")]
    NetworkBind(#[source] std::io::Error),

    /// A datagram could not be handed to the OS.
    #[error("datagram send failed: {0}")]
    NetworkSend(#[source] std::io::Error),

    // ── Wire Errors ──────────────────────────────────────────────
    /// The payload does not fit the 16-bit length field.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A DDP header could not be parsed.
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    // ── Generic ──────────────────────────────────────────────────
    /// Any other I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl CastError {
    /// Errors that must abort backend fallback instead of trying the
    /// next variant.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CastError::PermissionDenied | CastError::InvalidConfiguration(_)
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for CastError {
    fn from(s: String) -> Self {
        CastError::Other(s)
    }
}

impl From<&str> for CastError {
    fn from(s: &str) -> Self {
        CastError::Other(s.to_string())
    }
}
