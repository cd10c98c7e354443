//! Mirroring session lifecycle.
//!
//! Provides a `SessionState` enum that models a controller session
//! from start to stop, with validated transitions that return `Result`
//! instead of panicking.

use std::time::{Duration, Instant};

use crate::error::CastError;

// ── SessionState ─────────────────────────────────────────────────

/// The current phase of a mirroring session.
///
/// ```text
///  Idle ──► Starting ──► Active ──► Stopping ──► Idle
///   ▲          │            │          ▲
///   │          ▼            ▼          │
///   └──── Error(reason) ───────────────┘
/// ```
///
/// `Error` is terminal until the next start or stop.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session. Initial state.
    #[default]
    Idle,

    /// Validating configuration and bringing up backend and transport.
    Starting,

    /// Frames are flowing.
    Active {
        /// When the session became active.
        since: Instant,
    },

    /// Capture thread is being joined and the socket released.
    Stopping,

    /// Start failed or the capture loop died.
    Error(String),
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Starting => write!(f, "Starting"),
            Self::Active { .. } => write!(f, "Active"),
            Self::Stopping => write!(f, "Stopping"),
            Self::Error(reason) => write!(f, "Error: {reason}"),
        }
    }
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error(reason) => Some(reason),
            _ => None,
        }
    }

    /// How long the session has been active.
    ///
    /// Returns `None` for any other phase.
    pub fn active_duration(&self) -> Option<Duration> {
        match self {
            Self::Active { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Starting`.
    ///
    /// Valid from: `Idle`, `Error` (a fresh start clears the error).
    pub fn begin_start(&mut self) -> Result<(), CastError> {
        match self {
            Self::Idle | Self::Error(_) => {
                *self = Self::Starting;
                Ok(())
            }
            _ => Err(CastError::InvalidTransition(
                "cannot start: session not idle",
            )),
        }
    }

    /// Transition to `Active`.
    ///
    /// Valid from: `Starting`.
    pub fn activate(&mut self) -> Result<(), CastError> {
        match self {
            Self::Starting => {
                *self = Self::Active {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(CastError::InvalidTransition(
                "cannot activate: not in Starting state",
            )),
        }
    }

    /// Transition to `Error`.
    ///
    /// Valid from: `Starting`, `Active`.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), CastError> {
        match self {
            Self::Starting | Self::Active { .. } => {
                *self = Self::Error(reason.into());
                Ok(())
            }
            _ => Err(CastError::InvalidTransition(
                "cannot fail: not in Starting or Active state",
            )),
        }
    }

    /// Transition to `Stopping`.
    ///
    /// Valid from: `Active`, `Error`.
    pub fn begin_stop(&mut self) -> Result<(), CastError> {
        match self {
            Self::Active { .. } | Self::Error(_) => {
                *self = Self::Stopping;
                Ok(())
            }
            _ => Err(CastError::InvalidTransition(
                "cannot stop: not in Active or Error state",
            )),
        }
    }

    /// Transition to `Idle`.
    ///
    /// Valid from: `Stopping`.
    pub fn finish_stop(&mut self) -> Result<(), CastError> {
        match self {
            Self::Stopping => {
                *self = Self::Idle;
                Ok(())
            }
            _ => Err(CastError::InvalidTransition(
                "cannot finish stop: not in Stopping state",
            )),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
