//! # Mirroring pipeline
//!
//! Turns a live display into a steady stream of fixed-size RGB24
//! frames pushed to an LED matrix over DDP.
//!
//! ## Architecture
//!
//! ```text
//!  MirroringController
//!   │ start / stop
//!   ▼
//! ┌──────────────────────── capture thread ─────────────────────────┐
//! │ CaptureBackend ──► FrameResampler ──► LatestFrameSlot           │
//! │  (dxgi│gdi│bridge│pattern)                │                     │
//! │                                           ▼                     │
//! │                                   DdpSink: DdpEncoder ──► Transport ──► UDP
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Sub-modules
//!
//! | Module       | Purpose                                            |
//! |------------- |----------------------------------------------------|
//! | `types`      | Raw and resampled frame types, target size         |
//! | `capture`    | Capture backends and the fallback chain            |
//! | `resample`   | Bilinear resize to tightly packed RGB24            |
//! | `slot`       | Latest-wins single frame buffer                    |
//! | `scheduler`  | Paced capture loop on a dedicated thread           |
//! | `transport`  | Persistent UDP socket and the DDP frame sink       |
//! | `stats`      | Session counters and frame-rate meter              |
//! | `controller` | Session lifecycle and configuration                |

pub mod capture;
pub mod controller;
pub mod resample;
pub mod scheduler;
pub mod slot;
pub mod stats;
pub mod transport;
pub mod types;

// ── Re-exports ───────────────────────────────────────────────────

pub use capture::{
    BackendChain, BackendFactory, BackendKind, BridgeCapture, Capabilities, Capture,
    CaptureBackend, CaptureBridge, DxgiCapture, GdiCapture, Pattern, PatternCapture,
};
pub use controller::{MirrorConfig, MirroringController, PermissionGate};
pub use resample::FrameResampler;
pub use scheduler::{CaptureScheduler, FrameSink, SchedulerConfig, SchedulerState};
pub use slot::LatestFrameSlot;
pub use stats::{PipelineStats, RateMeter, StatsSnapshot};
pub use transport::{DEFAULT_PORT, DdpSink, Transport};
pub use types::{PixelFormat, RawFrame, ResampledFrame, TargetSize};
