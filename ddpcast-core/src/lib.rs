//! # ddpcast-core
//!
//! Screen mirroring core for DDP-driven LED matrices.
//!
//! This crate contains:
//! - **Wire format**: `DdpHeader`, `DdpFlags`, `WirePacket`, `DdpEncoder`
//! - **Pipeline**: capture backends with fallback, bilinear resampler,
//!   latest-frame slot, paced capture scheduler, UDP transport
//! - **Controller**: `MirroringController` session lifecycle over `MirrorConfig`
//! - **State**: `SessionState` lifecycle machine
//! - **Error**: `CastError`, a typed `thiserror`-based error hierarchy

pub mod error;
pub mod flags;
pub mod header;
pub mod packet;
pub mod pipeline;
pub mod state;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use error::CastError;
pub use flags::DdpFlags;
pub use header::{
    DATA_TYPE_RGB24, DdpHeader, HEADER_LENGTH, MAX_DATAGRAM_PAYLOAD, OUTPUT_DISPLAY,
};
pub use packet::{DdpEncoder, PacketMode, WirePacket};
pub use state::SessionState;

pub use pipeline::{
    BackendChain, BackendKind, Capabilities, CaptureBackend, CaptureBridge, DEFAULT_PORT,
    FrameResampler, LatestFrameSlot, MirrorConfig, MirroringController, PatternCapture,
    PermissionGate, ResampledFrame, StatsSnapshot, TargetSize, Transport,
};
