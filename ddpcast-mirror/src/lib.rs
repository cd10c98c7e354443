//! # ddpcast-mirror: screen mirroring service
//!
//! Loads a TOML configuration, starts a `ddpcast-core` mirroring
//! session against the configured matrix, and keeps it running until
//! Ctrl-C, logging throughput as it goes.
//!
//! ## Sources
//!
//! - **auto**: desktop duplication, falling back to GDI blit.
//! - **pattern**: moving color bars, for wiring checks without a desktop.

pub mod config;
pub mod service;
