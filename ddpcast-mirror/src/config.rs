//! Configuration for the mirroring service.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ddpcast_core::{DEFAULT_PORT, MirrorConfig, PacketMode, TargetSize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorFileConfig {
    /// Destination matrix.
    pub network: NetworkConfig,
    /// Capture and output geometry.
    pub screen: ScreenConfig,
    /// DDP packetisation.
    pub transport: TransportConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Matrix controller host name or IP.
    pub host: String,
    /// DDP port on the controller.
    pub port: u16,
}

/// Capture source and target resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    /// Matrix width in pixels.
    pub width: u32,
    /// Matrix height in pixels.
    pub height: u32,
    /// Target frames per second (clamped to 1..=60).
    pub fps: u32,
    /// Upper bound on one capture call in milliseconds.
    pub capture_timeout_ms: u64,
    /// "auto" for desktop capture, "pattern" for moving color bars.
    pub source: String,
}

/// DDP packet settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Split each frame over several packets.
    pub chunked: bool,
    /// Payload bytes per packet when chunked.
    pub max_packet_size: usize,
    /// Stamp packets with a 1..=15 sequence number.
    pub sequence_numbers: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
    /// Seconds between stats lines; 0 disables them.
    pub stats_interval_secs: u64,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.50".into(),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for ScreenConfig {
    fn default() -> Self {
        let target = TargetSize::default();
        Self {
            width: target.width,
            height: target.height,
            fps: 20,
            capture_timeout_ms: 40,
            source: "auto".into(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            chunked: false,
            max_packet_size: 1440,
            sequence_numbers: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
            stats_interval_secs: 5,
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl MirrorFileConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields `Ok(None)`; a file that does not parse is
    /// an error. Runs before logging is set up, so reporting is left to
    /// the caller.
    pub fn load(path: &Path) -> Result<Option<Self>, toml::de::Error> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Whether the synthetic test pattern replaces desktop capture.
    pub fn uses_pattern(&self) -> bool {
        self.screen.source.eq_ignore_ascii_case("pattern")
    }

    /// Convert to the controller's session configuration.
    pub fn to_mirror_config(&self) -> MirrorConfig {
        let fps = self.screen.fps.clamp(1, 60);
        MirrorConfig {
            host: self.network.host.clone(),
            port: self.network.port,
            target: TargetSize {
                width: self.screen.width,
                height: self.screen.height,
            },
            frame_interval: Duration::from_secs(1) / fps,
            capture_timeout: Duration::from_millis(self.screen.capture_timeout_ms),
            packet_mode: if self.transport.chunked {
                PacketMode::Chunked {
                    max_payload: self.transport.max_packet_size,
                }
            } else {
                PacketMode::Single
            },
            sequence_numbers: self.transport.sequence_numbers,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
