//! Session orchestration.
//!
//! [`MirroringController`] validates a [`MirrorConfig`], asks the
//! [`PermissionGate`] for consent, opens the [`Transport`], builds a
//! backend chain and starts the [`CaptureScheduler`]. Every start gets
//! fresh instances; nothing survives a stop.
//!
//! Stop order is scheduler first, then transport, so no send can race
//! the socket being closed.

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::CastError;
use crate::header::{HEADER_LENGTH, MAX_DATAGRAM_PAYLOAD};
use crate::packet::{DdpEncoder, PacketMode};
use crate::pipeline::capture::{BackendChain, BackendFactory, Capabilities, CaptureBridge};
use crate::pipeline::scheduler::{CaptureScheduler, SchedulerConfig, SchedulerState};
use crate::pipeline::slot::LatestFrameSlot;
use crate::pipeline::stats::{PipelineStats, StatsSnapshot};
use crate::pipeline::transport::{DEFAULT_PORT, DdpSink, Transport};
use crate::pipeline::types::{ResampledFrame, TargetSize};
use crate::state::SessionState;

// ── MirrorConfig ─────────────────────────────────────────────────

/// Everything one session needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    /// Matrix controller host name or address.
    pub host: String,
    pub port: u16,
    pub target: TargetSize,
    pub frame_interval: Duration,
    pub capture_timeout: Duration,
    pub packet_mode: PacketMode,
    /// Stamp packets with a 1..=15 sequence number.
    pub sequence_numbers: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            target: TargetSize::default(),
            frame_interval: Duration::from_millis(50),
            capture_timeout: Duration::from_millis(40),
            packet_mode: PacketMode::Single,
            sequence_numbers: false,
        }
    }
}

impl MirrorConfig {
    pub fn validate(&self) -> Result<(), CastError> {
        TargetSize::new(self.target.width, self.target.height)?;
        if self.frame_interval.is_zero() {
            return Err(CastError::InvalidConfiguration(
                "frame interval must be non-zero".into(),
            ));
        }
        if self.host.trim().is_empty() {
            return Err(CastError::InvalidConfiguration(
                "destination host is empty".into(),
            ));
        }
        match self.packet_mode {
            PacketMode::Single if self.target.frame_len() > MAX_DATAGRAM_PAYLOAD => {
                Err(CastError::InvalidConfiguration(format!(
                    "{} frame is {} bytes, too large for one {}-byte datagram; enable chunking",
                    self.target,
                    self.target.frame_len() + HEADER_LENGTH,
                    MAX_DATAGRAM_PAYLOAD + HEADER_LENGTH,
                )))
            }
            PacketMode::Chunked { max_payload }
                if max_payload == 0 || max_payload > MAX_DATAGRAM_PAYLOAD =>
            {
                Err(CastError::InvalidConfiguration(format!(
                    "chunk payload must be 1..={MAX_DATAGRAM_PAYLOAD} bytes, got {max_payload}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Resolve `host:port`, preferring IPv4.
    pub fn resolve_destination(&self) -> Result<SocketAddr, CastError> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| {
                CastError::InvalidConfiguration(format!("cannot resolve {}: {e}", self.host))
            })?
            .collect();
        addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| {
                CastError::InvalidConfiguration(format!("{} has no addresses", self.host))
            })
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            target: self.target,
            frame_interval: self.frame_interval,
            capture_timeout: self.capture_timeout,
        }
    }

    pub fn encoder(&self) -> DdpEncoder {
        DdpEncoder::with_mode(self.packet_mode).with_sequencing(self.sequence_numbers)
    }
}

// ── PermissionGate ───────────────────────────────────────────────

/// External consent flow consulted before capture starts.
pub trait PermissionGate: Send + Sync {
    /// `Ok` when capture is allowed, [`CastError::PermissionDenied`]
    /// when the user refused.
    fn request(&self) -> Result<(), CastError>;
}

// ── MirroringController ──────────────────────────────────────────

/// Resources owned by one running session.
struct Session {
    scheduler: CaptureScheduler,
    transport: Arc<Transport>,
    slot: Arc<LatestFrameSlot>,
    stats: Arc<PipelineStats>,
    destination: SocketAddr,
}

impl Session {
    fn shutdown(mut self) {
        self.scheduler.stop();
        drop(self.transport);
    }
}

pub struct MirroringController {
    backends: BackendFactory,
    permission: Option<Arc<dyn PermissionGate>>,
    state: SessionState,
    session: Option<Session>,
}

impl MirroringController {
    /// Desktop capture: hardware duplication, then software blit.
    pub fn new() -> Self {
        Self::with_backends(Arc::new(|_| BackendChain::desktop()))
    }

    pub fn with_backends(backends: BackendFactory) -> Self {
        Self {
            backends,
            permission: None,
            state: SessionState::Idle,
            session: None,
        }
    }

    /// Capture through an external bridge only.
    pub fn with_bridge(bridge: Arc<dyn CaptureBridge>) -> Self {
        Self::with_backends(Arc::new(move |target| {
            BackendChain::bridge(Arc::clone(&bridge), target)
        }))
    }

    pub fn with_permission(mut self, gate: Arc<dyn PermissionGate>) -> Self {
        self.permission = Some(gate);
        self
    }

    /// Start mirroring. A no-op returning the current capabilities when
    /// already active.
    pub fn start(&mut self, config: &MirrorConfig) -> Result<Capabilities, CastError> {
        if self.state.is_active() {
            let running = self
                .session
                .as_ref()
                .is_some_and(|s| s.scheduler.is_running());
            if let (true, Some(caps)) = (running, self.capabilities()) {
                return Ok(caps);
            }
            self.state.fail("capture loop ended")?;
        }
        // A session whose loop died is torn down before the fresh start.
        if let Some(session) = self.session.take() {
            session.shutdown();
        }

        self.state.begin_start()?;
        match self.open_session(config) {
            Ok((session, caps)) => {
                info!(
                    "mirroring {} to {} via {}",
                    config.target, session.destination, caps.capture_method
                );
                self.session = Some(session);
                self.state.activate()?;
                Ok(caps)
            }
            Err(e) => {
                warn!("mirroring failed to start: {e}");
                self.state.fail(e.to_string())?;
                Err(e)
            }
        }
    }

    fn open_session(&self, config: &MirrorConfig) -> Result<(Session, Capabilities), CastError> {
        config.validate()?;
        let destination = config.resolve_destination()?;
        if let Some(gate) = &self.permission {
            gate.request()?;
        }

        let stats = Arc::new(PipelineStats::new());
        let slot = Arc::new(LatestFrameSlot::new());
        let transport = Arc::new(Transport::open(destination, Arc::clone(&stats))?);
        let sink = DdpSink::new(Arc::clone(&transport), config.encoder(), destination);

        let mut scheduler = CaptureScheduler::new(
            config.scheduler_config(),
            Arc::clone(&slot),
            Arc::clone(&stats),
        );
        let caps = scheduler.start((self.backends)(config.target), Some(Box::new(sink)))?;

        Ok((
            Session {
                scheduler,
                transport,
                slot,
                stats,
                destination,
            },
            caps,
        ))
    }

    /// Stop mirroring and release the capture thread and socket.
    /// Idempotent.
    pub fn stop(&mut self) -> Result<(), CastError> {
        if self.state.is_idle() {
            return Ok(());
        }
        self.state.begin_stop()?;
        if let Some(session) = self.session.take() {
            session.shutdown();
        }
        self.state.finish_stop()?;
        info!("mirroring stopped");
        Ok(())
    }

    /// Current lifecycle state. A capture loop that died surfaces here
    /// as `Error`.
    pub fn state(&self) -> SessionState {
        if self.state.is_active() {
            if let Some(SchedulerState::Error(reason)) =
                self.session.as_ref().map(|s| s.scheduler.state())
            {
                return SessionState::Error(reason);
            }
        }
        self.state.clone()
    }

    pub fn latest_frame(&self) -> Option<ResampledFrame> {
        self.session.as_ref().and_then(|s| s.slot.read())
    }

    pub fn capabilities(&self) -> Option<Capabilities> {
        self.session.as_ref().and_then(|s| s.scheduler.capabilities())
    }

    pub fn stats(&self) -> Option<StatsSnapshot> {
        self.session.as_ref().map(|s| s.stats.snapshot())
    }

    pub fn destination(&self) -> Option<SocketAddr> {
        self.session.as_ref().map(|s| s.destination)
    }

    /// Local address of the session socket.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.session
            .as_ref()
            .and_then(|s| s.transport.local_addr().ok())
    }
}

impl Default for MirroringController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MirroringController {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.shutdown();
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::capture::{BackendKind, PatternCapture};

    struct Deny;

    impl PermissionGate for Deny {
        fn request(&self) -> Result<(), CastError> {
            Err(CastError::PermissionDenied)
        }
    }

    fn pattern_controller() -> MirroringController {
        MirroringController::with_backends(Arc::new(|_| {
            BackendChain::new(vec![Box::new(PatternCapture::bars(160, 90))])
        }))
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = MirrorConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.port, 4048);
        assert_eq!(cfg.target.frame_len(), 13500);
    }

    #[test]
    fn datagram_limit_bounds_single_packets() {
        // 120x182 is 65520 bytes: inside the 16-bit length field but
        // over the IPv4 datagram limit once the header is added.
        let cfg = MirrorConfig {
            target: TargetSize::new(120, 182).unwrap(),
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(CastError::InvalidConfiguration(_))
        ));

        // 65490 bytes plus the header is 65500, which fits.
        let fits = MirrorConfig {
            target: TargetSize::new(370, 59).unwrap(),
            ..Default::default()
        };
        assert_eq!(fits.target.frame_len() + HEADER_LENGTH, 65_500);
        assert!(fits.validate().is_ok());

        let chunk = |max_payload| MirrorConfig {
            packet_mode: PacketMode::Chunked { max_payload },
            ..Default::default()
        };
        assert!(chunk(MAX_DATAGRAM_PAYLOAD).validate().is_ok());
        assert!(chunk(MAX_DATAGRAM_PAYLOAD + 1).validate().is_err());
        assert!(chunk(0).validate().is_err());
    }

    #[test]
    fn oversized_single_packet_is_rejected() {
        let cfg = MirrorConfig {
            target: TargetSize::new(200, 200).unwrap(),
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(CastError::InvalidConfiguration(_))
        ));
        let chunked = MirrorConfig {
            packet_mode: PacketMode::Chunked { max_payload: 1440 },
            ..cfg
        };
        assert!(chunked.validate().is_ok());
    }

    #[test]
    fn zero_target_fails_before_anything_starts() {
        let mut ctrl = pattern_controller();
        let cfg = MirrorConfig {
            target: TargetSize {
                width: 0,
                height: 50,
            },
            ..Default::default()
        };
        assert!(matches!(
            ctrl.start(&cfg),
            Err(CastError::InvalidConfiguration(_))
        ));
        assert!(ctrl.state().error().is_some());
        assert!(ctrl.stats().is_none());
    }

    #[test]
    fn permission_denied_is_surfaced() {
        let mut ctrl = pattern_controller().with_permission(Arc::new(Deny));
        let err = ctrl.start(&MirrorConfig::default()).unwrap_err();
        assert!(matches!(err, CastError::PermissionDenied));
        assert!(matches!(ctrl.state(), SessionState::Error(_)));
    }

    #[test]
    fn start_stop_cycle() {
        let mut ctrl = pattern_controller();
        let cfg = MirrorConfig::default();

        let caps = ctrl.start(&cfg).unwrap();
        assert_eq!(caps.backend, BackendKind::TestPattern);
        assert!(ctrl.state().is_active());
        assert_eq!(ctrl.start(&cfg).unwrap(), caps);
        assert_eq!(ctrl.destination(), Some(SocketAddr::from(([127, 0, 0, 1], 4048))));
        assert!(ctrl.local_addr().is_some_and(|a| a.is_ipv4()));

        ctrl.stop().unwrap();
        assert!(ctrl.state().is_idle());
        assert!(ctrl.latest_frame().is_none());
        assert!(ctrl.destination().is_none());
        ctrl.stop().unwrap();

        ctrl.start(&cfg).unwrap();
        assert!(ctrl.state().is_active());
        ctrl.stop().unwrap();
    }
}
