//! Mirroring service core logic.
//!
//! Wraps one [`MirroringController`] session in a Tokio-friendly run
//! loop: start and stop run on the blocking pool because they join the
//! capture thread, and session stats are logged on an interval.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{error, info};

use ddpcast_core::{BackendChain, Capabilities, CastError, MirroringController, PatternCapture};

use crate::config::MirrorFileConfig;

/// Resolution of the synthetic source used by `source = "pattern"`.
const PATTERN_SIZE: (u32, u32) = (1280, 720);

/// How often the run loop checks for a stop request.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

// ── MirrorService ────────────────────────────────────────────────

/// The top-level mirroring service.
pub struct MirrorService {
    config: MirrorFileConfig,
    running: Arc<AtomicBool>,
}

impl MirrorService {
    pub fn new(config: MirrorFileConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Obtain a handle that can be used to stop the service from
    /// another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Controller for the configured capture source.
    pub fn controller(config: &MirrorFileConfig) -> MirroringController {
        if config.uses_pattern() {
            MirroringController::with_backends(Arc::new(|_| {
                BackendChain::new(vec![Box::new(PatternCapture::bars(
                    PATTERN_SIZE.0,
                    PATTERN_SIZE.1,
                ))])
            }))
        } else {
            MirroringController::new()
        }
    }

    /// Initialise the configured backend chain once and report what
    /// was selected, without opening a session.
    pub fn probe(config: &MirrorFileConfig) -> Result<Capabilities, CastError> {
        let mut chain = if config.uses_pattern() {
            BackendChain::new(vec![Box::new(PatternCapture::bars(
                PATTERN_SIZE.0,
                PATTERN_SIZE.1,
            ))])
        } else {
            BackendChain::desktop()
        };
        chain.select().map(|active| active.capabilities)
    }

    /// Run the service until stopped or the session fails.
    ///
    /// 1. Starts a controller session on the blocking pool.
    /// 2. Logs stats every `logging.stats_interval_secs`.
    /// 3. Stops the session when `running` becomes `false`.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.running.store(true, Ordering::SeqCst);
        let mirror_config = self.config.to_mirror_config();

        let mut controller = Self::controller(&self.config);
        let start_config = mirror_config.clone();
        let (mut controller, started) = tokio::task::spawn_blocking(move || {
            let result = controller.start(&start_config);
            (controller, result)
        })
        .await?;

        let caps = match started {
            Ok(caps) => caps,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                error!("failed to start mirroring: {e}");
                return Err(e.into());
            }
        };
        info!(
            "capturing {}x{} with {} (hardware accelerated: {})",
            caps.screen_width, caps.screen_height, caps.capture_method, caps.hardware_accelerated
        );
        if let (Some(dest), Some(local)) = (controller.destination(), controller.local_addr()) {
            info!("sending DDP from {local} to {dest}");
        }

        let stats_every = match self.config.logging.stats_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let mut poll = tokio::time::interval(POLL_INTERVAL);
        let mut last_stats = tokio::time::Instant::now();
        let mut failure = None;

        while self.running.load(Ordering::SeqCst) {
            poll.tick().await;

            if let Some(reason) = controller.state().error() {
                error!("mirroring session failed: {reason}");
                failure = Some(reason.to_string());
                break;
            }

            if let (Some(every), Some(stats)) = (stats_every, controller.stats()) {
                if last_stats.elapsed() >= every {
                    info!(
                        "fps {:.1} | sent {} packets / {} bytes | dropped {} | reused {}",
                        stats.fps,
                        stats.packets_sent,
                        stats.bytes_sent,
                        stats.send_failures,
                        stats.frames_reused
                    );
                    last_stats = tokio::time::Instant::now();
                }
            }
        }

        let stopped = tokio::task::spawn_blocking(move || controller.stop()).await?;
        self.running.store(false, Ordering::SeqCst);
        stopped?;
        info!("mirroring service stopped");

        match failure {
            Some(reason) => Err(reason.into()),
            None => Ok(()),
        }
    }

    /// Signal the service to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the service is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

// ── Tests ────────────────────────────────────────────────────────
