//! Capture loop driver.
//!
//! [`CaptureScheduler`] owns the active backend and a dedicated thread
//! that runs, once per frame interval:
//!
//! ```text
//! capture_once ──► resample_into ──► slot.write ──► sink.deliver ──► pace
//!      │                                                              │
//!      └──────────────────────── next iteration ◄─────────────────────┘
//! ```
//!
//! `NoNewFrame` republishes the previous output. A backend error
//! triggers one fallback to the next backend in the chain; a second
//! failure moves the scheduler to `Error` and ends the loop.
//!
//! Stop is cooperative: the flag is checked at the top of every
//! iteration and the pacing sleep is a `park_timeout` that
//! [`stop`](CaptureScheduler::stop) interrupts with `unpark`.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::error::CastError;
use crate::pipeline::capture::{BackendChain, Capabilities, Capture, CaptureBackend};
use crate::pipeline::resample::FrameResampler;
use crate::pipeline::slot::LatestFrameSlot;
use crate::pipeline::stats::{PipelineStats, RateMeter};
use crate::pipeline::types::{ResampledFrame, TargetSize};

const THREAD_NAME: &str = "ddpcast-capture";

// ── FrameSink ────────────────────────────────────────────────────

/// Consumer of published frames, called on the capture thread.
///
/// Must not block: a slow sink delays the next capture.
pub trait FrameSink: Send {
    fn deliver(&mut self, frame: &ResampledFrame);
}

// ── SchedulerConfig ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub target: TargetSize,
    /// Loop period; 50 ms is 20 FPS.
    pub frame_interval: Duration,
    /// Upper bound on one `capture_once` call.
    pub capture_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            target: TargetSize::default(),
            frame_interval: Duration::from_millis(50),
            capture_timeout: Duration::from_millis(40),
        }
    }
}

// ── SchedulerState ───────────────────────────────────────────────

/// ```text
///  NotStarted ──► Running ──► Stopping ──► NotStarted
///                    │
///                    ▼
///              Error(reason)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    NotStarted,
    Running,
    Stopping,
    Error(String),
}

/// State visible to both the owner and the capture thread.
#[derive(Debug, Default)]
struct Shared {
    running: AtomicBool,
    state: Mutex<SchedulerState>,
    capabilities: Mutex<Option<Capabilities>>,
}

impl Shared {
    fn state(&self) -> SchedulerState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, state: SchedulerState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn fail(&self, reason: String) {
        self.running.store(false, Ordering::SeqCst);
        self.set_state(SchedulerState::Error(reason));
    }

    fn set_capabilities(&self, caps: Capabilities) {
        *self
            .capabilities
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(caps);
    }

    fn capabilities(&self) -> Option<Capabilities> {
        self.capabilities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// ── CaptureScheduler ─────────────────────────────────────────────

pub struct CaptureScheduler {
    config: SchedulerConfig,
    slot: Arc<LatestFrameSlot>,
    stats: Arc<PipelineStats>,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureScheduler {
    pub fn new(
        config: SchedulerConfig,
        slot: Arc<LatestFrameSlot>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            config,
            slot,
            stats,
            shared: Arc::new(Shared::default()),
            thread: None,
        }
    }

    /// Select a backend from `chain` and launch the capture thread.
    ///
    /// A no-op returning the current capabilities when already running.
    /// Backends left in `chain` after selection serve as the runtime
    /// fallback.
    pub fn start(
        &mut self,
        mut chain: BackendChain,
        sink: Option<Box<dyn FrameSink>>,
    ) -> Result<Capabilities, CastError> {
        if self.is_running() {
            return self
                .shared
                .capabilities()
                .ok_or_else(|| CastError::Other("running without a backend".into()));
        }
        // Reap a loop that ended in Error.
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }

        if self.config.frame_interval.is_zero() {
            return Err(CastError::InvalidConfiguration(
                "frame interval must be non-zero".into(),
            ));
        }

        let active = chain.select()?;
        let capabilities = active.capabilities.clone();

        self.shared.set_capabilities(capabilities.clone());
        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.set_state(SchedulerState::Running);

        let target = self.config.target;
        let worker = CaptureLoop {
            config: self.config,
            shared: Arc::clone(&self.shared),
            slot: Arc::clone(&self.slot),
            stats: Arc::clone(&self.stats),
            chain,
            backend: active.backend,
            fell_back: false,
            resampler: FrameResampler::new(target),
            buffer: vec![0; target.frame_len()],
            last: None,
            sink,
            meter: RateMeter::new(),
            last_rate_report: Instant::now(),
        };

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || {
                if catch_unwind(AssertUnwindSafe(|| worker.run())).is_err() {
                    error!("capture loop panicked");
                    shared.fail("capture loop panicked".into());
                }
            });

        match spawned {
            Ok(handle) => {
                self.thread = Some(handle);
                info!(
                    "capture started: {} → {} every {:?}",
                    capabilities.capture_method, target, self.config.frame_interval
                );
                Ok(capabilities)
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                self.shared.set_state(SchedulerState::NotStarted);
                Err(CastError::CaptureThread(e.to_string()))
            }
        }
    }

    /// Signal the loop to stop and join the thread.
    ///
    /// Returns within one capture timeout plus one loop body. An
    /// `Error` state is kept so the reason stays observable.
    pub fn stop(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };
        if self.shared.state() == SchedulerState::Running {
            self.shared.set_state(SchedulerState::Stopping);
        }
        self.shared.running.store(false, Ordering::SeqCst);
        handle.thread().unpark();

        if handle.join().is_err() {
            self.shared.fail("capture thread panicked".into());
            return;
        }
        if self.shared.state() == SchedulerState::Stopping {
            self.shared.set_state(SchedulerState::NotStarted);
        }
        info!("capture stopped");
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.shared.state() == SchedulerState::Running
    }

    /// Descriptor of the backend currently capturing. Updated when the
    /// loop falls back at runtime.
    pub fn capabilities(&self) -> Option<Capabilities> {
        self.shared.capabilities()
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }
}

impl Drop for CaptureScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── CaptureLoop ──────────────────────────────────────────────────

/// Everything the capture thread owns.
struct CaptureLoop {
    config: SchedulerConfig,
    shared: Arc<Shared>,
    slot: Arc<LatestFrameSlot>,
    stats: Arc<PipelineStats>,
    chain: BackendChain,
    backend: Box<dyn CaptureBackend>,
    fell_back: bool,
    resampler: FrameResampler,
    buffer: Vec<u8>,
    last: Option<ResampledFrame>,
    sink: Option<Box<dyn FrameSink>>,
    meter: RateMeter,
    last_rate_report: Instant,
}

impl CaptureLoop {
    fn run(mut self) {
        while self.shared.running.load(Ordering::SeqCst) {
            let loop_start = Instant::now();

            if let Err(e) = self.tick() {
                error!("capture loop failed: {e}");
                self.shared.fail(e.to_string());
                break;
            }

            self.report_rate();
            self.pace(loop_start);
        }
        // Backend handles are released here, on the thread that used them.
    }

    fn tick(&mut self) -> Result<(), CastError> {
        let captured = match self.backend.capture_once(self.config.capture_timeout) {
            Ok(Capture::Frame(raw)) => self
                .resampler
                .resample_into(&raw, &mut self.buffer)
                .map(|()| true),
            Ok(Capture::NoNewFrame) => Ok(false),
            Err(e) => Err(e),
        };

        let frame = match captured {
            Ok(true) => {
                self.stats.record_captured();
                ResampledFrame::copy_from(self.config.target, &self.buffer)?
            }
            Ok(false) => match &self.last {
                Some(previous) => {
                    self.stats.record_reused();
                    previous.clone()
                }
                None => return Ok(()),
            },
            Err(e) => return self.fall_back(e),
        };

        self.slot.write(frame.clone());
        self.stats.record_published();
        if let Some(sink) = self.sink.as_mut() {
            sink.deliver(&frame);
        }
        self.meter.record();
        self.last = Some(frame);
        Ok(())
    }

    /// Swap to the next backend in the chain, at most once per start.
    fn fall_back(&mut self, cause: CastError) -> Result<(), CastError> {
        if self.fell_back {
            return Err(cause);
        }
        self.fell_back = true;
        warn!("{} backend failed: {cause}; falling back", self.backend.kind());

        match self.chain.select() {
            Ok(active) => {
                self.backend = active.backend;
                self.shared.set_capabilities(active.capabilities);
                Ok(())
            }
            Err(e) => Err(CastError::AllBackendsFailed(format!(
                "{cause}; fallback: {e}"
            ))),
        }
    }

    fn report_rate(&mut self) {
        if self.last_rate_report.elapsed() < Duration::from_secs(1) {
            return;
        }
        let fps = self.meter.rate();
        self.stats.set_rate(fps);
        debug!("capture rate {fps:.1} fps");
        self.last_rate_report = Instant::now();
    }

    /// Sleep out the rest of the interval; overruns continue at once.
    fn pace(&self, loop_start: Instant) {
        let deadline = loop_start + self.config.frame_interval;
        let now = Instant::now();
        if now >= deadline {
            self.stats.record_overrun();
            return;
        }
        let mut now = now;
        while now < deadline && self.shared.running.load(Ordering::SeqCst) {
            thread::park_timeout(deadline - now);
            now = Instant::now();
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::capture::{BackendKind, PatternCapture};
    use std::sync::atomic::AtomicUsize;

    /// Backend that sleeps for the full timeout and never produces a frame.
    struct Sluggish;

    impl CaptureBackend for Sluggish {
        fn kind(&self) -> BackendKind {
            BackendKind::HardwareDuplication
        }
        fn initialize(&mut self) -> Result<Capabilities, CastError> {
            Ok(Capabilities::new(BackendKind::HardwareDuplication, true, 640, 480))
        }
        fn capture_once(&mut self, timeout: Duration) -> Result<Capture<'_>, CastError> {
            thread::sleep(timeout);
            Ok(Capture::NoNewFrame)
        }
    }

    /// Backend that yields `frames` solid frames and then loses its session.
    struct Flaky {
        frames: usize,
        buffer: Vec<u8>,
    }

    impl Flaky {
        fn new(frames: usize) -> Self {
            Self {
                frames,
                buffer: vec![200; 8 * 8 * 4],
            }
        }
    }

    impl CaptureBackend for Flaky {
        fn kind(&self) -> BackendKind {
            BackendKind::HardwareDuplication
        }
        fn initialize(&mut self) -> Result<Capabilities, CastError> {
            Ok(Capabilities::new(BackendKind::HardwareDuplication, true, 8, 8))
        }
        fn capture_once(&mut self, _timeout: Duration) -> Result<Capture<'_>, CastError> {
            if self.frames == 0 {
                return Err(CastError::BackendLost {
                    backend: BackendKind::HardwareDuplication,
                    reason: "access lost".into(),
                });
            }
            self.frames -= 1;
            Ok(Capture::Frame(crate::pipeline::types::RawFrame {
                width: 8,
                height: 8,
                stride: 32,
                format: crate::pipeline::types::PixelFormat::Bgra8,
                data: &self.buffer,
            }))
        }
    }

    struct CountingSink(Arc<AtomicUsize>);

    impl FrameSink for CountingSink {
        fn deliver(&mut self, frame: &ResampledFrame) {
            assert_eq!(frame.as_bytes().len(), frame.size().frame_len());
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config(interval_ms: u64, timeout_ms: u64) -> SchedulerConfig {
        SchedulerConfig {
            target: TargetSize::new(10, 5).unwrap(),
            frame_interval: Duration::from_millis(interval_ms),
            capture_timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn scheduler(cfg: SchedulerConfig) -> (CaptureScheduler, Arc<LatestFrameSlot>, Arc<PipelineStats>) {
        let slot = Arc::new(LatestFrameSlot::new());
        let stats = Arc::new(PipelineStats::new());
        (CaptureScheduler::new(cfg, slot.clone(), stats.clone()), slot, stats)
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn publishes_frames_to_slot_and_sink() {
        let (mut sched, slot, stats) = scheduler(config(5, 5));
        let delivered = Arc::new(AtomicUsize::new(0));
        let chain = BackendChain::new(vec![Box::new(PatternCapture::solid(64, 48, [0, 255, 0]))]);

        let caps = sched
            .start(chain, Some(Box::new(CountingSink(delivered.clone()))))
            .unwrap();
        assert_eq!(caps.backend, BackendKind::TestPattern);
        assert!(sched.is_running());

        assert!(wait_for(|| delivered.load(Ordering::SeqCst) >= 3));
        let frame = slot.read().unwrap();
        assert!(frame.as_bytes().chunks(3).all(|px| px == [0, 255, 0]));

        sched.stop();
        assert_eq!(sched.state(), SchedulerState::NotStarted);
        assert!(stats.snapshot().frames_captured >= 3);
    }

    #[test]
    fn start_while_running_is_a_no_op() {
        let (mut sched, _, _) = scheduler(config(5, 5));
        let first = sched
            .start(BackendChain::new(vec![Box::new(PatternCapture::bars(32, 32))]), None)
            .unwrap();
        let second = sched.start(BackendChain::default(), None).unwrap();
        assert_eq!(first, second);
        sched.stop();
    }

    #[test]
    fn stop_returns_within_one_capture_timeout() {
        let (mut sched, _, _) = scheduler(config(50, 40));
        sched
            .start(BackendChain::new(vec![Box::new(Sluggish)]), None)
            .unwrap();
        thread::sleep(Duration::from_millis(60));

        let begin = Instant::now();
        sched.stop();
        let took = begin.elapsed();
        assert!(took < Duration::from_millis(40 + 100), "stop took {took:?}");
        assert!(!sched.is_running());
    }

    #[test]
    fn no_new_frame_reuses_previous_output() {
        struct OnceThenIdle(bool, Vec<u8>);
        impl CaptureBackend for OnceThenIdle {
            fn kind(&self) -> BackendKind {
                BackendKind::HardwareDuplication
            }
            fn initialize(&mut self) -> Result<Capabilities, CastError> {
                Ok(Capabilities::new(BackendKind::HardwareDuplication, true, 4, 4))
            }
            fn capture_once(&mut self, _t: Duration) -> Result<Capture<'_>, CastError> {
                if std::mem::replace(&mut self.0, false) {
                    Ok(Capture::Frame(crate::pipeline::types::RawFrame {
                        width: 4,
                        height: 4,
                        stride: 12,
                        format: crate::pipeline::types::PixelFormat::Rgb8,
                        data: &self.1,
                    }))
                } else {
                    Ok(Capture::NoNewFrame)
                }
            }
        }

        let (mut sched, slot, stats) = scheduler(config(2, 1));
        sched
            .start(
                BackendChain::new(vec![Box::new(OnceThenIdle(true, vec![42; 48]))]),
                None,
            )
            .unwrap();
        assert!(wait_for(|| slot.generation() >= 4));
        sched.stop();

        let snap = stats.snapshot();
        assert_eq!(snap.frames_captured, 1);
        assert!(snap.frames_reused >= 3);
        assert!(slot.read().unwrap().as_bytes().iter().all(|&b| b == 42));
    }

    #[test]
    fn runtime_failure_falls_back_once() {
        let (mut sched, slot, _) = scheduler(config(2, 1));
        let chain = BackendChain::new(vec![
            Box::new(Flaky::new(2)),
            Box::new(PatternCapture::solid(16, 16, [9, 9, 9])),
        ]);
        let caps = sched.start(chain, None).unwrap();
        assert!(caps.hardware_accelerated);

        assert!(wait_for(|| {
            sched
                .capabilities()
                .is_some_and(|c| c.backend == BackendKind::TestPattern)
        }));
        assert!(wait_for(|| slot
            .read()
            .is_some_and(|f| f.as_bytes().iter().all(|&b| b == 9))));
        assert!(sched.is_running());
        sched.stop();
    }

    #[test]
    fn exhausted_fallback_moves_to_error() {
        let (mut sched, _, _) = scheduler(config(2, 1));
        sched
            .start(BackendChain::new(vec![Box::new(Flaky::new(1))]), None)
            .unwrap();

        assert!(wait_for(|| matches!(sched.state(), SchedulerState::Error(_))));
        assert!(!sched.is_running());
        sched.stop();
        assert!(matches!(sched.state(), SchedulerState::Error(_)));

        // A fresh start clears the error.
        sched
            .start(BackendChain::new(vec![Box::new(PatternCapture::bars(8, 8))]), None)
            .unwrap();
        assert!(sched.is_running());
        sched.stop();
    }

    #[test]
    fn zero_interval_is_rejected() {
        let (mut sched, _, _) = scheduler(config(0, 1));
        let err = sched
            .start(BackendChain::new(vec![Box::new(PatternCapture::bars(8, 8))]), None)
            .unwrap_err();
        assert!(matches!(err, CastError::InvalidConfiguration(_)));
        assert_eq!(sched.state(), SchedulerState::NotStarted);
    }
}
