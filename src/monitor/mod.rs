//! Presence monitoring core.
//!
//! A [`Monitor`] owns at most one running session. Starting a session
//! initializes the shared detector (once per process), acquires the capture
//! device, resets the absence clock and spawns two periodic tasks:
//!
//! - the sampler ([`sampler::sample_once`]) updates the last-seen timestamp
//!   from detector readings;
//! - the evaluator ([`evaluator::evaluate_once`]) turns the absence duration
//!   into a lock request, gated by threshold and cooldown.
//!
//! Lock requests from the evaluator and from [`Monitor::lock_now`] go through
//! the same single-flight [`invoker::LockInvoker`].

pub mod evaluator;
pub mod invoker;
pub mod sampler;
pub mod state;
pub mod ticker;

use crate::capture::{CaptureConstraints, CaptureSource, StreamGuard};
use crate::clock::Clock;
use crate::detector::{DetectorCell, DetectorFactory};
use crate::error::MonitorError;
use crate::lock::LockAction;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

pub use invoker::{LockAttemptState, LockOutcome};
pub use state::{CameraStatus, MonitorSnapshot, PresenceState, SessionContext};

pub const MANUAL_LOCK_REASON: &str = "Manual lock";

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub absence_threshold_secs: u64,
    pub lock_cooldown_ms: u64,
    pub auto_lock: bool,
    pub sample_interval: Duration,
    pub evaluate_interval: Duration,
    pub constraints: CaptureConstraints,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            absence_threshold_secs: 5,
            lock_cooldown_ms: 30_000,
            auto_lock: true,
            sample_interval: Duration::from_millis(500),
            evaluate_interval: Duration::from_millis(1000),
            constraints: CaptureConstraints::default(),
        }
    }
}

/// External pieces a monitor drives.
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub capture: Arc<dyn CaptureSource>,
    pub detector_factory: Arc<dyn DetectorFactory>,
    /// Usually [`crate::detector::shared`]; tests pass their own cell.
    pub detectors: Arc<DetectorCell>,
    pub lock_action: Arc<dyn LockAction>,
}

/// Resources owned by one running session.
struct MonitoringSession {
    id: Uuid,
    stream: Arc<StreamGuard>,
    sampler: JoinHandle<()>,
    evaluator: JoinHandle<()>,
}

impl MonitoringSession {
    async fn shutdown(self) {
        self.sampler.abort();
        self.evaluator.abort();
        // Joining guarantees no tick body is still running once stop returns.
        let _ = self.sampler.await;
        let _ = self.evaluator.await;
        self.stream.release();
        tracing::info!("Monitoring session {} stopped", self.id);
    }
}

pub struct Monitor {
    ctx: Arc<SessionContext>,
    options: MonitorOptions,
    capture: Arc<dyn CaptureSource>,
    detector_factory: Arc<dyn DetectorFactory>,
    detectors: Arc<DetectorCell>,
    session: Mutex<Option<MonitoringSession>>,
}

impl Monitor {
    pub fn new(options: MonitorOptions, collaborators: Collaborators) -> Self {
        let ctx = Arc::new(SessionContext::new(
            &options,
            collaborators.clock,
            collaborators.lock_action,
        ));
        Self {
            ctx,
            options,
            capture: collaborators.capture,
            detector_factory: collaborators.detector_factory,
            detectors: collaborators.detectors,
            session: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }

    pub fn is_monitoring(&self) -> bool {
        self.ctx.is_active()
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        self.ctx.snapshot()
    }

    pub fn set_auto_lock(&self, enabled: bool) {
        tracing::info!("Auto-lock {}", if enabled { "enabled" } else { "disabled" });
        self.ctx.set_auto_lock(enabled);
    }

    pub fn set_absence_threshold_secs(&self, secs: u64) {
        tracing::info!("Absence threshold set to {}s", secs);
        self.ctx.set_absence_threshold_secs(secs);
    }

    /// Start monitoring. Calling this while a session is running is a no-op.
    ///
    /// On failure every partially acquired resource is released, the monitor
    /// is left stopped and the error is also written to the lock status.
    pub async fn start(&self) -> Result<(), MonitorError> {
        let mut slot = self.session.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        match self.open_session().await {
            Ok(session) => {
                *slot = Some(session);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to start monitor: {}", e);
                self.ctx.set_camera_status(CameraStatus::StartFailed);
                self.ctx.invoker().report(format!("Failed to start monitor: {e}"));
                Self::teardown(&self.ctx, slot.take()).await;
                Err(e)
            }
        }
    }

    async fn open_session(&self) -> Result<MonitoringSession, MonitorError> {
        self.ctx.set_camera_status(CameraStatus::InitializingDetector);
        let detector = self.detectors.get_or_init(self.detector_factory.as_ref()).await?;

        self.ctx.set_camera_status(CameraStatus::RequestingCamera);
        let stream = self
            .capture
            .acquire(&self.options.constraints)
            .await
            .map_err(MonitorError::capture_acquire)?;
        // From here on the device is released on every exit path.
        let stream = Arc::new(StreamGuard::new(stream));

        let id = Uuid::new_v4();
        let span = tracing::info_span!("session", id = %id);

        self.ctx.activate();
        tracing::info!(parent: &span, "Monitoring started");

        let sampler = {
            let ctx = Arc::clone(&self.ctx);
            let stream = Arc::clone(&stream);
            let span = span.clone();
            ticker::spawn_periodic("sampler", self.options.sample_interval, move || {
                let ctx = Arc::clone(&ctx);
                let stream = Arc::clone(&stream);
                let detector = Arc::clone(&detector);
                async move {
                    sampler::sample_once(&ctx, detector.as_ref(), stream.stream()).await;
                }
                .instrument(span.clone())
            })
        };

        let evaluator = {
            let ctx = Arc::clone(&self.ctx);
            ticker::spawn_periodic("evaluator", self.options.evaluate_interval, move || {
                let ctx = Arc::clone(&ctx);
                async move {
                    evaluator::evaluate_once(&ctx).await;
                }
                .instrument(span.clone())
            })
        };

        Ok(MonitoringSession {
            id,
            stream,
            sampler,
            evaluator,
        })
    }

    /// Stop monitoring. Idempotent.
    pub async fn stop(&self) {
        let mut slot = self.session.lock().await;
        Self::teardown(&self.ctx, slot.take()).await;
    }

    async fn teardown(ctx: &SessionContext, session: Option<MonitoringSession>) {
        ctx.deactivate();
        if let Some(session) = session {
            session.shutdown().await;
        }
        ctx.reset_observables();
    }

    /// Request a lock now, bypassing the absence threshold. Still
    /// single-flight, and still arms the cooldown.
    pub async fn lock_now(&self, reason: &str) -> LockOutcome {
        self.ctx.invoker().invoke(reason).await
    }

    /// Stop monitoring before the monitor is dropped. The shared detector
    /// stays alive for other monitors in the process.
    pub async fn shutdown(&self) {
        self.stop().await;
    }
}
