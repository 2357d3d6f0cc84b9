//! Shared monitoring state.
//!
//! One [`SessionContext`] exists per [`super::Monitor`]. The sampler is the
//! only writer of the presence fields, the evaluator recomputes the derived
//! absence counter, and lock bookkeeping lives in the [`LockInvoker`].
//! Critical sections are short and never span an `.await`.

use super::invoker::LockInvoker;
use super::MonitorOptions;
use crate::clock::Clock;
use crate::lock::LockAction;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Human-facing camera/monitor status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraStatus {
    Stopped,
    InitializingDetector,
    RequestingCamera,
    Active,
    SubjectDetected,
    NoDetection,
    DetectionFailed,
    StartFailed,
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CameraStatus::Stopped => "Monitor stopped",
            CameraStatus::InitializingDetector => "Initializing detector...",
            CameraStatus::RequestingCamera => "Requesting camera access...",
            CameraStatus::Active => "Monitor active",
            CameraStatus::SubjectDetected => "Person detected",
            CameraStatus::NoDetection => "No detection",
            CameraStatus::DetectionFailed => "Detection failed",
            CameraStatus::StartFailed => "Could not start camera",
        };
        f.write_str(text)
    }
}

/// Presence bookkeeping for the current session. Times are clock milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresenceState {
    pub last_face_seen_at: u64,
    pub face_detected: bool,
    pub absence_seconds: u64,
}

impl PresenceState {
    pub fn started_at(now: u64) -> Self {
        Self {
            last_face_seen_at: now,
            face_detected: false,
            absence_seconds: 0,
        }
    }

    /// Apply one detector reading. `last_face_seen_at` only moves forward.
    pub fn record_sample(&mut self, detected: bool, now: u64) {
        self.face_detected = detected;
        if detected {
            self.last_face_seen_at = self.last_face_seen_at.max(now);
        }
    }

    pub fn absence_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_face_seen_at)
    }
}

/// Read-only view of everything a caller or UI may display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorSnapshot {
    pub monitoring: bool,
    pub auto_lock_enabled: bool,
    pub absence_threshold_secs: u64,
    pub face_detected: bool,
    pub absence_seconds: u64,
    pub locking: bool,
    pub camera_status: CameraStatus,
    pub lock_status: String,
    pub lock_attempts: u64,
    pub last_lock_attempt_at: Option<DateTime<Utc>>,
}

pub struct SessionContext {
    clock: Arc<dyn Clock>,
    active: AtomicBool,
    auto_lock: AtomicBool,
    absence_threshold_secs: AtomicU64,
    lock_cooldown_ms: u64,
    presence: Mutex<PresenceState>,
    camera_status: Mutex<CameraStatus>,
    invoker: LockInvoker,
}

impl SessionContext {
    pub fn new(options: &MonitorOptions, clock: Arc<dyn Clock>, lock_action: Arc<dyn LockAction>) -> Self {
        Self {
            invoker: LockInvoker::new(lock_action, Arc::clone(&clock)),
            clock,
            active: AtomicBool::new(false),
            auto_lock: AtomicBool::new(options.auto_lock),
            absence_threshold_secs: AtomicU64::new(options.absence_threshold_secs),
            lock_cooldown_ms: options.lock_cooldown_ms,
            presence: Mutex::new(PresenceState::default()),
            camera_status: Mutex::new(CameraStatus::Stopped),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Begin a session: the absence clock restarts at "now".
    pub fn activate(&self) {
        let now = self.now_ms();
        *lock(&self.presence) = PresenceState::started_at(now);
        self.set_camera_status(CameraStatus::Active);
        self.active.store(true, Ordering::SeqCst);
    }

    /// Stop accepting tick results. Ticks already past their `is_active`
    /// check may still write until their tasks are joined.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Return observable presence to its baseline. Call only once no tick
    /// can run. `last_face_seen_at` is left alone; the next `activate`
    /// resets it.
    pub fn reset_observables(&self) {
        {
            let mut presence = lock(&self.presence);
            presence.face_detected = false;
            presence.absence_seconds = 0;
        }
        self.set_camera_status(CameraStatus::Stopped);
    }

    pub fn auto_lock_enabled(&self) -> bool {
        self.auto_lock.load(Ordering::SeqCst)
    }

    pub fn set_auto_lock(&self, enabled: bool) {
        self.auto_lock.store(enabled, Ordering::SeqCst);
    }

    pub fn absence_threshold_secs(&self) -> u64 {
        self.absence_threshold_secs.load(Ordering::SeqCst)
    }

    pub fn set_absence_threshold_secs(&self, secs: u64) {
        self.absence_threshold_secs.store(secs, Ordering::SeqCst);
    }

    pub fn lock_cooldown_ms(&self) -> u64 {
        self.lock_cooldown_ms
    }

    pub fn presence(&self) -> PresenceState {
        *lock(&self.presence)
    }

    pub(crate) fn update_presence<R>(&self, f: impl FnOnce(&mut PresenceState) -> R) -> R {
        f(&mut lock(&self.presence))
    }

    pub fn camera_status(&self) -> CameraStatus {
        *lock(&self.camera_status)
    }

    pub fn set_camera_status(&self, status: CameraStatus) {
        let mut current = lock(&self.camera_status);
        if *current != status {
            tracing::debug!("Camera status: {} -> {}", *current, status);
            *current = status;
        }
    }

    pub fn invoker(&self) -> &LockInvoker {
        &self.invoker
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let presence = self.presence();
        let attempts = self.invoker.state();
        MonitorSnapshot {
            monitoring: self.is_active(),
            auto_lock_enabled: self.auto_lock_enabled(),
            absence_threshold_secs: self.absence_threshold_secs(),
            face_detected: presence.face_detected,
            absence_seconds: presence.absence_seconds,
            locking: self.invoker.is_locking(),
            camera_status: self.camera_status(),
            lock_status: attempts.message,
            lock_attempts: attempts.attempts,
            last_lock_attempt_at: attempts.last_attempt_wall,
        }
    }
}

/// Lock a std mutex, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
