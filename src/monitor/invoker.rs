//! Single-flight wrapper around the lock action.

use super::state::lock;
use crate::clock::Clock;
use crate::lock::LockAction;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub const LOCK_SENT_MESSAGE: &str =
    "Lock command sent. If your OS allows it, the session will lock now.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// Another attempt was already in flight; nothing was done.
    Skipped,
    /// The lock action acknowledged the request.
    Sent,
    /// The lock action failed. The cooldown is armed all the same.
    Failed(String),
}

impl LockOutcome {
    pub fn attempted(&self) -> bool {
        !matches!(self, LockOutcome::Skipped)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockAttemptState {
    /// Clock time the last attempt finished. `None` means never.
    pub last_attempt_at: Option<u64>,
    pub last_attempt_wall: Option<DateTime<Utc>>,
    pub attempts: u64,
    pub message: String,
}

pub struct LockInvoker {
    action: Arc<dyn LockAction>,
    clock: Arc<dyn Clock>,
    locking: AtomicBool,
    state: Mutex<LockAttemptState>,
}

impl LockInvoker {
    pub fn new(action: Arc<dyn LockAction>, clock: Arc<dyn Clock>) -> Self {
        Self {
            action,
            clock,
            locking: AtomicBool::new(false),
            state: Mutex::new(LockAttemptState::default()),
        }
    }

    pub fn is_locking(&self) -> bool {
        self.locking.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> LockAttemptState {
        lock(&self.state).clone()
    }

    /// Milliseconds since the last attempt, or `None` if there never was one.
    pub fn since_last_attempt(&self, now: u64) -> Option<u64> {
        lock(&self.state)
            .last_attempt_at
            .map(|at| now.saturating_sub(at))
    }

    /// Overwrite the lock status line.
    pub fn report(&self, message: impl Into<String>) {
        lock(&self.state).message = message.into();
    }

    /// Run the lock action unless an attempt is already outstanding.
    ///
    /// The attempt timestamp is recorded and the in-flight flag cleared
    /// whatever the outcome, including when the future is dropped mid-call.
    pub async fn invoke(&self, reason: &str) -> LockOutcome {
        if self
            .locking
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Lock already in flight, ignoring request ({})", reason);
            return LockOutcome::Skipped;
        }
        let _flight = InFlight { invoker: self };

        tracing::info!("{}: requesting session lock", reason);
        self.report(format!("{reason}: attempting to lock the session..."));

        match self.action.invoke().await {
            Ok(()) => {
                self.report(LOCK_SENT_MESSAGE);
                LockOutcome::Sent
            }
            Err(e) => {
                let message = format!("{e:#}");
                tracing::warn!("Session lock failed: {}", message);
                self.report(format!("Could not lock the session: {message}"));
                LockOutcome::Failed(message)
            }
        }
    }
}

/// Clears the single-flight flag and arms the cooldown on drop.
struct InFlight<'a> {
    invoker: &'a LockInvoker,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let now = self.invoker.clock.now_ms();
        {
            let mut state = lock(&self.invoker.state);
            state.last_attempt_at = Some(now);
            state.last_attempt_wall = Some(Utc::now());
            state.attempts += 1;
        }
        self.invoker.locking.store(false, Ordering::Release);
    }
}
