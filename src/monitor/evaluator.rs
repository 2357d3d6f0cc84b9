//! Absence evaluator: decides when continuous absence warrants a lock.
//!
//! Two independent gates must both pass. The threshold gate asks whether the
//! subject has been away long enough; the cooldown gate asks whether the
//! last attempt (successful or not) is far enough in the past. The cooldown
//! alone bounds the attempt rate to one per window however long the absence
//! lasts, so a detector flickering around the threshold cannot hammer the
//! lock action.

use super::invoker::LockOutcome;
use super::state::SessionContext;

pub const ABSENCE_REASON: &str = "Absence detected";

/// Outcome of the two gates for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    WithinThreshold,
    CoolingDown { remaining_ms: u64 },
    Lock,
}

/// Pure gate logic. `since_last_attempt_ms` is `None` when no attempt was
/// ever made, which never blocks.
pub fn decide(
    absence_ms: u64,
    threshold_secs: u64,
    since_last_attempt_ms: Option<u64>,
    cooldown_ms: u64,
) -> Decision {
    if absence_ms < threshold_secs.saturating_mul(1000) {
        return Decision::WithinThreshold;
    }

    match since_last_attempt_ms {
        Some(elapsed) if elapsed < cooldown_ms => Decision::CoolingDown {
            remaining_ms: cooldown_ms - elapsed,
        },
        _ => Decision::Lock,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Inactive,
    AutoLockDisabled { absence_ms: u64 },
    LockInFlight { absence_ms: u64 },
    WithinThreshold { absence_ms: u64 },
    CoolingDown { absence_ms: u64, remaining_ms: u64 },
    Triggered(LockOutcome),
}

/// One evaluator tick.
///
/// The absence counter is refreshed on every active tick, even with
/// auto-lock off, so it stays meaningful for display.
pub async fn evaluate_once(ctx: &SessionContext) -> Evaluation {
    if !ctx.is_active() {
        return Evaluation::Inactive;
    }

    let now = ctx.now_ms();
    let absence_ms = ctx.update_presence(|presence| {
        let absence_ms = presence.absence_ms(now);
        presence.absence_seconds = absence_ms / 1000;
        absence_ms
    });

    if !ctx.auto_lock_enabled() {
        return Evaluation::AutoLockDisabled { absence_ms };
    }

    let invoker = ctx.invoker();
    if invoker.is_locking() {
        return Evaluation::LockInFlight { absence_ms };
    }

    match decide(
        absence_ms,
        ctx.absence_threshold_secs(),
        invoker.since_last_attempt(now),
        ctx.lock_cooldown_ms(),
    ) {
        Decision::WithinThreshold => Evaluation::WithinThreshold { absence_ms },
        Decision::CoolingDown { remaining_ms } => {
            tracing::debug!(
                "Absent for {}ms but lock cooldown has {}ms left",
                absence_ms,
                remaining_ms
            );
            Evaluation::CoolingDown {
                absence_ms,
                remaining_ms,
            }
        }
        Decision::Lock => {
            tracing::info!("Subject absent for {}ms, locking session", absence_ms);
            Evaluation::Triggered(invoker.invoke(ABSENCE_REASON).await)
        }
    }
}
