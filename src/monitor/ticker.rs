//! Fixed-cadence task runner.
//!
//! Each tick body is awaited inline, so ticks of one task never overlap.
//! Deadlines missed while a slow tick was running are skipped rather than
//! replayed in a burst.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Spawn `tick` every `period`, first firing one period from now.
pub fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let started = Instant::now();
            tick().await;
            let elapsed = started.elapsed();
            if elapsed > period {
                tracing::debug!("{} tick took {:?}, skipping missed ticks", name, elapsed);
            }
        }
    })
}
