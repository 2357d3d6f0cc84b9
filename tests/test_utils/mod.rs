//! Test utilities and fixtures for awaylock tests
#![allow(dead_code)]

pub mod fakes;

pub use fakes::*;

use awaylock::clock::{Clock, ManualClock, SystemClock};
use awaylock::detector::DetectorCell;
use awaylock::monitor::{Collaborators, Monitor, MonitorOptions, SessionContext};
use std::sync::Arc;

/// Reference timings: 5s threshold, 30s cooldown, 500ms/1000ms ticks.
pub fn options() -> MonitorOptions {
    MonitorOptions::default()
}

pub fn options_with(threshold_secs: u64, cooldown_ms: u64) -> MonitorOptions {
    MonitorOptions {
        absence_threshold_secs: threshold_secs,
        lock_cooldown_ms: cooldown_ms,
        ..MonitorOptions::default()
    }
}

/// A monitor wired to fakes, running on tokio time.
pub struct Rig {
    pub monitor: Monitor,
    pub detector: Arc<FakeDetector>,
    pub factory: Arc<FakeDetectorFactory>,
    pub camera: Arc<FakeCamera>,
    pub lock: Arc<FakeLock>,
    pub detectors: Arc<DetectorCell>,
}

impl Rig {
    pub fn new(options: MonitorOptions) -> Self {
        Self::with_lock(options, FakeLock::new())
    }

    pub fn with_lock(options: MonitorOptions, lock: Arc<FakeLock>) -> Self {
        Self::sharing(options, lock, Arc::new(DetectorCell::new()))
    }

    /// Build a rig whose detector slot is shared with other rigs.
    pub fn sharing(options: MonitorOptions, lock: Arc<FakeLock>, detectors: Arc<DetectorCell>) -> Self {
        Self::build(options, lock, detectors, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(options: MonitorOptions, clock: Arc<dyn Clock>) -> Self {
        Self::build(options, FakeLock::new(), Arc::new(DetectorCell::new()), clock)
    }

    fn build(
        options: MonitorOptions,
        lock: Arc<FakeLock>,
        detectors: Arc<DetectorCell>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let detector = FakeDetector::new();
        let factory = FakeDetectorFactory::new(Arc::clone(&detector));
        let camera = FakeCamera::new();
        let monitor = Monitor::new(
            options,
            Collaborators {
                clock,
                capture: camera.clone(),
                detector_factory: factory.clone(),
                detectors: Arc::clone(&detectors),
                lock_action: lock.clone(),
            },
        );
        Self {
            monitor,
            detector,
            factory,
            camera,
            lock,
            detectors,
        }
    }
}

/// A bare session context on a hand-driven clock, already activated at `start_ms`.
pub fn manual_context(
    options: &MonitorOptions,
    start_ms: u64,
    lock: Arc<FakeLock>,
) -> (Arc<ManualClock>, SessionContext) {
    let clock = Arc::new(ManualClock::new(start_ms));
    let ctx = SessionContext::new(options, clock.clone() as Arc<dyn Clock>, lock);
    ctx.activate();
    (clock, ctx)
}

pub async fn sleep_ms(ms: u64) {
    tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
}
