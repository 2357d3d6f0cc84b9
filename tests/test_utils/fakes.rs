//! In-memory stand-ins for the detector, capture device and lock action.

use anyhow::Result;
use awaylock::clock::Clock;
use awaylock::capture::{CaptureConstraints, CaptureSource, CaptureStream, DeviceUnavailable, Frame};
use awaylock::detector::{DetectorFactory, Detections, PresenceDetector};
use awaylock::lock::LockAction;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

// ============================================================================
// Clock
// ============================================================================

/// Wall clock that stalls the thread on one chosen `now_ms` call, after
/// announcing it through `reached`. Lets a test act while a tick sits
/// between two synchronous steps.
pub struct StallingClock {
    origin: Instant,
    calls: AtomicUsize,
    stall_on: usize,
    stall_for: Duration,
    reached: Arc<Notify>,
}

impl StallingClock {
    /// Stall on the `stall_on`-th call (1-based).
    pub fn new(stall_on: usize, stall_for: Duration) -> Arc<Self> {
        Arc::new(Self {
            origin: Instant::now(),
            calls: AtomicUsize::new(0),
            stall_on,
            stall_for,
            reached: Arc::new(Notify::new()),
        })
    }

    pub fn reached(&self) -> Arc<Notify> {
        Arc::clone(&self.reached)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Clock for StallingClock {
    fn now_ms(&self) -> u64 {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.stall_on {
            self.reached.notify_one();
            std::thread::sleep(self.stall_for);
        }
        self.origin.elapsed().as_millis() as u64
    }
}

// ============================================================================
// Detector
// ============================================================================

/// Reports however many faces the test last asked for.
#[derive(Default)]
pub struct FakeDetector {
    faces: AtomicUsize,
    failing: AtomicBool,
    calls: AtomicUsize,
    timestamps: Mutex<Vec<u64>>,
}

impl FakeDetector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_faces(&self, faces: usize) {
        self.faces.store(faces, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn timestamps(&self) -> Vec<u64> {
        self.timestamps.lock().unwrap().clone()
    }
}

impl PresenceDetector for FakeDetector {
    fn detect<'a>(&'a self, _frame: &'a Frame, timestamp_ms: u64) -> BoxFuture<'a, Result<Detections>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.timestamps.lock().unwrap().push(timestamp_ms);
            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("inference backend crashed");
            }
            Ok(Detections::new(self.faces.load(Ordering::SeqCst)))
        })
    }
}

pub struct FakeDetectorFactory {
    detector: Arc<FakeDetector>,
    fail: AtomicBool,
    initializations: AtomicUsize,
}

impl FakeDetectorFactory {
    pub fn new(detector: Arc<FakeDetector>) -> Arc<Self> {
        Arc::new(Self {
            detector,
            fail: AtomicBool::new(false),
            initializations: AtomicUsize::new(0),
        })
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn initializations(&self) -> usize {
        self.initializations.load(Ordering::SeqCst)
    }
}

impl DetectorFactory for FakeDetectorFactory {
    fn initialize(&self) -> BoxFuture<'_, Result<Arc<dyn PresenceDetector>>> {
        Box::pin(async move {
            self.initializations.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("model file not found");
            }
            Ok(Arc::clone(&self.detector) as Arc<dyn PresenceDetector>)
        })
    }
}

// ============================================================================
// Capture
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireFailure {
    None,
    Denied,
    Unavailable,
}

/// Counts acquisitions and releases. Streams share the camera's `ready` flag.
pub struct FakeCamera {
    ready: Arc<AtomicBool>,
    failure: Mutex<AcquireFailure>,
    acquired: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl FakeCamera {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ready: Arc::new(AtomicBool::new(true)),
            failure: Mutex::new(AcquireFailure::None),
            acquired: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn fail_with(&self, failure: AcquireFailure) {
        *self.failure.lock().unwrap() = failure;
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// A stream outside of any session, for driving `sample_once` directly.
    pub fn stream(&self) -> FakeStream {
        FakeStream {
            ready: Arc::clone(&self.ready),
            released: Arc::clone(&self.released),
            live: AtomicBool::new(true),
        }
    }
}

impl CaptureSource for FakeCamera {
    fn acquire<'a>(
        &'a self,
        _constraints: &'a CaptureConstraints,
    ) -> BoxFuture<'a, Result<Box<dyn CaptureStream>>> {
        Box::pin(async move {
            match *self.failure.lock().unwrap() {
                AcquireFailure::Denied => anyhow::bail!("permission denied"),
                AcquireFailure::Unavailable => {
                    return Err(DeviceUnavailable("camera is busy".to_string()).into())
                }
                AcquireFailure::None => {}
            }
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(self.stream()) as Box<dyn CaptureStream>)
        })
    }
}

pub struct FakeStream {
    ready: Arc<AtomicBool>,
    released: Arc<AtomicUsize>,
    live: AtomicBool,
}

impl CaptureStream for FakeStream {
    fn frame_ready(&self) -> bool {
        self.live.load(Ordering::SeqCst) && self.ready.load(Ordering::SeqCst)
    }

    fn current_frame(&self) -> Result<Frame> {
        Ok(Frame::new(vec![0xff, 0xd8, 0xff]))
    }

    fn release(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ============================================================================
// Lock action
// ============================================================================

/// Records calls and how many ran at once.
#[derive(Default)]
pub struct FakeLock {
    calls: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
    failing: AtomicBool,
    delay_ms: AtomicUsize,
}

impl FakeLock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let lock = Self::new();
        lock.failing.store(true, Ordering::SeqCst);
        lock
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        let lock = Self::new();
        lock.delay_ms.store(delay.as_millis() as usize, Ordering::SeqCst);
        lock
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

impl LockAction for FakeLock {
    fn invoke(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(running, Ordering::SeqCst);

            let delay = self.delay_ms.load(Ordering::SeqCst) as u64;
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);

            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("loginctl: access denied");
            }
            Ok(())
        })
    }
}
