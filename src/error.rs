//! Error types surfaced by [`crate::monitor::Monitor::start`].
//!
//! Only initialization-class failures stop a session. Per-tick failures
//! (a detect call, a lock command) are absorbed by the loops and reported
//! through status text, so they never appear here.

use crate::capture::DeviceUnavailable;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Failed to initialize detector: {0}")]
    DetectorInit(String),

    #[error("Failed to acquire capture device: {0}")]
    CaptureAcquire(String),

    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),
}

impl MonitorError {
    pub fn detector_init(err: anyhow::Error) -> Self {
        Self::DetectorInit(format!("{err:#}"))
    }

    pub fn capture_acquire(err: anyhow::Error) -> Self {
        match err.downcast::<DeviceUnavailable>() {
            Ok(unavailable) => Self::DeviceUnavailable(unavailable.0),
            Err(err) => Self::CaptureAcquire(format!("{err:#}")),
        }
    }
}
