//! Presence detector abstraction and the process-wide detector instance.
//!
//! Detector setup may be slow (model loading), so it happens once, lazily,
//! on the first session start. Every later session reuses the same
//! instance through a shared [`DetectorCell`].

pub mod command;

use crate::capture::Frame;
use crate::error::MonitorError;
use anyhow::Result;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Result of one inference call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Detections {
    pub count: usize,
}

impl Detections {
    pub fn new(count: usize) -> Self {
        Self { count }
    }

    pub fn subject_present(&self) -> bool {
        self.count > 0
    }
}

pub trait PresenceDetector: Send + Sync {
    /// Run inference on one frame. `timestamp_ms` is the monotonic time the
    /// sample is taken at.
    fn detect<'a>(&'a self, frame: &'a Frame, timestamp_ms: u64)
        -> BoxFuture<'a, Result<Detections>>;
}

pub trait DetectorFactory: Send + Sync {
    fn initialize(&self) -> BoxFuture<'_, Result<Arc<dyn PresenceDetector>>>;
}

/// Lazily-initialized detector slot.
///
/// Concurrent callers of [`DetectorCell::get_or_init`] wait for a single
/// initialization. A failed initialization leaves the cell empty so the
/// next session start retries it.
#[derive(Default)]
pub struct DetectorCell {
    cell: OnceCell<Arc<dyn PresenceDetector>>,
}

impl DetectorCell {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    pub async fn get_or_init(
        &self,
        factory: &dyn DetectorFactory,
    ) -> Result<Arc<dyn PresenceDetector>, MonitorError> {
        self.cell
            .get_or_try_init(|| async {
                tracing::info!("Initializing presence detector");
                factory.initialize().await
            })
            .await
            .map(Arc::clone)
            .map_err(MonitorError::detector_init)
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

static SHARED_DETECTOR: Lazy<Arc<DetectorCell>> = Lazy::new(|| Arc::new(DetectorCell::new()));

/// The detector slot shared by every monitor in this process.
pub fn shared() -> Arc<DetectorCell> {
    Arc::clone(&SHARED_DETECTOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct NoFaces;

    impl PresenceDetector for NoFaces {
        fn detect<'a>(
            &'a self,
            _frame: &'a Frame,
            _timestamp_ms: u64,
        ) -> BoxFuture<'a, Result<Detections>> {
            Box::pin(async { Ok(Detections::default()) })
        }
    }

    struct SlowFactory {
        calls: AtomicUsize,
        fail_first: bool,
    }

    impl DetectorFactory for SlowFactory {
        fn initialize(&self) -> BoxFuture<'_, Result<Arc<dyn PresenceDetector>>> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                if self.fail_first && call == 0 {
                    anyhow::bail!("model download failed");
                }
                Ok(Arc::new(NoFaces) as Arc<dyn PresenceDetector>)
            })
        }
    }

    #[tokio::test]
    async fn concurrent_starts_initialize_once() {
        let cell = Arc::new(DetectorCell::new());
        let factory = Arc::new(SlowFactory {
            calls: AtomicUsize::new(0),
            fail_first: false,
        });

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cell = Arc::clone(&cell);
            let factory = Arc::clone(&factory);
            tasks.push(tokio::spawn(async move {
                cell.get_or_init(factory.as_ref()).await.is_ok()
            }));
        }

        let results = futures::future::join_all(tasks).await;
        assert!(results.into_iter().all(|r| r.unwrap()));
        assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
        assert!(cell.is_initialized());
    }

    #[tokio::test]
    async fn failed_initialization_is_retried() {
        let cell = DetectorCell::new();
        let factory = SlowFactory {
            calls: AtomicUsize::new(0),
            fail_first: true,
        };

        let err = cell.get_or_init(&factory).await.err().unwrap();
        assert!(matches!(err, MonitorError::DetectorInit(ref msg) if msg.contains("model download failed")));
        assert!(!cell.is_initialized());

        assert!(cell.get_or_init(&factory).await.is_ok());
        assert_eq!(factory.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shared_cell_is_one_instance() {
        assert!(Arc::ptr_eq(&shared(), &shared()));
    }
}
