//! Capture device abstraction.
//!
//! A [`CaptureSource`] hands out one exclusive [`CaptureStream`] per
//! monitoring session. The session wraps it in a [`StreamGuard`] so the
//! device is released on every exit path, including a start that fails
//! after the device was acquired.

pub mod command;

use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which camera to prefer when the platform offers several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    #[default]
    User,
    Environment,
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Facing::User => write!(f, "user"),
            Facing::Environment => write!(f, "environment"),
        }
    }
}

/// Requested video properties. Width and height are ideals, not minimums.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub facing: Facing,
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            facing: Facing::User,
            width: 640,
            height: 480,
        }
    }
}

/// The device was opened but cannot deliver video (busy, unplugged, wrong
/// format). Distinguished from a plain acquisition failure so callers can
/// tell "no camera" apart from "could not even try".
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct DeviceUnavailable(pub String);

/// One encoded video frame as produced by the capture device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

pub trait CaptureStream: Send + Sync {
    /// Whether a current frame is available. Sampler ticks are skipped
    /// while this is false.
    fn frame_ready(&self) -> bool;

    fn current_frame(&self) -> Result<Frame>;

    /// Stop the device. Must be idempotent.
    fn release(&self);
}

pub trait CaptureSource: Send + Sync {
    fn acquire<'a>(
        &'a self,
        constraints: &'a CaptureConstraints,
    ) -> BoxFuture<'a, Result<Box<dyn CaptureStream>>>;
}

/// Owns an acquired stream and releases it when dropped.
pub struct StreamGuard {
    stream: Box<dyn CaptureStream>,
}

impl StreamGuard {
    pub fn new(stream: Box<dyn CaptureStream>) -> Self {
        Self { stream }
    }

    pub fn stream(&self) -> &dyn CaptureStream {
        self.stream.as_ref()
    }

    pub fn release(&self) {
        self.stream.release();
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.stream.release();
    }
}
