//! Classifier run as an external process.
//!
//! Each detect call spawns the configured program, writes the encoded frame
//! to its stdin and reads a JSON document from its stdout. Two output shapes
//! are understood:
//!
//! - `{"count": 1}`
//! - `{"detections": [{"score": 0.92}, ...]}` (or a bare array), where
//!   entries below the configured confidence are dropped. `confidence` is
//!   accepted as an alias for `score`; entries without either are counted.

use super::{DetectorFactory, Detections, PresenceDetector};
use crate::capture::Frame;
use crate::config::DetectorConfig;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde_json::Value;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct CommandDetector {
    program: String,
    args: Vec<String>,
    min_confidence: f64,
    timeout: Duration,
}

impl CommandDetector {
    pub fn new(program: impl Into<String>, args: Vec<String>, min_confidence: f64, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            min_confidence,
            timeout,
        }
    }

    fn render_args(&self, timestamp_ms: u64) -> Vec<String> {
        let ts = timestamp_ms.to_string();
        self.args.iter().map(|a| a.replace("{timestamp}", &ts)).collect()
    }

    async fn run(&self, frame: &Frame, timestamp_ms: u64) -> Result<Detections> {
        tokio::time::timeout(self.timeout, self.exchange(frame, timestamp_ms))
            .await
            .with_context(|| format!("Detector timed out after {:?}", self.timeout))?
    }

    async fn exchange(&self, frame: &Frame, timestamp_ms: u64) -> Result<Detections> {
        let mut child = Command::new(&self.program)
            .args(self.render_args(timestamp_ms))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to run detector '{}'", self.program))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&frame.data)
                .await
                .context("Failed to write frame to detector")?;
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to collect detector output")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Detector exited with {}: {}", output.status, stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_detections(&stdout, self.min_confidence)
    }
}

impl PresenceDetector for CommandDetector {
    fn detect<'a>(
        &'a self,
        frame: &'a Frame,
        timestamp_ms: u64,
    ) -> BoxFuture<'a, Result<Detections>> {
        Box::pin(self.run(frame, timestamp_ms))
    }
}

/// Parse classifier output into a detection count.
pub fn parse_detections(output: &str, min_confidence: f64) -> Result<Detections> {
    let value: Value =
        serde_json::from_str(output.trim()).context("Detector output is not valid JSON")?;

    if let Some(count) = value["count"].as_u64() {
        return Ok(Detections::new(count as usize));
    }

    let entries = value["detections"]
        .as_array()
        .or_else(|| value.as_array())
        .ok_or_else(|| anyhow::anyhow!("Detector output has neither 'count' nor 'detections'"))?;

    let count = entries
        .iter()
        .filter(|entry| {
            entry["score"]
                .as_f64()
                .or_else(|| entry["confidence"].as_f64())
                .map(|score| score >= min_confidence)
                .unwrap_or(true)
        })
        .count();

    Ok(Detections::new(count))
}

/// Builds a [`CommandDetector`] from config, optionally probing the program
/// once so a missing or broken classifier fails the session start.
pub struct CommandDetectorFactory {
    config: DetectorConfig,
}

impl CommandDetectorFactory {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    async fn build(&self) -> Result<Arc<dyn PresenceDetector>> {
        let program = self.config.program.trim();
        if program.is_empty() {
            anyhow::bail!("No detector program configured (set [detector].program)");
        }

        if !self.config.probe_args.is_empty() {
            let output = Command::new(program)
                .args(&self.config.probe_args)
                .stdin(Stdio::null())
                .output()
                .await
                .with_context(|| format!("Failed to run detector '{}'", program))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                anyhow::bail!("Detector probe failed ({}): {}", output.status, stderr.trim());
            }
        }

        Ok(Arc::new(CommandDetector::new(
            program,
            self.config.args.clone(),
            self.config.min_confidence,
            Duration::from_millis(self.config.timeout_ms.max(1)),
        )))
    }
}

impl DetectorFactory for CommandDetectorFactory {
    fn initialize(&self) -> BoxFuture<'_, Result<Arc<dyn PresenceDetector>>> {
        Box::pin(self.build())
    }
}
