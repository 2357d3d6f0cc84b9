//! Frame grabber driven by an external process.
//!
//! The process (ffmpeg by default) keeps overwriting a single snapshot file
//! inside a per-session directory. The stream reports a frame as ready once
//! that file exists and is non-empty, and reads it on demand.

use super::{CaptureConstraints, CaptureSource, CaptureStream, DeviceUnavailable, Frame};
use crate::config::CaptureConfig;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::process::{Child, Command};

const FRAME_FILE_NAME: &str = "frame.jpg";

/// How long the grabber gets to fail fast (bad device, missing binary
/// arguments) before the stream is handed out.
const STARTUP_GRACE: Duration = Duration::from_millis(150);

#[derive(Debug, Clone)]
pub struct CommandCapture {
    program: String,
    args: Vec<String>,
    device: String,
    frame_dir: PathBuf,
}

impl CommandCapture {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        device: impl Into<String>,
        frame_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            device: device.into(),
            frame_dir: frame_dir.into(),
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            config.device.clone(),
            config.resolved_frame_dir(),
        )
    }

    /// Substitute `{device}`, `{width}`, `{height}`, `{facing}` and `{frame}`
    /// in the argument template.
    pub fn render_args(&self, constraints: &CaptureConstraints, frame_path: &Path) -> Vec<String> {
        let frame = frame_path.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{device}", &self.device)
                    .replace("{width}", &constraints.width.to_string())
                    .replace("{height}", &constraints.height.to_string())
                    .replace("{facing}", &constraints.facing.to_string())
                    .replace("{frame}", &frame)
            })
            .collect()
    }

    async fn spawn(&self, constraints: &CaptureConstraints) -> Result<Box<dyn CaptureStream>> {
        let dir = self.frame_dir.join(uuid::Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create frame directory {}", dir.display()))?;

        let frame_path = dir.join(FRAME_FILE_NAME);
        let args = self.render_args(constraints, &frame_path);

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                remove_frame_dir(&dir);
                return Err(e).with_context(|| format!("Failed to run '{}'", self.program));
            }
        };

        tokio::time::sleep(STARTUP_GRACE).await;
        if let Ok(Some(status)) = child.try_wait() {
            remove_frame_dir(&dir);
            return Err(DeviceUnavailable(format!(
                "Capture process '{}' exited immediately ({})",
                self.program, status
            ))
            .into());
        }

        tracing::debug!("Capture process '{}' started, writing to {}", self.program, frame_path.display());

        Ok(Box::new(CommandStream {
            child: Mutex::new(Some(child)),
            frame_path,
            dir,
        }))
    }
}

impl CaptureSource for CommandCapture {
    fn acquire<'a>(
        &'a self,
        constraints: &'a CaptureConstraints,
    ) -> BoxFuture<'a, Result<Box<dyn CaptureStream>>> {
        Box::pin(self.spawn(constraints))
    }
}

struct CommandStream {
    child: Mutex<Option<Child>>,
    frame_path: PathBuf,
    dir: PathBuf,
}

impl CommandStream {
    fn grabber_running(&self) -> bool {
        let mut guard = self.child.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

impl CaptureStream for CommandStream {
    fn frame_ready(&self) -> bool {
        if !self.grabber_running() {
            return false;
        }
        std::fs::metadata(&self.frame_path)
            .map(|m| m.len() > 0)
            .unwrap_or(false)
    }

    fn current_frame(&self) -> Result<Frame> {
        let data = std::fs::read(&self.frame_path)
            .with_context(|| format!("Failed to read frame from {}", self.frame_path.display()))?;
        Ok(Frame::new(data))
    }

    fn release(&self) {
        let child = self.child.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(mut child) = child else {
            return;
        };
        if let Err(e) = child.start_kill() {
            tracing::debug!("Capture process already gone: {}", e);
        }
        remove_frame_dir(&self.dir);
    }
}

fn remove_frame_dir(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        tracing::debug!("Failed to remove frame directory {}: {}", dir.display(), e);
    }
}
