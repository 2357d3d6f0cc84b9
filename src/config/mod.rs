use crate::capture::{CaptureConstraints, Facing};
use crate::monitor::MonitorOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub lock: LockConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    #[serde(default = "default_absence_threshold")]
    pub absence_threshold_secs: u64,
    #[serde(default = "default_lock_cooldown")]
    pub lock_cooldown_ms: u64,
    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,
    #[serde(default = "default_evaluate_interval")]
    pub evaluate_interval_ms: u64,
    #[serde(default = "default_true")]
    pub auto_lock: bool,
}

fn default_absence_threshold() -> u64 {
    5
}

fn default_lock_cooldown() -> u64 {
    30_000
}

fn default_sample_interval() -> u64 {
    500
}

fn default_evaluate_interval() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            absence_threshold_secs: default_absence_threshold(),
            lock_cooldown_ms: default_lock_cooldown(),
            sample_interval_ms: default_sample_interval(),
            evaluate_interval_ms: default_evaluate_interval(),
            auto_lock: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureConfig {
    #[serde(default = "default_capture_program")]
    pub program: String,
    /// Argument template; see `CommandCapture::render_args` for placeholders.
    #[serde(default = "default_capture_args")]
    pub args: Vec<String>,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub facing: Facing,
    /// Where per-session snapshot directories are created. Defaults to the
    /// user cache directory.
    #[serde(default)]
    pub frame_dir: Option<PathBuf>,
}

fn default_capture_program() -> String {
    "ffmpeg".to_string()
}

fn default_capture_args() -> Vec<String> {
    [
        "-loglevel", "error",
        "-f", "v4l2",
        "-video_size", "{width}x{height}",
        "-i", "{device}",
        "-an",
        "-vf", "fps=4",
        "-update", "1",
        "-y", "{frame}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_device() -> String {
    "/dev/video0".to_string()
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            program: default_capture_program(),
            args: default_capture_args(),
            device: default_device(),
            width: default_width(),
            height: default_height(),
            facing: Facing::default(),
            frame_dir: None,
        }
    }
}

impl CaptureConfig {
    pub fn constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            facing: self.facing,
            width: self.width,
            height: self.height,
        }
    }

    pub fn resolved_frame_dir(&self) -> PathBuf {
        if let Some(dir) = &self.frame_dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("", "", "awaylock")
            .map(|dirs| dirs.cache_dir().join("frames"))
            .unwrap_or_else(|| std::env::temp_dir().join("awaylock-frames"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectorConfig {
    /// Classifier executable. Reads one encoded frame on stdin, prints JSON.
    #[serde(default)]
    pub program: String,
    /// Arguments; `{timestamp}` is replaced with the sample time in ms.
    #[serde(default)]
    pub args: Vec<String>,
    /// Run once when the detector is initialized; non-zero exit fails the start.
    #[serde(default)]
    pub probe_args: Vec<String>,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_detect_timeout")]
    pub timeout_ms: u64,
}

fn default_min_confidence() -> f64 {
    0.6
}

fn default_detect_timeout() -> u64 {
    2000
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            probe_args: Vec::new(),
            min_confidence: default_min_confidence(),
            timeout_ms: default_detect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LockConfig {
    /// Replacement lock chain, one argv list per command. Empty uses the
    /// platform defaults.
    #[serde(default)]
    pub commands: Vec<Vec<String>>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.monitor.absence_threshold_secs == 0 {
            anyhow::bail!("monitor.absence_threshold_secs must be at least 1");
        }
        if self.monitor.sample_interval_ms == 0 || self.monitor.evaluate_interval_ms == 0 {
            anyhow::bail!("monitor intervals must be greater than zero");
        }
        if !(0.0..=1.0).contains(&self.detector.min_confidence) {
            anyhow::bail!(
                "detector.min_confidence must be between 0 and 1 (got {})",
                self.detector.min_confidence
            );
        }
        Ok(())
    }

    pub fn monitor_options(&self) -> MonitorOptions {
        MonitorOptions {
            absence_threshold_secs: self.monitor.absence_threshold_secs,
            lock_cooldown_ms: self.monitor.lock_cooldown_ms,
            auto_lock: self.monitor.auto_lock,
            sample_interval: Duration::from_millis(self.monitor.sample_interval_ms),
            evaluate_interval: Duration::from_millis(self.monitor.evaluate_interval_ms),
            constraints: self.capture.constraints(),
        }
    }
}

pub fn config_dir() -> Result<PathBuf> {
    let dir = directories::ProjectDirs::from("", "", "awaylock")
        .context("Could not determine config directory")?
        .config_dir()
        .to_path_buf();
    Ok(dir)
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

fn resolve(path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(p) => Ok(p.to_path_buf()),
        None => default_config_path(),
    }
}

pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = resolve(path)?;

    if !path.exists() {
        anyhow::bail!(
            "Config file not found at {}. Run `awaylock --init` to create one.",
            path.display()
        );
    }

    load_from(&path)
}

/// Like [`load`], but a missing file yields the defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    let path = resolve(path)?;
    if !path.exists() {
        return Ok(Config::default());
    }
    load_from(&path)
}

fn load_from(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config from {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("Invalid config in {}", path.display()))?;

    Ok(config)
}

pub fn save(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    // Set file permissions to 0600 (Unix only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

pub async fn init_wizard(path: Option<&Path>) -> Result<()> {
    use std::io::{self, Write};

    println!("awaylock Configuration Wizard");
    println!("=============================\n");

    let config_path = resolve(path)?;
    if config_path.exists() {
        print!("Config already exists at {}. Overwrite? [y/N] ", config_path.display());
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    print!("Detector command (reads a frame on stdin, prints JSON): ");
    io::stdout().flush()?;
    let mut detector = String::new();
    io::stdin().read_line(&mut detector)?;

    print!(
        "Lock after how many seconds of absence? [{}] ",
        default_absence_threshold()
    );
    io::stdout().flush()?;
    let mut threshold = String::new();
    io::stdin().read_line(&mut threshold)?;

    print!("Camera device [{}]: ", default_device());
    io::stdout().flush()?;
    let mut device = String::new();
    io::stdin().read_line(&mut device)?;

    let mut config = Config::default();

    let mut words = detector.split_whitespace().map(String::from);
    if let Some(program) = words.next() {
        config.detector.program = program;
        config.detector.args = words.collect();
    }

    if !threshold.trim().is_empty() {
        config.monitor.absence_threshold_secs = threshold
            .trim()
            .parse()
            .with_context(|| format!("Not a number of seconds: {}", threshold.trim()))?;
    }

    if !device.trim().is_empty() {
        config.capture.device = device.trim().to_string();
    }

    config.validate()?;
    save(&config_path, &config)?;

    println!("\nConfig saved to {}", config_path.display());
    println!("Run `awaylock` to start monitoring.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_gives_reference_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.monitor.absence_threshold_secs, 5);
        assert_eq!(config.monitor.lock_cooldown_ms, 30_000);
        assert_eq!(config.monitor.sample_interval_ms, 500);
        assert_eq!(config.monitor.evaluate_interval_ms, 1000);
        assert!(config.monitor.auto_lock);
        assert_eq!(config.detector.min_confidence, 0.6);
    }

    #[test]
    fn monitor_options_carry_intervals_and_constraints() {
        let config: Config = toml::from_str(
            r#"
            [monitor]
            absence_threshold_secs = 12
            sample_interval_ms = 250

            [capture]
            width = 320
            height = 240
            facing = "environment"
            "#,
        )
        .unwrap();

        let options = config.monitor_options();

        assert_eq!(options.absence_threshold_secs, 12);
        assert_eq!(options.sample_interval, Duration::from_millis(250));
        assert_eq!(options.evaluate_interval, Duration::from_millis(1000));
        assert_eq!(
            options.constraints,
            CaptureConstraints {
                facing: Facing::Environment,
                width: 320,
                height: 240,
            }
        );
    }

    #[test]
    fn rejects_zero_intervals_and_threshold() {
        let mut config = Config::default();
        config.monitor.sample_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.monitor.absence_threshold_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.detector.min_confidence = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_frame_dir_wins() {
        let capture = CaptureConfig {
            frame_dir: Some(PathBuf::from("/var/tmp/frames")),
            ..CaptureConfig::default()
        };
        assert_eq!(capture.resolved_frame_dir(), PathBuf::from("/var/tmp/frames"));
    }
}
