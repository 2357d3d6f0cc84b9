use anyhow::Result;
use awaylock::capture::command::CommandCapture;
use awaylock::clock::SystemClock;
use awaylock::config::{self, Config};
use awaylock::detector::{self, command::CommandDetectorFactory};
use awaylock::lock::SystemLockAction;
use awaylock::monitor::{Collaborators, LockOutcome, Monitor, MonitorSnapshot, MANUAL_LOCK_REASON};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "awaylock")]
#[command(about = "Lock the session when nobody is in front of the camera")]
#[command(version)]
struct Args {
    /// Initialize configuration
    #[arg(long)]
    init: bool,

    /// Path to config file
    #[arg(long, short)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monitor presence and lock on absence (default)
    Run {
        /// Seconds of absence before locking (overrides config)
        #[arg(long)]
        threshold: Option<u64>,

        /// Watch presence without ever locking automatically
        #[arg(long)]
        no_auto_lock: bool,

        /// Print a JSON snapshot on every change instead of log lines
        #[arg(long)]
        json: bool,
    },
    /// Lock the session once, right now
    Lock {
        #[arg(long, default_value = MANUAL_LOCK_REASON)]
        reason: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("awaylock=info".parse()?),
        )
        .init();

    if args.init {
        config::init_wizard(args.config.as_deref()).await?;
        return Ok(());
    }

    match args.command {
        Some(Command::Lock { reason }) => {
            let config = config::load_or_default(args.config.as_deref())?;
            lock_once(&config, &reason).await
        }
        Some(Command::Run {
            threshold,
            no_auto_lock,
            json,
        }) => {
            let mut config = config::load(args.config.as_deref())?;
            if let Some(secs) = threshold {
                config.monitor.absence_threshold_secs = secs;
            }
            if no_auto_lock {
                config.monitor.auto_lock = false;
            }
            config.validate()?;
            run(&config, json).await
        }
        None => {
            let config = config::load(args.config.as_deref())?;
            run(&config, false).await
        }
    }
}

fn build_monitor(config: &Config) -> Monitor {
    Monitor::new(
        config.monitor_options(),
        Collaborators {
            clock: Arc::new(SystemClock::new()),
            capture: Arc::new(CommandCapture::from_config(&config.capture)),
            detector_factory: Arc::new(CommandDetectorFactory::new(config.detector.clone())),
            detectors: detector::shared(),
            lock_action: Arc::new(SystemLockAction::from_overrides(&config.lock.commands)),
        },
    )
}

async fn run(config: &Config, json: bool) -> Result<()> {
    let monitor = build_monitor(config);
    monitor.start().await?;

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut last: Option<MonitorSnapshot> = None;
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            _ = &mut interrupted => {
                tracing::info!("Interrupted, stopping monitor");
                break;
            }
            _ = ticker.tick() => {
                let snapshot = monitor.snapshot();
                if last.as_ref() != Some(&snapshot) {
                    report(last.as_ref(), &snapshot, json)?;
                    last = Some(snapshot);
                }
            }
        }
    }

    monitor.shutdown().await;
    Ok(())
}

fn report(previous: Option<&MonitorSnapshot>, current: &MonitorSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(current)?);
        return Ok(());
    }

    if previous.map(|p| p.camera_status) != Some(current.camera_status) {
        tracing::info!("{} (absent {}s)", current.camera_status, current.absence_seconds);
    }
    if previous.map(|p| p.lock_status.as_str()) != Some(current.lock_status.as_str())
        && !current.lock_status.is_empty()
    {
        tracing::info!("{}", current.lock_status);
    }
    Ok(())
}

async fn lock_once(config: &Config, reason: &str) -> Result<()> {
    let monitor = build_monitor(config);
    let outcome = monitor.lock_now(reason).await;
    if !outcome.attempted() {
        anyhow::bail!("Another lock attempt is already in progress");
    }
    if let LockOutcome::Failed(message) = outcome {
        anyhow::bail!("Could not lock the session: {}", message);
    }
    println!("{}", monitor.snapshot().lock_status);
    Ok(())
}
