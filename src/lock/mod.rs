//! Session lock action.
//!
//! The lock is fire-and-forget: a successful command only means the OS
//! accepted the request, not that the screen is actually locked.

use anyhow::Result;
use futures::future::BoxFuture;
use std::process::Stdio;
use tokio::process::Command;

pub trait LockAction: Send + Sync {
    fn invoke(&self) -> BoxFuture<'_, Result<()>>;
}

/// One program invocation in the lock chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl LockCommand {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Build from an argv list; the first element is the program.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn describe(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Lock commands tried in order on the current platform.
pub fn platform_commands() -> Vec<LockCommand> {
    if cfg!(target_os = "windows") {
        vec![LockCommand::new("rundll32.exe", &["user32.dll,LockWorkStation"])]
    } else if cfg!(target_os = "macos") {
        vec![
            LockCommand::new(
                "/System/Library/CoreServices/Menu Extras/User.menu/Contents/Resources/CGSession",
                &["-suspend"],
            ),
            LockCommand::new(
                "/usr/bin/osascript",
                &[
                    "-e",
                    "tell application \"System Events\" to keystroke \"q\" using {control down, command down}",
                ],
            ),
            LockCommand::new("/usr/bin/open", &["-a", "ScreenSaverEngine"]),
            LockCommand::new("/usr/bin/pmset", &["displaysleepnow"]),
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            LockCommand::new("loginctl", &["lock-session"]),
            LockCommand::new("xdg-screensaver", &["lock"]),
            LockCommand::new("gnome-screensaver-command", &["-l"]),
        ]
    } else {
        Vec::new()
    }
}

/// Tries each command until one exits successfully.
#[derive(Debug, Clone)]
pub struct SystemLockAction {
    commands: Vec<LockCommand>,
}

impl SystemLockAction {
    pub fn new(commands: Vec<LockCommand>) -> Self {
        Self { commands }
    }

    /// Use `overrides` when given, otherwise the platform chain.
    pub fn from_overrides(overrides: &[Vec<String>]) -> Self {
        let commands: Vec<LockCommand> = overrides
            .iter()
            .filter_map(|argv| LockCommand::from_argv(argv))
            .collect();

        if commands.is_empty() {
            Self::new(platform_commands())
        } else {
            Self::new(commands)
        }
    }

    pub fn commands(&self) -> &[LockCommand] {
        &self.commands
    }

    async fn run_chain(&self) -> Result<()> {
        if self.commands.is_empty() {
            anyhow::bail!("Session locking is not supported on this operating system");
        }

        let mut errors = Vec::new();
        for command in &self.commands {
            match run_and_check(command).await {
                Ok(()) => {
                    tracing::debug!("Lock command '{}' succeeded", command.describe());
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!("Lock command failed: {}", e);
                    errors.push(e);
                }
            }
        }

        anyhow::bail!("{}", errors.join(" | "))
    }
}

impl Default for SystemLockAction {
    fn default() -> Self {
        Self::new(platform_commands())
    }
}

impl LockAction for SystemLockAction {
    fn invoke(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.run_chain())
    }
}

async fn run_and_check(command: &LockCommand) -> Result<(), String> {
    let output = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| format!("Could not run '{}': {}", command.program, e))?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let details = if stderr.is_empty() {
        format!("Exit code: {:?}", output.status.code())
    } else {
        stderr
    };

    Err(format!("Command '{}' failed. {}", command.describe(), details))
}
