//! Bounded execution of the host power-off command

use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Deadline for the whole power-off command, spawn to exit
pub const SHUTDOWN_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// How long captured pipes may stay open once the child is gone
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum ShutdownCommandError {
    #[error("shutdown command timed out after {0:?}")]
    Timeout(Duration),

    #[error("shutdown command exited unsuccessfully ({})", describe_exit(.code))]
    NonZeroExit { code: Option<i32> },

    #[error("failed to run shutdown command: {0}")]
    SpawnFailure(#[source] std::io::Error),
}

impl ShutdownCommandError {
    /// Short failure kind for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            ShutdownCommandError::Timeout(_) => "timeout",
            ShutdownCommandError::NonZeroExit { .. } => "non_zero_exit",
            ShutdownCommandError::SpawnFailure(_) => "spawn_failure",
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Outcome of a single power-off attempt
///
/// Both streams are kept on failure for diagnostics.
#[derive(Debug)]
pub struct ShutdownCommandResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<ShutdownCommandError>,
}

impl ShutdownCommandResult {
    pub fn succeeded(stdout: String, stderr: String) -> Self {
        Self {
            success: true,
            stdout,
            stderr,
            error: None,
        }
    }

    pub fn failed(error: ShutdownCommandError, stdout: String, stderr: String) -> Self {
        Self {
            success: false,
            stdout,
            stderr,
            error: Some(error),
        }
    }
}

/// Program and arguments that power the host off
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownCommand {
    program: String,
    args: Vec<String>,
}

impl ShutdownCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `systemctl poweroff -i`, ignoring inhibitors and logged-in users
    pub fn systemctl_poweroff() -> Self {
        Self::new("systemctl", ["poweroff", "-i"])
    }
}

impl Default for ShutdownCommand {
    fn default() -> Self {
        Self::systemctl_poweroff()
    }
}

impl fmt::Display for ShutdownCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Trait for powering off the host
///
/// Production code uses `CommandExecutor`.
/// Tests use `MockPowerOff` for deterministic results.
#[async_trait]
pub trait PowerOff: Send + Sync {
    async fn execute(&self) -> ShutdownCommandResult;
}

/// Runs the power-off command as a child process under a deadline
///
/// Repeated invocations are independent; nothing here serializes them.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    command: ShutdownCommand,
    timeout: Duration,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new(ShutdownCommand::default())
    }
}

impl CommandExecutor {
    pub fn new(command: ShutdownCommand) -> Self {
        Self {
            command,
            timeout: SHUTDOWN_COMMAND_TIMEOUT,
        }
    }

    /// Override the deadline (used by tests to keep timeouts short)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command(&self) -> &ShutdownCommand {
        &self.command
    }

    async fn run(&self) -> ShutdownCommandResult {
        let spawned = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                return ShutdownCommandResult::failed(
                    ShutdownCommandError::SpawnFailure(e),
                    String::new(),
                    String::new(),
                )
            }
        };

        let stdout = OutputCapture::start(child.stdout.take());
        let stderr = OutputCapture::start(child.stderr.take());

        let error = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => None,
            Ok(Ok(status)) => Some(ShutdownCommandError::NonZeroExit {
                code: status.code(),
            }),
            Ok(Err(e)) => Some(ShutdownCommandError::SpawnFailure(e)),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed out shutdown command");
                }
                Some(ShutdownCommandError::Timeout(self.timeout))
            }
        };

        let stdout = stdout.finish().await;
        let stderr = stderr.finish().await;

        match error {
            None => ShutdownCommandResult::succeeded(stdout, stderr),
            Some(error) => ShutdownCommandResult::failed(error, stdout, stderr),
        }
    }
}

#[async_trait]
impl PowerOff for CommandExecutor {
    #[instrument(name = "power.execute", skip(self), fields(command = %self.command))]
    async fn execute(&self) -> ShutdownCommandResult {
        debug!(timeout = ?self.timeout, "Executing shutdown command");

        let result = self.run().await;
        if result.success {
            info!(output = %result.stdout, "Shutdown command executed successfully");
        }
        result
    }
}

/// Collects a child pipe in the background
///
/// Bytes land in a shared buffer as they arrive, so a reader that has to be
/// abandoned still leaves behind whatever it already read.
struct OutputCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl OutputCapture {
    fn start<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = pipe.map(|mut pipe| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0u8; 4096];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buffer
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .extend_from_slice(&chunk[..n]),
                    }
                }
            })
        });

        Self { buffer, task }
    }

    async fn finish(self) -> String {
        if let Some(mut task) = self.task {
            // A grandchild may still hold the pipe open after the child exits
            if tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }

        let bytes = self
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let text = String::from_utf8_lossy(&bytes).into_owned();
        text
    }
}

/// Mock power-off for testing - returns a fixed outcome after an optional delay
#[cfg(test)]
pub struct MockPowerOff {
    succeed: bool,
    delay: Duration,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockPowerOff {
    pub fn succeeding() -> Self {
        Self {
            succeed: true,
            delay: Duration::ZERO,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            succeed: false,
            ..Self::succeeding()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl PowerOff for MockPowerOff {
    async fn execute(&self) -> ShutdownCommandResult {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.succeed {
            ShutdownCommandResult::succeeded("powering off\n".to_string(), String::new())
        } else {
            ShutdownCommandResult::failed(
                ShutdownCommandError::NonZeroExit { code: Some(1) },
                String::new(),
                "Access denied\n".to_string(),
            )
        }
    }
}
