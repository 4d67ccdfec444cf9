//! External command execution
//!
//! Both the command-based language backend and the command-based speech
//! backend run a configured program with one extra trailing argument (the
//! prompt or the answer text) and collect its stdout.
//!
//! # Example Configuration
//!
//! ```toml
//! [query]
//! backend = "command"
//! command = ["ollama", "run", "llama3.2:1b"]
//! timeout_secs = 60
//! ```
//!
//! The process runs on the tokio runtime so the timeout can kill it. Callers
//! live on blocking threads and wait through the runtime handle.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio::time::timeout;

/// A program plus its fixed leading arguments
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    runtime: Handle,
}

impl CommandRunner {
    /// Build from an argv list like `["espeak-ng", "-v", "es", "--stdout"]`.
    ///
    /// Returns None when the list is empty.
    pub fn from_argv(argv: &[String], timeout: Duration, runtime: Handle) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
            runtime,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run with `final_arg` appended and return raw stdout.
    ///
    /// Must not be called from inside an async task.
    pub fn run(&self, final_arg: &str) -> Result<Vec<u8>, CommandError> {
        self.runtime.block_on(self.execute(final_arg))
    }

    async fn execute(&self, final_arg: &str) -> Result<Vec<u8>, CommandError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(final_arg)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CommandError::SpawnFailed(format!("{}: {}", self.program, e)))?;

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| CommandError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| CommandError::WaitFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CommandError::NonZeroExit {
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        tracing::trace!(
            "{} produced {} bytes of output",
            self.program,
            output.stdout.len()
        );

        Ok(output.stdout)
    }
}

/// Errors that can occur running an external command
#[derive(Debug)]
pub enum CommandError {
    /// Failed to spawn the command process
    SpawnFailed(String),
    /// Command timed out and was killed
    Timeout(u64),
    /// Failed to wait for command completion
    WaitFailed(String),
    /// Command exited with non-zero status
    NonZeroExit { code: Option<i32>, stderr: String },
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SpawnFailed(e) => write!(f, "failed to spawn command: {}", e),
            Self::Timeout(secs) => write!(f, "command timed out after {}s", secs),
            Self::WaitFailed(e) => write!(f, "failed to wait for command: {}", e),
            Self::NonZeroExit { code, stderr } => {
                if stderr.is_empty() {
                    write!(f, "command exited with code {:?}", code)
                } else {
                    write!(f, "command exited with code {:?}: {}", code, stderr)
                }
            }
        }
    }
}

impl std::error::Error for CommandError {}
