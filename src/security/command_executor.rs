//! SafeCommandExecutor: allow-listed external command execution
//!
//! # Security Features
//!
//! - **Allow-list validation**: Only pre-approved programs can execute
//! - **Injection prevention**: Uses `tokio::process::Command`, never a shell
//! - **Argument safety**: Arguments passed as a vector, never interpolated into shell strings
//! - **Working directory validation**: Validates existence before execution
//! - **Timeout control**: Hanging processes are killed
//!
//! # Example
//!
//! ```rust,no_run
//! use artifact_publisher::security::SafeCommandExecutor;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), artifact_publisher::security::CommandError> {
//! let mut executor = SafeCommandExecutor::new(std::env::temp_dir())?;
//! executor.set_timeout(Duration::from_secs(30));
//!
//! let output = executor
//!     .execute_with_input("gpg", &["--detach-sign", "--armor"], b"payload")
//!     .await?;
//! println!("{}", String::from_utf8_lossy(&output.stdout));
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Programs every executor accepts.
const ALLOWED_COMMANDS: &[&str] = &["gpg", "gpg2"];

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command is not in the allow-list
    #[error("Command '{0}' is not in the allowed whitelist")]
    CommandNotAllowed(String),

    /// Working directory does not exist or is not accessible
    #[error("Working directory does not exist: {0}")]
    InvalidWorkingDirectory(PathBuf),

    /// Command execution failed (e.g., binary not found, permission denied)
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    /// Command exceeded the timeout duration
    #[error("Command timeout after {0:?}")]
    Timeout(Duration),
}

/// Safe command executor with security controls
#[derive(Debug, Clone)]
pub struct SafeCommandExecutor {
    /// Working directory where commands will be executed
    working_dir: PathBuf,
    /// Optional timeout for command execution
    timeout: Option<Duration>,
    /// Programs allowed in addition to `ALLOWED_COMMANDS`
    extra_allowed: Vec<String>,
}

impl SafeCommandExecutor {
    /// Create a new SafeCommandExecutor with working directory validation.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::InvalidWorkingDirectory` if the directory does not exist.
    pub fn new<P: AsRef<Path>>(working_dir: P) -> Result<Self, CommandError> {
        let working_dir = working_dir.as_ref().to_path_buf();

        if !working_dir.is_dir() {
            return Err(CommandError::InvalidWorkingDirectory(working_dir));
        }

        Ok(Self {
            working_dir,
            timeout: None,
            extra_allowed: Vec::new(),
        })
    }

    /// Allow an additional program, e.g. a configured signing command.
    pub fn allow(mut self, program: impl Into<String>) -> Self {
        self.extra_allowed.push(program.into());
        self
    }

    /// Set command execution timeout.
    ///
    /// Commands exceeding this duration are killed.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    pub fn is_allowed(&self, command: &str) -> bool {
        ALLOWED_COMMANDS.contains(&command) || self.extra_allowed.iter().any(|p| p == command)
    }

    /// Execute a command without input.
    pub async fn execute(&self, command: &str, args: &[&str]) -> Result<Output, CommandError> {
        self.execute_with_input(command, args, &[]).await
    }

    /// Execute a command, piping `input` to its stdin and capturing its output.
    ///
    /// # Errors
    ///
    /// - `CommandError::CommandNotAllowed` - Command not in allow-list
    /// - `CommandError::ExecutionFailed` - Binary not found or I/O error
    /// - `CommandError::Timeout` - Command did not finish in time
    pub async fn execute_with_input(
        &self,
        command: &str,
        args: &[&str],
        input: &[u8],
    ) -> Result<Output, CommandError> {
        if !self.is_allowed(command) {
            return Err(CommandError::CommandNotAllowed(command.to_string()));
        }

        let mut child = Command::new(command)
            .args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CommandError::ExecutionFailed(e.to_string()))?;

        // Feed stdin from a separate task so a child filling its stdout pipe
        // cannot deadlock against our write.
        let stdin = child.stdin.take();
        let input = input.to_vec();
        let writer = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                // A child that exits without reading reports the error itself
                let _ = stdin.write_all(&input).await;
                let _ = stdin.shutdown().await;
            }
        });

        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| CommandError::Timeout(timeout))?,
            None => child.wait_with_output().await,
        }
        .map_err(|e| CommandError::ExecutionFailed(e.to_string()))?;

        let _ = writer.await;
        tracing::debug!(command, status = ?output.status.code(), "command finished");

        Ok(output)
    }
}
