//! Command Signing Backend - detached signatures from an external program
//!
//! The payload is piped to the program's stdin and the armored signature is
//! read from stdout. By default this is `gpg`:
//!
//! ```text
//! gpg --batch --yes --local-user {key_id} --detach-sign --armor --output -
//! ```
//!
//! With a passphrase, stdin carries the passphrase instead (`--passphrase-fd
//! 0`) and the payload is staged in a temporary file passed by path. The
//! passphrase never appears on the command line.
//!
//! Custom arguments may use `{key_id}` and `{input}` placeholders. When
//! `{input}` is present the payload is passed by path and stdin carries the
//! passphrase, if any.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

use crate::core::config::SigningConfig;
use crate::core::error::ReleaseError;
use crate::core::traits::{SigningBackend, SigningKey};
use crate::security::{CommandError, SafeCommandExecutor};

/// Default signing program
pub const DEFAULT_SIGNING_PROGRAM: &str = "gpg";

/// Default timeout per signature
pub const DEFAULT_SIGNING_TIMEOUT: Duration = Duration::from_secs(60);

/// Placeholder for the staged payload path
pub const INPUT_PLACEHOLDER: &str = "{input}";

const DEFAULT_ARGS: &[&str] = &[
    "--batch",
    "--yes",
    "--local-user",
    "{key_id}",
    "--detach-sign",
    "--armor",
    "--output",
    "-",
];

/// gpg needs loopback pinentry to accept a passphrase non-interactively
const PASSPHRASE_ARGS: &[&str] = &["--pinentry-mode", "loopback", "--passphrase-fd", "0"];

/// Signing backend running an allow-listed external command
#[derive(Debug, Clone)]
pub struct CommandSigningBackend {
    executor: SafeCommandExecutor,
    program: String,
    /// `None` selects the default gpg arguments
    args: Option<Vec<String>>,
}

impl CommandSigningBackend {
    /// Backend for the default `gpg` command
    pub fn gpg(working_dir: &Path) -> Result<Self, ReleaseError> {
        Self::from_config(&SigningConfig::default(), working_dir)
    }

    /// Backend described by the signing configuration
    ///
    /// A configured program is allowed in addition to the built-in allow-list.
    pub fn from_config(config: &SigningConfig, working_dir: &Path) -> Result<Self, ReleaseError> {
        let (program, args) = match &config.command {
            Some(command) => (command.program.clone(), Some(command.args.clone())),
            None => (DEFAULT_SIGNING_PROGRAM.to_string(), None),
        };

        let mut executor = SafeCommandExecutor::new(working_dir)
            .map_err(|e| ReleaseError::Config(e.to_string()))?
            .allow(program.clone());
        executor.set_timeout(
            config
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SIGNING_TIMEOUT),
        );

        Ok(Self {
            executor,
            program,
            args,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Whether the payload is passed by path rather than on stdin
    pub fn signs_from_file(&self, key: &SigningKey) -> bool {
        match &self.args {
            Some(args) => args.iter().any(|arg| arg.contains(INPUT_PLACEHOLDER)),
            None => key.passphrase.is_some(),
        }
    }

    /// Command line arguments with placeholders substituted
    ///
    /// `input` is the staged payload path, required when
    /// [`signs_from_file`](Self::signs_from_file) is true.
    pub fn render_args(&self, key: &SigningKey, input: Option<&Path>) -> Vec<String> {
        let input = input.map(|path| path.display().to_string()).unwrap_or_default();

        match &self.args {
            Some(args) => args
                .iter()
                .map(|arg| {
                    arg.replace("{key_id}", &key.key_id)
                        .replace(INPUT_PLACEHOLDER, &input)
                })
                .collect(),
            None if key.passphrase.is_some() => PASSPHRASE_ARGS
                .iter()
                .chain(DEFAULT_ARGS)
                .map(|arg| arg.replace("{key_id}", &key.key_id))
                .chain(std::iter::once(input))
                .collect(),
            None => DEFAULT_ARGS
                .iter()
                .map(|arg| arg.replace("{key_id}", &key.key_id))
                .collect(),
        }
    }

    async fn stage(payload: &[u8]) -> Result<NamedTempFile, ReleaseError> {
        let file = tempfile::Builder::new()
            .prefix("artifact-sign-")
            .tempfile()
            .map_err(|e| ReleaseError::io("temporary signing input", e))?;
        tokio::fs::write(file.path(), payload)
            .await
            .map_err(|e| ReleaseError::io(file.path().display(), e))?;
        Ok(file)
    }
}

#[async_trait]
impl SigningBackend for CommandSigningBackend {
    fn name(&self) -> &str {
        &self.program
    }

    async fn sign(&self, payload: &[u8], key: &SigningKey) -> Result<Vec<u8>, ReleaseError> {
        let failed = |message: String| ReleaseError::SigningError {
            artifact: String::new(),
            message,
        };

        let staged = if self.signs_from_file(key) {
            Some(Self::stage(payload).await?)
        } else {
            None
        };

        let args = self.render_args(key, staged.as_ref().map(NamedTempFile::path));
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        let input = match (&staged, &key.passphrase) {
            (None, _) => payload.to_vec(),
            (Some(_), Some(passphrase)) => format!("{}\n", passphrase.expose_secret()).into_bytes(),
            (Some(_), None) => Vec::new(),
        };

        let output = self
            .executor
            .execute_with_input(&self.program, &args, &input)
            .await
            .map_err(|e| match e {
                CommandError::Timeout(timeout) => {
                    failed(format!("{} timed out after {:?}", self.program, timeout))
                }
                other => failed(other.to_string()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("no error output");
            return Err(failed(format!(
                "{} exited with {}: {}",
                self.program,
                output
                    .status
                    .code()
                    .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                reason.trim()
            )));
        }

        if output.stdout.is_empty() {
            return Err(failed(format!("{} produced no signature", self.program)));
        }

        Ok(output.stdout)
    }
}
