//! Error handling for artifact releases
//!
//! This module provides the release error taxonomy with recovery guidance
//! using the thiserror crate for ergonomic error handling.

use thiserror::Error;

use crate::core::state_machine::ModuleState;

/// Main error type for release operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    // Assembly errors
    #[error("[{module}] module is incomplete: {reason}")]
    IncompleteModule { module: String, reason: String },

    #[error("[{module}] invalid module coordinates: {message}")]
    InvalidModule { module: String, message: String },

    // Signing errors
    #[error("[{artifact}] signing failed: {message}")]
    SigningError { artifact: String, message: String },

    // Transport errors
    #[error("[{target}] transient failure: {message}")]
    TransientFailure { target: String, message: String },

    #[error("[{target}] permanent failure: {message}")]
    PermanentFailure { target: String, message: String },

    // Run-level errors
    #[error("{} module(s) failed: {}", failed.len(), failed.join(", "))]
    PartialRelease { failed: Vec<String> },

    #[error("[{module}] cancelled before start")]
    Cancelled { module: String },

    #[error("[{module}] illegal state transition {from:?} -> {to:?}")]
    InvalidTransition {
        module: String,
        from: ModuleState,
        to: ModuleState,
    },

    #[error("[{module}] report entry already recorded")]
    DuplicateReportEntry { module: String },

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ReleaseError {
    /// Convenience constructor for I/O failures tied to a path
    pub fn io(path: impl std::fmt::Display, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_string(),
            source,
        }
    }

    /// Attribute a transport failure to a named target
    ///
    /// Transports only see endpoints; the publisher knows the target name.
    pub fn for_target(self, name: &str) -> Self {
        match self {
            Self::TransientFailure { message, .. } => Self::TransientFailure {
                target: name.to_string(),
                message,
            },
            Self::PermanentFailure { message, .. } => Self::PermanentFailure {
                target: name.to_string(),
                message,
            },
            other => other,
        }
    }

    /// Name of the module, artifact or target this error concerns
    pub fn subject(&self) -> &str {
        match self {
            Self::IncompleteModule { module, .. }
            | Self::InvalidModule { module, .. }
            | Self::Cancelled { module }
            | Self::InvalidTransition { module, .. }
            | Self::DuplicateReportEntry { module } => module,
            Self::SigningError { artifact, .. } => artifact,
            Self::TransientFailure { target, .. } | Self::PermanentFailure { target, .. } => target,
            Self::Io { path, .. } => path,
            Self::PartialRelease { .. } | Self::Config(_) => "release",
        }
    }

    /// Whether retrying the same operation may succeed
    ///
    /// Only transport-classified transient failures qualify. A bad signing key
    /// or a rejected upload will fail the same way on every attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientFailure { .. })
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::IncompleteModule { .. } => vec![
                "Build the module before releasing it",
                "Check the declared artifact paths or output directory",
            ],
            Self::InvalidModule { .. } => vec![
                "Check the module group, name and version in the release configuration",
            ],
            Self::SigningError { .. } => vec![
                "Check that the signing key id exists in the keyring",
                "Check the signing passphrase credential",
                "Unset signing.key_id to publish without signatures",
            ],
            Self::TransientFailure { .. } => vec![
                "Check network connectivity to the repository",
                "Re-run the release; already uploaded artifacts are skipped",
            ],
            Self::PermanentFailure { .. } => vec![
                "Check the repository credentials",
                "Check that the version has not already been released with different content",
            ],
            Self::PartialRelease { .. } => vec![
                "Inspect the release report for the failed modules",
                "Re-run the release with --modules limited to the failed modules",
            ],
            Self::Cancelled { .. } => vec!["Re-run the release for the cancelled modules"],
            Self::InvalidTransition { .. } | Self::DuplicateReportEntry { .. } => {
                vec!["This is an internal error; please report it"]
            }
            Self::Config(_) => vec!["Check the release configuration file"],
            Self::Io { .. } => vec!["Check that the path exists and is readable"],
        }
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::IncompleteModule { .. } => "INCOMPLETE_MODULE",
            Self::InvalidModule { .. } => "INVALID_MODULE",
            Self::SigningError { .. } => "SIGNING_ERROR",
            Self::TransientFailure { .. } => "TRANSIENT_FAILURE",
            Self::PermanentFailure { .. } => "PERMANENT_FAILURE",
            Self::PartialRelease { .. } => "PARTIAL_RELEASE",
            Self::Cancelled { .. } => "CANCELLED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::DuplicateReportEntry { .. } => "DUPLICATE_REPORT_ENTRY",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io { .. } => "IO_ERROR",
        }
    }
}
