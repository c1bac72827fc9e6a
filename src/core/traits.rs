//! Core traits for the external collaborators of a release
//!
//! This module defines the seams between the orchestrator and the outside
//! world: credential lookup, artifact transport and signing backends.
//! Concrete implementations are selected from configuration by
//! [`crate::plugins::PluginLoader`].

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::error::ReleaseError;

// ============================================================================
// Credentials
// ============================================================================

/// Resolves credential references to secrets
pub trait CredentialProvider: Send + Sync {
    /// Look up a secret by reference name
    fn get(&self, name: &str) -> Option<SecretString>;
}

/// Resolved credential for one target
#[derive(Clone)]
pub struct Credential {
    pub username: Option<String>,
    pub secret: SecretString,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"****")
            .finish()
    }
}

// ============================================================================
// Transport
// ============================================================================

/// A single file upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Repository-relative path, e.g. `io/example/core/1.0/core-1.0.jar`
    pub path: String,
    pub bytes: Vec<u8>,
}

/// Transport-level classification of an upload attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum UploadOutcome {
    Accepted,
    /// Non-retryable rejection (auth, validation, conflict)
    Rejected(String),
    /// Retryable failure (timeout, connection reset, 5xx)
    TransientFailure(String),
}

impl UploadOutcome {
    /// Convert into the release error taxonomy
    pub fn into_result(self, target: &str) -> Result<(), ReleaseError> {
        match self {
            UploadOutcome::Accepted => Ok(()),
            UploadOutcome::Rejected(message) => Err(ReleaseError::PermanentFailure {
                target: target.to_string(),
                message,
            }),
            UploadOutcome::TransientFailure(message) => Err(ReleaseError::TransientFailure {
                target: target.to_string(),
                message,
            }),
        }
    }
}

/// Moves bytes to a repository endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name (e.g., "http", "file")
    fn name(&self) -> &str;

    /// Upload one payload
    async fn upload(
        &self,
        endpoint: &str,
        payload: &Payload,
        credential: Option<&Credential>,
    ) -> UploadOutcome;

    /// Fetch the published SHA-256 of a repository path, if any
    ///
    /// Default implementation reports nothing published, which disables the
    /// remote idempotence check and post-upload verification for the transport.
    async fn remote_checksum(
        &self,
        _endpoint: &str,
        _path: &str,
        _credential: Option<&Credential>,
    ) -> Result<Option<String>, ReleaseError> {
        Ok(None)
    }

    /// Whether a repository path is already published
    ///
    /// Default implementation answers `false`, so callers upload again.
    async fn exists(
        &self,
        _endpoint: &str,
        _path: &str,
        _credential: Option<&Credential>,
    ) -> Result<bool, ReleaseError> {
        Ok(false)
    }
}

// ============================================================================
// Signing
// ============================================================================

/// Key material reference used by a signing backend
#[derive(Clone)]
pub struct SigningKey {
    pub key_id: String,
    pub passphrase: Option<SecretString>,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "****"))
            .finish()
    }
}

/// Produces detached signatures
#[async_trait]
pub trait SigningBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Sign a payload, returning the detached signature bytes
    async fn sign(&self, payload: &[u8], key: &SigningKey) -> Result<Vec<u8>, ReleaseError>;
}
