//! Signer - resolves a signing result for every artifact
//!
//! Without a key every artifact is marked skipped. That is logged, not an
//! error; targets that insist on signatures reject the group later.

use std::sync::Arc;

use crate::core::error::ReleaseError;
use crate::core::model::{Artifact, Module, SigningResult};
use crate::core::traits::{SigningBackend, SigningKey};

#[derive(Clone, Default)]
pub struct Signer {
    backend: Option<Arc<dyn SigningBackend>>,
    key: Option<SigningKey>,
}

impl Signer {
    pub fn new(backend: Option<Arc<dyn SigningBackend>>, key: Option<SigningKey>) -> Self {
        Self { backend, key }
    }

    /// Signer that skips every artifact
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Sign one artifact with the given key
    ///
    /// `SigningError`s carry the artifact's file name and are never retried.
    pub async fn sign(
        &self,
        artifact: &Artifact,
        key: Option<&SigningKey>,
    ) -> Result<SigningResult, ReleaseError> {
        let Some(key) = key else {
            tracing::debug!(artifact = %artifact.file_name, "signing skipped");
            return Ok(SigningResult::skipped(&artifact.file_name));
        };

        let backend = self.backend.as_ref().ok_or_else(|| ReleaseError::SigningError {
            artifact: artifact.file_name.clone(),
            message: "no signing backend configured".to_string(),
        })?;

        let payload = artifact.read_verified(&artifact.file_name).await?;
        let signature = backend.sign(&payload, key).await.map_err(|e| match e {
            ReleaseError::SigningError { message, .. } => ReleaseError::SigningError {
                artifact: artifact.file_name.clone(),
                message,
            },
            other => other,
        })?;

        tracing::debug!(artifact = %artifact.file_name, backend = backend.name(), "signed");
        Ok(SigningResult {
            artifact: artifact.file_name.clone(),
            signature: Some(signature),
        })
    }

    /// Resolve signing results for all of a module's artifacts, in order
    ///
    /// Stops at the first artifact that fails to sign.
    pub async fn sign_module(&self, module: &Module) -> Result<Vec<SigningResult>, ReleaseError> {
        if self.key.is_none() {
            tracing::info!(module = %module.name, "no signing key configured, signatures skipped");
        }

        let mut results = Vec::with_capacity(module.artifacts.len());
        for artifact in &module.artifacts {
            results.push(self.sign(artifact, self.key.as_ref()).await?);
        }
        Ok(results)
    }
}
