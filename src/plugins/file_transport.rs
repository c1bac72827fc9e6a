//! File Transport - publishes into a local Maven-layout directory
//!
//! Useful for staging a release on disk or for a shared-filesystem repository.
//! The endpoint is a directory path, optionally prefixed with `file://`.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::core::error::ReleaseError;
use crate::core::hash::parse_checksum_sidecar;
use crate::core::traits::{Credential, Payload, Transport, UploadOutcome};

#[derive(Debug, Clone, Default)]
pub struct FileTransport;

impl FileTransport {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a repository path below the endpoint directory
    ///
    /// Paths that would escape the repository root are refused.
    pub fn resolve(endpoint: &str, path: &str) -> Option<PathBuf> {
        let root = Path::new(endpoint.strip_prefix("file://").unwrap_or(endpoint));
        let relative = Path::new(path.trim_start_matches('/'));

        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }

        Some(root.join(relative))
    }
}

#[async_trait]
impl Transport for FileTransport {
    fn name(&self) -> &str {
        "file"
    }

    async fn upload(
        &self,
        endpoint: &str,
        payload: &Payload,
        _credential: Option<&Credential>,
    ) -> UploadOutcome {
        let Some(destination) = Self::resolve(endpoint, &payload.path) else {
            return UploadOutcome::Rejected(format!("invalid repository path: {}", payload.path));
        };

        let write = async {
            if let Some(parent) = destination.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&destination, &payload.bytes).await
        };

        match write.await {
            Ok(()) => {
                tracing::debug!(path = %destination.display(), "written");
                UploadOutcome::Accepted
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::PermissionDenied | ErrorKind::NotFound | ErrorKind::InvalidInput
                ) =>
            {
                UploadOutcome::Rejected(format!("{}: {}", destination.display(), e))
            }
            Err(e) => UploadOutcome::TransientFailure(format!("{}: {}", destination.display(), e)),
        }
    }

    async fn remote_checksum(
        &self,
        endpoint: &str,
        path: &str,
        _credential: Option<&Credential>,
    ) -> Result<Option<String>, ReleaseError> {
        let Some(file) = Self::resolve(endpoint, &format!("{}.sha256", path)) else {
            return Ok(None);
        };

        match tokio::fs::read_to_string(&file).await {
            Ok(content) => Ok(parse_checksum_sidecar(&content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ReleaseError::io(file.display(), e)),
        }
    }

    async fn exists(
        &self,
        endpoint: &str,
        path: &str,
        _credential: Option<&Credential>,
    ) -> Result<bool, ReleaseError> {
        let Some(file) = Self::resolve(endpoint, path) else {
            return Ok(false);
        };
        tokio::fs::try_exists(&file)
            .await
            .map_err(|e| ReleaseError::io(file.display(), e))
    }
}
