//! Repository Publisher - uploads a module's artifact group to one target
//!
//! Artifacts are uploaded one after the other. For each artifact the group
//! contains the payload, its `.asc` signature when signed, and a `.sha256`
//! checksum sidecar. The sidecar goes last so that a remote checksum marks a
//! completely uploaded artifact.
//!
//! Re-publishing identical content is a no-op: an in-process ledger
//! remembers what was uploaded during this run, and the remote sidecar is
//! checked before any upload. A signed artifact only counts as published when
//! its `.asc` is present too; otherwise the signature alone is uploaded.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::core::error::ReleaseError;
use crate::core::model::{Artifact, Module, PublishTarget, SigningResult};
use crate::core::retry::{RetryManager, RetryOptions};
use crate::core::traits::{Credential, Payload, Transport};

/// Publishing behaviour shared by every target
#[derive(Debug, Clone, PartialEq)]
pub struct PublishOptions {
    /// Run everything up to the network write
    pub dry_run: bool,
    /// Compare the remote checksum with the local hash after upload
    pub verify: bool,
    pub retry: RetryOptions,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            verify: true,
            retry: RetryOptions::default(),
        }
    }
}

/// Result of publishing one module to one target
#[derive(Debug)]
pub struct PublishOutcome {
    pub target: String,
    /// Retries spent across all uploads and remote lookups
    pub retries: u32,
    /// Artifacts uploaded (or, in a dry run, that would have been)
    pub uploaded: usize,
    /// Artifacts skipped because identical content was already published
    pub already_present: usize,
    /// First failure; the whole group counts as failed
    pub failure: Option<ReleaseError>,
}

impl PublishOutcome {
    fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            retries: 0,
            uploaded: 0,
            already_present: 0,
            failure: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Uploads remembered during this process, keyed by (target, path)
#[derive(Debug, Clone, Default)]
pub struct UploadLedger {
    entries: Arc<Mutex<HashMap<(String, String), String>>>,
}

impl UploadLedger {
    pub async fn contains(&self, target: &str, path: &str, hash: &str) -> bool {
        self.entries
            .lock()
            .await
            .get(&(target.to_string(), path.to_string()))
            .is_some_and(|recorded| recorded == hash)
    }

    pub async fn record(&self, target: &str, path: &str, hash: &str) {
        self.entries
            .lock()
            .await
            .insert((target.to_string(), path.to_string()), hash.to_string());
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Publishes artifact groups with retry and idempotence
#[derive(Debug, Clone)]
pub struct RepositoryPublisher {
    options: PublishOptions,
    retry: RetryManager,
    ledger: UploadLedger,
}

impl RepositoryPublisher {
    pub fn new(options: PublishOptions) -> Self {
        Self {
            retry: RetryManager::new(options.retry.clone()),
            options,
            ledger: UploadLedger::default(),
        }
    }

    pub fn options(&self) -> &PublishOptions {
        &self.options
    }

    pub fn ledger(&self) -> &UploadLedger {
        &self.ledger
    }

    /// Publish a module's signed artifacts to a target
    ///
    /// Never returns early with an error: failures are recorded in the
    /// outcome together with the retries spent before them.
    pub async fn publish(
        &self,
        module: &Module,
        group: &[(Artifact, SigningResult)],
        target: &PublishTarget,
        transport: &dyn Transport,
        credential: Option<&Credential>,
    ) -> PublishOutcome {
        let mut outcome = PublishOutcome::new(&target.name);

        if target.require_signatures {
            let unsigned: Vec<&str> = group
                .iter()
                .filter(|(_, signing)| signing.is_skipped())
                .map(|(artifact, _)| artifact.file_name.as_str())
                .collect();
            if !unsigned.is_empty() {
                outcome.failure = Some(ReleaseError::PermanentFailure {
                    target: target.name.clone(),
                    message: format!("signatures required, unsigned: {}", unsigned.join(", ")),
                });
                return outcome;
            }
        }

        for (artifact, signing) in group {
            if let Err(e) = self
                .publish_artifact(module, artifact, signing, target, transport, credential, &mut outcome)
                .await
            {
                tracing::error!(
                    module = %module.name,
                    target = %target.name,
                    artifact = %artifact.file_name,
                    "publish failed: {}",
                    e
                );
                outcome.failure = Some(e);
                break;
            }
        }

        outcome
    }

    #[allow(clippy::too_many_arguments)]
    async fn publish_artifact(
        &self,
        module: &Module,
        artifact: &Artifact,
        signing: &SigningResult,
        target: &PublishTarget,
        transport: &dyn Transport,
        credential: Option<&Credential>,
        outcome: &mut PublishOutcome,
    ) -> Result<(), ReleaseError> {
        let path = module.repository_path(&artifact.file_name);
        let signature_path = format!("{}.asc", path);

        if self.ledger.contains(&target.name, &path, &artifact.content_hash).await {
            tracing::debug!(target = %target.name, %path, "already uploaded in this run");
            outcome.already_present += 1;
            return Ok(());
        }

        if !self.options.dry_run {
            match self.remote_hash(target, transport, &path, credential, outcome).await? {
                Some(remote) if remote == artifact.content_hash => {
                    let missing_signature = match &signing.signature {
                        Some(signature) => (!self
                            .remote_exists(target, transport, &signature_path, credential, outcome)
                            .await?)
                            .then_some(signature),
                        None => None,
                    };

                    match missing_signature {
                        None => {
                            tracing::info!(target = %target.name, %path, "identical artifact already published");
                            outcome.already_present += 1;
                        }
                        Some(signature) => {
                            tracing::info!(
                                target = %target.name,
                                %path,
                                "identical artifact published without signature, uploading signature"
                            );
                            let payload = Payload {
                                path: signature_path,
                                bytes: signature.clone(),
                            };
                            self.upload(target, transport, &payload, credential, outcome).await?;
                            outcome.uploaded += 1;
                        }
                    }
                    self.ledger.record(&target.name, &path, &artifact.content_hash).await;
                    return Ok(());
                }
                Some(_) => {
                    tracing::warn!(target = %target.name, %path, "different content already published, overwriting");
                }
                None => {}
            }
        }

        let bytes = artifact.read_verified(&target.name).await?;
        let mut payloads = vec![Payload {
            path: path.clone(),
            bytes,
        }];
        if let Some(signature) = &signing.signature {
            payloads.push(Payload {
                path: signature_path,
                bytes: signature.clone(),
            });
        }
        payloads.push(Payload {
            path: format!("{}.sha256", path),
            bytes: artifact.content_hash.as_bytes().to_vec(),
        });

        for payload in &payloads {
            if self.options.dry_run {
                tracing::info!(
                    target = %target.name,
                    path = %payload.path,
                    bytes = payload.bytes.len(),
                    "dry run: skipping upload"
                );
                continue;
            }
            self.upload(target, transport, payload, credential, outcome).await?;
        }

        if self.options.verify && !self.options.dry_run {
            match self.remote_hash(target, transport, &path, credential, outcome).await? {
                Some(remote) if remote != artifact.content_hash => {
                    return Err(ReleaseError::PermanentFailure {
                        target: target.name.clone(),
                        message: format!(
                            "verification failed for {}: remote sha256 {} != local {}",
                            artifact.file_name, remote, artifact.content_hash
                        ),
                    });
                }
                Some(_) => tracing::debug!(target = %target.name, %path, "verified"),
                None => tracing::warn!(
                    target = %target.name,
                    %path,
                    "no remote checksum available, upload not verified"
                ),
            }
        }

        if !self.options.dry_run {
            self.ledger.record(&target.name, &path, &artifact.content_hash).await;
        }
        outcome.uploaded += 1;
        Ok(())
    }

    /// Upload one payload, retrying transient failures
    async fn upload(
        &self,
        target: &PublishTarget,
        transport: &dyn Transport,
        payload: &Payload,
        credential: Option<&Credential>,
        outcome: &mut PublishOutcome,
    ) -> Result<(), ReleaseError> {
        let attempted = self
            .retry
            .retry(move || async move {
                transport
                    .upload(&target.endpoint, payload, credential)
                    .await
                    .into_result(&target.name)
            })
            .await;
        outcome.retries += attempted.retries;
        attempted.result?;
        tracing::debug!(target = %target.name, path = %payload.path, "uploaded");
        Ok(())
    }

    /// Remote checksum of a path, retrying transient failures
    ///
    /// A repository that refuses the lookup (deploy-only endpoints often
    /// answer 403 or 405 to reads) leaves the checksum unknown.
    async fn remote_hash(
        &self,
        target: &PublishTarget,
        transport: &dyn Transport,
        path: &str,
        credential: Option<&Credential>,
        outcome: &mut PublishOutcome,
    ) -> Result<Option<String>, ReleaseError> {
        let attempted = self
            .retry
            .retry(move || async move {
                transport
                    .remote_checksum(&target.endpoint, path, credential)
                    .await
                    .map_err(|e| e.for_target(&target.name))
            })
            .await;
        outcome.retries += attempted.retries;

        match attempted.result {
            Err(e) if !e.is_transient() => {
                tracing::warn!(target = %target.name, %path, "remote checksum unavailable: {}", e);
                Ok(None)
            }
            result => result,
        }
    }

    /// Whether a path is already published, `false` when the lookup is refused
    async fn remote_exists(
        &self,
        target: &PublishTarget,
        transport: &dyn Transport,
        path: &str,
        credential: Option<&Credential>,
        outcome: &mut PublishOutcome,
    ) -> Result<bool, ReleaseError> {
        let attempted = self
            .retry
            .retry(move || async move {
                transport
                    .exists(&target.endpoint, path, credential)
                    .await
                    .map_err(|e| e.for_target(&target.name))
            })
            .await;
        outcome.retries += attempted.retries;

        match attempted.result {
            Err(e) if !e.is_transient() => {
                tracing::warn!(target = %target.name, %path, "existence check unavailable: {}", e);
                Ok(false)
            }
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash::sha256_hex;
    use crate::core::model::{Classifier, ContentHandle, ModuleKind};
    use crate::core::traits::UploadOutcome;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// In-memory repository with scripted failures
    #[derive(Default)]
    struct MemoryRepo {
        files: Mutex<HashMap<String, Vec<u8>>>,
        script: Mutex<VecDeque<UploadOutcome>>,
        uploads: Mutex<Vec<String>>,
        corrupt_checksums: bool,
        /// Checksum lookups fail with this error instead of reading files
        lookup_failure: Option<fn() -> ReleaseError>,
    }

    impl MemoryRepo {
        async fn uploads(&self) -> Vec<String> {
            self.uploads.lock().await.clone()
        }
    }

    #[async_trait]
    impl Transport for MemoryRepo {
        fn name(&self) -> &str {
            "memory"
        }

        async fn upload(
            &self,
            _endpoint: &str,
            payload: &Payload,
            _credential: Option<&Credential>,
        ) -> UploadOutcome {
            self.uploads.lock().await.push(payload.path.clone());
            if let Some(scripted) = self.script.lock().await.pop_front() {
                if scripted != UploadOutcome::Accepted {
                    return scripted;
                }
            }
            self.files
                .lock()
                .await
                .insert(payload.path.clone(), payload.bytes.clone());
            UploadOutcome::Accepted
        }

        async fn remote_checksum(
            &self,
            _endpoint: &str,
            path: &str,
            _credential: Option<&Credential>,
        ) -> Result<Option<String>, ReleaseError> {
            if let Some(failure) = self.lookup_failure {
                return Err(failure());
            }
            if self.corrupt_checksums {
                return Ok(Some("0000".to_string()));
            }
            Ok(self
                .files
                .lock()
                .await
                .get(&format!("{}.sha256", path))
                .map(|bytes| String::from_utf8_lossy(bytes).to_string()))
        }

        async fn exists(
            &self,
            _endpoint: &str,
            path: &str,
            _credential: Option<&Credential>,
        ) -> Result<bool, ReleaseError> {
            Ok(self.files.lock().await.contains_key(path))
        }
    }

    fn module() -> (Module, Vec<(Artifact, SigningResult)>) {
        let artifact = |classifier: Classifier, name: &str, bytes: &[u8]| Artifact {
            classifier,
            extension: "jar".to_string(),
            file_name: name.to_string(),
            content: ContentHandle::from_bytes(bytes.to_vec()),
            content_hash: sha256_hex(bytes),
            size: bytes.len() as u64,
        };
        let artifacts = vec![
            artifact(Classifier::Primary, "core-1.0.0.jar", b"bin"),
            artifact(Classifier::Sources, "core-1.0.0-sources.jar", b"src"),
        ];
        let group = artifacts
            .iter()
            .map(|a| (a.clone(), SigningResult::skipped(&a.file_name)))
            .collect();
        let module = Module {
            name: "core".to_string(),
            version: "1.0.0".to_string(),
            group: "io.example".to_string(),
            kind: ModuleKind::Library,
            artifacts,
        };
        (module, group)
    }

    fn fast_options() -> PublishOptions {
        PublishOptions {
            retry: RetryOptions {
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                ..RetryOptions::default()
            },
            ..PublishOptions::default()
        }
    }

    fn target() -> PublishTarget {
        PublishTarget::new("central", "https://repo.example.com")
    }

    #[tokio::test]
    async fn test_publish_uploads_payload_and_checksum() {
        let repo = MemoryRepo::default();
        let (module, group) = module();
        let publisher = RepositoryPublisher::new(fast_options());

        let outcome = publisher.publish(&module, &group, &target(), &repo, None).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.uploaded, 2);
        assert_eq!(
            repo.uploads().await,
            vec![
                "io/example/core/1.0.0/core-1.0.0.jar",
                "io/example/core/1.0.0/core-1.0.0.jar.sha256",
                "io/example/core/1.0.0/core-1.0.0-sources.jar",
                "io/example/core/1.0.0/core-1.0.0-sources.jar.sha256",
            ]
        );
    }

    #[tokio::test]
    async fn test_signature_uploaded_between_payload_and_checksum() {
        let repo = MemoryRepo::default();
        let (module, mut group) = module();
        group.truncate(1);
        group[0].1.signature = Some(b"-----BEGIN PGP SIGNATURE-----".to_vec());

        let outcome = RepositoryPublisher::new(fast_options())
            .publish(&module, &group, &target(), &repo, None)
            .await;

        assert!(outcome.is_success());
        let uploads = repo.uploads().await;
        assert!(uploads[1].ends_with("core-1.0.0.jar.asc"));
        assert!(uploads[2].ends_with("core-1.0.0.jar.sha256"));
    }

    #[tokio::test]
    async fn test_republish_is_a_no_op() {
        let repo = MemoryRepo::default();
        let (module, group) = module();
        let publisher = RepositoryPublisher::new(fast_options());

        publisher.publish(&module, &group, &target(), &repo, None).await;
        let writes = repo.uploads().await.len();

        let outcome = publisher.publish(&module, &group, &target(), &repo, None).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.already_present, 2);
        assert_eq!(outcome.uploaded, 0);
        assert_eq!(repo.uploads().await.len(), writes);
    }

    #[tokio::test]
    async fn test_remote_checksum_skips_identical_content_from_earlier_run() {
        let repo = MemoryRepo::default();
        let (module, group) = module();

        RepositoryPublisher::new(fast_options())
            .publish(&module, &group, &target(), &repo, None)
            .await;
        let writes = repo.uploads().await.len();

        // fresh publisher, empty ledger
        let outcome = RepositoryPublisher::new(fast_options())
            .publish(&module, &group, &target(), &repo, None)
            .await;
        assert_eq!(outcome.already_present, 2);
        assert_eq!(repo.uploads().await.len(), writes);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let repo = MemoryRepo::default();
        repo.script.lock().await.extend([
            UploadOutcome::TransientFailure("timeout".to_string()),
            UploadOutcome::TransientFailure("connection reset".to_string()),
        ]);
        let (module, group) = module();

        let outcome = RepositoryPublisher::new(fast_options())
            .publish(&module, &group[..1], &target(), &repo, None)
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.retries, 2);
        assert_eq!(outcome.uploaded, 1);
    }

    #[tokio::test]
    async fn test_permanent_failure_fails_group_immediately() {
        let repo = MemoryRepo::default();
        repo.script
            .lock()
            .await
            .push_back(UploadOutcome::Rejected("HTTP 401".to_string()));
        let (module, group) = module();

        let outcome = RepositoryPublisher::new(fast_options())
            .publish(&module, &group, &target(), &repo, None)
            .await;

        assert_eq!(outcome.failure.as_ref().unwrap().code(), "PERMANENT_FAILURE");
        assert_eq!(outcome.retries, 0);
        assert_eq!(repo.uploads().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_after_partial_upload_fails_group() {
        let repo = MemoryRepo::default();
        repo.script.lock().await.extend([
            UploadOutcome::Accepted,
            UploadOutcome::Accepted,
            UploadOutcome::Rejected("HTTP 400".to_string()),
        ]);
        let (module, group) = module();

        let outcome = RepositoryPublisher::new(fast_options())
            .publish(&module, &group, &target(), &repo, None)
            .await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.uploaded, 1);
    }

    #[tokio::test]
    async fn test_required_signatures_reject_unsigned_group() {
        let repo = MemoryRepo::default();
        let (module, group) = module();
        let mut target = target();
        target.require_signatures = true;

        let outcome = RepositoryPublisher::new(fast_options())
            .publish(&module, &group, &target, &repo, None)
            .await;

        let err = outcome.failure.unwrap();
        assert!(err.to_string().contains("signatures required"));
        assert!(repo.uploads().await.is_empty());
    }

    #[tokio::test]
    async fn test_verification_mismatch_fails() {
        let repo = MemoryRepo {
            corrupt_checksums: true,
            ..MemoryRepo::default()
        };
        let (module, group) = module();

        let outcome = RepositoryPublisher::new(fast_options())
            .publish(&module, &group[..1], &target(), &repo, None)
            .await;

        assert!(outcome.failure.unwrap().to_string().contains("verification failed"));
    }

    #[tokio::test]
    async fn test_dry_run_never_contacts_transport() {
        let repo = MemoryRepo::default();
        let (module, group) = module();
        let publisher = RepositoryPublisher::new(PublishOptions {
            dry_run: true,
            ..fast_options()
        });

        let outcome = publisher.publish(&module, &group, &target(), &repo, None).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.uploaded, 2);
        assert!(repo.uploads().await.is_empty());
        assert_eq!(publisher.ledger().len().await, 0);
    }

    #[tokio::test]
    async fn test_signed_republish_adds_missing_signature() {
        let repo = MemoryRepo::default();
        let (module, mut group) = module();
        group.truncate(1);

        RepositoryPublisher::new(fast_options())
            .publish(&module, &group, &target(), &repo, None)
            .await;
        let writes = repo.uploads().await.len();

        group[0].1.signature = Some(b"-----BEGIN PGP SIGNATURE-----".to_vec());
        let mut strict = target();
        strict.require_signatures = true;
        let outcome = RepositoryPublisher::new(fast_options())
            .publish(&module, &group, &strict, &repo, None)
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.uploaded, 1);
        assert_eq!(outcome.already_present, 0);
        let uploads = repo.uploads().await;
        assert_eq!(uploads[writes..], ["io/example/core/1.0.0/core-1.0.0.jar.asc".to_string()]);
    }

    #[tokio::test]
    async fn test_signed_republish_with_signature_present_is_a_no_op() {
        let repo = MemoryRepo::default();
        let (module, mut group) = module();
        group.truncate(1);
        group[0].1.signature = Some(b"sig".to_vec());

        RepositoryPublisher::new(fast_options())
            .publish(&module, &group, &target(), &repo, None)
            .await;
        let writes = repo.uploads().await.len();

        let outcome = RepositoryPublisher::new(fast_options())
            .publish(&module, &group, &target(), &repo, None)
            .await;
        assert_eq!(outcome.already_present, 1);
        assert_eq!(repo.uploads().await.len(), writes);
    }

    #[tokio::test]
    async fn test_content_changed_since_assembly_is_not_uploaded() {
        let repo = MemoryRepo::default();
        let (module, mut group) = module();
        group.truncate(1);
        group[0].0.content = ContentHandle::from_bytes(b"rebuilt".to_vec());

        let outcome = RepositoryPublisher::new(fast_options())
            .publish(&module, &group, &target(), &repo, None)
            .await;

        let err = outcome.failure.unwrap();
        assert_eq!(err.code(), "PERMANENT_FAILURE");
        assert!(err.to_string().contains("changed since it was assembled"));
        assert!(repo.uploads().await.is_empty());
    }

    #[tokio::test]
    async fn test_refused_checksum_lookup_still_uploads() {
        let repo = MemoryRepo {
            lookup_failure: Some(|| ReleaseError::PermanentFailure {
                target: "https://repo.example.com".to_string(),
                message: "HTTP 405 Method Not Allowed".to_string(),
            }),
            ..MemoryRepo::default()
        };
        let (module, group) = module();

        let outcome = RepositoryPublisher::new(fast_options())
            .publish(&module, &group[..1], &target(), &repo, None)
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.uploaded, 1);
        assert_eq!(repo.uploads().await.len(), 2);
    }

    #[tokio::test]
    async fn test_checksum_lookup_errors_name_the_target() {
        let repo = MemoryRepo {
            lookup_failure: Some(|| ReleaseError::TransientFailure {
                target: "https://repo.example.com".to_string(),
                message: "connection reset".to_string(),
            }),
            ..MemoryRepo::default()
        };
        let (module, group) = module();

        let outcome = RepositoryPublisher::new(fast_options())
            .publish(&module, &group[..1], &target(), &repo, None)
            .await;

        let err = outcome.failure.unwrap();
        assert!(err.is_transient());
        assert_eq!(err.subject(), "central");
        assert_eq!(outcome.retries, 2);
        assert!(repo.uploads().await.is_empty());
    }
}
