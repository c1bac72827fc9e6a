//! Release data model
//!
//! Modules own their artifacts; targets are static configuration. None of
//! these types are mutated once a release run has resolved them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::error::ReleaseError;
use crate::core::hash::sha256_hex;

/// Suffix that marks a snapshot version
pub const SNAPSHOT_SUFFIX: &str = "-SNAPSHOT";

// ============================================================================
// Artifacts
// ============================================================================

/// Published file variant of a module
///
/// Variants are declared in canonical upload order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classifier {
    Primary,
    Sources,
    #[serde(alias = "javadoc")]
    Docs,
    Shaded,
}

impl Classifier {
    /// Every classifier, in canonical order
    pub const ALL: [Classifier; 4] = [
        Classifier::Primary,
        Classifier::Sources,
        Classifier::Docs,
        Classifier::Shaded,
    ];

    /// Classifier suffix used in repository file names
    ///
    /// The primary artifact carries no suffix.
    pub fn file_suffix(&self) -> Option<&'static str> {
        match self {
            Classifier::Primary => None,
            Classifier::Sources => Some("sources"),
            Classifier::Docs => Some("javadoc"),
            Classifier::Shaded => Some("all"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classifier::Primary => "primary",
            Classifier::Sources => "sources",
            Classifier::Docs => "docs",
            Classifier::Shaded => "shaded",
        }
    }
}

impl fmt::Display for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an artifact's bytes live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentHandle {
    File(PathBuf),
    Memory(Arc<Vec<u8>>),
}

impl ContentHandle {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        ContentHandle::Memory(Arc::new(bytes.into()))
    }

    /// Load the full content
    pub async fn read(&self) -> Result<Vec<u8>, ReleaseError> {
        match self {
            ContentHandle::File(path) => tokio::fs::read(path)
                .await
                .map_err(|e| ReleaseError::io(path.display(), e)),
            ContentHandle::Memory(bytes) => Ok(bytes.as_ref().clone()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ContentHandle::File(path) => path.display().to_string(),
            ContentHandle::Memory(bytes) => format!("<memory: {} bytes>", bytes.len()),
        }
    }
}

/// One assembled artifact of a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub classifier: Classifier,
    pub extension: String,
    /// Repository file name, e.g. `core-1.2.0-sources.jar`
    pub file_name: String,
    pub content: ContentHandle,
    /// Lowercase hex SHA-256 of the content
    pub content_hash: String,
    pub size: u64,
}

impl Artifact {
    /// Load the content, refusing bytes that changed since assembly
    ///
    /// Signatures and checksum sidecars are derived from `content_hash`, so a
    /// file rewritten between stages must not be signed or uploaded.
    pub async fn read_verified(&self, subject: &str) -> Result<Vec<u8>, ReleaseError> {
        let bytes = self.content.read().await?;
        let actual = sha256_hex(&bytes);
        if actual != self.content_hash {
            return Err(ReleaseError::PermanentFailure {
                target: subject.to_string(),
                message: format!(
                    "{} changed since it was assembled: sha256 {} != {}",
                    self.file_name, actual, self.content_hash
                ),
            });
        }
        Ok(bytes)
    }
}

// ============================================================================
// Modules
// ============================================================================

/// Kind of module being released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    /// Regular library: primary binary plus sources and docs
    #[default]
    Library,
    /// Platform / bill-of-materials module: primary descriptor only
    Bom,
}

/// Declared, not yet assembled, output of a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredOutput {
    pub classifier: Classifier,
    pub content: ContentHandle,
    pub extension: Option<String>,
}

/// Module as described by configuration, before assembly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub name: String,
    pub group: String,
    pub version: String,
    pub kind: ModuleKind,
    /// Default file extension for artifacts (usually `jar`)
    pub extension: String,
    /// Explicitly declared outputs
    pub outputs: Vec<DeclaredOutput>,
    /// Directory scanned for outputs that were not declared explicitly
    pub output_dir: Option<PathBuf>,
}

impl ModuleDescriptor {
    pub fn new(
        name: impl Into<String>,
        group: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            version: version.into(),
            kind: ModuleKind::Library,
            extension: "jar".to_string(),
            outputs: Vec::new(),
            output_dir: None,
        }
    }

    /// Add an in-memory output (mostly useful for tests and generated files)
    pub fn with_output(mut self, classifier: Classifier, bytes: impl Into<Vec<u8>>) -> Self {
        self.outputs.push(DeclaredOutput {
            classifier,
            content: ContentHandle::from_bytes(bytes),
            extension: None,
        });
        self
    }

    pub fn with_kind(mut self, kind: ModuleKind) -> Self {
        self.kind = kind;
        self
    }
}

/// A module resolved for release: coordinates plus its ordered artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub version: String,
    pub group: String,
    pub kind: ModuleKind,
    pub artifacts: Vec<Artifact>,
}

impl Module {
    pub fn is_snapshot(&self) -> bool {
        is_snapshot_version(&self.version)
    }

    /// `group:name:version`
    pub fn coordinates(&self) -> String {
        format!("{}:{}:{}", self.group, self.name, self.version)
    }

    /// Repository directory for this module, e.g. `io/example/core/1.0.0`
    pub fn repository_dir(&self) -> String {
        format!(
            "{}/{}/{}",
            self.group.replace('.', "/"),
            self.name,
            self.version
        )
    }

    /// Repository path of one of this module's files
    pub fn repository_path(&self, file_name: &str) -> String {
        format!("{}/{}", self.repository_dir(), file_name)
    }
}

pub fn is_snapshot_version(version: &str) -> bool {
    version.ends_with(SNAPSHOT_SUFFIX)
}

// ============================================================================
// Signing
// ============================================================================

/// Outcome of the signing stage for one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningResult {
    /// File name of the signed artifact
    pub artifact: String,
    /// Detached signature; `None` when signing was skipped
    pub signature: Option<Vec<u8>>,
}

impl SigningResult {
    pub fn skipped(artifact: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            signature: None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.signature.is_none()
    }
}

// ============================================================================
// Targets
// ============================================================================

/// Transport used to reach a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    #[default]
    Http,
    File,
}

/// Which versions a target accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Acceptance {
    Releases,
    Snapshots,
    #[default]
    All,
}

impl Acceptance {
    pub fn accepts(&self, version: &str) -> bool {
        match self {
            Acceptance::All => true,
            Acceptance::Releases => !is_snapshot_version(version),
            Acceptance::Snapshots => is_snapshot_version(version),
        }
    }
}

/// A remote repository artifacts are released to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishTarget {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub kind: TargetKind,
    /// Credential reference for the secret (password or token)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// Credential reference for the user name; enables basic auth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub accepts: Acceptance,
    /// Refuse groups that contain unsigned artifacts
    #[serde(default)]
    pub require_signatures: bool,
}

impl PublishTarget {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            kind: TargetKind::Http,
            credential: None,
            username: None,
            accepts: Acceptance::All,
            require_signatures: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(version: &str) -> Module {
        Module {
            name: "core".to_string(),
            version: version.to_string(),
            group: "io.example.tools".to_string(),
            kind: ModuleKind::Library,
            artifacts: Vec::new(),
        }
    }

    #[test]
    fn test_repository_path_uses_maven_layout() {
        let module = module("1.2.0");
        assert_eq!(module.repository_dir(), "io/example/tools/core/1.2.0");
        assert_eq!(
            module.repository_path("core-1.2.0.jar"),
            "io/example/tools/core/1.2.0/core-1.2.0.jar"
        );
        assert_eq!(module.coordinates(), "io.example.tools:core:1.2.0");
    }

    #[test]
    fn test_snapshot_detection() {
        assert!(module("1.3.0-SNAPSHOT").is_snapshot());
        assert!(!module("1.3.0").is_snapshot());
        assert!(!module("1.3.0-RC1").is_snapshot());
    }

    #[test]
    fn test_acceptance() {
        assert!(Acceptance::All.accepts("1.0.0"));
        assert!(Acceptance::All.accepts("1.0.0-SNAPSHOT"));
        assert!(Acceptance::Releases.accepts("1.0.0"));
        assert!(!Acceptance::Releases.accepts("1.0.0-SNAPSHOT"));
        assert!(Acceptance::Snapshots.accepts("1.0.0-SNAPSHOT"));
        assert!(!Acceptance::Snapshots.accepts("1.0.0"));
    }

    #[test]
    fn test_classifier_serde_accepts_javadoc_alias() {
        let docs: Classifier = serde_yaml::from_str("javadoc").unwrap();
        assert_eq!(docs, Classifier::Docs);
        assert_eq!(serde_yaml::to_string(&Classifier::Docs).unwrap().trim(), "docs");
        assert_eq!(Classifier::Docs.file_suffix(), Some("javadoc"));
        assert_eq!(Classifier::Primary.file_suffix(), None);
    }

    #[test]
    fn test_target_defaults_from_yaml() {
        let target: PublishTarget = serde_yaml::from_str(
            "name: central\nendpoint: https://repo.example.com/releases\n",
        )
        .unwrap();

        assert_eq!(target.kind, TargetKind::Http);
        assert_eq!(target.accepts, Acceptance::All);
        assert!(!target.require_signatures);
        assert!(target.credential.is_none());
    }

    #[tokio::test]
    async fn test_memory_content_handle_reads_back() {
        let handle = ContentHandle::from_bytes(b"jar bytes".to_vec());
        assert_eq!(handle.read().await.unwrap(), b"jar bytes");
        assert_eq!(handle.describe(), "<memory: 9 bytes>");
    }

    #[tokio::test]
    async fn test_read_verified_rejects_rewritten_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("core-1.0.jar");
        std::fs::write(&path, b"original").unwrap();

        let artifact = Artifact {
            classifier: Classifier::Primary,
            extension: "jar".to_string(),
            file_name: "core-1.0.jar".to_string(),
            content: ContentHandle::File(path.clone()),
            content_hash: sha256_hex(b"original"),
            size: 8,
        };
        assert_eq!(artifact.read_verified("central").await.unwrap(), b"original");

        std::fs::write(&path, b"rebuilt").unwrap();
        let err = artifact.read_verified("central").await.unwrap_err();
        assert_eq!(err.code(), "PERMANENT_FAILURE");
        assert_eq!(err.subject(), "central");
        assert!(err.to_string().contains("changed since it was assembled"));
    }

    #[test]
    fn test_signing_result_skipped() {
        let result = SigningResult::skipped("core-1.0.jar");
        assert!(result.is_skipped());
        assert_eq!(result.artifact, "core-1.0.jar");
    }
}
