//! Configuration structures and types for artifact-publisher
//!
//! This module provides type-safe configuration management with serde support.
//! The configuration is loaded once per run and passed explicitly through
//! the coordinator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::core::error::ReleaseError;
use crate::core::model::{
    Classifier, ContentHandle, DeclaredOutput, ModuleDescriptor, ModuleKind, PublishTarget,
};
use crate::core::retry::RetryOptions;

/// Root configuration object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReleaseConfig {
    /// Schema version (required)
    pub version: String,

    /// Coordinates shared by all modules unless overridden
    #[serde(default)]
    pub defaults: ModuleDefaults,

    /// Modules to release
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,

    /// Repositories to release to
    #[serde(default)]
    pub targets: Vec<PublishTarget>,

    /// Signing settings (optional; absent key means signing is skipped)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing: Option<SigningConfig>,

    /// Credential reference definitions
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub credentials: HashMap<String, CredentialSource>,

    /// Run options
    #[serde(default)]
    pub release: ReleaseOptionsConfig,
}

/// Coordinates shared by all modules
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModuleDefaults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Artifact file extension (default: "jar")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

/// One module to release
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleConfig {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default)]
    pub kind: ModuleKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,

    /// Directory scanned for `{name}-{version}[-{classifier}].{ext}` files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// Explicitly declared artifact files
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactConfig>,
}

/// Explicitly declared artifact file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactConfig {
    pub classifier: Classifier,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

/// Signing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SigningConfig {
    /// Key id; signing is skipped when absent or empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,

    /// Credential reference for the key passphrase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,

    /// External signing command (default: gpg)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<SigningCommandConfig>,

    /// Timeout per signature in seconds (default: 60)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl SigningConfig {
    /// Non-empty key id, if signing is enabled
    pub fn effective_key_id(&self) -> Option<&str> {
        self.key_id
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// External signing command
///
/// `{key_id}` in an argument is replaced by the configured key id and
/// `{input}` by the path of the file to sign. With `{input}` the passphrase,
/// if any, is written to the program's stdin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SigningCommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Where a credential reference takes its value from
///
/// A literal `value` wins over `env`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CredentialSource {
    /// Environment variable name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,

    /// Literal value (usually produced by `${VAR}` expansion)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl CredentialSource {
    pub fn env(var: impl Into<String>) -> Self {
        Self {
            env: Some(var.into()),
            value: None,
        }
    }

    pub fn value(value: impl Into<String>) -> Self {
        Self {
            env: None,
            value: Some(value.into()),
        }
    }
}

/// Run options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReleaseOptionsConfig {
    /// Worker pool size; `None` means available parallelism, 1 means sequential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<usize>,

    /// Run every step except the network write
    #[serde(default)]
    pub dry_run: bool,

    /// Compare remote checksums after upload (default: true)
    #[serde(default = "default_verify")]
    pub verify: bool,

    #[serde(default)]
    pub retry: RetryOptions,
}

fn default_verify() -> bool {
    true
}

impl Default for ReleaseOptionsConfig {
    fn default() -> Self {
        Self {
            parallel: None,
            dry_run: false,
            verify: true,
            retry: RetryOptions::default(),
        }
    }
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            defaults: ModuleDefaults::default(),
            modules: Vec::new(),
            targets: Vec::new(),
            signing: None,
            credentials: HashMap::new(),
            release: ReleaseOptionsConfig::default(),
        }
    }
}

impl ReleaseConfig {
    /// Resolve module configs into descriptors
    ///
    /// Relative paths are resolved against `base_dir` (normally the directory
    /// holding the configuration file).
    pub fn module_descriptors(&self, base_dir: &Path) -> Result<Vec<ModuleDescriptor>, ReleaseError> {
        self.modules
            .iter()
            .map(|module| self.module_descriptor(module, base_dir))
            .collect()
    }

    fn module_descriptor(
        &self,
        module: &ModuleConfig,
        base_dir: &Path,
    ) -> Result<ModuleDescriptor, ReleaseError> {
        let group = module
            .group
            .clone()
            .or_else(|| self.defaults.group.clone())
            .ok_or_else(|| ReleaseError::InvalidModule {
                module: module.name.clone(),
                message: "no group set on the module or in defaults".to_string(),
            })?;
        let version = module
            .version
            .clone()
            .or_else(|| self.defaults.version.clone())
            .ok_or_else(|| ReleaseError::InvalidModule {
                module: module.name.clone(),
                message: "no version set on the module or in defaults".to_string(),
            })?;
        let extension = module
            .extension
            .clone()
            .or_else(|| self.defaults.extension.clone())
            .unwrap_or_else(|| "jar".to_string());

        let outputs = module
            .artifacts
            .iter()
            .map(|artifact| DeclaredOutput {
                classifier: artifact.classifier,
                content: ContentHandle::File(base_dir.join(&artifact.path)),
                extension: artifact.extension.clone(),
            })
            .collect();

        Ok(ModuleDescriptor {
            name: module.name.clone(),
            group,
            version,
            kind: module.kind,
            extension,
            outputs,
            output_dir: module.output_dir.as_ref().map(|dir| base_dir.join(dir)),
        })
    }

    pub fn target(&self, name: &str) -> Option<&PublishTarget> {
        self.targets.iter().find(|target| target.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Acceptance;

    const SAMPLE: &str = r#"
version: "1.0"
defaults:
  group: io.example.tools
  version: 1.4.0
modules:
  - name: tools-core
    output_dir: core/build/libs
  - name: tools-bom
    kind: bom
    extension: pom
    artifacts:
      - classifier: primary
        path: bom/build/tools-bom-1.4.0.pom
targets:
  - name: central
    endpoint: https://repo.example.com/staging/deploy
    username: central-user
    credential: central-password
    accepts: releases
    require_signatures: true
  - name: snapshots
    endpoint: https://repo.example.com/snapshots
    accepts: snapshots
signing:
  key_id: "0xABCDEF12"
  passphrase: signing-passphrase
credentials:
  central-user:
    env: MAVEN_CENTRAL_USER
  central-password:
    env: MAVEN_CENTRAL_PW
release:
  parallel: 2
"#;

    #[test]
    fn test_default_config() {
        let config = ReleaseConfig::default();
        assert_eq!(config.version, "1.0");
        assert!(config.release.verify);
        assert!(!config.release.dry_run);
        assert_eq!(config.release.retry.max_attempts, 3);
    }

    #[test]
    fn test_deserialize_sample_config() {
        let config: ReleaseConfig = serde_yaml::from_str(SAMPLE).unwrap();

        assert_eq!(config.modules.len(), 2);
        assert_eq!(config.modules[1].kind, ModuleKind::Bom);
        assert_eq!(config.targets[0].accepts, Acceptance::Releases);
        assert!(config.targets[0].require_signatures);
        assert_eq!(config.release.parallel, Some(2));
        assert!(config.release.verify);
        assert_eq!(
            config.credentials.get("central-password"),
            Some(&CredentialSource::env("MAVEN_CENTRAL_PW"))
        );
        assert_eq!(
            config.signing.as_ref().and_then(|s| s.effective_key_id()),
            Some("0xABCDEF12")
        );
    }

    #[test]
    fn test_module_descriptors_apply_defaults_and_base_dir() {
        let config: ReleaseConfig = serde_yaml::from_str(SAMPLE).unwrap();
        let descriptors = config.module_descriptors(Path::new("/work")).unwrap();

        let core = &descriptors[0];
        assert_eq!(core.group, "io.example.tools");
        assert_eq!(core.version, "1.4.0");
        assert_eq!(core.extension, "jar");
        assert_eq!(core.output_dir, Some(PathBuf::from("/work/core/build/libs")));

        let bom = &descriptors[1];
        assert_eq!(bom.extension, "pom");
        assert_eq!(
            bom.outputs[0].content,
            ContentHandle::File(PathBuf::from("/work/bom/build/tools-bom-1.4.0.pom"))
        );
    }

    #[test]
    fn test_module_without_version_is_invalid() {
        let config: ReleaseConfig = serde_yaml::from_str(
            "version: \"1.0\"\ndefaults:\n  group: io.example\nmodules:\n  - name: core\n",
        )
        .unwrap();

        let err = config.module_descriptors(Path::new(".")).unwrap_err();
        assert_eq!(err.code(), "INVALID_MODULE");
        assert_eq!(err.subject(), "core");
    }

    #[test]
    fn test_blank_key_id_disables_signing() {
        let signing = SigningConfig {
            key_id: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(signing.effective_key_id(), None);
        assert_eq!(SigningConfig::default().effective_key_id(), None);
    }

    #[test]
    fn test_serialize_round_trip_keeps_targets() {
        let config: ReleaseConfig = serde_yaml::from_str(SAMPLE).unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("accepts: snapshots"));
        assert!(yaml.contains("require_signatures: true"));
    }
}
