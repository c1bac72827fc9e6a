//! Plugin Loader - selects transports and signing backends from configuration
//!
//! # Example
//!
//! ```no_run
//! use artifact_publisher::core::PublishTarget;
//! use artifact_publisher::plugins::PluginLoader;
//!
//! # fn example() -> Result<(), artifact_publisher::core::ReleaseError> {
//! let loader = PluginLoader::new(std::env::current_dir().unwrap());
//! let target = PublishTarget::new("central", "https://repo.example.com/releases");
//! let transport = loader.transport_for(&target)?;
//!
//! println!("{} uses {}", target.name, transport.name());
//! # Ok(())
//! # }
//! ```

use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::core::config::ReleaseConfig;
use crate::core::error::ReleaseError;
use crate::core::model::{PublishTarget, TargetKind};
use crate::core::traits::{CredentialProvider, SigningBackend, SigningKey, Transport};
use crate::plugins::command_signer::CommandSigningBackend;
use crate::plugins::file_transport::FileTransport;
use crate::plugins::http_transport::{DEFAULT_HTTP_TIMEOUT, HttpTransport};

/// Creates the collaborators a release needs
pub struct PluginLoader {
    /// Working directory for external commands
    working_dir: PathBuf,
    http_timeout: Duration,
    /// Shared so every HTTP target reuses one connection pool
    http: OnceLock<Arc<HttpTransport>>,
}

impl PluginLoader {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            http: OnceLock::new(),
        }
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Transport for a target's kind
    pub fn transport_for(&self, target: &PublishTarget) -> Result<Arc<dyn Transport>, ReleaseError> {
        match target.kind {
            TargetKind::Http => {
                if let Some(http) = self.http.get() {
                    return Ok(http.clone());
                }
                let http = Arc::new(HttpTransport::new(self.http_timeout)?);
                Ok(self.http.get_or_init(|| http).clone())
            }
            TargetKind::File => Ok(Arc::new(FileTransport::new())),
        }
    }

    /// Signing key, or `None` when signing is not configured
    ///
    /// A passphrase reference that does not resolve is treated as no passphrase.
    pub fn signing_key(
        &self,
        config: &ReleaseConfig,
        credentials: &dyn CredentialProvider,
    ) -> Option<SigningKey> {
        let signing = config.signing.as_ref()?;
        let key_id = signing.effective_key_id()?;

        let passphrase: Option<SecretString> = signing.passphrase.as_deref().and_then(|name| {
            let secret = credentials.get(name);
            if secret.is_none() {
                tracing::warn!("signing passphrase {} not found, signing without it", name);
            }
            secret
        });

        Some(SigningKey {
            key_id: key_id.to_string(),
            passphrase,
        })
    }

    /// Signing backend, or `None` when no key id is configured
    pub fn signing_backend(
        &self,
        config: &ReleaseConfig,
    ) -> Result<Option<Arc<dyn SigningBackend>>, ReleaseError> {
        let Some(signing) = config.signing.as_ref() else {
            tracing::info!("no signing configuration, artifacts will not be signed");
            return Ok(None);
        };
        if signing.effective_key_id().is_none() {
            tracing::info!("signing key id is empty, artifacts will not be signed");
            return Ok(None);
        }

        let backend = CommandSigningBackend::from_config(signing, &self.working_dir)?;
        Ok(Some(Arc::new(backend)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{CredentialSource, SigningConfig};
    use crate::security::CredentialStore;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn loader() -> PluginLoader {
        PluginLoader::new(std::env::temp_dir())
    }

    #[test]
    fn test_transport_for_kind() {
        let loader = loader();
        let http = PublishTarget::new("central", "https://repo.example.com");
        let mut file = PublishTarget::new("local", "/srv/repo");
        file.kind = TargetKind::File;

        assert_eq!(loader.transport_for(&http).unwrap().name(), "http");
        assert_eq!(loader.transport_for(&file).unwrap().name(), "file");
    }

    #[test]
    fn test_http_transport_is_shared() {
        let loader = loader();
        let target = PublishTarget::new("central", "https://repo.example.com");

        let first = loader.transport_for(&target).unwrap();
        let second = loader.transport_for(&target).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_no_signing_without_key_id() {
        let loader = loader();
        let mut config = ReleaseConfig::default();
        assert!(loader.signing_backend(&config).unwrap().is_none());

        config.signing = Some(SigningConfig {
            key_id: Some("  ".to_string()),
            ..Default::default()
        });
        assert!(loader.signing_backend(&config).unwrap().is_none());
        assert!(loader.signing_key(&config, &CredentialStore::default()).is_none());
    }

    #[test]
    fn test_signing_key_with_passphrase() {
        let loader = loader();
        let mut config = ReleaseConfig::default();
        config.signing = Some(SigningConfig {
            key_id: Some("ABCDEF12".to_string()),
            passphrase: Some("signing-passphrase".to_string()),
            ..Default::default()
        });
        let credentials = CredentialStore::new(
            HashMap::from([(
                "signing-passphrase".to_string(),
                CredentialSource::value("open-sesame"),
            )]),
            HashMap::new(),
        );

        let key = loader.signing_key(&config, &credentials).unwrap();
        assert_eq!(key.key_id, "ABCDEF12");
        assert_eq!(key.passphrase.unwrap().expose_secret(), "open-sesame");

        let backend = loader.signing_backend(&config).unwrap().unwrap();
        assert_eq!(backend.name(), "gpg");
    }
}
