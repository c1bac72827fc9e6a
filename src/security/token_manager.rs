//! Secure credential store with memory-safe handling and masking capabilities
//!
//! Credential references from the release configuration are resolved to
//! `secrecy` strings so that secrets never show up in logs or debug output.

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{BTreeSet, HashMap};
use std::env;
use std::sync::Mutex;

use crate::core::config::CredentialSource;
use crate::core::traits::{Credential, CredentialProvider};
use crate::core::model::PublishTarget;

/// Environment variable a credential reference falls back to
///
/// `central-password` becomes `CENTRAL_PASSWORD`.
pub fn env_var_name(reference: &str) -> String {
    reference
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Credential store backed by configuration and environment variables
///
/// Lookup order for a reference:
/// 1. literal `value` declared under `credentials`
/// 2. environment variable declared under `credentials`
/// 3. environment variable derived from the reference name
///
/// # Examples
///
/// ```
/// use artifact_publisher::core::CredentialProvider;
/// use artifact_publisher::security::CredentialStore;
/// use std::collections::HashMap;
///
/// let env = HashMap::from([("CENTRAL_TOKEN".to_string(), "s3cr3t-token-value".to_string())]);
/// let store = CredentialStore::new(HashMap::new(), env);
/// assert!(store.get("central-token").is_some());
/// assert!(store.get("unknown").is_none());
/// ```
#[derive(Default)]
pub struct CredentialStore {
    sources: HashMap<String, CredentialSource>,
    env: HashMap<String, String>,
    /// References resolved so far, masked alongside the declared sources
    resolved: Mutex<BTreeSet<String>>,
}

impl CredentialStore {
    pub fn new(sources: HashMap<String, CredentialSource>, env: HashMap<String, String>) -> Self {
        Self {
            sources,
            env,
            resolved: Mutex::default(),
        }
    }

    /// Store reading from the current process environment
    pub fn from_process_env(sources: HashMap<String, CredentialSource>) -> Self {
        Self::new(sources, env::vars().collect())
    }

    fn lookup(&self, name: &str) -> Option<String> {
        if let Some(source) = self.sources.get(name) {
            if let Some(value) = &source.value {
                return Some(value.clone());
            }
            if let Some(var) = &source.env {
                return self.env.get(var).cloned();
            }
        }

        self.env.get(&env_var_name(name)).cloned()
    }

    /// Resolve the credential a target authenticates with
    ///
    /// Returns `None` when the target has no credential reference or the
    /// reference does not resolve.
    pub fn credential_for(&self, target: &PublishTarget) -> Option<Credential> {
        let reference = target.credential.as_deref()?;
        let secret = match self.get(reference) {
            Some(secret) => secret,
            None => {
                tracing::warn!(target = %target.name, "credential {} not found", reference);
                return None;
            }
        };

        let username = target.username.as_deref().and_then(|user_ref| {
            let user = self.get(user_ref).map(|s| s.expose_secret().to_string());
            if user.is_none() {
                tracing::warn!(target = %target.name, "username credential {} not found", user_ref);
            }
            user
        });

        Some(Credential { username, secret })
    }

    /// Masks a token for safe logging
    ///
    /// Shows only the first 3 and last 3 characters for identification purposes.
    /// Tokens shorter than 10 characters are fully masked as "****".
    ///
    /// # Examples
    ///
    /// ```
    /// use artifact_publisher::security::CredentialStore;
    ///
    /// assert_eq!(CredentialStore::mask_token("abcdef123456"), "abc...456");
    /// assert_eq!(CredentialStore::mask_token("short"), "****");
    /// ```
    pub fn mask_token(token: &str) -> String {
        if token.chars().count() < 10 {
            return "****".to_string();
        }

        let prefix: String = token.chars().take(3).collect();
        let suffix: String = token
            .chars()
            .rev()
            .take(3)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("{}...{}", prefix, suffix)
    }

    /// Masks every known secret in a string
    ///
    /// Used on transport error messages before they reach logs or reports.
    pub fn mask_secrets_in(&self, text: &str) -> String {
        let mut masked = text.to_string();

        let mut names: BTreeSet<String> = self.sources.keys().cloned().collect();
        if let Ok(resolved) = self.resolved.lock() {
            names.extend(resolved.iter().cloned());
        }

        for name in &names {
            if let Some(secret) = self.lookup(name).filter(|value| !value.is_empty()) {
                let secret = secret.as_str();
                if let Ok(regex) = Regex::new(&regex::escape(secret)) {
                    masked = regex
                        .replace_all(&masked, Self::mask_token(secret).as_str())
                        .into_owned();
                }
            }
        }

        masked
    }
}

impl CredentialProvider for CredentialStore {
    fn get(&self, name: &str) -> Option<SecretString> {
        let value = self.lookup(name).filter(|value| !value.is_empty())?;
        if let Ok(mut resolved) = self.resolved.lock() {
            resolved.insert(name.to_string());
        }
        Some(SecretString::from(value))
    }
}
