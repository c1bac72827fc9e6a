//! Version Validator - Validates release versions
//!
//! Repository versions are free-form strings, but anything that ends up in a
//! repository path must be path-safe. Versions that also parse as semantic
//! versions are broken down further, and `-SNAPSHOT` versions are recognised.
//!
//! # Example
//!
//! ```
//! use artifact_publisher::validation::VersionValidator;
//!
//! let validator = VersionValidator::new();
//! let result = validator.validate("1.2.3-SNAPSHOT");
//!
//! assert!(result.is_valid);
//! assert!(result.is_snapshot);
//! assert_eq!(result.major, Some(1));
//! ```

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::core::model::{SNAPSHOT_SUFFIX, is_snapshot_version};

/// Result of version validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionValidationResult {
    /// Whether the version can be released
    pub is_valid: bool,
    /// Validation error message (if any)
    pub error: Option<String>,
    /// Non-fatal remark, e.g. not a semantic version
    pub warning: Option<String>,
    pub is_snapshot: bool,
    pub major: Option<u64>,
    pub minor: Option<u64>,
    pub patch: Option<u64>,
    /// Pre-release part, without the snapshot suffix
    pub prerelease: Option<String>,
}

impl VersionValidationResult {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(message.into()),
            warning: None,
            is_snapshot: false,
            major: None,
            minor: None,
            patch: None,
            prerelease: None,
        }
    }
}

/// Validator for release versions
#[derive(Debug, Default)]
pub struct VersionValidator;

impl VersionValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a version string
    pub fn validate(&self, version_str: &str) -> VersionValidationResult {
        if version_str.is_empty() {
            return VersionValidationResult::invalid("version is empty");
        }

        if let Some(bad) = version_str
            .chars()
            .find(|c| c.is_whitespace() || matches!(c, '/' | '\\' | ':' | '$' | '{' | '}'))
        {
            return VersionValidationResult::invalid(format!(
                "version contains forbidden character {:?}",
                bad
            ));
        }

        if !version_str.starts_with(|c: char| c.is_ascii_alphanumeric()) {
            return VersionValidationResult::invalid("version must start with a letter or digit");
        }

        let is_snapshot = is_snapshot_version(version_str);
        let base = version_str
            .strip_suffix(SNAPSHOT_SUFFIX)
            .unwrap_or(version_str);

        match Version::parse(base) {
            Ok(version) => VersionValidationResult {
                is_valid: true,
                error: None,
                warning: None,
                is_snapshot,
                major: Some(version.major),
                minor: Some(version.minor),
                patch: Some(version.patch),
                prerelease: (!version.pre.is_empty()).then(|| version.pre.to_string()),
            },
            Err(e) => VersionValidationResult {
                is_valid: true,
                error: None,
                warning: Some(format!("not a semantic version: {}", e)),
                is_snapshot,
                major: None,
                minor: None,
                patch: None,
                prerelease: None,
            },
        }
    }

    /// Check if version is a prerelease or a snapshot
    ///
    /// ```
    /// use artifact_publisher::validation::VersionValidator;
    ///
    /// let validator = VersionValidator::new();
    ///
    /// assert!(validator.is_prerelease("1.0.0-RC1"));
    /// assert!(validator.is_prerelease("1.0.0-SNAPSHOT"));
    /// assert!(!validator.is_prerelease("1.0.0"));
    /// ```
    pub fn is_prerelease(&self, version_str: &str) -> bool {
        let result = self.validate(version_str);
        result.is_valid && (result.is_snapshot || result.prerelease.is_some())
    }
}
