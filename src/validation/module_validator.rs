//! Module Validator - Validates module coordinates before assembly

use lazy_static::lazy_static;
use regex::Regex;

use crate::core::error::ReleaseError;
use crate::core::model::ModuleDescriptor;
use crate::validation::version_validator::VersionValidator;

lazy_static! {
    static ref GROUP_REGEX: Regex =
        Regex::new(r"^[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)*$").expect("valid group pattern");
    static ref NAME_REGEX: Regex =
        Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]*$").expect("valid name pattern");
}

/// Validator for module coordinates
#[derive(Debug, Default)]
pub struct ModuleValidator {
    versions: VersionValidator,
}

impl ModuleValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate group, name and version of a module
    ///
    /// Returns the non-fatal warnings on success.
    pub fn validate(&self, module: &ModuleDescriptor) -> Result<Vec<String>, ReleaseError> {
        let invalid = |message: String| ReleaseError::InvalidModule {
            module: module.name.clone(),
            message,
        };

        if !NAME_REGEX.is_match(&module.name) {
            return Err(invalid(format!("invalid module name: {:?}", module.name)));
        }

        if !GROUP_REGEX.is_match(&module.group) {
            return Err(invalid(format!("invalid group: {:?}", module.group)));
        }

        let version = self.versions.validate(&module.version);
        if !version.is_valid {
            return Err(invalid(format!(
                "invalid version {:?}: {}",
                module.version,
                version.error.unwrap_or_default()
            )));
        }

        Ok(version.warning.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_module() {
        let module = ModuleDescriptor::new("tools-core", "io.example.tools", "1.0.0");
        assert!(ModuleValidator::new().validate(&module).unwrap().is_empty());
    }

    #[test]
    fn test_non_semver_version_warns() {
        let module = ModuleDescriptor::new("tools-core", "io.example", "1.0");
        let warnings = ModuleValidator::new().validate(&module).unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_invalid_group() {
        for group in ["", "io..example", ".io", "io/example", "io.example."] {
            let module = ModuleDescriptor::new("core", group, "1.0.0");
            let err = ModuleValidator::new().validate(&module).unwrap_err();
            assert_eq!(err.code(), "INVALID_MODULE", "group {:?}", group);
        }
    }

    #[test]
    fn test_invalid_name() {
        for name in ["", "-core", "co re", "core/x"] {
            let module = ModuleDescriptor::new(name, "io.example", "1.0.0");
            assert!(ModuleValidator::new().validate(&module).is_err(), "name {:?}", name);
        }
    }

    #[test]
    fn test_invalid_version() {
        let module = ModuleDescriptor::new("core", "io.example", "");
        let err = ModuleValidator::new().validate(&module).unwrap_err();
        assert!(err.to_string().contains("version is empty"));
    }
}
