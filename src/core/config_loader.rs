//! Configuration file loader for artifact-publisher
//!
//! This module provides configuration loading, environment expansion,
//! override merging and validation.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::config::*;
use crate::core::error::ReleaseError;
use crate::core::model::TargetKind;

/// Configuration file name
pub const CONFIG_FILENAME: &str = ".release.yaml";

/// Environment variable pattern (${VAR_NAME})
const ENV_VAR_PATTERN: &str = r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}";

lazy_static! {
    static ref ENV_VAR_REGEX: Regex = Regex::new(ENV_VAR_PATTERN).expect("valid env var pattern");
}

/// Values that take precedence over the configuration file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub dry_run: Option<bool>,
    pub parallel: Option<usize>,
    pub verify: Option<bool>,
}

/// Configuration load options
#[derive(Debug, Clone)]
pub struct ConfigLoadOptions {
    /// Project path to look for the default config file in
    pub project_path: PathBuf,

    /// Explicit config file (overrides the default location)
    pub config_path: Option<PathBuf>,

    /// CLI arguments (highest priority)
    pub overrides: ConfigOverrides,

    /// Environment variables
    pub env: HashMap<String, String>,
}

impl ConfigLoadOptions {
    pub fn new<P: Into<PathBuf>>(project_path: P) -> Self {
        Self {
            project_path: project_path.into(),
            config_path: None,
            overrides: ConfigOverrides::default(),
            env: env::vars().collect(),
        }
    }

    /// Path of the configuration file that will be read
    pub fn resolved_path(&self) -> PathBuf {
        self.config_path
            .clone()
            .unwrap_or_else(|| self.project_path.join(CONFIG_FILENAME))
    }

    /// Directory relative artifact paths are resolved against
    pub fn base_dir(&self) -> PathBuf {
        self.resolved_path()
            .parent()
            .map(Path::to_path_buf)
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Configuration validation result
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationResult {
    pub valid: bool,
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationWarning>,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Field path (e.g., "targets[0].endpoint")
    pub field: String,
    pub message: String,
}

/// Configuration validation warning
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

/// Configuration file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with priority
    ///
    /// Priority (high to low):
    /// 1. CLI overrides
    /// 2. Environment variables (`RELEASE_DRY_RUN`, `RELEASE_PARALLEL`)
    /// 3. Config file (YAML, or TOML when the extension is `.toml`)
    /// 4. Default values
    pub async fn load(options: &ConfigLoadOptions) -> Result<ReleaseConfig, ReleaseError> {
        let path = options.resolved_path();
        if !path.exists() {
            return Err(ReleaseError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| ReleaseError::io(path.display(), e))?;

        let mut config = Self::parse(&content, &path, &options.env)?;
        Self::apply_env(&mut config, &options.env);
        Self::apply_overrides(&mut config, &options.overrides);

        let validation = Self::validate(&config);
        for warning in &validation.warnings {
            tracing::warn!(field = %warning.field, "{}", warning.message);
        }
        if !validation.valid {
            let messages: Vec<String> = validation
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            return Err(ReleaseError::Config(messages.join("; ")));
        }

        tracing::debug!(
            path = %path.display(),
            modules = config.modules.len(),
            targets = config.targets.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Parse configuration text, expanding `${VAR}` references in every string
    pub fn parse(
        content: &str,
        path: &Path,
        env: &HashMap<String, String>,
    ) -> Result<ReleaseConfig, ReleaseError> {
        let is_toml = path.extension().and_then(|e| e.to_str()) == Some("toml");

        let mut raw: serde_yaml::Value = if is_toml {
            toml::from_str(content).map_err(|e| {
                ReleaseError::Config(format!("failed to parse TOML config: {}", e))
            })?
        } else {
            serde_yaml::from_str(content).map_err(|e| {
                ReleaseError::Config(format!("failed to parse YAML config: {}", e))
            })?
        };

        Self::expand_value(&mut raw, env);

        serde_yaml::from_value(raw)
            .map_err(|e| ReleaseError::Config(format!("invalid config: {}", e)))
    }

    fn expand_value(value: &mut serde_yaml::Value, env: &HashMap<String, String>) {
        match value {
            serde_yaml::Value::String(s) => *s = Self::expand_string(s, env),
            serde_yaml::Value::Sequence(items) => {
                for item in items {
                    Self::expand_value(item, env);
                }
            }
            serde_yaml::Value::Mapping(map) => {
                for (_, item) in map.iter_mut() {
                    Self::expand_value(item, env);
                }
            }
            serde_yaml::Value::Tagged(tagged) => Self::expand_value(&mut tagged.value, env),
            _ => {}
        }
    }

    /// Expand environment variables in a single string
    ///
    /// Unset variables expand to the empty string, so an unset signing key
    /// disables signing instead of being passed through literally.
    pub fn expand_string(input: &str, env: &HashMap<String, String>) -> String {
        ENV_VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let var_name = &caps[1];
                match env.get(var_name) {
                    Some(value) => value.clone(),
                    None => {
                        tracing::warn!("environment variable {} not set, expanding to empty", var_name);
                        String::new()
                    }
                }
            })
            .into_owned()
    }

    fn apply_env(config: &mut ReleaseConfig, env: &HashMap<String, String>) {
        if let Some(dry_run) = env.get("RELEASE_DRY_RUN") {
            config.release.dry_run = dry_run == "true" || dry_run == "1";
        }

        if let Some(parallel) = env.get("RELEASE_PARALLEL") {
            match parallel.parse::<usize>() {
                Ok(n) => config.release.parallel = Some(n),
                Err(_) => tracing::warn!("ignoring non-numeric RELEASE_PARALLEL={}", parallel),
            }
        }
    }

    fn apply_overrides(config: &mut ReleaseConfig, overrides: &ConfigOverrides) {
        if let Some(dry_run) = overrides.dry_run {
            config.release.dry_run = dry_run;
        }
        if let Some(parallel) = overrides.parallel {
            config.release.parallel = Some(parallel);
        }
        if let Some(verify) = overrides.verify {
            config.release.verify = verify;
        }
    }

    /// Validate configuration
    pub fn validate(config: &ReleaseConfig) -> ConfigValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // 1. Schema version
        if config.version.is_empty() {
            errors.push(ConfigValidationError {
                field: "version".to_string(),
                message: "version is required".to_string(),
            });
        } else if config.version != "1.0" {
            warnings.push(ConfigValidationWarning {
                field: "version".to_string(),
                message: format!("unknown config version: {}", config.version),
                suggestion: Some("the only supported version is \"1.0\"".to_string()),
            });
        }

        Self::validate_modules(config, &mut errors, &mut warnings);
        Self::validate_targets(config, &mut errors, &mut warnings);
        Self::validate_signing(config, &mut errors);
        Self::validate_release_options(&config.release, &mut errors, &mut warnings);

        ConfigValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    fn validate_modules(
        config: &ReleaseConfig,
        errors: &mut Vec<ConfigValidationError>,
        warnings: &mut Vec<ConfigValidationWarning>,
    ) {
        if config.modules.is_empty() {
            warnings.push(ConfigValidationWarning {
                field: "modules".to_string(),
                message: "no modules configured".to_string(),
                suggestion: None,
            });
        }

        let mut seen = HashSet::new();
        for (i, module) in config.modules.iter().enumerate() {
            if module.name.trim().is_empty() {
                errors.push(ConfigValidationError {
                    field: format!("modules[{}].name", i),
                    message: "module name is required".to_string(),
                });
            } else if !seen.insert(module.name.as_str()) {
                errors.push(ConfigValidationError {
                    field: format!("modules[{}].name", i),
                    message: format!("duplicate module: {}", module.name),
                });
            }

            if module.artifacts.is_empty() && module.output_dir.is_none() {
                errors.push(ConfigValidationError {
                    field: format!("modules[{}]", i),
                    message: format!("module {} declares neither artifacts nor output_dir", module.name),
                });
            }
        }
    }

    fn validate_targets(
        config: &ReleaseConfig,
        errors: &mut Vec<ConfigValidationError>,
        warnings: &mut Vec<ConfigValidationWarning>,
    ) {
        if config.targets.is_empty() {
            errors.push(ConfigValidationError {
                field: "targets".to_string(),
                message: "at least one target is required".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for (i, target) in config.targets.iter().enumerate() {
            if !seen.insert(target.name.as_str()) {
                errors.push(ConfigValidationError {
                    field: format!("targets[{}].name", i),
                    message: format!("duplicate target: {}", target.name),
                });
            }

            if target.endpoint.trim().is_empty() {
                errors.push(ConfigValidationError {
                    field: format!("targets[{}].endpoint", i),
                    message: "endpoint is required".to_string(),
                });
            } else if target.kind == TargetKind::Http
                && !(target.endpoint.starts_with("https://") || target.endpoint.starts_with("http://"))
            {
                errors.push(ConfigValidationError {
                    field: format!("targets[{}].endpoint", i),
                    message: format!("http target endpoint must be a URL: {}", target.endpoint),
                });
            }

            for reference in [&target.credential, &target.username].into_iter().flatten() {
                if !config.credentials.contains_key(reference) {
                    warnings.push(ConfigValidationWarning {
                        field: format!("targets[{}]", i),
                        message: format!("credential {} is not declared in credentials", reference),
                        suggestion: Some(format!(
                            "it will be read from the {} environment variable",
                            crate::security::token_manager::env_var_name(reference)
                        )),
                    });
                }
            }
        }
    }

    fn validate_signing(config: &ReleaseConfig, errors: &mut Vec<ConfigValidationError>) {
        if let Some(command) = config.signing.as_ref().and_then(|s| s.command.as_ref())
            && command.program.trim().is_empty()
        {
            errors.push(ConfigValidationError {
                field: "signing.command.program".to_string(),
                message: "signing program is required".to_string(),
            });
        }

        if let Some(command) = config.signing.as_ref().and_then(|s| s.command.as_ref())
            && command.args.iter().any(|arg| arg.contains("{passphrase}"))
        {
            errors.push(ConfigValidationError {
                field: "signing.command.args".to_string(),
                message: "the passphrase is never passed as an argument; use {input} and read it from stdin"
                    .to_string(),
            });
        }
    }

    fn validate_release_options(
        release: &ReleaseOptionsConfig,
        errors: &mut Vec<ConfigValidationError>,
        warnings: &mut Vec<ConfigValidationWarning>,
    ) {
        if release.parallel == Some(0) {
            errors.push(ConfigValidationError {
                field: "release.parallel".to_string(),
                message: "parallel must be at least 1".to_string(),
            });
        }

        if release.retry.max_attempts == 0 {
            errors.push(ConfigValidationError {
                field: "release.retry.max_attempts".to_string(),
                message: "max_attempts must be at least 1".to_string(),
            });
        }

        if release.retry.backoff_multiplier < 1.0 {
            warnings.push(ConfigValidationWarning {
                field: "release.retry.backoff_multiplier".to_string(),
                message: "backoff multiplier below 1.0 shrinks delays between retries".to_string(),
                suggestion: Some("use 2.0 for exponential backoff".to_string()),
            });
        }
    }
}
