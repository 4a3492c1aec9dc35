//! Engine configuration
//!
//! Three layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. Config file (`.overlay/engine.toml` unless overridden)
//! 3. CLI flags

mod defaults;
mod merge;

pub use defaults::EngineDefaults;
pub use merge::{deep_merge, merge_layers};

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::bundle::LoadOptions;
use crate::registry::RegisterOptions;

/// Default config file location, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = ".overlay/engine.toml";

/// Errors from loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Where a configuration layer came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// A contributing layer with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Effective engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub strict: bool,
    pub allow_unsigned: bool,
    pub skip_validation: bool,
    pub verify_signatures: bool,
    pub reject_expired: bool,
    pub trusted_key_fingerprints: Vec<String>,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let d = EngineDefaults::default();
        Self {
            strict: d.strict,
            allow_unsigned: d.allow_unsigned,
            skip_validation: d.skip_validation,
            verify_signatures: d.verify_signatures,
            reject_expired: d.reject_expired,
            trusted_key_fingerprints: d.trusted_key_fingerprints,
            log_level: d.log_level,
        }
    }
}

impl EngineConfig {
    /// Merge defaults, an optional file and CLI overrides
    ///
    /// A missing file at `path` is skipped; unreadable or malformed files fail.
    pub fn build(
        path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<(Self, Vec<ConfigSource>), ConfigError> {
        let mut layers = vec![EngineDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = path {
            if path.exists() {
                let (value, digest) = load_toml_file(path)?;
                layers.push(value);
                sources.push(ConfigSource {
                    origin: ConfigOrigin::File,
                    path: Some(path.to_string_lossy().to_string()),
                    digest: Some(digest),
                });
            }
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let config: EngineConfig = serde_json::from_value(merge_layers(layers))
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;

        Ok((config, sources))
    }

    /// Parse a TOML document on top of the defaults
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let value = toml_str_to_json(contents, Path::new("<inline>"))?;
        let merged = merge_layers(vec![EngineDefaults::default().to_value(), value]);
        let config: EngineConfig =
            serde_json::from_value(merged).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn register_options(&self) -> RegisterOptions {
        RegisterOptions {
            skip_validation: self.skip_validation,
            allow_unsigned: self.allow_unsigned,
        }
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            register: self.register_options(),
            verify_signatures: self.verify_signatures,
            reject_expired: self.reject_expired,
            trusted_key_fingerprints: self
                .trusted_key_fingerprints
                .iter()
                .map(|fp| fp.to_ascii_lowercase())
                .collect(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for fp in &self.trusted_key_fingerprints {
            if fp.len() != 64 || !fp.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ConfigError::Invalid(format!(
                    "trusted_key_fingerprints entry '{}' is not a hex SHA-256 digest",
                    fp
                )));
            }
        }
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Invalid("log_level must not be empty".to_string()));
        }
        Ok(())
    }
}

fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hex::encode(hasher.finalize());

    let contents = String::from_utf8(bytes).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: format!("invalid UTF-8: {}", e),
    })?;

    Ok((toml_str_to_json(&contents, path)?, digest))
}

/// TOML is read straight into the JSON value tree the layers merge over
fn toml_str_to_json(contents: &str, path: &Path) -> Result<Value, ConfigError> {
    toml::from_str(contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
