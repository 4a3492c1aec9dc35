//! Built-in engine defaults (layer 1)

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineDefaults {
    /// Unknown field references fail the merge (default: false)
    pub strict: bool,

    /// Register overlays without signature bytes (default: false)
    pub allow_unsigned: bool,

    /// Skip structural validation at registration (default: false)
    pub skip_validation: bool,

    /// Cryptographically verify bundle overlays before registering (default: true)
    pub verify_signatures: bool,

    /// Drop bundle overlays whose signature has expired (default: false)
    pub reject_expired: bool,

    /// Admit only keys with these SHA-256 fingerprints; empty admits any (default: [])
    pub trusted_key_fingerprints: Vec<String>,

    /// Default tracing filter for the CLI (default: "warn")
    pub log_level: String,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            strict: false,
            allow_unsigned: false,
            skip_validation: false,
            verify_signatures: true,
            reject_expired: false,
            trusted_key_fingerprints: Vec::new(),
            log_level: "warn".to_string(),
        }
    }
}

impl EngineDefaults {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
