//! Overlay specs and their detached signature block.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Metadata, OverlayAppliesTo, OverlayModification};

/// An unsigned overlay: a target/audience scope plus ordered modifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlaySpec {
    /// Stable identifier, unique per version
    #[serde(default)]
    pub overlay_id: String,

    #[serde(default)]
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub applies_to: OverlayAppliesTo,

    /// Applied in list order
    #[serde(default)]
    pub modifications: Vec<OverlayModification>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    /// Kept as authored so canonical bytes survive a parse/serialize cycle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl OverlaySpec {
    pub fn new(overlay_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            overlay_id: overlay_id.into(),
            version: version.into(),
            description: None,
            applies_to: OverlayAppliesTo::default(),
            modifications: Vec::new(),
            metadata: None,
            created_by: None,
            created_at: None,
        }
    }

    pub fn with_applies_to(mut self, applies_to: OverlayAppliesTo) -> Self {
        self.applies_to = applies_to;
        self
    }

    pub fn with_modification(mut self, modification: OverlayModification) -> Self {
        self.modifications.push(modification);
        self
    }

    /// Identity of this overlay (`overlayId@version`).
    pub fn overlay_ref(&self) -> OverlayRef {
        OverlayRef {
            overlay_id: self.overlay_id.clone(),
            version: self.version.clone(),
        }
    }
}

/// Detached signature over the canonical form of an `OverlaySpec`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlaySignature {
    /// `ed25519` or `rsa-pss-sha256`
    pub algorithm: String,

    /// Base64 signature bytes; empty means not present
    #[serde(default)]
    pub signature: String,

    /// SPKI PEM of the signing key
    #[serde(default)]
    pub public_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,

    pub issued_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl OverlaySignature {
    pub fn has_signature(&self) -> bool {
        !self.signature.is_empty()
    }
}

/// An `OverlaySpec` with an optional signature block, flattened on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedOverlaySpec {
    #[serde(flatten)]
    pub spec: OverlaySpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<OverlaySignature>,
}

impl SignedOverlaySpec {
    pub fn unsigned(spec: OverlaySpec) -> Self {
        Self {
            spec,
            signature: None,
        }
    }

    /// Registry key (`overlayId@version`).
    pub fn key(&self) -> String {
        self.spec.overlay_ref().to_string()
    }

    /// True when a signature block carries signature bytes.
    pub fn is_signed(&self) -> bool {
        self.signature
            .as_ref()
            .map(OverlaySignature::has_signature)
            .unwrap_or(false)
    }

    /// True when `expiresAt` is set and not after `now`. Not checked by verification.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.signature
            .as_ref()
            .and_then(|s| s.expires_at)
            .map(|expires| expires <= now)
            .unwrap_or(false)
    }
}

impl From<OverlaySpec> for SignedOverlaySpec {
    fn from(spec: OverlaySpec) -> Self {
        Self::unsigned(spec)
    }
}

/// `overlayId` + `version` pair identifying a stored overlay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayRef {
    pub overlay_id: String,
    pub version: String,
}

impl fmt::Display for OverlayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.overlay_id, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn sample_signature() -> OverlaySignature {
        OverlaySignature {
            algorithm: "ed25519".to_string(),
            signature: "c2ln".to_string(),
            public_key: "-----BEGIN PUBLIC KEY-----".to_string(),
            key_id: None,
            issued_at: Utc::now(),
            expires_at: None,
            metadata: None,
        }
    }

    #[test]
    fn test_signed_spec_flattens_spec_fields() {
        let signed = SignedOverlaySpec {
            spec: OverlaySpec::new("hide-ssn", "1.0.0")
                .with_modification(OverlayModification::hide("ssn")),
            signature: Some(sample_signature()),
        };
        let json = serde_json::to_value(&signed).unwrap();

        assert_eq!(json["overlayId"], "hide-ssn");
        assert_eq!(json["version"], "1.0.0");
        assert_eq!(json["modifications"][0]["type"], "hideField");
        assert_eq!(json["signature"]["algorithm"], "ed25519");
        assert!(json.get("spec").is_none());
    }

    #[test]
    fn test_parse_unsigned_wire_form() {
        let signed: SignedOverlaySpec = serde_json::from_value(json!({
            "overlayId": "o1",
            "version": "1",
            "appliesTo": {"dataView": "customerForm"},
            "modifications": [{"type": "hideField", "field": "ssn"}]
        }))
        .unwrap();

        assert!(signed.signature.is_none());
        assert!(!signed.is_signed());
        assert_eq!(signed.key(), "o1@1");
    }

    #[test]
    fn test_empty_signature_bytes_are_not_signed() {
        let mut signature = sample_signature();
        signature.signature = String::new();
        let signed = SignedOverlaySpec {
            spec: OverlaySpec::new("o1", "1"),
            signature: Some(signature),
        };
        assert!(!signed.is_signed());
    }

    #[test]
    fn test_expiry_helper() {
        let now = Utc::now();
        let mut signature = sample_signature();
        signature.expires_at = Some(now - Duration::seconds(1));
        let signed = SignedOverlaySpec {
            spec: OverlaySpec::new("o1", "1"),
            signature: Some(signature),
        };
        assert!(signed.is_expired_at(now));
        assert!(!signed.is_expired_at(now - Duration::seconds(10)));

        let unsigned = SignedOverlaySpec::unsigned(OverlaySpec::new("o1", "1"));
        assert!(!unsigned.is_expired_at(now));
    }
}
