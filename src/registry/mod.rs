//! Registry - in-memory overlay store and context resolution
//!
//! Overlays are keyed by `overlayId@version`. Re-registering an existing key
//! replaces the prior entry without error (last write wins).
//!
//! The map sits behind a reader/writer lock. Lookups return `Arc` snapshots,
//! so an overlay unregistered between `for_context` and a merge is still
//! applied by that merge; this staleness is accepted.
//!
//! `register` checks that a signature is *present*, not that it is valid.
//! Callers that need tamper-evidence run `signer::verify` first (the bundle
//! loader does this by default).

mod specificity;

pub use specificity::{
    matches, specificity, DEVICE_WEIGHT, ROLE_WEIGHT, TAGS_WEIGHT, TENANT_WEIGHT, USER_WEIGHT,
};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use overlay_spec::{OverlayLookup, SignedOverlaySpec};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use crate::validator::{self, StructuralValidationError};

/// Errors raised at registration time
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Validation(#[from] StructuralValidationError),

    #[error("overlay {overlay} is unsigned and unsigned overlays are not allowed")]
    SignatureMissing { overlay: String },
}

/// Options for `OverlayRegistry::register`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterOptions {
    pub skip_validation: bool,
    pub allow_unsigned: bool,
}

/// A stored overlay with its precomputed specificity
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub overlay: Arc<SignedOverlaySpec>,
    pub specificity: u32,
    pub registered_at: DateTime<Utc>,
    /// Monotonic registration order, used to break specificity ties
    pub sequence: u64,
}

#[derive(Debug, Default)]
struct RegistryState {
    entries: HashMap<String, RegistryEntry>,
    next_sequence: u64,
}

/// Thread-safe in-memory overlay registry
#[derive(Debug, Default)]
pub struct OverlayRegistry {
    state: RwLock<RegistryState>,
}

impl OverlayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate (unless skipped), check signature presence, and store
    pub fn register(
        &self,
        input: impl Into<SignedOverlaySpec>,
        options: &RegisterOptions,
    ) -> Result<RegistryEntry, RegistryError> {
        let overlay = input.into();

        if !options.skip_validation {
            validator::assert_valid(&overlay.spec)?;
        }

        if !overlay.is_signed() && !options.allow_unsigned {
            return Err(RegistryError::SignatureMissing {
                overlay: overlay.key(),
            });
        }

        let key = overlay.key();
        let specificity = specificity(&overlay.spec.applies_to);

        let mut state = self.state.write();
        let sequence = state.next_sequence;
        state.next_sequence += 1;

        let entry = RegistryEntry {
            overlay: Arc::new(overlay),
            specificity,
            registered_at: Utc::now(),
            sequence,
        };
        let replaced = state.entries.insert(key.clone(), entry.clone()).is_some();

        debug!(overlay = %key, specificity, replaced, "registered overlay");
        Ok(entry)
    }

    /// Overlays matching the lookup, least specific first
    ///
    /// Ties are broken by registration order, earlier first, so a merge in
    /// this order lets more specific overlays win.
    pub fn for_context(&self, lookup: &OverlayLookup) -> Vec<Arc<SignedOverlaySpec>> {
        let state = self.state.read();
        let mut matched: Vec<&RegistryEntry> = state
            .entries
            .values()
            .filter(|entry| matches(&entry.overlay.spec.applies_to, lookup))
            .collect();
        matched.sort_by_key(|entry| (entry.specificity, entry.sequence));

        debug!(count = matched.len(), "resolved overlays for context");
        matched.into_iter().map(|entry| Arc::clone(&entry.overlay)).collect()
    }

    /// Remove one version, or every version when `version` is `None`
    ///
    /// Returns the number of entries removed.
    pub fn unregister(&self, overlay_id: &str, version: Option<&str>) -> usize {
        let mut state = self.state.write();
        let before = state.entries.len();

        match version {
            Some(version) => {
                state.entries.remove(&format!("{}@{}", overlay_id, version));
            }
            None => state
                .entries
                .retain(|_, entry| entry.overlay.spec.overlay_id != overlay_id),
        }

        let removed = before - state.entries.len();
        debug!(overlay_id, removed, "unregistered overlays");
        removed
    }

    pub fn get(&self, overlay_id: &str, version: &str) -> Option<RegistryEntry> {
        self.state
            .read()
            .entries
            .get(&format!("{}@{}", overlay_id, version))
            .cloned()
    }

    /// All entries in registration order
    pub fn list(&self) -> Vec<RegistryEntry> {
        let mut entries: Vec<RegistryEntry> = self.state.read().entries.values().cloned().collect();
        entries.sort_by_key(|entry| entry.sequence);
        entries
    }

    pub fn clear(&self) {
        self.state.write().entries.clear();
    }

    pub fn size(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_spec::{OverlayAppliesTo, OverlayModification, OverlaySignature, OverlaySpec};

    fn spec(id: &str, applies_to: OverlayAppliesTo) -> OverlaySpec {
        OverlaySpec::new(id, "1")
            .with_applies_to(applies_to)
            .with_modification(OverlayModification::hide("ssn"))
    }

    fn unsigned_ok() -> RegisterOptions {
        RegisterOptions {
            allow_unsigned: true,
            ..Default::default()
        }
    }

    fn fake_signed(spec: OverlaySpec, signature: &str) -> SignedOverlaySpec {
        SignedOverlaySpec {
            spec,
            signature: Some(OverlaySignature {
                algorithm: "ed25519".to_string(),
                signature: signature.to_string(),
                public_key: String::new(),
                key_id: None,
                issued_at: Utc::now(),
                expires_at: None,
                metadata: None,
            }),
        }
    }

    #[test]
    fn test_register_requires_signature() {
        let registry = OverlayRegistry::new();
        let applies = OverlayAppliesTo::default().with_data_view("v");

        let err = registry
            .register(spec("o1", applies.clone()), &RegisterOptions::default())
            .unwrap_err();
        assert!(matches!(err, RegistryError::SignatureMissing { .. }));

        let err = registry
            .register(fake_signed(spec("o1", applies.clone()), ""), &RegisterOptions::default())
            .unwrap_err();
        assert!(matches!(err, RegistryError::SignatureMissing { .. }));

        // Presence only: bogus bytes are accepted
        assert!(registry
            .register(fake_signed(spec("o1", applies), "bm90LWEtc2ln"), &RegisterOptions::default())
            .is_ok());
        assert_eq!(registry.size(), 1);
    }

    #[test]
    fn test_register_validates_unless_skipped() {
        let registry = OverlayRegistry::new();
        let invalid = OverlaySpec::new("o1", "1").with_modification(OverlayModification::hide("ssn"));

        let err = registry.register(invalid.clone(), &unsigned_ok()).unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
        assert!(err.to_string().contains("MISSING_TARGET"));

        let options = RegisterOptions {
            skip_validation: true,
            allow_unsigned: true,
        };
        assert!(registry.register(invalid, &options).is_ok());
    }

    #[test]
    fn test_register_computes_specificity() {
        let registry = OverlayRegistry::new();
        let entry = registry
            .register(
                spec("o1", OverlayAppliesTo::default().with_data_view("v").with_tenant("t1").with_tag("beta")),
                &unsigned_ok(),
            )
            .unwrap();
        assert_eq!(entry.specificity, 9);
    }

    #[test]
    fn test_reregistration_overwrites() {
        let registry = OverlayRegistry::new();
        let applies = OverlayAppliesTo::default().with_data_view("v");

        registry.register(spec("o1", applies.clone()), &unsigned_ok()).unwrap();
        let second = spec("o1", applies).with_modification(OverlayModification::hide("email"));
        registry.register(second.clone(), &unsigned_ok()).unwrap();

        let listed = registry.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].overlay.spec, second);
    }

    #[test]
    fn test_for_context_orders_by_specificity_then_registration() {
        let registry = OverlayRegistry::new();
        let view = OverlayAppliesTo::default().with_data_view("v");

        registry.register(spec("tenant", view.clone().with_tenant("t1")), &unsigned_ok()).unwrap();
        registry.register(spec("base-a", view.clone()), &unsigned_ok()).unwrap();
        registry.register(spec("user", view.clone().with_user("u1")), &unsigned_ok()).unwrap();
        registry.register(spec("base-b", view.clone()), &unsigned_ok()).unwrap();
        registry.register(spec("other-tenant", view.with_tenant("t2")), &unsigned_ok()).unwrap();

        let lookup = OverlayLookup::default()
            .with_data_view("v")
            .with_tenant("t1")
            .with_user("u1");
        let ids: Vec<String> = registry
            .for_context(&lookup)
            .iter()
            .map(|o| o.spec.overlay_id.clone())
            .collect();

        assert_eq!(ids, vec!["base-a", "base-b", "tenant", "user"]);
    }

    #[test]
    fn test_unregister_one_or_all_versions() {
        let registry = OverlayRegistry::new();
        let applies = OverlayAppliesTo::default().with_data_view("v");

        for version in ["1", "2", "3"] {
            let mut s = spec("o1", applies.clone());
            s.version = version.to_string();
            registry.register(s, &unsigned_ok()).unwrap();
        }
        registry.register(spec("o2", applies), &unsigned_ok()).unwrap();

        assert_eq!(registry.unregister("o1", Some("2")), 1);
        assert!(registry.get("o1", "2").is_none());
        assert!(registry.get("o1", "1").is_some());
        assert_eq!(registry.unregister("o1", Some("missing")), 0);

        assert_eq!(registry.unregister("o1", None), 2);
        assert_eq!(registry.size(), 1);

        registry.clear();
        assert!(registry.is_empty());
    }
}
