//! Overlay bundles - persisted `SignedOverlaySpec` JSON
//!
//! A bundle path is one of:
//! - a file holding a single overlay object
//! - a file holding a JSON array of overlays
//! - a directory, walked recursively in file-name order, of `*.json` files
//!
//! Loading into a registry applies a per-overlay admission policy (schema
//! check, expiry, signature verification, key pinning). A rejected overlay is
//! reported in the `LoadReport` and never aborts the rest of the bundle.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use overlay_spec::{OverlayRef, SignedOverlaySpec};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::registry::{OverlayRegistry, RegisterOptions, RegistryError};
use crate::signer::{self, SignerError};
use crate::validator::{self, SchemaMismatchError};

/// Errors that stop a bundle from being read at all
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("bundle path not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to walk bundle directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Why a single overlay was not registered
#[derive(Debug, Error)]
pub enum RejectReason {
    #[error(transparent)]
    SchemaMismatch(#[from] SchemaMismatchError),

    #[error("signature expired")]
    Expired,

    #[error("signature does not match overlay contents")]
    SignatureInvalid,

    #[error(transparent)]
    Signature(#[from] SignerError),

    #[error("signing key {fingerprint} is not trusted")]
    UntrustedKey { fingerprint: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Admission policy for bundle overlays
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub register: RegisterOptions,
    pub verify_signatures: bool,
    pub reject_expired: bool,
    /// Lowercase hex SHA-256 fingerprints; empty admits any key
    pub trusted_key_fingerprints: Vec<String>,
}

/// One raw overlay document with its origin (`path` or `path#index`)
#[derive(Debug, Clone)]
pub struct BundleDocument {
    pub source: String,
    pub value: Value,
}

/// An overlay that was not admitted
#[derive(Debug)]
pub struct RejectedOverlay {
    pub source: String,
    pub overlay: Option<OverlayRef>,
    pub reason: RejectReason,
}

/// Outcome of `load_into_registry`
#[derive(Debug, Default)]
pub struct LoadReport {
    pub registered: Vec<OverlayRef>,
    pub rejected: Vec<RejectedOverlay>,
}

/// Read every overlay document under `path`
pub fn read_bundle(path: &Path) -> Result<Vec<BundleDocument>, BundleError> {
    if !path.exists() {
        return Err(BundleError::NotFound(path.to_path_buf()));
    }

    if path.is_file() {
        return read_file(path);
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry?;
        let is_json = entry.path().extension().map_or(false, |ext| ext == "json");
        if entry.file_type().is_file() && is_json {
            documents.extend(read_file(entry.path())?);
        }
    }
    Ok(documents)
}

/// Decode every overlay under `path`, failing on the first undecodable one
pub fn load_bundle(path: &Path) -> Result<Vec<SignedOverlaySpec>, crate::OverlayError> {
    read_bundle(path)?
        .into_iter()
        .map(|doc| decode(&doc.value).map_err(crate::OverlayError::from))
        .collect()
}

/// Admit and register every overlay under `path`
pub fn load_into_registry(
    registry: &OverlayRegistry,
    path: &Path,
    options: &LoadOptions,
) -> Result<LoadReport, BundleError> {
    let mut report = LoadReport::default();

    for document in read_bundle(path)? {
        let overlay_ref = overlay_ref_hint(&document.value);
        match admit(registry, &document.value, options) {
            Ok(registered) => report.registered.push(registered),
            Err(reason) => {
                warn!(source = %document.source, reason = %reason, "rejected bundle overlay");
                report.rejected.push(RejectedOverlay {
                    source: document.source,
                    overlay: overlay_ref,
                    reason,
                });
            }
        }
    }

    info!(
        path = %path.display(),
        registered = report.registered.len(),
        rejected = report.rejected.len(),
        "loaded overlay bundle"
    );
    Ok(report)
}

fn admit(
    registry: &OverlayRegistry,
    value: &Value,
    options: &LoadOptions,
) -> Result<OverlayRef, RejectReason> {
    let overlay = decode(value)?;

    if options.reject_expired && overlay.is_expired_at(Utc::now()) {
        return Err(RejectReason::Expired);
    }

    if let Some(signature) = &overlay.signature {
        if options.verify_signatures && signature.has_signature() && !signer::verify(&overlay)? {
            return Err(RejectReason::SignatureInvalid);
        }

        if !options.trusted_key_fingerprints.is_empty() && signature.has_signature() {
            let fingerprint = signer::key_fingerprint(&signature.public_key)?;
            if !options.trusted_key_fingerprints.contains(&fingerprint) {
                return Err(RejectReason::UntrustedKey { fingerprint });
            }
        }
    }

    let entry = registry.register(overlay, &options.register)?;
    Ok(entry.overlay.spec.overlay_ref())
}

/// Structural checks run later, at registration
fn decode(value: &Value) -> Result<SignedOverlaySpec, SchemaMismatchError> {
    validator::check_modification_tags(value)?;
    Ok(serde_json::from_value(value.clone())?)
}

fn overlay_ref_hint(value: &Value) -> Option<OverlayRef> {
    let overlay_id = value.get("overlayId")?.as_str()?;
    let version = value.get("version")?.as_str()?;
    Some(OverlayRef {
        overlay_id: overlay_id.to_string(),
        version: version.to_string(),
    })
}

fn read_file(path: &Path) -> Result<Vec<BundleDocument>, BundleError> {
    let contents = fs::read_to_string(path).map_err(|source| BundleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&contents).map_err(|source| BundleError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let display = path.display().to_string();
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, value)| BundleDocument {
                source: format!("{}#{}", display, index),
                value,
            })
            .collect(),
        value => vec![BundleDocument {
            source: display,
            value,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn overlay_json(id: &str) -> Value {
        json!({
            "overlayId": id,
            "version": "1",
            "appliesTo": {"dataView": "customerForm"},
            "modifications": [{"type": "hideField", "field": "ssn"}]
        })
    }

    #[test]
    fn test_read_single_and_array_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let single = dir.path().join("single.json");
        let many = dir.path().join("many.json");
        fs::write(&single, overlay_json("a").to_string()).unwrap();
        fs::write(&many, json!([overlay_json("b"), overlay_json("c")]).to_string()).unwrap();

        assert_eq!(read_bundle(&single).unwrap().len(), 1);

        let docs = read_bundle(&many).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[1].source.ends_with("many.json#1"));
    }

    #[test]
    fn test_read_directory_sorted_json_only() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("b.json"), overlay_json("b").to_string()).unwrap();
        fs::write(dir.path().join("a.json"), overlay_json("a").to_string()).unwrap();
        fs::write(dir.path().join("nested/c.json"), overlay_json("c").to_string()).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let ids: Vec<String> = read_bundle(dir.path())
            .unwrap()
            .iter()
            .map(|d| d.value["overlayId"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_missing_path() {
        let err = read_bundle(Path::new("/nonexistent/overlays")).unwrap_err();
        assert!(matches!(err, BundleError::NotFound(_)));
    }

    #[test]
    fn test_invalid_json_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(read_bundle(&path), Err(BundleError::Json { .. })));
    }

    #[test]
    fn test_unknown_variant_rejected_per_overlay() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut bad = overlay_json("bad");
        bad["modifications"] = json!([{"type": "deleteField", "field": "ssn"}]);
        let path = dir.path().join("bundle.json");
        fs::write(&path, json!([bad, overlay_json("good")]).to_string()).unwrap();

        let registry = OverlayRegistry::new();
        let options = LoadOptions {
            register: RegisterOptions {
                allow_unsigned: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let report = load_into_registry(&registry, &path, &options).unwrap();

        assert_eq!(report.registered.len(), 1);
        assert_eq!(report.rejected.len(), 1);
        assert!(matches!(
            report.rejected[0].reason,
            RejectReason::SchemaMismatch(SchemaMismatchError::UnknownModification { .. })
        ));
        assert_eq!(
            report.rejected[0].overlay.as_ref().map(|r| r.overlay_id.as_str()),
            Some("bad")
        );
    }

    #[test]
    fn test_structural_problems_rejected_by_registration() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut blank = overlay_json("blank-field");
        blank["modifications"] = json!([{"type": "hideField", "field": " "}]);
        let path = dir.path().join("o.json");
        fs::write(&path, blank.to_string()).unwrap();

        assert!(decode(&blank).is_ok());

        let registry = OverlayRegistry::new();
        let options = LoadOptions {
            register: RegisterOptions {
                allow_unsigned: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let report = load_into_registry(&registry, &path, &options).unwrap();
        assert!(matches!(
            report.rejected[0].reason,
            RejectReason::Registry(RegistryError::Validation(_))
        ));
    }

    #[test]
    fn test_unsigned_rejected_without_allow_unsigned() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("o.json");
        fs::write(&path, overlay_json("a").to_string()).unwrap();

        let registry = OverlayRegistry::new();
        let report = load_into_registry(&registry, &path, &LoadOptions::default()).unwrap();

        assert!(report.registered.is_empty());
        assert!(matches!(
            report.rejected[0].reason,
            RejectReason::Registry(RegistryError::SignatureMissing { .. })
        ));
    }

    #[test]
    fn test_load_bundle_decodes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("o.json");
        fs::write(&path, json!([overlay_json("a"), overlay_json("b")]).to_string()).unwrap();

        let overlays = load_bundle(&path).unwrap();
        assert_eq!(overlays.len(), 2);
        assert_eq!(overlays[1].spec.overlay_id, "b");
    }
}
