//! Overlay Engine - signed, context-scoped customizations for renderables
//!
//! Overlays hide, relabel, reorder and otherwise adjust the fields of a shared
//! renderable per tenant, role, user, device or tag, without touching its
//! canonical definition. Overlays are signed over their canonical JSON form,
//! registered in memory, resolved by request context in ascending
//! specificity, and merged deterministically.

pub mod bundle;
pub mod config;
pub mod engine;
pub mod error;
pub mod merger;
pub mod registry;
pub mod signer;
pub mod validator;

pub use overlay_spec as spec;
pub use overlay_spec::{
    OverlayAppliesTo, OverlayLookup, OverlayModification, OverlayRef, OverlayRenderable,
    OverlayRenderableField, OverlayScopeContext, OverlaySignature, OverlaySpec, OverlayTargetRef,
    SignedOverlaySpec,
};

pub use bundle::{load_bundle, load_into_registry, LoadOptions, LoadReport};
pub use config::EngineConfig;
pub use engine::{ApplyOutcome, ApplyRequest, AuditSink, OverlayAuditEvent, OverlayEngine};
pub use error::OverlayError;
pub use merger::{MergeError, MergeOptions};
pub use registry::{OverlayRegistry, RegisterOptions, RegistryError};
pub use signer::{canonicalize, sign, verify, SignOptions, SignatureAlgorithm, SigningKeyMaterial};
pub use validator::{assert_valid, validate, validate_json, ValidationResult};
