//! Crate-level error type
//!
//! Each module owns its error enum; `OverlayError` gathers them for callers
//! (the CLI, bundle decoding) that cross module boundaries.

use thiserror::Error;

use crate::bundle::BundleError;
use crate::config::ConfigError;
use crate::merger::MergeError;
use crate::registry::RegistryError;
use crate::signer::SignerError;
use crate::validator::{SchemaMismatchError, StructuralValidationError};

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error(transparent)]
    Validation(#[from] StructuralValidationError),

    #[error("internal schema mismatch: {0}")]
    SchemaMismatch(#[from] SchemaMismatchError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OverlayError>;
