//! Signer - canonicalization and detached signatures for overlays
//!
//! The signed payload is the RFC 8785 (JCS) canonical JSON of the overlay with
//! the signature block excluded. `sign` and `verify` share `canonicalize`, so
//! any implementation using JCS over the same wire shape interoperates.
//!
//! - ed25519: pure EdDSA over the canonical bytes (no pre-hash)
//! - rsa-pss-sha256: SHA-256 digest, PSS padding, 32-byte salt
//!
//! Verification does not look at `expiresAt`; see
//! `SignedOverlaySpec::is_expired_at` for callers that enforce expiry.

mod keys;

pub use keys::{key_fingerprint, SigningKeyMaterial};

use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signer as _, Verifier as _};
use overlay_spec::{Metadata, OverlaySignature, OverlaySpec, SignedOverlaySpec};
use rsa::signature::{RandomizedSigner as _, SignatureEncoding as _};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

/// PSS salt length in bytes for rsa-pss-sha256
pub const RSA_PSS_SALT_LEN: usize = 32;

/// Errors from signing/verification operations
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("overlay {overlay} has no signature")]
    MissingSignature { overlay: String },

    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("signing key is {key}, but {requested} was requested")]
    KeyAlgorithmMismatch {
        requested: SignatureAlgorithm,
        key: SignatureAlgorithm,
    },

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("canonicalization failed: {0}")]
    Canonicalization(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Result type for signing operations
pub type SignerResult<T> = Result<T, SignerError>;

/// Supported signature algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SignatureAlgorithm {
    #[default]
    Ed25519,
    RsaPssSha256,
}

impl SignatureAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ed25519 => "ed25519",
            Self::RsaPssSha256 => "rsa-pss-sha256",
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = SignerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ed25519" => Ok(Self::Ed25519),
            "rsa-pss-sha256" => Ok(Self::RsaPssSha256),
            other => Err(SignerError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Options for `sign`
#[derive(Debug, Clone, Default)]
pub struct SignOptions {
    /// Defaults to the key's own algorithm
    pub algorithm: Option<SignatureAlgorithm>,
    pub key_id: Option<String>,
    /// Defaults to now
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Published instead of the key derived from the private key
    pub public_key_override: Option<String>,
    pub metadata: Option<Metadata>,
}

/// Deterministic signed payload: JCS of every spec field, signature excluded
pub fn canonicalize(spec: &OverlaySpec) -> SignerResult<Vec<u8>> {
    serde_json_canonicalizer::to_vec(spec).map_err(|e| SignerError::Canonicalization(e.to_string()))
}

/// Sign an overlay spec, attaching a detached signature block
pub fn sign(
    spec: &OverlaySpec,
    key: &SigningKeyMaterial,
    options: &SignOptions,
) -> SignerResult<SignedOverlaySpec> {
    let algorithm = options.algorithm.unwrap_or_else(|| key.algorithm());
    if algorithm != key.algorithm() {
        return Err(SignerError::KeyAlgorithmMismatch {
            requested: algorithm,
            key: key.algorithm(),
        });
    }

    let payload = canonicalize(spec)?;

    let signature_bytes = match key {
        SigningKeyMaterial::Ed25519(signing_key) => signing_key.sign(&payload).to_bytes().to_vec(),
        SigningKeyMaterial::Rsa(private_key) => {
            let signing_key = rsa::pss::BlindedSigningKey::<Sha256>::new_with_salt_len(
                private_key.as_ref().clone(),
                RSA_PSS_SALT_LEN,
            );
            signing_key
                .try_sign_with_rng(&mut rand::thread_rng(), &payload)
                .map_err(|e| SignerError::Signing(e.to_string()))?
                .to_vec()
        }
    };

    let public_key = match &options.public_key_override {
        Some(pem) => pem.clone(),
        None => key.public_key_pem()?,
    };

    debug!(
        overlay_id = %spec.overlay_id,
        version = %spec.version,
        algorithm = %algorithm,
        "signed overlay"
    );

    Ok(SignedOverlaySpec {
        spec: spec.clone(),
        signature: Some(OverlaySignature {
            algorithm: algorithm.as_str().to_string(),
            signature: base64::engine::general_purpose::STANDARD.encode(signature_bytes),
            public_key,
            key_id: options.key_id.clone(),
            issued_at: options.issued_at.unwrap_or_else(Utc::now),
            expires_at: options.expires_at,
            metadata: options.metadata.clone(),
        }),
    })
}

/// Verify a signed overlay against the public key in its signature block
///
/// Returns `Ok(false)` when the signature does not match the canonical spec,
/// including mutations after signing and signature bytes that are not valid
/// base64 or have the wrong length. A malformed `publicKey` is an error.
/// Expiry is not checked.
pub fn verify(signed: &SignedOverlaySpec) -> SignerResult<bool> {
    let signature = match &signed.signature {
        Some(signature) if signature.has_signature() => signature,
        _ => {
            return Err(SignerError::MissingSignature {
                overlay: signed.key(),
            })
        }
    };

    let algorithm: SignatureAlgorithm = signature.algorithm.parse()?;
    let payload = canonicalize(&signed.spec)?;

    let valid = match algorithm {
        SignatureAlgorithm::Ed25519 => {
            let verifying_key = keys::ed25519_public_key(&signature.public_key)?;
            decode_signature(signed, &signature.signature, |bytes| {
                ed25519_dalek::Signature::from_slice(bytes).map_err(|e| e.to_string())
            })
            .map_or(false, |sig| verifying_key.verify(&payload, &sig).is_ok())
        }
        SignatureAlgorithm::RsaPssSha256 => {
            let public_key = keys::rsa_public_key(&signature.public_key)?;
            let verifying_key =
                rsa::pss::VerifyingKey::<Sha256>::new_with_salt_len(public_key, RSA_PSS_SALT_LEN);
            decode_signature(signed, &signature.signature, |bytes| {
                rsa::pss::Signature::try_from(bytes).map_err(|e| e.to_string())
            })
            .map_or(false, |sig| verifying_key.verify(&payload, &sig).is_ok())
        }
    };

    debug!(overlay = %signed.key(), algorithm = %algorithm, valid, "verified overlay signature");
    Ok(valid)
}

/// Base64-decode and parse signature bytes; `None` when they are malformed
fn decode_signature<S>(
    signed: &SignedOverlaySpec,
    encoded: &str,
    parse: impl FnOnce(&[u8]) -> Result<S, String>,
) -> Option<S> {
    let parsed = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| e.to_string())
        .and_then(|bytes| parse(&bytes));

    match parsed {
        Ok(sig) => Some(sig),
        Err(error) => {
            debug!(overlay = %signed.key(), %error, "malformed signature bytes");
            None
        }
    }
}
