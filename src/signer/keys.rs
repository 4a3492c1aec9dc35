//! Key material for overlay signing
//!
//! Private keys arrive as raw Ed25519 seeds or PEM (PKCS#8, or PKCS#1 for
//! RSA). Public keys always travel as SPKI PEM inside the signature block.

use base64::Engine as _;
use ed25519_dalek::pkcs8::{DecodePrivateKey as _, DecodePublicKey as _, EncodePublicKey as _};
use rsa::pkcs1::DecodeRsaPrivateKey as _;
use rsa::pkcs8::LineEnding;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use super::{SignatureAlgorithm, SignerError, SignerResult};

/// A private key able to sign overlays
#[derive(Debug, Clone)]
pub enum SigningKeyMaterial {
    Ed25519(ed25519_dalek::SigningKey),
    Rsa(Box<RsaPrivateKey>),
}

impl SigningKeyMaterial {
    /// Ed25519 key from its 32-byte seed
    pub fn ed25519_from_bytes(bytes: &[u8]) -> SignerResult<Self> {
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SignerError::InvalidKey("ed25519 key must be 32 bytes".to_string()))?;
        Ok(Self::Ed25519(ed25519_dalek::SigningKey::from_bytes(&seed)))
    }

    /// Parse a PEM private key, detecting Ed25519 or RSA
    pub fn from_pem(pem: &str) -> SignerResult<Self> {
        if let Ok(key) = ed25519_dalek::SigningKey::from_pkcs8_pem(pem) {
            return Ok(Self::Ed25519(key));
        }
        if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
            return Ok(Self::Rsa(Box::new(key)));
        }
        RsaPrivateKey::from_pkcs1_pem(pem)
            .map(|key| Self::Rsa(Box::new(key)))
            .map_err(|e| SignerError::InvalidKey(format!("unrecognized private key PEM: {}", e)))
    }

    /// Algorithm this key signs with
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            Self::Ed25519(_) => SignatureAlgorithm::Ed25519,
            Self::Rsa(_) => SignatureAlgorithm::RsaPssSha256,
        }
    }

    /// SPKI PEM of the matching public key
    pub fn public_key_pem(&self) -> SignerResult<String> {
        match self {
            Self::Ed25519(key) => key
                .verifying_key()
                .to_public_key_pem(LineEnding::LF)
                .map_err(|e| SignerError::InvalidKey(e.to_string())),
            Self::Rsa(key) => key
                .to_public_key()
                .to_public_key_pem(LineEnding::LF)
                .map_err(|e| SignerError::InvalidKey(e.to_string())),
        }
    }
}

impl From<ed25519_dalek::SigningKey> for SigningKeyMaterial {
    fn from(key: ed25519_dalek::SigningKey) -> Self {
        Self::Ed25519(key)
    }
}

impl From<RsaPrivateKey> for SigningKeyMaterial {
    fn from(key: RsaPrivateKey) -> Self {
        Self::Rsa(Box::new(key))
    }
}

pub(crate) fn ed25519_public_key(pem: &str) -> SignerResult<ed25519_dalek::VerifyingKey> {
    ed25519_dalek::VerifyingKey::from_public_key_pem(pem)
        .map_err(|e| SignerError::InvalidKey(format!("ed25519 public key: {}", e)))
}

pub(crate) fn rsa_public_key(pem: &str) -> SignerResult<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .map_err(|e| SignerError::InvalidKey(format!("rsa public key: {}", e)))
}

/// SHA-256 fingerprint (hex) of a PEM public key's DER body
pub fn key_fingerprint(public_key_pem: &str) -> SignerResult<String> {
    let body: String = public_key_pem
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("-----"))
        .collect();
    if body.is_empty() {
        return Err(SignerError::InvalidKey("empty PEM body".to_string()));
    }

    let der = base64::engine::general_purpose::STANDARD.decode(body)?;
    let mut hasher = Sha256::new();
    hasher.update(&der);
    Ok(hex::encode(hasher.finalize()))
}
