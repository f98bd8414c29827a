//! Signature and hash algorithms supported by Flow account keys.

use std::fmt;

use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use serde::{Deserialize, Serialize};
use sha3::Digest;

use crate::error::SignerError;

/// Length in bytes of an encoded `r || s` signature.
pub const SIGNATURE_LENGTH: usize = 64;

/// Length in bytes of an encoded public key (uncompressed point without the SEC1 tag).
pub const PUBLIC_KEY_LENGTH: usize = 64;

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    Serialize,
    Deserialize,
)]
pub enum SignatureAlgorithm {
    #[default]
    #[strum(serialize = "ECDSA_P256")]
    #[serde(rename = "ECDSA_P256")]
    EcdsaP256,
    #[strum(serialize = "ECDSA_secp256k1")]
    #[serde(rename = "ECDSA_secp256k1")]
    EcdsaSecp256k1,
}

impl SignatureAlgorithm {
    /// Numeric code used on the wire.
    pub fn code(self) -> u32 {
        match self {
            SignatureAlgorithm::EcdsaP256 => 2,
            SignatureAlgorithm::EcdsaSecp256k1 => 3,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            2 => Some(SignatureAlgorithm::EcdsaP256),
            3 => Some(SignatureAlgorithm::EcdsaSecp256k1),
            _ => None,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    Serialize,
    Deserialize,
)]
pub enum HashAlgorithm {
    #[default]
    #[strum(serialize = "SHA3_256")]
    #[serde(rename = "SHA3_256")]
    Sha3_256,
    #[strum(serialize = "SHA2_256")]
    #[serde(rename = "SHA2_256")]
    Sha2_256,
}

impl HashAlgorithm {
    pub fn code(self) -> u32 {
        match self {
            HashAlgorithm::Sha2_256 => 1,
            HashAlgorithm::Sha3_256 => 3,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(HashAlgorithm::Sha2_256),
            3 => Some(HashAlgorithm::Sha3_256),
            _ => None,
        }
    }

    /// Digest `message` into a 32-byte prehash.
    pub fn hash(self, message: &[u8]) -> [u8; 32] {
        match self {
            HashAlgorithm::Sha3_256 => sha3::Sha3_256::digest(message).into(),
            HashAlgorithm::Sha2_256 => sha2::Sha256::digest(message).into(),
        }
    }
}

/// In-process private key material.
#[derive(Clone)]
pub enum PrivateKey {
    P256(p256::ecdsa::SigningKey),
    Secp256k1(k256::ecdsa::SigningKey),
}

impl PrivateKey {
    /// Decode a 32-byte scalar from hex, with or without `0x`.
    pub fn from_hex(algorithm: SignatureAlgorithm, value: &str) -> Result<Self, SignerError> {
        let invalid = || SignerError::InvalidPrivateKey {
            algorithm: algorithm.to_string(),
        };
        let bytes = hex::decode(value.trim().trim_start_matches("0x")).map_err(|_| invalid())?;

        match algorithm {
            SignatureAlgorithm::EcdsaP256 => p256::ecdsa::SigningKey::from_slice(&bytes)
                .map(PrivateKey::P256)
                .map_err(|_| invalid()),
            SignatureAlgorithm::EcdsaSecp256k1 => k256::ecdsa::SigningKey::from_slice(&bytes)
                .map(PrivateKey::Secp256k1)
                .map_err(|_| invalid()),
        }
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            PrivateKey::P256(_) => SignatureAlgorithm::EcdsaP256,
            PrivateKey::Secp256k1(_) => SignatureAlgorithm::EcdsaSecp256k1,
        }
    }

    /// Lowercase hex of the scalar, without prefix.
    pub fn to_hex(&self) -> String {
        match self {
            PrivateKey::P256(key) => hex::encode(key.to_bytes()),
            PrivateKey::Secp256k1(key) => hex::encode(key.to_bytes()),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            PrivateKey::P256(key) => PublicKey::P256(key.verifying_key().clone()),
            PrivateKey::Secp256k1(key) => PublicKey::Secp256k1(key.verifying_key().clone()),
        }
    }

    /// Sign a 32-byte digest, returning `r || s`.
    pub fn sign_prehash(&self, digest: &[u8]) -> Result<Vec<u8>, SignerError> {
        let signing = |e: p256::ecdsa::Error| SignerError::Signing {
            reason: e.to_string(),
        };
        match self {
            PrivateKey::P256(key) => {
                let signature: p256::ecdsa::Signature = key.sign_prehash(digest).map_err(signing)?;
                Ok(signature.to_bytes().to_vec())
            }
            PrivateKey::Secp256k1(key) => {
                let signature: k256::ecdsa::Signature = key.sign_prehash(digest).map_err(signing)?;
                Ok(signature.to_bytes().to_vec())
            }
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({}, <redacted>)", self.algorithm())
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm() == other.algorithm() && self.to_hex() == other.to_hex()
    }
}

impl Eq for PrivateKey {}

/// A public key able to verify account signatures.
#[derive(Clone, PartialEq, Eq)]
pub enum PublicKey {
    P256(p256::ecdsa::VerifyingKey),
    Secp256k1(k256::ecdsa::VerifyingKey),
}

impl PublicKey {
    /// Decode a 64-byte uncompressed point (optionally with `0x` or the `04` tag).
    pub fn from_hex(algorithm: SignatureAlgorithm, value: &str) -> Result<Self, SignerError> {
        let invalid = |reason: String| SignerError::InvalidPublicKey { reason };
        let mut bytes = hex::decode(value.trim().trim_start_matches("0x"))
            .map_err(|e| invalid(e.to_string()))?;
        if bytes.len() == PUBLIC_KEY_LENGTH {
            bytes.insert(0, 0x04);
        }

        match algorithm {
            SignatureAlgorithm::EcdsaP256 => p256::ecdsa::VerifyingKey::from_sec1_bytes(&bytes)
                .map(PublicKey::P256)
                .map_err(|e| invalid(e.to_string())),
            SignatureAlgorithm::EcdsaSecp256k1 => {
                k256::ecdsa::VerifyingKey::from_sec1_bytes(&bytes)
                    .map(PublicKey::Secp256k1)
                    .map_err(|e| invalid(e.to_string()))
            }
        }
    }

    /// Decode a PEM `SubjectPublicKeyInfo`, as returned by cloud KMS.
    pub fn from_pem(algorithm: SignatureAlgorithm, pem: &str) -> Result<Self, SignerError> {
        use p256::pkcs8::DecodePublicKey;

        let invalid = |reason: String| SignerError::InvalidPublicKey { reason };
        match algorithm {
            SignatureAlgorithm::EcdsaP256 => p256::ecdsa::VerifyingKey::from_public_key_pem(pem)
                .map(PublicKey::P256)
                .map_err(|e| invalid(e.to_string())),
            SignatureAlgorithm::EcdsaSecp256k1 => {
                k256::ecdsa::VerifyingKey::from_public_key_pem(pem)
                    .map(PublicKey::Secp256k1)
                    .map_err(|e| invalid(e.to_string()))
            }
        }
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            PublicKey::P256(_) => SignatureAlgorithm::EcdsaP256,
            PublicKey::Secp256k1(_) => SignatureAlgorithm::EcdsaSecp256k1,
        }
    }

    /// 64 bytes of `x || y`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let point = match self {
            PublicKey::P256(key) => key.to_encoded_point(false).as_bytes().to_vec(),
            PublicKey::Secp256k1(key) => key.to_encoded_point(false).as_bytes().to_vec(),
        };
        point[1..].to_vec()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Verify an `r || s` signature over `message` hashed with `hash`.
    pub fn verify(&self, hash: HashAlgorithm, message: &[u8], signature: &[u8]) -> bool {
        let digest = hash.hash(message);
        match self {
            PublicKey::P256(key) => p256::ecdsa::Signature::from_slice(signature)
                .map(|sig| key.verify_prehash(&digest, &sig).is_ok())
                .unwrap_or(false),
            PublicKey::Secp256k1(key) => k256::ecdsa::Signature::from_slice(signature)
                .map(|sig| key.verify_prehash(&digest, &sig).is_ok())
                .unwrap_or(false),
        }
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}, {})", self.algorithm(), self.to_hex())
    }
}

/// Convert a DER-encoded ECDSA signature into `r || s`.
pub fn der_to_raw_signature(
    algorithm: SignatureAlgorithm,
    der: &[u8],
) -> Result<Vec<u8>, SignerError> {
    let signing = |e: p256::ecdsa::Error| SignerError::Signing {
        reason: format!("malformed DER signature: {e}"),
    };
    match algorithm {
        SignatureAlgorithm::EcdsaP256 => Ok(p256::ecdsa::Signature::from_der(der)
            .map_err(signing)?
            .to_bytes()
            .to_vec()),
        SignatureAlgorithm::EcdsaSecp256k1 => Ok(k256::ecdsa::Signature::from_der(der)
            .map_err(signing)?
            .to_bytes()
            .to_vec()),
    }
}
