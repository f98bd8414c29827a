//! Account key variants and the factory that builds them from configuration.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::{
    config::{self, KMS_RESOURCE_ID_FIELD, PRIVATE_KEY_FIELD},
    crypto::{HashAlgorithm, PrivateKey, SignatureAlgorithm},
    error::{ConfigError, SignerError},
    signer::{InMemorySigner, KmsSigner, Signer},
};

mod kms;
pub use kms::{GcpKmsClient, KMS_ENDPOINT, KMS_TOKEN_ENV, KmsClient, KmsResourceId};

/// Supported key variants, by configuration tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::EnumIter)]
pub enum KeyType {
    #[strum(serialize = "hex")]
    Hex,
    #[strum(serialize = "google-kms")]
    GoogleKms,
}

/// Collaborators a key may need to produce its signer.
#[derive(Clone, Default)]
pub struct KeyContext {
    kms_client: Option<Arc<dyn KmsClient>>,
}

impl KeyContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kms_client(mut self, client: Arc<dyn KmsClient>) -> Self {
        self.kms_client = Some(client);
        self
    }

    fn kms_client(&self) -> Result<Arc<dyn KmsClient>, SignerError> {
        match &self.kms_client {
            Some(client) => Ok(client.clone()),
            None => Ok(Arc::new(GcpKmsClient::from_env()?)),
        }
    }
}

impl std::fmt::Debug for KeyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyContext")
            .field("kms_client", &self.kms_client.is_some())
            .finish()
    }
}

/// A private key held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexAccountKey {
    pub index: u32,
    pub hash_algorithm: HashAlgorithm,
    pub private_key: PrivateKey,
}

/// A key version in Google Cloud KMS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmsAccountKey {
    pub index: u32,
    pub signature_algorithm: SignatureAlgorithm,
    pub hash_algorithm: HashAlgorithm,
    pub resource: KmsResourceId,
}

/// A runtime account key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountKey {
    Hex(HexAccountKey),
    CloudKms(KmsAccountKey),
}

impl AccountKey {
    pub fn hex(index: u32, private_key: PrivateKey, hash_algorithm: HashAlgorithm) -> Self {
        AccountKey::Hex(HexAccountKey {
            index,
            hash_algorithm,
            private_key,
        })
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            AccountKey::Hex(_) => KeyType::Hex,
            AccountKey::CloudKms(_) => KeyType::GoogleKms,
        }
    }

    pub fn index(&self) -> u32 {
        match self {
            AccountKey::Hex(key) => key.index,
            AccountKey::CloudKms(key) => key.index,
        }
    }

    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        match self {
            AccountKey::Hex(key) => key.private_key.algorithm(),
            AccountKey::CloudKms(key) => key.signature_algorithm,
        }
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        match self {
            AccountKey::Hex(key) => key.hash_algorithm,
            AccountKey::CloudKms(key) => key.hash_algorithm,
        }
    }

    /// A signer bound to this key's algorithms.
    pub fn signer(&self, ctx: &KeyContext) -> Result<Arc<dyn Signer>, SignerError> {
        match self {
            AccountKey::Hex(key) => Ok(Arc::new(InMemorySigner::new(
                key.private_key.clone(),
                key.hash_algorithm,
            ))),
            AccountKey::CloudKms(key) => Ok(Arc::new(KmsSigner::new(
                ctx.kms_client()?,
                key.resource.clone(),
                key.signature_algorithm,
                key.hash_algorithm,
            ))),
        }
    }

    /// Project back to the canonical configuration form.
    pub fn to_config(&self) -> config::AccountKey {
        let context = match self {
            AccountKey::Hex(key) => IndexMap::from([(
                PRIVATE_KEY_FIELD.to_string(),
                key.private_key.to_hex(),
            )]),
            AccountKey::CloudKms(key) => IndexMap::from([(
                KMS_RESOURCE_ID_FIELD.to_string(),
                key.resource.to_string(),
            )]),
        };
        config::AccountKey {
            key_type: self.key_type().to_string(),
            index: self.index(),
            signature_algorithm: self.signature_algorithm(),
            hash_algorithm: self.hash_algorithm(),
            context,
        }
    }
}

fn context_field<'a>(key: &'a config::AccountKey, field: &str) -> Result<&'a str, ConfigError> {
    key.context
        .get(field)
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingContextField {
            field: field.to_string(),
        })
}

/// Build a runtime key from its configuration, dispatching on the type tag.
pub fn new_account_key(key: &config::AccountKey) -> Result<AccountKey, ConfigError> {
    let key_type: KeyType = key
        .key_type
        .parse()
        .map_err(|_| ConfigError::InvalidKeyType(key.key_type.clone()))?;

    match key_type {
        KeyType::Hex => {
            let raw = context_field(key, PRIVATE_KEY_FIELD)?;
            let private_key = PrivateKey::from_hex(key.signature_algorithm, raw).map_err(|e| {
                ConfigError::InvalidKey {
                    reason: e.to_string(),
                }
            })?;
            Ok(AccountKey::Hex(HexAccountKey {
                index: key.index,
                hash_algorithm: key.hash_algorithm,
                private_key,
            }))
        }
        KeyType::GoogleKms => {
            let resource = context_field(key, KMS_RESOURCE_ID_FIELD)?
                .parse::<KmsResourceId>()
                .map_err(|e| ConfigError::InvalidKey {
                    reason: e.to_string(),
                })?;
            if key.hash_algorithm != HashAlgorithm::Sha2_256 {
                return Err(ConfigError::InvalidKey {
                    reason: format!(
                        "KMS keys sign SHA-256 digests, got hash algorithm {}",
                        key.hash_algorithm
                    ),
                });
            }
            Ok(AccountKey::CloudKms(KmsAccountKey {
                index: key.index,
                signature_algorithm: key.signature_algorithm,
                hash_algorithm: key.hash_algorithm,
                resource,
            }))
        }
    }
}
