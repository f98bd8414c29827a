//! Uniform signing capability behind every account key variant.

use std::{fmt, sync::Arc};

use async_trait::async_trait;

use crate::{
    crypto::{HashAlgorithm, PrivateKey, PublicKey, SignatureAlgorithm, der_to_raw_signature},
    error::SignerError,
    keys::{KmsClient, KmsResourceId},
};

/// Produces `r || s` signatures over messages under a known algorithm pair.
///
/// Implementations hash the message with [`Signer::hash_algorithm`] first.
#[async_trait]
pub trait Signer: Send + Sync + fmt::Debug {
    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignerError>;

    fn signature_algorithm(&self) -> SignatureAlgorithm;

    fn hash_algorithm(&self) -> HashAlgorithm;

    async fn public_key(&self) -> Result<PublicKey, SignerError>;
}

/// Signs with key material held in process memory.
#[derive(Debug, Clone)]
pub struct InMemorySigner {
    key: PrivateKey,
    hash: HashAlgorithm,
}

impl InMemorySigner {
    pub fn new(key: PrivateKey, hash: HashAlgorithm) -> Self {
        Self { key, hash }
    }
}

#[async_trait]
impl Signer for InMemorySigner {
    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        self.key.sign_prehash(&self.hash.hash(message))
    }

    fn signature_algorithm(&self) -> SignatureAlgorithm {
        self.key.algorithm()
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash
    }

    async fn public_key(&self) -> Result<PublicKey, SignerError> {
        Ok(self.key.public_key())
    }
}

/// Signs remotely through a cloud KMS; no key material is held in process.
#[derive(Clone)]
pub struct KmsSigner {
    client: Arc<dyn KmsClient>,
    resource: KmsResourceId,
    algorithm: SignatureAlgorithm,
    hash: HashAlgorithm,
}

impl KmsSigner {
    pub fn new(
        client: Arc<dyn KmsClient>,
        resource: KmsResourceId,
        algorithm: SignatureAlgorithm,
        hash: HashAlgorithm,
    ) -> Self {
        Self {
            client,
            resource,
            algorithm,
            hash,
        }
    }
}

impl fmt::Debug for KmsSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KmsSigner")
            .field("resource", &self.resource.to_string())
            .field("algorithm", &self.algorithm)
            .field("hash", &self.hash)
            .finish()
    }
}

#[async_trait]
impl Signer for KmsSigner {
    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        let digest = self.hash.hash(message);
        tracing::debug!(resource = %self.resource, "Requesting KMS signature");
        let der = self.client.asymmetric_sign(&self.resource, &digest).await?;
        der_to_raw_signature(self.algorithm, &der)
    }

    fn signature_algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash
    }

    async fn public_key(&self) -> Result<PublicKey, SignerError> {
        let pem = self.client.public_key_pem(&self.resource).await?;
        PublicKey::from_pem(self.algorithm, &pem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_signer_verifies() {
        let key = PrivateKey::from_hex(
            SignatureAlgorithm::EcdsaSecp256k1,
            "2272967fd2bd75234ae9037dd4694c1f00baad63a10c35172bf65fbb8ad74b47",
        )
        .unwrap();
        let signer = InMemorySigner::new(key, HashAlgorithm::Sha2_256);

        let signature = signer.sign(b"payload").await.unwrap();
        let public = signer.public_key().await.unwrap();

        assert_eq!(signer.signature_algorithm(), SignatureAlgorithm::EcdsaSecp256k1);
        assert!(public.verify(HashAlgorithm::Sha2_256, b"payload", &signature));
        assert!(!format!("{signer:?}").contains("2272967f"));
    }
}
