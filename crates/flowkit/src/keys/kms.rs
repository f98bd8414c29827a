//! Google Cloud KMS resources and REST client.

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Deserialize;

use crate::error::SignerError;

/// Environment variable holding an OAuth access token for the KMS API.
pub const KMS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Default KMS REST endpoint.
pub const KMS_ENDPOINT: &str = "https://cloudkms.googleapis.com";

/// `projects/{p}/locations/{l}/keyRings/{r}/cryptoKeys/{k}/cryptoKeyVersions/{v}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KmsResourceId {
    pub project: String,
    pub location: String,
    pub key_ring: String,
    pub key: String,
    pub version: String,
}

impl FromStr for KmsResourceId {
    type Err = SignerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SignerError::InvalidKmsResource(s.to_string());
        let parts: Vec<&str> = s.trim().trim_matches('/').split('/').collect();
        match parts.as_slice() {
            [
                "projects",
                project,
                "locations",
                location,
                "keyRings",
                key_ring,
                "cryptoKeys",
                key,
                "cryptoKeyVersions",
                version,
            ] if parts.iter().all(|p| !p.is_empty()) => Ok(Self {
                project: project.to_string(),
                location: location.to_string(),
                key_ring: key_ring.to_string(),
                key: key.to_string(),
                version: version.to_string(),
            }),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for KmsResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}/cryptoKeyVersions/{}",
            self.project, self.location, self.key_ring, self.key, self.version
        )
    }
}

/// Remote asymmetric signing operations.
#[async_trait]
pub trait KmsClient: Send + Sync {
    /// Sign a SHA-256 digest, returning a DER-encoded ECDSA signature.
    async fn asymmetric_sign(
        &self,
        resource: &KmsResourceId,
        digest: &[u8; 32],
    ) -> Result<Vec<u8>, SignerError>;

    /// The PEM-encoded public key of the key version.
    async fn public_key_pem(&self, resource: &KmsResourceId) -> Result<String, SignerError>;
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    signature: String,
}

#[derive(Debug, Deserialize)]
struct PublicKeyResponse {
    pem: String,
}

/// Cloud KMS over its REST API with a bearer token.
#[derive(Clone)]
pub struct GcpKmsClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl GcpKmsClient {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Read the access token from [`KMS_TOKEN_ENV`].
    pub fn from_env() -> Result<Self, SignerError> {
        let token = std::env::var(KMS_TOKEN_ENV)
            .map_err(|_| SignerError::MissingCredentials(format!("{KMS_TOKEN_ENV} is not set")))?;
        Ok(Self::new(KMS_ENDPOINT, token))
    }

    fn request_error(resource: &KmsResourceId, reason: impl fmt::Display) -> SignerError {
        SignerError::Kms {
            resource: resource.to_string(),
            reason: reason.to_string(),
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        resource: &KmsResourceId,
        response: reqwest::Response,
    ) -> Result<T, SignerError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::request_error(resource, format!("status {status}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|e| Self::request_error(resource, e))
    }
}

impl fmt::Debug for GcpKmsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcpKmsClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KmsClient for GcpKmsClient {
    async fn asymmetric_sign(
        &self,
        resource: &KmsResourceId,
        digest: &[u8; 32],
    ) -> Result<Vec<u8>, SignerError> {
        let url = format!("{}/v1/{resource}:asymmetricSign", self.endpoint);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "digest": { "sha256": STANDARD.encode(digest) } }))
            .send()
            .await
            .map_err(|e| Self::request_error(resource, e))?;

        let body: SignResponse = Self::decode(resource, response).await?;
        STANDARD
            .decode(body.signature)
            .map_err(|e| Self::request_error(resource, format!("invalid signature encoding: {e}")))
    }

    async fn public_key_pem(&self, resource: &KmsResourceId) -> Result<String, SignerError> {
        let url = format!("{}/v1/{resource}/publicKey", self.endpoint);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| Self::request_error(resource, e))?;

        let body: PublicKeyResponse = Self::decode(resource, response).await?;
        Ok(body.pem)
    }
}
