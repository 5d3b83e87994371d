//! Provider API client. TLS is pinned to the locally provisioned trust
//! anchor; the platform root store is never consulted.

use reqwest::{Certificate, Client};
use std::path::Path;
use thiserror::Error;

use crate::topology::DirectoryDocument;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Failed to read trust anchor: {0}")]
    TrustAnchorRead(#[from] std::io::Error),

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Malformed directory document: {0}")]
    MalformedDocument(#[from] serde_json::Error),
}

impl ApiError {
    /// Integrity failures abort the run; everything else degrades to
    /// "no change".
    pub fn is_integrity(&self) -> bool {
        matches!(self, ApiError::MalformedDocument(_))
    }
}

#[derive(Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, ca_pem: &[u8]) -> Result<Self, ApiError> {
        let ca = Certificate::from_pem(ca_pem).map_err(ApiError::ClientBuild)?;
        let client = Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .add_root_certificate(ca)
            .build()
            .map_err(ApiError::ClientBuild)?;

        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self { client, base_url })
    }

    /// Build a client from the trust anchor on disk.
    pub fn from_trust_anchor(base_url: &str, ca_path: &Path) -> Result<Self, ApiError> {
        let ca_pem = std::fs::read(ca_path)?;
        Self::new(base_url, &ca_pem)
    }

    async fn post(&self, endpoint: &str) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|source| ApiError::Request {
                url: url.clone(),
                source,
            })?;
        Ok(response)
    }

    /// Fetch the gateway directory. The body is parsed separately from the
    /// transfer so a malformed document surfaces as an integrity error
    /// rather than being lumped in with network failures.
    pub async fn fetch_directory(&self) -> Result<DirectoryDocument, ApiError> {
        let url = format!("{}config/eip-service.json", self.base_url);
        let body = self
            .post("config/eip-service.json")
            .await?
            .text()
            .await
            .map_err(|source| ApiError::Request { url, source })?;

        let document = serde_json::from_str(&body)?;
        Ok(document)
    }

    /// Fetch a fresh client certificate; the body is PEM bytes used
    /// verbatim as both certificate and key.
    pub async fn fetch_certificate(&self) -> Result<Vec<u8>, ApiError> {
        let url = format!("{}cert", self.base_url);
        let bytes = self
            .post("cert")
            .await?
            .bytes()
            .await
            .map_err(|source| ApiError::Request { url, source })?;
        Ok(bytes.to_vec())
    }
}
