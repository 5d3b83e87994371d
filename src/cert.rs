//! Client certificate lifecycle: reuse while comfortably valid, refresh
//! from the provider otherwise, never discard a working certificate over
//! a transient network failure.

use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::path::Path;
use thiserror::Error;
use x509_parser::prelude::*;

use crate::api::{ApiClient, ApiError};

#[derive(Debug, Error)]
pub enum CertError {
    #[error("Certificate IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode certificate PEM: {0}")]
    Pem(String),

    #[error("Failed to parse certificate: {0}")]
    Parse(String),

    #[error("No usable certificate: nothing cached and refresh failed: {0}")]
    NoCertificate(#[source] ApiError),
}

/// Outcome of a certificate update pass. Only `Refreshed` counts as a
/// change for the reload decision; `RefreshFailed` means the cached
/// certificate stays in service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertStatus {
    Reused,
    Refreshed,
    RefreshFailed,
}

impl CertStatus {
    pub fn changed(&self) -> bool {
        matches!(self, CertStatus::Refreshed)
    }
}

/// Capability interface for certificate expiry inspection, so tests can
/// substitute deterministic fakes.
pub trait CertInspector: Send + Sync {
    fn not_after(&self, pem: &[u8]) -> Result<DateTime<Utc>, CertError>;
}

/// Production inspector backed by a real X.509 parse.
pub struct X509Inspector;

impl CertInspector for X509Inspector {
    fn not_after(&self, pem: &[u8]) -> Result<DateTime<Utc>, CertError> {
        let der = pem_rfc7468::decode_vec(pem)
            .map_err(|e| CertError::Pem(e.to_string()))?
            .1;
        let (_, certificate) =
            X509Certificate::from_der(&der).map_err(|e| CertError::Parse(e.to_string()))?;

        let timestamp = certificate.validity().not_after.timestamp();
        DateTime::<Utc>::from_timestamp(timestamp, 0)
            .ok_or_else(|| CertError::Parse("expiry timestamp out of range".to_string()))
    }
}

/// Ensure the cached certificate is valid for at least the renewal margin,
/// refreshing it from the provider otherwise.
///
/// A refresh failure with a cached certificate on disk degrades to
/// `RefreshFailed`; with nothing cached it is terminal for the run.
pub async fn ensure_certificate(
    api: &ApiClient,
    inspector: &dyn CertInspector,
    cert_path: &Path,
    renew_margin_days: i64,
    force: bool,
) -> Result<CertStatus, CertError> {
    if !force {
        if let Some(not_after) = cached_expiry(inspector, cert_path)? {
            if not_after > Utc::now() + Duration::days(renew_margin_days) {
                tracing::info!("Reusing cached certificate, expires {}", not_after);
                return Ok(CertStatus::Reused);
            }
            tracing::info!("Cached certificate expires {}, refreshing", not_after);
        }
    }

    let had_cached = cert_path.exists();
    let pem = match api.fetch_certificate().await {
        Ok(pem) => pem,
        Err(err) => {
            if had_cached {
                tracing::error!("Certificate refresh failed, keeping cached copy: {}", err);
                return Ok(CertStatus::RefreshFailed);
            }
            return Err(CertError::NoCertificate(err));
        }
    };

    tracing::info!("Writing new certificate to {}", cert_path.display());
    fs::write(cert_path, &pem)?;
    Ok(CertStatus::Refreshed)
}

/// Expiry of the cached certificate, or `None` when nothing usable is
/// cached. An unreadable cached certificate is due for renewal, not fatal.
fn cached_expiry(
    inspector: &dyn CertInspector,
    cert_path: &Path,
) -> Result<Option<DateTime<Utc>>, CertError> {
    let pem = match fs::read(cert_path) {
        Ok(pem) => pem,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    match inspector.not_after(&pem) {
        Ok(not_after) => Ok(Some(not_after)),
        Err(err) => {
            tracing::warn!(
                "Cached certificate in {} is unreadable ({}), treating as due for renewal",
                cert_path.display(),
                err
            );
            Ok(None)
        }
    }
}
