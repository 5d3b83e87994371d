//! Certificate manager tests: margin-based reuse, refresh attempts, and
//! the no-certificate terminal condition.
//!
//! The API client points at an unroutable endpoint, so any observed
//! `RefreshFailed` proves a refresh was attempted and any `Reused` proves
//! no network call happened.

use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;

use eipsync::api::ApiClient;
use eipsync::cert::{ensure_certificate, CertError, CertInspector, CertStatus};

struct FixedExpiry(DateTime<Utc>);

impl CertInspector for FixedExpiry {
    fn not_after(&self, _pem: &[u8]) -> Result<DateTime<Utc>, CertError> {
        Ok(self.0)
    }
}

fn dead_api() -> ApiClient {
    let key = rcgen::KeyPair::generate().unwrap();
    let ca_pem = rcgen::CertificateParams::new(vec![])
        .unwrap()
        .self_signed(&key)
        .unwrap()
        .pem();
    ApiClient::new("https://127.0.0.1:1/", ca_pem.as_bytes()).unwrap()
}

fn cached_cert(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("cert.pem");
    std::fs::write(&path, "-----BEGIN CERTIFICATE-----\nstub\n-----END CERTIFICATE-----\n")
        .unwrap();
    path
}

#[tokio::test]
async fn comfortably_valid_cert_is_reused_without_a_network_call() {
    let dir = tempfile::tempdir().unwrap();
    let cert_path = cached_cert(&dir);
    let inspector = FixedExpiry(Utc::now() + Duration::days(30));

    let status = ensure_certificate(&dead_api(), &inspector, &cert_path, 7, false)
        .await
        .unwrap();

    assert_eq!(status, CertStatus::Reused);
}

#[tokio::test]
async fn cert_inside_the_margin_triggers_a_refresh_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let cert_path = cached_cert(&dir);
    let inspector = FixedExpiry(Utc::now() + Duration::days(2));

    let status = ensure_certificate(&dead_api(), &inspector, &cert_path, 7, false)
        .await
        .unwrap();

    // The endpoint is unroutable, so an attempted refresh must surface as
    // RefreshFailed while the cached certificate stays in service.
    assert_eq!(status, CertStatus::RefreshFailed);
    assert!(cert_path.exists());
}

#[tokio::test]
async fn refresh_failure_is_not_a_change() {
    let dir = tempfile::tempdir().unwrap();
    let cert_path = cached_cert(&dir);
    let inspector = FixedExpiry(Utc::now() + Duration::days(2));

    let status = ensure_certificate(&dead_api(), &inspector, &cert_path, 7, false)
        .await
        .unwrap();

    assert!(!status.changed());
}

#[tokio::test]
async fn force_skips_the_expiry_check() {
    let dir = tempfile::tempdir().unwrap();
    let cert_path = cached_cert(&dir);
    let inspector = FixedExpiry(Utc::now() + Duration::days(300));

    let status = ensure_certificate(&dead_api(), &inspector, &cert_path, 7, true)
        .await
        .unwrap();

    assert_eq!(status, CertStatus::RefreshFailed);
}

#[tokio::test]
async fn no_cached_cert_and_failed_refresh_is_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let cert_path = dir.path().join("cert.pem");
    let inspector = FixedExpiry(Utc::now());

    let err = ensure_certificate(&dead_api(), &inspector, &cert_path, 7, false)
        .await
        .unwrap_err();

    assert!(matches!(err, CertError::NoCertificate(_)));
}
