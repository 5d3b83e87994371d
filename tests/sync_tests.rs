//! End-to-end synchronization scenarios with a deterministic prober.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use eipsync::api::ApiClient;
use eipsync::cert::{CertError, CertInspector};
use eipsync::probe::{ProbeResult, ProbeRunner};
use eipsync::settings::Settings;
use eipsync::sync::{build_profile, run, update_profile};
use eipsync::topology::DirectoryDocument;

struct FakeProbeRunner(HashMap<String, ProbeResult>);

impl FakeProbeRunner {
    fn new(stats: &[(&str, f64, f64)]) -> Self {
        Self(
            stats
                .iter()
                .map(|(host, loss, latency)| {
                    (
                        host.to_string(),
                        ProbeResult {
                            packet_loss: *loss,
                            latency_ms: *latency,
                        },
                    )
                })
                .collect(),
        )
    }
}

#[async_trait]
impl ProbeRunner for FakeProbeRunner {
    async fn probe(&self, host: &str) -> ProbeResult {
        self.0
            .get(host)
            .copied()
            .unwrap_or(ProbeResult::UNREACHABLE)
    }
}

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

/// Two gateways in the allowed country, one in an excluded country, and
/// one allowed gateway that only offers the disallowed port 53.
fn directory_fixture() -> DirectoryDocument {
    serde_json::from_str(
        r#"{
            "locations": {
                "seattle": {"country_code": "US"},
                "newyork": {"country_code": "US"},
                "paris": {"country_code": "FR"}
            },
            "gateways": [
                {"ip_address": "10.0.0.1", "location": "seattle",
                 "capabilities": {"transport": [{"type": "openvpn", "ports": ["1194", "443"]}]}},
                {"ip_address": "10.0.0.2", "location": "newyork",
                 "capabilities": {"transport": [{"type": "openvpn", "ports": ["1194"]}]}},
                {"ip_address": "10.0.0.3", "location": "paris",
                 "capabilities": {"transport": [{"type": "openvpn", "ports": ["1194"]}]}},
                {"ip_address": "10.0.0.4", "location": "seattle",
                 "capabilities": {"transport": [{"type": "openvpn", "ports": ["53"]}]}}
            ],
            "openvpn_configuration": {
                "auth": "SHA1",
                "keepalive": "10 30",
                "tls-cipher": "DHE-RSA-AES128-SHA",
                "fragment": "1400"
            }
        }"#,
    )
    .unwrap()
}

#[tokio::test]
async fn end_to_end_profile_from_directory_fixture() {
    // 10.0.0.2 measures better than 10.0.0.1, so it must come first.
    let runner = Arc::new(FakeProbeRunner::new(&[
        ("10.0.0.1", 0.0, 40.0),
        ("10.0.0.2", 0.0, 8.0),
    ]));
    let settings = Settings::default();

    let lines = build_profile(&directory_fixture(), runner, &settings)
        .await
        .unwrap();

    let remotes: Vec<&String> = lines.iter().filter(|l| l.starts_with("remote ")).collect();
    assert_eq!(
        remotes,
        vec![
            "remote 10.0.0.2 1194",
            "remote 10.0.0.1 1194",
            "remote 10.0.0.1 443",
        ]
    );

    // The excluded country and the port-53-only gateway never appear.
    assert!(!lines.iter().any(|l| l.contains("10.0.0.3")));
    assert!(!lines.iter().any(|l| l.contains("10.0.0.4")));
    assert!(!lines.iter().any(|l| l.contains(" 53")));
}

#[tokio::test]
async fn end_to_end_options_respect_the_allow_list() {
    let runner = Arc::new(FakeProbeRunner::new(&[]));
    let settings = Settings::default();

    let lines = build_profile(&directory_fixture(), runner, &settings)
        .await
        .unwrap();

    assert!(lines.contains(&"auth SHA1".to_string()));
    assert!(lines.contains(&"keepalive 10 30".to_string()));
    assert!(!lines.iter().any(|l| l.starts_with("tls-cipher")));
    assert!(!lines.iter().any(|l| l.starts_with("fragment")));

    // Required directives are present regardless of remote input.
    assert!(lines.contains(&"client".to_string()));
    assert!(lines.contains(&"remote-cert-tls server".to_string()));
}

#[tokio::test]
async fn top_k_limits_the_emitted_gateways() {
    let runner = Arc::new(FakeProbeRunner::new(&[
        ("10.0.0.1", 0.0, 40.0),
        ("10.0.0.2", 0.0, 8.0),
    ]));
    let mut settings = Settings::default();
    settings.policy.top_gateways = 1;

    let lines = build_profile(&directory_fixture(), runner, &settings)
        .await
        .unwrap();

    let remotes: Vec<&String> = lines.iter().filter(|l| l.starts_with("remote ")).collect();
    assert_eq!(remotes, vec!["remote 10.0.0.2 1194"]);
}

#[tokio::test]
async fn directory_fetch_failure_degrades_to_no_change() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.files.profile_path = dir.path().join("bitmask.ovpn");

    let runner = Arc::new(FakeProbeRunner::new(&[]));
    let changed = update_profile(&dead_api(), runner, &settings, false)
        .await
        .unwrap();

    assert!(!changed);
    assert!(!settings.files.profile_path.exists());
}

#[tokio::test]
async fn fully_degraded_run_changes_nothing_and_still_completes() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.files.profile_path = dir.path().join("bitmask.ovpn");
    settings.files.cert_path = dir.path().join("cert.pem");
    settings.files.pid_path = dir.path().join("pid");
    std::fs::write(&settings.files.cert_path, "cached").unwrap();

    let runner = Arc::new(FakeProbeRunner::new(&[]));
    let inspector = FixedExpiry(Utc::now() + Duration::days(30));

    let outcome = run(&dead_api(), runner, &inspector, &settings, false)
        .await
        .unwrap();

    assert!(!outcome.profile_changed);
    assert!(!outcome.cert_changed);
    assert!(!outcome.reload_needed());
}
