use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse settings: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Trust anchor not readable: {0}")]
    TrustAnchor(PathBuf),
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub provider: ProviderSettings,

    #[serde(default)]
    pub policy: PolicySettings,

    #[serde(default)]
    pub files: FileSettings,

    #[serde(default)]
    pub probe: ProbeSettings,

    #[serde(default)]
    pub cert: CertSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicySettings {
    /// Gateways outside these country codes are never used.
    #[serde(default = "default_country_codes")]
    pub country_codes: Vec<String>,

    #[serde(default = "default_transport_type")]
    pub transport_type: String,

    /// Provider-proposed tunnel options outside this list are dropped.
    /// tls-cipher is deliberately absent: the value some providers push
    /// breaks the TLS handshake on older clients.
    #[serde(default = "default_allowed_options")]
    pub allowed_options: Vec<String>,

    /// How many of the best-ranked gateways end up in the profile.
    #[serde(default = "default_top_gateways")]
    pub top_gateways: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileSettings {
    #[serde(default = "default_profile_path")]
    pub profile_path: PathBuf,

    #[serde(default = "default_cert_path")]
    pub cert_path: PathBuf,

    #[serde(default = "default_ca_path")]
    pub ca_path: PathBuf,

    #[serde(default = "default_pid_path")]
    pub pid_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeSettings {
    /// Ping packets sent per gateway.
    #[serde(default = "default_sample_count")]
    pub sample_count: u32,

    /// Upper bound on a single gateway probe, in seconds.
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CertSettings {
    /// Renew the client certificate when it expires within this margin.
    #[serde(default = "default_renew_margin_days")]
    pub renew_margin_days: i64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
        }
    }
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            country_codes: default_country_codes(),
            transport_type: default_transport_type(),
            allowed_options: default_allowed_options(),
            top_gateways: default_top_gateways(),
        }
    }
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            profile_path: default_profile_path(),
            cert_path: default_cert_path(),
            ca_path: default_ca_path(),
            pid_path: default_pid_path(),
        }
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            sample_count: default_sample_count(),
            timeout_secs: default_probe_timeout(),
        }
    }
}

impl Default for CertSettings {
    fn default() -> Self {
        Self {
            renew_margin_days: default_renew_margin_days(),
        }
    }
}

// Default value functions
fn default_api_base_url() -> String {
    "https://api.black.riseup.net/3/".to_string()
}
fn default_country_codes() -> Vec<String> {
    vec!["US".to_string()]
}
fn default_transport_type() -> String {
    "openvpn".to_string()
}
fn default_allowed_options() -> Vec<String> {
    ["auth", "cipher", "keepalive", "tun-ipv6", "float"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_top_gateways() -> usize {
    3
}
fn default_profile_path() -> PathBuf {
    PathBuf::from("bitmask.ovpn")
}
fn default_cert_path() -> PathBuf {
    PathBuf::from("cert.pem")
}
fn default_ca_path() -> PathBuf {
    PathBuf::from("ca.pem")
}
fn default_pid_path() -> PathBuf {
    PathBuf::from("pid")
}
fn default_sample_count() -> u32 {
    3
}
fn default_probe_timeout() -> u64 {
    10
}
fn default_renew_margin_days() -> i64 {
    7
}

/// Load settings from a TOML file. A missing file is not an error: the
/// built-in defaults describe a complete deployment.
pub fn load_settings(path: &Path) -> Result<Settings, SettingsError> {
    if !path.exists() {
        tracing::debug!("Settings file {} not found, using defaults", path.display());
        return Ok(Settings::default());
    }

    let content = fs::read_to_string(path)?;
    let settings: Settings = toml::from_str(&content)?;
    validate_settings(&settings)?;
    Ok(settings)
}

/// Validate settings
fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    if settings.policy.country_codes.is_empty() {
        return Err(SettingsError::ValidationError(
            "policy.country_codes must not be empty".to_string(),
        ));
    }

    if settings.policy.top_gateways == 0 {
        return Err(SettingsError::ValidationError(
            "policy.top_gateways must be at least 1".to_string(),
        ));
    }

    if settings.probe.sample_count == 0 {
        return Err(SettingsError::ValidationError(
            "probe.sample_count must be at least 1".to_string(),
        ));
    }

    Ok(())
}

impl Settings {
    /// The trust anchor must be provisioned before any network activity.
    pub fn ensure_trust_anchor(&self) -> Result<(), SettingsError> {
        let path = &self.files.ca_path;
        match fs::File::open(path) {
            Ok(_) => Ok(()),
            Err(_) => Err(SettingsError::TrustAnchor(path.clone())),
        }
    }
}
