//! OpenVPN profile synthesis and change detection.
//!
//! The synthesized document is ordered (remotes in ranking order), but
//! equality against the persisted profile is order-insensitive so a
//! transient change in ping ranking never forces a rewrite on its own.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::settings::FileSettings;
use crate::topology::Candidate;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Profile IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Directives every generated profile carries regardless of remote input.
fn required_directives(files: &FileSettings) -> Vec<String> {
    vec![
        format!("cert {}", files.cert_path.display()),
        format!("key {}", files.cert_path.display()),
        format!("ca {}", files.ca_path.display()),
        "persist-tun".to_string(),
        "nobind".to_string(),
        "client".to_string(),
        "dev tun".to_string(),
        "tls-client".to_string(),
        "remote-cert-tls server".to_string(),
        "tls-version-min 1.0".to_string(),
        "dhcp-option DNS 10.41.0.1".to_string(),
        format!("writepid {}", files.pid_path.display()),
    ]
}

/// Assemble the final profile: vetted option lines, then the fixed
/// directives, then one `remote` line per (host, port) pair with hosts in
/// ranking order and ports in their original per-host order.
pub fn synthesize(options: &[String], gateways: &[Candidate], files: &FileSettings) -> Vec<String> {
    let mut lines = Vec::with_capacity(options.len() + 16);
    lines.extend_from_slice(options);
    lines.extend(required_directives(files));

    for gateway in gateways {
        for port in &gateway.ports {
            lines.push(format!("remote {} {}", gateway.host, port));
        }
    }

    lines
}

/// Read the persisted profile. A missing file is `None`, not an error.
pub fn load_cached(path: &Path) -> Result<Option<Vec<String>>, ProfileError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content.lines().map(String::from).collect())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Order-insensitive change test: both documents are compared as sorted
/// line multisets. No cached profile always counts as changed.
pub fn profile_changed(new_lines: &[String], cached: Option<&[String]>) -> bool {
    let Some(cached) = cached else {
        return true;
    };

    let mut new_sorted: Vec<&String> = new_lines.iter().collect();
    let mut cached_sorted: Vec<&String> = cached.iter().collect();
    new_sorted.sort();
    cached_sorted.sort();
    new_sorted != cached_sorted
}

/// Write the profile with its ranking order preserved, one directive per
/// line.
pub fn persist(path: &Path, lines: &[String]) -> Result<(), ProfileError> {
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(path, content)?;
    Ok(())
}
