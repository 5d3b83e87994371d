//! One synchronization pass: profile, certificate, reload decision.

use std::sync::Arc;
use thiserror::Error;

use crate::api::{ApiClient, ApiError};
use crate::cert::{self, CertError, CertInspector};
use crate::probe::{self, ProbeRunner};
use crate::profile::{self, ProfileError};
use crate::reload;
use crate::settings::Settings;
use crate::topology::{self, DirectoryDocument, TopologyError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Directory service error: {0}")]
    Api(#[from] ApiError),

    #[error("Directory document integrity error: {0}")]
    Topology(#[from] TopologyError),

    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("Certificate error: {0}")]
    Cert(#[from] CertError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    pub profile_changed: bool,
    pub cert_changed: bool,
}

impl SyncOutcome {
    pub fn reload_needed(&self) -> bool {
        self.profile_changed || self.cert_changed
    }
}

/// Turn a directory document into the full profile line sequence:
/// filter by policy, probe and rank the candidates, synthesize.
pub async fn build_profile(
    document: &DirectoryDocument,
    runner: Arc<dyn ProbeRunner>,
    settings: &Settings,
) -> Result<Vec<String>, SyncError> {
    let options = topology::filter_options(document, &settings.policy);
    let candidates = topology::filter_gateways(document, &settings.policy)?;
    let ranked = probe::select_gateways(runner, candidates, settings.policy.top_gateways).await;

    if ranked.is_empty() {
        tracing::warn!("No usable gateways after policy filtering");
    }

    Ok(profile::synthesize(&options, &ranked, &settings.files))
}

/// Regenerate the profile and persist it when it differs from the cached
/// copy. A directory fetch failure degrades to "no change"; a malformed
/// document aborts the run.
pub async fn update_profile(
    api: &ApiClient,
    runner: Arc<dyn ProbeRunner>,
    settings: &Settings,
    force: bool,
) -> Result<bool, SyncError> {
    let document = match api.fetch_directory().await {
        Ok(document) => document,
        Err(err) if !err.is_integrity() => {
            tracing::error!("Failed to fetch the gateway directory: {}", err);
            return Ok(false);
        }
        Err(err) => return Err(err.into()),
    };

    let new_lines = build_profile(&document, runner, settings).await?;

    if !force {
        let cached = profile::load_cached(&settings.files.profile_path)?;
        if !profile::profile_changed(&new_lines, cached.as_deref()) {
            tracing::info!("Reusing cached OpenVPN profile");
            return Ok(false);
        }
    }

    tracing::info!(
        "Writing new OpenVPN profile to {}",
        settings.files.profile_path.display()
    );
    profile::persist(&settings.files.profile_path, &new_lines)?;
    Ok(true)
}

/// Keep the client certificate fresh. Only an actual refresh counts as a
/// change.
pub async fn update_certificate(
    api: &ApiClient,
    inspector: &dyn CertInspector,
    settings: &Settings,
    force: bool,
) -> Result<bool, SyncError> {
    let status = cert::ensure_certificate(
        api,
        inspector,
        &settings.files.cert_path,
        settings.cert.renew_margin_days,
        force,
    )
    .await?;
    Ok(status.changed())
}

/// One full synchronization pass. Both subsystems are evaluated
/// unconditionally; the reload signal fires if either reported a change.
pub async fn run(
    api: &ApiClient,
    runner: Arc<dyn ProbeRunner>,
    inspector: &dyn CertInspector,
    settings: &Settings,
    force: bool,
) -> Result<SyncOutcome, SyncError> {
    let profile_changed = update_profile(api, runner.clone(), settings, force).await?;
    let cert_changed = update_certificate(api, inspector, settings, force).await?;

    let outcome = SyncOutcome {
        profile_changed,
        cert_changed,
    };

    if outcome.reload_needed() {
        reload::signal_reload(&settings.files.pid_path);
    } else {
        tracing::info!("Nothing changed, leaving OpenVPN alone");
    }

    Ok(outcome)
}
