use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use eipsync::api::ApiClient;
use eipsync::cert::X509Inspector;
use eipsync::cli::Cli;
use eipsync::probe::PingRunner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    let settings = eipsync::load_settings(&cli.config)?;

    // The trust anchor is the one thing the operator must provision by
    // hand; its absence is the only non-zero exit.
    if let Err(err) = settings.ensure_trust_anchor() {
        eprintln!(
            "Please obtain the provider CA certificate and store it in {}",
            settings.files.ca_path.display()
        );
        return Err(err.into());
    }

    let api = ApiClient::from_trust_anchor(&settings.provider.api_base_url, &settings.files.ca_path)?;
    let runner = Arc::new(PingRunner::new(&settings.probe));

    match eipsync::run(&api, runner, &X509Inspector, &settings, cli.force).await {
        Ok(outcome) => {
            tracing::debug!(
                "Sync pass complete: profile_changed={}, cert_changed={}",
                outcome.profile_changed,
                outcome.cert_changed
            );
        }
        Err(err) => {
            // Integrity failures and a missing certificate end the run
            // loudly, but only the trust anchor changes the exit code.
            tracing::error!("Synchronization aborted: {}", err);
        }
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let subscriber =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(&cli.log_level));

    match cli.log_format.as_str() {
        "json" => {
            subscriber
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            subscriber.with(tracing_subscriber::fmt::layer()).init();
        }
    }

    Ok(())
}
