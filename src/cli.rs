use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "eipsync")]
#[command(author, version, about = "Sync OpenVPN client state with a LEAP/Bitmask provider", long_about = None)]
pub struct Cli {
    /// Settings file path
    #[arg(short, long, default_value = "eipsync.toml")]
    pub config: PathBuf,

    /// Log level (debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Log format (json, plain)
    #[arg(long, default_value = "plain")]
    pub log_format: String,

    /// Rewrite the profile and refresh the certificate even when unchanged
    #[arg(long)]
    pub force: bool,
}
