#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(unix))]
compile_error!("Only unix is currently supported");

use std::path::PathBuf;

use clap::Parser;

/// Relays queued outbox messages to an SMTP host
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Settings file (RON). Falls back to `POSTAL_CONFIG`, then
    /// ./postal.config.ron, then /etc/postal/postal.config.ron
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = postal::config::find_config_file(args.config)?;
    let postal = postal::config::load(&config_path)?;

    postal.run().await
}
