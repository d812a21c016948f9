//! compdetect - client side of the client/server compression probe
//!
//! Sends a low-entropy and a high-entropy UDP burst to a compdetect server
//! and prints whether the path between them compresses traffic.

mod config;
mod output;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use protocol::{EntropySource, FileEntropy, ProbeStateMachine, RngEntropy};
use session::ClientSession;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "compdetect")]
#[command(version)]
#[command(about = "Detect compression on the network path to a compdetect server", long_about = None)]
struct Args {
    /// Configuration file path (TOML, or legacy flat JSON)
    #[arg(short, long, default_value = "client.conf")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    info!("compdetect v{}", env!("CARGO_PKG_VERSION"));

    let config = config::Config::load(&args.config).context("Failed to load configuration")?;
    info!("Loaded configuration from {:?}", args.config);

    let entropy: Box<dyn EntropySource> = match &config.client.entropy_file {
        Some(path) => {
            info!("High-entropy payloads from {}", path.display());
            Box::new(FileEntropy::new(path))
        }
        None => Box::new(RngEntropy),
    };

    let bind_ip = config.client.bind_ip()?;
    let post_probe = config.probe.post_probe_addr()?;
    let mut session = ClientSession::new(config.probe, config.client, bind_ip, entropy);
    let verdict = ProbeStateMachine::new()
        .run(&mut session)
        .await
        .context("Probe run failed")?;

    output::print_verdict(post_probe, verdict);
    Ok(())
}
