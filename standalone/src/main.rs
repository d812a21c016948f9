//! compdetect-standalone - single-host compression probe
//!
//! Brackets a low-entropy and a high-entropy UDP burst with TCP SYNs to
//! closed ports on the target and times each burst by the RSTs that come
//! back. Needs CAP_NET_RAW.

mod capture;
mod config;
mod correlator;
mod output;
mod raw;
mod session;

use anyhow::{Context, Result};
use capture::RawCapture;
use clap::Parser;
use protocol::{EntropySource, FileEntropy, ProbeStateMachine, RngEntropy};
use raw::RawSender;
use session::StandaloneSession;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "compdetect-standalone")]
#[command(version)]
#[command(about = "Detect compression towards a host without a cooperating server", long_about = None)]
struct Args {
    /// Configuration file path (TOML, or legacy flat JSON)
    #[arg(short, long, default_value = "standalone.conf")]
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

    info!("compdetect-standalone v{}", env!("CARGO_PKG_VERSION"));

    let config = config::Config::load(&args.config).context("Failed to load configuration")?;
    info!("Loaded configuration from {:?}", args.config);

    let source = config
        .standalone
        .resolve_source(&config.probe)
        .context("Failed to determine source address")?;

    let entropy: Box<dyn EntropySource> = match &config.standalone.entropy_file {
        Some(path) => {
            info!("High-entropy payloads from {}", path.display());
            Box::new(FileEntropy::new(path))
        }
        None => Box::new(RngEntropy),
    };

    let sender = RawSender::new().context("Failed to open raw send socket")?;
    let capture = RawCapture::new().context("Failed to open raw capture socket")?;

    let mut session = StandaloneSession::new(
        config.probe,
        config.standalone,
        source,
        sender,
        capture,
        entropy,
    );
    ProbeStateMachine::new()
        .run(&mut session)
        .await
        .context("Probe run failed")?;

    if let (Some(intervals), Some(detection)) = (session.intervals(), session.detection()) {
        output::print_report(&intervals, detection);
    }
    Ok(())
}
