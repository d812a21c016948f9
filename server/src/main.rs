//! compdetect server - receiving end of the client/server compression probe

mod config;
mod handlers;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use protocol::ProbeStateMachine;
use session::ServerSession;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(version)]
#[command(about = "Compression detection server - times UDP bursts sent by compdetect", long_about = None)]
struct Args {
    /// Configuration file path (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pre-probe TCP port, overrides the configuration file
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting compdetect server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => {
            let config = config::Config::load(path).context("Failed to load configuration")?;
            info!("Loaded configuration from: {}", path.display());
            config
        }
        None => config::Config::default(),
    };
    if let Some(port) = args.port {
        config.general.pre_probe_port = port;
    }

    let bind_ip: IpAddr = config
        .general
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.general.bind_address))?;
    let addr = SocketAddr::new(bind_ip, config.general.pre_probe_port);
    let listener = handlers::bind_listener(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Waiting for a client on {}", addr);

    let mut session = ServerSession::new(config, listener);
    let verdict = ProbeStateMachine::new()
        .run(&mut session)
        .await
        .context("Probe run failed")?;

    println!("{}", verdict);
    Ok(())
}
