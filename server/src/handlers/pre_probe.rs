//! Pre-probe config exchange

use protocol::{ProbeConfig, ProbeError, control};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Accept one client and read its probe configuration.
pub async fn accept_config(listener: &TcpListener) -> Result<ProbeConfig, ProbeError> {
    let (mut stream, peer) = listener
        .accept()
        .await
        .map_err(|e| ProbeError::socket_setup("accept on pre-probe port", e))?;
    debug!("Pre-probe connection from {}", peer);

    let config = control::read_config(&mut stream).await?;
    info!(
        "Received configuration from {}: {} x {} bytes, settle {}s",
        peer, config.num_udp_packets, config.udp_payload_size, config.inter_measure_time
    );
    Ok(config)
}
