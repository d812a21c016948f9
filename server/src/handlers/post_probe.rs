//! Post-probe verdict delivery

use protocol::{ProbeError, Verdict, control};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

/// Wait for the client on `listener` and send it the verdict.
pub async fn deliver_verdict(
    listener: &TcpListener,
    verdict: Verdict,
    accept_timeout: Duration,
) -> Result<SocketAddr, ProbeError> {
    let (mut stream, peer) = tokio::time::timeout(accept_timeout, listener.accept())
        .await
        .map_err(|_| {
            ProbeError::socket_setup(
                "accept on post-probe port",
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no client within {:?}", accept_timeout),
                ),
            )
        })?
        .map_err(|e| ProbeError::socket_setup("accept on post-probe port", e))?;

    control::write_verdict(&mut stream, verdict).await?;
    info!("Result {{{}}} sent to {}", verdict, peer);
    Ok(peer)
}
