//! Handlers for the three server-side channels

pub mod post_probe;
pub mod pre_probe;
pub mod probe;

pub use post_probe::deliver_verdict;
pub use pre_probe::accept_config;
pub use probe::ReceiveWindow;

use protocol::ProbeError;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use tokio::net::{TcpListener, UdpSocket};

/// Bind a TCP control listener.
pub async fn bind_listener(addr: SocketAddr) -> Result<TcpListener, ProbeError> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| ProbeError::socket_setup(format!("listen on {}", addr), e))
}

/// Bind the UDP socket bursts arrive on, with room for a whole burst queued.
pub fn bind_probe_socket(addr: SocketAddr, recv_buffer: usize) -> Result<UdpSocket, ProbeError> {
    let context = format!("UDP probe socket {}", addr);
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| ProbeError::socket_setup(&context, e))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| ProbeError::socket_setup(&context, e))?;
    // The kernel may clamp this; a smaller buffer only risks loss, which is tolerated
    if let Err(e) = socket.set_recv_buffer_size(recv_buffer) {
        tracing::warn!("Could not set receive buffer to {} bytes: {}", recv_buffer, e);
    }
    socket
        .bind(&addr.into())
        .map_err(|e| ProbeError::socket_setup(&context, e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| ProbeError::socket_setup(&context, e))?;
    UdpSocket::from_std(socket.into()).map_err(|e| ProbeError::socket_setup(&context, e))
}
