//! Raw IPv4 transmission of marker SYNs

use protocol::ProbeError;
use protocol::segment::RawSegment;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::future::Future;
use std::net::SocketAddrV4;
use tracing::debug;

/// `SOCK_RAW` / `IPPROTO_RAW` socket. The kernel takes the IPv4 header from
/// the buffer as built (`IPPROTO_RAW` implies `IP_HDRINCL`). Requires
/// `CAP_NET_RAW`.
pub struct RawSender {
    socket: Socket,
}

impl RawSender {
    pub fn new() -> Result<Self, ProbeError> {
        let socket = Socket::new(
            Domain::IPV4,
            Type::RAW,
            Some(Protocol::from(libc::IPPROTO_RAW)),
        )
        .map_err(|e| ProbeError::socket_setup("raw IPv4 send socket (requires CAP_NET_RAW)", e))?;
        Ok(Self { socket })
    }
}

/// Anything marker SYNs can be written to
pub trait SegmentSink {
    fn send(&self, segment: &RawSegment) -> Result<(), ProbeError>;
}

impl SegmentSink for RawSender {
    fn send(&self, segment: &RawSegment) -> Result<(), ProbeError> {
        let dest = SocketAddrV4::new(segment.destination(), 0);
        let sent = self
            .socket
            .send_to(segment.as_bytes(), &SockAddr::from(dest))
            .map_err(|e| ProbeError::send(format!("SYN to {}", dest.ip()), e))?;
        if sent != segment.len() {
            return Err(ProbeError::send(
                format!("SYN to {}", dest.ip()),
                std::io::Error::other(format!("short write: {}/{} bytes", sent, segment.len())),
            ));
        }
        Ok(())
    }
}

/// Send `head`, run `burst`, then send `tail`.
///
/// The tail SYN is only sent once the burst has completed successfully.
pub async fn bracket_with_syn<K, F, T>(
    sender: &K,
    head: &RawSegment,
    tail: &RawSegment,
    burst: F,
) -> Result<T, ProbeError>
where
    K: SegmentSink + ?Sized,
    F: Future<Output = Result<T, ProbeError>>,
{
    sender.send(head)?;
    debug!("Head SYN sent to {}", head.destination());
    let output = burst.await?;
    sender.send(tail)?;
    debug!("Tail SYN sent to {}", tail.destination());
    Ok(output)
}
