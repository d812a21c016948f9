//! Inbound TCP capture for RST correlation

use protocol::{CAPTURE_BUFFER_SIZE, ProbeError};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{ErrorKind, Read};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant};

/// One captured IPv4 datagram and the moment it was read
#[derive(Debug, Clone)]
pub struct Captured {
    pub at: Instant,
    pub bytes: Vec<u8>,
}

/// Source of inbound IPv4 datagrams carrying TCP.
pub trait CaptureSource {
    /// Block for at most `timeout`. Returns `ProbeError::ReceiveTimeout`
    /// when nothing arrived in time.
    fn next_segment(&mut self, timeout: Duration) -> Result<Captured, ProbeError>;
}

/// `SOCK_RAW` / `IPPROTO_TCP` socket: every inbound TCP datagram, IPv4 header
/// included. Requires `CAP_NET_RAW`.
pub struct RawCapture {
    socket: Socket,
    buf: Vec<u8>,
}

impl RawCapture {
    pub fn new() -> Result<Self, ProbeError> {
        let context = "raw TCP capture socket (requires CAP_NET_RAW)";
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::TCP))
            .map_err(|e| ProbeError::socket_setup(context, e))?;
        socket
            .bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into())
            .map_err(|e| ProbeError::socket_setup(context, e))?;
        Ok(Self {
            socket,
            buf: vec![0u8; CAPTURE_BUFFER_SIZE],
        })
    }
}

impl CaptureSource for RawCapture {
    fn next_segment(&mut self, timeout: Duration) -> Result<Captured, ProbeError> {
        if timeout.is_zero() {
            return Err(ProbeError::ReceiveTimeout(timeout));
        }
        self.socket
            .set_read_timeout(Some(timeout))
            .map_err(|e| ProbeError::socket_setup("capture read timeout", e))?;

        match (&self.socket).read(&mut self.buf) {
            Ok(n) => Ok(Captured {
                at: Instant::now(),
                bytes: self.buf[..n].to_vec(),
            }),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Err(ProbeError::ReceiveTimeout(timeout))
            }
            Err(e) => Err(ProbeError::Receive(e)),
        }
    }
}
