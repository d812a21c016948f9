//! Burst reception window
//!
//! The window opens on the first datagram of the expected entropy class and
//! closes when either the expected count has arrived or the idle timeout has
//! elapsed since that first datagram. Loss is tolerated: a window that closes
//! early still yields a measurement.

use crate::config::ReceiveConfig;
use protocol::{Entropy, MarkKind, Measurement, ProbeConfig, ProbeError, TimingMark};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout_at;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ReceiveWindow {
    pub entropy: Entropy,
    pub payload_size: usize,
    pub expected_count: u32,
    pub idle_timeout: Duration,
    pub first_packet_timeout: Duration,
}

impl ReceiveWindow {
    pub fn for_phase(config: &ProbeConfig, receive: &ReceiveConfig, entropy: Entropy) -> Self {
        Self {
            entropy,
            payload_size: config.udp_payload_size,
            expected_count: config.num_udp_packets,
            idle_timeout: receive.idle_timeout(),
            first_packet_timeout: receive.first_packet_timeout(),
        }
    }

    /// Datagrams of the other class (stragglers of the previous burst) are
    /// skipped; tiny payloads that cannot be classified are accepted.
    fn accepts(&self, payload: &[u8]) -> bool {
        Entropy::classify(payload).is_none_or(|class| class == self.entropy)
    }

    /// Receive one burst and time it.
    pub async fn receive_burst(&self, socket: &UdpSocket) -> Result<Measurement, ProbeError> {
        let mut buf = vec![0u8; self.payload_size];

        let first_deadline = tokio::time::Instant::now() + self.first_packet_timeout;
        let start = loop {
            match timeout_at(first_deadline, socket.recv_from(&mut buf)).await {
                Err(_) => {
                    warn!(
                        "No {} datagram within {:?}; phase has no measurement",
                        self.entropy, self.first_packet_timeout
                    );
                    return Ok(Measurement::empty(self.entropy));
                }
                Ok(Err(e)) => return Err(ProbeError::Receive(e)),
                Ok(Ok((n, from))) => {
                    if self.accepts(&buf[..n]) {
                        debug!("First {} datagram from {}", self.entropy, from);
                        break TimingMark::now(MarkKind::start_of(self.entropy));
                    }
                    debug!("Skipping {}-byte datagram of the other class", n);
                }
            }
        };

        let deadline = tokio::time::Instant::from_std(start.at + self.idle_timeout);
        let mut received: u32 = 1;
        while received < self.expected_count {
            match timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Err(_) => {
                    warn!(
                        "{} window closed after {:?} with {}/{} datagrams",
                        self.entropy, self.idle_timeout, received, self.expected_count
                    );
                    break;
                }
                Ok(Err(e)) => return Err(ProbeError::Receive(e)),
                Ok(Ok((n, _))) => {
                    if self.accepts(&buf[..n]) {
                        received += 1;
                    }
                }
            }
        }

        let end = TimingMark::now(MarkKind::end_of(self.entropy));
        let measurement = Measurement::from_marks(start, end, received);
        debug!(
            "{} burst: {} datagrams in {:.3} ms",
            self.entropy,
            received,
            measurement.duration_ms()
        );
        Ok(measurement)
    }
}
