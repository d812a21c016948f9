//! Pairs RSTs elicited by marker SYNs into burst intervals
//!
//! Each marker SYN carries its own TCP sequence number, so the RST answering
//! it acknowledges `sequence + 1` and names the marker regardless of arrival
//! order. RSTs without a usable acknowledgement fill the earliest unanswered
//! marker in send order.

use crate::capture::CaptureSource;
use protocol::segment::{TcpFlags, decode_tcp_datagram};
use protocol::{MARKER_SEQUENCE_BASE, ProbeConfig, ProbeError};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    LowHead,
    LowTail,
    HighHead,
    HighTail,
}

impl Marker {
    pub const SEND_ORDER: [Marker; 4] = [
        Marker::LowHead,
        Marker::LowTail,
        Marker::HighHead,
        Marker::HighTail,
    ];

    fn index(self) -> usize {
        match self {
            Self::LowHead => 0,
            Self::LowTail => 1,
            Self::HighHead => 2,
            Self::HighTail => 3,
        }
    }

    /// TCP sequence number carried by this marker's SYN
    pub fn sequence(self) -> u32 {
        MARKER_SEQUENCE_BASE + self.index() as u32
    }

    /// Marker answered by an RST acknowledging `ack`.
    pub fn from_ack(ack: u32) -> Option<Self> {
        let sequence = ack.wrapping_sub(1);
        Self::SEND_ORDER
            .into_iter()
            .find(|marker| marker.sequence() == sequence)
    }

    pub fn destination_port(self, config: &ProbeConfig) -> u16 {
        match self {
            Self::LowHead | Self::HighHead => config.dst_port_tcp_head,
            Self::LowTail | Self::HighTail => config.dst_port_tcp_tail,
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LowHead => "low head",
            Self::LowTail => "low tail",
            Self::HighHead => "high head",
            Self::HighTail => "high tail",
        };
        f.write_str(name)
    }
}

/// Burst intervals measured between RST arrivals; `None` when a bracket is
/// missing an RST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RstIntervals {
    pub low: Option<Duration>,
    pub high: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct RstCorrelator {
    server: Ipv4Addr,
    marker_port: u16,
    timeout: Duration,
}

impl RstCorrelator {
    /// `marker_port` is the source port of the marker SYNs, i.e. the
    /// destination port of the RSTs.
    pub fn new(server: Ipv4Addr, marker_port: u16, timeout: Duration) -> Self {
        Self {
            server,
            marker_port,
            timeout,
        }
    }

    /// RST from the server to the marker port, or `None` for any other
    /// datagram.
    fn rst_of(&self, bytes: &[u8]) -> Option<u32> {
        let (ip, tcp) = decode_tcp_datagram(bytes).ok()?;
        if ip.source != self.server || tcp.destination_port != self.marker_port || !tcp.is_rst() {
            return None;
        }
        Some(if tcp.has(TcpFlags::ACK) {
            tcp.acknowledgement
        } else {
            0
        })
    }

    /// Capture until all four marker RSTs have arrived or `timeout` passes
    /// without a new one. Blocking; run it off the async runtime.
    pub fn run<C: CaptureSource + ?Sized>(&self, capture: &mut C) -> Result<RstIntervals, ProbeError> {
        let mut arrivals: [Option<Instant>; 4] = [None; 4];
        let mut last_progress = Instant::now();

        while arrivals.iter().any(Option::is_none) {
            let remaining = self.timeout.saturating_sub(last_progress.elapsed());
            let captured = match capture.next_segment(remaining) {
                Ok(captured) => captured,
                Err(e) if !e.is_fatal() => {
                    let missing = arrivals.iter().filter(|a| a.is_none()).count();
                    warn!("RST capture timed out with {} marker(s) unanswered", missing);
                    break;
                }
                Err(e) => return Err(e),
            };

            let Some(ack) = self.rst_of(&captured.bytes) else {
                continue;
            };
            let marker = Marker::from_ack(ack).or_else(|| {
                Marker::SEND_ORDER
                    .into_iter()
                    .find(|marker| arrivals[marker.index()].is_none())
            });
            let Some(marker) = marker else {
                continue;
            };

            let slot = &mut arrivals[marker.index()];
            if slot.is_some() {
                debug!("Duplicate RST for {} marker", marker);
                continue;
            }
            debug!("RST for {} marker", marker);
            *slot = Some(captured.at);
            last_progress = Instant::now();
        }

        let interval = |head: Marker, tail: Marker| {
            let start = arrivals[head.index()]?;
            let end = arrivals[tail.index()]?;
            Some(end.saturating_duration_since(start))
        };
        let intervals = RstIntervals {
            low: interval(Marker::LowHead, Marker::LowTail),
            high: interval(Marker::HighHead, Marker::HighTail),
        };
        info!("RST intervals: low {:?}, high {:?}", intervals.low, intervals.high);
        Ok(intervals)
    }
}
