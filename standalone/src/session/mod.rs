//! Single-host probing run: SYN-bracketed bursts timed by the server's RSTs

use crate::capture::CaptureSource;
use crate::config::StandaloneConfig;
use crate::correlator::{Marker, RstCorrelator, RstIntervals};
use crate::raw::{SegmentSink, bracket_with_syn};
use protocol::segment::build_syn;
use protocol::transport::{Pacing, probe_socket, send_train};
use protocol::{
    Detection, Entropy, EntropySource, PacketTrain, ProbeConfig, ProbeDriver, ProbeError, Verdict,
};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{info, warn};

fn brackets(entropy: Entropy) -> (Marker, Marker) {
    match entropy {
        Entropy::Low => (Marker::LowHead, Marker::LowTail),
        Entropy::High => (Marker::HighHead, Marker::HighTail),
    }
}

fn interval_ms(entropy: Entropy, interval: Option<Duration>) -> f64 {
    match interval {
        Some(duration) => duration.as_secs_f64() * 1000.0,
        None => {
            warn!("No {} interval (RST missing); using zero", entropy);
            0.0
        }
    }
}

/// Sends both bursts between marker SYNs while a blocking task captures the
/// RSTs they elicit.
pub struct StandaloneSession<K, C, S> {
    probe: ProbeConfig,
    settings: StandaloneConfig,
    source: Ipv4Addr,
    sink: K,
    capture: Option<C>,
    entropy: S,
    socket: Option<UdpSocket>,
    correlator: Option<JoinHandle<Result<RstIntervals, ProbeError>>>,
    intervals: Option<RstIntervals>,
    detection: Option<Detection>,
}

impl<K, C, S> StandaloneSession<K, C, S>
where
    K: SegmentSink,
    C: CaptureSource + Send + 'static,
    S: EntropySource,
{
    pub fn new(
        probe: ProbeConfig,
        settings: StandaloneConfig,
        source: Ipv4Addr,
        sink: K,
        capture: C,
        entropy: S,
    ) -> Self {
        Self {
            probe,
            settings,
            source,
            sink,
            capture: Some(capture),
            entropy,
            socket: None,
            correlator: None,
            intervals: None,
            detection: None,
        }
    }

    pub fn intervals(&self) -> Option<RstIntervals> {
        self.intervals
    }

    pub fn detection(&self) -> Option<&Detection> {
        self.detection.as_ref()
    }
}

impl<K, C, S> ProbeDriver for StandaloneSession<K, C, S>
where
    K: SegmentSink,
    C: CaptureSource + Send + 'static,
    S: EntropySource,
{
    async fn pre_probe(&mut self) -> Result<ProbeConfig, ProbeError> {
        self.probe.validate()?;
        let server = self.probe.server_addr()?;

        let mut capture = self.capture.take().ok_or_else(|| {
            ProbeError::socket_setup(
                "RST capture",
                std::io::Error::new(std::io::ErrorKind::NotConnected, "already consumed"),
            )
        })?;
        // No RST is due while the bursts settle
        let timeout = self.settings.rst_timeout() + self.probe.inter_measure_time();
        let correlator = RstCorrelator::new(server, self.settings.marker_source_port, timeout);
        // Capture must be listening before the first SYN leaves
        self.correlator = Some(tokio::task::spawn_blocking(move || {
            correlator.run(&mut capture)
        }));

        self.socket = Some(probe_socket(&self.probe, IpAddr::V4(self.source))?);
        info!(
            "Probing {} from {} (marker port {})",
            server, self.source, self.settings.marker_source_port
        );
        Ok(self.probe.clone())
    }

    async fn probe(&mut self, config: &ProbeConfig, entropy: Entropy) -> Result<(), ProbeError> {
        let socket = self.socket.as_ref().ok_or_else(|| {
            ProbeError::socket_setup(
                "UDP probe socket",
                std::io::Error::new(std::io::ErrorKind::NotConnected, "not bound"),
            )
        })?;

        let marker_port = self.settings.marker_source_port;
        let (head_marker, tail_marker) = brackets(entropy);
        let head = build_syn(
            config,
            self.source,
            marker_port,
            head_marker.destination_port(config),
            head_marker.sequence(),
        )?;
        let tail = build_syn(
            config,
            self.source,
            marker_port,
            tail_marker.destination_port(config),
            tail_marker.sequence(),
        )?;

        let mut train = PacketTrain::build(
            entropy,
            config.udp_payload_size,
            config.num_udp_packets,
            &mut self.entropy,
        )?;
        let dest = config.udp_destination()?;
        let sent = bracket_with_syn(
            &self.sink,
            &head,
            &tail,
            send_train(socket, &mut train, dest, Pacing::BackToBack),
        )
        .await?;
        info!("Sent {} {} datagrams between marker SYNs", sent, entropy);
        Ok(())
    }

    async fn settle(&mut self, delay: Duration) -> Result<(), ProbeError> {
        info!("Settling for {:?}", delay);
        tokio::time::sleep(delay).await;
        Ok(())
    }

    async fn post_probe(&mut self, _config: &ProbeConfig) -> Result<Verdict, ProbeError> {
        self.socket = None;

        let handle = self.correlator.take().ok_or_else(|| {
            ProbeError::Receive(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "RST capture was never started",
            ))
        })?;
        let intervals = handle
            .await
            .map_err(|e| ProbeError::Receive(std::io::Error::other(e.to_string())))??;

        let detection = Detection::new(
            interval_ms(Entropy::High, intervals.high),
            interval_ms(Entropy::Low, intervals.low),
        );
        info!(
            "High {:.3} ms, low {:.3} ms, delta {:.3} ms: {}",
            detection.high_ms, detection.low_ms, detection.delta_ms, detection.verdict
        );
        self.intervals = Some(intervals);
        self.detection = Some(detection);
        Ok(detection.verdict)
    }
}
