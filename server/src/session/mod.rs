//! Server end of one client/server probing run

use crate::config::Config;
use crate::handlers::{self, ReceiveWindow};
use protocol::{
    Detection, Entropy, Measurement, ProbeConfig, ProbeDriver, ProbeError, Verdict,
};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tracing::{debug, info, warn};

/// Receives the config, times both bursts and reports the verdict.
///
/// Sockets are opened when their phase starts and dropped when it ends, so
/// at most one channel is live at a time.
pub struct ServerSession {
    config: Config,
    pre_probe: Option<TcpListener>,
    probe_socket: Option<UdpSocket>,
    low: Option<Measurement>,
    high: Option<Measurement>,
    detection: Option<Detection>,
}

impl ServerSession {
    pub fn new(config: Config, pre_probe: TcpListener) -> Self {
        Self {
            config,
            pre_probe: Some(pre_probe),
            probe_socket: None,
            low: None,
            high: None,
            detection: None,
        }
    }

    /// Detection of the finished run
    pub fn detection(&self) -> Option<&Detection> {
        self.detection.as_ref()
    }

    fn bind_ip(&self) -> Result<IpAddr, ProbeError> {
        self.config
            .general
            .bind_address
            .parse()
            .map_err(|_| ProbeError::InvalidAddress(self.config.general.bind_address.clone()))
    }

    fn measurement(&self, entropy: Entropy) -> Measurement {
        let stored = match entropy {
            Entropy::Low => self.low,
            Entropy::High => self.high,
        };
        stored.unwrap_or_else(|| {
            warn!("No {} interval recorded; using zero", entropy);
            Measurement::empty(entropy)
        })
    }
}

impl ProbeDriver for ServerSession {
    async fn pre_probe(&mut self) -> Result<ProbeConfig, ProbeError> {
        let listener = self.pre_probe.take().ok_or_else(|| {
            ProbeError::socket_setup(
                "pre-probe listener",
                std::io::Error::new(std::io::ErrorKind::NotConnected, "already consumed"),
            )
        })?;
        let probe_config = handlers::accept_config(&listener).await?;
        drop(listener);

        // Bursts may start right after the handshake; bind before returning
        let addr = SocketAddr::new(self.bind_ip()?, probe_config.dst_port_udp);
        let socket = handlers::bind_probe_socket(addr, self.config.receive.recv_buffer_bytes)?;
        info!("Waiting for UDP bursts on {}", addr);
        self.probe_socket = Some(socket);
        Ok(probe_config)
    }

    async fn probe(&mut self, config: &ProbeConfig, entropy: Entropy) -> Result<(), ProbeError> {
        let socket = self.probe_socket.as_ref().ok_or_else(|| {
            ProbeError::socket_setup(
                "UDP probe socket",
                std::io::Error::new(std::io::ErrorKind::NotConnected, "not bound"),
            )
        })?;

        let mut window = ReceiveWindow::for_phase(config, &self.config.receive, entropy);
        if entropy == Entropy::High {
            // The high burst only starts after the client's settle delay
            window.first_packet_timeout += config.inter_measure_time();
        }

        let measurement = window.receive_burst(socket).await?;
        info!(
            "{} burst: {}/{} datagrams, {:.3} ms",
            entropy,
            measurement.packets,
            config.num_udp_packets,
            measurement.duration_ms()
        );
        match entropy {
            Entropy::Low => self.low = Some(measurement),
            Entropy::High => self.high = Some(measurement),
        }
        Ok(())
    }

    async fn settle(&mut self, delay: Duration) -> Result<(), ProbeError> {
        // Queued datagrams wait in the socket buffer; the high window filters
        // out low stragglers, so there is nothing to sleep through here
        debug!("Client settles for {:?}", delay);
        Ok(())
    }

    async fn post_probe(&mut self, config: &ProbeConfig) -> Result<Verdict, ProbeError> {
        let detection =
            Detection::from_measurements(&self.measurement(Entropy::High), &self.measurement(Entropy::Low));
        info!(
            "High {:.3} ms, low {:.3} ms, delta {:.3} ms: {}",
            detection.high_ms, detection.low_ms, detection.delta_ms, detection.verdict
        );
        self.detection = Some(detection);
        self.probe_socket = None;

        let addr = SocketAddr::new(self.bind_ip()?, config.post_probe_port);
        let listener = handlers::bind_listener(addr).await?;
        handlers::deliver_verdict(&listener, detection.verdict, self.config.receive.accept_timeout())
            .await?;
        Ok(detection.verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::transport::{Pacing, send_train};
    use protocol::{PacketTrain, ProbeStateMachine, RngEntropy, control};
    use tokio::net::TcpStream;

    fn free_udp_port() -> u16 {
        std::net::UdpSocket::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn free_tcp_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn probe_config(pre_probe_port: u16) -> ProbeConfig {
        ProbeConfig {
            server_ip: "127.0.0.1".into(),
            src_port_udp: free_udp_port(),
            dst_port_udp: free_udp_port(),
            dst_port_tcp_head: 9999,
            dst_port_tcp_tail: 8888,
            pre_probe_port,
            post_probe_port: free_tcp_port(),
            udp_payload_size: 64,
            inter_measure_time: 2,
            num_udp_packets: 20,
            udp_ttl: 64,
        }
    }

    fn server_config() -> Config {
        let mut config = Config::default();
        config.general.bind_address = "127.0.0.1".into();
        config.receive.idle_timeout_sec = 3;
        config.receive.first_packet_timeout_sec = 5;
        config.receive.accept_timeout_sec = 10;
        config.receive.recv_buffer_bytes = 256 * 1024;
        config
    }

    /// Plays the client end by hand, stalling the high burst halfway when asked.
    async fn run_client(config: ProbeConfig, stall: Duration) -> Verdict {
        let mut control_stream = TcpStream::connect(config.pre_probe_addr().unwrap())
            .await
            .unwrap();
        control::write_config(&mut control_stream, &config).await.unwrap();
        drop(control_stream);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dest = config.udp_destination().unwrap();
        let mut low = PacketTrain::low(config.udp_payload_size, config.num_udp_packets).unwrap();
        send_train(&socket, &mut low, dest, Pacing::BackToBack)
            .await
            .unwrap();

        tokio::time::sleep(config.inter_measure_time()).await;

        let mut high = PacketTrain::high(
            config.udp_payload_size,
            config.num_udp_packets,
            &mut RngEntropy,
        )
        .unwrap();
        for i in 0..high.len() {
            if i == high.len() / 2 && !stall.is_zero() {
                tokio::time::sleep(stall).await;
            }
            socket.send_to(high.packet(i), dest).await.unwrap();
        }

        tokio::time::sleep(config.inter_measure_time()).await;
        let post = config.post_probe_addr().unwrap();
        let mut stream = loop {
            match TcpStream::connect(post).await {
                Ok(stream) => break stream,
                Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        };
        control::read_verdict(&mut stream).await.unwrap()
    }

    async fn run_pair(stall: Duration) -> (Verdict, Verdict, Detection) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = probe_config(listener.local_addr().unwrap().port());
        let client = tokio::spawn(run_client(config, stall));

        let mut session = ServerSession::new(server_config(), listener);
        let mut machine = ProbeStateMachine::new();
        let server_verdict = machine.run(&mut session).await.unwrap();
        let client_verdict = client.await.unwrap();
        let detection = *session.detection().unwrap();
        (server_verdict, client_verdict, detection)
    }

    #[tokio::test]
    async fn test_stalled_high_burst_reports_compression() {
        let (server, client, detection) = run_pair(Duration::from_millis(150)).await;
        assert_eq!(server, Verdict::CompressionDetected);
        assert_eq!(client, Verdict::CompressionDetected);
        assert!(detection.delta_ms > 100.0);
    }

    #[tokio::test]
    async fn test_equal_bursts_report_no_compression() {
        let (server, client, _) = run_pair(Duration::ZERO).await;
        assert_eq!(server, Verdict::NoCompressionDetected);
        assert_eq!(client, Verdict::NoCompressionDetected);
    }
}
