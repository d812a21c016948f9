//! Client end of one client/server probing run

use crate::config::ClientConfig;
use protocol::transport::{Pacing, probe_socket, send_train};
use protocol::{
    Entropy, EntropySource, HANDSHAKE_GAP, PacketTrain, ProbeConfig, ProbeDriver, ProbeError,
    Verdict, control,
};
use std::net::IpAddr;
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, info, warn};

/// Sends the config, both bursts, then collects the server's verdict.
pub struct ClientSession<S> {
    probe: ProbeConfig,
    client: ClientConfig,
    bind_ip: IpAddr,
    entropy: S,
    handshake_gap: Duration,
    socket: Option<UdpSocket>,
}

impl<S: EntropySource> ClientSession<S> {
    pub fn new(probe: ProbeConfig, client: ClientConfig, bind_ip: IpAddr, entropy: S) -> Self {
        Self {
            probe,
            client,
            bind_ip,
            entropy,
            handshake_gap: HANDSHAKE_GAP,
            socket: None,
        }
    }

    #[cfg(test)]
    fn with_handshake_gap(mut self, gap: Duration) -> Self {
        self.handshake_gap = gap;
        self
    }

    /// The server only listens for the verdict once its high window closes.
    async fn connect_post_probe(&self, config: &ProbeConfig) -> Result<TcpStream, ProbeError> {
        let addr = config.post_probe_addr()?;
        let attempts = self.client.connect_retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            debug!("Post-probe connection attempt {}/{}", attempt, attempts);
            match TcpStream::connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) if attempt < attempts => {
                    debug!("Post-probe connect to {} failed: {}", addr, e);
                    tokio::time::sleep(self.client.connect_retry_interval()).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("Giving up on {} after {} attempts", addr, attempts);
                    return Err(ProbeError::socket_setup(format!("connect to {}", addr), e));
                }
            }
        }
    }
}

impl<S: EntropySource> ProbeDriver for ClientSession<S> {
    async fn pre_probe(&mut self) -> Result<ProbeConfig, ProbeError> {
        self.probe.validate()?;
        let addr = self.probe.pre_probe_addr()?;
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ProbeError::socket_setup(format!("connect to {}", addr), e))?;
        control::write_config(&mut stream, &self.probe).await?;
        drop(stream);
        info!("Sent configuration to {}", addr);

        self.socket = Some(probe_socket(&self.probe, self.bind_ip)?);
        tokio::time::sleep(self.handshake_gap).await;
        Ok(self.probe.clone())
    }

    async fn probe(&mut self, config: &ProbeConfig, entropy: Entropy) -> Result<(), ProbeError> {
        let socket = self.socket.as_ref().ok_or_else(|| {
            ProbeError::socket_setup(
                "UDP probe socket",
                std::io::Error::new(std::io::ErrorKind::NotConnected, "not bound"),
            )
        })?;
        let mut train = PacketTrain::build(
            entropy,
            config.udp_payload_size,
            config.num_udp_packets,
            &mut self.entropy,
        )?;
        let pacing = Pacing::from_micros(self.client.inter_packet_delay_us);
        let sent = send_train(socket, &mut train, config.udp_destination()?, pacing).await?;
        info!(
            "Sent {} {} datagrams of {} bytes",
            sent, entropy, config.udp_payload_size
        );
        Ok(())
    }

    async fn settle(&mut self, delay: Duration) -> Result<(), ProbeError> {
        info!("Settling for {:?}", delay);
        tokio::time::sleep(delay).await;
        Ok(())
    }

    async fn post_probe(&mut self, config: &ProbeConfig) -> Result<Verdict, ProbeError> {
        self.socket = None;
        tokio::time::sleep(config.inter_measure_time()).await;

        let mut stream = self.connect_post_probe(config).await?;
        let verdict = control::read_verdict(&mut stream).await?;
        info!("Server reported: {}", verdict);
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{ProbeStateMachine, RngEntropy};
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

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

    fn client_config() -> ClientConfig {
        ClientConfig {
            connect_retry_attempts: 50,
            connect_retry_interval_ms: 50,
            ..ClientConfig::default()
        }
    }

    /// Receives the config and both bursts, then answers with `verdict`.
    async fn fake_server(
        listener: TcpListener,
        verdict: Verdict,
    ) -> (ProbeConfig, Vec<Option<Entropy>>) {
        let (mut stream, _) = listener.accept().await.unwrap();
        let config = control::read_config(&mut stream).await.unwrap();
        let udp = UdpSocket::bind(("127.0.0.1", config.dst_port_udp))
            .await
            .unwrap();

        let mut classes = Vec::new();
        let mut buf = vec![0u8; config.udp_payload_size];
        for _ in 0..config.num_udp_packets * 2 {
            let (n, _) = udp.recv_from(&mut buf).await.unwrap();
            assert_eq!(n, config.udp_payload_size);
            classes.push(Entropy::classify(&buf[..n]));
        }
        drop(udp);

        let post = TcpListener::bind(("127.0.0.1", config.post_probe_port))
            .await
            .unwrap();
        let (mut stream, _) = post.accept().await.unwrap();
        control::write_verdict(&mut stream, verdict).await.unwrap();
        (config, classes)
    }

    #[tokio::test]
    async fn test_full_run_against_fake_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let probe = ProbeConfig {
            server_ip: "127.0.0.1".into(),
            src_port_udp: free_udp_port(),
            dst_port_udp: free_udp_port(),
            dst_port_tcp_head: 9999,
            dst_port_tcp_tail: 8888,
            pre_probe_port: listener.local_addr().unwrap().port(),
            post_probe_port: free_tcp_port(),
            udp_payload_size: 64,
            inter_measure_time: 1,
            num_udp_packets: 20,
            udp_ttl: 64,
        };
        let server = tokio::spawn(fake_server(listener, Verdict::CompressionDetected));

        let mut session = ClientSession::new(
            probe.clone(),
            client_config(),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            RngEntropy,
        )
        .with_handshake_gap(Duration::from_millis(200));
        let verdict = ProbeStateMachine::new().run(&mut session).await.unwrap();
        assert_eq!(verdict, Verdict::CompressionDetected);

        let (received, classes) = server.await.unwrap();
        assert_eq!(received, probe);
        assert!(classes[..20].iter().all(|c| *c == Some(Entropy::Low)));
        assert!(classes[20..].iter().all(|c| *c == Some(Entropy::High)));
    }

    #[tokio::test]
    async fn test_post_probe_gives_up_without_server() {
        let probe = ProbeConfig {
            server_ip: "127.0.0.1".into(),
            src_port_udp: 9876,
            dst_port_udp: 8765,
            dst_port_tcp_head: 9999,
            dst_port_tcp_tail: 8888,
            pre_probe_port: 7777,
            post_probe_port: free_tcp_port(),
            udp_payload_size: 64,
            inter_measure_time: 0,
            num_udp_packets: 1,
            udp_ttl: 64,
        };
        let client = ClientConfig {
            connect_retry_attempts: 3,
            connect_retry_interval_ms: 10,
            ..ClientConfig::default()
        };
        let mut session = ClientSession::new(
            probe.clone(),
            client,
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            RngEntropy,
        );
        let result = session.post_probe(&probe).await;
        assert!(matches!(result, Err(ProbeError::SocketSetup { .. })));
    }
}
