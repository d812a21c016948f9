//! Configuration management

use anyhow::{Context, Result};
use protocol::segment::parse_ipv4;
use protocol::{MARKER_SOURCE_PORT, ProbeConfig, RST_RECEIVE_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub probe: ProbeConfig,
    #[serde(default)]
    pub standalone: StandaloneConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StandaloneConfig {
    /// Source address written into marker SYNs; detected from the route to
    /// the server when unset
    #[serde(default)]
    pub source_address: Option<String>,
    #[serde(default = "default_marker_source_port")]
    pub marker_source_port: u16,
    /// RST capture gives up after this long without a new marker
    #[serde(default = "default_rst_timeout_sec")]
    pub rst_timeout_sec: u64,
    #[serde(default)]
    pub entropy_file: Option<PathBuf>,
}

impl Default for StandaloneConfig {
    fn default() -> Self {
        Self {
            source_address: None,
            marker_source_port: default_marker_source_port(),
            rst_timeout_sec: default_rst_timeout_sec(),
            entropy_file: None,
        }
    }
}

fn default_marker_source_port() -> u16 {
    MARKER_SOURCE_PORT
}

fn default_rst_timeout_sec() -> u64 {
    RST_RECEIVE_TIMEOUT.as_secs()
}

impl StandaloneConfig {
    pub fn rst_timeout(&self) -> Duration {
        Duration::from_secs(self.rst_timeout_sec)
    }

    /// Configured source address, or the local address the kernel would use
    /// to reach `probe.server_ip`.
    pub fn resolve_source(&self, probe: &ProbeConfig) -> Result<Ipv4Addr> {
        if let Some(source) = &self.source_address {
            return parse_ipv4(source).context("Invalid standalone.source_address");
        }

        let server = SocketAddr::new(probe.server_addr()?.into(), probe.dst_port_udp);
        // Connecting a UDP socket only selects a route; nothing is sent
        let socket = UdpSocket::bind("0.0.0.0:0").context("Failed to bind route probe socket")?;
        socket
            .connect(server)
            .with_context(|| format!("No route to {}", server))?;
        match socket.local_addr()? {
            SocketAddr::V4(local) if !local.ip().is_unspecified() => Ok(*local.ip()),
            other => anyhow::bail!("Could not detect a source IPv4 address (got {})", other),
        }
    }
}

impl Config {
    /// Load a TOML file, or a flat JSON object of probe settings when the
    /// extension is `.json`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = if path.extension().is_some_and(|ext| ext == "json") {
            let probe: ProbeConfig = serde_json::from_str(&contents)
                .with_context(|| "Failed to parse JSON config file")?;
            Self {
                probe,
                standalone: StandaloneConfig::default(),
            }
        } else {
            toml::from_str(&contents).with_context(|| "Failed to parse config file")?
        };

        config.probe.validate().context("Invalid [probe] settings")?;
        if config.standalone.rst_timeout_sec == 0 {
            anyhow::bail!("standalone.rst_timeout_sec must be at least 1");
        }
        if config.standalone.marker_source_port == 0 {
            anyhow::bail!("standalone.marker_source_port must be non-zero");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML: &str = r#"
        [probe]
        server_ip = "127.0.0.1"
        src_port_udp = 9876
        dst_port_udp = 8765
        dst_port_tcp_head = 9999
        dst_port_tcp_tail = 8888
        pre_probe_port = 7777
        post_probe_port = 6666
        udp_payload_size = 1000
        inter_measure_time = 15
        num_udp_packets = 6000
        udp_ttl = 255
    "#;

    #[test]
    fn test_standalone_defaults() {
        let config: Config = toml::from_str(TOML).unwrap();
        assert_eq!(config.standalone.marker_source_port, 12345);
        assert_eq!(config.standalone.rst_timeout(), Duration::from_secs(20));
        assert!(config.standalone.source_address.is_none());
    }

    #[test]
    fn test_explicit_source_address() {
        let contents = format!("{}\n[standalone]\nsource_address = \"198.51.100.7\"\n", TOML);
        let config: Config = toml::from_str(&contents).unwrap();
        let source = config.standalone.resolve_source(&config.probe).unwrap();
        assert_eq!(source, Ipv4Addr::new(198, 51, 100, 7));
    }

    #[test]
    fn test_source_detected_from_route() {
        let config: Config = toml::from_str(TOML).unwrap();
        let source = config.standalone.resolve_source(&config.probe).unwrap();
        assert!(source.is_loopback());
    }

    #[test]
    fn test_invalid_source_address() {
        let contents = format!("{}\n[standalone]\nsource_address = \"not-an-ip\"\n", TOML);
        let config: Config = toml::from_str(&contents).unwrap();
        assert!(config.standalone.resolve_source(&config.probe).is_err());
    }

    #[test]
    fn test_example_file_loads() {
        let config =
            Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/../standalone.conf.example")).unwrap();
        assert_eq!(config.probe.dst_port_tcp_head, 9999);
        assert_eq!(config.standalone.rst_timeout_sec, 20);
    }
}
