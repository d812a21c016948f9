//! Server configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub receive: ReceiveConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_pre_probe_port")]
    pub pre_probe_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiveConfig {
    /// Window closes this long after the first datagram of a burst
    #[serde(default = "default_idle_timeout_sec")]
    pub idle_timeout_sec: u64,
    /// How long to wait for a burst to start at all
    #[serde(default = "default_first_packet_timeout_sec")]
    pub first_packet_timeout_sec: u64,
    /// How long to wait for the client on the post-probe port
    #[serde(default = "default_accept_timeout_sec")]
    pub accept_timeout_sec: u64,
    /// SO_RCVBUF for the probe socket, in bytes
    #[serde(default = "default_recv_buffer_bytes")]
    pub recv_buffer_bytes: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            pre_probe_port: default_pre_probe_port(),
        }
    }
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            idle_timeout_sec: default_idle_timeout_sec(),
            first_packet_timeout_sec: default_first_packet_timeout_sec(),
            accept_timeout_sec: default_accept_timeout_sec(),
            recv_buffer_bytes: default_recv_buffer_bytes(),
        }
    }
}

impl ReceiveConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_sec)
    }

    pub fn first_packet_timeout(&self) -> Duration {
        Duration::from_secs(self.first_packet_timeout_sec)
    }

    pub fn accept_timeout(&self) -> Duration {
        Duration::from_secs(self.accept_timeout_sec)
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_pre_probe_port() -> u16 {
    7777
}

fn default_idle_timeout_sec() -> u64 {
    protocol::RECEIVE_IDLE_TIMEOUT.as_secs()
}

fn default_first_packet_timeout_sec() -> u64 {
    60
}

fn default_accept_timeout_sec() -> u64 {
    60
}

fn default_recv_buffer_bytes() -> usize {
    8 * 1024 * 1024
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config = toml::from_str(&content)
            .context("Failed to parse config file")?;

        if config.receive.idle_timeout_sec == 0 {
            anyhow::bail!("receive.idle_timeout_sec must be at least 1");
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.general.bind_address, "0.0.0.0");
        assert_eq!(config.general.pre_probe_port, 7777);
        assert_eq!(config.receive.idle_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            [general]
            pre_probe_port = 4000

            [receive]
            idle_timeout_sec = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.general.pre_probe_port, 4000);
        assert_eq!(config.general.bind_address, "0.0.0.0");
        assert_eq!(config.receive.idle_timeout_sec, 3);
        assert_eq!(config.receive.accept_timeout_sec, 60);
    }

    #[test]
    fn test_example_file_loads() {
        let config = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/../server.conf.example")).unwrap();
        assert_eq!(config.general.pre_probe_port, 7777);
        assert_eq!(config.receive.recv_buffer_bytes, 8 * 1024 * 1024);
    }
}
