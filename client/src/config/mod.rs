//! Configuration management

use anyhow::{Context, Result};
use protocol::ProbeConfig;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub probe: ProbeConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Random bytes for high-entropy payloads; the thread RNG when unset
    #[serde(default)]
    pub entropy_file: Option<PathBuf>,
    /// Gap between datagrams of one burst, 0 for back-to-back
    #[serde(default)]
    pub inter_packet_delay_us: u64,
    #[serde(default = "default_connect_retry_attempts")]
    pub connect_retry_attempts: u32,
    #[serde(default = "default_connect_retry_interval_ms")]
    pub connect_retry_interval_ms: u64,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            entropy_file: None,
            inter_packet_delay_us: 0,
            connect_retry_attempts: default_connect_retry_attempts(),
            connect_retry_interval_ms: default_connect_retry_interval_ms(),
            bind_address: default_bind_address(),
        }
    }
}

impl ClientConfig {
    pub fn connect_retry_interval(&self) -> Duration {
        Duration::from_millis(self.connect_retry_interval_ms)
    }

    pub fn bind_ip(&self) -> Result<IpAddr> {
        self.bind_address
            .parse()
            .with_context(|| format!("Invalid client.bind_address: {}", self.bind_address))
    }
}

fn default_connect_retry_attempts() -> u32 {
    30
}

fn default_connect_retry_interval_ms() -> u64 {
    500
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

impl Config {
    /// Load a TOML file, or a flat JSON object of probe settings when the
    /// extension is `.json`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json(&contents)?
        } else {
            toml::from_str(&contents).with_context(|| "Failed to parse config file")?
        };

        config.validate()?;
        Ok(config)
    }

    fn from_json(contents: &str) -> Result<Self> {
        let probe: ProbeConfig =
            serde_json::from_str(contents).with_context(|| "Failed to parse JSON config file")?;
        Ok(Self {
            probe,
            client: ClientConfig::default(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.probe.validate().context("Invalid [probe] settings")?;
        self.client.bind_ip()?;
        if self.client.connect_retry_attempts == 0 {
            anyhow::bail!("client.connect_retry_attempts must be at least 1");
        }
        Ok(())
    }
}
