//! Probe configuration shared by both ends of a measurement

use crate::error::ProbeError;
use crate::segment::parse_ipv4;
use crate::train::validate_payload_size;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

/// Parameters of one probing run.
///
/// Numeric fields travel as strings on the wire; numbers are accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub server_ip: String,
    #[serde(with = "textual")]
    pub src_port_udp: u16,
    #[serde(with = "textual")]
    pub dst_port_udp: u16,
    #[serde(with = "textual")]
    pub dst_port_tcp_head: u16,
    #[serde(with = "textual")]
    pub dst_port_tcp_tail: u16,
    #[serde(with = "textual")]
    pub pre_probe_port: u16,
    #[serde(with = "textual")]
    pub post_probe_port: u16,
    #[serde(with = "textual")]
    pub udp_payload_size: usize,
    /// Settle delay between the two bursts, in seconds
    #[serde(with = "textual")]
    pub inter_measure_time: u64,
    #[serde(with = "textual")]
    pub num_udp_packets: u32,
    #[serde(with = "textual")]
    pub udp_ttl: u8,
}

impl ProbeConfig {
    /// Check every field before any socket is opened.
    pub fn validate(&self) -> Result<(), ProbeError> {
        self.server_addr()?;

        let ports = [
            ("src_port_udp", self.src_port_udp),
            ("dst_port_udp", self.dst_port_udp),
            ("dst_port_tcp_head", self.dst_port_tcp_head),
            ("dst_port_tcp_tail", self.dst_port_tcp_tail),
            ("pre_probe_port", self.pre_probe_port),
            ("post_probe_port", self.post_probe_port),
        ];
        for (name, port) in ports {
            if port == 0 {
                return Err(ProbeError::ConfigMalformed(format!("{} must be non-zero", name)));
            }
        }

        validate_payload_size(self.udp_payload_size)?;

        if self.num_udp_packets == 0 {
            return Err(ProbeError::ConfigMalformed(
                "num_udp_packets must be at least 1".into(),
            ));
        }
        if self.udp_ttl == 0 {
            return Err(ProbeError::ConfigMalformed("udp_ttl must be at least 1".into()));
        }

        Ok(())
    }

    pub fn server_addr(&self) -> Result<Ipv4Addr, ProbeError> {
        parse_ipv4(&self.server_ip)
    }

    pub fn inter_measure_time(&self) -> Duration {
        Duration::from_secs(self.inter_measure_time)
    }

    fn server_socket(&self, port: u16) -> Result<SocketAddr, ProbeError> {
        Ok(SocketAddr::V4(SocketAddrV4::new(self.server_addr()?, port)))
    }

    pub fn udp_destination(&self) -> Result<SocketAddr, ProbeError> {
        self.server_socket(self.dst_port_udp)
    }

    pub fn pre_probe_addr(&self) -> Result<SocketAddr, ProbeError> {
        self.server_socket(self.pre_probe_port)
    }

    pub fn post_probe_addr(&self) -> Result<SocketAddr, ProbeError> {
        self.server_socket(self.post_probe_port)
    }
}

/// Numbers serialized as strings, deserialized from either form
mod textual {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::fmt::Display;
    use std::str::FromStr;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        Text(String),
    }

    pub fn serialize<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr + TryFrom<u64>,
        <T as FromStr>::Err: Display,
        D: Deserializer<'de>,
    {
        match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Number(n) => {
                T::try_from(n).map_err(|_| de::Error::custom(format!("{} is out of range", n)))
            }
            NumberOrString::Text(s) => s
                .trim()
                .parse()
                .map_err(|e| de::Error::custom(format!("{:?}: {}", s, e))),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_config() -> ProbeConfig {
        ProbeConfig {
            server_ip: "192.0.2.10".into(),
            src_port_udp: 9876,
            dst_port_udp: 8765,
            dst_port_tcp_head: 9999,
            dst_port_tcp_tail: 8888,
            pre_probe_port: 7777,
            post_probe_port: 6666,
            udp_payload_size: 1000,
            inter_measure_time: 15,
            num_udp_packets: 6000,
            udp_ttl: 255,
        }
    }

    #[test]
    fn test_parse_string_valued_json() {
        let json = r#"{
            "server_ip": "192.0.2.10",
            "src_port_udp": "9876",
            "dst_port_udp": "8765",
            "dst_port_tcp_head": "9999",
            "dst_port_tcp_tail": "8888",
            "pre_probe_port": "7777",
            "post_probe_port": "6666",
            "udp_payload_size": "1000",
            "inter_measure_time": "15",
            "num_udp_packets": "6000",
            "udp_ttl": "255"
        }"#;
        let config: ProbeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config, sample_config());
    }

    #[test]
    fn test_numbers_accepted_and_strings_emitted() {
        let json = serde_json::to_value(sample_config()).unwrap();
        assert_eq!(json["udp_ttl"], "255");
        assert_eq!(json["server_ip"], "192.0.2.10");

        let mut numeric = json.clone();
        numeric["num_udp_packets"] = serde_json::json!(20);
        let config: ProbeConfig = serde_json::from_value(numeric).unwrap();
        assert_eq!(config.num_udp_packets, 20);
    }

    #[test]
    fn test_out_of_range_and_missing_fields() {
        let mut json = serde_json::to_value(sample_config()).unwrap();
        json["udp_ttl"] = serde_json::json!("256");
        assert!(serde_json::from_value::<ProbeConfig>(json.clone()).is_err());

        json["udp_ttl"] = serde_json::json!(70000);
        assert!(serde_json::from_value::<ProbeConfig>(json.clone()).is_err());

        json.as_object_mut().unwrap().remove("udp_ttl");
        assert!(serde_json::from_value::<ProbeConfig>(json).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(sample_config().validate().is_ok());

        let mut config = sample_config();
        config.dst_port_udp = 0;
        assert!(matches!(config.validate(), Err(ProbeError::ConfigMalformed(_))));

        let mut config = sample_config();
        config.udp_payload_size = 1;
        assert!(config.validate().is_err());

        let mut config = sample_config();
        config.num_udp_packets = 0;
        assert!(config.validate().is_err());

        let mut config = sample_config();
        config.server_ip = "not-an-ip".into();
        assert!(matches!(config.validate(), Err(ProbeError::InvalidAddress(_))));
    }

    #[test]
    fn test_addresses() {
        let config = sample_config();
        assert_eq!(config.udp_destination().unwrap().to_string(), "192.0.2.10:8765");
        assert_eq!(config.pre_probe_addr().unwrap().port(), 7777);
        assert_eq!(config.post_probe_addr().unwrap().port(), 6666);
        assert_eq!(config.inter_measure_time(), Duration::from_secs(15));
    }
}
