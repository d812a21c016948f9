//! Probe error types

use crate::phase::Phase;
use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Socket setup failed ({context}): {source}")]
    SocketSetup {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Send failed ({context}): {source}")]
    Send {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Receive timed out after {0:?}")]
    ReceiveTimeout(Duration),

    #[error("Receive failed: {0}")]
    Receive(#[source] io::Error),

    #[error("Malformed configuration: {0}")]
    ConfigMalformed(String),

    #[error("Entropy source unavailable: {0}")]
    EntropySourceUnavailable(String),

    #[error("Invalid IPv4 address: {0:?}")]
    InvalidAddress(String),

    #[error("Packet too small: expected at least {expected}, got {actual}")]
    PacketTooSmall { expected: usize, actual: usize },

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid verdict message: {0:?}")]
    InvalidVerdict(String),

    #[error("Illegal phase transition from {from:?} to {to}")]
    PhaseOrder { from: Option<Phase>, to: Phase },
}

impl ProbeError {
    pub fn socket_setup(context: impl Into<String>, source: io::Error) -> Self {
        Self::SocketSetup {
            context: context.into(),
            source,
        }
    }

    pub fn send(context: impl Into<String>, source: io::Error) -> Self {
        Self::Send {
            context: context.into(),
            source,
        }
    }

    /// Only a receive timeout lets a run continue with partial data.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ReceiveTimeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_timeouts_are_recoverable() {
        assert!(!ProbeError::ReceiveTimeout(Duration::from_secs(10)).is_fatal());
        assert!(ProbeError::ConfigMalformed("missing server_ip".into()).is_fatal());
        assert!(ProbeError::send("udp", io::Error::other("down")).is_fatal());
        assert!(ProbeError::EntropySourceUnavailable("eof".into()).is_fatal());
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = ProbeError::socket_setup(
            "bind 0.0.0.0:9876",
            io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        );
        assert!(err.to_string().contains("bind 0.0.0.0:9876"));
    }
}
