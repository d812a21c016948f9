//! Protocol constants shared by every probing topology

use std::time::Duration;

/// Bytes at the start of every UDP payload carrying the big-endian packet index
pub const SEQUENCE_TAG_LEN: usize = 2;

/// Largest UDP payload that fits an IPv4 datagram
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Zero option bytes appended to every marker SYN
pub const TCP_OPTION_PADDING: usize = 20;

/// TTL of hand-built marker segments
pub const SYN_TTL: u8 = 255;

/// Advertised window of marker segments
pub const SYN_WINDOW: u16 = 5840;

/// Default source port of marker segments
pub const MARKER_SOURCE_PORT: u16 = 12345;

/// Base TCP sequence number of marker segments; the marker index is added to it
pub const MARKER_SEQUENCE_BASE: u32 = 0x4344_0000;

/// Verdict threshold on the high/low duration delta (milliseconds)
pub const DETECTION_THRESHOLD_MS: f64 = 100.0;

/// Server window closes this long after the first datagram of a burst
pub const RECEIVE_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Standalone RST listener gives up after this long without progress
pub const RST_RECEIVE_TIMEOUT: Duration = Duration::from_secs(20);

/// Pause between the config exchange and the first burst
pub const HANDSHAKE_GAP: Duration = Duration::from_secs(1);

/// Largest accepted config frame body
pub const MAX_CONFIG_FRAME: usize = 64 * 1024;

/// Read size of the verdict channel
pub const VERDICT_BUFFER_SIZE: usize = 1024;

/// Receive buffer for captured raw datagrams
pub const CAPTURE_BUFFER_SIZE: usize = 1500;
