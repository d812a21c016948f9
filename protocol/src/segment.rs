//! IPv4 + TCP header encoding for marker SYN segments
//!
//! Headers are encoded and decoded field by field on byte slices; decoding a
//! truncated or inconsistent buffer fails instead of reading past its end.

use crate::checksum::{IPPROTO_TCP, checksum, tcp_checksum};
use crate::config::ProbeConfig;
use crate::constants::{SYN_TTL, SYN_WINDOW, TCP_OPTION_PADDING};
use crate::error::ProbeError;
use std::net::Ipv4Addr;

/// TCP flag bits
pub struct TcpFlags;

impl TcpFlags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;
}

/// Parse a dotted-quad IPv4 address.
pub fn parse_ipv4(addr: &str) -> Result<Ipv4Addr, ProbeError> {
    addr.trim()
        .parse()
        .map_err(|_| ProbeError::InvalidAddress(addr.to_string()))
}

/// IPv4 header (options are skipped on decode, never emitted)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Header {
    /// Header length in 32-bit words
    pub ihl: u8,
    pub tos: u8,
    pub total_length: u16,
    pub identification: u16,
    /// Flags (3 bits) and fragment offset (13 bits)
    pub fragment: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

impl Ipv4Header {
    pub const SIZE: usize = 20;

    pub fn header_len(&self) -> usize {
        self.ihl as usize * 4
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0] = (4 << 4) | (self.ihl & 0x0F);
        bytes[1] = self.tos;
        bytes[2..4].copy_from_slice(&self.total_length.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.identification.to_be_bytes());
        bytes[6..8].copy_from_slice(&self.fragment.to_be_bytes());
        bytes[8] = self.ttl;
        bytes[9] = self.protocol;
        bytes[10..12].copy_from_slice(&self.checksum.to_be_bytes());
        bytes[12..16].copy_from_slice(&self.source.octets());
        bytes[16..20].copy_from_slice(&self.destination.octets());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProbeError> {
        if bytes.len() < Self::SIZE {
            return Err(ProbeError::PacketTooSmall {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }

        let version = bytes[0] >> 4;
        if version != 4 {
            return Err(ProbeError::InvalidHeader(format!("IP version {}", version)));
        }

        let ihl = bytes[0] & 0x0F;
        let header_len = ihl as usize * 4;
        if header_len < Self::SIZE {
            return Err(ProbeError::InvalidHeader(format!("IHL {}", ihl)));
        }
        if bytes.len() < header_len {
            return Err(ProbeError::PacketTooSmall {
                expected: header_len,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            ihl,
            tos: bytes[1],
            total_length: u16::from_be_bytes([bytes[2], bytes[3]]),
            identification: u16::from_be_bytes([bytes[4], bytes[5]]),
            fragment: u16::from_be_bytes([bytes[6], bytes[7]]),
            ttl: bytes[8],
            protocol: bytes[9],
            checksum: u16::from_be_bytes([bytes[10], bytes[11]]),
            source: Ipv4Addr::new(bytes[12], bytes[13], bytes[14], bytes[15]),
            destination: Ipv4Addr::new(bytes[16], bytes[17], bytes[18], bytes[19]),
        })
    }
}

/// TCP header without options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpHeader {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence: u32,
    pub acknowledgement: u32,
    /// Header length in 32-bit words, options included
    pub data_offset: u8,
    pub flags: u8,
    pub window: u16,
    pub checksum: u16,
    pub urgent_pointer: u16,
}

impl TcpHeader {
    pub const SIZE: usize = 20;

    pub fn has(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    pub fn is_rst(&self) -> bool {
        self.has(TcpFlags::RST)
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..2].copy_from_slice(&self.source_port.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.destination_port.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.sequence.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.acknowledgement.to_be_bytes());
        bytes[12] = self.data_offset << 4;
        bytes[13] = self.flags;
        bytes[14..16].copy_from_slice(&self.window.to_be_bytes());
        bytes[16..18].copy_from_slice(&self.checksum.to_be_bytes());
        bytes[18..20].copy_from_slice(&self.urgent_pointer.to_be_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProbeError> {
        if bytes.len() < Self::SIZE {
            return Err(ProbeError::PacketTooSmall {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            source_port: u16::from_be_bytes([bytes[0], bytes[1]]),
            destination_port: u16::from_be_bytes([bytes[2], bytes[3]]),
            sequence: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            acknowledgement: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            data_offset: bytes[12] >> 4,
            flags: bytes[13],
            window: u16::from_be_bytes([bytes[14], bytes[15]]),
            checksum: u16::from_be_bytes([bytes[16], bytes[17]]),
            urgent_pointer: u16::from_be_bytes([bytes[18], bytes[19]]),
        })
    }
}

/// Decode the IPv4 and TCP headers of a captured datagram.
pub fn decode_tcp_datagram(bytes: &[u8]) -> Result<(Ipv4Header, TcpHeader), ProbeError> {
    let ip = Ipv4Header::from_bytes(bytes)?;
    if ip.protocol != IPPROTO_TCP {
        return Err(ProbeError::InvalidHeader(format!(
            "protocol {} is not TCP",
            ip.protocol
        )));
    }
    let tcp = TcpHeader::from_bytes(&bytes[ip.header_len()..])?;
    Ok((ip, tcp))
}

/// A complete, checksummed IPv4 datagram carrying one TCP segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSegment {
    bytes: Vec<u8>,
}

impl RawSegment {
    pub const LEN: usize = Ipv4Header::SIZE + TcpHeader::SIZE + TCP_OPTION_PADDING;

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn ip_header(&self) -> Result<Ipv4Header, ProbeError> {
        Ipv4Header::from_bytes(&self.bytes)
    }

    pub fn tcp_header(&self) -> Result<TcpHeader, ProbeError> {
        decode_tcp_datagram(&self.bytes).map(|(_, tcp)| tcp)
    }

    pub fn destination(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.bytes[16], self.bytes[17], self.bytes[18], self.bytes[19])
    }
}

/// Builds bare SYN segments between one fixed source and destination
#[derive(Debug, Clone)]
pub struct SynBuilder {
    source: Ipv4Addr,
    destination: Ipv4Addr,
    source_port: u16,
}

impl SynBuilder {
    pub fn new(source: Ipv4Addr, destination: Ipv4Addr, source_port: u16) -> Self {
        Self {
            source,
            destination,
            source_port,
        }
    }

    /// Builder towards the configured server from a (possibly spoofed) source.
    pub fn from_config(
        config: &ProbeConfig,
        source: Ipv4Addr,
        source_port: u16,
    ) -> Result<Self, ProbeError> {
        Ok(Self::new(source, config.server_addr()?, source_port))
    }

    pub fn source(&self) -> Ipv4Addr {
        self.source
    }

    pub fn destination(&self) -> Ipv4Addr {
        self.destination
    }

    /// SYN to `dest_port` with a random IP identifier.
    pub fn build(&self, dest_port: u16, sequence: u32) -> RawSegment {
        self.build_with_id(dest_port, sequence, rand::random())
    }

    pub fn build_with_id(&self, dest_port: u16, sequence: u32, identification: u16) -> RawSegment {
        let tcp_len = TcpHeader::SIZE + TCP_OPTION_PADDING;
        let mut tcp = TcpHeader {
            source_port: self.source_port,
            destination_port: dest_port,
            sequence,
            acknowledgement: 0,
            data_offset: (tcp_len / 4) as u8,
            flags: TcpFlags::SYN,
            window: SYN_WINDOW,
            checksum: 0,
            urgent_pointer: 0,
        };
        let mut ip = Ipv4Header {
            ihl: (Ipv4Header::SIZE / 4) as u8,
            tos: 0,
            total_length: RawSegment::LEN as u16,
            identification,
            fragment: 0,
            ttl: SYN_TTL,
            protocol: IPPROTO_TCP,
            checksum: 0,
            source: self.source,
            destination: self.destination,
        };

        let mut segment = Vec::with_capacity(tcp_len);
        segment.extend_from_slice(&tcp.to_bytes());
        segment.resize(tcp_len, 0);
        tcp.checksum = tcp_checksum(self.source, self.destination, &segment);
        segment[..TcpHeader::SIZE].copy_from_slice(&tcp.to_bytes());

        let mut bytes = Vec::with_capacity(RawSegment::LEN);
        bytes.extend_from_slice(&ip.to_bytes());
        bytes.extend_from_slice(&segment);
        // Covers the whole datagram; the kernel rewrites it on IP_HDRINCL sends anyway
        ip.checksum = checksum(&bytes);
        bytes[..Ipv4Header::SIZE].copy_from_slice(&ip.to_bytes());

        RawSegment { bytes }
    }
}

/// SYN from `source` to the configured server's `dest_port`.
pub fn build_syn(
    config: &ProbeConfig,
    source: Ipv4Addr,
    source_port: u16,
    dest_port: u16,
    sequence: u32,
) -> Result<RawSegment, ProbeError> {
    Ok(SynBuilder::from_config(config, source, source_port)?.build(dest_port, sequence))
}
