//! Internet checksum (RFC 1071)

use std::net::Ipv4Addr;

/// IANA protocol number for TCP
pub const IPPROTO_TCP: u8 = 6;

/// Ones'-complement checksum of `buf`, read as big-endian 16-bit words.
///
/// An odd trailing byte is padded with a zero low byte. The result is meant to
/// be stored with `to_be_bytes`; a buffer holding its own correct checksum sums
/// to zero.
pub fn checksum(buf: &[u8]) -> u16 {
    let mut sum = sum_words(buf);
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Checksum of a TCP segment (header, options and data) under the IPv4
/// pseudo-header.
pub fn tcp_checksum(source: Ipv4Addr, destination: Ipv4Addr, segment: &[u8]) -> u16 {
    let mut pseudo = Vec::with_capacity(12 + segment.len());
    pseudo.extend_from_slice(&source.octets());
    pseudo.extend_from_slice(&destination.octets());
    pseudo.push(0);
    pseudo.push(IPPROTO_TCP);
    pseudo.extend_from_slice(&(segment.len() as u16).to_be_bytes());
    pseudo.extend_from_slice(segment);
    checksum(&pseudo)
}

fn sum_words(buf: &[u8]) -> u64 {
    let mut chunks = buf.chunks_exact(2);
    let mut sum = 0;
    for word in &mut chunks {
        sum += u16::from_be_bytes([word[0], word[1]]) as u64;
    }
    if let [last] = chunks.remainder() {
        sum += (*last as u64) << 8;
    }
    sum
}
