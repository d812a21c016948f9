//! Entropy-tagged UDP packet trains
//!
//! Every payload starts with the big-endian packet index. Low-entropy
//! payloads are zero after the tag; high-entropy payloads reuse one random
//! fill for the whole burst and only rewrite the tag per packet.

use crate::constants::{MAX_UDP_PAYLOAD, SEQUENCE_TAG_LEN};
use crate::error::ProbeError;
use rand::RngCore;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

/// Payload class of a burst
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entropy {
    Low,
    High,
}

impl Entropy {
    /// Classify a received payload. Payloads too short to carry anything past
    /// the tag cannot be told apart and yield `None`.
    pub fn classify(payload: &[u8]) -> Option<Self> {
        let body = payload.get(SEQUENCE_TAG_LEN..)?;
        if body.is_empty() {
            return None;
        }
        if body.iter().all(|&b| b == 0) {
            Some(Self::Low)
        } else {
            Some(Self::High)
        }
    }
}

impl fmt::Display for Entropy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => f.write_str("low entropy"),
            Self::High => f.write_str("high entropy"),
        }
    }
}

/// Provider of random bytes for high-entropy payloads
pub trait EntropySource {
    /// Fill `buf` completely or fail with `EntropySourceUnavailable`.
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), ProbeError>;
}

/// Thread-local RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct RngEntropy;

impl EntropySource for RngEntropy {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), ProbeError> {
        rand::thread_rng()
            .try_fill_bytes(buf)
            .map_err(|e| ProbeError::EntropySourceUnavailable(e.to_string()))
    }
}

/// Random bytes read from the start of a file (e.g. a dump of /dev/urandom)
#[derive(Debug, Clone)]
pub struct FileEntropy {
    path: PathBuf,
}

impl FileEntropy {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl EntropySource for FileEntropy {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), ProbeError> {
        let mut file = File::open(&self.path).map_err(|e| {
            ProbeError::EntropySourceUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        file.read_exact(buf).map_err(|e| {
            ProbeError::EntropySourceUnavailable(format!(
                "{}: cannot read {} bytes: {}",
                self.path.display(),
                buf.len(),
                e
            ))
        })
    }
}

impl<S: EntropySource + ?Sized> EntropySource for Box<S> {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), ProbeError> {
        (**self).fill(buf)
    }
}

/// Reject payload sizes that cannot carry the tag or do not fit a datagram.
pub fn validate_payload_size(payload_size: usize) -> Result<(), ProbeError> {
    if payload_size < SEQUENCE_TAG_LEN {
        return Err(ProbeError::ConfigMalformed(format!(
            "udp_payload_size {} leaves no room for the {}-byte sequence tag",
            payload_size, SEQUENCE_TAG_LEN
        )));
    }
    if payload_size > MAX_UDP_PAYLOAD {
        return Err(ProbeError::ConfigMalformed(format!(
            "udp_payload_size {} exceeds the UDP maximum of {}",
            payload_size, MAX_UDP_PAYLOAD
        )));
    }
    Ok(())
}

/// Read the packet index tag of a received payload.
pub fn sequence_of(payload: &[u8]) -> Option<u16> {
    match payload {
        [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

fn stamp(payload: &mut [u8], index: u16) {
    payload[..SEQUENCE_TAG_LEN].copy_from_slice(&index.to_be_bytes());
}

/// One low-entropy payload: zeros except the index tag.
pub fn build_low_entropy(payload_size: usize, index: u16) -> Result<Vec<u8>, ProbeError> {
    validate_payload_size(payload_size)?;
    let mut payload = vec![0u8; payload_size];
    stamp(&mut payload, index);
    Ok(payload)
}

/// One high-entropy payload drawn from `random_source`.
///
/// Bursts should use [`PacketTrain::high`], which draws once per burst.
pub fn build_high_entropy<S: EntropySource + ?Sized>(
    payload_size: usize,
    random_source: &mut S,
    index: u16,
) -> Result<Vec<u8>, ProbeError> {
    validate_payload_size(payload_size)?;
    let mut payload = vec![0u8; payload_size];
    random_source.fill(&mut payload)?;
    stamp(&mut payload, index);
    Ok(payload)
}

/// A burst of `count` equally sized payloads sharing one backing buffer.
#[derive(Debug, Clone)]
pub struct PacketTrain {
    entropy: Entropy,
    payload: Vec<u8>,
    count: u32,
}

impl PacketTrain {
    pub fn low(payload_size: usize, count: u32) -> Result<Self, ProbeError> {
        let payload = build_low_entropy(payload_size, 0)?;
        Ok(Self {
            entropy: Entropy::Low,
            payload,
            count,
        })
    }

    pub fn high<S: EntropySource + ?Sized>(
        payload_size: usize,
        count: u32,
        random_source: &mut S,
    ) -> Result<Self, ProbeError> {
        let payload = build_high_entropy(payload_size, random_source, 0)?;
        Ok(Self {
            entropy: Entropy::High,
            payload,
            count,
        })
    }

    pub fn build<S: EntropySource + ?Sized>(
        entropy: Entropy,
        payload_size: usize,
        count: u32,
        random_source: &mut S,
    ) -> Result<Self, ProbeError> {
        match entropy {
            Entropy::Low => Self::low(payload_size, count),
            Entropy::High => Self::high(payload_size, count, random_source),
        }
    }

    pub fn entropy(&self) -> Entropy {
        self.entropy
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }

    /// Payload of packet `index`. Indices past `u16::MAX` wrap in the tag.
    pub fn packet(&mut self, index: u32) -> &[u8] {
        stamp(&mut self.payload, index as u16);
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic source: counts up from a seed
    struct Counting(u8);

    impl EntropySource for Counting {
        fn fill(&mut self, buf: &mut [u8]) -> Result<(), ProbeError> {
            for b in buf.iter_mut() {
                *b = self.0;
                self.0 = self.0.wrapping_add(1);
            }
            Ok(())
        }
    }

    struct Empty;

    impl EntropySource for Empty {
        fn fill(&mut self, _buf: &mut [u8]) -> Result<(), ProbeError> {
            Err(ProbeError::EntropySourceUnavailable("empty".into()))
        }
    }

    #[test]
    fn test_low_entropy_tag_and_zero_body() {
        for i in [0u16, 1, 255, 256, 4097, u16::MAX] {
            let payload = build_low_entropy(64, i).unwrap();
            assert_eq!(payload.len(), 64);
            assert_eq!(&payload[0..2], &i.to_be_bytes());
            assert!(payload[2..].iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_high_entropy_tag_overwrites_random_prefix() {
        let payload = build_high_entropy(16, &mut Counting(7), 0x0102).unwrap();
        assert_eq!(&payload[0..2], &[0x01, 0x02]);
        assert_eq!(payload[2], 9);
    }

    #[test]
    fn test_high_train_reuses_one_fill() {
        let mut train = PacketTrain::high(32, 20, &mut Counting(1)).unwrap();
        let body = train.packet(0)[2..].to_vec();
        for i in 0..train.len() {
            let packet = train.packet(i);
            assert_eq!(sequence_of(packet), Some(i as u16));
            assert_eq!(&packet[2..], &body[..]);
        }
    }

    #[test]
    fn test_low_train_packets() {
        let mut train = PacketTrain::low(8, 3).unwrap();
        assert_eq!(train.entropy(), Entropy::Low);
        assert_eq!(train.packet(2), &[0, 2, 0, 0, 0, 0, 0, 0]);
        assert_eq!(train.packet(70_000)[..2], (70_000u32 as u16).to_be_bytes());
    }

    #[test]
    fn test_payload_size_bounds() {
        assert!(matches!(
            build_low_entropy(1, 0),
            Err(ProbeError::ConfigMalformed(_))
        ));
        assert!(build_low_entropy(2, 0).is_ok());
        assert!(PacketTrain::low(MAX_UDP_PAYLOAD + 1, 1).is_err());
    }

    #[test]
    fn test_missing_entropy_is_reported() {
        assert!(matches!(
            PacketTrain::high(64, 10, &mut Empty),
            Err(ProbeError::EntropySourceUnavailable(_))
        ));
        let mut source = FileEntropy::new("/nonexistent/random_file");
        assert!(matches!(
            build_high_entropy(64, &mut source, 0),
            Err(ProbeError::EntropySourceUnavailable(_))
        ));
    }

    #[test]
    fn test_short_entropy_file_is_unavailable() {
        let path = std::env::temp_dir().join(format!("compdetect-entropy-{}", std::process::id()));
        std::fs::write(&path, [1u8; 8]).unwrap();
        let mut source = FileEntropy::new(&path);
        assert!(build_high_entropy(8, &mut source, 0).is_ok());
        assert!(build_high_entropy(9, &mut source, 0).is_err());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_classify() {
        assert_eq!(Entropy::classify(&build_low_entropy(64, 9).unwrap()), Some(Entropy::Low));
        let mut train = PacketTrain::high(64, 1, &mut Counting(3)).unwrap();
        assert_eq!(Entropy::classify(train.packet(0)), Some(Entropy::High));
        assert_eq!(Entropy::classify(&[0, 1]), None);
        assert_eq!(Entropy::classify(&[]), None);
    }

    #[test]
    fn test_rng_source_fills() {
        let mut train = PacketTrain::high(256, 2, &mut RngEntropy).unwrap();
        assert_eq!(train.payload_size(), 256);
        assert_eq!(Entropy::classify(train.packet(1)), Some(Entropy::High));
    }
}
