//! Phase timestamps and the durations derived from them

use crate::train::Entropy;
use std::time::{Duration, Instant};

/// Which phase boundary a timestamp marks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkKind {
    LowStart,
    LowEnd,
    HighStart,
    HighEnd,
}

impl MarkKind {
    pub fn start_of(entropy: Entropy) -> Self {
        match entropy {
            Entropy::Low => Self::LowStart,
            Entropy::High => Self::HighStart,
        }
    }

    pub fn end_of(entropy: Entropy) -> Self {
        match entropy {
            Entropy::Low => Self::LowEnd,
            Entropy::High => Self::HighEnd,
        }
    }

    pub fn entropy(self) -> Entropy {
        match self {
            Self::LowStart | Self::LowEnd => Entropy::Low,
            Self::HighStart | Self::HighEnd => Entropy::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingMark {
    pub kind: MarkKind,
    pub at: Instant,
}

impl TimingMark {
    pub fn now(kind: MarkKind) -> Self {
        Self::at(kind, Instant::now())
    }

    pub fn at(kind: MarkKind, at: Instant) -> Self {
        Self { kind, at }
    }
}

/// Duration of one burst as seen by the measuring end
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub entropy: Entropy,
    pub duration: Duration,
    /// Datagrams (or markers) that contributed to the measurement
    pub packets: u32,
}

impl Measurement {
    /// End before start yields a zero duration.
    pub fn from_marks(start: TimingMark, end: TimingMark, packets: u32) -> Self {
        debug_assert_eq!(start.kind.entropy(), end.kind.entropy());
        Self {
            entropy: start.kind.entropy(),
            duration: end.at.saturating_duration_since(start.at),
            packets,
        }
    }

    /// Nothing arrived for this phase.
    pub fn empty(entropy: Entropy) -> Self {
        Self {
            entropy,
            duration: Duration::ZERO,
            packets: 0,
        }
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }
}
