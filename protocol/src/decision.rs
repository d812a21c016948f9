//! Compression verdict from the two burst durations

use crate::constants::DETECTION_THRESHOLD_MS;
use crate::error::ProbeError;
use crate::timing::Measurement;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    CompressionDetected,
    NoCompressionDetected,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompressionDetected => "Compression detected",
            Self::NoCompressionDetected => "No compression detected",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Compression detected" => Ok(Self::CompressionDetected),
            "No compression detected" => Ok(Self::NoCompressionDetected),
            other => Err(ProbeError::InvalidVerdict(other.to_string())),
        }
    }
}

/// Compression is reported when the durations differ by strictly more than
/// the threshold, in either direction.
pub fn decide(high_duration_ms: f64, low_duration_ms: f64) -> Verdict {
    if (high_duration_ms - low_duration_ms).abs() > DETECTION_THRESHOLD_MS {
        Verdict::CompressionDetected
    } else {
        Verdict::NoCompressionDetected
    }
}

/// Both durations, their signed delta and the resulting verdict
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub high_ms: f64,
    pub low_ms: f64,
    /// `high_ms - low_ms`
    pub delta_ms: f64,
    pub verdict: Verdict,
}

impl Detection {
    pub fn new(high_ms: f64, low_ms: f64) -> Self {
        Self {
            high_ms,
            low_ms,
            delta_ms: high_ms - low_ms,
            verdict: decide(high_ms, low_ms),
        }
    }

    pub fn from_measurements(high: &Measurement, low: &Measurement) -> Self {
        Self::new(high.duration_ms(), low.duration_ms())
    }
}
