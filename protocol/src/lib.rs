//! Compression detection probing library
//!
//! Shared pieces of the client/server and standalone probing topologies:
//! entropy-tagged packet trains, raw SYN construction with Internet
//! checksums, control-channel framing, burst timing and the verdict rule.

pub mod checksum;
pub mod config;
pub mod constants;
pub mod control;
pub mod decision;
pub mod error;
pub mod phase;
pub mod segment;
pub mod timing;
pub mod train;
pub mod transport;

pub use config::ProbeConfig;
pub use constants::*;
pub use decision::{Detection, Verdict, decide};
pub use error::ProbeError;
pub use phase::{Phase, ProbeDriver, ProbeStateMachine};
pub use timing::{MarkKind, Measurement, TimingMark};
pub use train::{Entropy, EntropySource, FileEntropy, PacketTrain, RngEntropy};
