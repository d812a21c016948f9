//! Probe phase sequencing
//!
//! Every topology runs the same fixed order:
//! PRE_PROBE -> PROBE_LOW -> SETTLE -> PROBE_HIGH -> POST_PROBE -> DONE.
//! A [`ProbeDriver`] supplies what each phase does at its end of the path.

use crate::config::ProbeConfig;
use crate::decision::Verdict;
use crate::error::ProbeError;
use crate::train::Entropy;
use std::fmt;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PreProbe,
    ProbeLow,
    Settle,
    ProbeHigh,
    PostProbe,
    Done,
}

impl Phase {
    pub const ORDER: [Phase; 6] = [
        Phase::PreProbe,
        Phase::ProbeLow,
        Phase::Settle,
        Phase::ProbeHigh,
        Phase::PostProbe,
        Phase::Done,
    ];

    pub fn next(self) -> Option<Phase> {
        match self {
            Self::PreProbe => Some(Self::ProbeLow),
            Self::ProbeLow => Some(Self::Settle),
            Self::Settle => Some(Self::ProbeHigh),
            Self::ProbeHigh => Some(Self::PostProbe),
            Self::PostProbe => Some(Self::Done),
            Self::Done => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PreProbe => "PRE_PROBE",
            Self::ProbeLow => "PROBE_LOW",
            Self::Settle => "SETTLE",
            Self::ProbeHigh => "PROBE_HIGH",
            Self::PostProbe => "POST_PROBE",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// One end of a probing run.
#[allow(async_fn_in_trait)]
pub trait ProbeDriver {
    /// Obtain the run's configuration (load it, send it or receive it).
    async fn pre_probe(&mut self) -> Result<ProbeConfig, ProbeError>;

    /// Emit or measure one burst.
    async fn probe(&mut self, config: &ProbeConfig, entropy: Entropy) -> Result<(), ProbeError>;

    /// Pause between the two bursts.
    async fn settle(&mut self, delay: Duration) -> Result<(), ProbeError>;

    /// Produce and deliver the verdict.
    async fn post_probe(&mut self, config: &ProbeConfig) -> Result<Verdict, ProbeError>;
}

/// Runs a driver through the phases exactly once, in order.
#[derive(Debug)]
pub struct ProbeStateMachine {
    phase: Option<Phase>,
    visited: Vec<Phase>,
}

impl Default for ProbeStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeStateMachine {
    pub fn new() -> Self {
        Self {
            phase: None,
            visited: Vec::with_capacity(Phase::ORDER.len()),
        }
    }

    /// Current phase, `None` before the run starts
    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    pub fn visited(&self) -> &[Phase] {
        &self.visited
    }

    fn enter(&mut self, next: Phase) -> Result<(), ProbeError> {
        let expected = match self.phase {
            None => Some(Phase::PreProbe),
            Some(current) => current.next(),
        };
        if expected != Some(next) {
            return Err(ProbeError::PhaseOrder {
                from: self.phase,
                to: next,
            });
        }
        info!("Entering {}", next);
        self.phase = Some(next);
        self.visited.push(next);
        Ok(())
    }

    /// A machine runs once; a second call fails without touching the driver.
    pub async fn run<D: ProbeDriver>(&mut self, driver: &mut D) -> Result<Verdict, ProbeError> {
        self.enter(Phase::PreProbe)?;
        let config = driver.pre_probe().await?;
        config.validate()?;

        self.enter(Phase::ProbeLow)?;
        driver.probe(&config, Entropy::Low).await?;

        self.enter(Phase::Settle)?;
        driver.settle(config.inter_measure_time()).await?;

        self.enter(Phase::ProbeHigh)?;
        driver.probe(&config, Entropy::High).await?;

        self.enter(Phase::PostProbe)?;
        let verdict = driver.post_probe(&config).await?;

        self.enter(Phase::Done)?;
        info!("Run complete: {}", verdict);
        Ok(verdict)
    }
}
