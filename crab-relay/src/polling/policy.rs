//! Polling interval policy and loop phases

use std::fmt;
use std::time::Duration;

/// Scheduler phase
///
/// `Stopped → FastPoll → SteadyPoll → Stopped`; the `FastPoll → SteadyPoll`
/// transition happens once per process unless explicitly reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Stopped,
    FastPoll,
    SteadyPoll,
}

impl fmt::Display for PollPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollPhase::Stopped => write!(f, "stopped"),
            PollPhase::FastPoll => write!(f, "fast_poll"),
            PollPhase::SteadyPoll => write!(f, "steady_poll"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollingIntervalPolicy {
    /// Steady-state interval before any pushed update
    pub base: Duration,
    /// Applied while the host is in the foreground
    pub foreground_multiplier: f64,
    /// Lower bound of the steady-state interval
    pub floor: Duration,
    /// Used until the first successful cycle completes
    pub initial_fast_poll: Duration,
}

impl Default for PollingIntervalPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(60),
            foreground_multiplier: 0.5,
            floor: Duration::from_secs(15),
            initial_fast_poll: Duration::from_secs(10),
        }
    }
}

impl PollingIntervalPolicy {
    /// Effective interval for the next sleep
    ///
    /// `current` is the latest interval pushed by the config source.
    pub fn effective(&self, phase: PollPhase, current: Duration, foreground: bool) -> Duration {
        if phase == PollPhase::FastPoll {
            return self.initial_fast_poll;
        }

        let scaled = if foreground && self.foreground_multiplier > 0.0 {
            current.mul_f64(self.foreground_multiplier)
        } else {
            current
        };
        scaled.max(self.floor)
    }
}
