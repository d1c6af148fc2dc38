//! Run mode of a supervised application.

use std::fmt;
use std::time::Duration;

/// How a worker is executed, as declared by its interval directive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Launched once and kept alive until stopped (directive `0`)
    Continuous,
    /// Run to completion, then relaunched after `interval` (directive `N > 0`)
    Recurrent { interval: Duration },
}

impl RunMode {
    /// Map a parsed interval directive to a run mode
    pub fn from_interval_secs(secs: u64) -> Self {
        if secs == 0 {
            RunMode::Continuous
        } else {
            RunMode::Recurrent {
                interval: Duration::from_secs(secs),
            }
        }
    }

    pub fn is_continuous(&self) -> bool {
        matches!(self, RunMode::Continuous)
    }

    /// Period between recurrent launches, `None` for continuous workers
    pub fn interval(&self) -> Option<Duration> {
        match self {
            RunMode::Continuous => None,
            RunMode::Recurrent { interval } => Some(*interval),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Continuous => write!(f, "continuous"),
            RunMode::Recurrent { interval } => write!(f, "recurrent every {}s", interval.as_secs()),
        }
    }
}
