use crate::{DEFAULT_GRACEFUL_STOP, DEFAULT_ITERATIONS, DEFAULT_VUS};
use std::num::{NonZeroU32, NonZeroU64};
use std::time::Duration;

pub use humantime::DurationError;

#[doc(hidden)]
#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioConfig {
    pub name: String,
    pub vus: NonZeroU32,
    pub duration: Option<Duration>,
    pub iterations: Option<NonZeroU64>,
    pub graceful_stop: Duration,
    pub max_tps: Option<NonZeroU32>,
}

impl ScenarioConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            vus: DEFAULT_VUS,
            duration: None,
            iterations: None,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            max_tps: None,
        }
    }

    /// Total iterations shared by every VU, or `None` when only the duration bounds the run.
    pub fn iteration_budget(&self) -> Option<u64> {
        match self {
            ScenarioConfig {
                iterations: Some(n),
                ..
            } => Some(n.get()),

            ScenarioConfig {
                duration: Some(_),
                ..
            } => None,

            _ => Some(DEFAULT_ITERATIONS.get()),
        }
    }

    /// Number of VUs actually worth spawning. There is no point in having more VUs than
    /// iterations to hand out.
    pub fn effective_vus(&self) -> u32 {
        match self.iteration_budget() {
            Some(budget) if budget < self.vus.get() as u64 => budget as u32,
            _ => self.vus.get(),
        }
    }
}

/// Parse a human readable duration such as `1m`, `30s` or `1m 30s`.
pub fn parse_duration(s: &str) -> Result<Duration, DurationError> {
    humantime::parse_duration(s)
}
