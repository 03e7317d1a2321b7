use std::num::{NonZeroU32, NonZeroU64};
use std::time::Duration;

/// Virtual users spawned when a scenario does not set `.vus()`
pub const DEFAULT_VUS: NonZeroU32 = unsafe { NonZeroU32::new_unchecked(1) };

/// Shared iterations executed when neither `.duration()` nor `.iterations()` is set
pub const DEFAULT_ITERATIONS: NonZeroU64 = unsafe { NonZeroU64::new_unchecked(1) };

/// How long in-flight iterations may keep running once the scenario has been told to stop
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// Names of the metrics every registry carries.
pub const CHECKS: &str = "checks";
pub const ITERATIONS: &str = "iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const TRANSACTIONS: &str = "transactions";
pub const TRANSACTION_DURATION: &str = "transaction_duration";
pub const TRANSACTION_FAILED: &str = "transaction_failed";
