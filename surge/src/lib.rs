#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod measurement;
pub mod scenario;
#[doc(hidden)]
pub mod transaction;
pub mod vu;

mod checks;
mod error;
mod executor;

pub use checks::check;
pub use error::MetricError;
pub use measurement::Registry;
pub use scenario::Scenario;
pub use surge_macros::{scenario, transaction};

pub use surge_core as core;

pub mod prelude {
    pub use crate::check;
    pub use crate::measurement::{Counter, Rate, Registry, Trend};
    pub use crate::scenario::ConfigurableScenario;
    pub use crate::vu;
    pub use std::num::{NonZeroU32, NonZeroU64};
    pub use surge_core::RunStatistics;
    pub use surge_macros::{scenario, transaction};
}
