use clap::Parser;
use reqwest::Url;
use std::net::SocketAddr;
use std::num::{NonZeroU32, NonZeroU64};
use std::path::PathBuf;
use std::time::Duration;
use surge::core::{parse_duration, ScenarioConfig};

use crate::SCENARIO_NAME;

/// Coin shop load test: log in once per VU, then read info and send a coin in a loop.
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Settings {
    /// Base URL of the shop under test.
    #[arg(long, default_value = "http://localhost:8080")]
    pub base_url: Url,

    #[arg(long, default_value = "test")]
    pub username: String,

    #[arg(long, default_value = "test")]
    pub password: String,

    /// Concurrent virtual users.
    #[arg(long, default_value = "100")]
    pub vus: NonZeroU32,

    /// Wall-clock length of the run, e.g. `1m` or `90s`.
    #[arg(long, default_value = "1m", value_parser = parse_duration)]
    pub duration: Duration,

    /// Stop after this many iterations in total, even if the duration has not elapsed.
    #[arg(long)]
    pub iterations: Option<NonZeroU64>,

    /// Time in-flight iterations get to finish once the duration is up.
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub graceful_stop: Duration,

    /// Cap on requests per second across all VUs. Unlimited unless given.
    #[arg(long)]
    pub tps: Option<NonZeroU32>,

    /// Sleep at the end of every iteration.
    #[arg(long, default_value = "100ms", value_parser = parse_duration)]
    pub pacing: Duration,

    /// Who receives the coins.
    #[arg(long, default_value = "zkhrg")]
    pub recipient: String,

    #[arg(long, default_value_t = 1)]
    pub amount: i64,

    /// Per-request timeout. No timeout unless given.
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Write the end-of-test summary as JSON to this path.
    #[arg(long)]
    pub summary_export: Option<PathBuf>,

    /// Serve Prometheus metrics on this address while the test runs.
    #[arg(long)]
    pub prometheus: Option<SocketAddr>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::parse_from([SCENARIO_NAME])
    }
}

impl Settings {
    pub fn scenario_config(&self) -> ScenarioConfig {
        let mut config = ScenarioConfig::new(SCENARIO_NAME);
        config.vus = self.vus;
        config.duration = Some(self.duration);
        config.iterations = self.iterations;
        config.graceful_stop = self.graceful_stop;
        config.max_tps = self.tps;
        config
    }
}
