use crate::{CHECKS, TRANSACTIONS, TRANSACTION_DURATION, TRANSACTION_FAILED};
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

const NAME_WIDTH: usize = 32;

/// End-of-run summary for a Scenario.
///
/// Every metric the run's registry knew about is listed in declaration order, including metrics
/// that never received a data point.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatistics {
    pub name: String,
    pub vus: u32,
    #[serde(serialize_with = "duration_secs")]
    pub elapsed: Duration,
    pub iterations: u64,
    pub interrupted_iterations: u64,
    /// Iterations that panicked. The VU moves on to its next iteration.
    pub aborted_iterations: u64,
    pub checks: Vec<CheckSummary>,
    pub metrics: Vec<MetricSummary>,
}

impl RunStatistics {
    pub fn metric(&self, name: &str) -> Option<&MetricValue> {
        self.metrics
            .iter()
            .find(|m| m.name == name)
            .map(|m| &m.value)
    }

    pub fn check(&self, name: &str) -> Option<&CheckSummary> {
        self.checks.iter().find(|c| c.name == name)
    }

    /// Requests per second over the whole run, counting every transaction.
    pub fn rps(&self) -> f64 {
        match self.metric(TRANSACTIONS) {
            Some(MetricValue::Counter { count }) => per_sec(*count, self.elapsed),
            _ => 0.,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub name: String,
    #[serde(flatten)]
    pub value: MetricValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricValue {
    Counter { count: u64 },
    Rate { passes: u64, fails: u64 },
    Trend(TrendStats),
}

impl MetricValue {
    /// Number of data points that were recorded.
    pub fn samples(&self) -> u64 {
        match self {
            MetricValue::Counter { count } => *count,
            MetricValue::Rate { passes, fails } => passes + fails,
            MetricValue::Trend(stats) => stats.count,
        }
    }

    /// Fraction of `true` samples for a Rate. `None` for other kinds or an empty Rate.
    pub fn rate(&self) -> Option<f64> {
        match self {
            MetricValue::Rate { passes, fails } if passes + fails > 0 => {
                Some(*passes as f64 / (passes + fails) as f64)
            }
            _ => None,
        }
    }
}

/// Distribution of a Trend, all values in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TrendStats {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub med: f64,
    pub p90: f64,
    pub p95: f64,
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "scenario: {}, {} VUs, {}",
            self.name,
            self.vus,
            humantime::format_duration(truncate_millis(self.elapsed)),
        )?;
        writeln!(f)?;

        for check in &self.checks {
            let mark = if check.fails == 0 { '✓' } else { '✗' };
            writeln!(
                f,
                "    {mark} {} (✓ {} / ✗ {})",
                check.name, check.passes, check.fails
            )?;
        }
        if !self.checks.is_empty() {
            writeln!(f)?;
        }

        for metric in &self.metrics {
            // NOTE: Declared checks are listed above; skip the aggregate when nothing was checked.
            if metric.name == CHECKS && self.checks.is_empty() {
                continue;
            }
            writeln!(
                f,
                "    {:.<width$}: {}",
                metric.name,
                MetricDisplay(&metric.value, self.elapsed),
                width = NAME_WIDTH
            )?;
        }

        if self.aborted_iterations > 0 {
            writeln!(
                f,
                "    {} iterations aborted by a panic",
                self.aborted_iterations
            )?;
        }
        if self.interrupted_iterations > 0 {
            writeln!(
                f,
                "    {} iterations interrupted at graceful stop",
                self.interrupted_iterations
            )?;
        }

        writeln!(f)?;
        writeln!(f, "RPS: {:.2}", self.rps())?;
        if let Some(MetricValue::Trend(stats)) = self.metric(TRANSACTION_DURATION) {
            writeln!(f, "SLI (response time) (ms): {:.2}", stats.avg)?;
        }
        if let Some(failed) = self.metric(TRANSACTION_FAILED).and_then(MetricValue::rate) {
            write!(f, "SLI (success): {:.4}%", (1. - failed) * 100.)?;
        }
        Ok(())
    }
}

struct MetricDisplay<'a>(&'a MetricValue, Duration);

impl fmt::Display for MetricDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            MetricValue::Counter { count } => {
                write!(f, "{count} {:.2}/s", per_sec(*count, self.1))
            }
            MetricValue::Rate { passes, fails } => match self.0.rate() {
                Some(r) => write!(f, "{:.2}% ✓ {passes} ✗ {fails}", r * 100.),
                None => write!(f, "no samples"),
            },
            MetricValue::Trend(stats) if stats.count == 0 => write!(f, "no samples"),
            MetricValue::Trend(stats) => write!(
                f,
                "avg={:.2}ms min={:.2}ms med={:.2}ms max={:.2}ms p(90)={:.2}ms p(95)={:.2}ms",
                stats.avg, stats.min, stats.med, stats.max, stats.p90, stats.p95
            ),
        }
    }
}

fn per_sec(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0. {
        count as f64 / secs
    } else {
        0.
    }
}

fn truncate_millis(dur: Duration) -> Duration {
    Duration::from_millis(dur.as_millis() as u64)
}

fn duration_secs<S: Serializer>(dur: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(dur.as_secs_f64())
}
