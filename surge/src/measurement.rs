//! Metric collectors shared by every virtual user of a run.
//!
//! Collectors are cheap `Arc` handles; clone them freely into scenario code. Data points are only
//! ever appended, so concurrent VUs never need to coordinate.
use crate::error::MetricError;
use metrics_util::AtomicBucket;
use pdatastructs::tdigest::{TDigest, K1};
use std::fmt;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, PoisonError, RwLock,
};
use std::time::Duration;
use surge_core::{
    CheckSummary, MetricSummary, MetricValue, TrendStats, CHECKS, ITERATIONS, ITERATION_DURATION,
    TRANSACTIONS, TRANSACTION_DURATION, TRANSACTION_FAILED,
};
use tracing::error;

const TDIGEST_BACKLOG_SIZE: usize = 100;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Rate,
    Trend,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Counter => write!(f, "counter"),
            MetricKind::Rate => write!(f, "rate"),
            MetricKind::Trend => write!(f, "trend"),
        }
    }
}

/// Monotonically increasing sum.
#[derive(Clone, Debug)]
pub struct Counter {
    name: Arc<str>,
    count: Arc<AtomicU64>,
}

impl Counter {
    fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            count: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn add(&self, n: u64) {
        self.count.fetch_add(n, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        metrics::counter!(self.name.to_string()).increment(n);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Fraction of recorded outcomes that were `true`.
#[derive(Clone, Debug)]
pub struct Rate {
    name: Arc<str>,
    passes: Arc<AtomicU64>,
    fails: Arc<AtomicU64>,
}

impl Rate {
    fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            passes: Arc::new(AtomicU64::new(0)),
            fails: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn add(&self, value: bool) {
        if value {
            self.passes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.fails.fetch_add(1, Ordering::Relaxed);
        }

        #[cfg(feature = "metrics")]
        {
            let outcome = if value { "true" } else { "false" };
            metrics::counter!(self.name.to_string(), "outcome" => outcome).increment(1);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    pub fn fails(&self) -> u64 {
        self.fails.load(Ordering::Relaxed)
    }
}

/// Distribution of durations.
#[derive(Clone)]
pub struct Trend {
    name: Arc<str>,
    samples: Arc<AtomicBucket<Duration>>,
}

impl Trend {
    fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            samples: Arc::new(AtomicBucket::new()),
        }
    }

    pub fn add(&self, sample: Duration) {
        self.samples.push(sample);

        #[cfg(feature = "metrics")]
        metrics::histogram!(self.name.to_string()).record(sample.as_secs_f64());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn samples(&self) -> Vec<Duration> {
        self.samples.data()
    }

    pub fn stats(&self) -> TrendStats {
        trend_stats(self.samples())
    }
}

impl fmt::Debug for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trend").field("name", &self.name).finish()
    }
}

fn trend_stats(samples: Vec<Duration>) -> TrendStats {
    if samples.is_empty() {
        return TrendStats::default();
    }

    let ms: Vec<f64> = samples.iter().map(|d| d.as_secs_f64() * 1e3).collect();
    let mut digest = default_tdigest();
    for sample in &ms {
        digest.insert(*sample);
    }

    TrendStats {
        count: ms.len() as u64,
        min: ms.iter().copied().fold(f64::INFINITY, f64::min),
        max: ms.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        avg: statistical::mean(&ms),
        med: quantile(&digest, 0.5),
        p90: quantile(&digest, 0.90),
        p95: quantile(&digest, 0.95),
    }
}

fn quantile(digest: &TDigest<K1>, q: f64) -> f64 {
    let ms = digest.quantile(q);

    // NOTE: TDigest occasionally yields NaN, which would poison the summary.
    if ms.is_finite() {
        ms
    } else {
        error!("NaN quantile {q} in latency digest");
        0.
    }
}

fn default_tdigest() -> TDigest<K1> {
    TDigest::new(K1::new(10.), TDIGEST_BACKLOG_SIZE)
}

#[derive(Clone, Debug)]
pub enum Metric {
    Counter(Counter),
    Rate(Rate),
    Trend(Trend),
}

impl Metric {
    pub fn name(&self) -> &str {
        match self {
            Metric::Counter(c) => c.name(),
            Metric::Rate(r) => r.name(),
            Metric::Trend(t) => t.name(),
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Rate(_) => MetricKind::Rate,
            Metric::Trend(_) => MetricKind::Trend,
        }
    }

    pub fn summary(&self) -> MetricSummary {
        let value = match self {
            Metric::Counter(c) => MetricValue::Counter { count: c.count() },
            Metric::Rate(r) => MetricValue::Rate {
                passes: r.passes(),
                fails: r.fails(),
            },
            Metric::Trend(t) => MetricValue::Trend(t.stats()),
        };

        MetricSummary {
            name: self.name().to_string(),
            value,
        }
    }
}

/// Handles to the metrics every run records on its own.
#[derive(Clone, Debug)]
pub(crate) struct Builtins {
    pub checks: Rate,
    pub iterations: Counter,
    pub iteration_duration: Trend,
    pub transactions: Counter,
    pub transaction_duration: Trend,
    pub transaction_failed: Rate,
}

/// Named collection of metrics owned by a run.
///
/// A fresh registry already contains the built-in metrics (`checks`, `iterations`,
/// `iteration_duration`, `transactions`, `transaction_duration`, `transaction_failed`). User
/// metrics are declared with [`Registry::counter`], [`Registry::rate`] and [`Registry::trend`];
/// declaring the same name twice returns a handle to the same collector.
///
/// # Example
/// ```
/// use surge::measurement::Registry;
///
/// let registry = Registry::new();
/// let ok = registry.rate("successful_requests").unwrap();
/// ok.add(true);
/// assert_eq!(registry.rate("successful_requests").unwrap().passes(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

#[derive(Debug)]
struct RegistryInner {
    metrics: RwLock<Vec<Metric>>,
    checks: RwLock<Vec<Rate>>,
    builtins: Builtins,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let builtins = Builtins {
            checks: Rate::new(CHECKS),
            iterations: Counter::new(ITERATIONS),
            iteration_duration: Trend::new(ITERATION_DURATION),
            transactions: Counter::new(TRANSACTIONS),
            transaction_duration: Trend::new(TRANSACTION_DURATION),
            transaction_failed: Rate::new(TRANSACTION_FAILED),
        };

        let metrics = vec![
            Metric::Rate(builtins.checks.clone()),
            Metric::Counter(builtins.iterations.clone()),
            Metric::Trend(builtins.iteration_duration.clone()),
            Metric::Counter(builtins.transactions.clone()),
            Metric::Trend(builtins.transaction_duration.clone()),
            Metric::Rate(builtins.transaction_failed.clone()),
        ];

        Self {
            inner: Arc::new(RegistryInner {
                metrics: RwLock::new(metrics),
                checks: RwLock::new(vec![]),
                builtins,
            }),
        }
    }

    pub fn counter(&self, name: &str) -> Result<Counter, MetricError> {
        match self.get_or_insert(name, MetricKind::Counter)? {
            Metric::Counter(c) => Ok(c),
            _ => unreachable!("kind checked by get_or_insert"),
        }
    }

    pub fn rate(&self, name: &str) -> Result<Rate, MetricError> {
        match self.get_or_insert(name, MetricKind::Rate)? {
            Metric::Rate(r) => Ok(r),
            _ => unreachable!("kind checked by get_or_insert"),
        }
    }

    pub fn trend(&self, name: &str) -> Result<Trend, MetricError> {
        match self.get_or_insert(name, MetricKind::Trend)? {
            Metric::Trend(t) => Ok(t),
            _ => unreachable!("kind checked by get_or_insert"),
        }
    }

    /// Record the outcome of a named check, both for that check and the aggregate `checks` rate.
    pub fn check(&self, name: &str, passed: bool) {
        self.inner.builtins.checks.add(passed);

        let existing = self
            .inner
            .checks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|c| c.name() == name)
            .cloned();

        let tally = match existing {
            Some(tally) => tally,
            None => {
                let mut checks = self
                    .inner
                    .checks
                    .write()
                    .unwrap_or_else(PoisonError::into_inner);
                // NOTE: Another VU may have inserted it between the two locks.
                match checks.iter().find(|c| c.name() == name) {
                    Some(tally) => tally.clone(),
                    None => {
                        let tally = Rate::new(name);
                        checks.push(tally.clone());
                        tally
                    }
                }
            }
        };

        tally.add(passed);
    }

    pub fn metrics(&self) -> Vec<Metric> {
        self.inner
            .metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn check_summaries(&self) -> Vec<CheckSummary> {
        self.inner
            .checks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|c| CheckSummary {
                name: c.name().to_string(),
                passes: c.passes(),
                fails: c.fails(),
            })
            .collect()
    }

    pub fn metric_summaries(&self) -> Vec<MetricSummary> {
        self.metrics().iter().map(Metric::summary).collect()
    }

    pub(crate) fn builtins(&self) -> &Builtins {
        &self.inner.builtins
    }

    fn get_or_insert(&self, name: &str, kind: MetricKind) -> Result<Metric, MetricError> {
        if name.is_empty() {
            return Err(MetricError::EmptyName);
        }

        let mut metrics = self
            .inner
            .metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = metrics.iter().find(|m| m.name() == name) {
            return if existing.kind() == kind {
                Ok(existing.clone())
            } else {
                Err(MetricError::KindMismatch {
                    name: name.to_string(),
                    existing: existing.kind(),
                    requested: kind,
                })
            };
        }

        let metric = match kind {
            MetricKind::Counter => Metric::Counter(Counter::new(name)),
            MetricKind::Rate => Metric::Rate(Rate::new(name)),
            MetricKind::Trend => Metric::Trend(Trend::new(name)),
        };
        metrics.push(metric.clone());
        Ok(metric)
    }
}
