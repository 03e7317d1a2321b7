//! Scenario logic and configuration
use crate::executor::Executor;
use crate::measurement::Registry;
use std::{
    future::Future,
    num::{NonZeroU32, NonZeroU64},
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use surge_core::{RunStatistics, ScenarioConfig};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

/// Load test scenario structure
///
/// Handler for running scenarios. Usually created by the [`#[scenario]`](surge_macros::scenario)
/// macro, which adds these methods to zero-argument async functions. Closures capturing shared
/// state can be wrapped directly with [`Scenario::new`].
///
/// # Example
/// ```no_run
/// use surge::prelude::*;
/// use surge::Scenario;
///
/// #[tokio::main]
/// async fn main() {
///     let greeting = String::from("hello");
///     let stats = Scenario::new("closure", move || {
///         let greeting = greeting.clone();
///         async move { check("non-empty", !greeting.is_empty()); }
///     })
///     .vus(NonZeroU32::new(10).unwrap())
///     .iterations(NonZeroU64::new(100).unwrap())
///     .await;
///
///     println!("{stats}");
/// }
/// ```
#[pin_project::pin_project]
pub struct Scenario<T> {
    func: T,
    runner_fut: Option<Pin<Box<dyn Future<Output = RunStatistics> + Send>>>,
    config: ScenarioConfig,
    registry: Option<Registry>,
}

impl<T> Scenario<T> {
    pub fn new(name: &str, func: T) -> Self {
        Self {
            func,
            runner_fut: None,
            config: ScenarioConfig::new(name),
            registry: None,
        }
    }
}

impl<T, F> Future for Scenario<T>
where
    T: Fn() -> F + Send + 'static + Clone + Sync,
    F: Future<Output = ()> + Send + 'static,
{
    type Output = RunStatistics;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let runner = this.runner_fut.get_or_insert_with(|| {
            let func = this.func.clone();
            let config = this.config.clone();
            let registry = this.registry.take().unwrap_or_default();
            Box::pin(async move { run_scenario(func, config, registry).await })
        });

        runner.as_mut().poll(cx)
    }
}

pub trait ConfigurableScenario<T: Send>: Future<Output = T> + Sized + Send {
    fn vus(self, vus: NonZeroU32) -> Self;
    fn duration(self, duration: Duration) -> Self;
    fn iterations(self, iterations: NonZeroU64) -> Self;
    fn graceful_stop(self, graceful_stop: Duration) -> Self;
    fn tps(self, tps: NonZeroU32) -> Self;
    fn registry(self, registry: Registry) -> Self;
    fn config(self, config: ScenarioConfig) -> Self;
}

impl<T, F> ConfigurableScenario<RunStatistics> for Scenario<T>
where
    T: Fn() -> F + Send + 'static + Clone + Sync,
    F: Future<Output = ()> + Send + 'static,
{
    /// Number of virtual users running the scenario concurrently. Defaults to 1.
    ///
    /// # Example
    /// ```no_run
    /// use surge::prelude::*;
    /// use std::time::Duration;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     my_scenario()
    ///         .vus(NonZeroU32::new(100).unwrap())
    ///         .duration(Duration::from_secs(60))
    ///         .await;
    /// }
    ///
    /// #[scenario]
    /// async fn my_scenario() {
    /// }
    /// ```
    fn vus(mut self, vus: NonZeroU32) -> Self {
        self.config.vus = vus;
        self
    }

    /// Run the scenario for the given duration.
    ///
    /// Without `.iterations()` every VU keeps looping until the duration elapses. Iterations in
    /// flight at that point get `.graceful_stop()` to finish.
    fn duration(mut self, duration: Duration) -> Self {
        self.config.duration = Some(duration);
        self
    }

    /// Total number of iterations, shared between all VUs.
    ///
    /// Combined with `.duration()` the run ends at whichever comes first. With neither set, a
    /// single iteration is run.
    fn iterations(mut self, iterations: NonZeroU64) -> Self {
        self.config.iterations = Some(iterations);
        self
    }

    /// How long in-flight iterations may run once the duration has elapsed. Defaults to 30s.
    fn graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.config.graceful_stop = graceful_stop;
        self
    }

    /// Cap the combined rate of `#[transaction]` calls across all VUs.
    fn tps(mut self, tps: NonZeroU32) -> Self {
        self.config.max_tps = Some(tps);
        self
    }

    /// Record into an existing registry, typically one user metrics were declared on.
    ///
    /// # Example
    /// ```no_run
    /// use surge::prelude::*;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let registry = Registry::new();
    ///     let _unused = registry.rate("failed_requests").unwrap();
    ///
    ///     let stats = my_scenario().registry(registry).await;
    ///     assert!(stats.metric("failed_requests").is_some());
    /// }
    ///
    /// #[scenario]
    /// async fn my_scenario() {
    /// }
    /// ```
    fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replace the whole configuration, name included.
    fn config(mut self, config: ScenarioConfig) -> Self {
        self.config = config;
        self
    }
}

#[instrument(name="scenario", skip_all, fields(name=%config.name))]
pub(crate) async fn run_scenario<T, F>(
    scenario: T,
    config: ScenarioConfig,
    registry: Registry,
) -> RunStatistics
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = ()> + Send + 'static,
{
    info!("Running {} with config {:?}", config.name, &config);

    let stats = Executor::new(scenario, config.clone(), registry.clone())
        .run()
        .await;

    info!(
        "Scenario complete: {} iterations in {}",
        stats.iterations,
        humantime::format_duration(Duration::from_millis(stats.elapsed.as_millis() as u64))
    );

    RunStatistics {
        name: config.name,
        vus: stats.vus,
        elapsed: stats.elapsed,
        iterations: stats.iterations,
        interrupted_iterations: stats.interrupted,
        aborted_iterations: stats.aborted,
        checks: registry.check_summaries(),
        metrics: registry.metric_summaries(),
    }
}
