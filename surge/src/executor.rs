use crate::measurement::Registry;
use crate::transaction::{TransactionData, TRANSACTION_HOOK};
use crate::vu::{self, VirtualUser, VU};
use futures::FutureExt;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::any::Any;
use std::future::Future;
use std::num::NonZeroU32;
use std::panic::AssertUnwindSafe;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::{Duration, Instant};
use surge_core::ScenarioConfig;
use tokio::task::JoinSet;
use tokio::time::timeout;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Runs a fixed pool of VUs, each looping over the scenario until the iteration budget is spent
/// or the duration elapses.
pub(crate) struct Executor<T> {
    scenario: T,
    config: ScenarioConfig,
    registry: Registry,
}

pub(crate) struct ExecutorStats {
    pub vus: u32,
    pub iterations: u64,
    pub interrupted: u64,
    pub aborted: u64,
    pub elapsed: Duration,
}

impl<T, F> Executor<T>
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = ()> + Send + 'static,
{
    pub fn new(scenario: T, config: ScenarioConfig, registry: Registry) -> Self {
        Self {
            scenario,
            config,
            registry,
        }
    }

    pub async fn run(self) -> ExecutorStats {
        let vus = self.config.effective_vus();
        if vus < self.config.vus.get() {
            warn!(
                "Only {vus} iterations to run; reducing VUs from {} to {vus}.",
                self.config.vus
            );
        }

        let state = Arc::new(RunState::new(self.config.iteration_budget()));
        let hook = TransactionData {
            limiter: self.config.max_tps.map(|tps| Arc::new(rate_limiter(tps))),
            registry: self.registry.clone(),
        };

        let start = Instant::now();
        let mut tasks = JoinSet::new();
        for id in 1..=vus {
            let scenario = self.scenario.clone();
            let state = state.clone();
            let registry = self.registry.clone();

            tasks.spawn(TRANSACTION_HOOK.scope(
                hook.clone(),
                VU.scope(VirtualUser::new(id), async move {
                    trace!("VU {id} started");
                    let builtins = registry.builtins();
                    while state.claim() {
                        let iteration_start = Instant::now();
                        match AssertUnwindSafe(async { scenario().await })
                            .catch_unwind()
                            .await
                        {
                            Ok(()) => {
                                builtins.iterations.add(1);
                                builtins.iteration_duration.add(iteration_start.elapsed());
                                state.completed.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(panic) => {
                                error!("Iteration panicked on VU {id}: {}", panic_message(&*panic));
                                state.aborted.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        vu::advance();

                        // NOTE: An iteration that never awaits would otherwise starve the timer.
                        tokio::task::yield_now().await;
                    }
                    trace!("VU {id} finished");
                }),
            ));
        }
        debug!("Spawned {vus} VUs");

        let finished = join_all(&mut tasks);
        match self.config.duration {
            Some(duration) => {
                if timeout(duration, finished).await.is_err() {
                    debug!("Duration of {} elapsed", humantime::format_duration(duration));
                }
            }
            None => finished.await,
        }
        state.stop();

        let mut interrupted = 0;
        if !tasks.is_empty() {
            debug!("Waiting on {} in-flight iterations", tasks.len());
            if timeout(self.config.graceful_stop, join_all(&mut tasks))
                .await
                .is_err()
            {
                interrupted = tasks.len() as u64;
                warn!("{interrupted} iterations still running after the graceful stop period; aborting.");
                tasks.abort_all();
                join_all(&mut tasks).await;
            }
        }

        ExecutorStats {
            vus,
            iterations: state.completed.load(Ordering::Relaxed),
            interrupted,
            aborted: state.aborted.load(Ordering::Relaxed),
            elapsed: start.elapsed(),
        }
    }
}

struct RunState {
    stopped: AtomicBool,
    remaining: Option<AtomicU64>,
    completed: AtomicU64,
    aborted: AtomicU64,
}

impl RunState {
    fn new(budget: Option<u64>) -> Self {
        Self {
            stopped: AtomicBool::new(false),
            remaining: budget.map(AtomicU64::new),
            completed: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
        }
    }

    /// Take one iteration from the shared budget.
    fn claim(&self) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }

        match &self.remaining {
            None => true,
            Some(remaining) => remaining
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .is_ok(),
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

async fn join_all(tasks: &mut JoinSet<()>) {
    while let Some(res) = tasks.join_next().await {
        if let Err(err) = res {
            if err.is_panic() {
                error!("VU panicked: {err}");
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

fn rate_limiter(tps_limit: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(
        Quota::per_second(tps_limit)
            // TODO: Make burst configurable
            .allow_burst(NonZeroU32::MIN),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU64;

    fn config(vus: u32) -> ScenarioConfig {
        let mut config = ScenarioConfig::new("test");
        config.vus = NonZeroU32::new(vus).unwrap();
        config
    }

    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn iteration_budget_is_shared() {
        let mut config = config(3);
        config.iterations = NonZeroU64::new(10);
        let registry = Registry::new();

        let stats = Executor::new(
            || async { tokio::time::sleep(Duration::from_millis(1)).await },
            config,
            registry.clone(),
        )
        .run()
        .await;

        assert_eq!(stats.vus, 3);
        assert_eq!(stats.iterations, 10);
        assert_eq!(stats.interrupted, 0);
        assert_eq!(registry.builtins().iterations.count(), 10);
        assert_eq!(registry.builtins().iteration_duration.stats().count, 10);
    }

    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn default_is_one_iteration() {
        let stats = Executor::new(|| async {}, config(5), Registry::new())
            .run()
            .await;

        assert_eq!(stats.vus, 1);
        assert_eq!(stats.iterations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn duration_bounds_the_run() {
        let mut config = config(2);
        config.duration = Some(Duration::from_millis(300));

        let stats = Executor::new(
            || async { tokio::time::sleep(Duration::from_millis(40)).await },
            config,
            Registry::new(),
        )
        .run()
        .await;

        // Iterations start at 0, 40, .., 280ms on each VU; the last ones finish gracefully.
        assert!((14..=16).contains(&stats.iterations), "{}", stats.iterations);
        assert_eq!(stats.interrupted, 0);
    }

    #[tracing_test::traced_test]
    #[tokio::test(start_paused = true)]
    async fn graceful_stop_interrupts() {
        let mut config = config(4);
        config.duration = Some(Duration::from_millis(100));
        config.graceful_stop = Duration::from_millis(200);

        let stats = Executor::new(
            || async { tokio::time::sleep(Duration::from_secs(10)).await },
            config,
            Registry::new(),
        )
        .run()
        .await;

        assert_eq!(stats.iterations, 0);
        assert_eq!(stats.interrupted, 4);
        assert!(logs_contain("aborting"));
    }

    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn vu_state_is_isolated() {
        #[derive(Clone)]
        struct Owner(u32);

        let mut config = config(8);
        config.iterations = NonZeroU64::new(200);
        let registry = Registry::new();
        let mismatches = registry.counter("mismatches").unwrap();

        let scenario = move || {
            let mismatches = mismatches.clone();
            async move {
                let me = vu::id().unwrap();
                match vu::get::<Owner>() {
                    Some(Owner(owner)) if owner != me => mismatches.add(1),
                    Some(_) => {}
                    None => {
                        vu::set(Owner(me));
                    }
                }
                tokio::task::yield_now().await;
            }
        };

        let stats = Executor::new(scenario, config, registry.clone())
            .run()
            .await;

        assert_eq!(stats.iterations, 200);
        assert_eq!(registry.counter("mismatches").unwrap().count(), 0);
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn panicking_iteration_keeps_vu_running() {
        let mut config = config(2);
        config.iterations = NonZeroU64::new(10);
        let registry = Registry::new();
        let vu1_completed = registry.counter("vu1_completed").unwrap();

        let scenario = move || {
            let vu1_completed = vu1_completed.clone();
            async move {
                if vu::id() == Some(1) {
                    if vu::iteration() == Some(0) {
                        panic!("boom");
                    }
                    vu1_completed.add(1);
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };

        let stats = Executor::new(scenario, config, registry.clone())
            .run()
            .await;

        assert_eq!(stats.vus, 2);
        assert_eq!(stats.aborted, 1);
        assert_eq!(stats.iterations, 9);
        assert!(registry.counter("vu1_completed").unwrap().count() >= 1);
        assert!(logs_contain("Iteration panicked on VU 1: boom"));
    }
}
