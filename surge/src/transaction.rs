use crate::measurement::Registry;
use governor::DefaultDirectRateLimiter;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use surge_core::TransactionLabels;

/// Transaction hook used by the `#[transaction]` macro. Not intended to be used manually.
pub async fn transaction_hook<T, R, E>(labels: TransactionLabels, func: T) -> T::Output
where
    T: Future<Output = Result<R, E>>,
{
    let Ok(hook) = TRANSACTION_HOOK.try_with(|v| v.clone()) else {
        tracing::warn!("No hook available.");
        return func.await;
    };

    if let Some(limiter) = &hook.limiter {
        limiter.until_ready().await;
    }

    let start = Instant::now();
    let res = func.await;
    let elapsed = start.elapsed();

    let builtins = hook.registry.builtins();
    builtins.transactions.add(1);
    builtins.transaction_duration.add(elapsed);
    builtins.transaction_failed.add(res.is_err());

    #[cfg(feature = "metrics")]
    {
        metrics::histogram!(labels.latency).record(elapsed.as_secs_f64());
        if res.is_ok() {
            metrics::counter!(labels.success).increment(1);
        } else {
            metrics::counter!(labels.error).increment(1);
        }
    }
    #[cfg(not(feature = "metrics"))]
    let _ = labels;

    res
}

#[derive(Clone)]
pub(crate) struct TransactionData {
    pub limiter: Option<Arc<DefaultDirectRateLimiter>>,
    pub registry: Registry,
}

tokio::task_local! {
    pub(crate) static TRANSACTION_HOOK: TransactionData;
}
