use crate::transaction::TRANSACTION_HOOK;
use tracing::warn;

/// Record whether a named condition held, without affecting control flow.
///
/// The outcome is tallied per check name and in the aggregate `checks` rate of the running
/// Scenario. The return value is `passed`, so the result can still be branched on.
///
/// # Example
/// ```no_run
/// use surge::prelude::*;
///
/// #[scenario]
/// async fn my_scenario() {
///     let status = 200;
///     check("status is 200", status == 200);
/// }
/// ```
pub fn check(name: &str, passed: bool) -> bool {
    if TRANSACTION_HOOK
        .try_with(|hook| hook.registry.check(name, passed))
        .is_err()
    {
        warn!("No hook available; check `{name}` was not recorded.");
    }
    passed
}
