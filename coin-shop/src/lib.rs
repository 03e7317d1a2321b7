//! Load test scenario for the coin shop API.
//!
//! Every virtual user logs in once, then loops over reading `/api/info` and sending one coin via
//! `/api/sendCoin`, pacing itself with a short sleep. Request outcomes go to the
//! `successful_requests` rate and the `response_times` trend. `failed_requests` is declared for
//! the summary but nothing records into it.
mod auth;
mod error;
mod settings;
mod shop;
mod summary;

pub use auth::{get_auth_token, Credentials};
pub use error::ShopError;
pub use settings::Settings;
pub use shop::{CoinShop, ShopMetrics};
pub use summary::export_summary;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use surge::Scenario;

pub const SCENARIO_NAME: &str = "coin-shop";

/// Name of the check recorded for every request.
pub const STATUS_IS_200: &str = "status is 200";

pub type Iteration = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Scenario running [`CoinShop::iteration`] on every VU. Configure it with
/// [`Settings::scenario_config`] and the registry the shop's metrics were declared on.
pub fn scenario(
    shop: Arc<CoinShop>,
) -> Scenario<impl Fn() -> Iteration + Clone + Send + Sync + 'static> {
    Scenario::new(SCENARIO_NAME, move || -> Iteration {
        let shop = shop.clone();
        Box::pin(async move { shop.iteration().await })
    })
}
