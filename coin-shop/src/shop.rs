use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use std::time::{Duration, Instant};
use surge::prelude::*;
use tracing::{trace, warn};

use crate::auth::{get_auth_token, Credentials};
use crate::error::ShopError;
use crate::settings::Settings;
use crate::STATUS_IS_200;

/// Metrics the scenario reports on top of the built-in ones.
#[derive(Clone, Debug)]
pub struct ShopMetrics {
    pub successful_requests: Rate,
    /// Declared so it appears in the summary. Nothing records into it.
    pub failed_requests: Rate,
    pub response_times: Trend,
}

impl ShopMetrics {
    pub fn declare(registry: &Registry) -> Result<Self, ShopError> {
        Ok(Self {
            successful_requests: registry.rate("successful_requests")?,
            failed_requests: registry.rate("failed_requests")?,
            response_times: registry.trend("response_times")?,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendCoin<'a> {
    to_user: &'a str,
    amount: i64,
}

/// Token cached for the lifetime of a VU, including the empty token of a failed login.
#[derive(Clone)]
struct AuthToken(String);

/// Everything an iteration needs, shared by all VUs.
#[derive(Debug)]
pub struct CoinShop {
    client: Client,
    credentials: Credentials,
    auth_url: String,
    info_url: String,
    send_coin_url: String,
    send_coin_body: String,
    pacing: Duration,
    metrics: ShopMetrics,
}

impl CoinShop {
    pub fn new(settings: &Settings, registry: &Registry) -> Result<Self, ShopError> {
        let mut client = Client::builder();
        if let Some(timeout) = settings.timeout {
            client = client.timeout(timeout);
        }

        let send_coin_body = serde_json::to_string(&SendCoin {
            to_user: &settings.recipient,
            amount: settings.amount,
        })?;

        Ok(Self {
            client: client.build()?,
            credentials: Credentials {
                username: settings.username.clone(),
                password: settings.password.clone(),
            },
            auth_url: endpoint(&settings.base_url, "/api/auth")?,
            info_url: endpoint(&settings.base_url, "/api/info")?,
            send_coin_url: endpoint(&settings.base_url, "/api/sendCoin")?,
            send_coin_body,
            pacing: settings.pacing,
            metrics: ShopMetrics::declare(registry)?,
        })
    }

    pub fn metrics(&self) -> &ShopMetrics {
        &self.metrics
    }

    /// The current VU's token, logging in on first use.
    pub async fn token(&self) -> String {
        if let Some(AuthToken(token)) = vu::get::<AuthToken>() {
            return token;
        }

        let token = get_auth_token(&self.client, &self.auth_url, &self.credentials).await;
        vu::set(AuthToken(token.clone()));
        token
    }

    /// One iteration: read info, send a coin, then sleep for the pacing interval.
    pub async fn iteration(&self) {
        let token = self.token().await;
        let bearer = format!("Bearer {token}");

        let start = Instant::now();
        let status = get_info(&self.client, &self.info_url, &bearer).await;
        self.record("GET /api/info", status, start.elapsed());

        let start = Instant::now();
        let status = send_coin(
            &self.client,
            &self.send_coin_url,
            &bearer,
            &self.send_coin_body,
        )
        .await;
        self.record("POST /api/sendCoin", status, start.elapsed());

        tokio::time::sleep(self.pacing).await;
    }

    fn record(&self, call: &str, status: Result<StatusCode, reqwest::Error>, elapsed: Duration) {
        let ok = match status {
            Ok(status) => {
                trace!("{call} -> {status} in {elapsed:?}");
                status == StatusCode::OK
            }
            Err(err) => {
                warn!("{call} failed: {err}");
                false
            }
        };

        check(STATUS_IS_200, ok);
        self.metrics.successful_requests.add(ok);
        self.metrics.response_times.add(elapsed);
    }
}

fn endpoint(base: &Url, path: &'static str) -> Result<String, ShopError> {
    base.join(path)
        .map(String::from)
        .map_err(|_| ShopError::Endpoint {
            base: base.to_string(),
            path,
        })
}

#[transaction]
async fn get_info(
    client: &Client,
    url: &str,
    bearer: &str,
) -> Result<StatusCode, reqwest::Error> {
    let res = client.get(url).header(AUTHORIZATION, bearer).send().await?;
    let status = res.status();
    res.bytes().await?;
    Ok(status)
}

#[transaction]
async fn send_coin(
    client: &Client,
    url: &str,
    bearer: &str,
    body: &str,
) -> Result<StatusCode, reqwest::Error> {
    let res = client
        .post(url)
        .header(AUTHORIZATION, bearer)
        .header(CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .send()
        .await?;
    let status = res.status();
    res.bytes().await?;
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mock_shop::AppState;
    use tokio::net::TcpListener;

    async fn spawn(state: AppState) -> Settings {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(mock_shop::serve(listener, state));

        let mut settings = Settings::default();
        settings.base_url = format!("http://{addr}").parse().unwrap();
        settings.pacing = Duration::from_millis(20);
        settings
    }

    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn token_is_fetched_once_per_vu() {
        let state = AppState::new();
        state.seed_user("zkhrg", "secret");
        state.set_fixed_token("abc123");
        let settings = spawn(state.clone()).await;
        let registry = Registry::new();
        let shop = CoinShop::new(&settings, &registry).unwrap();

        vu::scope(1, async {
            shop.iteration().await;
            shop.iteration().await;
        })
        .await;

        assert_eq!(state.count("POST", "/api/auth"), 1);
        assert_eq!(state.count("GET", "/api/info"), 2);
        assert_eq!(state.count("POST", "/api/sendCoin"), 2);
        for request in state.requests().iter().filter(|r| r.path != "/api/auth") {
            assert_eq!(request.authorization.as_deref(), Some("Bearer abc123"));
        }
        for request in state.requests().iter().filter(|r| r.path == "/api/sendCoin") {
            assert_eq!(request.body, r#"{"toUser":"zkhrg","amount":1}"#);
        }

        let metrics = shop.metrics();
        assert_eq!(metrics.successful_requests.passes(), 4);
        assert_eq!(metrics.successful_requests.fails(), 0);
        assert_eq!(metrics.response_times.stats().count, 4);
        assert_eq!(metrics.failed_requests.passes(), 0);
        assert_eq!(metrics.failed_requests.fails(), 0);
    }

    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn vus_log_in_separately() {
        let state = AppState::new();
        state.seed_user("zkhrg", "secret");
        let settings = spawn(state.clone()).await;
        let shop = CoinShop::new(&settings, &Registry::new()).unwrap();

        let a = vu::scope(1, async { shop.token().await }).await;
        let b = vu::scope(2, async { shop.token().await }).await;

        assert_ne!(a, b);
        assert_eq!(state.count("POST", "/api/auth"), 2);
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn failed_login_is_not_retried() {
        let state = AppState::new();
        state.seed_user("test", "other");
        state.seed_user("zkhrg", "secret");
        let settings = spawn(state.clone()).await;
        let shop = CoinShop::new(&settings, &Registry::new()).unwrap();

        vu::scope(1, async {
            shop.iteration().await;
            shop.iteration().await;
        })
        .await;

        assert_eq!(state.count("POST", "/api/auth"), 1);
        let info = state
            .requests()
            .into_iter()
            .find(|r| r.path == "/api/info")
            .unwrap();
        // The empty token leaves only the scheme; the trailing space may not survive the wire.
        assert_eq!(info.authorization.as_deref().map(str::trim_end), Some("Bearer"));
        assert_eq!(shop.metrics().successful_requests.passes(), 0);
        assert_eq!(shop.metrics().successful_requests.fails(), 4);
        assert!(logs_contain("Failed to get auth token"));
    }

    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn iteration_is_paced() {
        let state = AppState::new();
        state.seed_user("zkhrg", "secret");
        let mut settings = spawn(state).await;
        settings.pacing = Duration::from_millis(150);
        let shop = CoinShop::new(&settings, &Registry::new()).unwrap();

        let start = Instant::now();
        vu::scope(1, shop.iteration()).await;

        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn transport_errors_count_as_failures() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut settings = Settings::default();
        settings.base_url = format!("http://{addr}").parse().unwrap();
        settings.pacing = Duration::ZERO;
        let shop = CoinShop::new(&settings, &Registry::new()).unwrap();

        vu::scope(1, shop.iteration()).await;

        assert_eq!(shop.metrics().successful_requests.fails(), 2);
        assert_eq!(shop.metrics().response_times.stats().count, 2);
        assert!(logs_contain("GET /api/info failed"));
    }

    #[test]
    fn custom_transfer_body() {
        let mut settings = Settings::default();
        settings.recipient = "alice".to_string();
        settings.amount = 5;
        let shop = CoinShop::new(&settings, &Registry::new()).unwrap();
        assert_eq!(shop.send_coin_body, r#"{"toUser":"alice","amount":5}"#);
        assert_eq!(shop.info_url, "http://localhost:8080/api/info");
    }
}
