mod utils;
use utils::*;

use reqwest::{Client, StatusCode};
use std::sync::OnceLock;
use std::time::Duration;
use surge::core::MetricValue;
use surge::prelude::*;

static CLIENT: OnceLock<Client> = OnceLock::new();
static BASE_URL: OnceLock<String> = OnceLock::new();

#[derive(Clone)]
struct Token(String);

#[tokio::test]
#[ntest::timeout(10_000)]
async fn annotated_scenario() {
    let state = shop_state();
    let base = spawn_shop(state.clone()).await;
    BASE_URL.set(base).unwrap();

    let stats = info_scenario()
        .vus(NonZeroU32::new(3).unwrap())
        .iterations(NonZeroU64::new(9).unwrap())
        .duration(Duration::from_secs(5))
        .await;

    assert_eq!(stats.name, "info_scenario");
    assert_eq!(stats.iterations, 9);
    assert_eq!(state.count("POST", "/api/auth"), 3);
    assert_eq!(state.count("GET", "/api/info"), 9);
    assert_eq!(
        stats.metric("transactions"),
        Some(&MetricValue::Counter { count: 12 })
    );
    assert_eq!(stats.check("info ok").unwrap().passes, 9);
}

#[scenario]
async fn info_scenario() {
    let token = match vu::get::<Token>() {
        Some(token) => token,
        None => {
            let token = Token(login().await.unwrap_or_default());
            vu::set(token.clone());
            token
        }
    };

    let status = info(&token.0).await;
    check("info ok", matches!(status, Ok(s) if s == StatusCode::OK));
}

#[transaction]
async fn login() -> Result<String, reqwest::Error> {
    let client = CLIENT.get_or_init(Client::new);
    let base = BASE_URL.get().unwrap();
    let res = client
        .post(format!("{base}/api/auth"))
        .json(&serde_json::json!({
            "username": format!("user-{}", vu::id().unwrap()),
            "password": "pw",
        }))
        .send()
        .await?
        .error_for_status()?;
    let body: serde_json::Value = res.json().await?;
    Ok(body["token"].as_str().unwrap_or_default().to_string())
}

#[transaction]
async fn info(token: &str) -> Result<StatusCode, reqwest::Error> {
    let client = CLIENT.get_or_init(Client::new);
    let base = BASE_URL.get().unwrap();
    let res = client
        .get(format!("{base}/api/info"))
        .bearer_auth(token)
        .send()
        .await?;
    Ok(res.status())
}
