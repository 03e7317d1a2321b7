mod utils;
use utils::*;

use coin_shop::{CoinShop, STATUS_IS_200};
use std::collections::HashSet;
use std::sync::Arc;
use surge::core::{MetricValue, RunStatistics};
use surge::prelude::*;

async fn run(settings: &coin_shop::Settings) -> RunStatistics {
    let registry = Registry::new();
    let shop = Arc::new(CoinShop::new(settings, &registry).unwrap());

    coin_shop::scenario(shop)
        .config(settings.scenario_config())
        .registry(registry)
        .await
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn single_iteration_call_counts() {
    let state = shop_state();
    let base = spawn_shop(state.clone()).await;

    let stats = run(&settings(&base, 1, 1)).await;

    assert_eq!(stats.iterations, 1);
    assert_eq!(state.count("POST", "/api/auth"), 1);
    assert_eq!(state.count("GET", "/api/info"), 1);
    assert_eq!(state.count("POST", "/api/sendCoin"), 1);
    assert_eq!(state.requests().len(), 3);
    assert_eq!(state.balance("test"), Some(mock_shop::STARTING_COINS - 1));
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn issued_token_is_sent_as_bearer() {
    let state = shop_state();
    state.set_fixed_token("abc123");
    let base = spawn_shop(state.clone()).await;

    run(&settings(&base, 1, 3)).await;

    let requests = state.requests();
    assert_eq!(requests[0].path, "/api/auth");
    for request in &requests[1..] {
        assert_eq!(request.authorization.as_deref(), Some("Bearer abc123"));
    }
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn transfer_body_is_fixed() {
    let state = shop_state();
    let base = spawn_shop(state.clone()).await;

    run(&settings(&base, 2, 6)).await;

    let bodies: Vec<_> = state
        .requests()
        .into_iter()
        .filter(|r| r.path == "/api/sendCoin")
        .map(|r| r.body)
        .collect();
    assert_eq!(bodies.len(), 6);
    assert!(bodies
        .iter()
        .all(|body| body == r#"{"toUser":"zkhrg","amount":1}"#));
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn every_vu_logs_in_once() {
    let state = shop_state();
    let base = spawn_shop(state.clone()).await;

    let stats = run(&settings(&base, 5, 20)).await;

    assert_eq!(stats.vus, 5);
    assert_eq!(stats.iterations, 20);
    assert_eq!(state.count("POST", "/api/auth"), 5);
    assert_eq!(state.count("GET", "/api/info"), 20);
    assert_eq!(state.count("POST", "/api/sendCoin"), 20);

    let tokens: HashSet<_> = state
        .requests()
        .into_iter()
        .filter(|r| r.path == "/api/info")
        .filter_map(|r| r.authorization)
        .collect();
    assert_eq!(tokens.len(), 5);
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn summary_metrics() {
    let state = shop_state();
    let base = spawn_shop(state.clone()).await;

    let stats = run(&settings(&base, 2, 10)).await;

    assert_eq!(
        stats.metric("successful_requests"),
        Some(&MetricValue::Rate {
            passes: 20,
            fails: 0
        })
    );
    assert_eq!(stats.metric("response_times").unwrap().samples(), 20);
    assert_eq!(stats.metric("failed_requests").unwrap().samples(), 0);

    // Two logins plus two calls per iteration.
    let check = stats.check(STATUS_IS_200).unwrap();
    assert_eq!((check.passes, check.fails), (22, 0));
    assert_eq!(
        stats.metric("transactions"),
        Some(&MetricValue::Counter { count: 22 })
    );

    let summary = stats.to_string();
    assert!(summary.contains("successful_requests"));
    assert!(summary.contains("failed_requests"));
    assert!(summary.contains("RPS:"));

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["iterations"], 10);
}

#[tracing_test::traced_test]
#[tokio::test]
#[ntest::timeout(10_000)]
async fn rejected_login_runs_with_empty_token() {
    let state = shop_state();
    state.seed_user("test", "a-different-password");
    let base = spawn_shop(state.clone()).await;

    let stats = run(&settings(&base, 1, 2)).await;

    assert_eq!(stats.iterations, 2);
    assert_eq!(state.count("POST", "/api/auth"), 1);
    for request in state.requests().iter().filter(|r| r.path != "/api/auth") {
        assert_eq!(
            request.authorization.as_deref().map(str::trim_end),
            Some("Bearer")
        );
    }
    assert_eq!(
        stats.metric("successful_requests"),
        Some(&MetricValue::Rate {
            passes: 0,
            fails: 4
        })
    );
    assert!(logs_contain("Failed to get auth token"));
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn unreachable_target_does_not_stop_the_run() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let stats = run(&settings(&format!("http://{addr}"), 2, 4)).await;

    assert_eq!(stats.iterations, 4);
    assert_eq!(stats.interrupted_iterations, 0);
    assert_eq!(
        stats.metric("successful_requests"),
        Some(&MetricValue::Rate {
            passes: 0,
            fails: 8
        })
    );
    assert_eq!(stats.metric("response_times").unwrap().samples(), 8);
}
