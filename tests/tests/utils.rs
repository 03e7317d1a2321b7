use coin_shop::Settings;
use mock_shop::AppState;
use std::num::{NonZeroU32, NonZeroU64};
use std::time::Duration;
use tokio::net::TcpListener;

/// Serve `state` on an ephemeral port and return its base URL.
#[allow(unused)]
pub async fn spawn_shop(state: AppState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(mock_shop::serve(listener, state));
    format!("http://{addr}")
}

/// Shop with the recipient already registered, so transfers can succeed.
#[allow(unused)]
pub fn shop_state() -> AppState {
    let state = AppState::new();
    state.seed_user("zkhrg", "secret");
    state
}

/// Default scenario settings pointed at `base_url`, bounded by an iteration count.
#[allow(unused)]
pub fn settings(base_url: &str, vus: u32, iterations: u64) -> Settings {
    let mut settings = Settings::default();
    settings.base_url = base_url.parse().unwrap();
    settings.vus = NonZeroU32::new(vus).unwrap();
    settings.iterations = NonZeroU64::new(iterations);
    settings.pacing = Duration::from_millis(10);
    settings
}
