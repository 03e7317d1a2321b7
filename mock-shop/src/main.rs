use clap::Parser;
use mock_shop::AppState;
use std::net::SocketAddr;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(version, about = "In-memory coin shop API for load testing")]
struct Cli {
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    addr: SocketAddr,

    /// Register a user before serving, as `name` or `name:password`. Repeatable.
    #[arg(short, long = "seed-user")]
    seed_users: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter("mock_shop=info,tower_http=info")
        .init();

    let cli = Cli::parse();
    let state = AppState::new();
    for seed in &cli.seed_users {
        let (name, password) = seed.split_once(':').unwrap_or((seed.as_str(), seed.as_str()));
        state.seed_user(name, password);
    }

    mock_shop::run(cli.addr, state).await?;
    Ok(())
}
