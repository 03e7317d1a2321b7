use anyhow::Context;
use clap::Parser;
use coin_shop::{CoinShop, Settings};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use surge::prelude::*;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter("coin_shop=info,surge=info")
        .init();

    let settings = Settings::parse();

    if let Some(addr) = settings.prometheus {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing Prometheus exporter")?;
        info!("Serving Prometheus metrics on {addr}");
    }

    let registry = Registry::new();
    let shop = Arc::new(CoinShop::new(&settings, &registry)?);

    let stats = coin_shop::scenario(shop)
        .config(settings.scenario_config())
        .registry(registry)
        .await;

    println!("{stats}");

    if let Some(path) = &settings.summary_export {
        coin_shop::export_summary(&stats, path)?;
    }

    Ok(())
}
