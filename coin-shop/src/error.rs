use std::path::PathBuf;
use surge::MetricError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShopError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Failed to declare metric: {0}")]
    Metric(#[from] MetricError),

    #[error("Failed to encode JSON: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to write summary to {}: {source}", path.display())]
    Export {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Endpoint {path} cannot be joined onto {base}")]
    Endpoint { base: String, path: &'static str },
}
