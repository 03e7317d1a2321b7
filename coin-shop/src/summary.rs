use std::path::Path;
use surge::core::RunStatistics;
use tracing::info;

use crate::error::ShopError;

/// Write the end-of-test summary to `path` as pretty-printed JSON.
pub fn export_summary(stats: &RunStatistics, path: &Path) -> Result<(), ShopError> {
    let json = serde_json::to_vec_pretty(stats)?;
    std::fs::write(path, json).map_err(|source| ShopError::Export {
        path: path.to_path_buf(),
        source,
    })?;

    info!("Summary written to {}", path.display());
    Ok(())
}
