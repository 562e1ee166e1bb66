//! Data directory layout.

use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "RGRAPH_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `RGRAPH_DATA_DIR` environment variable
/// 2. `~/.routegraph`
/// 3. `.routegraph` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".routegraph");
    }

    PathBuf::from(".routegraph")
}

/// `{data_dir}/config.toml`
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

/// `{data_dir}/graph.toml`
pub fn graph_path(data_dir: &Path) -> PathBuf {
    data_dir.join("graph.toml")
}
