//! Global configuration loaded from `~/.config/anondl/config.toml`, overridden
//! by environment variables (for embedding as a service) and finally by CLI flags.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnondlConfig {
    /// Default number of parallel segments when `--parts` is not given.
    pub default_parts: usize,
    /// Connect/read timeout in seconds for all HTTP requests.
    pub conn_timeout_secs: u64,
    /// Safety margin (seconds) subtracted from a cached link's `tm` before considering it expired.
    pub link_cache_safety_margin_secs: i64,
    /// Base port from which the circuit supervisor probes for two free ports.
    pub circuit_port_base: u16,
    /// Delete the output file's temp artifacts (journal, link cache) automatically on success.
    pub auto_delete_downloads: bool,
}

impl Default for AnondlConfig {
    fn default() -> Self {
        Self {
            default_parts: 20,
            conn_timeout_secs: 30,
            link_cache_safety_margin_secs: 5,
            circuit_port_base: 41000,
            auto_delete_downloads: true,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("anondl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists, then
/// apply the environment-variable override layer described for embedding use.
pub fn load_or_init() -> Result<AnondlConfig> {
    let path = config_path()?;
    let mut cfg = if !path.exists() {
        let default_cfg = AnondlConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        default_cfg
    } else {
        let data = fs::read_to_string(&path)?;
        toml::from_str(&data)?
    };

    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Overrides for embedding as a service: `PARTS`, `AUTO_DELETE_DOWNLOADS`.
/// `TEMP_FOLDER`, `DATA_FOLDER`, and `DOWNLOAD_FOLDER` are read directly by
/// the CLI layer since they map to path flags, not config fields.
fn apply_env_overrides(cfg: &mut AnondlConfig) {
    if let Ok(v) = std::env::var("PARTS") {
        if let Ok(n) = v.parse() {
            cfg.default_parts = n;
        }
    }
    if let Ok(v) = std::env::var("AUTO_DELETE_DOWNLOADS") {
        cfg.auto_delete_downloads = matches!(v.as_str(), "1" | "true" | "yes");
    }
}
