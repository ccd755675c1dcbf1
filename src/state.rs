use std::fs;
use std::path::{Path, PathBuf};

use crate::types::Config;

/// Path of the config file: `~/.confsched/config.json`.
pub fn config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".confsched").join("config.json"))
}

/// Load the config from `~/.confsched/config.json`. A missing file yields
/// the defaults.
pub fn load_config() -> Result<Config, String> {
    load_config_from(&config_path()?)
}

/// Load the config from an explicit path. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        log::info!("No config at {}; using defaults", path.display());
        return Ok(Config::default());
    }

    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;

    let config: Config =
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))?;

    if config.http_timeout_secs == 0 {
        return Err("httpTimeoutSecs must be greater than zero".to_string());
    }
    if config.utc_offset_minutes.abs() >= 24 * 60 {
        return Err(format!(
            "utcOffsetMinutes out of range: {}",
            config.utc_offset_minutes
        ));
    }

    Ok(config)
}
