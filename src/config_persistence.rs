use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::{sanitize_config, Config};

pub const CONFIG_FILE_NAME: &str = "config.toml";

pub fn system_config_template_text() -> &'static str {
    include_str!("../config/config.system.toml")
}

/// Default location: `<platform config dir>/fanart-sync/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fanart-sync").join(CONFIG_FILE_NAME))
}

/// Writes the commented system template when no config file exists yet.
pub fn ensure_config_file(path: &Path) -> Result<(), String> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            format!(
                "failed to create config directory {}: {}",
                parent.display(),
                err
            )
        })?;
    }
    info!(
        "Config file not found. Creating default config. path={}",
        path.display()
    );
    std::fs::write(path, system_config_template_text())
        .map_err(|err| format!("failed to write config {}: {}", path.display(), err))
}

/// Loads and sanitizes the config, falling back to defaults on read or parse failure.
pub fn load_config_file(path: &Path) -> Config {
    let config_content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!(
                "Failed to read config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            return Config::default();
        }
    };

    match toml::from_str::<Config>(&config_content) {
        Ok(config) => sanitize_config(config),
        Err(err) => {
            warn!(
                "Failed to parse config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            Config::default()
        }
    }
}
