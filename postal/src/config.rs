//! Locating and reading the settings file.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use crate::controller::Postal;

/// Environment variable naming the settings file.
pub const CONFIG_ENV: &str = "POSTAL_CONFIG";

/// Searched, in order, when neither `--config` nor [`CONFIG_ENV`] is given.
pub const DEFAULT_PATHS: [&str; 2] = ["./postal.config.ron", "/etc/postal/postal.config.ron"];

/// Find the configuration file using the following precedence:
/// 1. `explicit` (the `--config` flag)
/// 2. `POSTAL_CONFIG` environment variable
/// 3. ./postal.config.ron (current working directory)
/// 4. /etc/postal/postal.config.ron (system-wide config)
pub fn find_config_file(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let defaults: Vec<PathBuf> = DEFAULT_PATHS.iter().map(PathBuf::from).collect();
    resolve(explicit, std::env::var_os(CONFIG_ENV), &defaults)
}

fn resolve(
    explicit: Option<PathBuf>,
    env: Option<OsString>,
    defaults: &[PathBuf],
) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("--config points to non-existent file: {}", path.display());
    }

    if let Some(env_path) = env {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    if let Some(path) = defaults.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = defaults
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - --config\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}

/// Reads and parses the settings at `path`.
pub fn load(path: &Path) -> anyhow::Result<Postal> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        anyhow::anyhow!("Failed to read config from {}: {e}", path.display())
    })?;

    ron::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid config in {}: {e}", path.display()))
}
