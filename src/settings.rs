//! App settings stored next to the bundle list.

use crate::model::WindowMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SETTINGS_FILE_NAME: &str = "settings.json";
const APP_DIR_NAME: &str = "app-launcher";
const APP_DIR_ENV: &str = "APP_LAUNCHER_HOME";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Write a debug log to `log.txt` in the app directory.
    pub debug_logging: bool,
    /// Delay used for stored steps that do not specify one.
    pub default_delay: f64,
    /// Window mode used for stored steps that do not specify one.
    pub default_window_state: WindowMode,
    pub skip_if_running: bool,
    /// `log.txt` is truncated at startup once it grows past this size.
    pub log_max_bytes: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug_logging: true,
            default_delay: 0.0,
            default_window_state: WindowMode::Normal,
            skip_if_running: false,
            log_max_bytes: 1_000_000,
        }
    }
}

impl Settings {
    /// Load settings from `dir`. A missing file yields defaults; a malformed one is an error.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(SETTINGS_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("read settings {}", path.display()))?;
        let mut settings: Settings = serde_json::from_str(&data)
            .with_context(|| format!("parse settings {}", path.display()))?;
        settings.default_delay = crate::model::clamp_delay(settings.default_delay);
        Ok(settings)
    }

    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        let path = dir.join(SETTINGS_FILE_NAME);
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, data).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

/// Resolve the app directory: explicit override, then `$APP_LAUNCHER_HOME`, then the
/// platform config directory.
pub fn app_dir(override_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = override_dir {
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = std::env::var_os(APP_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let base = dirs::config_dir().context("could not determine config directory")?;
    Ok(base.join(APP_DIR_NAME))
}
