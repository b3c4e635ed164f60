use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const APP_DIR: &str = "reviewq";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file. `None` means `<data dir>/reviews.db`.
    pub db_path: Option<PathBuf>,
    /// How long a statement waits on a locked database before failing as busy.
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| app_data_dir().join("reviews.db"))
    }
}

pub fn load_config() -> StoreConfig {
    let mut config = read_config_file();
    if let Ok(path) = std::env::var("REVIEWQ_DB_PATH") {
        config.db_path = Some(PathBuf::from(path));
    }
    config
}

fn read_config_file() -> StoreConfig {
    let path = config_path();
    let Ok(contents) = std::fs::read_to_string(&path) else {
        return StoreConfig::default();
    };
    match toml::from_str(&contents) {
        Ok(config) => config,
        Err(err) => {
            log::warn!("Ignoring unreadable config {}: {}", path.display(), err);
            StoreConfig::default()
        }
    }
}

/// Write `config` to the config file, creating its directory.
pub fn save_config(config: &StoreConfig) -> std::io::Result<()> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = toml::to_string_pretty(config).map_err(std::io::Error::other)?;
    std::fs::write(path, contents)
}

fn config_path() -> PathBuf {
    std::env::var_os("REVIEWQ_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| app_data_dir().join("config.toml"))
}

/// `REVIEWQ_DATA_HOME`, else the platform data directory, else `./.reviewq`.
pub(crate) fn app_data_dir() -> PathBuf {
    std::env::var_os("REVIEWQ_DATA_HOME")
        .map(PathBuf::from)
        .or_else(platform_data_dir)
        .unwrap_or_else(|| PathBuf::from(".reviewq"))
}

#[cfg(target_os = "macos")]
fn platform_data_dir() -> Option<PathBuf> {
    home::home_dir().map(|home| home.join("Library/Application Support").join(APP_DIR))
}

#[cfg(target_os = "windows")]
fn platform_data_dir() -> Option<PathBuf> {
    std::env::var_os("APPDATA").map(|appdata| PathBuf::from(appdata).join(APP_DIR))
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn platform_data_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|| home::home_dir().map(|home| home.join(".local/share")))
        .map(|base| base.join(APP_DIR))
}
