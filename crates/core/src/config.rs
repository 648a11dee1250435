//! Application configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file in the
//! user's config directory, then `CARLOT_*` environment variables.

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Origin used when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";
/// Quiet period applied to non-empty search queries.
pub const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 300;
/// Prefix for environment overrides, e.g. `CARLOT_API_URL`.
pub const ENV_PREFIX: &str = "CARLOT";

const APP_DIR: &str = "carlot";
const CONFIG_FILE: &str = "config.toml";

/// Resolved application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Origin of the catalog service.
    pub api_url: String,
    /// Directory holding favorites and logs.
    pub data_dir: PathBuf,
    /// Debounce window for non-empty search queries, in milliseconds.
    pub search_debounce_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            data_dir: default_data_dir(),
            search_debounce_ms: DEFAULT_SEARCH_DEBOUNCE_MS,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file location and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load configuration using an explicit file path (which may not exist).
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        Self::layered(path.into(), ENV_PREFIX)
    }

    fn layered(path: PathBuf, env_prefix: &str) -> Result<Self> {
        let defaults = Self::default();
        let settings = config::Config::builder()
            .set_default("api_url", defaults.api_url)?
            .set_default(
                "data_dir",
                defaults.data_dir.to_string_lossy().into_owned(),
            )?
            .set_default("search_debounce_ms", defaults.search_debounce_ms)?
            .add_source(config::File::from(path.clone()).required(false))
            .add_source(config::Environment::with_prefix(env_prefix))
            .build()
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;

        settings
            .try_deserialize()
            .context("failed to parse configuration")
    }

    /// Parsed catalog origin.
    pub fn api_base(&self) -> Result<Url> {
        Url::parse(&self.api_url).with_context(|| format!("invalid api_url {:?}", self.api_url))
    }

    /// Directory used for persisted favorites.
    pub fn storage_dir(&self) -> PathBuf {
        self.data_dir.join("storage")
    }

    /// Directory used for log files.
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

/// Location of the user configuration file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CONFIG_FILE)
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Write a default configuration file if none exists yet.
pub fn ensure_default_config() -> Result<()> {
    let path = config_path();
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let body = format!(
        "# carlot configuration\n\
         # Override any value with CARLOT_<NAME>, e.g. CARLOT_API_URL.\n\n\
         api_url = \"{DEFAULT_API_URL}\"\n\
         search_debounce_ms = {DEFAULT_SEARCH_DEBOUNCE_MS}\n"
    );
    fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))
}
