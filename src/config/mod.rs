use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::errors::{AppError, AppResult};

pub mod defaults;

use defaults::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub upstream: Option<UpstreamConfig>,
}

/// Playlist parsing and remote catalog fetching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Number of series-info requests issued concurrently per wave
    #[serde(default = "default_series_batch_size")]
    pub series_batch_size: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,
    /// Bucket for entries with neither a group attribute nor a recognisable prefix
    #[serde(default = "default_category")]
    pub default_category: String,
    #[serde(default = "default_category_prefix_max_len")]
    pub category_prefix_max_len: usize,
    /// Series with fewer episodes than this are dropped from the catalog
    #[serde(default = "default_min_series_episodes")]
    pub min_series_episodes: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Guide URL embedded in the playlist header
    #[serde(default)]
    pub guide_url: String,
    /// Public base URL; enables logo proxying and proxied stream URIs
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_include_catchup")]
    pub include_catchup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_pointer_extension")]
    pub pointer_extension: String,
    #[serde(default = "default_sidecar_extension")]
    pub sidecar_extension: String,
    /// Remove pointer files that have no sidecar during discovery
    #[serde(default = "default_prune_stray_pointers")]
    pub prune_stray_pointers: bool,
    /// Permit a run whose desired set is empty (deletes every tracked entry)
    #[serde(default = "default_allow_empty_desired_set")]
    pub allow_empty_desired_set: bool,
}

/// Xtream-compatible upstream credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

fn default_series_batch_size() -> usize {
    DEFAULT_SERIES_BATCH_SIZE
}

fn default_request_timeout() -> String {
    DEFAULT_REQUEST_TIMEOUT.to_string()
}

fn default_connect_timeout() -> String {
    DEFAULT_CONNECT_TIMEOUT.to_string()
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_category_prefix_max_len() -> usize {
    DEFAULT_CATEGORY_PREFIX_MAX_LEN
}

fn default_min_series_episodes() -> usize {
    DEFAULT_MIN_SERIES_EPISODES
}

fn default_include_catchup() -> bool {
    DEFAULT_INCLUDE_CATCHUP
}

fn default_export_directory() -> PathBuf {
    PathBuf::from(DEFAULT_EXPORT_DIRECTORY)
}

fn default_pointer_extension() -> String {
    DEFAULT_POINTER_EXTENSION.to_string()
}

fn default_sidecar_extension() -> String {
    DEFAULT_SIDECAR_EXTENSION.to_string()
}

fn default_prune_stray_pointers() -> bool {
    DEFAULT_PRUNE_STRAY_POINTERS
}

fn default_allow_empty_desired_set() -> bool {
    DEFAULT_ALLOW_EMPTY_DESIRED_SET
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            series_batch_size: default_series_batch_size(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            default_category: default_category(),
            category_prefix_max_len: default_category_prefix_max_len(),
            min_series_episodes: default_min_series_episodes(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: default_export_directory(),
            pointer_extension: default_pointer_extension(),
            sidecar_extension: default_sidecar_extension(),
            prune_stray_pointers: default_prune_stray_pointers(),
            allow_empty_desired_set: default_allow_empty_desired_set(),
        }
    }
}

impl IngestionConfig {
    pub fn request_timeout(&self) -> AppResult<Duration> {
        parse_duration("ingestion.request_timeout", &self.request_timeout)
    }

    pub fn connect_timeout(&self) -> AppResult<Duration> {
        parse_duration("ingestion.connect_timeout", &self.connect_timeout)
    }
}

fn parse_duration(key: &str, value: &str) -> AppResult<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| AppError::configuration(format!("{key} = '{value}': {e}")))
}

impl Config {
    /// Load configuration: built-in defaults, then the TOML file (if it
    /// exists), then `M3U_CURATOR_*` environment variables.
    pub fn load_from_file<P: AsRef<Path>>(config_file: P) -> AppResult<Self> {
        let config_file = config_file.as_ref();
        if config_file.exists() {
            info!("Loading configuration from: {}", config_file.display());
        } else {
            info!(
                "Config file {} not found, using defaults and environment",
                config_file.display()
            );
        }

        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split(ENV_SECTION_SEPARATOR))
            .extract()
            .map_err(|e| AppError::configuration(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Render the default configuration as TOML, for `--print-default-config`
    pub fn default_toml() -> AppResult<String> {
        toml::to_string_pretty(&Self::default())
            .map_err(|e| AppError::configuration(e.to_string()))
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.ingestion.series_batch_size == 0 {
            return Err(AppError::configuration(
                "ingestion.series_batch_size must be greater than zero",
            ));
        }
        self.ingestion.request_timeout()?;
        self.ingestion.connect_timeout()?;

        let pointer = self.export.pointer_extension.trim_start_matches('.');
        let sidecar = self.export.sidecar_extension.trim_start_matches('.');
        if pointer.is_empty() || sidecar.is_empty() {
            return Err(AppError::configuration(
                "export.pointer_extension and export.sidecar_extension must not be empty",
            ));
        }
        if pointer.eq_ignore_ascii_case(sidecar) {
            return Err(AppError::configuration(format!(
                "export.pointer_extension and export.sidecar_extension are both '{pointer}'"
            )));
        }

        if let Some(upstream) = &self.upstream
            && upstream.base_url.trim().is_empty()
        {
            return Err(AppError::configuration("upstream.base_url must not be empty"));
        }

        Ok(())
    }
}
