/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Ingestion defaults
pub const DEFAULT_SERIES_BATCH_SIZE: usize = 10;
pub const DEFAULT_REQUEST_TIMEOUT: &str = "30s";
pub const DEFAULT_CONNECT_TIMEOUT: &str = "10s";
pub const DEFAULT_CATEGORY: &str = "Uncategorized";
pub const DEFAULT_CATEGORY_PREFIX_MAX_LEN: usize = 20;
pub const DEFAULT_MIN_SERIES_EPISODES: usize = 2;

// Generator defaults
pub const DEFAULT_INCLUDE_CATCHUP: bool = true;

// Export defaults
pub const DEFAULT_EXPORT_DIRECTORY: &str = "./data/vod";
pub const DEFAULT_POINTER_EXTENSION: &str = "strm";
pub const DEFAULT_SIDECAR_EXTENSION: &str = "json";
pub const DEFAULT_PRUNE_STRAY_POINTERS: bool = true;
pub const DEFAULT_ALLOW_EMPTY_DESIRED_SET: bool = false;

// Environment overrides, e.g. M3U_CURATOR_EXPORT__DIRECTORY=/srv/vod
pub const ENV_PREFIX: &str = "M3U_CURATOR_";
pub const ENV_SECTION_SEPARATOR: &str = "__";
