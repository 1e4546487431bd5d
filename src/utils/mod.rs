//! Utility modules for m3u-curator
//!
//! This module contains reusable helpers shared by the ingestion, synthesis
//! and export stages.

pub mod decompression;
pub mod deterministic_id;
pub mod http_client;
pub mod name_rules;
pub mod url;

// Re-export commonly used types for convenience
pub use decompression::{CompressionFormat, DecompressionService};
pub use deterministic_id::playlist_entry_id;
pub use http_client::StandardHttpClient;
pub use self::url::UrlUtils;
