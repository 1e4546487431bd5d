//! Remote catalog sources
//!
//! [`XtreamCatalogClient`] pulls live channels, movies and series episodes from
//! an Xtream Codes compatible `player_api.php` endpoint and converts them into
//! [`CanonicalChannelEntry`](crate::models::CanonicalChannelEntry) records.

pub mod traits;
pub mod xtream;

pub use traits::CatalogTransport;
pub use xtream::{CatalogSnapshot, XtreamCatalogClient};
