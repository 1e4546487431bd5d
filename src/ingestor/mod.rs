//! Playlist text ingestion
//!
//! [`extinf`] holds the descriptor grammar shared with the playlist generator;
//! [`m3u_parser`] holds the two-phase [`PlaylistSession`].

pub mod extinf;
pub mod m3u_parser;

pub use extinf::ExtInf;
pub use m3u_parser::{ParseOptions, PlaylistSession};
