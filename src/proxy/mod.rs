//! Playlist output
//!
//! [`generator`] renders curated entries as playlist text; [`stream_url`]
//! decides which stream URI each output line points at.

pub mod generator;
pub mod stream_url;

pub use generator::{PlaylistGenerator, PlaylistItem};
pub use stream_url::StreamUriBuilder;
