//! On-demand content export
//!
//! Movies and series episodes are materialized as a pointer file (the stream
//! URI) plus a JSON sidecar. [`Reconciler`] keeps an export root in step with a
//! desired set across runs.

pub mod discovery;
pub mod layout;
pub mod reconciler;

pub use discovery::{DiscoveredPair, DiskIndex};
pub use layout::{ExportLayout, sanitize_component};
pub use reconciler::Reconciler;
