//! Centralized error handling for m3u-curator
//!
//! Every layer of the pipeline reports failures through [`AppError`]. The
//! sub-error types map onto how a failure is treated at runtime:
//!
//! - **Ingestion errors**: one catalog fetch failed; that fetch resolves to an
//!   empty list and its siblings carry on
//! - **Parse errors**: one descriptor line is malformed; the line is skipped
//! - **Reconciliation errors**: one export entry hit a filesystem failure; the
//!   run counts it and moves on
//! - **Fatal errors**: the run cannot start; nothing on disk has been touched
//!
//! # Usage
//!
//! ```rust
//! use m3u_curator::errors::{AppError, AppResult};
//!
//! fn require_entries(count: usize) -> AppResult<()> {
//!     if count == 0 {
//!         return Err(AppError::fatal("desired entry set is empty"));
//!     }
//!     Ok(())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for ingestion Results
pub type IngestionResult<T> = Result<T, IngestionError>;
