//! Error type definitions for m3u-curator
//!
//! The hierarchy mirrors the pipeline stages so callers can decide, per
//! variant, whether a failure is local to one record or aborts the run.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Remote catalog fetch errors
    #[error("Ingestion error: {0}")]
    Ingestion(#[from] IngestionError),

    /// Playlist text parse errors
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Per-entry export failures
    #[error("Reconciliation error: {0}")]
    Reconciliation(#[from] ReconciliationError),

    /// The run cannot proceed; raised before any filesystem mutation
    #[error("Fatal: {message}")]
    Fatal {
        identifier: Option<String>,
        message: String,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Playlist session used outside its open lifecycle
    #[error("Session error: {message}")]
    Session { message: String },

    /// External service errors
    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem errors outside the per-entry export path
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Remote catalog fetch errors
///
/// `endpoint` is the API action (e.g. `get_vod_streams`), never the full URL,
/// so credentials cannot leak into messages.
#[derive(Error, Debug)]
pub enum IngestionError {
    /// Upstream answered with a non-success status code
    #[error("{endpoint}: HTTP status {status}")]
    HttpStatus { endpoint: String, status: u16 },

    /// Upstream answered, but the body was not the expected shape
    #[error("{endpoint}: malformed response - {message}")]
    MalformedResponse { endpoint: String, message: String },

    /// The request never completed
    #[error("{endpoint}: transport failure - {message}")]
    Transport { endpoint: String, message: String },
}

/// Playlist text parse errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Descriptor line that cannot be split into header and display name
    #[error("line {line}: malformed descriptor - {message}")]
    MalformedDescriptor { line: usize, message: String },

    /// Descriptor that was never followed by a URI line
    #[error("line {line}: descriptor has no stream URI")]
    MissingUri { line: usize },
}

/// A filesystem failure on a single export entry
#[derive(Error, Debug)]
#[error("'{display_name}': failed to {operation} {}: {source}", .path.display())]
pub struct ReconciliationError {
    pub display_name: String,
    pub path: PathBuf,
    pub operation: &'static str,
    #[source]
    pub source: std::io::Error,
}

impl AppError {
    /// Create a fatal error that is not tied to a specific identifier
    pub fn fatal<S: Into<String>>(message: S) -> Self {
        Self::Fatal {
            identifier: None,
            message: message.into(),
        }
    }

    /// Create a fatal error for an identifier that does not resolve
    pub fn unresolved<I: Into<String>, S: Into<String>>(identifier: I, context: S) -> Self {
        let identifier = identifier.into();
        Self::Fatal {
            message: format!("unresolvable identifier '{identifier}': {}", context.into()),
            identifier: Some(identifier),
        }
    }

    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a session lifecycle error
    pub fn session<S: Into<String>>(message: S) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Create an external service error
    pub fn external_service<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Whether this error was raised before the run touched the filesystem
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

impl IngestionError {
    pub fn malformed<E: Into<String>, M: Into<String>>(endpoint: E, message: M) -> Self {
        Self::MalformedResponse {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn transport<E: Into<String>, M: Into<String>>(endpoint: E, message: M) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}

impl ReconciliationError {
    pub fn new<S: Into<String>, P: Into<PathBuf>>(
        display_name: S,
        path: P,
        operation: &'static str,
        source: std::io::Error,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            path: path.into(),
            operation,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconciliation_error_names_entry_and_cause() {
        let err = ReconciliationError::new(
            "Breaking Bad S01E01",
            "/vod/Breaking Bad/Season 01/Breaking Bad S01E01.strm",
            "write",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only filesystem"),
        );

        let message = err.to_string();
        assert!(message.contains("Breaking Bad S01E01"));
        assert!(message.contains("read-only filesystem"));
        assert!(message.contains("write"));
    }

    #[test]
    fn test_unresolved_carries_identifier() {
        let err = AppError::unresolved("movie:42", "override target not in desired set");
        assert!(err.is_fatal());
        match err {
            AppError::Fatal { identifier, message } => {
                assert_eq!(identifier.as_deref(), Some("movie:42"));
                assert!(message.contains("movie:42"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
