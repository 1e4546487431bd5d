//! Source transport abstraction
//!
//! The catalog client only needs "GET this URL, give me JSON". Keeping that
//! behind a trait lets tests drive the client with canned responses.

use async_trait::async_trait;

use crate::errors::AppResult;

#[async_trait]
pub trait CatalogTransport: Send + Sync {
    /// Fetch `url` and decode the body as JSON
    async fn fetch_json(&self, url: &str) -> AppResult<serde_json::Value>;
}
