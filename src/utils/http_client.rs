use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::debug;

use crate::errors::{AppError, AppResult, IngestionError};
use crate::sources::CatalogTransport;
use crate::utils::url::UrlUtils;
use crate::utils::{CompressionFormat, DecompressionService};

/// reqwest-backed client with automatic decompression of upstream payloads
#[derive(Debug, Clone)]
pub struct StandardHttpClient {
    client: Client,
}

impl StandardHttpClient {
    /// Create a client with both a connect timeout and a total request timeout
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;

        Ok(Self { client })
    }

    /// Fetch a URL and return its decompressed body as UTF-8 text
    pub async fn fetch_text(&self, url: &str) -> AppResult<String> {
        debug!("Fetching text content from: {}", UrlUtils::obfuscate_credentials(url));

        let bytes = self.fetch_bytes(url).await?;
        let content = String::from_utf8(bytes).map_err(|e| {
            AppError::external_service(
                "http_client",
                format!("Failed to decode content as UTF-8: {e}"),
            )
        })?;

        debug!("Successfully fetched {} characters of text content", content.len());
        Ok(content)
    }

    async fn fetch_bytes(&self, url: &str) -> AppResult<Vec<u8>> {
        let response = self.client.get(url).send().await.map_err(|e| {
            AppError::Ingestion(IngestionError::transport(
                endpoint_label(url),
                UrlUtils::obfuscate_credentials(&e.to_string()),
            ))
        })?;

        Self::process_response_to_bytes(response, url).await
    }

    async fn process_response_to_bytes(response: Response, url: &str) -> AppResult<Vec<u8>> {
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Ingestion(IngestionError::HttpStatus {
                endpoint: endpoint_label(url),
                status: status.as_u16(),
            }));
        }

        let bytes = response.bytes().await.map_err(|e| {
            AppError::Ingestion(IngestionError::transport(
                endpoint_label(url),
                format!("Failed to read response: {}", UrlUtils::obfuscate_credentials(&e.to_string())),
            ))
        })?;
        debug!("Fetched {} bytes of raw content", bytes.len());

        let compression_format = DecompressionService::detect_compression_format(&bytes);
        let decompressed = match compression_format {
            CompressionFormat::Uncompressed => bytes.to_vec(),
            _ => DecompressionService::decompress(bytes).map_err(|e| {
                AppError::external_service("http_client", format!("Failed to decompress content: {e}"))
            })?,
        };

        debug!(
            "Successfully processed {} bytes of content (compression: {:?})",
            decompressed.len(),
            compression_format
        );
        Ok(decompressed)
    }
}

#[async_trait]
impl CatalogTransport for StandardHttpClient {
    async fn fetch_json(&self, url: &str) -> AppResult<serde_json::Value> {
        debug!("Fetching JSON content from: {}", UrlUtils::obfuscate_credentials(url));

        let bytes = self.fetch_bytes(url).await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            AppError::Ingestion(IngestionError::malformed(
                endpoint_label(url),
                format!("Failed to parse JSON: {e}"),
            ))
        })
    }
}

/// Short, credential-free description of a request target for error messages
fn endpoint_label(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let action = parsed
                .query_pairs()
                .find(|(key, _)| key == "action")
                .map(|(_, value)| format!("?action={value}"))
                .unwrap_or_default();
            UrlUtils::obfuscate_credentials(&format!("{}{action}", parsed.path()))
        }
        Err(_) => "<invalid url>".to_string(),
    }
}
