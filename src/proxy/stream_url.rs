//! Resolvable stream URIs
//!
//! Both sinks (playlist text and pointer files) embed a stream URI. It is
//! either the entry's upstream URI as ingested, or an Xtream-style path
//! under a caller-supplied base URL and credential pair.

use crate::config::{GeneratorConfig, UpstreamConfig};
use crate::models::{CanonicalChannelEntry, ContentType};
use crate::utils::UrlUtils;

/// Build `<base>/<class>/<username>/<password>/<id>.<ext>`
pub fn xtream_stream_url(
    base_url: &str,
    class: &str,
    username: &str,
    password: &str,
    id: &str,
    extension: &str,
) -> String {
    format!(
        "{}/{class}/{username}/{password}/{id}.{extension}",
        UrlUtils::trim_base(base_url)
    )
}

/// Path segment Xtream servers use for a content type
pub fn stream_class(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Live => "live",
        ContentType::Movie => "movie",
        ContentType::SeriesEpisode => "series",
    }
}

/// File extension of a URI's last path segment, if it looks like one
fn uri_extension(uri: &str) -> Option<&str> {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let segment = path.rsplit('/').next()?;
    let (_, extension) = segment.rsplit_once('.')?;
    (!extension.is_empty()
        && extension.len() <= 5
        && extension.chars().all(|c| c.is_ascii_alphanumeric()))
    .then_some(extension)
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StreamUriBuilder {
    /// Use the ingested stream URI as-is
    #[default]
    Direct,
    /// Rewrite every URI onto a base URL with embedded credentials
    Proxied {
        base_url: String,
        username: String,
        password: String,
    },
}

impl StreamUriBuilder {
    /// Proxied when a public base URL and credentials are both configured
    pub fn from_config(generator: &GeneratorConfig, upstream: Option<&UpstreamConfig>) -> Self {
        match (generator.base_url.as_deref(), upstream) {
            (Some(base_url), Some(credentials)) if !base_url.trim().is_empty() => Self::Proxied {
                base_url: base_url.to_string(),
                username: credentials.username.clone(),
                password: credentials.password.clone(),
            },
            _ => Self::Direct,
        }
    }

    pub fn resolve(&self, entry: &CanonicalChannelEntry) -> String {
        match self {
            Self::Direct => entry.stream_uri.clone(),
            Self::Proxied {
                base_url,
                username,
                password,
            } => {
                let default_extension = match entry.content_type {
                    ContentType::Live => "ts",
                    _ => "mp4",
                };
                let extension = uri_extension(&entry.stream_uri).unwrap_or(default_extension);
                xtream_stream_url(
                    base_url,
                    stream_class(entry.content_type),
                    username,
                    password,
                    entry.id_tail(),
                    extension,
                )
            }
        }
    }
}
