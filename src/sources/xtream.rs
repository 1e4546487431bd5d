//! Xtream Codes catalog client
//!
//! Fetches the three content classes (live, movies, series) concurrently, each
//! joined with its own category listing. Series need one extra
//! `get_series_info` request per show to list episodes; those requests run in
//! fixed-size waves so a large catalog never fans out unbounded.
//!
//! Any single failed request resolves to an empty result and is recorded in
//! [`CatalogSnapshot::failures`]; it never aborts sibling fetches.

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::traits::CatalogTransport;
use crate::config::{IngestionConfig, UpstreamConfig};
use crate::errors::{AppError, AppResult, IngestionError, IngestionResult};
use crate::models::{CanonicalChannelEntry, CatchupInfo, ContentType, SeriesInfo};
use crate::proxy::stream_url::xtream_stream_url;
use crate::utils::UrlUtils;
use crate::utils::name_rules::{clean_name, detect_series};

/// Everything one catalog fetch produced
#[derive(Debug, Default, Serialize)]
pub struct CatalogSnapshot {
    pub live: Vec<CanonicalChannelEntry>,
    pub movies: Vec<CanonicalChannelEntry>,
    pub episodes: Vec<CanonicalChannelEntry>,
    /// Fetches that resolved to an empty result
    #[serde(skip)]
    pub failures: Vec<IngestionError>,
}

impl CatalogSnapshot {
    pub fn len(&self) -> usize {
        self.live.len() + self.movies.len() + self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Items plus the failures collected while fetching them
type Collected = (Vec<CanonicalChannelEntry>, Vec<IngestionError>);

/// Client for one Xtream account
pub struct XtreamCatalogClient<T: CatalogTransport> {
    transport: T,
    upstream: UpstreamConfig,
    series_batch_size: usize,
    min_series_episodes: usize,
    default_category: String,
}

impl<T: CatalogTransport> XtreamCatalogClient<T> {
    pub fn new(transport: T, upstream: UpstreamConfig, ingestion: &IngestionConfig) -> Self {
        Self {
            transport,
            upstream,
            series_batch_size: ingestion.series_batch_size.max(1),
            min_series_episodes: ingestion.min_series_episodes,
            default_category: ingestion.default_category.clone(),
        }
    }

    /// Upstream base URL with a scheme and without trailing slashes
    fn base_url(&self) -> String {
        let base = UrlUtils::trim_base(&self.upstream.base_url);
        if base.starts_with("http://") || base.starts_with("https://") {
            base.to_string()
        } else {
            format!("https://{base}")
        }
    }

    fn api_url(&self, params: &[(&str, &str)]) -> AppResult<String> {
        let mut url = url::Url::parse(&format!("{}/player_api.php", self.base_url()))
            .map_err(|e| AppError::validation(format!("Invalid Xtream URL: {e}")))?;

        url.query_pairs_mut()
            .append_pair("username", &self.upstream.username)
            .append_pair("password", &self.upstream.password);
        for (key, value) in params {
            url.query_pairs_mut().append_pair(key, value);
        }
        Ok(url.to_string())
    }

    fn stream_uri(&self, class: &str, id: i32, extension: &str) -> String {
        xtream_stream_url(
            &self.base_url(),
            class,
            &self.upstream.username,
            &self.upstream.password,
            &id.to_string(),
            extension,
        )
    }

    /// Check the account is active before pulling a full catalog
    pub async fn verify_account(&self) -> AppResult<()> {
        let url = self.api_url(&[])?;
        debug!("Verifying Xtream account at {}", UrlUtils::obfuscate_credentials(&url));

        let value = self.transport.fetch_json(&url).await?;
        let server_info: XtreamServerInfo = serde_json::from_value(value).map_err(|e| {
            AppError::Ingestion(IngestionError::malformed("player_api.php", e.to_string()))
        })?;

        match server_info.user_info {
            Some(user) if user.auth == Some(0) => Err(AppError::external_service(
                "xtream",
                "authentication rejected by upstream",
            )),
            Some(user) if !user.status.eq_ignore_ascii_case("active") => Err(
                AppError::external_service("xtream", format!("account status is {}", user.status)),
            ),
            Some(_) => Ok(()),
            None => Err(AppError::external_service(
                "xtream",
                "server did not return user information",
            )),
        }
    }

    async fn fetch_value(&self, endpoint: &str, params: &[(&str, &str)]) -> IngestionResult<Value> {
        let url = self
            .api_url(params)
            .map_err(|e| IngestionError::transport(endpoint, e.to_string()))?;
        debug!("Fetching {} from {}", endpoint, UrlUtils::obfuscate_credentials(&url));

        self.transport
            .fetch_json(&url)
            .await
            .map_err(|e| retag(endpoint, e))
    }

    async fn fetch_list<D: DeserializeOwned>(&self, action: &str) -> IngestionResult<Vec<D>> {
        let value = self.fetch_value(action, &[("action", action)]).await?;
        match value {
            Value::Array(_) => serde_json::from_value(value)
                .map_err(|e| IngestionError::malformed(action, e.to_string())),
            // Some panels answer an empty listing with `{}`
            Value::Object(ref map) if map.is_empty() => Ok(Vec::new()),
            other => Err(IngestionError::malformed(
                action,
                format!("expected a JSON array, got {}", json_kind(&other)),
            )),
        }
    }

    async fn fetch_categories(&self, action: &str) -> IngestionResult<HashMap<i32, String>> {
        let categories: Vec<XtreamCategory> = self.fetch_list(action).await?;
        Ok(categories
            .into_iter()
            .map(|c| (c.category_id, c.category_name.trim().to_string()))
            .collect())
    }

    fn resolve_category(
        &self,
        category_id: Option<i32>,
        own_name: Option<&str>,
        categories: &HashMap<i32, String>,
    ) -> String {
        category_id
            .and_then(|id| categories.get(&id))
            .map(String::as_str)
            .or(own_name)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(self.default_category.as_str())
            .to_string()
    }

    /// Fetch the whole catalog
    pub async fn fetch_catalog(&self) -> CatalogSnapshot {
        info!(
            "Fetching Xtream catalog from {}",
            UrlUtils::obfuscate_credentials(&self.base_url())
        );

        let ((live, live_failures), (movies, movie_failures), (episodes, series_failures)) =
            tokio::join!(self.fetch_live(), self.fetch_movies(), self.fetch_series());

        let mut failures = live_failures;
        failures.extend(movie_failures);
        failures.extend(series_failures);

        info!(
            "Fetched {} live, {} movies, {} episodes ({} failed request(s))",
            live.len(),
            movies.len(),
            episodes.len(),
            failures.len()
        );

        CatalogSnapshot {
            live,
            movies,
            episodes,
            failures,
        }
    }

    async fn fetch_live(&self) -> Collected {
        let (streams, categories) = tokio::join!(
            self.fetch_list::<XtreamLiveStream>("get_live_streams"),
            self.fetch_categories("get_live_categories")
        );
        let mut failures = Vec::new();
        let streams = settle(streams, &mut failures);
        let categories = settle(categories, &mut failures);

        let entries = streams
            .into_iter()
            .map(|stream| {
                let category = self.resolve_category(
                    stream.category_id,
                    stream.category_name.as_deref(),
                    &categories,
                );
                let catchup = (stream.tv_archive == Some(1)).then(|| CatchupInfo {
                    mode: "xc".to_string(),
                    days: stream.tv_archive_duration.unwrap_or(0).max(0) as u32,
                });

                CanonicalChannelEntry::new(
                    format!("live:{}", stream.stream_id),
                    display_name_or(stream.name.as_deref(), "Channel", stream.stream_id),
                    category,
                    self.stream_uri("live", stream.stream_id, "ts"),
                    "",
                )
                .with_content_type(ContentType::Live)
                .with_guide_id(stream.epg_channel_id)
                .with_logo(stream.stream_icon)
                .with_catchup(catchup)
            })
            .collect();

        (entries, failures)
    }

    async fn fetch_movies(&self) -> Collected {
        let (streams, categories) = tokio::join!(
            self.fetch_list::<XtreamVodStream>("get_vod_streams"),
            self.fetch_categories("get_vod_categories")
        );
        let mut failures = Vec::new();
        let streams = settle(streams, &mut failures);
        let categories = settle(categories, &mut failures);

        let entries = streams
            .into_iter()
            .map(|stream| {
                let category = self.resolve_category(
                    stream.category_id,
                    stream.category_name.as_deref(),
                    &categories,
                );
                let extension = stream.container_extension.as_deref().unwrap_or("mp4");

                CanonicalChannelEntry::new(
                    format!("movie:{}", stream.stream_id),
                    display_name_or(stream.name.as_deref(), "Movie", stream.stream_id),
                    category,
                    self.stream_uri("movie", stream.stream_id, extension),
                    "",
                )
                .with_content_type(ContentType::Movie)
                .with_logo(stream.stream_icon)
            })
            .collect();

        (entries, failures)
    }

    async fn fetch_series(&self) -> Collected {
        let (listing, categories) = tokio::join!(
            self.fetch_list::<XtreamSeries>("get_series"),
            self.fetch_categories("get_series_categories")
        );
        let mut failures = Vec::new();
        let listing = settle(listing, &mut failures);
        let categories = settle(categories, &mut failures);

        let shows: Vec<(XtreamSeries, String)> = listing
            .into_iter()
            .map(|show| {
                let category = self.resolve_category(
                    show.category_id,
                    show.category_name.as_deref(),
                    &categories,
                );
                (show, category)
            })
            .collect();

        let mut episodes = Vec::new();
        let mut dropped = 0usize;
        for (wave_index, wave) in shows.chunks(self.series_batch_size).enumerate() {
            debug!(
                "Fetching series info wave {} ({} series)",
                wave_index + 1,
                wave.len()
            );
            let results = join_all(
                wave.iter()
                    .map(|(show, category)| self.fetch_series_episodes(show, category)),
            )
            .await;

            for ((show, _), result) in wave.iter().zip(results) {
                match result {
                    Ok(list) if list.len() < self.min_series_episodes => {
                        debug!(
                            "Dropping series '{}' with {} episode(s)",
                            show.name.as_deref().unwrap_or_default(),
                            list.len()
                        );
                        dropped += 1;
                    }
                    Ok(list) => episodes.extend(list),
                    Err(e) => {
                        warn!(
                            "Series '{}' resolved to no episodes: {}",
                            show.name.as_deref().unwrap_or_default(),
                            e
                        );
                        failures.push(e);
                    }
                }
            }
        }

        if dropped > 0 {
            info!("Dropped {} series with too few episodes", dropped);
        }
        (episodes, failures)
    }

    async fn fetch_series_episodes(
        &self,
        show: &XtreamSeries,
        category: &str,
    ) -> IngestionResult<Vec<CanonicalChannelEntry>> {
        let series_id = show.series_id.to_string();
        let endpoint = format!("get_series_info(series_id={series_id})");
        let value = self
            .fetch_value(
                &endpoint,
                &[("action", "get_series_info"), ("series_id", series_id.as_str())],
            )
            .await?;

        let info: XtreamSeriesInfo = serde_json::from_value(value)
            .map_err(|e| IngestionError::malformed(&endpoint, e.to_string()))?;
        let mut episodes = collect_episodes(info.episodes)
            .map_err(|e| IngestionError::malformed(&endpoint, e.to_string()))?;

        let series_name = {
            let cleaned = clean_name(show.name.as_deref().unwrap_or_default());
            if cleaned.is_empty() {
                format!("Series {}", show.series_id)
            } else {
                cleaned
            }
        };

        episodes.sort_by_key(|e| (e.season, e.number));
        Ok(episodes
            .into_iter()
            .map(|located| {
                let XtreamEpisodeRef {
                    season,
                    number,
                    episode,
                } = located;
                let name = episode
                    .title
                    .as_deref()
                    .map(str::trim)
                    .filter(|title| detect_series(title).is_some())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{series_name} S{season:02}E{number:02}"));
                let extension = episode.container_extension.as_deref().unwrap_or("mp4");
                let artwork = episode
                    .info
                    .as_ref()
                    .and_then(|info| info.get("movie_image"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| show.cover.clone());

                CanonicalChannelEntry::new(
                    format!("episode:{}", episode.id),
                    name,
                    category,
                    self.stream_uri("series", episode.id, extension),
                    "",
                )
                .with_series_info(SeriesInfo {
                    series_name: series_name.clone(),
                    season,
                    episode: number,
                })
                .with_logo(artwork)
            })
            .collect())
    }
}

/// Re-label a transport error with the API action that produced it
fn retag(endpoint: &str, error: AppError) -> IngestionError {
    match error {
        AppError::Ingestion(IngestionError::HttpStatus { status, .. }) => {
            IngestionError::HttpStatus {
                endpoint: endpoint.to_string(),
                status,
            }
        }
        AppError::Ingestion(IngestionError::MalformedResponse { message, .. }) => {
            IngestionError::malformed(endpoint, message)
        }
        AppError::Ingestion(IngestionError::Transport { message, .. }) => {
            IngestionError::transport(endpoint, message)
        }
        other => IngestionError::transport(
            endpoint,
            UrlUtils::obfuscate_credentials(&other.to_string()),
        ),
    }
}

/// Resolve a failed fetch to its empty value, keeping the error
fn settle<V: Default>(result: IngestionResult<V>, failures: &mut Vec<IngestionError>) -> V {
    result.unwrap_or_else(|e| {
        warn!("Catalog fetch resolved to empty: {e}");
        failures.push(e);
        V::default()
    })
}

fn display_name_or(name: Option<&str>, kind: &str, id: i32) -> String {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{kind} {id}"))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// An episode with its resolved season and episode numbers
struct XtreamEpisodeRef {
    season: u32,
    number: u32,
    episode: XtreamEpisode,
}

/// Flatten a `get_series_info` episode listing.
///
/// Panels return either a map keyed by season number or a (possibly nested)
/// array. Missing numbers fall back to the season key and list position.
fn collect_episodes(value: Value) -> Result<Vec<XtreamEpisodeRef>, serde_json::Error> {
    fn locate(
        season_key: Option<u32>,
        list: Vec<XtreamEpisode>,
        out: &mut Vec<XtreamEpisodeRef>,
    ) {
        for (position, episode) in list.into_iter().enumerate() {
            let season = episode
                .season
                .and_then(|s| u32::try_from(s).ok())
                .filter(|s| *s > 0)
                .or(season_key)
                .unwrap_or(1);
            let number = episode
                .episode_num
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(position as u32 + 1);
            out.push(XtreamEpisodeRef {
                season,
                number,
                episode,
            });
        }
    }

    let mut out = Vec::new();
    match value {
        Value::Null => {}
        Value::Object(seasons) => {
            for (key, list) in seasons {
                let list: Vec<XtreamEpisode> = serde_json::from_value(list)?;
                locate(key.trim().parse().ok(), list, &mut out);
            }
        }
        Value::Array(items) => {
            let mut flat = Vec::new();
            for item in items {
                match item {
                    Value::Array(_) => {
                        let list: Vec<XtreamEpisode> = serde_json::from_value(item)?;
                        locate(None, list, &mut out);
                    }
                    other => flat.push(serde_json::from_value(other)?),
                }
            }
            locate(None, flat, &mut out);
        }
        other => {
            return Err(<serde_json::Error as serde::de::Error>::custom(format!(
                "episodes must be an object or array, got {}",
                json_kind(&other)
            )));
        }
    }
    Ok(out)
}

/// Xtream server information response
#[derive(Debug, Clone, Deserialize)]
struct XtreamServerInfo {
    #[serde(default)]
    user_info: Option<XtreamUserInfo>,
}

#[derive(Debug, Clone, Deserialize)]
struct XtreamUserInfo {
    #[serde(default)]
    status: String,
    #[serde(deserialize_with = "deserialize_string_or_int_option", default)]
    auth: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
struct XtreamCategory {
    #[serde(deserialize_with = "deserialize_string_or_int")]
    category_id: i32,
    #[serde(default)]
    category_name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct XtreamLiveStream {
    #[serde(default)]
    name: Option<String>,
    #[serde(deserialize_with = "deserialize_string_or_int")]
    stream_id: i32,
    #[serde(default)]
    stream_icon: Option<String>,
    #[serde(default)]
    epg_channel_id: Option<String>,
    #[serde(default)]
    category_name: Option<String>,
    #[serde(deserialize_with = "deserialize_string_or_int_option", default)]
    category_id: Option<i32>,
    #[serde(deserialize_with = "deserialize_string_or_int_option", default)]
    tv_archive: Option<i32>,
    #[serde(deserialize_with = "deserialize_string_or_int_option", default)]
    tv_archive_duration: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
struct XtreamVodStream {
    #[serde(default)]
    name: Option<String>,
    #[serde(deserialize_with = "deserialize_string_or_int")]
    stream_id: i32,
    #[serde(default)]
    stream_icon: Option<String>,
    #[serde(default)]
    category_name: Option<String>,
    #[serde(deserialize_with = "deserialize_string_or_int_option", default)]
    category_id: Option<i32>,
    #[serde(default)]
    container_extension: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct XtreamSeries {
    #[serde(deserialize_with = "deserialize_string_or_int")]
    series_id: i32,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    cover: Option<String>,
    #[serde(default)]
    category_name: Option<String>,
    #[serde(deserialize_with = "deserialize_string_or_int_option", default)]
    category_id: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
struct XtreamSeriesInfo {
    #[serde(default)]
    episodes: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct XtreamEpisode {
    #[serde(deserialize_with = "deserialize_string_or_int")]
    id: i32,
    #[serde(deserialize_with = "deserialize_string_or_int_option", default)]
    episode_num: Option<i32>,
    #[serde(deserialize_with = "deserialize_string_or_int_option", default)]
    season: Option<i32>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    container_extension: Option<String>,
    /// Shape varies by panel (object or empty array)
    #[serde(default)]
    info: Option<Value>,
}

fn deserialize_string_or_int<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Unexpected, Visitor};

    struct StringOrIntVisitor;

    impl<'de> Visitor<'de> for StringOrIntVisitor {
        type Value = i32;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer")
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            i32::try_from(value).map_err(|_| E::invalid_value(Unexpected::Signed(value), &self))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            i32::try_from(value).map_err(|_| E::invalid_value(Unexpected::Unsigned(value), &self))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            value
                .trim()
                .parse()
                .map_err(|_| E::invalid_value(Unexpected::Str(value), &self))
        }
    }

    deserializer.deserialize_any(StringOrIntVisitor)
}

fn deserialize_string_or_int_option<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Unexpected, Visitor};

    struct StringOrIntOptionVisitor;

    impl<'de> Visitor<'de> for StringOrIntOptionVisitor {
        type Value = Option<i32>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string, integer, or null")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            i32::try_from(value)
                .map(Some)
                .map_err(|_| E::invalid_value(Unexpected::Signed(value), &self))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            i32::try_from(value)
                .map(Some)
                .map_err(|_| E::invalid_value(Unexpected::Unsigned(value), &self))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            let value = value.trim();
            if value.is_empty() {
                Ok(None)
            } else {
                value
                    .parse()
                    .map(Some)
                    .map_err(|_| E::invalid_value(Unexpected::Str(value), &self))
            }
        }
    }

    deserializer.deserialize_any(StringOrIntOptionVisitor)
}
