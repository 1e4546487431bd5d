use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::name_rules;

pub mod export;
pub mod overrides;

pub use export::*;
pub use overrides::*;

/// What kind of content a catalog entry points at
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Live,
    Movie,
    SeriesEpisode,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Live => "live",
            ContentType::Movie => "movie",
            ContentType::SeriesEpisode => "series_episode",
        }
    }

    /// Whether entries of this type are materialized by the export reconciler
    pub fn is_on_demand(&self) -> bool {
        !matches!(self, ContentType::Live)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality tier carried by a trailing name marker
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum QualityTag {
    Uhd,
    Fhd,
    Hd,
    Sd,
}

impl QualityTag {
    /// Higher is better; used to pick a variant group's representative
    pub fn rank(&self) -> u8 {
        match self {
            QualityTag::Uhd => 4,
            QualityTag::Fhd => 3,
            QualityTag::Hd => 2,
            QualityTag::Sd => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTag::Uhd => "UHD",
            QualityTag::Fhd => "FHD",
            QualityTag::Hd => "HD",
            QualityTag::Sd => "SD",
        }
    }
}

impl fmt::Display for QualityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeriesInfo {
    pub series_name: String,
    pub season: u32,
    pub episode: u32,
}

/// Catchup (timeshift archive) parameters advertised for a live channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatchupInfo {
    pub mode: String,
    pub days: u32,
}

/// Normalized representation of one playlist line or catalog record.
///
/// Deserialization goes through [`CanonicalChannelEntry::new`], so quality tag
/// and identity are always derived from the display name. Content type and
/// series info are derived too unless the input states them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "EntryRecord")]
pub struct CanonicalChannelEntry {
    pub id: String,
    pub display_name: String,
    pub category: String,
    pub stream_uri: String,
    /// Original descriptor line, kept so re-serialization can edit it in place
    pub raw_descriptor: String,
    pub quality_tag: Option<QualityTag>,
    pub normalized_identity: String,
    pub content_type: ContentType,
    pub series_info: Option<SeriesInfo>,
    pub guide_id: Option<String>,
    pub logo_uri: Option<String>,
    pub catchup: Option<CatchupInfo>,
}

/// Caller-supplied entry fields; derived fields in the input are ignored
#[derive(Deserialize)]
struct EntryRecord {
    id: String,
    display_name: String,
    category: String,
    stream_uri: String,
    #[serde(default)]
    raw_descriptor: String,
    #[serde(default)]
    content_type: Option<ContentType>,
    #[serde(default)]
    series_info: Option<SeriesInfo>,
    #[serde(default)]
    guide_id: Option<String>,
    #[serde(default)]
    logo_uri: Option<String>,
    #[serde(default)]
    catchup: Option<CatchupInfo>,
}

impl From<EntryRecord> for CanonicalChannelEntry {
    fn from(record: EntryRecord) -> Self {
        let mut entry = CanonicalChannelEntry::new(
            record.id,
            record.display_name,
            record.category,
            record.stream_uri,
            record.raw_descriptor,
        );
        if let Some(content_type) = record.content_type {
            entry = entry.with_content_type(content_type);
        }
        if let Some(series_info) = record.series_info {
            entry = entry.with_series_info(series_info);
        }
        entry
            .with_guide_id(record.guide_id)
            .with_logo(record.logo_uri)
            .with_catchup(record.catchup)
    }
}

impl CanonicalChannelEntry {
    /// Build an entry, deriving quality tag, identity, content type and
    /// series info from the display name, category and stream URI.
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        category: impl Into<String>,
        stream_uri: impl Into<String>,
        raw_descriptor: impl Into<String>,
    ) -> Self {
        let display_name = display_name.into();
        let category = category.into();
        let stream_uri = stream_uri.into();
        let (content_type, series_info) =
            name_rules::detect_content_type(&stream_uri, &display_name, &category);

        Self {
            id: id.into(),
            quality_tag: name_rules::quality_tag(&display_name),
            normalized_identity: name_rules::normalized_identity(&display_name),
            display_name,
            category,
            stream_uri,
            raw_descriptor: raw_descriptor.into(),
            content_type,
            series_info,
            guide_id: None,
            logo_uri: None,
            catchup: None,
        }
    }

    /// Force the content type; series info only survives on series episodes
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        if content_type != ContentType::SeriesEpisode {
            self.series_info = None;
        }
        self
    }

    pub fn with_series_info(mut self, series_info: SeriesInfo) -> Self {
        self.content_type = ContentType::SeriesEpisode;
        self.series_info = Some(series_info);
        self
    }

    pub fn with_guide_id(mut self, guide_id: Option<String>) -> Self {
        self.guide_id = guide_id.filter(|g| !g.trim().is_empty());
        self
    }

    pub fn with_logo(mut self, logo_uri: Option<String>) -> Self {
        self.logo_uri = logo_uri.filter(|l| !l.trim().is_empty());
        self
    }

    pub fn with_catchup(mut self, catchup: Option<CatchupInfo>) -> Self {
        self.catchup = catchup;
        self
    }

    /// Id without its catalog class prefix (`movie:42` -> `42`)
    pub fn id_tail(&self) -> &str {
        self.id.rsplit_once(':').map(|(_, tail)| tail).unwrap_or(&self.id)
    }
}

/// One phase-1 listing row: a category and how many entries it holds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupSummary {
    pub name: String,
    pub count: usize,
}
