use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{CanonicalChannelEntry, ContentType, Enrichment, OverrideRecord};

/// Caller-supplied input for one generate or export run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DesiredSet {
    pub entries: Vec<CanonicalChannelEntry>,
    #[serde(default)]
    pub overrides: BTreeMap<String, OverrideRecord>,
    #[serde(default)]
    pub enrichment: BTreeMap<String, Enrichment>,
}

/// Desired on-disk state for one exported entry.
///
/// Paths are relative to the export root so they compare directly against
/// what discovery finds on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationEntry {
    pub external_id: String,
    pub display_name: String,
    pub directory_path: PathBuf,
    pub pointer_path: PathBuf,
    pub sidecar_path: PathBuf,
    pub stream_uri: String,
    pub sidecar_content: String,
    pub metadata: SidecarMetadata,
}

/// Structured metadata written next to every pointer file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SidecarMetadata {
    pub external_id: String,
    pub display_name: String,
    pub category: String,
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guide_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_number: Option<u32>,
    pub stream_uri: String,
    pub generated_at: DateTime<Utc>,
}

impl SidecarMetadata {
    /// Equal in everything but the generation timestamp
    pub fn same_content(&self, other: &SidecarMetadata) -> bool {
        Self {
            generated_at: other.generated_at,
            ..self.clone()
        } == *other
    }
}

/// Counts returned by one reconciliation run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    /// Half-written pairs cleaned up during discovery
    pub repaired: usize,
    pub errors: usize,
    pub directory: PathBuf,
    /// One operator-readable message per failed entry
    #[serde(default)]
    pub failures: Vec<String>,
}

impl ExportSummary {
    pub fn new(directory: PathBuf) -> Self {
        Self {
            directory,
            ..Default::default()
        }
    }

    /// Whether the run wrote or removed anything
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0 && self.repaired == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "Export to {}: {} created, {} updated, {} deleted, {} unchanged, {} repaired, {} errors",
            self.directory.display(),
            self.created,
            self.updated,
            self.deleted,
            self.unchanged,
            self.repaired,
            self.errors
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_line() {
        let mut summary = ExportSummary::new(PathBuf::from("/vod"));
        assert!(summary.is_noop());
        summary.created = 2;
        summary.errors = 1;
        let line = summary.summary();
        assert!(line.contains("/vod"));
        assert!(line.contains("2 created"));
        assert!(line.contains("1 errors"));
        assert!(!summary.is_noop());
    }

    #[test]
    fn test_same_content_ignores_timestamp() {
        let a = SidecarMetadata {
            external_id: "movie:42".to_string(),
            display_name: "Heat".to_string(),
            category: "Movies".to_string(),
            content_type: ContentType::Movie,
            series: None,
            season: None,
            episode: None,
            guide_id: None,
            logo_uri: None,
            sort_number: None,
            stream_uri: "http://x/42.mkv".to_string(),
            generated_at: Utc::now(),
        };
        let mut b = a.clone();
        b.generated_at = a.generated_at + chrono::Duration::hours(1);
        assert!(a.same_content(&b));
        b.category = "Drama".to_string();
        assert!(!a.same_content(&b));
    }

    #[test]
    fn test_desired_set_defaults_optional_maps() {
        let set: DesiredSet = serde_json::from_str(r#"{"entries": []}"#).unwrap();
        assert!(set.overrides.is_empty());
        assert!(set.enrichment.is_empty());
    }
}
