//! On-disk layout of exported entries
//!
//! Movies land in the export root; series episodes under
//! `<series>/Season NN/`. Every entry is a pointer file plus a sidecar with the
//! same stem.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::ExportConfig;
use crate::errors::AppResult;
use crate::models::{
    CanonicalChannelEntry, ContentType, EffectiveEntry, ReconciliationEntry, SidecarMetadata,
};

/// Characters no mainstream filesystem accepts in a path component
const FORBIDDEN_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Make a display name safe to use as a single path component.
///
/// Returns an empty string when nothing usable is left.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(c) && !c.is_control())
        .collect();
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_start_matches('.')
        .trim_end_matches(['.', ' '])
        .to_string()
}

/// File naming rules for one export root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportLayout {
    pointer_extension: String,
    sidecar_extension: String,
}

impl ExportLayout {
    pub fn new(pointer_extension: &str, sidecar_extension: &str) -> Self {
        Self {
            pointer_extension: pointer_extension.trim_start_matches('.').to_string(),
            sidecar_extension: sidecar_extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(&config.pointer_extension, &config.sidecar_extension)
    }

    fn has_extension(path: &Path, extension: &str) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension))
    }

    pub fn is_pointer(&self, path: &Path) -> bool {
        Self::has_extension(path, &self.pointer_extension)
    }

    pub fn is_sidecar(&self, path: &Path) -> bool {
        Self::has_extension(path, &self.sidecar_extension)
    }

    pub fn sidecar_for_pointer(&self, pointer: &Path) -> PathBuf {
        pointer.with_extension(&self.sidecar_extension)
    }

    /// Directory relative to the export root
    pub fn directory_for(&self, entry: &CanonicalChannelEntry) -> PathBuf {
        match (&entry.content_type, &entry.series_info) {
            (ContentType::SeriesEpisode, Some(series)) => {
                let series_dir = sanitize_component(&series.series_name);
                if series_dir.is_empty() {
                    return PathBuf::new();
                }
                PathBuf::from(series_dir).join(format!("Season {:02}", series.season))
            }
            _ => PathBuf::new(),
        }
    }

    /// First free pointer path for `stem`. Later claimants get ` [<id>]`,
    /// then ` [<id>] (2)`, ` [<id>] (3)` and so on. Paths compare
    /// case-insensitively.
    fn claim(&self, claimed: &mut HashSet<String>, directory: &Path, stem: &str, id: &str) -> PathBuf {
        let path_for = |name: &str| directory.join(format!("{name}.{}", self.pointer_extension));

        let plain = path_for(stem);
        if claimed.insert(plain.to_string_lossy().to_lowercase()) {
            return plain;
        }

        let suffixed = format!("{stem} [{}]", sanitize_component(id));
        let mut candidate = suffixed.clone();
        let mut attempt = 1;
        loop {
            let path = path_for(&candidate);
            if claimed.insert(path.to_string_lossy().to_lowercase()) {
                debug!("Pointer path for '{stem}' already claimed, using '{candidate}'");
                return path;
            }
            attempt += 1;
            candidate = format!("{suffixed} ({attempt})");
        }
    }

    /// Plan the desired on-disk state for a list of entries.
    ///
    /// Two entries that would claim the same pointer path are kept apart by
    /// suffixing the later one (see [`ExportLayout::claim`]).
    pub fn plan(
        &self,
        items: &[PlannedItem<'_>],
        generated_at: DateTime<Utc>,
    ) -> AppResult<Vec<ReconciliationEntry>> {
        let mut claimed: HashSet<String> = HashSet::new();
        let mut planned = Vec::with_capacity(items.len());

        for item in items {
            let entry = item.entry;
            let directory_path = self.directory_for(entry);

            let mut stem = sanitize_component(&item.effective.display_name);
            if stem.is_empty() {
                stem = sanitize_component(&entry.id);
            }

            let pointer_path = self.claim(&mut claimed, &directory_path, &stem, &entry.id);
            let sidecar_path = self.sidecar_for_pointer(&pointer_path);

            let metadata = SidecarMetadata {
                external_id: entry.id.clone(),
                display_name: item.effective.display_name.clone(),
                category: item.effective.category.clone(),
                content_type: entry.content_type,
                series: entry.series_info.as_ref().map(|s| s.series_name.clone()),
                season: entry.series_info.as_ref().map(|s| s.season),
                episode: entry.series_info.as_ref().map(|s| s.episode),
                guide_id: item.effective.guide_id.clone(),
                logo_uri: item.artwork.clone().or_else(|| item.effective.logo_uri.clone()),
                sort_number: item.effective.sort_number,
                stream_uri: item.stream_uri.clone(),
                generated_at,
            };

            planned.push(ReconciliationEntry {
                external_id: entry.id.clone(),
                display_name: item.effective.display_name.clone(),
                directory_path,
                pointer_path,
                sidecar_path,
                stream_uri: item.stream_uri.clone(),
                sidecar_content: serde_json::to_string_pretty(&metadata)?,
                metadata,
            });
        }

        Ok(planned)
    }
}

/// An entry ready for layout: overrides merged and stream URI resolved
#[derive(Debug, Clone)]
pub struct PlannedItem<'a> {
    pub entry: &'a CanonicalChannelEntry,
    pub effective: EffectiveEntry,
    pub stream_uri: String,
    /// Enrichment artwork, preferred over the entry's own logo
    pub artwork: Option<String>,
}
