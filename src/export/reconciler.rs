//! On-demand content reconciler
//!
//! Brings an export root in line with a desired set of movies and series
//! episodes. A run plans the desired state, scans the disk once, then applies
//! removals before writes. Every entry is handled independently: a filesystem
//! failure on one is counted and the run carries on.

use std::collections::{BTreeSet, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::discovery::{DiscoveredPair, DiskIndex, discover};
use super::layout::{ExportLayout, PlannedItem};
use crate::config::ExportConfig;
use crate::errors::{AppError, AppResult, ReconciliationError};
use crate::models::{DesiredSet, ExportSummary, OverrideMap, ReconciliationEntry, effective};
use crate::proxy::StreamUriBuilder;
use crate::variants::{group_variants, propagate_group_overrides};

/// What one run will do to one tracked id
#[derive(Debug)]
enum Action<'a> {
    Create(&'a ReconciliationEntry),
    Replace(&'a DiscoveredPair, &'a ReconciliationEntry),
    Keep,
}

pub struct Reconciler {
    root: PathBuf,
    layout: ExportLayout,
    prune_stray_pointers: bool,
    allow_empty_desired_set: bool,
    uri_builder: StreamUriBuilder,
}

impl Reconciler {
    pub fn new(config: &ExportConfig, uri_builder: StreamUriBuilder) -> Self {
        Self {
            root: config.directory.clone(),
            layout: ExportLayout::from_config(config),
            prune_stray_pointers: config.prune_stray_pointers,
            allow_empty_desired_set: config.allow_empty_desired_set,
            uri_builder,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compute the desired on-disk state without touching the filesystem.
    ///
    /// Only on-demand entries are planned. Fails with `Fatal` when an
    /// override names an unknown id, or when nothing is left to export and
    /// empty runs are not allowed.
    pub fn plan(&self, desired: &DesiredSet) -> AppResult<Vec<ReconciliationEntry>> {
        let overrides = OverrideMap::validated(desired.overrides.clone(), &desired.entries)?;
        let overrides = propagate_group_overrides(&group_variants(&desired.entries), &overrides);

        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for entry in &desired.entries {
            if !entry.content_type.is_on_demand() {
                continue;
            }
            if !seen.insert(entry.id.as_str()) {
                warn!(
                    "Skipping duplicate desired entry '{}' ({})",
                    entry.display_name, entry.id
                );
                continue;
            }
            items.push(PlannedItem {
                entry,
                effective: effective(entry, overrides.get(&entry.id)),
                stream_uri: self.uri_builder.resolve(entry),
                artwork: desired
                    .enrichment
                    .get(&entry.id)
                    .and_then(|e| e.artwork.clone())
                    .filter(|a| !a.trim().is_empty()),
            });
        }

        if items.is_empty() && !self.allow_empty_desired_set {
            return Err(AppError::fatal(format!(
                "desired set has no on-demand entries; refusing to empty {}",
                self.root.display()
            )));
        }

        self.layout.plan(&items, Utc::now())
    }

    /// Run one reconciliation against the export root
    pub async fn run(&self, desired: &DesiredSet) -> AppResult<ExportSummary> {
        let planned = self.plan(desired)?;
        let index = self.scan().await?;

        let mut summary = ExportSummary::new(self.root.clone());
        summary.repaired = index.repaired;
        summary.errors = index.failures.len();
        summary.failures = index.failures.clone();

        let desired_ids: HashSet<&str> = planned.iter().map(|p| p.external_id.as_str()).collect();
        let actions: Vec<Action<'_>> = planned
            .iter()
            .map(|entry| classify(&index, entry))
            .collect();

        let orphans: Vec<&DiscoveredPair> = index
            .tracked
            .values()
            .filter(|pair| !desired_ids.contains(pair.external_id.as_str()))
            .chain(index.duplicates.iter())
            .collect();

        debug!(
            "Export plan for {}: {} desired, {} tracked, {} orphaned",
            self.root.display(),
            planned.len(),
            index.tracked.len(),
            orphans.len()
        );

        let mut emptied: BTreeSet<PathBuf> = index.touched_directories.iter().cloned().collect();

        // Removals first so later writes never collide with a stale path
        for pair in orphans {
            match self.remove_pair(pair).await {
                Ok(()) => {
                    info!("Removed '{}' ({})", pair.display_name(), pair.external_id);
                    summary.deleted += 1;
                    emptied.extend(self.root.join(&pair.pointer_path).parent().map(Path::to_path_buf));
                }
                Err(e) => record_failure(&mut summary, e),
            }
        }

        let mut replacements = Vec::new();
        for action in &actions {
            if let Action::Replace(old, new) = action {
                match self.remove_pair(old).await {
                    Ok(()) => {
                        emptied.extend(self.root.join(&old.pointer_path).parent().map(Path::to_path_buf));
                        replacements.push(*new);
                    }
                    Err(e) => record_failure(&mut summary, e),
                }
            }
        }

        for action in &actions {
            match action {
                Action::Create(entry) => match self.write_pair(entry).await {
                    Ok(()) => {
                        debug!("Created '{}'", entry.display_name);
                        summary.created += 1;
                    }
                    Err(e) => record_failure(&mut summary, e),
                },
                Action::Keep => summary.unchanged += 1,
                Action::Replace(..) => {}
            }
        }

        for entry in replacements {
            match self.write_pair(entry).await {
                Ok(()) => {
                    debug!("Updated '{}'", entry.display_name);
                    summary.updated += 1;
                }
                Err(e) => record_failure(&mut summary, e),
            }
        }

        self.prune_empty_directories(emptied).await;

        if summary.errors > 0 {
            warn!("{}", summary.summary());
        } else {
            info!("{}", summary.summary());
        }
        Ok(summary)
    }

    async fn scan(&self) -> AppResult<DiskIndex> {
        let root = self.root.clone();
        let layout = self.layout.clone();
        let prune = self.prune_stray_pointers;

        tokio::task::spawn_blocking(move || discover(&root, &layout, prune))
            .await
            .map_err(|e| AppError::fatal(format!("export discovery did not complete: {e}")))?
    }

    /// Pointer first, then sidecar. A file that is already gone counts as removed.
    async fn remove_pair(&self, pair: &DiscoveredPair) -> Result<(), ReconciliationError> {
        for path in [&pair.pointer_path, &pair.sidecar_path] {
            let full = self.root.join(path);
            match tokio::fs::remove_file(&full).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(ReconciliationError::new(pair.display_name(), full, "remove", e));
                }
            }
        }
        Ok(())
    }

    /// Pointer first, then sidecar. If the sidecar cannot be written the
    /// pointer is taken back out so no half pair is left behind.
    async fn write_pair(&self, entry: &ReconciliationEntry) -> Result<(), ReconciliationError> {
        let directory = self.root.join(&entry.directory_path);
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| ReconciliationError::new(&entry.display_name, &directory, "create", e))?;

        let pointer = self.root.join(&entry.pointer_path);
        tokio::fs::write(&pointer, &entry.stream_uri)
            .await
            .map_err(|e| ReconciliationError::new(&entry.display_name, &pointer, "write", e))?;

        let sidecar = self.root.join(&entry.sidecar_path);
        if let Err(e) = tokio::fs::write(&sidecar, &entry.sidecar_content).await {
            if let Err(cleanup) = tokio::fs::remove_file(&pointer).await {
                warn!(
                    "Could not remove pointer {} after failed sidecar write: {cleanup}",
                    pointer.display()
                );
            }
            return Err(ReconciliationError::new(&entry.display_name, sidecar, "write", e));
        }
        Ok(())
    }

    /// Remove directories emptied by this run, walking up towards the root
    async fn prune_empty_directories(&self, candidates: BTreeSet<PathBuf>) {
        // Deepest first so a parent is only tried after its children
        let mut candidates: Vec<PathBuf> = candidates.into_iter().collect();
        candidates.sort_by_key(|p| std::cmp::Reverse(p.components().count()));

        for candidate in candidates {
            let mut current = candidate.as_path();
            while current != self.root && current.starts_with(&self.root) {
                if tokio::fs::remove_dir(current).await.is_err() {
                    break;
                }
                debug!("Removed empty directory {}", current.display());
                match current.parent() {
                    Some(parent) => current = parent,
                    None => break,
                }
            }
        }
    }
}

fn classify<'a>(index: &'a DiskIndex, entry: &'a ReconciliationEntry) -> Action<'a> {
    match index.tracked.get(&entry.external_id) {
        None => Action::Create(entry),
        Some(pair)
            if pair.pointer_path == entry.pointer_path
                && pair.sidecar_path == entry.sidecar_path
                && pair.pointer_content == entry.stream_uri
                && pair.metadata.same_content(&entry.metadata) =>
        {
            Action::Keep
        }
        Some(pair) => Action::Replace(pair, entry),
    }
}

fn record_failure(summary: &mut ExportSummary, error: ReconciliationError) {
    warn!("{error}");
    summary.errors += 1;
    summary.failures.push(error.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CanonicalChannelEntry, ContentType, OverrideRecord};
    use tempfile::TempDir;

    fn config(dir: &Path) -> ExportConfig {
        ExportConfig {
            directory: dir.to_path_buf(),
            ..ExportConfig::default()
        }
    }

    fn movie(id: &str, name: &str) -> CanonicalChannelEntry {
        CanonicalChannelEntry::new(
            format!("movie:{id}"),
            name,
            "Movies",
            format!("http://x/movie/u/p/{id}.mkv"),
            "",
        )
    }

    fn desired(entries: Vec<CanonicalChannelEntry>) -> DesiredSet {
        DesiredSet {
            entries,
            ..Default::default()
        }
    }

    #[test]
    fn test_plan_skips_live_entries() {
        let dir = TempDir::new().unwrap();
        let reconciler = Reconciler::new(&config(dir.path()), StreamUriBuilder::Direct);
        let live = CanonicalChannelEntry::new("live:1", "News One HD", "News", "http://x/live/u/p/1.ts", "");
        assert_eq!(live.content_type, ContentType::Live);

        let planned = reconciler
            .plan(&desired(vec![live, movie("2", "Heat")]))
            .unwrap();
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].external_id, "movie:2");
        assert_eq!(planned[0].stream_uri, "http://x/movie/u/p/2.mkv");
    }

    #[test]
    fn test_plan_rejects_empty_set_unless_allowed() {
        let dir = TempDir::new().unwrap();
        let reconciler = Reconciler::new(&config(dir.path()), StreamUriBuilder::Direct);
        assert!(reconciler.plan(&DesiredSet::default()).unwrap_err().is_fatal());

        let allowing = Reconciler::new(
            &ExportConfig {
                allow_empty_desired_set: true,
                ..config(dir.path())
            },
            StreamUriBuilder::Direct,
        );
        assert!(allowing.plan(&DesiredSet::default()).unwrap().is_empty());
    }

    #[test]
    fn test_plan_applies_display_name_override() {
        let dir = TempDir::new().unwrap();
        let reconciler = Reconciler::new(&config(dir.path()), StreamUriBuilder::Direct);
        let mut set = desired(vec![movie("1", "Heat 1995")]);
        set.overrides.insert(
            "movie:1".to_string(),
            OverrideRecord {
                display_name: Some("Heat".to_string()),
                ..Default::default()
            },
        );
        let planned = reconciler.plan(&set).unwrap();
        assert_eq!(planned[0].pointer_path, PathBuf::from("Heat.strm"));
        assert_eq!(planned[0].metadata.display_name, "Heat");
    }

    #[tokio::test]
    async fn test_run_creates_then_is_noop() {
        let dir = TempDir::new().unwrap();
        let reconciler = Reconciler::new(&config(dir.path()), StreamUriBuilder::Direct);
        let set = desired(vec![movie("1", "Heat"), movie("2", "Ronin")]);

        let first = reconciler.run(&set).await.unwrap();
        assert_eq!(first.created, 2);
        assert_eq!(first.errors, 0);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("Heat.strm")).unwrap(),
            "http://x/movie/u/p/1.mkv"
        );

        let second = reconciler.run(&set).await.unwrap();
        assert!(second.is_noop());
        assert_eq!(second.unchanged, 2);
    }

    #[tokio::test]
    async fn test_changed_uri_replaces_pair() {
        let dir = TempDir::new().unwrap();
        let reconciler = Reconciler::new(&config(dir.path()), StreamUriBuilder::Direct);
        reconciler.run(&desired(vec![movie("1", "Heat")])).await.unwrap();

        let mut moved = movie("1", "Heat");
        moved.stream_uri = "http://y/movie/u/p/1.mkv".to_string();
        let summary = reconciler.run(&desired(vec![moved])).await.unwrap();
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.created, 0);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("Heat.strm")).unwrap(),
            "http://y/movie/u/p/1.mkv"
        );
    }
}
