//! Disk discovery for the export reconciler
//!
//! One recursive scan of the export root builds the [`DiskIndex`] every later
//! decision is made against. The scan also repairs half-finished prior runs:
//! a sidecar whose pointer is missing is deleted on the spot, and (when
//! enabled) so is a pointer with no sidecar. A file with the sidecar extension
//! that does not parse as sidecar metadata is never touched.

use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::layout::ExportLayout;
use crate::errors::{AppError, AppResult, ReconciliationError};
use crate::models::SidecarMetadata;

/// A pointer and sidecar pair found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPair {
    pub external_id: String,
    /// Relative to the export root
    pub pointer_path: PathBuf,
    pub sidecar_path: PathBuf,
    /// Pointer file content with trailing whitespace trimmed
    pub pointer_content: String,
    pub metadata: SidecarMetadata,
}

impl DiscoveredPair {
    pub fn display_name(&self) -> &str {
        &self.metadata.display_name
    }
}

/// Snapshot of tracked export state, taken once before any mutation
#[derive(Debug, Default)]
pub struct DiskIndex {
    pub tracked: BTreeMap<String, DiscoveredPair>,
    /// Extra pairs claiming an id that is already tracked
    pub duplicates: Vec<DiscoveredPair>,
    /// Half-written pairs removed during the scan
    pub repaired: usize,
    /// Directories that may have been emptied by repairs
    pub touched_directories: Vec<PathBuf>,
    pub failures: Vec<String>,
}

/// Scan `root` and build the index.
///
/// A missing root is an empty index. A root that exists but cannot be read is
/// fatal, and is detected before anything is deleted.
pub fn discover(root: &Path, layout: &ExportLayout, prune_stray_pointers: bool) -> AppResult<DiskIndex> {
    match std::fs::read_dir(root) {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Export directory {} does not exist yet", root.display());
            return Ok(DiskIndex::default());
        }
        Err(e) => {
            return Err(AppError::fatal(format!(
                "export directory {} is unreadable: {e}",
                root.display()
            )));
        }
    }

    let mut sidecars = Vec::new();
    let mut pointer_files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable path during export scan: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if layout.is_sidecar(&path) {
            sidecars.push(path);
        } else if layout.is_pointer(&path) {
            pointer_files.push(path);
        }
    }
    sidecars.sort();
    pointer_files.sort();

    // Keyed by the exact stem so pairing keeps whatever extension casing is on disk
    let mut pointers: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();
    for pointer in pointer_files {
        pointers.entry(pointer.with_extension("")).or_insert(pointer);
    }
    let sidecar_stems: BTreeSet<PathBuf> = sidecars.iter().map(|p| p.with_extension("")).collect();

    let mut index = DiskIndex::default();

    for sidecar in sidecars {
        // Only files that parse as our own metadata are ever treated as sidecars
        let metadata = match read_metadata(&sidecar) {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("Leaving {} alone: not export metadata ({e})", sidecar.display());
                continue;
            }
        };

        let Some(pointer) = pointers.get(&sidecar.with_extension("")) else {
            repair(&mut index, &sidecar, "sidecar without pointer");
            continue;
        };

        let pointer_content = match std::fs::read_to_string(pointer) {
            Ok(content) => content.trim_end().to_string(),
            Err(e) => {
                warn!(
                    "Ignoring '{}': pointer {} unreadable: {e}",
                    metadata.display_name,
                    pointer.display()
                );
                continue;
            }
        };

        let pair = DiscoveredPair {
            external_id: metadata.external_id.clone(),
            pointer_path: relative(root, pointer),
            sidecar_path: relative(root, &sidecar),
            pointer_content,
            metadata,
        };

        if index.tracked.contains_key(&pair.external_id) {
            debug!(
                "Duplicate export pair for '{}' at {}",
                pair.external_id,
                pair.sidecar_path.display()
            );
            index.duplicates.push(pair);
        } else {
            index.tracked.insert(pair.external_id.clone(), pair);
        }
    }

    if prune_stray_pointers {
        for (stem, pointer) in &pointers {
            if !sidecar_stems.contains(stem) {
                repair(&mut index, pointer, "pointer without sidecar");
            }
        }
    }

    info!(
        "Discovered {} exported entries in {} ({} duplicates, {} repaired)",
        index.tracked.len(),
        root.display(),
        index.duplicates.len(),
        index.repaired
    );
    Ok(index)
}

fn read_metadata(path: &Path) -> Result<SidecarMetadata, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&text).map_err(|e| e.to_string())
}

fn repair(index: &mut DiskIndex, path: &Path, reason: &str) {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!("Removed {} ({reason})", path.display());
            index.repaired += 1;
            if let Some(parent) = path.parent() {
                index.touched_directories.push(parent.to_path_buf());
            }
        }
        Err(e) => {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let error = ReconciliationError::new(name, path, "repair", e);
            warn!("{error}");
            index.failures.push(error.to_string());
        }
    }
}

fn relative(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}
