use std::fs;
use std::path::Path;

use m3u_curator::{
    config::ExportConfig,
    export::Reconciler,
    models::{CanonicalChannelEntry, DesiredSet, OverrideRecord, SidecarMetadata},
    proxy::StreamUriBuilder,
};
use tempfile::TempDir;

fn reconciler(root: &Path) -> Reconciler {
    Reconciler::new(
        &ExportConfig {
            directory: root.to_path_buf(),
            ..ExportConfig::default()
        },
        StreamUriBuilder::Direct,
    )
}

fn movie(id: u32, name: &str) -> CanonicalChannelEntry {
    CanonicalChannelEntry::new(
        format!("movie:{id}"),
        name,
        "Movies",
        format!("http://up/movie/u/p/{id}.mkv"),
        "",
    )
}

fn episode(id: u32, name: &str) -> CanonicalChannelEntry {
    CanonicalChannelEntry::new(
        format!("episode:{id}"),
        name,
        "Drama",
        format!("http://up/series/u/p/{id}.mp4"),
        "",
    )
}

fn desired(entries: Vec<CanonicalChannelEntry>) -> DesiredSet {
    DesiredSet {
        entries,
        ..Default::default()
    }
}

/// Every file under `root`, relative and sorted
fn files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

#[tokio::test]
async fn test_episode_lands_in_season_folder() {
    let dir = TempDir::new().unwrap();
    let summary = reconciler(dir.path())
        .run(&desired(vec![episode(1, "Breaking Bad S01E01"), movie(2, "Heat")]))
        .await
        .unwrap();

    assert_eq!(summary.created, 2);
    assert_eq!(
        files(dir.path()),
        vec![
            "Breaking Bad/Season 01/Breaking Bad S01E01.json",
            "Breaking Bad/Season 01/Breaking Bad S01E01.strm",
            "Heat.json",
            "Heat.strm",
        ]
    );

    let sidecar: SidecarMetadata = serde_json::from_str(
        &fs::read_to_string(dir.path().join("Breaking Bad/Season 01/Breaking Bad S01E01.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(sidecar.external_id, "episode:1");
    assert_eq!(sidecar.series.as_deref(), Some("Breaking Bad"));
    assert_eq!(sidecar.season, Some(1));
    assert_eq!(sidecar.episode, Some(1));
    assert_eq!(sidecar.stream_uri, "http://up/series/u/p/1.mp4");
}

#[tokio::test]
async fn test_second_run_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let reconciler = reconciler(dir.path());
    let set = desired(vec![episode(1, "Breaking Bad S01E01"), movie(2, "Heat")]);

    reconciler.run(&set).await.unwrap();
    let sidecar = dir.path().join("Heat.json");
    let before = fs::read_to_string(&sidecar).unwrap();

    let second = reconciler.run(&set).await.unwrap();
    assert!(second.is_noop());
    assert_eq!(second.unchanged, 2);
    assert_eq!(fs::read_to_string(&sidecar).unwrap(), before);
}

#[tokio::test]
async fn test_rename_is_one_delete_and_one_create() {
    let dir = TempDir::new().unwrap();
    let reconciler = reconciler(dir.path());
    let entries = vec![movie(1, "Heat 1995")];
    reconciler.run(&desired(entries.clone())).await.unwrap();

    let mut renamed = desired(entries);
    renamed.overrides.insert(
        "movie:1".to_string(),
        OverrideRecord {
            display_name: Some("Heat".to_string()),
            ..Default::default()
        },
    );
    let summary = reconciler.run(&renamed).await.unwrap();

    assert_eq!(summary.updated, 1);
    assert_eq!(summary.created, 0);
    assert_eq!(summary.deleted, 0);
    assert_eq!(files(dir.path()), vec!["Heat.json", "Heat.strm"]);
}

#[tokio::test]
async fn test_removed_entry_is_deleted_and_empty_folders_pruned() {
    let dir = TempDir::new().unwrap();
    let reconciler = reconciler(dir.path());
    reconciler
        .run(&desired(vec![episode(1, "Breaking Bad S01E01"), movie(2, "Heat")]))
        .await
        .unwrap();

    let summary = reconciler.run(&desired(vec![movie(2, "Heat")])).await.unwrap();
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.unchanged, 1);
    assert_eq!(files(dir.path()), vec!["Heat.json", "Heat.strm"]);
    assert!(!dir.path().join("Breaking Bad").exists());
}

#[tokio::test]
async fn test_half_written_pair_is_repaired_and_rewritten() {
    let dir = TempDir::new().unwrap();
    let reconciler = reconciler(dir.path());
    let set = desired(vec![movie(1, "Heat")]);
    reconciler.run(&set).await.unwrap();

    fs::remove_file(dir.path().join("Heat.strm")).unwrap();
    let summary = reconciler.run(&set).await.unwrap();

    assert_eq!(summary.repaired, 1);
    assert_eq!(summary.created, 1);
    assert_eq!(files(dir.path()), vec!["Heat.json", "Heat.strm"]);
}

#[tokio::test]
async fn test_foreign_files_and_uppercase_pointers_survive() {
    let dir = TempDir::new().unwrap();
    let reconciler = reconciler(dir.path());
    reconciler.run(&desired(vec![movie(1, "Heat")])).await.unwrap();
    fs::rename(dir.path().join("Heat.strm"), dir.path().join("Heat.STRM")).unwrap();
    fs::write(dir.path().join("library-settings.json"), r#"{"theme": "dark"}"#).unwrap();

    let summary = reconciler
        .run(&desired(vec![movie(1, "Heat"), movie(2, "Ronin")]))
        .await
        .unwrap();

    assert_eq!(summary.repaired, 0);
    assert_eq!(summary.deleted, 0);
    assert_eq!(summary.created, 1);
    // Found as the existing pair and moved to the canonical extension
    assert_eq!(summary.updated, 1);
    assert_eq!(
        files(dir.path()),
        vec!["Heat.json", "Heat.strm", "Ronin.json", "Ronin.strm", "library-settings.json"]
    );
}

#[tokio::test]
async fn test_unknown_override_leaves_disk_untouched() {
    let dir = TempDir::new().unwrap();
    let reconciler = reconciler(dir.path());
    reconciler.run(&desired(vec![movie(1, "Heat")])).await.unwrap();
    // A half pair that a real run would repair
    fs::copy(dir.path().join("Heat.json"), dir.path().join("Ronin.json")).unwrap();

    let mut set = desired(vec![movie(2, "Ronin")]);
    set.overrides
        .insert("movie:404".to_string(), OverrideRecord::default());
    let err = reconciler.run(&set).await.unwrap_err();

    assert!(err.is_fatal());
    assert!(err.to_string().contains("movie:404"));
    assert_eq!(files(dir.path()), vec!["Heat.json", "Heat.strm", "Ronin.json"]);
}

#[tokio::test]
async fn test_empty_desired_set_is_fatal() {
    let dir = TempDir::new().unwrap();
    let reconciler = reconciler(dir.path());
    reconciler.run(&desired(vec![movie(1, "Heat")])).await.unwrap();

    assert!(reconciler.run(&DesiredSet::default()).await.unwrap_err().is_fatal());
    assert_eq!(files(dir.path()), vec!["Heat.json", "Heat.strm"]);
}

#[tokio::test]
async fn test_write_failure_is_counted_and_run_continues() {
    let dir = TempDir::new().unwrap();
    let reconciler = reconciler(dir.path());
    // A regular file where the series folder should go
    fs::write(dir.path().join("Breaking Bad"), "").unwrap();

    let summary = reconciler
        .run(&desired(vec![episode(1, "Breaking Bad S01E01"), movie(2, "Heat")]))
        .await
        .unwrap();

    assert_eq!(summary.errors, 1);
    assert_eq!(summary.created, 1);
    assert!(summary.failures[0].contains("Breaking Bad S01E01"));
}
