//! Two-phase playlist text parser
//!
//! A [`PlaylistSession`] owns the raw playlist text for its lifetime. Phase 1
//! ([`PlaylistSession::scan_groups`]) walks the text and returns only
//! `(group, count)` pairs. Phase 2 ([`PlaylistSession::entries_for_group`])
//! re-walks the same cached text and materializes entries for a single group,
//! so a caller browsing a large playlist never holds every entry at once.
//!
//! Lifecycle: open -> scan_groups -> entries_for_group (any number of times)
//! -> close. Using a closed session is an [`AppError::Session`].

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::{debug, info, warn};

use super::extinf::{EXTINF_PREFIX, ExtInf};
use crate::config::IngestionConfig;
use crate::errors::{AppError, AppResult, ParseError};
use crate::models::{CanonicalChannelEntry, CatchupInfo, GroupSummary};
use crate::utils::name_rules::infer_category;
use crate::utils::{StandardHttpClient, UrlUtils, playlist_entry_id};

/// Category inference settings used while parsing
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub default_category: String,
    pub category_prefix_max_len: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::from(&IngestionConfig::default())
    }
}

impl From<&IngestionConfig> for ParseOptions {
    fn from(config: &IngestionConfig) -> Self {
        Self {
            default_category: config.default_category.clone(),
            category_prefix_max_len: config.category_prefix_max_len,
        }
    }
}

/// A descriptor paired with its URI line, before any entry is built
struct RawRecord<'a> {
    descriptor: Option<ExtInf>,
    uri: &'a str,
    raw_line: &'a str,
}

impl RawRecord<'_> {
    fn display_name(&self) -> String {
        match &self.descriptor {
            Some(descriptor) if !descriptor.name().is_empty() => descriptor.name().to_string(),
            Some(descriptor) => descriptor
                .non_empty_attribute("tvg-name")
                .unwrap_or_else(|| name_from_uri(self.uri)),
            None => name_from_uri(self.uri),
        }
    }

    fn group(&self, options: &ParseOptions) -> String {
        self.descriptor
            .as_ref()
            .and_then(|d| d.non_empty_attribute("group-title"))
            .unwrap_or_else(|| {
                infer_category(
                    &self.display_name(),
                    options.category_prefix_max_len,
                    &options.default_category,
                )
            })
    }

    fn into_entry(self, group: String) -> CanonicalChannelEntry {
        let name = self.display_name();
        let id = playlist_entry_id(self.uri, &name);
        let descriptor = self.descriptor;

        let attr = |key: &str| descriptor.as_ref().and_then(|d| d.non_empty_attribute(key));
        let catchup = attr("catchup").map(|mode| CatchupInfo {
            mode,
            days: attr("catchup-days")
                .and_then(|d| d.parse().ok())
                .unwrap_or_default(),
        });

        CanonicalChannelEntry::new(id, name, group, self.uri, self.raw_line)
            .with_guide_id(attr("tvg-id"))
            .with_logo(attr("tvg-logo"))
            .with_catchup(catchup)
    }
}

/// Last path segment of a URI, without query string, as a fallback name
fn name_from_uri(uri: &str) -> String {
    let without_query = uri.split(['?', '#']).next().unwrap_or(uri);
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or("Unnamed Channel")
        .to_string()
}

/// Walk playlist text, pairing each descriptor with the URI line that follows it.
///
/// Malformed descriptors and descriptors with no URI are skipped and reported
/// through `on_skip`. Duplicate `(uri, name)` pairs are emitted once.
fn records<'a>(
    text: &'a str,
    mut on_skip: impl FnMut(ParseError),
) -> impl Iterator<Item = RawRecord<'a>> {
    let mut pending: Option<(usize, ExtInf, &'a str)> = None;
    // URI line belonging to a descriptor that failed to parse
    let mut discard_uri = false;
    let mut seen: HashSet<(&'a str, String)> = HashSet::new();

    text.lines().enumerate().filter_map(move |(index, line)| {
        let line_number = index + 1;
        let line = line.trim();

        if line.starts_with(EXTINF_PREFIX) {
            if let Some((previous, _, _)) = pending.take() {
                on_skip(ParseError::MissingUri { line: previous });
            }
            match ExtInf::parse(line, line_number) {
                Ok(descriptor) => {
                    pending = Some((line_number, descriptor, line));
                    discard_uri = false;
                }
                Err(e) => {
                    on_skip(e);
                    discard_uri = true;
                }
            }
            return None;
        }
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        if std::mem::take(&mut discard_uri) {
            return None;
        }

        let record = match pending.take() {
            Some((_, descriptor, raw_line)) => RawRecord {
                descriptor: Some(descriptor),
                uri: line,
                raw_line,
            },
            None => RawRecord {
                descriptor: None,
                uri: line,
                raw_line: "",
            },
        };

        if !seen.insert((record.uri, record.display_name())) {
            debug!(
                "Skipping duplicate entry '{}' at line {line_number}",
                record.display_name()
            );
            return None;
        }
        Some(record)
    })
}

/// Caller-owned parse state for one playlist body
#[derive(Debug)]
pub struct PlaylistSession {
    label: String,
    options: ParseOptions,
    text: Option<String>,
    groups: Option<Vec<GroupSummary>>,
    skipped_lines: usize,
}

impl PlaylistSession {
    /// Open a session over playlist text already in memory
    pub fn open(text: impl Into<String>, label: impl Into<String>, options: ParseOptions) -> Self {
        let text = text.into();
        let label = label.into();
        debug!("Opened playlist session '{}' ({} bytes)", label, text.len());

        Self {
            label,
            options,
            text: Some(text),
            groups: None,
            skipped_lines: 0,
        }
    }

    pub async fn open_path(path: impl AsRef<Path>, options: ParseOptions) -> AppResult<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        Ok(Self::open(text, path.display().to_string(), options))
    }

    pub async fn open_url(
        client: &StandardHttpClient,
        url: &str,
        options: ParseOptions,
    ) -> AppResult<Self> {
        let text = client.fetch_text(url).await?;
        Ok(Self::open(text, UrlUtils::obfuscate_credentials(url), options))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_open(&self) -> bool {
        self.text.is_some()
    }

    /// Descriptor lines skipped during the last group scan
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    fn text(&self) -> AppResult<&str> {
        self.text.as_deref().ok_or_else(|| {
            AppError::session(format!("playlist session '{}' is closed", self.label))
        })
    }

    /// Phase 1: list groups in first-seen order with their entry counts
    pub fn scan_groups(&mut self) -> AppResult<Vec<GroupSummary>> {
        let text = self.text()?;
        let mut skipped = 0usize;
        let mut order: Vec<GroupSummary> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for record in records(text, |e| {
            debug!("Skipping playlist line: {e}");
            skipped += 1;
        }) {
            let group = record.group(&self.options);
            match index.get(&group) {
                Some(&position) => order[position].count += 1,
                None => {
                    index.insert(group.clone(), order.len());
                    order.push(GroupSummary {
                        name: group,
                        count: 1,
                    });
                }
            }
        }

        if skipped > 0 {
            warn!(
                "Skipped {} malformed line(s) while scanning playlist '{}'",
                skipped, self.label
            );
        }
        info!(
            "Scanned {} group(s) from playlist '{}'",
            order.len(),
            self.label
        );

        self.skipped_lines = skipped;
        self.groups = Some(order.clone());
        Ok(order)
    }

    /// Phase 2: materialize the entries of one previously scanned group
    pub fn entries_for_group(&self, group: &str) -> AppResult<Vec<CanonicalChannelEntry>> {
        let text = self.text()?;
        let groups = self.groups.as_ref().ok_or_else(|| {
            AppError::session(format!(
                "playlist session '{}' has not been scanned; call scan_groups first",
                self.label
            ))
        })?;

        if !groups.iter().any(|g| g.name == group) {
            debug!("Group '{}' not present in playlist '{}'", group, self.label);
            return Ok(Vec::new());
        }

        let entries: Vec<_> = records(text, |_| {})
            .filter_map(|record| {
                let record_group = record.group(&self.options);
                (record_group == group).then(|| record.into_entry(record_group))
            })
            .collect();

        debug!(
            "Materialized {} entries for group '{}' from playlist '{}'",
            entries.len(),
            group,
            self.label
        );
        Ok(entries)
    }

    /// Materialize every entry in file order
    pub fn all_entries(&self) -> AppResult<Vec<CanonicalChannelEntry>> {
        let text = self.text()?;
        Ok(records(text, |e| debug!("Skipping playlist line: {e}"))
            .map(|record| {
                let group = record.group(&self.options);
                record.into_entry(group)
            })
            .collect())
    }

    /// Release the cached text; further calls fail with a session error
    pub fn close(&mut self) {
        if self.text.take().is_some() {
            debug!("Closed playlist session '{}'", self.label);
        }
        self.groups = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;

    const PLAYLIST: &str = r#"#EXTM3U url-tvg="http://guide"
#EXTINF:-1 tvg-id="news.one" tvg-name="News One HD" tvg-logo="http://logo/1.png" group-title="News",News One HD
http://x/1
#EXTINF:-1 tvg-id="" group-title="News",News One SD
http://x/2
#EXTINF:-1 tvg-id="bad" News Without Comma
#EXTINF:-1,UK: BBC One
http://x/3
#EXTINF:-1 group-title="Sport" catchup="xc" catchup-days="7",Sport Extra
http://x/4
#EXTINF:-1,Orphan descriptor
#EXTINF:-1 group-title="News",News One HD
http://x/1
http://x/streams/raw-feed.ts?token=abc
"#;

    fn session() -> PlaylistSession {
        PlaylistSession::open(PLAYLIST, "test", ParseOptions::default())
    }

    #[test]
    fn test_scan_groups_counts_in_first_seen_order() {
        let mut session = session();
        let groups = session.scan_groups().unwrap();
        assert_eq!(
            groups,
            vec![
                GroupSummary { name: "News".into(), count: 2 },
                GroupSummary { name: "UK".into(), count: 1 },
                GroupSummary { name: "Sport".into(), count: 1 },
                GroupSummary { name: "Uncategorized".into(), count: 1 },
            ]
        );
        // malformed descriptor + orphan descriptor
        assert_eq!(session.skipped_lines(), 2);
    }

    #[test]
    fn test_entries_for_group_materializes_only_that_group() {
        let mut session = session();
        session.scan_groups().unwrap();
        let news = session.entries_for_group("News").unwrap();
        assert_eq!(news.len(), 2);
        assert_eq!(news[0].display_name, "News One HD");
        assert_eq!(news[0].guide_id.as_deref(), Some("news.one"));
        assert_eq!(news[0].logo_uri.as_deref(), Some("http://logo/1.png"));
        assert_eq!(news[1].guide_id, None);
        assert_eq!(news[0].normalized_identity, news[1].normalized_identity);
        assert!(news[0].raw_descriptor.starts_with("#EXTINF:-1 tvg-id=\"news.one\""));
    }

    #[test]
    fn test_catchup_attributes_are_read() {
        let mut session = session();
        session.scan_groups().unwrap();
        let sport = session.entries_for_group("Sport").unwrap();
        let catchup = sport[0].catchup.as_ref().unwrap();
        assert_eq!(catchup.mode, "xc");
        assert_eq!(catchup.days, 7);
        assert_eq!(sport[0].content_type, ContentType::Live);
    }

    #[test]
    fn test_bare_uri_named_from_path() {
        let entries = session().all_entries().unwrap();
        let bare = entries.last().unwrap();
        assert_eq!(bare.display_name, "raw-feed.ts");
        assert_eq!(bare.category, "Uncategorized");
        assert!(bare.raw_descriptor.is_empty());
    }

    #[test]
    fn test_ids_are_stable_across_sessions() {
        let a = session().all_entries().unwrap();
        let b = session().all_entries().unwrap();
        let ids_a: Vec<_> = a.iter().map(|e| e.id.clone()).collect();
        let ids_b: Vec<_> = b.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_phase_two_requires_scan() {
        let session = session();
        assert!(matches!(
            session.entries_for_group("News"),
            Err(AppError::Session { .. })
        ));
    }

    #[test]
    fn test_unknown_group_is_empty() {
        let mut session = session();
        session.scan_groups().unwrap();
        assert!(session.entries_for_group("Nope").unwrap().is_empty());
    }

    #[test]
    fn test_closed_session_rejects_use() {
        let mut session = session();
        session.scan_groups().unwrap();
        session.close();
        assert!(!session.is_open());
        assert!(matches!(session.scan_groups(), Err(AppError::Session { .. })));
        assert!(matches!(session.all_entries(), Err(AppError::Session { .. })));
    }

    #[test]
    fn test_name_from_uri() {
        assert_eq!(name_from_uri("http://h/a/b/chan.m3u8?x=1"), "chan.m3u8");
        assert_eq!(name_from_uri("http://h/a/b/"), "b");
    }
}
