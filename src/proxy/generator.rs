//! Playlist synthesis
//!
//! Turns an ordered list of canonical entries (plus their overrides and any
//! enrichment) back into M3U text. Each entry's original descriptor is edited
//! rather than rebuilt, so attributes this crate does not manage survive a
//! round trip untouched.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::GeneratorConfig;
use crate::errors::AppResult;
use crate::ingestor::ExtInf;
use crate::models::{
    CanonicalChannelEntry, DesiredSet, Enrichment, OverrideMap, OverrideRecord, effective,
};
use crate::proxy::stream_url::StreamUriBuilder;
use crate::utils::UrlUtils;
use crate::variants::{group_variants, propagate_group_overrides};

/// One entry to render, with its optional override and enrichment
#[derive(Debug, Clone, Copy)]
pub struct PlaylistItem<'a> {
    pub entry: &'a CanonicalChannelEntry,
    pub override_record: Option<&'a OverrideRecord>,
    pub enrichment: Option<&'a Enrichment>,
}

impl<'a> PlaylistItem<'a> {
    pub fn new(entry: &'a CanonicalChannelEntry) -> Self {
        Self {
            entry,
            override_record: None,
            enrichment: None,
        }
    }

    pub fn with_override(mut self, record: Option<&'a OverrideRecord>) -> Self {
        self.override_record = record;
        self
    }

    pub fn with_enrichment(mut self, enrichment: Option<&'a Enrichment>) -> Self {
        self.enrichment = enrichment;
        self
    }
}

pub struct PlaylistGenerator {
    guide_url: String,
    base_url: Option<String>,
    include_catchup: bool,
    uri_builder: StreamUriBuilder,
}

impl PlaylistGenerator {
    pub fn new(config: &GeneratorConfig, uri_builder: StreamUriBuilder) -> Self {
        Self {
            guide_url: config.guide_url.clone(),
            base_url: config
                .base_url
                .as_deref()
                .map(UrlUtils::trim_base)
                .filter(|b| !b.is_empty())
                .map(str::to_string),
            include_catchup: config.include_catchup,
            uri_builder,
        }
    }

    pub fn header(&self) -> String {
        let guide = self.guide_url.replace('"', "'");
        format!("#EXTM3U url-tvg=\"{guide}\" x-tvg-url=\"{guide}\"")
    }

    /// Logo reference served through the proxy's logo endpoint
    fn proxied_logo(&self, artwork: &str) -> Option<String> {
        self.base_url.as_ref().map(|base| {
            format!(
                "{base}/api/v1/logos/proxy?url={}",
                urlencoding::encode(artwork)
            )
        })
    }

    /// Build the descriptor line for one entry
    pub fn descriptor(&self, item: &PlaylistItem<'_>) -> String {
        let entry = item.entry;
        let merged = effective(entry, item.override_record);

        let mut descriptor = if entry.raw_descriptor.trim().is_empty() {
            ExtInf::bare(&merged.display_name)
        } else {
            ExtInf::parse(&entry.raw_descriptor, 0).unwrap_or_else(|e| {
                warn!(
                    "Rebuilding descriptor for '{}': stored descriptor unusable ({e})",
                    entry.display_name
                );
                ExtInf::bare(&merged.display_name)
            })
        };

        if let Some(guide_id) = &merged.guide_id {
            descriptor.set_attribute("tvg-id", guide_id);
        }
        descriptor.set_attribute("tvg-name", &merged.display_name);
        if let Some(sort_number) = merged.sort_number {
            descriptor.set_attribute("tvg-chno", &sort_number.to_string());
        }

        let logo = item
            .enrichment
            .and_then(|e| e.artwork.as_deref())
            .filter(|a| !a.trim().is_empty())
            .and_then(|artwork| self.proxied_logo(artwork))
            .or(merged.logo_uri);
        if let Some(logo) = logo {
            descriptor.set_attribute("tvg-logo", &logo);
        }

        descriptor.set_attribute("group-title", &merged.category);

        if self.include_catchup
            && let Some(catchup) = &entry.catchup
        {
            descriptor.set_attribute("catchup", &catchup.mode);
            descriptor.set_attribute("catchup-days", &catchup.days.to_string());
        }

        descriptor.set_name(&merged.display_name);
        descriptor.render()
    }

    /// Render playlist text for items in the order given
    pub fn synthesize<'a>(&self, items: impl IntoIterator<Item = PlaylistItem<'a>>) -> String {
        let mut content = self.header();
        content.push('\n');

        let mut count = 0usize;
        for item in items {
            content.push_str(&self.descriptor(&item));
            content.push('\n');
            content.push_str(&self.uri_builder.resolve(item.entry));
            content.push('\n');
            count += 1;
        }

        debug!("Synthesized playlist with {} entries", count);
        content
    }

    /// Validate a desired set's overrides, spread them across variant groups
    /// and render the playlist in entry order
    pub fn synthesize_desired(&self, desired: &DesiredSet) -> AppResult<String> {
        let overrides = OverrideMap::validated(desired.overrides.clone(), &desired.entries)?;
        let overrides = propagate_group_overrides(&group_variants(&desired.entries), &overrides);

        Ok(self.synthesize(desired.entries.iter().map(|entry| {
            PlaylistItem::new(entry)
                .with_override(overrides.get(&entry.id))
                .with_enrichment(desired.enrichment.get(&entry.id))
        })))
    }

    /// Write playlist text next to its final path, then rename into place
    pub async fn write_atomic(path: &Path, content: &str) -> AppResult<PathBuf> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(".tmp");
        let temp_path = path.with_file_name(temp_name);

        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, path).await?;

        info!("Wrote {} ({} bytes)", path.display(), content.len());
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CatchupInfo;

    const NEWS: &str =
        r#"#EXTINF:-1 tvg-id="" tvg-name="News One HD" group-title="News",News One HD"#;

    fn generator() -> PlaylistGenerator {
        PlaylistGenerator::new(
            &GeneratorConfig {
                guide_url: "http://guide/epg.xml".to_string(),
                base_url: Some("http://proxy.local/".to_string()),
                include_catchup: true,
            },
            StreamUriBuilder::Direct,
        )
    }

    fn news() -> CanonicalChannelEntry {
        CanonicalChannelEntry::new("n1", "News One HD", "News", "http://x/1", NEWS)
    }

    #[test]
    fn test_header_embeds_guide_url() {
        assert_eq!(
            generator().header(),
            r#"#EXTM3U url-tvg="http://guide/epg.xml" x-tvg-url="http://guide/epg.xml""#
        );
    }

    #[test]
    fn test_sort_number_override_appends_chno() {
        let entry = news();
        let record = OverrideRecord {
            sort_number: Some(101),
            ..Default::default()
        };
        let line = generator().descriptor(&PlaylistItem::new(&entry).with_override(Some(&record)));
        assert_eq!(
            line,
            r#"#EXTINF:-1 tvg-id="" tvg-name="News One HD" group-title="News" tvg-chno="101",News One HD"#
        );
    }

    #[test]
    fn test_entry_without_descriptor_gets_bare_base() {
        let entry = CanonicalChannelEntry::new("m1", "Heat", "Movies", "http://x/heat.mp4", "");
        assert_eq!(
            generator().descriptor(&PlaylistItem::new(&entry)),
            r#"#EXTINF:-1 tvg-name="Heat" group-title="Movies",Heat"#
        );
    }

    #[test]
    fn test_enrichment_artwork_is_proxied() {
        let entry = news().with_logo(Some("http://upstream/logo.png".to_string()));
        let enrichment = Enrichment {
            artwork: Some("http://art/news one.png".to_string()),
        };
        let line = generator().descriptor(&PlaylistItem::new(&entry).with_enrichment(Some(&enrichment)));
        assert!(line.contains(
            r#"tvg-logo="http://proxy.local/api/v1/logos/proxy?url=http%3A%2F%2Fart%2Fnews%20one.png""#
        ));
    }

    #[test]
    fn test_artwork_without_base_url_keeps_canonical_logo() {
        let generator = PlaylistGenerator::new(&GeneratorConfig::default(), StreamUriBuilder::Direct);
        let entry = news().with_logo(Some("http://upstream/logo.png".to_string()));
        let enrichment = Enrichment {
            artwork: Some("http://art/x.png".to_string()),
        };
        let line = generator.descriptor(&PlaylistItem::new(&entry).with_enrichment(Some(&enrichment)));
        assert!(line.contains(r#"tvg-logo="http://upstream/logo.png""#));
    }

    #[test]
    fn test_catchup_attributes_follow_config() {
        let entry = news().with_catchup(Some(CatchupInfo {
            mode: "xc".to_string(),
            days: 3,
        }));
        let line = generator().descriptor(&PlaylistItem::new(&entry));
        assert!(line.contains(r#"catchup="xc" catchup-days="3""#));

        let generator = PlaylistGenerator::new(
            &GeneratorConfig {
                include_catchup: false,
                ..GeneratorConfig::default()
            },
            StreamUriBuilder::Direct,
        );
        assert!(!generator.descriptor(&PlaylistItem::new(&entry)).contains("catchup"));
    }

    #[test]
    fn test_synthesize_is_byte_identical_across_runs() {
        let entries = vec![news(), CanonicalChannelEntry::new("m1", "Heat", "Movies", "http://x/h", "")];
        let render = || generator().synthesize(entries.iter().map(PlaylistItem::new));
        let first = render();
        assert_eq!(first, render());
        assert_eq!(first.lines().count(), 5);
        assert!(first.ends_with("http://x/h\n"));
    }

    #[tokio::test]
    async fn test_write_atomic_replaces_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out").join("playlist.m3u");

        PlaylistGenerator::write_atomic(&path, "#EXTM3U\n").await.unwrap();
        PlaylistGenerator::write_atomic(&path, "#EXTM3U x\n").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "#EXTM3U x\n");
        assert!(!dir.path().join("out").join("playlist.m3u.tmp").exists());
    }
}
