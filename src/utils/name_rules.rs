//! Name canonicalization rules
//!
//! Channel and title names arrive with quality markers, episode markers and
//! provider prefixes baked in. Each heuristic here is a small ordered rule
//! table so individual patterns can be tested in isolation and the order of
//! evaluation is explicit.

use regex::Regex;
use std::sync::OnceLock;

use crate::models::{ContentType, QualityTag, SeriesInfo};

/// Strips one trailing marker from a name
pub struct QualityRule {
    pub label: &'static str,
    pub tag: Option<QualityTag>,
    pattern: Regex,
}

impl QualityRule {
    fn new(label: &'static str, tag: Option<QualityTag>, pattern: &str) -> Self {
        Self {
            label,
            tag,
            pattern: Regex::new(pattern).expect("static quality pattern"),
        }
    }

    /// The name with this rule's trailing marker removed, if it matched
    pub fn strip<'a>(&self, name: &'a str) -> Option<&'a str> {
        self.pattern
            .find(name)
            .map(|m| name[..m.start()].trim_end())
    }
}

/// Ordered trailing-marker rules; the first matching rule wins each pass
pub fn quality_rules() -> &'static [QualityRule] {
    static RULES: OnceLock<Vec<QualityRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        let marker = |tokens: &str| format!(r"(?i)[\s\-_|]*[\(\[]?\b(?:{tokens})\b[\)\]]?\s*$");
        vec![
            QualityRule::new("uhd", Some(QualityTag::Uhd), &marker("4K|UHD|2160p")),
            QualityRule::new("fhd", Some(QualityTag::Fhd), &marker("FHD|1080p")),
            QualityRule::new("hd", Some(QualityTag::Hd), &marker("HD|720p")),
            QualityRule::new("sd", Some(QualityTag::Sd), &marker("SD|480p")),
            QualityRule::new("asterisk", None, r"\s*\*+\s*$"),
        ]
    })
}

fn whitespace() -> &'static Regex {
    static WS: OnceLock<Regex> = OnceLock::new();
    WS.get_or_init(|| Regex::new(r"\s+").expect("static whitespace pattern"))
}

/// Trim and collapse every whitespace run to a single space
pub fn collapse_whitespace(name: &str) -> String {
    whitespace().replace_all(name.trim(), " ").into_owned()
}

/// Repeatedly strip trailing markers, returning the cleaned name and the
/// outermost quality tag found. A name made only of markers is kept as is.
fn strip_markers(name: &str) -> (String, Option<QualityTag>) {
    let original = collapse_whitespace(name);
    let mut current = original.clone();
    let mut tag = None;

    'passes: loop {
        for rule in quality_rules() {
            if let Some(stripped) = rule.strip(&current) {
                if tag.is_none() {
                    tag = rule.tag;
                }
                current = stripped.to_string();
                continue 'passes;
            }
        }
        break;
    }

    if current.is_empty() {
        (original, None)
    } else {
        (current, tag)
    }
}

/// Clean a display name: drop trailing quality markers and stray asterisks,
/// collapse whitespace.
pub fn clean_name(name: &str) -> String {
    strip_markers(name).0
}

/// Quality tier from the outermost trailing marker, if any
pub fn quality_tag(name: &str) -> Option<QualityTag> {
    strip_markers(name).1
}

/// Identity shared by every quality variant of one logical channel:
/// the cleaned name, lowercased, with all whitespace removed.
pub fn normalized_identity(name: &str) -> String {
    clean_name(name)
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Detects a season/episode marker and the series name before it
pub struct SeriesRule {
    pub label: &'static str,
    pattern: Regex,
}

impl SeriesRule {
    fn new(label: &'static str, pattern: &str) -> Self {
        Self {
            label,
            pattern: Regex::new(pattern).expect("static series pattern"),
        }
    }

    pub fn detect(&self, name: &str) -> Option<SeriesInfo> {
        let caps = self.pattern.captures(name)?;
        let raw = caps.name("series")?.as_str().trim_end_matches(|c: char| {
            c.is_whitespace() || matches!(c, '.' | '_' | '-' | '|' | ':')
        });
        // Release-style names use dots or underscores in place of spaces
        let series_name = if raw.contains(char::is_whitespace) {
            clean_name(raw)
        } else {
            clean_name(&raw.replace(['.', '_'], " "))
        };
        if series_name.is_empty() {
            return None;
        }
        Some(SeriesInfo {
            series_name,
            season: caps.name("season")?.as_str().parse().ok()?,
            episode: caps.name("episode")?.as_str().parse().ok()?,
        })
    }
}

/// Ordered season/episode rules
pub fn series_rules() -> &'static [SeriesRule] {
    static RULES: OnceLock<Vec<SeriesRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            SeriesRule::new(
                "sxxexx",
                r"(?i)^(?P<series>.*?)\bS(?P<season>\d{1,3})[\s._\-]*E(?P<episode>\d{1,4})",
            ),
            SeriesRule::new(
                "nxnn",
                r"(?i)^(?P<series>.*?)\b(?P<season>\d{1,2})x(?P<episode>\d{1,3})\b",
            ),
        ]
    })
}

pub fn detect_series(name: &str) -> Option<SeriesInfo> {
    series_rules().iter().find_map(|rule| rule.detect(name))
}

/// Category inference for entries without an explicit group attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryRule {
    /// `UK: BBC One` -> `UK`, prefix no longer than the configured limit
    ColonPrefix,
    /// `UK BBC One` -> `UK`
    UppercaseToken,
}

/// Evaluation order for category inference
pub const CATEGORY_RULES: [CategoryRule; 2] =
    [CategoryRule::ColonPrefix, CategoryRule::UppercaseToken];

fn colon_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([^:]+?)\s*:\s*\S").expect("static colon pattern"))
}

fn uppercase_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([A-Z][A-Z0-9]+)\s+\S").expect("static uppercase pattern")
    })
}

impl CategoryRule {
    pub fn infer(&self, name: &str, max_prefix_len: usize) -> Option<String> {
        let re = match self {
            CategoryRule::ColonPrefix => colon_prefix(),
            CategoryRule::UppercaseToken => uppercase_token(),
        };
        let prefix = re.captures(name)?.get(1)?.as_str();
        if prefix.chars().count() > max_prefix_len {
            return None;
        }
        Some(prefix.to_string())
    }
}

/// Infer a category from the display name, falling back to `default`
pub fn infer_category(name: &str, max_prefix_len: usize, default: &str) -> String {
    CATEGORY_RULES
        .iter()
        .find_map(|rule| rule.infer(name, max_prefix_len))
        .unwrap_or_else(|| default.to_string())
}

/// Classify an entry from its URI path, then its name, then its category
pub fn detect_content_type(
    stream_uri: &str,
    display_name: &str,
    category: &str,
) -> (ContentType, Option<SeriesInfo>) {
    let series = detect_series(display_name);
    let path = url::Url::parse(stream_uri)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_default();

    if path.contains("/series/") {
        return (ContentType::SeriesEpisode, series);
    }
    if path.contains("/movie/") {
        return (ContentType::Movie, None);
    }
    if series.is_some() {
        return (ContentType::SeriesEpisode, series);
    }

    let category = category.to_ascii_uppercase();
    if category.contains("VOD") || category.contains("MOVIE") {
        return (ContentType::Movie, None);
    }
    (ContentType::Live, None)
}
