//! `#EXTINF` descriptor lines
//!
//! A descriptor is `#EXTINF:<duration> key="value" ...,<display name>`. The
//! same type is used to read attributes during ingestion and to rewrite them
//! during playlist synthesis, so both sides agree on the grammar.

use regex::Regex;
use std::sync::OnceLock;

use crate::errors::ParseError;

pub const EXTINF_PREFIX: &str = "#EXTINF:";

fn attribute_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?:^|\s)(?P<key>[A-Za-z0-9_-]+)=(?:"(?P<quoted>[^"]*)"|(?P<bare>[^\s"]*))"#)
            .expect("static attribute pattern")
    })
}

/// One parsed descriptor line, split into its attribute header and display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtInf {
    header: String,
    name: String,
}

/// Byte range of one attribute token inside the header
struct AttributeSpan {
    key: String,
    start: usize,
    end: usize,
}

impl ExtInf {
    /// Parse a descriptor line. `line_number` is only used for error reporting.
    pub fn parse(line: &str, line_number: usize) -> Result<Self, ParseError> {
        let line = line.trim();
        if !line.starts_with(EXTINF_PREFIX) {
            return Err(ParseError::MalformedDescriptor {
                line: line_number,
                message: format!("expected '{EXTINF_PREFIX}' prefix"),
            });
        }

        let comma = find_separator(line).ok_or_else(|| ParseError::MalformedDescriptor {
            line: line_number,
            message: "no comma separating attributes from the display name".to_string(),
        })?;

        Ok(Self {
            header: line[..comma].trim_end().to_string(),
            name: line[comma + 1..].trim().to_string(),
        })
    }

    /// Minimal descriptor for entries that never had one
    pub fn bare(name: &str) -> Self {
        Self {
            header: format!("{EXTINF_PREFIX}-1"),
            name: name.trim().to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up an attribute value; keys compare case-insensitively
    pub fn attribute(&self, key: &str) -> Option<&str> {
        attribute_pattern()
            .captures_iter(&self.header)
            .find(|caps| caps["key"].eq_ignore_ascii_case(key))
            .and_then(|caps| caps.name("quoted").or_else(|| caps.name("bare")))
            .map(|value| &self.header[value.range()])
    }

    /// Non-blank attribute value, trimmed
    pub fn non_empty_attribute(&self, key: &str) -> Option<String> {
        self.attribute(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// Replace the attribute in place if present, otherwise append it to the
    /// end of the header. Double quotes in `value` become single quotes.
    pub fn set_attribute(&mut self, key: &str, value: &str) {
        let token = format!("{key}=\"{}\"", value.replace('"', "'"));

        match self
            .spans()
            .into_iter()
            .find(|span| span.key.eq_ignore_ascii_case(key))
        {
            Some(span) => self.header.replace_range(span.start..span.end, &token),
            None => {
                self.header.push(' ');
                self.header.push_str(&token);
            }
        }
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.trim().to_string();
    }

    pub fn render(&self) -> String {
        format!("{},{}", self.header, self.name)
    }

    fn spans(&self) -> Vec<AttributeSpan> {
        attribute_pattern()
            .captures_iter(&self.header)
            .filter_map(|caps| {
                let key = caps.name("key")?;
                let whole = caps.get(0)?;
                Some(AttributeSpan {
                    key: key.as_str().to_string(),
                    start: key.start(),
                    end: whole.end(),
                })
            })
            .collect()
    }
}

/// Index of the first comma outside a double-quoted value
fn find_separator(line: &str) -> Option<usize> {
    let mut in_quotes = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => return Some(index),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const LINE: &str = r#"#EXTINF:-1 tvg-id="" tvg-name="News One HD" group-title="News",News One HD"#;

    #[test]
    fn test_parse_splits_header_and_name() {
        let descriptor = ExtInf::parse(LINE, 1).unwrap();
        assert_eq!(descriptor.name(), "News One HD");
        assert_eq!(descriptor.attribute("group-title"), Some("News"));
        assert_eq!(descriptor.attribute("TVG-NAME"), Some("News One HD"));
        assert_eq!(descriptor.attribute("tvg-id"), Some(""));
        assert_eq!(descriptor.non_empty_attribute("tvg-id"), None);
        assert_eq!(descriptor.attribute("tvg-logo"), None);
    }

    #[test]
    fn test_comma_inside_quotes_is_not_the_separator() {
        let descriptor =
            ExtInf::parse(r#"#EXTINF:-1 group-title="News, Weather",Local, Evening"#, 3).unwrap();
        assert_eq!(descriptor.attribute("group-title"), Some("News, Weather"));
        assert_eq!(descriptor.name(), "Local, Evening");
    }

    #[test]
    fn test_missing_comma_is_malformed() {
        let err = ExtInf::parse(r#"#EXTINF:-1 tvg-id="a" News"#, 7).unwrap_err();
        assert!(matches!(err, ParseError::MalformedDescriptor { line: 7, .. }));
    }

    #[test]
    fn test_unquoted_attribute_values() {
        let descriptor = ExtInf::parse("#EXTINF:-1 tvg-chno=5 catchup-days=3,Five", 1).unwrap();
        assert_eq!(descriptor.attribute("tvg-chno"), Some("5"));
        assert_eq!(descriptor.attribute("catchup-days"), Some("3"));
    }

    #[test]
    fn test_set_attribute_replaces_in_place() {
        let mut descriptor = ExtInf::parse(LINE, 1).unwrap();
        descriptor.set_attribute("tvg-id", "news.one");
        assert_eq!(
            descriptor.render(),
            r#"#EXTINF:-1 tvg-id="news.one" tvg-name="News One HD" group-title="News",News One HD"#
        );
    }

    #[test]
    fn test_set_attribute_appends_before_name() {
        let mut descriptor = ExtInf::parse(LINE, 1).unwrap();
        descriptor.set_attribute("tvg-chno", "101");
        assert_eq!(
            descriptor.render(),
            r#"#EXTINF:-1 tvg-id="" tvg-name="News One HD" group-title="News" tvg-chno="101",News One HD"#
        );
    }

    #[test]
    fn test_set_attribute_replaces_unquoted_value() {
        let mut descriptor = ExtInf::parse("#EXTINF:-1 tvg-chno=5,Five", 1).unwrap();
        descriptor.set_attribute("tvg-chno", "6");
        assert_eq!(descriptor.render(), r#"#EXTINF:-1 tvg-chno="6",Five"#);
    }

    #[test]
    fn test_set_attribute_sanitizes_quotes() {
        let mut descriptor = ExtInf::bare("Movie");
        descriptor.set_attribute("tvg-name", r#"The "Best" Movie"#);
        assert_eq!(descriptor.attribute("tvg-name"), Some("The 'Best' Movie"));
    }

    proptest! {
        #[test]
        fn prop_set_attribute_is_idempotent(value in "[A-Za-z0-9 ,.\"=-]{0,24}") {
            let mut once = ExtInf::parse(LINE, 1).unwrap();
            once.set_attribute("tvg-name", &value);
            once.set_attribute("tvg-chno", "7");
            let first = once.render();

            let mut twice = ExtInf::parse(&first, 1).unwrap();
            twice.set_attribute("tvg-name", &value);
            twice.set_attribute("tvg-chno", "7");
            prop_assert_eq!(twice.render(), first);
        }
    }
}
