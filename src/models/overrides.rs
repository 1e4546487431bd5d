//! Override and selection model
//!
//! Overrides are user edits layered over canonical entries. They never mutate
//! the canonical record; [`effective`] merges the two at synthesis or export
//! time, one field at a time.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::CanonicalChannelEntry;
use crate::errors::{AppError, AppResult};

/// Optional per-entry edits; an absent field means "use canonical"
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OverrideRecord {
    #[serde(default, alias = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, alias = "sortNumber", skip_serializing_if = "Option::is_none")]
    pub sort_number: Option<u32>,
    #[serde(default, alias = "externalGuideId", skip_serializing_if = "Option::is_none")]
    pub external_guide_id: Option<String>,
    #[serde(default, alias = "logoURI", alias = "logoUri", skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
}

impl OverrideRecord {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.category.is_none()
            && self.sort_number.is_none()
            && self.external_guide_id.is_none()
            && self.logo_uri.is_none()
    }

    /// Trim string fields and drop the ones left empty
    fn normalized(self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Self {
            display_name: clean(self.display_name),
            category: clean(self.category),
            sort_number: self.sort_number,
            external_guide_id: clean(self.external_guide_id),
            logo_uri: clean(self.logo_uri),
        }
    }
}

/// The record a sink actually writes: canonical values with overrides applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveEntry {
    pub display_name: String,
    pub category: String,
    pub sort_number: Option<u32>,
    pub guide_id: Option<String>,
    pub logo_uri: Option<String>,
}

/// Merge a canonical entry with its optional override.
///
/// Each field resolves independently: the override value when present and
/// non-blank, the canonical value otherwise.
pub fn effective(entry: &CanonicalChannelEntry, record: Option<&OverrideRecord>) -> EffectiveEntry {
    fn pick(over: Option<&String>, canonical: &str) -> String {
        match over {
            Some(value) if !value.trim().is_empty() => value.clone(),
            _ => canonical.to_string(),
        }
    }

    fn pick_opt(over: Option<&String>, canonical: Option<&String>) -> Option<String> {
        match over {
            Some(value) if !value.trim().is_empty() => Some(value.clone()),
            _ => canonical.filter(|c| !c.trim().is_empty()).cloned(),
        }
    }

    EffectiveEntry {
        display_name: pick(
            record.and_then(|r| r.display_name.as_ref()),
            &entry.display_name,
        ),
        category: pick(record.and_then(|r| r.category.as_ref()), &entry.category),
        sort_number: record.and_then(|r| r.sort_number),
        guide_id: pick_opt(
            record.and_then(|r| r.external_guide_id.as_ref()),
            entry.guide_id.as_ref(),
        ),
        logo_uri: pick_opt(
            record.and_then(|r| r.logo_uri.as_ref()),
            entry.logo_uri.as_ref(),
        ),
    }
}

/// Overrides keyed by entry id, validated against a desired entry set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideMap {
    records: BTreeMap<String, OverrideRecord>,
}

impl OverrideMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept caller-supplied overrides at the boundary.
    ///
    /// Every key must name an entry in `entries`; an unknown id is fatal so
    /// the run stops before anything is written. Blank strings are dropped
    /// and records left empty are discarded.
    pub fn validated(
        raw: impl IntoIterator<Item = (String, OverrideRecord)>,
        entries: &[CanonicalChannelEntry],
    ) -> AppResult<Self> {
        let known: HashSet<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        let mut records = BTreeMap::new();

        for (id, record) in raw {
            if !known.contains(id.as_str()) {
                return Err(AppError::unresolved(
                    id,
                    "override does not match any entry in the desired set",
                ));
            }
            if record.sort_number == Some(0) {
                return Err(AppError::validation(format!(
                    "override for '{id}' has sort number 0; sort numbers start at 1"
                )));
            }
            let record = record.normalized();
            if !record.is_empty() {
                records.insert(id, record);
            }
        }

        Ok(Self { records })
    }

    pub fn get(&self, id: &str) -> Option<&OverrideRecord> {
        self.records.get(id)
    }

    pub fn insert(&mut self, id: impl Into<String>, record: OverrideRecord) {
        self.records.insert(id.into(), record);
    }
}

/// Metadata supplied by an enrichment collaborator for one entry
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Enrichment {
    /// Alternate artwork reference, served through the logo proxy
    #[serde(default)]
    pub artwork: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> CanonicalChannelEntry {
        CanonicalChannelEntry::new("1", "News One HD", "News", "http://x/1", "")
            .with_guide_id(Some("news.one".to_string()))
    }

    #[test]
    fn test_effective_without_override_is_canonical() {
        let merged = effective(&entry(), None);
        assert_eq!(merged.display_name, "News One HD");
        assert_eq!(merged.category, "News");
        assert_eq!(merged.guide_id.as_deref(), Some("news.one"));
        assert_eq!(merged.sort_number, None);
    }

    #[test]
    fn test_effective_fields_merge_independently() {
        let record = OverrideRecord {
            category: Some("Headlines".to_string()),
            display_name: Some("   ".to_string()),
            sort_number: Some(101),
            ..Default::default()
        };
        let merged = effective(&entry(), Some(&record));
        assert_eq!(merged.display_name, "News One HD");
        assert_eq!(merged.category, "Headlines");
        assert_eq!(merged.sort_number, Some(101));
        assert_eq!(merged.guide_id.as_deref(), Some("news.one"));
    }

    #[test]
    fn test_validated_rejects_unknown_id() {
        let raw = vec![("missing".to_string(), OverrideRecord::default())];
        let err = OverrideMap::validated(raw, &[entry()]).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_validated_rejects_sort_number_zero() {
        let raw = vec![(
            "1".to_string(),
            OverrideRecord {
                sort_number: Some(0),
                ..Default::default()
            },
        )];
        assert!(matches!(
            OverrideMap::validated(raw, &[entry()]),
            Err(AppError::Validation { .. })
        ));
    }

    #[test]
    fn test_validated_drops_blank_records() {
        let raw = vec![(
            "1".to_string(),
            OverrideRecord {
                logo_uri: Some(" ".to_string()),
                ..Default::default()
            },
        )];
        let map = OverrideMap::validated(raw, &[entry()]).unwrap();
        assert_eq!(map, OverrideMap::new());
    }

    #[test]
    fn test_override_accepts_camel_case_keys() {
        let record: OverrideRecord =
            serde_json::from_str(r#"{"sortNumber": 101, "externalGuideId": "n1"}"#).unwrap();
        assert_eq!(record.sort_number, Some(101));
        assert_eq!(record.external_guide_id.as_deref(), Some("n1"));
    }
}
