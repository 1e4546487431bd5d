//! Variant grouping
//!
//! Entries whose names clean to the same identity ("News One HD",
//! "News One SD") are the same logical channel in different quality tiers.
//! Grouping them lets a single override edit every tier at once.

use std::collections::HashMap;

use tracing::debug;

use crate::models::{CanonicalChannelEntry, OverrideMap};

/// Same-identity entries across quality tiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantGroup {
    pub identity: String,
    pub representative_id: String,
    /// Member ids in input order, representative included
    pub member_ids: Vec<String>,
}

impl VariantGroup {
    pub fn len(&self) -> usize {
        self.member_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_ids.is_empty()
    }
}

/// Collapse entries into groups keyed by normalized identity.
///
/// Groups come out in first-seen order. The representative is the member with
/// the highest quality rank; ties (and untagged entries) go to the earliest.
pub fn group_variants(entries: &[CanonicalChannelEntry]) -> Vec<VariantGroup> {
    let mut groups: Vec<VariantGroup> = Vec::new();
    let mut best_rank: Vec<u8> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for entry in entries {
        let rank = entry.quality_tag.map(|t| t.rank()).unwrap_or(0);
        match index.get(entry.normalized_identity.as_str()) {
            Some(&position) => {
                let group = &mut groups[position];
                group.member_ids.push(entry.id.clone());
                if rank > best_rank[position] {
                    best_rank[position] = rank;
                    group.representative_id = entry.id.clone();
                }
            }
            None => {
                index.insert(entry.normalized_identity.as_str(), groups.len());
                best_rank.push(rank);
                groups.push(VariantGroup {
                    identity: entry.normalized_identity.clone(),
                    representative_id: entry.id.clone(),
                    member_ids: vec![entry.id.clone()],
                });
            }
        }
    }

    debug!(
        "Grouped {} entries into {} variant group(s)",
        entries.len(),
        groups.len()
    );
    groups
}

/// Apply each group's override to every member.
///
/// The group override is the representative's when it has one, otherwise the
/// first member (in input order) that has one. It replaces the members'
/// own records whole; fields are not blended across tiers.
pub fn propagate_group_overrides(groups: &[VariantGroup], overrides: &OverrideMap) -> OverrideMap {
    let mut propagated = overrides.clone();

    for group in groups.iter().filter(|g| g.len() > 1) {
        let source = overrides.get(&group.representative_id).or_else(|| {
            group
                .member_ids
                .iter()
                .find_map(|id| overrides.get(id))
        });

        if let Some(record) = source {
            for member in &group.member_ids {
                propagated.insert(member.clone(), record.clone());
            }
        }
    }

    propagated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OverrideRecord, effective};

    fn entry(id: &str, name: &str) -> CanonicalChannelEntry {
        CanonicalChannelEntry::new(id, name, "News", format!("http://x/{id}"), "")
    }

    fn entries() -> Vec<CanonicalChannelEntry> {
        vec![
            entry("sd", "News One SD"),
            entry("sport", "Sport"),
            entry("hd", "News One HD"),
            entry("plain", "news one"),
        ]
    }

    #[test]
    fn test_news_one_variants_form_one_group() {
        let groups = group_variants(&entries()[..3]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[0].member_ids, vec!["sd", "hd"]);
        assert_eq!(groups[0].representative_id, "hd");
        assert_eq!(groups[1].member_ids, vec!["sport"]);
    }

    #[test]
    fn test_untagged_member_never_outranks_tagged() {
        let groups = group_variants(&entries());
        assert_eq!(groups[0].member_ids, vec!["sd", "hd", "plain"]);
        assert_eq!(groups[0].representative_id, "hd");
    }

    #[test]
    fn test_rank_ties_keep_first_seen() {
        let entries = vec![entry("a", "Film HD"), entry("b", "Film 720p")];
        let groups = group_variants(&entries);
        assert_eq!(groups[0].representative_id, "a");
    }

    #[test]
    fn test_override_on_one_member_reaches_every_sibling() {
        let entries = entries();
        let groups = group_variants(&entries);
        let mut overrides = OverrideMap::new();
        overrides.insert(
            "sd",
            OverrideRecord {
                sort_number: Some(5),
                display_name: Some("News One".to_string()),
                ..Default::default()
            },
        );

        let propagated = propagate_group_overrides(&groups, &overrides);
        for id in ["sd", "hd", "plain"] {
            let member = entries.iter().find(|e| e.id == id).unwrap();
            let merged = effective(member, propagated.get(id));
            assert_eq!(merged.sort_number, Some(5));
            assert_eq!(merged.display_name, "News One");
        }
        assert!(propagated.get("sport").is_none());
    }

    #[test]
    fn test_representative_override_wins() {
        let entries = entries();
        let groups = group_variants(&entries);
        let mut overrides = OverrideMap::new();
        overrides.insert(
            "sd",
            OverrideRecord {
                sort_number: Some(1),
                ..Default::default()
            },
        );
        overrides.insert(
            "hd",
            OverrideRecord {
                sort_number: Some(2),
                ..Default::default()
            },
        );

        let propagated = propagate_group_overrides(&groups, &overrides);
        assert_eq!(propagated.get("sd").unwrap().sort_number, Some(2));
        assert_eq!(propagated.get("plain").unwrap().sort_number, Some(2));
    }
}
