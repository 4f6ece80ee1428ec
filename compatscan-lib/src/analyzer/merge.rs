use crate::analyzer::finding::Finding;
use indexmap::map::Entry;
use indexmap::IndexMap;

/// Collapses findings that share a message into one record.
///
/// The first occurrence of a message keeps its position; later occurrences
/// only contribute their previews and browser bookkeeping. Two findings with
/// the same text but different causes are indistinguishable here.
pub fn merge_duplicates(findings: impl IntoIterator<Item = Finding>) -> Vec<Finding> {
    let mut merged: IndexMap<String, Finding> = IndexMap::new();

    for finding in findings {
        match merged.entry(finding.message.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(finding);
            }
            Entry::Occupied(mut entry) => absorb(entry.get_mut(), finding),
        }
    }

    merged.into_values().collect()
}

fn absorb(existing: &mut Finding, duplicate: Finding) {
    existing.previews.extend(duplicate.previews);
    existing.browsers.extend(duplicate.browsers);

    for (note, browsers) in duplicate.browsers_by_note {
        let noted = existing.browsers_by_note.entry(note).or_default();
        for browser in browsers {
            if !noted.contains(&browser) {
                noted.push(browser);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::finding::{Category, FindingSet};

    #[test]
    fn test_duplicates_collapse_in_first_seen_order() {
        let merged = merge_duplicates(vec![
            Finding::error("a", "<one>"),
            Finding::error("b", "<two>"),
            Finding::error("a", "<three>"),
            Finding::error("a", "<four>"),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].message, "a");
        assert_eq!(merged[0].previews, vec!["<one>", "<three>", "<four>"]);
        assert_eq!(merged[1].previews, vec!["<two>"]);
    }

    #[test]
    fn test_merge_across_categories() {
        let mut set = FindingSet::new();
        set.push(Category::KnownBugs, Finding::error("shared", "<bug>"));
        set.push(Category::Prefix, Finding::error("prefix", "<p>"));
        set.push(Category::Prefix, Finding::error("shared", "<prefix>"));

        let merged = set.merge();
        let messages: Vec<_> = merged.iter().map(|f| f.message.as_str()).collect();
        assert_eq!(messages, vec!["prefix", "shared"]);
        assert_eq!(merged[1].previews, vec!["<prefix>", "<bug>"]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let once = merge_duplicates(vec![
            Finding::error("a", "<1>").with_reference("ref"),
            Finding::error("b", "<2>"),
            Finding::error("a", "<3>").with_reference("ref"),
        ]);
        let twice = merge_duplicates(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_browser_notes_are_deduplicated_per_note() {
        let merged = merge_duplicates(vec![
            Finding::error("m", "<1>").with_browser("ie 11", &["1"]),
            Finding::error("m", "<2>").with_browser("ie 11", &["1", "2"]),
            Finding::error("m", "<3>").with_browser("safari 9", &["2"]),
        ]);
        assert_eq!(merged.len(), 1);
        let finding = &merged[0];
        assert_eq!(finding.browsers, vec!["ie 11", "ie 11", "safari 9"]);
        assert_eq!(finding.browsers_by_note["1"], vec!["ie 11"]);
        assert_eq!(finding.browsers_by_note["2"], vec!["ie 11", "safari 9"]);
    }
}
