use crate::analyzer::merge::merge_duplicates;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Analyzer category a finding was raised under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Prefix,
    KnownBugs,
}

impl Category {
    /// Enumeration order, which is also the merge output order.
    pub const ALL: [Category; 2] = [Category::Prefix, Category::KnownBugs];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingKind {
    Error,
}

/// One reported compatibility issue.
///
/// Before merging `previews` holds the single preview of the occurrence; after
/// merging it holds every contributing preview in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: FindingKind,
    pub message: String,
    pub previews: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub browsers: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub browsers_by_note: IndexMap<String, Vec<String>>,
}

impl Finding {
    pub fn error(message: impl Into<String>, preview: impl Into<String>) -> Self {
        Finding {
            kind: FindingKind::Error,
            message: message.into(),
            previews: vec![preview.into()],
            reference: None,
            browsers: Vec::new(),
            browsers_by_note: IndexMap::new(),
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Tags the finding with the browser it was observed in and the notes that
    /// apply to that browser.
    pub fn with_browser(mut self, browser: impl Into<String>, notes: &[&str]) -> Self {
        let browser = browser.into();
        for note in notes {
            self.browsers_by_note
                .insert(note.to_string(), vec![browser.clone()]);
        }
        self.browsers = vec![browser];
        self
    }
}

/// Findings partitioned by category, each in depth-first tree order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindingSet {
    by_category: IndexMap<Category, Vec<Finding>>,
}

impl Default for FindingSet {
    fn default() -> Self {
        FindingSet {
            by_category: Category::ALL
                .into_iter()
                .map(|category| (category, Vec::new()))
                .collect(),
        }
    }
}

impl FindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, category: Category, finding: Finding) {
        self.by_category.entry(category).or_default().push(finding);
    }

    /// Appends every category of `other` after this set's findings.
    pub fn extend(&mut self, other: FindingSet) {
        for (category, findings) in other.by_category {
            self.by_category.entry(category).or_default().extend(findings);
        }
    }

    pub fn get(&self, category: Category) -> &[Finding] {
        self.by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &Finding)> {
        self.by_category
            .iter()
            .flat_map(|(category, findings)| findings.iter().map(move |f| (*category, f)))
    }

    pub fn len(&self) -> usize {
        self.by_category.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collapses findings with identical messages, categories in enumeration order.
    pub fn merge(self) -> Vec<Finding> {
        merge_duplicates(self.by_category.into_values().flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_keeps_category_order() {
        let mut parent = FindingSet::new();
        parent.push(Category::KnownBugs, Finding::error("bug", "<a>"));

        let mut child = FindingSet::new();
        child.push(Category::Prefix, Finding::error("prefix", "<b>"));
        child.push(Category::KnownBugs, Finding::error("bug 2", "<b>"));

        parent.extend(child);
        assert_eq!(parent.len(), 3);
        assert_eq!(parent.get(Category::Prefix).len(), 1);
        let order: Vec<_> = parent.iter().map(|(_, f)| f.message.as_str()).collect();
        assert_eq!(order, vec!["prefix", "bug", "bug 2"]);
    }

    #[test]
    fn test_serialized_shape() {
        let finding = Finding::error("m", "<p>").with_reference("https://example.com");
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "error",
                "message": "m",
                "previews": ["<p>"],
                "reference": "https://example.com"
            })
        );
    }

    #[test]
    fn test_with_browser() {
        let finding = Finding::error("m", "<p>").with_browser("safari 12", &["1", "2"]);
        assert_eq!(finding.browsers, vec!["safari 12"]);
        assert_eq!(finding.browsers_by_note["2"], vec!["safari 12"]);
    }
}
