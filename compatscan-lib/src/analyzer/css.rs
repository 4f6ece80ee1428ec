//! CSS compatibility checks over a styled and prefixed tree.

use crate::analyzer::finding::{Category, Finding, FindingSet};
use crate::dom::AnnotatedNode;
use crate::style::prefixer::{unprefixed, vendor_prefix};
use std::collections::VecDeque;

pub const FIELDSET_FLEX_GRID: &str = "The fieldset element does not support flex or grid styling.";

pub const FIXED_UNDER_TRANSFORM: &str =
    "Fixed elements should not use the transform property, or be nested inside an transformed element.";

pub const FIXED_UNDER_TRANSFORM_REFERENCE: &str = "https://stackoverflow.com/questions/15194313/transform3d-not-working-with-position-fixed-children/15256339#15256339";

const FLEX_OR_GRID: &[&str] = &["flex", "grid", "inline-flex", "inline-grid"];

pub fn missing_prefix_message(base: &str, prefix: &str) -> String {
    format!(
        "The CSS property \"{}\" should also be included with the {} prefix.",
        base, prefix
    )
}

/// Analyses `node` and its subtree, own findings first, then each child's in
/// document order. Nothing is merged.
pub fn analyze(node: &AnnotatedNode) -> FindingSet {
    let mut findings = FindingSet::new();

    for finding in prefix_gaps(node) {
        findings.push(Category::Prefix, finding);
    }
    for finding in known_bugs(node) {
        findings.push(Category::KnownBugs, finding);
    }

    for child in &node.children {
        findings.extend(analyze(child));
    }
    findings
}

/// Analyses the whole tree and merges duplicate findings once at the root.
pub fn analyze_tree(root: &AnnotatedNode) -> Vec<Finding> {
    analyze(root).merge()
}

/// Prefixed properties the target browsers need whose unprefixed form is
/// declared without them.
pub fn prefix_gaps(node: &AnnotatedNode) -> Vec<Finding> {
    // Derivation never ran for this node.
    let Some(prefixed_styles) = &node.prefixed_styles else {
        return Vec::new();
    };

    prefixed_styles
        .keys()
        .filter_map(|property| {
            let prefix = vendor_prefix(property)?;
            let base = unprefixed(property);
            if node.styles.contains_key(base) && !node.styles.contains_key(property) {
                Some(Finding::error(
                    missing_prefix_message(base, prefix),
                    node.preview.clone(),
                ))
            } else {
                None
            }
        })
        .collect()
}

pub fn known_bugs(node: &AnnotatedNode) -> Vec<Finding> {
    let mut findings: Vec<Finding> = fieldset_flex_or_grid(node).into_iter().collect();
    findings.extend(fixed_under_transform(node));
    findings
}

/// `<fieldset>` cannot be a flex or grid container in several engines.
fn fieldset_flex_or_grid(node: &AnnotatedNode) -> Option<Finding> {
    let display = node.style("display")?;
    (node.tag == "fieldset" && FLEX_OR_GRID.contains(&display))
        .then(|| Finding::error(FIELDSET_FLEX_GRID, node.preview.clone()))
}

/// Fixed descendants of a transformed element are positioned relative to it.
///
/// Level-by-level search: a fixed descendant is reported and its own subtree is
/// not searched; non-fixed descendants pass their children to the next level.
fn fixed_under_transform(node: &AnnotatedNode) -> Vec<Finding> {
    let mut findings = Vec::new();
    if node.style("transform").unwrap_or("none") == "none" {
        return findings;
    }

    let mut level: VecDeque<&AnnotatedNode> = node.children.iter().collect();
    while !level.is_empty() {
        let mut next_level = VecDeque::new();
        for descendant in level {
            if descendant.style("position") == Some("fixed") {
                findings.push(
                    Finding::error(FIXED_UNDER_TRANSFORM, node.preview.clone())
                        .with_reference(FIXED_UNDER_TRANSFORM_REFERENCE),
                );
            } else {
                next_level.extend(descendant.children.iter());
            }
        }
        level = next_level;
    }
    findings
}
