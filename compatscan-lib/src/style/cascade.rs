use crate::dom::{AnnotatedNode, ElementRef, NodeShape};
use crate::style::owned_css::{RuleSet, StyleMap, StyleRule};
use crate::style::selector::{SelectorMatcher, SpecificityComparator};
use log::debug;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

/// Result of running the cascade for one element.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Matched rules in ascending specificity, source order on ties.
    pub applicable_rules: Vec<Arc<StyleRule>>,
    pub styles: StyleMap,
    /// Properties whose current value came from an `!important` declaration.
    pub important: HashSet<String>,
}

/// Resolves the effective style of elements against one rule set.
pub struct CascadeResolver<'r> {
    rules: &'r RuleSet,
    matcher: &'r dyn SelectorMatcher,
    comparator: &'r dyn SpecificityComparator,
}

impl<'r> CascadeResolver<'r> {
    pub fn new(
        rules: &'r RuleSet,
        matcher: &'r dyn SelectorMatcher,
        comparator: &'r dyn SpecificityComparator,
    ) -> Self {
        CascadeResolver {
            rules,
            matcher,
            comparator,
        }
    }

    /// Rules whose selector matches `element`, in stylesheet order.
    /// Selectors the matcher rejects are skipped.
    fn matching_rules(&self, element: &ElementRef<'_>) -> Vec<Arc<StyleRule>> {
        self.rules
            .iter()
            .filter(|rule| match self.matcher.matches(&rule.selector, element) {
                Ok(matched) => matched,
                Err(err) => {
                    debug!("skipping rule `{}`: {}", rule.selector, err);
                    false
                }
            })
            .cloned()
            .collect()
    }

    /// Stable sort by ascending specificity; comparator failures count as equal.
    ///
    /// Binary insertion sort, because `slice::sort_by` requires a total order
    /// and a failing comparator does not give one. Each rule goes after every
    /// sorted rule that does not outrank it.
    fn sort_by_specificity(&self, rules: &mut [Arc<StyleRule>]) {
        for i in 1..rules.len() {
            let (mut low, mut high) = (0, i);
            while low < high {
                let mid = (low + high) / 2;
                let ordering = self
                    .comparator
                    .compare(&rules[mid].selector, &rules[i].selector)
                    .unwrap_or(Ordering::Equal);
                if ordering == Ordering::Greater {
                    high = mid;
                } else {
                    low = mid + 1;
                }
            }
            rules[low..=i].rotate_right(1);
        }
    }

    /// Runs the cascade for one element.
    pub fn resolve(&self, element: &ElementRef<'_>) -> Resolution {
        let mut applicable_rules = self.matching_rules(element);
        self.sort_by_specificity(&mut applicable_rules);
        let (styles, important) = fold_declarations(&applicable_rules);
        Resolution {
            applicable_rules,
            styles,
            important,
        }
    }

    /// Resolves every node of the tree, producing a tree of the same shape.
    pub fn build_styled_tree(&self, root: &NodeShape) -> AnnotatedNode {
        self.build_recursive(&ElementRef::root(root))
    }

    fn build_recursive(&self, element: &ElementRef<'_>) -> AnnotatedNode {
        let resolution = self.resolve(element);
        let mut annotated = AnnotatedNode::from_shape(
            element.node,
            resolution.styles,
            resolution.applicable_rules,
        );

        annotated.children = (0..element.node.children.len())
            .filter_map(|index| ElementRef::child(element, index))
            .map(|child| self.build_recursive(&child))
            .collect();
        annotated
    }
}

/// Folds declarations of specificity-sorted rules into one style map.
///
/// A later declaration replaces the current value unless the current value is
/// `!important` and the incoming one is not.
pub fn fold_declarations(rules: &[Arc<StyleRule>]) -> (StyleMap, HashSet<String>) {
    let mut styles = StyleMap::new();
    let mut important: HashSet<String> = HashSet::new();

    for decl in rules.iter().flat_map(|rule| rule.declarations.iter()) {
        let already_important = important.contains(&decl.property);
        if !styles.contains_key(&decl.property) || !already_important || decl.important {
            styles.insert(decl.property.clone(), decl.value.clone());
            if decl.important {
                important.insert(decl.property.clone());
            }
        }
    }

    (styles, important)
}
