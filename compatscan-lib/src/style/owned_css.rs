// Owned rule data, detached from the lightningcss parse lifetimes.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Property name => value, in insertion order. One value per property.
pub type StyleMap = IndexMap<String, String>;

/// Every style rule of a page, in stylesheet order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub rules: Vec<Arc<StyleRule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        RuleSet { rules: Vec::new() }
    }

    pub fn push(&mut self, rule: StyleRule) {
        self.rules.push(Arc::new(rule));
    }

    /// Appends another sheet's rules after this one's.
    pub fn extend(&mut self, other: RuleSet) {
        self.rules.extend(other.rules);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<StyleRule>> {
        self.rules.iter()
    }
}

impl FromIterator<StyleRule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = StyleRule>>(iter: I) -> Self {
        RuleSet {
            rules: iter.into_iter().map(Arc::new).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleRule {
    /// e.g. "div", ".red, .blue", "#header > p"
    pub selector: String,
    pub declarations: Vec<Declaration>,
}

impl StyleRule {
    pub fn new(selector: impl Into<String>, declarations: Vec<Declaration>) -> Self {
        StyleRule {
            selector: selector.into(),
            declarations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub property: String,
    pub value: String,
    #[serde(default)]
    pub important: bool,
}

impl Declaration {
    pub fn new(property: impl Into<String>, value: impl Into<String>) -> Self {
        Declaration {
            property: property.into(),
            value: value.into(),
            important: false,
        }
    }

    pub fn important(property: impl Into<String>, value: impl Into<String>) -> Self {
        Declaration {
            important: true,
            ..Declaration::new(property, value)
        }
    }
}

impl fmt::Display for StyleRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {{", self.selector)?;
        for decl in &self.declarations {
            writeln!(f, "  {}", decl)?;
        }
        write!(f, "}}")
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.important {
            write!(f, "{}: {} !important;", self.property, self.value)
        } else {
            write!(f, "{}: {};", self.property, self.value)
        }
    }
}

/// Canonical `property: value;` text for a style map, the form handed to the
/// prefixing engine.
pub fn style_map_to_css(styles: &StyleMap) -> String {
    styles
        .iter()
        .map(|(property, value)| format!("{}: {};", property, value))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_map_to_css() {
        let mut styles = StyleMap::new();
        styles.insert("display".to_string(), "flex".to_string());
        styles.insert("transform".to_string(), "rotate(10deg)".to_string());
        assert_eq!(
            style_map_to_css(&styles),
            "display: flex; transform: rotate(10deg);"
        );
        assert_eq!(style_map_to_css(&StyleMap::new()), "");
    }

    #[test]
    fn test_rule_display() {
        let rule = StyleRule::new(
            ".red",
            vec![
                Declaration::new("color", "red"),
                Declaration::important("display", "block"),
            ],
        );
        assert_eq!(
            rule.to_string(),
            ".red {\n  color: red;\n  display: block !important;\n}"
        );
    }
}
