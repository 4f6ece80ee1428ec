use crate::errors::ScanError;
use crate::style::owned_css::{Declaration, RuleSet, StyleMap, StyleRule};
use lightningcss::declaration::DeclarationBlock;
use lightningcss::printer::PrinterOptions;
use lightningcss::properties::Property;
use lightningcss::rules::{style::StyleRule as LightningStyleRule, CssRule, CssRuleList};
use lightningcss::stylesheet::{ParserOptions, StyleSheet as LightningStyleSheet};
use lightningcss::targets::{Features, Targets};
use lightningcss::traits::ToCss;
use lightningcss::vendor_prefix::VendorPrefix;
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Where a page's stylesheet comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StylesheetSource {
    /// Text of a `<style>` element.
    Inline(String),
    /// `href` of a `<link rel="stylesheet">`.
    Linked(String),
}

pub(crate) fn parser_options<'o, 'i>() -> ParserOptions<'o, 'i> {
    // Invalid declarations are dropped instead of failing the whole sheet.
    ParserOptions {
        error_recovery: true,
        ..ParserOptions::default()
    }
}

/// Parse a raw CSS string (LightningCSS) and convert it to an owned rule set.
///
/// Style rules inside grouping at-rules (`@media`, `@supports`, `@layer`,
/// `@container`, `@scope`, `@starting-style`) and nested style rules are
/// flattened in source order; other at-rules are ignored.
pub fn parse_stylesheet(css_text: &str) -> Result<RuleSet, ScanError> {
    let sheet = LightningStyleSheet::parse(css_text, parser_options())
        .map_err(|e| ScanError::CssParse(e.to_string()))?;

    if !has_nested_style_rules(&sheet.rules) {
        let mut rule_set = RuleSet::new();
        flatten_rules(&sheet.rules, &mut rule_set);
        return Ok(rule_set);
    }

    // Print once with nesting compiled away, so every nested rule comes back
    // as a top-level rule with its full selector.
    let lowered = sheet
        .to_css(PrinterOptions {
            targets: Targets {
                include: Features::Nesting,
                ..Targets::default()
            },
            ..PrinterOptions::default()
        })
        .map_err(|e| ScanError::CssPrint(e.to_string()))?;
    let sheet = LightningStyleSheet::parse(&lowered.code, parser_options())
        .map_err(|e| ScanError::CssParse(e.to_string()))?;

    let mut rule_set = RuleSet::new();
    flatten_rules(&sheet.rules, &mut rule_set);
    Ok(rule_set)
}

/// Child rules of grouping at-rules, which apply whenever their condition holds.
fn grouped_rules<'a, 'i>(rule: &'a CssRule<'i>) -> Option<&'a CssRuleList<'i>> {
    match rule {
        CssRule::Media(media_rule) => Some(&media_rule.rules),
        CssRule::Supports(supports_rule) => Some(&supports_rule.rules),
        CssRule::LayerBlock(layer_rule) => Some(&layer_rule.rules),
        CssRule::Container(container_rule) => Some(&container_rule.rules),
        CssRule::Scope(scope_rule) => Some(&scope_rule.rules),
        CssRule::StartingStyle(starting_rule) => Some(&starting_rule.rules),
        CssRule::MozDocument(document_rule) => Some(&document_rule.rules),
        _ => None,
    }
}

fn has_nested_style_rules(rules: &CssRuleList<'_>) -> bool {
    rules.0.iter().any(|rule| match rule {
        CssRule::Style(style_rule) => !style_rule.rules.0.is_empty(),
        CssRule::Nesting(_) => true,
        other => grouped_rules(other).is_some_and(has_nested_style_rules),
    })
}

fn flatten_rules(rules: &CssRuleList<'_>, out: &mut RuleSet) {
    for rule in &rules.0 {
        match rule {
            CssRule::Style(style_rule) => {
                if let Some(owned) = convert_style_rule(style_rule) {
                    out.push(owned);
                }
            }
            other => match grouped_rules(other) {
                Some(children) => flatten_rules(children, out),
                // @font-face, @keyframes, @import etc. carry no element styles.
                None => debug!("ignoring at-rule without element styles"),
            },
        }
    }
}

/// Copies a single StyleRule's selectors + declarations into an owned StyleRule.
fn convert_style_rule(style_rule: &LightningStyleRule<'_>) -> Option<StyleRule> {
    let selectors: Vec<String> = style_rule
        .selectors
        .0
        .iter()
        .filter_map(|selector| selector.to_css_string(PrinterOptions::default()).ok())
        .collect();
    if selectors.is_empty() {
        return None;
    }

    Some(StyleRule {
        selector: selectors.join(", "),
        declarations: convert_declarations(&style_rule.declarations),
    })
}

/// Normal declarations first, then the `!important` ones.
fn convert_declarations(block: &DeclarationBlock<'_>) -> Vec<Declaration> {
    let normal = block.declarations.iter().map(|p| (p, false));
    let important = block.important_declarations.iter().map(|p| (p, true));

    normal
        .chain(important)
        .filter_map(|(property, important)| {
            let name = declared_name(property);
            match property.value_to_css_string(PrinterOptions::default()) {
                Ok(value) => Some(Declaration {
                    property: name,
                    value,
                    important,
                }),
                Err(err) => {
                    debug!("dropping declaration `{}`: {}", name, err);
                    None
                }
            }
        })
        .collect()
}

/// The property name as written, vendor prefix included.
fn declared_name(property: &Property<'_>) -> String {
    let id = property.property_id();
    format!("{}{}", prefix_text(id.prefix()), id.name())
}

fn prefix_text(prefix: VendorPrefix) -> &'static str {
    if prefix.contains(VendorPrefix::WebKit) {
        "-webkit-"
    } else if prefix.contains(VendorPrefix::Moz) {
        "-moz-"
    } else if prefix.contains(VendorPrefix::Ms) {
        "-ms-"
    } else if prefix.contains(VendorPrefix::O) {
        "-o-"
    } else {
        ""
    }
}

/// Parses a bare `property: value;` block into an ordered style map.
pub fn parse_declarations(text: &str) -> Result<StyleMap, ScanError> {
    let wrapped = format!("span {{ {} }}", text);
    let rules = parse_stylesheet(&wrapped)?;

    let mut styles = StyleMap::new();
    if let Some(rule) = rules.iter().next() {
        for decl in &rule.declarations {
            styles.insert(decl.property.clone(), decl.value.clone());
        }
    }
    Ok(styles)
}

/// Reads linked stylesheets from the local file system.
#[derive(Debug, Clone, Default)]
pub struct StylesheetLoader {
    base_dir: Option<PathBuf>,
}

impl StylesheetLoader {
    /// Resolves relative hrefs against `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        StylesheetLoader {
            base_dir: Some(base_dir.into()),
        }
    }

    /// A loader that only accepts inline stylesheets.
    pub fn inline_only() -> Self {
        StylesheetLoader { base_dir: None }
    }

    /// Returns the stylesheet text, or `None` when it cannot be read.
    pub fn load(&self, source: &StylesheetSource) -> Option<String> {
        match source {
            StylesheetSource::Inline(text) => Some(text.clone()),
            StylesheetSource::Linked(href) => {
                let Some(base_dir) = &self.base_dir else {
                    warn!("skipping linked stylesheet {}: no base directory", href);
                    return None;
                };
                if is_remote(href) {
                    warn!("skipping remote stylesheet {}", href);
                    return None;
                }
                let path = resolve_href(base_dir, href);
                match fs::read_to_string(&path) {
                    Ok(text) => Some(text),
                    Err(err) => {
                        warn!("skipping stylesheet {}: {}", path.display(), err);
                        None
                    }
                }
            }
        }
    }

    /// Loads and parses every source in order. Unreadable or unparseable
    /// sheets are left out.
    pub fn load_rule_set(&self, sources: &[StylesheetSource]) -> RuleSet {
        let mut rule_set = RuleSet::new();
        for source in sources {
            let Some(text) = self.load(source) else {
                continue;
            };
            match parse_stylesheet(&text) {
                Ok(rules) => rule_set.extend(rules),
                Err(err) => warn!("skipping stylesheet: {}", err),
            }
        }
        rule_set
    }
}

fn is_remote(href: &str) -> bool {
    let lowered = href.to_ascii_lowercase();
    lowered.starts_with("http:") || lowered.starts_with("https:") || lowered.starts_with("//")
}

fn resolve_href(base_dir: &Path, href: &str) -> PathBuf {
    let href = href.strip_prefix("file://").unwrap_or(href);
    // Drop query strings and fragments.
    let href = href.split(['?', '#']).next().unwrap_or(href);
    base_dir.join(href.trim_start_matches("./"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stylesheet_flattens_rules() {
        let rules = parse_stylesheet(
            r#"
            .red { color: red; }
            @media screen and (min-width: 100px) {
                #blue { color: blue; }
            }
            @font-face { font-family: "x"; src: url(x.woff); }
            p, span { display: flex !important; margin: 0; }
            "#,
        )
        .unwrap();

        let selectors: Vec<_> = rules.iter().map(|r| r.selector.as_str()).collect();
        assert_eq!(selectors, vec![".red", "#blue", "p, span"]);

        let last = &rules.rules[2];
        assert_eq!(last.declarations.len(), 2);
        assert_eq!(last.declarations[0].property, "margin");
        assert!(!last.declarations[0].important);
        assert_eq!(last.declarations[1].property, "display");
        assert_eq!(last.declarations[1].value, "flex");
        assert!(last.declarations[1].important);
    }

    #[test]
    fn test_grouping_rules_are_flattened() {
        let rules = parse_stylesheet(
            r#"
            @container (min-width: 1px) { fieldset { display: grid; } }
            @scope (.card) { p { color: red; } }
            @starting-style { .fade { opacity: 0; } }
            @keyframes spin { from { color: red; } }
            "#,
        )
        .unwrap();
        let selectors: Vec<_> = rules.iter().map(|r| r.selector.as_str()).collect();
        assert_eq!(selectors, vec!["fieldset", "p", ".fade"]);
        assert_eq!(rules.rules[0].declarations[0].value, "grid");
    }

    #[test]
    fn test_nested_rules_get_full_selectors() {
        let rules = parse_stylesheet(
            r#"
            form {
                color: red;
                & fieldset { display: grid; }
                > legend { display: flex; }
            }
            "#,
        )
        .unwrap();
        let selectors: Vec<_> = rules.iter().map(|r| r.selector.as_str()).collect();
        assert_eq!(selectors, vec!["form", "form fieldset", "form > legend"]);
        assert_eq!(rules.rules[1].declarations[0].property, "display");
        assert!(rules.iter().all(|rule| !rule.selector.contains('&')));
    }

    #[test]
    fn test_prefixed_properties_keep_prefix() {
        let rules = parse_stylesheet(".a { -webkit-transform: none; transform: none; }").unwrap();
        let names: Vec<_> = rules.rules[0]
            .declarations
            .iter()
            .map(|d| d.property.as_str())
            .collect();
        assert_eq!(names, vec!["-webkit-transform", "transform"]);
    }

    #[test]
    fn test_parse_declarations() {
        let styles = parse_declarations("display: flex; -ms-display: flex;").unwrap();
        assert_eq!(styles.get("display").map(String::as_str), Some("flex"));
        assert_eq!(styles.get("-ms-display").map(String::as_str), Some("flex"));
        assert!(parse_declarations("").unwrap().is_empty());
    }

    #[test]
    fn test_loader_skips_unreadable_and_remote() {
        let loader = StylesheetLoader::new("/nonexistent-dir-for-tests");
        assert_eq!(
            loader.load(&StylesheetSource::Inline("p{}".to_string())),
            Some("p{}".to_string())
        );
        assert_eq!(
            loader.load(&StylesheetSource::Linked("https://cdn.example/a.css".to_string())),
            None
        );
        assert_eq!(
            loader.load(&StylesheetSource::Linked("missing.css".to_string())),
            None
        );
        assert_eq!(
            StylesheetLoader::inline_only().load(&StylesheetSource::Linked("a.css".to_string())),
            None
        );
    }

    #[test]
    fn test_resolve_href() {
        assert_eq!(
            resolve_href(Path::new("/site"), "./css/main.css?v=2"),
            PathBuf::from("/site/css/main.css")
        );
    }
}
