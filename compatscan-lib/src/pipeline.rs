use crate::analyzer::{analyze_tree, finding::Finding};
use crate::dom::{AnnotatedNode, NodeShape};
use crate::errors::ScanError;
use crate::parser::html;
use crate::style::cascade::CascadeResolver;
use crate::style::owned_css::RuleSet;
use crate::style::prefixer::{derive_expected_prefixes, BrowserTargets, LightningPrefixer, Prefixer};
use crate::style::selector::{BuiltinSelectors, SelectorMatcher, SpecificityComparator};
use crate::style::stylesheet::StylesheetLoader;
use log::info;

/// Default maximum length of a finding preview, in characters.
pub const DEFAULT_PREVIEW_LENGTH: usize = 300;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Browserslist queries describing the target browsers.
    pub browserslist: Vec<String>,
    pub preview_length: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            browserslist: vec!["defaults".to_string()],
            preview_length: DEFAULT_PREVIEW_LENGTH,
        }
    }
}

/// Runs the whole analysis: cascade, prefix derivation, checks, merge.
pub struct Scanner {
    matcher: Box<dyn SelectorMatcher>,
    comparator: Box<dyn SpecificityComparator>,
    prefixer: Box<dyn Prefixer>,
    preview_length: usize,
}

impl Scanner {
    /// A scanner with the built-in selector engine and the lightningcss prefixer.
    pub fn new(options: &ScanOptions) -> Result<Self, ScanError> {
        let targets = BrowserTargets::from_query(&options.browserslist)?;
        Ok(Self::with_collaborators(
            Box::new(BuiltinSelectors::new()),
            Box::new(BuiltinSelectors::new()),
            Box::new(LightningPrefixer::new(targets)),
            options.preview_length,
        ))
    }

    pub fn with_collaborators(
        matcher: Box<dyn SelectorMatcher>,
        comparator: Box<dyn SpecificityComparator>,
        prefixer: Box<dyn Prefixer>,
        preview_length: usize,
    ) -> Self {
        Scanner {
            matcher,
            comparator,
            prefixer,
            preview_length,
        }
    }

    /// Resolves the cascade for every node and attaches the expected prefixed styles.
    pub fn annotate(&self, root: &NodeShape, rules: &RuleSet) -> AnnotatedNode {
        let resolver = CascadeResolver::new(rules, self.matcher.as_ref(), self.comparator.as_ref());
        let styled = resolver.build_styled_tree(root);
        derive_expected_prefixes(styled, self.prefixer.as_ref())
    }

    /// Analyses an already extracted node tree against a rule set.
    pub fn scan_shapes(&self, root: &NodeShape, rules: &RuleSet) -> Vec<Finding> {
        let annotated = self.annotate(root, rules);
        let findings = analyze_tree(&annotated);
        info!(
            "analysed {} nodes against {} rules: {} findings",
            annotated.len(),
            rules.len(),
            findings.len()
        );
        findings
    }

    /// Parses `html`, loads its stylesheets through `loader` and analyses it.
    /// `extra_rules` are applied after the page's own stylesheets.
    pub fn scan_html(
        &self,
        html_content: &str,
        loader: &StylesheetLoader,
        extra_rules: RuleSet,
    ) -> Result<Vec<Finding>, ScanError> {
        let document = html::parse_document(html_content);
        let root = document
            .node_shapes(self.preview_length)
            .ok_or(ScanError::EmptyDocument)?;

        let mut rules = loader.load_rule_set(&document.stylesheet_sources());
        rules.extend(extra_rules);
        Ok(self.scan_shapes(&root, &rules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::css::{missing_prefix_message, FIELDSET_FLEX_GRID, FIXED_UNDER_TRANSFORM};

    /// Adds `-webkit-` copies of `transform` and `user-select`.
    struct WebkitPrefixer;

    impl Prefixer for WebkitPrefixer {
        fn prefix(&self, declarations: &str) -> Result<String, ScanError> {
            let mut out = String::new();
            for decl in declarations.split(';').map(str::trim).filter(|d| !d.is_empty()) {
                if decl.starts_with("transform:") || decl.starts_with("user-select:") {
                    out.push_str(&format!("-webkit-{}; ", decl));
                }
                out.push_str(&format!("{}; ", decl));
            }
            Ok(out)
        }
    }

    fn scanner() -> Scanner {
        Scanner::with_collaborators(
            Box::new(BuiltinSelectors::new()),
            Box::new(BuiltinSelectors::new()),
            Box::new(WebkitPrefixer),
            DEFAULT_PREVIEW_LENGTH,
        )
    }

    #[test]
    fn test_scan_html_end_to_end() {
        let page = r#"<html><head><style>
            .spin { transform: rotate(10deg); }
            .bar { position: fixed; }
            fieldset { display: grid; }
            .no-select { user-select: none; -webkit-user-select: none; }
        </style></head>
        <body>
            <div class="spin"><section><nav class="bar"></nav></section></div>
            <fieldset></fieldset>
            <fieldset></fieldset>
            <p class="no-select">x</p>
        </body></html>"#;

        let findings = scanner()
            .scan_html(page, &StylesheetLoader::inline_only(), RuleSet::new())
            .unwrap();
        let messages: Vec<_> = findings.iter().map(|f| f.message.clone()).collect();
        assert_eq!(
            messages,
            vec![
                missing_prefix_message("transform", "-webkit-"),
                FIXED_UNDER_TRANSFORM.to_string(),
                FIELDSET_FLEX_GRID.to_string(),
            ]
        );
        assert_eq!(findings[2].previews.len(), 2);
        assert!(findings[1].previews[0].starts_with("<div class=\"spin\">"));
    }

    #[test]
    fn test_extra_rules_apply_last() {
        let page = "<html><body><fieldset></fieldset></body></html>";
        let extra = crate::style::stylesheet::parse_stylesheet("fieldset { display: flex }").unwrap();
        let findings = scanner()
            .scan_html(page, &StylesheetLoader::inline_only(), extra)
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, FIELDSET_FLEX_GRID);
    }

    #[test]
    fn test_default_options() {
        let options = ScanOptions::default();
        assert_eq!(options.browserslist, vec!["defaults"]);
        assert_eq!(options.preview_length, 300);
    }
}
