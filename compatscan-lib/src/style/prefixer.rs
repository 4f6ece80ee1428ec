//! Derives the vendor-prefixed form each element's styles should have for a
//! browser matrix.

use crate::dom::AnnotatedNode;
use crate::errors::ScanError;
use crate::style::owned_css::{style_map_to_css, StyleMap};
use crate::style::stylesheet::{parse_declarations, parser_options};
use lightningcss::printer::PrinterOptions;
use lightningcss::stylesheet::{MinifyOptions, StyleSheet as LightningStyleSheet};
use lightningcss::targets::{Browsers, Targets};
use log::debug;
use rayon::prelude::*;

/// Vendor prefixes recognised on property names.
pub const VENDOR_PREFIXES: [&str; 5] = ["-webkit-", "-moz-", "-ms-", "-o-", "-khtml-"];

/// The vendor prefix a property name starts with, if any.
pub fn vendor_prefix(property: &str) -> Option<&'static str> {
    VENDOR_PREFIXES
        .into_iter()
        .find(|prefix| property.starts_with(prefix))
}

/// The property name without its vendor prefix.
pub fn unprefixed(property: &str) -> &str {
    vendor_prefix(property)
        .map(|prefix| &property[prefix.len()..])
        .unwrap_or(property)
}

/// Turns a `property: value;` block into the fully prefixed block the target
/// browsers need.
pub trait Prefixer: Send + Sync {
    fn prefix(&self, declarations: &str) -> Result<String, ScanError>;
}

/// A resolved browser matrix.
#[derive(Debug, Clone, Default)]
pub struct BrowserTargets {
    browsers: Option<Browsers>,
}

impl BrowserTargets {
    /// Resolves a browserslist query such as `["defaults"]` or `["last 2 versions", "> 1%"]`.
    pub fn from_query<S: AsRef<str>>(queries: &[S]) -> Result<Self, ScanError> {
        let queries: Vec<String> = queries.iter().map(|q| q.as_ref().to_string()).collect();
        let browsers = Browsers::from_browserslist(queries)
            .map_err(|e| ScanError::Browserslist(e.to_string()))?;
        Ok(BrowserTargets { browsers })
    }

    pub fn from_browsers(browsers: Browsers) -> Self {
        BrowserTargets {
            browsers: Some(browsers),
        }
    }

    fn targets(&self) -> Targets {
        self.browsers.map(Targets::from).unwrap_or_default()
    }
}

/// Prefixer backed by the lightningcss minifier.
#[derive(Debug, Clone)]
pub struct LightningPrefixer {
    targets: BrowserTargets,
}

impl LightningPrefixer {
    pub fn new(targets: BrowserTargets) -> Self {
        LightningPrefixer { targets }
    }
}

impl Prefixer for LightningPrefixer {
    fn prefix(&self, declarations: &str) -> Result<String, ScanError> {
        let wrapped = format!("span {{ {} }}", declarations);
        let mut sheet = LightningStyleSheet::parse(&wrapped, parser_options())
            .map_err(|e| ScanError::CssParse(e.to_string()))?;

        // The minifier's property handlers add and remove prefixed duplicates for the targets.
        sheet
            .minify(MinifyOptions {
                targets: self.targets.targets(),
                ..MinifyOptions::default()
            })
            .map_err(|e| ScanError::CssMinify(e.to_string()))?;

        let printed = sheet
            .to_css(PrinterOptions {
                targets: self.targets.targets(),
                ..PrinterOptions::default()
            })
            .map_err(|e| ScanError::CssPrint(e.to_string()))?;

        Ok(block_body(&printed.code).to_string())
    }
}

/// The text between the first `{` and the last `}` of a printed rule.
fn block_body(code: &str) -> &str {
    match (code.find('{'), code.rfind('}')) {
        (Some(open), Some(close)) if open < close => code[open + 1..close].trim(),
        _ => "",
    }
}

/// Drops prefixed properties whose unprefixed counterpart is also present, so
/// the engine does not re-prefix them.
pub fn strip_prefixed_duplicates(styles: &StyleMap) -> StyleMap {
    styles
        .iter()
        .filter(|(property, _)| {
            vendor_prefix(property).is_none() || !styles.contains_key(unprefixed(property))
        })
        .map(|(property, value)| (property.clone(), value.clone()))
        .collect()
}

/// The prefixed style map one element should have. Engine or parser failures
/// give an empty map.
pub fn expected_prefixed_styles(styles: &StyleMap, prefixer: &dyn Prefixer) -> StyleMap {
    let unprefixed_css = style_map_to_css(&strip_prefixed_duplicates(styles));
    prefixer
        .prefix(&unprefixed_css)
        .and_then(|prefixed| parse_declarations(&prefixed))
        .unwrap_or_else(|err| {
            debug!("prefix derivation failed for `{}`: {}", unprefixed_css, err);
            StyleMap::new()
        })
}

/// Attaches `prefixed_styles` to every node of the tree. Sibling subtrees are
/// processed in parallel; the tree shape and child order are preserved.
pub fn derive_expected_prefixes(mut node: AnnotatedNode, prefixer: &dyn Prefixer) -> AnnotatedNode {
    node.prefixed_styles = Some(expected_prefixed_styles(&node.styles, prefixer));
    node.children = node
        .children
        .into_par_iter()
        .map(|child| derive_expected_prefixes(child, prefixer))
        .collect();
    node
}
