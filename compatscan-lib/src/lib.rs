//! Cross-browser compatibility scanning for rendered documents.
//!
//! The crate resolves the CSS cascade for every element of a document, asks an
//! autoprefixing engine what each element's declarations should look like for a
//! browser matrix, and reports missing vendor prefixes plus a couple of known
//! rendering bugs.

pub mod analyzer;
pub mod dom;
pub mod errors;
pub mod parser;
pub mod pipeline;
pub mod style;

pub use analyzer::finding::{Category, Finding, FindingSet};
pub use dom::{AnnotatedNode, ElementRef, NodeShape};
pub use errors::ScanError;
pub use pipeline::{ScanOptions, Scanner};
pub use style::owned_css::{Declaration, RuleSet, StyleMap, StyleRule};
