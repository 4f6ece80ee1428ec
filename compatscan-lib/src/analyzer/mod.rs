pub mod css;
pub mod finding;
pub mod merge;

pub use css::{analyze, analyze_tree};
pub use merge::merge_duplicates;
