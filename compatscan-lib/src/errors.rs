use thiserror::Error;

/// Errors raised at the collaborator boundary (CSS engine, browserslist, I/O).
///
/// The analysis core never produces these; it absorbs collaborator failures and
/// degrades to fewer findings instead.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("css parse error: {0}")]
    CssParse(String),

    #[error("css printer error: {0}")]
    CssPrint(String),

    #[error("css minifier error: {0}")]
    CssMinify(String),

    #[error("invalid browserslist query: {0}")]
    Browserslist(String),

    #[error("document has no root element")]
    EmptyDocument,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
