//! Error taxonomy for the extraction core.
//!
//! Pipeline, store and server code use `anyhow`; the layout, table and
//! guide modules return [`ExtractError`] so callers can tell an unreadable
//! document apart from a document that simply lacks a structure.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("PDF could not be read: {0}")]
    Pdf(String),

    #[error("anchor heading not found: {0}")]
    AnchorNotFound(String),

    #[error("required field missing: {0}")]
    MissingField(String),

    #[error("invalid pattern '{name}': {source}")]
    Pattern {
        name: String,
        #[source]
        source: regex::Error,
    },
}

impl From<lopdf::Error> for ExtractError {
    fn from(err: lopdf::Error) -> Self {
        ExtractError::Pdf(err.to_string())
    }
}
