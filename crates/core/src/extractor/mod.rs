//! PDF text extraction.
//!
//! Extraction yields pages lazily so one corrupt page does not block the rest
//! of the document.

mod pdftotext;

pub use pdftotext::{parse_pdfinfo, PdfInfo, PdfToTextExtractor};

use std::path::Path;

use thiserror::Error;

/// Errors that can occur during text extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("Unreadable document: {0}")]
    Unreadable(String),

    #[error("Document is encrypted")]
    Encrypted,

    #[error("Document has no pages")]
    NoPages,

    #[error("Page {page} failed: {message}")]
    PageFailed { page: u32, message: String },

    #[error("Extraction timed out after {0}s")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Text of one page, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Lazy, finite sequence of per-page results.
pub type Pages = Box<dyn Iterator<Item = Result<PageText, ExtractionError>> + Send>;

/// Turns a document on disk into per-page text.
///
/// Implementations block; callers run them on the blocking thread pool.
pub trait TextExtractor: Send + Sync {
    /// Returns the extractor name (e.g., "pdftotext").
    fn name(&self) -> &str;

    /// Open the document. Fails when it is unreadable or encrypted.
    fn extract(&self, path: &Path) -> Result<Pages, ExtractionError>;
}
