//! Types for portal navigation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// HTTP method of a download form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormMethod {
    Get,
    #[default]
    Post,
}

/// A form on the listing page whose submission yields one PDF partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTarget {
    pub publication_id: String,
    /// Class-range label of the partition (e.g. "1-34", or "Part-2" when unlabelled).
    pub class_range: String,
    /// Local file name derived from the form's `FileName` field.
    pub file_name: String,
    /// Absolute form action URL.
    pub action_url: String,
    pub method: FormMethod,
    /// Hidden fields submitted with the form, in document order.
    pub fields: Vec<(String, String)>,
}

impl DownloadTarget {
    /// Stable identity of the target: publication plus class range.
    pub fn identity(&self) -> String {
        format!("{}:{}", self.publication_id, self.class_range)
    }
}

/// One row of the publication listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub publication_id: String,
    pub publication_date: NaiveDate,
    pub availability_date: Option<NaiveDate>,
    pub targets: Vec<DownloadTarget>,
}

/// Errors that can occur while talking to the portal.
#[derive(Debug, Error)]
pub enum NavigatorError {
    /// Failed to connect to the portal.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Request timed out.
    #[error("request timed out")]
    Timeout,

    /// Portal answered with a non-success status.
    #[error("portal returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Request failed for another reason.
    #[error("request failed: {0}")]
    Request(String),

    /// The listing page does not have the expected structure.
    #[error("unexpected listing structure: {0}")]
    Structure(String),

    /// A form submission did not yield a PDF.
    #[error("form response is not a PDF: {0}")]
    NotPdf(String),

    /// Writing the response body failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for NavigatorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            NavigatorError::Timeout
        } else if e.is_connect() {
            NavigatorError::Connection(e.to_string())
        } else {
            NavigatorError::Request(e.to_string())
        }
    }
}
