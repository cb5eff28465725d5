//! Publication storage trait and types.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use super::{
    AcquiredFile, ExtractedRecord, FileStatus, Publication, PublicationStatus, RecordFields,
};

/// Error type for publication storage.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Row not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// A publication as seen on the listing page.
#[derive(Debug, Clone)]
pub struct UpsertPublication {
    pub id: String,
    pub publication_date: NaiveDate,
    pub availability_date: Option<NaiveDate>,
}

/// Request to track a file for a publication.
#[derive(Debug, Clone)]
pub struct NewAcquiredFile {
    pub publication_id: String,
    pub file_name: String,
    pub path: PathBuf,
    pub class_range: String,
    pub source_url: String,
}

/// Filter for querying publications.
#[derive(Debug, Clone, Default)]
pub struct PublicationFilter {
    pub status: Option<PublicationStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl PublicationFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: PublicationStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

/// Filter for querying acquired files.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    pub publication_id: Option<String>,
    pub download_status: Option<FileStatus>,
    pub extraction_status: Option<FileStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl FileFilter {
    pub fn new() -> Self {
        Self {
            limit: 1000,
            ..Default::default()
        }
    }

    pub fn with_publication(mut self, publication_id: impl Into<String>) -> Self {
        self.publication_id = Some(publication_id.into());
        self
    }

    pub fn with_download_status(mut self, status: FileStatus) -> Self {
        self.download_status = Some(status);
        self
    }

    pub fn with_extraction_status(mut self, status: FileStatus) -> Self {
        self.extraction_status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

/// Filter for querying extracted records.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub publication_id: Option<String>,
    pub file_id: Option<i64>,
    pub application_number: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            ..Default::default()
        }
    }

    pub fn with_publication(mut self, publication_id: impl Into<String>) -> Self {
        self.publication_id = Some(publication_id.into());
        self
    }

    pub fn with_file(mut self, file_id: i64) -> Self {
        self.file_id = Some(file_id);
        self
    }

    pub fn with_application_number(mut self, number: impl Into<String>) -> Self {
        self.application_number = Some(number.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

/// Trait for publication storage backends.
///
/// Deleting a publication removes its files and records.
pub trait PublicationStore: Send + Sync {
    /// Insert a publication as PENDING, or refresh the dates of an existing one
    /// without touching its status or counters.
    fn upsert_publication(&self, publication: &UpsertPublication)
        -> Result<Publication, StoreError>;

    fn get_publication(&self, id: &str) -> Result<Option<Publication>, StoreError>;

    /// Newest publication date first.
    fn list_publications(&self, filter: &PublicationFilter)
        -> Result<Vec<Publication>, StoreError>;

    fn count_publications(&self, filter: &PublicationFilter) -> Result<i64, StoreError>;

    fn set_publication_status(
        &self,
        id: &str,
        status: PublicationStatus,
        error_message: Option<&str>,
    ) -> Result<Publication, StoreError>;

    /// Recompute file and record counts from the owned rows.
    fn refresh_publication_counts(&self, id: &str) -> Result<Publication, StoreError>;

    /// Delete a publication with its files and records. Returns false if absent.
    fn delete_publication(&self, id: &str) -> Result<bool, StoreError>;

    /// Delete every publication. Returns the number removed.
    fn delete_all(&self) -> Result<usize, StoreError>;

    fn get_file(&self, publication_id: &str, file_name: &str)
        -> Result<Option<AcquiredFile>, StoreError>;

    fn get_file_by_id(&self, id: i64) -> Result<Option<AcquiredFile>, StoreError>;

    /// Track a new file with both stages PENDING.
    fn create_file(&self, file: &NewAcquiredFile) -> Result<AcquiredFile, StoreError>;

    /// Adopt a file already on disk: download COMPLETED, extraction PENDING.
    fn adopt_file(&self, file: &NewAcquiredFile, size_bytes: u64)
        -> Result<AcquiredFile, StoreError>;

    fn delete_file(&self, id: i64) -> Result<(), StoreError>;

    /// Record a finished download; extraction is reset to PENDING.
    fn mark_downloaded(&self, id: i64, size_bytes: u64) -> Result<AcquiredFile, StoreError>;

    /// Record a failed download; both stages become ERROR.
    fn mark_download_failed(&self, id: i64, message: &str) -> Result<AcquiredFile, StoreError>;

    fn mark_extraction_started(&self, id: i64) -> Result<AcquiredFile, StoreError>;

    /// Replace the file's records and mark extraction COMPLETED, atomically.
    fn complete_extraction(
        &self,
        id: i64,
        records: &[RecordFields],
    ) -> Result<AcquiredFile, StoreError>;

    fn mark_extraction_failed(&self, id: i64, message: &str) -> Result<AcquiredFile, StoreError>;

    fn list_files(&self, filter: &FileFilter) -> Result<Vec<AcquiredFile>, StoreError>;

    fn count_files(&self, filter: &FileFilter) -> Result<i64, StoreError>;

    fn list_records(&self, filter: &RecordFilter) -> Result<Vec<ExtractedRecord>, StoreError>;

    fn count_records(&self, filter: &RecordFilter) -> Result<i64, StoreError>;
}
