//! Publication, acquired file and extracted record types.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a publication across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationStatus {
    /// Discovered, nothing acquired yet.
    Pending,
    /// Files are being acquired or extracted.
    Processing,
    /// Every owned file reached a final extraction status.
    Completed,
    /// Nothing could be acquired for this publication.
    Error,
}

impl PublicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicationStatus::Pending => "pending",
            PublicationStatus::Processing => "processing",
            PublicationStatus::Completed => "completed",
            PublicationStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PublicationStatus::Pending),
            "processing" => Some(PublicationStatus::Processing),
            "completed" => Some(PublicationStatus::Completed),
            "error" => Some(PublicationStatus::Error),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            PublicationStatus::Pending => 0,
            PublicationStatus::Processing => 1,
            PublicationStatus::Completed | PublicationStatus::Error => 2,
        }
    }

    /// Whether moving to `next` keeps the status monotonic within a run.
    pub fn can_advance_to(&self, next: PublicationStatus) -> bool {
        next.rank() >= self.rank()
    }
}

/// Status shared by the download and extraction stages of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Processing => "processing",
            FileStatus::Completed => "completed",
            FileStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FileStatus::Pending),
            "processing" => Some(FileStatus::Processing),
            "completed" => Some(FileStatus::Completed),
            "error" => Some(FileStatus::Error),
            _ => None,
        }
    }

    /// Completed or Error.
    pub fn is_final(&self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::Error)
    }
}

/// A periodic publication (journal issue) discovered on the portal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publication {
    /// Portal-assigned publication identifier (e.g. "2237").
    pub id: String,
    pub publication_date: NaiveDate,
    pub availability_date: Option<NaiveDate>,
    pub discovered_at: DateTime<Utc>,
    /// Files with a completed download.
    pub file_count: u32,
    pub record_count: u32,
    pub status: PublicationStatus,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A PDF partition of a publication stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquiredFile {
    pub id: i64,
    pub publication_id: String,
    pub file_name: String,
    pub path: PathBuf,
    /// Class-range label of the partition (e.g. "1-34").
    pub class_range: String,
    pub size_bytes: u64,
    pub source_url: String,
    pub downloaded_at: Option<DateTime<Utc>>,
    pub download_status: FileStatus,
    pub extraction_status: FileStatus,
    pub extracted_at: Option<DateTime<Utc>>,
    pub records_extracted: u32,
    pub error_message: Option<String>,
}

/// Fields parsed out of one application block.
///
/// Every field except the application number may be missing when the
/// layout drifts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFields {
    pub application_number: String,
    pub filing_date: Option<NaiveDate>,
    pub name: Option<String>,
    pub applicant_name: Option<String>,
    pub applicant_address: Option<String>,
    pub applicant_type: Option<String>,
    pub class_number: Option<u32>,
    pub description: Option<String>,
    pub representative_name: Option<String>,
    pub representative_address: Option<String>,
    pub usage_since: Option<String>,
    pub association: Option<String>,
    pub office_location: Option<String>,
    pub page_number: u32,
    pub raw_text: String,
}

/// A persisted record, owned by one file and (through it) one publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub id: i64,
    pub file_id: i64,
    pub publication_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: RecordFields,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            PublicationStatus::Pending,
            PublicationStatus::Processing,
            PublicationStatus::Completed,
            PublicationStatus::Error,
        ] {
            assert_eq!(PublicationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PublicationStatus::parse("done"), None);
        assert_eq!(FileStatus::parse("bogus"), None);
    }

    #[test]
    fn test_publication_status_monotonic() {
        use PublicationStatus::*;
        assert!(Pending.can_advance_to(Processing));
        assert!(Processing.can_advance_to(Completed));
        assert!(Processing.can_advance_to(Error));
        assert!(Completed.can_advance_to(Completed));
        assert!(!Completed.can_advance_to(Processing));
        assert!(!Error.can_advance_to(Pending));
    }

    #[test]
    fn test_file_status_final() {
        assert!(FileStatus::Completed.is_final());
        assert!(FileStatus::Error.is_final());
        assert!(!FileStatus::Pending.is_final());
        assert!(!FileStatus::Processing.is_final());
    }

    #[test]
    fn test_record_serializes_flat() {
        let record = ExtractedRecord {
            id: 1,
            file_id: 7,
            publication_id: "2237".to_string(),
            created_at: Utc::now(),
            fields: RecordFields {
                application_number: "6123456".to_string(),
                class_number: Some(25),
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["application_number"], "6123456");
        assert_eq!(json["class_number"], 25);
        assert!(json["filing_date"].is_null());
    }
}
