use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::downloader::DownloadStats;

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Scheduled,
    Manual,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Scheduled => "scheduled",
            TriggerKind::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(TriggerKind::Scheduled),
            "manual" => Some(TriggerKind::Manual),
            _ => None,
        }
    }
}

/// Which stages a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Discover, download, then extract.
    #[default]
    Full,
    /// Discover and download; extraction is left for a later run.
    DownloadOnly,
    /// Extract every pending file already on record.
    ExtractOnly,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Full => "full",
            RunMode::DownloadOnly => "download_only",
            RunMode::ExtractOnly => "extract_only",
        }
    }

    pub fn discovers(&self) -> bool {
        !matches!(self, RunMode::ExtractOnly)
    }

    pub fn extracts(&self) -> bool {
        !matches!(self, RunMode::DownloadOnly)
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    /// Finished, but at least one file ended in error.
    Partial,
    Failure,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::Partial => "partial",
            RunOutcome::Failure => "failure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(RunOutcome::Success),
            "partial" => Some(RunOutcome::Partial),
            "failure" => Some(RunOutcome::Failure),
            _ => None,
        }
    }
}

/// Extraction phase counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub files_processed: u32,
    pub files_failed: u32,
    pub records_extracted: u32,
    pub skipped_blocks: u32,
}

/// Structured detail blob attached to every run log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunDetails {
    pub mode: RunMode,
    /// Publication identifiers seen during discovery.
    pub publications: Vec<String>,
    pub downloads: DownloadStats,
    pub extraction: ExtractionStats,
}

/// Summary of one pipeline run. Exactly one is written per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    /// Database ID (0 until persisted).
    pub id: i64,
    pub run_id: String,
    pub executed_at: DateTime<Utc>,
    pub trigger: TriggerKind,
    pub outcome: RunOutcome,
    pub publications_found: u32,
    /// Publications the run downloaded or extracted for.
    pub publications_scraped: u32,
    pub files_downloaded: u32,
    pub records_extracted: u32,
    pub error_message: Option<String>,
    pub duration_secs: f64,
    pub details: RunDetails,
}
