//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Runs (outcomes, duration, rejected triggers)
//! - Downloads (per-target results)
//! - Extraction (per-file results, records, skipped blocks)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Runs
// =============================================================================

/// Finished runs by outcome and trigger.
pub static RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("harvester_runs_total", "Total finished runs"),
        &["outcome", "trigger"], // "success", "partial", "failure" / "scheduled", "manual"
    )
    .unwrap()
});

/// Run duration in seconds.
pub static RUN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("harvester_run_duration_seconds", "Duration of a run")
            .buckets(vec![1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0]),
        &["mode"],
    )
    .unwrap()
});

/// Triggers rejected because a run was already active.
pub static TRIGGERS_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "harvester_triggers_rejected_total",
            "Triggers rejected while a run was active",
        ),
        &["trigger"],
    )
    .unwrap()
});

/// Publications discovered on the listing.
pub static PUBLICATIONS_DISCOVERED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "harvester_publications_discovered_total",
        "Publications returned by discovery",
    )
    .unwrap()
});

// =============================================================================
// Downloads
// =============================================================================

/// Download targets by result.
pub static DOWNLOADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("harvester_downloads_total", "Download targets processed"),
        &["result"], // "downloaded", "healed", "adopted", "skipped", "failed"
    )
    .unwrap()
});

// =============================================================================
// Extraction
// =============================================================================

/// Files extracted by result.
pub static EXTRACTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("harvester_extractions_total", "Files run through extraction"),
        &["result"], // "completed", "failed"
    )
    .unwrap()
});

/// Per-file extraction duration in seconds.
pub static EXTRACTION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "harvester_extraction_duration_seconds",
            "Duration of text extraction and parsing for one file",
        )
        .buckets(vec![0.5, 1.0, 5.0, 15.0, 60.0, 120.0, 300.0, 600.0]),
        &[],
    )
    .unwrap()
});

/// Records extracted.
pub static RECORDS_EXTRACTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("harvester_records_extracted_total", "Records extracted").unwrap()
});

/// Blocks skipped as unparseable.
pub static BLOCKS_SKIPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "harvester_blocks_skipped_total",
        "Record blocks skipped as unparseable",
    )
    .unwrap()
});

/// Pages that failed text extraction.
pub static PAGES_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("harvester_pages_failed_total", "Pages that failed extraction").unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Runs
        Box::new(RUNS_TOTAL.clone()),
        Box::new(RUN_DURATION.clone()),
        Box::new(TRIGGERS_REJECTED.clone()),
        Box::new(PUBLICATIONS_DISCOVERED.clone()),
        // Downloads
        Box::new(DOWNLOADS_TOTAL.clone()),
        // Extraction
        Box::new(EXTRACTIONS_TOTAL.clone()),
        Box::new(EXTRACTION_DURATION.clone()),
        Box::new(RECORDS_EXTRACTED.clone()),
        Box::new(BLOCKS_SKIPPED.clone()),
        Box::new(PAGES_FAILED.clone()),
    ]
}
