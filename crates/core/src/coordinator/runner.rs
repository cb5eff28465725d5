//! Run coordinator implementation.
//!
//! A run moves through discovery, download and extraction, then writes one
//! run log. The coordinator's own state is the single-flight guard: a
//! trigger is accepted only while the state is IDLE.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::downloader::{DownloadManager, DownloadProgress, DownloadStats};
use crate::extractor::{ExtractionError, PageText, TextExtractor};
use crate::metrics::{
    BLOCKS_SKIPPED, DOWNLOADS_TOTAL, EXTRACTIONS_TOTAL, EXTRACTION_DURATION, PAGES_FAILED,
    PUBLICATIONS_DISCOVERED, RECORDS_EXTRACTED, RUNS_TOTAL, RUN_DURATION, TRIGGERS_REJECTED,
};
use crate::navigator::{Listing, PortalNavigator};
use crate::parser::{parse_pages, ParseOutcome};
use crate::progress::{ProgressBroadcaster, ProgressCounters, ProgressEvent, ProgressKind};
use crate::publication::{
    AcquiredFile, FileFilter, FileStatus, PublicationStatus, PublicationStore,
    UpsertPublication,
};
use crate::runlog::{
    ExtractionStats, RunDetails, RunLog, RunLogStore, RunMode, RunOutcome, TriggerKind,
};

use super::types::{
    CleanupSummary, CoordinatorError, CoordinatorStatus, RunRequest, RunState, TriggerError,
};

/// Upper bound on files scanned per query.
const FILE_SCAN_LIMIT: i64 = 10_000;

/// Mutable coordinator state behind the single-flight guard.
#[derive(Debug, Default)]
struct Activity {
    state: RunState,
    run_id: Option<String>,
    trigger: Option<TriggerKind>,
    mode: Option<RunMode>,
    started_at: Option<DateTime<Utc>>,
    counters: ProgressCounters,
    last_outcome: Option<RunOutcome>,
    last_error: Option<String>,
    last_finished_at: Option<DateTime<Utc>>,
}

/// Bookkeeping for the run being executed.
struct RunContext {
    run_id: String,
    mode: RunMode,
    counters: ProgressCounters,
    publications_found: u32,
    /// Publications touched by this run, in order.
    touched: Vec<String>,
    publication_errors: u32,
    downloads: DownloadStats,
    extraction: ExtractionStats,
}

impl RunContext {
    fn new(request: &RunRequest) -> Self {
        Self {
            run_id: request.run_id.clone(),
            mode: request.mode,
            counters: ProgressCounters::default(),
            publications_found: 0,
            touched: Vec::new(),
            publication_errors: 0,
            downloads: DownloadStats::default(),
            extraction: ExtractionStats::default(),
        }
    }

    fn touch(&mut self, publication_id: &str) {
        if !self.touched.iter().any(|id| id == publication_id) {
            self.touched.push(publication_id.to_string());
        }
    }

    /// Summary of per-item failures, if there were any.
    fn failure_summary(&self) -> Option<String> {
        let mut parts = Vec::new();
        if self.downloads.failed > 0 {
            parts.push(format!("{} download(s) failed", self.downloads.failed));
        }
        if self.extraction.files_failed > 0 {
            parts.push(format!("{} extraction(s) failed", self.extraction.files_failed));
        }
        if self.publication_errors > 0 {
            parts.push(format!(
                "{} publication(s) without files",
                self.publication_errors
            ));
        }
        (!parts.is_empty()).then(|| parts.join("; "))
    }
}

/// Text and parse results for one file.
struct FileExtraction {
    outcome: ParseOutcome,
    pages_failed: u32,
}

/// Extract every readable page and parse the result. Runs on the blocking pool.
///
/// `cancelled` is checked before each page is pulled, so a file abandoned
/// after a timeout stops spawning work.
fn extract_and_parse(
    extractor: &dyn TextExtractor,
    path: &Path,
    cancelled: &AtomicBool,
) -> Result<FileExtraction, ExtractionError> {
    let mut pages: Vec<PageText> = Vec::new();
    let mut pages_failed = 0u32;

    let mut document = extractor.extract(path)?;
    loop {
        if cancelled.load(Ordering::SeqCst) {
            return Err(ExtractionError::Unreadable(format!(
                "extraction of {} cancelled",
                path.display()
            )));
        }
        let Some(page) = document.next() else {
            break;
        };
        match page {
            Ok(page) => pages.push(page),
            Err(ExtractionError::PageFailed { page, message }) => {
                warn!(file = %path.display(), page, %message, "Skipping unreadable page");
                pages_failed += 1;
            }
            Err(e) => return Err(e),
        }
    }

    if pages.is_empty() && pages_failed > 0 {
        return Err(ExtractionError::Unreadable(format!(
            "no readable pages in {}",
            path.display()
        )));
    }

    Ok(FileExtraction {
        outcome: parse_pages(&pages),
        pages_failed,
    })
}

struct Inner {
    max_publications: usize,
    download_root: PathBuf,
    extraction_timeout: Duration,
    store: Arc<dyn PublicationStore>,
    run_logs: Arc<dyn RunLogStore>,
    navigator: Arc<dyn PortalNavigator>,
    extractor: Arc<dyn TextExtractor>,
    downloads: DownloadManager,
    progress: ProgressBroadcaster,
    activity: RwLock<Activity>,
}

impl Inner {
    /// Atomically move IDLE to the first state of `mode`.
    async fn claim(&self, trigger: TriggerKind, mode: RunMode) -> Result<String, TriggerError> {
        let mut activity = self.activity.write().await;
        if !activity.state.is_idle() {
            TRIGGERS_REJECTED
                .with_label_values(&[trigger.as_str()])
                .inc();
            info!(
                state = activity.state.as_str(),
                trigger = trigger.as_str(),
                "Rejecting trigger, run in progress"
            );
            return Err(TriggerError::AlreadyRunning(activity.state));
        }

        let run_id = Uuid::new_v4().to_string();
        activity.state = if mode.discovers() {
            RunState::Discovering
        } else {
            RunState::Extracting
        };
        activity.run_id = Some(run_id.clone());
        activity.trigger = Some(trigger);
        activity.mode = Some(mode);
        activity.started_at = Some(Utc::now());
        activity.counters = ProgressCounters::default();
        Ok(run_id)
    }

    /// Return a claimed but never executed run to IDLE.
    async fn release(&self) {
        let mut activity = self.activity.write().await;
        activity.state = RunState::Idle;
        activity.run_id = None;
        activity.trigger = None;
        activity.mode = None;
        activity.started_at = None;
    }

    async fn set_state(&self, state: RunState) {
        self.activity.write().await.state = state;
        debug!(state = state.as_str(), "Coordinator state changed");
    }

    async fn publish(&self, run: &RunContext, kind: ProgressKind, message: impl Into<String>) {
        let phase = {
            let mut activity = self.activity.write().await;
            activity.counters = run.counters;
            activity.state
        };
        self.progress.emit(ProgressEvent {
            kind,
            run_id: run.run_id.clone(),
            phase: phase.as_str().to_string(),
            message: message.into(),
            counters: run.counters,
        });
    }

    async fn execute(&self, request: RunRequest) -> RunLog {
        let started = Instant::now();
        let executed_at = Utc::now();
        let mut run = RunContext::new(&request);

        info!(
            run_id = %run.run_id,
            trigger = request.trigger.as_str(),
            mode = request.mode.as_str(),
            "Run started"
        );
        self.publish(
            &run,
            ProgressKind::Start,
            format!("{} run started", request.mode.as_str()),
        )
        .await;

        let (outcome, error_message) = match self.run_stages(&mut run).await {
            Ok(()) => match run.failure_summary() {
                Some(summary) => (RunOutcome::Partial, Some(summary)),
                None => (RunOutcome::Success, None),
            },
            Err(e) => {
                error!(run_id = %run.run_id, error = %e, "Run failed");
                (RunOutcome::Failure, Some(e.to_string()))
            }
        };

        if outcome == RunOutcome::Failure {
            self.set_state(RunState::Failed).await;
            let message = error_message.clone().unwrap_or_default();
            self.publish(&run, ProgressKind::Error, message).await;
        } else {
            self.set_state(RunState::Done).await;
            self.publish(&run, ProgressKind::Complete, format!("Run finished: {}", outcome.as_str()))
                .await;
        }

        let duration_secs = started.elapsed().as_secs_f64();
        let mut log = RunLog {
            id: 0,
            run_id: run.run_id.clone(),
            executed_at,
            trigger: request.trigger,
            outcome,
            publications_found: run.publications_found,
            publications_scraped: run.touched.len() as u32,
            files_downloaded: run.downloads.downloaded,
            records_extracted: run.extraction.records_extracted,
            error_message: error_message.clone(),
            duration_secs,
            details: RunDetails {
                mode: request.mode,
                publications: run.touched.clone(),
                downloads: run.downloads,
                extraction: run.extraction.clone(),
            },
        };

        let mut last_error = error_message;
        match self.run_logs.insert(&log) {
            Ok(id) => log.id = id,
            Err(e) => {
                error!(run_id = %run.run_id, error = %e, "Failed to record run log");
                last_error = Some(format!("failed to record run log: {}", e));
            }
        }

        RUNS_TOTAL
            .with_label_values(&[outcome.as_str(), request.trigger.as_str()])
            .inc();
        RUN_DURATION
            .with_label_values(&[request.mode.as_str()])
            .observe(duration_secs);

        {
            let mut activity = self.activity.write().await;
            activity.state = RunState::Idle;
            activity.run_id = None;
            activity.trigger = None;
            activity.mode = None;
            activity.started_at = None;
            activity.last_outcome = Some(outcome);
            activity.last_error = last_error;
            activity.last_finished_at = Some(Utc::now());
        }

        info!(
            run_id = %log.run_id,
            outcome = outcome.as_str(),
            files_downloaded = log.files_downloaded,
            records_extracted = log.records_extracted,
            duration_secs,
            "Run finished"
        );
        log
    }

    async fn run_stages(&self, run: &mut RunContext) -> Result<(), CoordinatorError> {
        if run.mode.discovers() {
            let listings = self.discover(run).await?;
            self.set_state(RunState::Downloading).await;
            self.download(run, &listings).await?;
        }

        if run.mode.extracts() {
            self.set_state(RunState::Extracting).await;
            self.extract_pending(run).await?;
        }

        self.finalise(run)
    }

    async fn discover(&self, run: &mut RunContext) -> Result<Vec<Listing>, CoordinatorError> {
        self.publish(run, ProgressKind::Progress, "Discovering publications")
            .await;

        let listings = self.navigator.discover(self.max_publications).await?;
        run.publications_found = listings.len() as u32;
        run.counters.publications_found = run.publications_found;
        PUBLICATIONS_DISCOVERED.inc_by(listings.len() as u64);

        for listing in &listings {
            self.store.upsert_publication(&UpsertPublication {
                id: listing.publication_id.clone(),
                publication_date: listing.publication_date,
                availability_date: listing.availability_date,
            })?;
        }

        info!(
            run_id = %run.run_id,
            count = listings.len(),
            navigator = self.navigator.name(),
            "Discovery finished"
        );
        Ok(listings)
    }

    async fn download(
        &self,
        run: &mut RunContext,
        listings: &[Listing],
    ) -> Result<(), CoordinatorError> {
        let total: usize = listings.iter().map(|l| l.targets.len()).sum();
        run.counters.files_pending = total as u32;
        self.publish(
            run,
            ProgressKind::Progress,
            format!("Downloading {} file(s)", total),
        )
        .await;

        for listing in listings {
            let id = listing.publication_id.as_str();
            run.touch(id);

            if let Some(publication) = self.store.get_publication(id)? {
                // A completed publication reopens only when a file will be
                // replaced; the new row starts with extraction pending.
                let reopen = if publication.status == PublicationStatus::Completed {
                    let mut pending = false;
                    for target in &listing.targets {
                        if self.downloads.needs_transfer(target).await? {
                            pending = true;
                            break;
                        }
                    }
                    pending
                } else {
                    true
                };
                if reopen {
                    self.store
                        .set_publication_status(id, PublicationStatus::Processing, None)?;
                }
            }

            if listing.targets.is_empty() {
                warn!(run_id = %run.run_id, publication_id = id, "Listing has no download forms");
                continue;
            }

            let (tx, mut rx) = mpsc::channel(listing.targets.len());
            let transfer = self.downloads.download_all(&listing.targets, Some(tx));
            let forward = async {
                while let Some(progress) = rx.recv().await {
                    self.on_download(run, progress).await;
                }
            };
            let (result, ()) = tokio::join!(transfer, forward);
            result?;
        }

        Ok(())
    }

    async fn on_download(&self, run: &mut RunContext, progress: DownloadProgress) {
        DOWNLOADS_TOTAL
            .with_label_values(&[progress.outcome.label()])
            .inc();
        run.downloads.record(&progress.outcome);
        run.counters.files_downloaded = run.downloads.downloaded;
        run.counters.files_pending = run.counters.files_pending.saturating_sub(1);

        debug!(
            run_id = %run.run_id,
            publication_id = %progress.publication_id,
            file = %progress.file_name,
            result = progress.outcome.label(),
            "Download target settled"
        );
        self.publish(
            run,
            ProgressKind::Progress,
            format!(
                "{} {} ({}/{})",
                progress.outcome.label(),
                progress.file_name,
                progress.completed,
                progress.total
            ),
        )
        .await;
    }

    async fn extract_pending(&self, run: &mut RunContext) -> Result<(), CoordinatorError> {
        let files = self.store.list_files(
            &FileFilter::new()
                .with_download_status(FileStatus::Completed)
                .with_extraction_status(FileStatus::Pending)
                .with_limit(FILE_SCAN_LIMIT),
        )?;

        run.counters.files_pending = files.len() as u32;
        self.publish(
            run,
            ProgressKind::Progress,
            format!("Extracting {} file(s)", files.len()),
        )
        .await;

        for file in &files {
            run.touch(&file.publication_id);
            self.extract_file(run, file).await?;
            run.counters.files_pending = run.counters.files_pending.saturating_sub(1);
            self.publish(
                run,
                ProgressKind::Progress,
                format!("Extracted {}", file.file_name),
            )
            .await;
        }

        Ok(())
    }

    async fn extract_file(
        &self,
        run: &mut RunContext,
        file: &AcquiredFile,
    ) -> Result<(), CoordinatorError> {
        self.store.mark_extraction_started(file.id)?;

        let timer = EXTRACTION_DURATION.with_label_values(&[]).start_timer();
        let extractor = Arc::clone(&self.extractor);
        let path = file.path.clone();
        let cancelled = Arc::new(AtomicBool::new(false));
        let task = {
            let cancelled = Arc::clone(&cancelled);
            tokio::task::spawn_blocking(move || {
                extract_and_parse(extractor.as_ref(), &path, &cancelled)
            })
        };

        let result = match tokio::time::timeout(self.extraction_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ExtractionError::Unreadable(format!(
                "extraction task failed: {}",
                e
            ))),
            Err(_) => {
                cancelled.store(true, Ordering::SeqCst);
                Err(ExtractionError::Timeout(self.extraction_timeout.as_secs()))
            }
        };
        timer.observe_duration();

        run.extraction.files_processed += 1;
        match result {
            Ok(parsed) => {
                let updated = self
                    .store
                    .complete_extraction(file.id, &parsed.outcome.records)?;
                let skipped = parsed.outcome.stats.skipped_blocks;

                run.extraction.records_extracted += updated.records_extracted;
                run.extraction.skipped_blocks += skipped;
                run.counters.records_extracted = run.extraction.records_extracted;

                EXTRACTIONS_TOTAL.with_label_values(&["completed"]).inc();
                RECORDS_EXTRACTED.inc_by(u64::from(updated.records_extracted));
                BLOCKS_SKIPPED.inc_by(u64::from(skipped));
                PAGES_FAILED.inc_by(u64::from(parsed.pages_failed));

                info!(
                    run_id = %run.run_id,
                    publication_id = %file.publication_id,
                    file = %file.file_name,
                    records = updated.records_extracted,
                    skipped_blocks = skipped,
                    pages_failed = parsed.pages_failed,
                    "Extracted records"
                );
            }
            Err(e) => {
                warn!(
                    run_id = %run.run_id,
                    file = %file.file_name,
                    extractor = self.extractor.name(),
                    error = %e,
                    "Extraction failed"
                );
                self.store.mark_extraction_failed(file.id, &e.to_string())?;
                run.extraction.files_failed += 1;
                EXTRACTIONS_TOTAL.with_label_values(&["failed"]).inc();
            }
        }

        Ok(())
    }

    /// Recompute counters and settle the status of every touched publication.
    fn finalise(&self, run: &mut RunContext) -> Result<(), CoordinatorError> {
        for id in run.touched.clone() {
            let publication = self.store.refresh_publication_counts(&id)?;
            let files = self.store.list_files(
                &FileFilter::new()
                    .with_publication(id.as_str())
                    .with_limit(FILE_SCAN_LIMIT),
            )?;

            let next = if publication.file_count == 0 {
                Some((PublicationStatus::Error, Some("No files downloaded")))
            } else if files.iter().all(|f| f.extraction_status.is_final()) {
                Some((PublicationStatus::Completed, None))
            } else {
                None
            };

            if let Some((status, message)) = next {
                if status == PublicationStatus::Error {
                    warn!(run_id = %run.run_id, publication_id = %id, "No files downloaded");
                    run.publication_errors += 1;
                }
                if publication.status.can_advance_to(status) {
                    self.store.set_publication_status(&id, status, message)?;
                }
            }

            debug!(
                run_id = %run.run_id,
                publication_id = %id,
                file_count = publication.file_count,
                record_count = publication.record_count,
                "Publication finalised"
            );
        }
        Ok(())
    }
}

/// Drives pipeline runs and enforces that at most one is active.
///
/// Manual and scheduled triggers share one capacity-1 channel consumed by a
/// background worker started with [`RunCoordinator::start`].
pub struct RunCoordinator {
    inner: Arc<Inner>,
    running: Arc<AtomicBool>,
    request_tx: mpsc::Sender<RunRequest>,
    request_rx: Mutex<Option<mpsc::Receiver<RunRequest>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl RunCoordinator {
    /// Create a new coordinator. The worker is not started.
    pub fn new(
        config: &Config,
        store: Arc<dyn PublicationStore>,
        run_logs: Arc<dyn RunLogStore>,
        navigator: Arc<dyn PortalNavigator>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        let (request_tx, request_rx) = mpsc::channel(1);
        let (shutdown_tx, _) = broadcast::channel(1);

        let downloads = DownloadManager::new(
            Arc::clone(&store),
            Arc::clone(&navigator),
            &config.downloads,
        );

        let inner = Inner {
            max_publications: config.coordinator.max_publications,
            download_root: config.downloads.root.clone(),
            extraction_timeout: Duration::from_secs(config.extraction.timeout_secs),
            store,
            run_logs,
            navigator,
            extractor,
            downloads,
            progress: ProgressBroadcaster::new(config.coordinator.progress_capacity),
            activity: RwLock::new(Activity::default()),
        };

        Self {
            inner: Arc::new(inner),
            running: Arc::new(AtomicBool::new(false)),
            request_tx,
            request_rx: Mutex::new(Some(request_rx)),
            shutdown_tx,
        }
    }

    /// Start the background worker.
    pub async fn start(&self) {
        let Some(mut rx) = self.request_rx.lock().await.take() else {
            warn!("Run worker already started");
            return;
        };
        self.running.store(true, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        let running = Arc::clone(&self.running);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Run worker started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Run worker received shutdown signal");
                        break;
                    }
                    request = rx.recv() => match request {
                        Some(request) => {
                            inner.execute(request).await;
                        }
                        None => break,
                    }
                }
            }

            running.store(false, Ordering::SeqCst);
            rx.close();
            while let Ok(request) = rx.try_recv() {
                warn!(run_id = %request.run_id, "Dropping run queued at shutdown");
                inner.release().await;
            }
            info!("Run worker stopped");
        });
    }

    /// Stop the background worker once the active run, if any, finishes.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Run worker not running");
            return;
        }
        info!("Stopping run worker");
        let _ = self.shutdown_tx.send(());
    }

    /// Claim the coordinator and hand the run to the worker.
    ///
    /// Returns the run id immediately.
    pub async fn trigger(&self, trigger: TriggerKind, mode: RunMode) -> Result<String, TriggerError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(TriggerError::WorkerUnavailable);
        }

        let run_id = self.inner.claim(trigger, mode).await?;
        let request = RunRequest {
            run_id: run_id.clone(),
            trigger,
            mode,
        };
        if let Err(e) = self.request_tx.try_send(request) {
            warn!(error = %e, "Run worker did not accept the request");
            self.inner.release().await;
            return Err(TriggerError::WorkerUnavailable);
        }

        info!(
            run_id = %run_id,
            trigger = trigger.as_str(),
            mode = mode.as_str(),
            "Run triggered"
        );
        Ok(run_id)
    }

    /// Claim the coordinator and execute the run on the current task.
    pub async fn run_now(&self, trigger: TriggerKind, mode: RunMode) -> Result<RunLog, TriggerError> {
        let run_id = self.inner.claim(trigger, mode).await?;
        Ok(self
            .inner
            .execute(RunRequest {
                run_id,
                trigger,
                mode,
            })
            .await)
    }

    /// Current state, counters and last result.
    pub async fn status(&self) -> CoordinatorStatus {
        let activity = self.inner.activity.read().await;
        CoordinatorStatus {
            state: activity.state,
            worker_running: self.running.load(Ordering::Relaxed),
            run_id: activity.run_id.clone(),
            trigger: activity.trigger,
            mode: activity.mode,
            started_at: activity.started_at,
            counters: activity.counters,
            last_outcome: activity.last_outcome,
            last_error: activity.last_error.clone(),
            last_finished_at: activity.last_finished_at,
        }
    }

    /// Subscribe to progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.inner.progress.subscribe()
    }

    /// Delete every publication, run log and downloaded file.
    ///
    /// Holds the state lock throughout, so no run can start meanwhile.
    pub async fn cleanup(&self) -> Result<CleanupSummary, CoordinatorError> {
        let inner = &self.inner;
        let activity = inner.activity.write().await;
        if !activity.state.is_idle() {
            return Err(CoordinatorError::Busy(activity.state));
        }

        let publications_deleted = inner.store.delete_all()?;
        let run_logs_deleted = inner.run_logs.delete_all()?;
        let download_dir_removed = match tokio::fs::remove_dir_all(&inner.download_root).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        drop(activity);

        info!(
            publications_deleted,
            run_logs_deleted,
            download_dir_removed,
            root = %inner.download_root.display(),
            "Cleanup finished"
        );
        Ok(CleanupSummary {
            publications_deleted,
            run_logs_deleted,
            download_dir_removed,
        })
    }
}
