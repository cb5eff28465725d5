//! Download manager.
//!
//! Fetches publication files through the portal navigator and reconciles the
//! download directory with the publication store:
//!
//! - a completed row whose file is present and non-empty is skipped
//! - a completed row whose file is missing or empty is dropped and fetched again
//! - a non-empty file with no row is adopted without a network request
//!
//! Files are written to a `.part` sibling and renamed into place only after
//! the transfer finished with a non-zero size.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::DownloadConfig;
use crate::navigator::{DownloadTarget, NavigatorError, PortalNavigator};
use crate::publication::{FileStatus, NewAcquiredFile, PublicationStore, StoreError};

/// Why a single file could not be fetched.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Navigator error: {0}")]
    Navigator(#[from] NavigatorError),

    #[error("Download timed out after {0}s")]
    Timeout(u64),

    #[error("Portal returned an empty file")]
    Empty,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DownloadOutcome {
    Downloaded { bytes: u64 },
    /// Re-downloaded after the recorded file went missing.
    Healed { bytes: u64 },
    /// Untracked file already on disk, recorded without fetching.
    Adopted { bytes: u64 },
    Skipped,
    Failed { message: String },
}

impl DownloadOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DownloadOutcome::Downloaded { .. } => "downloaded",
            DownloadOutcome::Healed { .. } => "healed",
            DownloadOutcome::Adopted { .. } => "adopted",
            DownloadOutcome::Skipped => "skipped",
            DownloadOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, DownloadOutcome::Failed { .. })
    }
}

/// Totals for one download pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStats {
    pub downloaded: u32,
    pub skipped: u32,
    pub adopted: u32,
    pub healed: u32,
    pub failed: u32,
}

impl DownloadStats {
    pub fn record(&mut self, outcome: &DownloadOutcome) {
        match outcome {
            DownloadOutcome::Downloaded { .. } => self.downloaded += 1,
            DownloadOutcome::Healed { .. } => {
                self.healed += 1;
                self.downloaded += 1;
            }
            DownloadOutcome::Adopted { .. } => self.adopted += 1,
            DownloadOutcome::Skipped => self.skipped += 1,
            DownloadOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Files that are present on disk after the pass.
    pub fn available(&self) -> u32 {
        self.downloaded + self.adopted + self.skipped
    }
}

/// Progress update sent after each target.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    pub publication_id: String,
    pub file_name: String,
    pub outcome: DownloadOutcome,
    pub completed: usize,
    pub total: usize,
}

/// Downloads targets one at a time into `<root>/<publication>/<file>`.
pub struct DownloadManager {
    store: Arc<dyn PublicationStore>,
    navigator: Arc<dyn PortalNavigator>,
    root: PathBuf,
    timeout: Duration,
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn size_on_disk(path: &Path) -> Option<u64> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        _ => None,
    }
}

impl DownloadManager {
    pub fn new(
        store: Arc<dyn PublicationStore>,
        navigator: Arc<dyn PortalNavigator>,
        config: &DownloadConfig,
    ) -> Self {
        Self {
            store,
            navigator,
            root: config.root.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Local path of a target.
    pub fn file_path(&self, target: &DownloadTarget) -> PathBuf {
        self.root.join(&target.publication_id).join(&target.file_name)
    }

    fn new_file(&self, target: &DownloadTarget) -> NewAcquiredFile {
        NewAcquiredFile {
            publication_id: target.publication_id.clone(),
            file_name: target.file_name.clone(),
            path: self.file_path(target),
            class_range: target.class_range.clone(),
            source_url: target.action_url.clone(),
        }
    }

    /// Whether [`download_one`](Self::download_one) would change anything
    /// for `target`, i.e. it would not be skipped.
    pub async fn needs_transfer(&self, target: &DownloadTarget) -> Result<bool, StoreError> {
        let existing = self
            .store
            .get_file(&target.publication_id, &target.file_name)?;
        let satisfied = match existing {
            Some(file) => {
                file.download_status == FileStatus::Completed
                    && size_on_disk(&self.file_path(target))
                        .await
                        .is_some_and(|size| size > 0)
            }
            None => false,
        };
        Ok(!satisfied)
    }

    /// Bring one target to a downloaded state.
    ///
    /// Transfer failures are recorded on the file row and reported as
    /// [`DownloadOutcome::Failed`]; only store errors are returned.
    pub async fn download_one(&self, target: &DownloadTarget) -> Result<DownloadOutcome, StoreError> {
        let path = self.file_path(target);
        let on_disk = size_on_disk(&path).await;
        let existing = self
            .store
            .get_file(&target.publication_id, &target.file_name)?;

        let mut healed = false;
        match existing {
            Some(file) => {
                let completed = file.download_status == FileStatus::Completed;
                if completed && on_disk.is_some_and(|size| size > 0) {
                    debug!(file = %path.display(), "Already downloaded");
                    return Ok(DownloadOutcome::Skipped);
                }
                if completed {
                    warn!(
                        file = %path.display(),
                        "Recorded file missing or empty, downloading again"
                    );
                    healed = true;
                }
                self.store.delete_file(file.id)?;
            }
            None => match on_disk {
                Some(size) if size > 0 => {
                    info!(file = %path.display(), size, "Adopting untracked file");
                    self.store.adopt_file(&self.new_file(target), size)?;
                    return Ok(DownloadOutcome::Adopted { bytes: size });
                }
                Some(_) => {
                    debug!(file = %path.display(), "Removing empty untracked file");
                    if let Err(e) = fs::remove_file(&path).await {
                        warn!(file = %path.display(), error = %e, "Failed to remove empty file");
                    }
                }
                None => {}
            },
        }

        let record = self.store.create_file(&self.new_file(target))?;
        match self.fetch(target, &path).await {
            Ok(bytes) => {
                self.store.mark_downloaded(record.id, bytes)?;
                info!(file = %path.display(), bytes, "Downloaded");
                Ok(if healed {
                    DownloadOutcome::Healed { bytes }
                } else {
                    DownloadOutcome::Downloaded { bytes }
                })
            }
            Err(e) => {
                warn!(identity = %target.identity(), error = %e, "Download failed");
                let message = e.to_string();
                self.store.mark_download_failed(record.id, &message)?;
                Ok(DownloadOutcome::Failed { message })
            }
        }
    }

    async fn fetch(&self, target: &DownloadTarget, path: &Path) -> Result<u64, DownloadError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let part = part_path(path);
        let result: Result<u64, DownloadError> = async {
            let mut file = File::create(&part).await?;
            let bytes = tokio::time::timeout(
                self.timeout,
                self.navigator.submit_form(target, &mut file),
            )
            .await
            .map_err(|_| DownloadError::Timeout(self.timeout.as_secs()))??;
            file.flush().await?;
            file.sync_all().await?;
            if bytes == 0 {
                return Err(DownloadError::Empty);
            }
            Ok(bytes)
        }
        .await;

        match result {
            Ok(bytes) => {
                fs::rename(&part, path).await?;
                Ok(bytes)
            }
            Err(e) => {
                let _ = fs::remove_file(&part).await;
                Err(e)
            }
        }
    }

    /// Download every target sequentially.
    pub async fn download_all(
        &self,
        targets: &[DownloadTarget],
        progress_tx: Option<mpsc::Sender<DownloadProgress>>,
    ) -> Result<DownloadStats, StoreError> {
        let mut stats = DownloadStats::default();
        let total = targets.len();

        for (idx, target) in targets.iter().enumerate() {
            let outcome = self.download_one(target).await?;
            stats.record(&outcome);

            if let Some(ref tx) = progress_tx {
                let progress = DownloadProgress {
                    publication_id: target.publication_id.clone(),
                    file_name: target.file_name.clone(),
                    outcome,
                    completed: idx + 1,
                    total,
                };
                let _ = tx.try_send(progress);
            }
        }

        info!(
            downloaded = stats.downloaded,
            skipped = stats.skipped,
            adopted = stats.adopted,
            failed = stats.failed,
            "Download pass finished"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publication::{SqlitePublicationStore, UpsertPublication};
    use crate::testing::{fixtures, MockNavigator};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    struct Setup {
        _dir: TempDir,
        store: Arc<SqlitePublicationStore>,
        navigator: Arc<MockNavigator>,
        manager: DownloadManager,
    }

    fn setup() -> Setup {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqlitePublicationStore::in_memory().unwrap());
        store
            .upsert_publication(&UpsertPublication {
                id: "2237".to_string(),
                publication_date: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
                availability_date: None,
            })
            .unwrap();
        let navigator = Arc::new(MockNavigator::new());
        let manager = DownloadManager::new(
            store.clone(),
            navigator.clone(),
            &DownloadConfig {
                root: dir.path().to_path_buf(),
                timeout_secs: 5,
            },
        );
        Setup {
            _dir: dir,
            store,
            navigator,
            manager,
        }
    }

    #[tokio::test]
    async fn test_download_then_skip() {
        let s = setup();
        let target = fixtures::target("2237", "1-34");

        let outcome = s.manager.download_one(&target).await.unwrap();
        assert!(matches!(outcome, DownloadOutcome::Downloaded { bytes } if bytes > 0));

        let path = s.manager.file_path(&target);
        assert!(path.is_file());
        assert!(!part_path(&path).exists());

        let file = s.store.get_file("2237", &target.file_name).unwrap().unwrap();
        assert_eq!(file.download_status, FileStatus::Completed);
        assert_eq!(file.extraction_status, FileStatus::Pending);

        let outcome = s.manager.download_one(&target).await.unwrap();
        assert_eq!(outcome, DownloadOutcome::Skipped);
        assert_eq!(s.navigator.submit_count().await, 1);
    }

    #[tokio::test]
    async fn test_zero_byte_file_is_healed() {
        let s = setup();
        let target = fixtures::target("2237", "1-34");
        s.manager.download_one(&target).await.unwrap();

        let path = s.manager.file_path(&target);
        std::fs::write(&path, b"").unwrap();

        let outcome = s.manager.download_one(&target).await.unwrap();
        assert!(matches!(outcome, DownloadOutcome::Healed { .. }));
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
        assert_eq!(s.navigator.submit_count().await, 2);
    }

    #[tokio::test]
    async fn test_needs_transfer() {
        let s = setup();
        let target = fixtures::target("2237", "1-34");
        assert!(s.manager.needs_transfer(&target).await.unwrap());

        s.manager.download_one(&target).await.unwrap();
        assert!(!s.manager.needs_transfer(&target).await.unwrap());

        std::fs::write(s.manager.file_path(&target), b"").unwrap();
        assert!(s.manager.needs_transfer(&target).await.unwrap());
    }

    #[tokio::test]
    async fn test_orphan_is_adopted() {
        let s = setup();
        let target = fixtures::target("2237", "35-45");
        let path = s.manager.file_path(&target);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"%PDF-1.4 orphan").unwrap();

        let outcome = s.manager.download_one(&target).await.unwrap();
        assert_eq!(outcome, DownloadOutcome::Adopted { bytes: 15 });
        assert_eq!(s.navigator.submit_count().await, 0);

        let file = s.store.get_file("2237", &target.file_name).unwrap().unwrap();
        assert_eq!(file.download_status, FileStatus::Completed);
        assert_eq!(file.size_bytes, 15);
    }

    #[tokio::test]
    async fn test_failure_recorded_and_no_partial_file() {
        let s = setup();
        let target = fixtures::target("2237", "1-34");
        s.navigator.fail_target(&target.identity()).await;

        let outcome = s.manager.download_one(&target).await.unwrap();
        assert!(outcome.is_failure());

        let path = s.manager.file_path(&target);
        assert!(!path.exists());
        assert!(!part_path(&path).exists());

        let file = s.store.get_file("2237", &target.file_name).unwrap().unwrap();
        assert_eq!(file.download_status, FileStatus::Error);
        assert_eq!(file.extraction_status, FileStatus::Error);
        assert!(file.error_message.is_some());
    }

    #[tokio::test]
    async fn test_empty_response_is_failure() {
        let s = setup();
        let target = fixtures::target("2237", "1-34");
        s.navigator.set_content(&target.file_name, Vec::new()).await;

        let outcome = s.manager.download_one(&target).await.unwrap();
        assert!(matches!(outcome, DownloadOutcome::Failed { ref message } if message.contains("empty")));
        assert!(!s.manager.file_path(&target).exists());
    }

    #[tokio::test]
    async fn test_failed_row_is_retried() {
        let s = setup();
        let target = fixtures::target("2237", "1-34");
        s.navigator.fail_target(&target.identity()).await;
        s.manager.download_one(&target).await.unwrap();

        s.navigator.clear_failures().await;
        let outcome = s.manager.download_one(&target).await.unwrap();
        assert!(matches!(outcome, DownloadOutcome::Downloaded { .. }));
    }

    #[tokio::test]
    async fn test_download_all_reports_progress() {
        let s = setup();
        let targets = vec![
            fixtures::target("2237", "1-34"),
            fixtures::target("2237", "35-45"),
        ];
        s.navigator.fail_target(&targets[1].identity()).await;

        let (tx, mut rx) = mpsc::channel(8);
        let stats = s.manager.download_all(&targets, Some(tx)).await.unwrap();
        assert_eq!(
            stats,
            DownloadStats {
                downloaded: 1,
                failed: 1,
                ..Default::default()
            }
        );

        let first = rx.recv().await.unwrap();
        assert_eq!(first.completed, 1);
        assert_eq!(first.total, 2);
        let second = rx.recv().await.unwrap();
        assert!(second.outcome.is_failure());
    }

    #[test]
    fn test_stats_record() {
        let mut stats = DownloadStats::default();
        stats.record(&DownloadOutcome::Healed { bytes: 3 });
        stats.record(&DownloadOutcome::Adopted { bytes: 3 });
        stats.record(&DownloadOutcome::Skipped);
        assert_eq!(stats.downloaded, 1);
        assert_eq!(stats.healed, 1);
        assert_eq!(stats.available(), 3);
    }
}
