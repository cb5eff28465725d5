pub mod config;
pub mod coordinator;
pub mod downloader;
pub mod extractor;
pub mod metrics;
pub mod navigator;
pub mod parser;
pub mod progress;
pub mod publication;
pub mod runlog;
pub mod scheduler;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, CoordinatorConfig,
    DownloadConfig, ExtractionConfig, PortalConfig, SchedulerConfig,
};
pub use coordinator::{
    CleanupSummary, CoordinatorError, CoordinatorStatus, RunCoordinator, RunState, TriggerError,
};
pub use downloader::{DownloadError, DownloadManager, DownloadOutcome, DownloadStats};
pub use extractor::{ExtractionError, PageText, PdfToTextExtractor, TextExtractor};
pub use navigator::{DownloadTarget, HttpPortalNavigator, Listing, NavigatorError, PortalNavigator};
pub use parser::{parse_pages, parse_text, ParseOutcome, ParseStats};
pub use progress::{ProgressBroadcaster, ProgressCounters, ProgressEvent, ProgressKind};
pub use publication::{
    AcquiredFile, ExtractedRecord, FileFilter, FileStatus, Publication, PublicationFilter,
    PublicationStatus, PublicationStore, RecordFields, RecordFilter, SqlitePublicationStore,
    StoreError,
};
pub use runlog::{
    RunLog, RunLogError, RunLogFilter, RunLogStore, RunMode, RunOutcome, SqliteRunLogStore,
    TriggerKind,
};
pub use scheduler::{Scheduler, SchedulerError, WeeklySchedule};
