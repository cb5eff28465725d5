use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{RunLog, RunOutcome, TriggerKind};

#[derive(Debug, Error)]
pub enum RunLogError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Filter for querying run logs
#[derive(Debug, Clone, Default)]
pub struct RunLogFilter {
    pub trigger: Option<TriggerKind>,
    pub outcome: Option<RunOutcome>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl RunLogFilter {
    pub fn new() -> Self {
        Self {
            limit: 20,
            offset: 0,
            ..Default::default()
        }
    }

    pub fn with_trigger(mut self, trigger: TriggerKind) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_outcome(mut self, outcome: RunOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn with_time_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for run log storage
pub trait RunLogStore: Send + Sync {
    /// Insert a run log, returns the assigned ID
    fn insert(&self, log: &RunLog) -> Result<i64, RunLogError>;

    /// Query run logs, newest first
    fn query(&self, filter: &RunLogFilter) -> Result<Vec<RunLog>, RunLogError>;

    /// Count matching run logs
    fn count(&self, filter: &RunLogFilter) -> Result<i64, RunLogError>;

    /// Most recent run log, if any
    fn latest(&self) -> Result<Option<RunLog>, RunLogError> {
        Ok(self
            .query(&RunLogFilter::new().with_limit(1))?
            .into_iter()
            .next())
    }

    /// Delete every run log, returns the number removed
    fn delete_all(&self) -> Result<usize, RunLogError>;
}
