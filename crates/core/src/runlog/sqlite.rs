use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{RunDetails, RunLog, RunLogError, RunLogFilter, RunLogStore, RunOutcome, TriggerKind};

/// SQLite-backed run log store
pub struct SqliteRunLogStore {
    conn: Mutex<Connection>,
}

impl SqliteRunLogStore {
    /// Create a new SQLite run log store, creating the database file and tables if needed
    pub fn new(path: &Path) -> Result<Self, RunLogError> {
        let conn = Connection::open(path).map_err(|e| RunLogError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite run log store (useful for testing)
    pub fn in_memory() -> Result<Self, RunLogError> {
        let conn =
            Connection::open_in_memory().map_err(|e| RunLogError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), RunLogError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS run_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL UNIQUE,
                executed_at TEXT NOT NULL,
                trigger_kind TEXT NOT NULL,
                outcome TEXT NOT NULL,
                publications_found INTEGER NOT NULL DEFAULT 0,
                publications_scraped INTEGER NOT NULL DEFAULT 0,
                files_downloaded INTEGER NOT NULL DEFAULT 0,
                records_extracted INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                duration_secs REAL NOT NULL,
                details TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_run_logs_executed_at ON run_logs(executed_at);
            CREATE INDEX IF NOT EXISTS idx_run_logs_outcome ON run_logs(outcome);
            "#,
        )
        .map_err(|e| RunLogError::Database(e.to_string()))?;

        Ok(())
    }

    fn build_where_clause(filter: &RunLogFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(trigger) = filter.trigger {
            conditions.push("trigger_kind = ?");
            params.push(Box::new(trigger.as_str()));
        }

        if let Some(outcome) = filter.outcome {
            conditions.push("outcome = ?");
            params.push(Box::new(outcome.as_str()));
        }

        if let Some(ref from) = filter.from {
            conditions.push("executed_at >= ?");
            params.push(Box::new(from.to_rfc3339()));
        }

        if let Some(ref to) = filter.to {
            conditions.push("executed_at <= ?");
            params.push(Box::new(to.to_rfc3339()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }
}

impl RunLogStore for SqliteRunLogStore {
    fn insert(&self, log: &RunLog) -> Result<i64, RunLogError> {
        let conn = self.conn.lock().unwrap();

        let details_json = serde_json::to_string(&log.details)
            .map_err(|e| RunLogError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO run_logs (run_id, executed_at, trigger_kind, outcome, publications_found, publications_scraped, files_downloaded, records_extracted, error_message, duration_secs, details) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                log.run_id,
                log.executed_at.to_rfc3339(),
                log.trigger.as_str(),
                log.outcome.as_str(),
                log.publications_found,
                log.publications_scraped,
                log.files_downloaded,
                log.records_extracted,
                log.error_message,
                log.duration_secs,
                details_json,
            ],
        )
        .map_err(|e| RunLogError::Database(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &RunLogFilter) -> Result<Vec<RunLog>, RunLogError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT id, run_id, executed_at, trigger_kind, outcome, publications_found, publications_scraped, files_downloaded, records_extracted, error_message, duration_secs, details FROM run_logs {} ORDER BY executed_at DESC, id DESC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| RunLogError::Database(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                let executed_at: String = row.get(2)?;
                let trigger: String = row.get(3)?;
                let outcome: String = row.get(4)?;
                let details_json: String = row.get(11)?;

                Ok((
                    RunLog {
                        id: row.get(0)?,
                        run_id: row.get(1)?,
                        executed_at: Utc::now(),
                        trigger: TriggerKind::Manual,
                        outcome: RunOutcome::Failure,
                        publications_found: row.get(5)?,
                        publications_scraped: row.get(6)?,
                        files_downloaded: row.get(7)?,
                        records_extracted: row.get(8)?,
                        error_message: row.get(9)?,
                        duration_secs: row.get(10)?,
                        details: RunDetails::default(),
                    },
                    executed_at,
                    trigger,
                    outcome,
                    details_json,
                ))
            })
            .map_err(|e| RunLogError::Database(e.to_string()))?;

        let mut logs = Vec::new();
        for row_result in rows {
            let (mut log, executed_at, trigger, outcome, details_json) =
                row_result.map_err(|e| RunLogError::Database(e.to_string()))?;

            log.executed_at = DateTime::parse_from_rfc3339(&executed_at)
                .map_err(|e| RunLogError::Database(format!("Invalid timestamp: {}", e)))?
                .into();
            log.trigger = TriggerKind::parse(&trigger)
                .ok_or_else(|| RunLogError::Database(format!("Invalid trigger: {}", trigger)))?;
            log.outcome = RunOutcome::parse(&outcome)
                .ok_or_else(|| RunLogError::Database(format!("Invalid outcome: {}", outcome)))?;
            log.details = serde_json::from_str(&details_json)
                .map_err(|e| RunLogError::Serialization(e.to_string()))?;

            logs.push(log);
        }

        Ok(logs)
    }

    fn count(&self, filter: &RunLogFilter) -> Result<i64, RunLogError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!("SELECT COUNT(*) FROM run_logs {}", where_clause);

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let count: i64 = conn
            .query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| RunLogError::Database(e.to_string()))?;

        Ok(count)
    }

    fn delete_all(&self) -> Result<usize, RunLogError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM run_logs", [])
            .map_err(|e| RunLogError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runlog::{ExtractionStats, RunMode};
    use chrono::Duration;

    fn create_test_store() -> SqliteRunLogStore {
        SqliteRunLogStore::in_memory().unwrap()
    }

    fn create_log(run_id: &str, trigger: TriggerKind, outcome: RunOutcome) -> RunLog {
        RunLog {
            id: 0,
            run_id: run_id.to_string(),
            executed_at: Utc::now(),
            trigger,
            outcome,
            publications_found: 2,
            publications_scraped: 2,
            files_downloaded: 4,
            records_extracted: 120,
            error_message: None,
            duration_secs: 12.5,
            details: RunDetails {
                mode: RunMode::Full,
                publications: vec!["2237".to_string(), "2236".to_string()],
                extraction: ExtractionStats {
                    files_processed: 4,
                    records_extracted: 120,
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_insert_and_query() {
        let store = create_test_store();
        let log = create_log("run-1", TriggerKind::Manual, RunOutcome::Success);

        let id = store.insert(&log).unwrap();
        assert!(id > 0);

        let results = store.query(&RunLogFilter::new()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, id);
        assert_eq!(results[0].run_id, "run-1");
        assert_eq!(results[0].trigger, TriggerKind::Manual);
        assert_eq!(results[0].outcome, RunOutcome::Success);
        assert_eq!(results[0].records_extracted, 120);
        assert_eq!(results[0].details, log.details);
    }

    #[test]
    fn test_latest_returns_newest() {
        let store = create_test_store();
        let mut older = create_log("run-1", TriggerKind::Scheduled, RunOutcome::Success);
        older.executed_at = Utc::now() - Duration::hours(2);
        store.insert(&older).unwrap();
        store
            .insert(&create_log("run-2", TriggerKind::Manual, RunOutcome::Partial))
            .unwrap();

        let latest = store.latest().unwrap().unwrap();
        assert_eq!(latest.run_id, "run-2");
        assert_eq!(latest.outcome, RunOutcome::Partial);
    }

    #[test]
    fn test_latest_empty() {
        let store = create_test_store();
        assert!(store.latest().unwrap().is_none());
    }

    #[test]
    fn test_filter_by_trigger_and_outcome() {
        let store = create_test_store();
        store
            .insert(&create_log("run-1", TriggerKind::Scheduled, RunOutcome::Success))
            .unwrap();
        store
            .insert(&create_log("run-2", TriggerKind::Manual, RunOutcome::Failure))
            .unwrap();
        store
            .insert(&create_log("run-3", TriggerKind::Manual, RunOutcome::Success))
            .unwrap();

        let manual = RunLogFilter::new().with_trigger(TriggerKind::Manual);
        assert_eq!(store.count(&manual).unwrap(), 2);

        let failed = store
            .query(&RunLogFilter::new().with_outcome(RunOutcome::Failure))
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].run_id, "run-2");
    }

    #[test]
    fn test_time_range_and_pagination() {
        let store = create_test_store();
        for i in 0..5 {
            let mut log = create_log(&format!("run-{}", i), TriggerKind::Manual, RunOutcome::Success);
            log.executed_at = Utc::now() - Duration::days(i);
            store.insert(&log).unwrap();
        }

        let recent = RunLogFilter::new().with_time_range(Some(Utc::now() - Duration::hours(36)), None);
        assert_eq!(store.count(&recent).unwrap(), 2);

        let page = store
            .query(&RunLogFilter::new().with_limit(2).with_offset(2))
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].run_id, "run-2");
    }

    #[test]
    fn test_duplicate_run_id_rejected() {
        let store = create_test_store();
        store
            .insert(&create_log("run-1", TriggerKind::Manual, RunOutcome::Success))
            .unwrap();
        let result = store.insert(&create_log("run-1", TriggerKind::Manual, RunOutcome::Success));
        assert!(matches!(result, Err(RunLogError::Database(_))));
    }

    #[test]
    fn test_delete_all() {
        let store = create_test_store();
        store
            .insert(&create_log("run-1", TriggerKind::Manual, RunOutcome::Success))
            .unwrap();
        assert_eq!(store.delete_all().unwrap(), 1);
        assert_eq!(store.count(&RunLogFilter::new()).unwrap(), 0);
    }
}
