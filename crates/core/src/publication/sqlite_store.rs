//! SQLite-backed publication store implementation.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    AcquiredFile, ExtractedRecord, FileFilter, FileStatus, NewAcquiredFile, Publication,
    PublicationFilter, PublicationStatus, PublicationStore, RecordFields, RecordFilter,
    StoreError, UpsertPublication,
};

const PUBLICATION_COLUMNS: &str = "id, publication_date, availability_date, discovered_at, file_count, record_count, status, error_message, updated_at";

const FILE_COLUMNS: &str = "id, publication_id, file_name, path, class_range, size_bytes, source_url, downloaded_at, download_status, extraction_status, extracted_at, records_extracted, error_message";

const RECORD_COLUMNS: &str = "id, file_id, publication_id, created_at, application_number, filing_date, name, applicant_name, applicant_address, applicant_type, class_number, description, representative_name, representative_address, usage_since, association, office_location, page_number, raw_text";

/// SQLite-backed publication store.
pub struct SqlitePublicationStore {
    conn: Mutex<Connection>,
}

impl SqlitePublicationStore {
    /// Create a new SQLite publication store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite publication store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS publications (
                id TEXT PRIMARY KEY,
                publication_date TEXT NOT NULL,
                availability_date TEXT,
                discovered_at TEXT NOT NULL,
                file_count INTEGER NOT NULL DEFAULT 0,
                record_count INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                error_message TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS acquired_files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                publication_id TEXT NOT NULL REFERENCES publications(id) ON DELETE CASCADE,
                file_name TEXT NOT NULL,
                path TEXT NOT NULL,
                class_range TEXT NOT NULL,
                size_bytes INTEGER NOT NULL DEFAULT 0,
                source_url TEXT NOT NULL,
                downloaded_at TEXT,
                download_status TEXT NOT NULL,
                extraction_status TEXT NOT NULL,
                extracted_at TEXT,
                records_extracted INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                UNIQUE (publication_id, file_name),
                UNIQUE (id, publication_id)
            );

            CREATE TABLE IF NOT EXISTS extracted_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id INTEGER NOT NULL,
                publication_id TEXT NOT NULL REFERENCES publications(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                application_number TEXT NOT NULL,
                filing_date TEXT,
                name TEXT,
                applicant_name TEXT,
                applicant_address TEXT,
                applicant_type TEXT,
                class_number INTEGER,
                description TEXT,
                representative_name TEXT,
                representative_address TEXT,
                usage_since TEXT,
                association TEXT,
                office_location TEXT,
                page_number INTEGER NOT NULL,
                raw_text TEXT NOT NULL,
                FOREIGN KEY (file_id, publication_id)
                    REFERENCES acquired_files(id, publication_id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_publications_date ON publications(publication_date DESC);
            CREATE INDEX IF NOT EXISTS idx_files_extraction ON acquired_files(extraction_status);
            CREATE INDEX IF NOT EXISTS idx_records_file ON extracted_records(file_id);
            CREATE INDEX IF NOT EXISTS idx_records_publication ON extracted_records(publication_id);
            CREATE INDEX IF NOT EXISTS idx_records_application ON extracted_records(application_number);
            "#,
        )?;

        Ok(())
    }

    fn publication_where(filter: &PublicationFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        (where_clause(&conditions), params)
    }

    fn file_where(filter: &FileFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref publication_id) = filter.publication_id {
            conditions.push("publication_id = ?");
            params.push(Box::new(publication_id.clone()));
        }

        if let Some(status) = filter.download_status {
            conditions.push("download_status = ?");
            params.push(Box::new(status.as_str()));
        }

        if let Some(status) = filter.extraction_status {
            conditions.push("extraction_status = ?");
            params.push(Box::new(status.as_str()));
        }

        (where_clause(&conditions), params)
    }

    fn record_where(filter: &RecordFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref publication_id) = filter.publication_id {
            conditions.push("publication_id = ?");
            params.push(Box::new(publication_id.clone()));
        }

        if let Some(file_id) = filter.file_id {
            conditions.push("file_id = ?");
            params.push(Box::new(file_id));
        }

        if let Some(ref number) = filter.application_number {
            conditions.push("application_number = ?");
            params.push(Box::new(number.clone()));
        }

        (where_clause(&conditions), params)
    }

    fn row_to_publication(row: &rusqlite::Row) -> rusqlite::Result<Publication> {
        let publication_date: String = row.get(1)?;
        let availability_date: Option<String> = row.get(2)?;
        let discovered_at: String = row.get(3)?;
        let status: String = row.get(6)?;
        let updated_at: String = row.get(8)?;

        Ok(Publication {
            id: row.get(0)?,
            // Dates are written by this store, fall back rather than fail the row
            publication_date: parse_date(&publication_date).unwrap_or_default(),
            availability_date: availability_date.as_deref().and_then(parse_date),
            discovered_at: parse_timestamp(&discovered_at),
            file_count: row.get(4)?,
            record_count: row.get(5)?,
            status: PublicationStatus::parse(&status).unwrap_or(PublicationStatus::Pending),
            error_message: row.get(7)?,
            updated_at: parse_timestamp(&updated_at),
        })
    }

    fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<AcquiredFile> {
        let path: String = row.get(3)?;
        let size_bytes: i64 = row.get(5)?;
        let downloaded_at: Option<String> = row.get(7)?;
        let download_status: String = row.get(8)?;
        let extraction_status: String = row.get(9)?;
        let extracted_at: Option<String> = row.get(10)?;

        Ok(AcquiredFile {
            id: row.get(0)?,
            publication_id: row.get(1)?,
            file_name: row.get(2)?,
            path: PathBuf::from(path),
            class_range: row.get(4)?,
            size_bytes: size_bytes.max(0) as u64,
            source_url: row.get(6)?,
            downloaded_at: downloaded_at.as_deref().map(parse_timestamp),
            download_status: FileStatus::parse(&download_status).unwrap_or(FileStatus::Pending),
            extraction_status: FileStatus::parse(&extraction_status)
                .unwrap_or(FileStatus::Pending),
            extracted_at: extracted_at.as_deref().map(parse_timestamp),
            records_extracted: row.get(11)?,
            error_message: row.get(12)?,
        })
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<ExtractedRecord> {
        let created_at: String = row.get(3)?;
        let filing_date: Option<String> = row.get(5)?;

        Ok(ExtractedRecord {
            id: row.get(0)?,
            file_id: row.get(1)?,
            publication_id: row.get(2)?,
            created_at: parse_timestamp(&created_at),
            fields: RecordFields {
                application_number: row.get(4)?,
                filing_date: filing_date.as_deref().and_then(parse_date),
                name: row.get(6)?,
                applicant_name: row.get(7)?,
                applicant_address: row.get(8)?,
                applicant_type: row.get(9)?,
                class_number: row.get(10)?,
                description: row.get(11)?,
                representative_name: row.get(12)?,
                representative_address: row.get(13)?,
                usage_since: row.get(14)?,
                association: row.get(15)?,
                office_location: row.get(16)?,
                page_number: row.get(17)?,
                raw_text: row.get(18)?,
            },
        })
    }

    fn fetch_publication(conn: &Connection, id: &str) -> Result<Publication, StoreError> {
        conn.query_row(
            &format!("SELECT {} FROM publications WHERE id = ?", PUBLICATION_COLUMNS),
            params![id],
            Self::row_to_publication,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound {
            entity: "publication",
            id: id.to_string(),
        })
    }

    fn fetch_file(conn: &Connection, id: i64) -> Result<AcquiredFile, StoreError> {
        conn.query_row(
            &format!("SELECT {} FROM acquired_files WHERE id = ?", FILE_COLUMNS),
            params![id],
            Self::row_to_file,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound {
            entity: "file",
            id: id.to_string(),
        })
    }

    /// Run an UPDATE on one file row and return the refreshed row.
    fn update_file(
        conn: &Connection,
        id: i64,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<AcquiredFile, StoreError> {
        let changed = conn.execute(sql, params)?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "file",
                id: id.to_string(),
            });
        }
        Self::fetch_file(conn, id)
    }

    fn insert_file(
        conn: &Connection,
        file: &NewAcquiredFile,
        download_status: FileStatus,
        size_bytes: u64,
        downloaded_at: Option<DateTime<Utc>>,
    ) -> Result<AcquiredFile, StoreError> {
        conn.execute(
            &format!(
                "INSERT INTO acquired_files ({}) VALUES (NULL, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, 0, NULL)",
                FILE_COLUMNS
            ),
            params![
                file.publication_id,
                file.file_name,
                file.path.to_string_lossy().into_owned(),
                file.class_range,
                size_bytes as i64,
                file.source_url,
                downloaded_at.map(|t| t.to_rfc3339()),
                download_status.as_str(),
                FileStatus::Pending.as_str(),
            ],
        )?;
        Self::fetch_file(conn, conn.last_insert_rowid())
    }
}

impl PublicationStore for SqlitePublicationStore {
    fn upsert_publication(
        &self,
        publication: &UpsertPublication,
    ) -> Result<Publication, StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO publications (id, publication_date, availability_date, discovered_at, status, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?4)
            ON CONFLICT(id) DO UPDATE SET
                publication_date = excluded.publication_date,
                availability_date = excluded.availability_date,
                updated_at = excluded.updated_at
            "#,
            params![
                publication.id,
                publication.publication_date.to_string(),
                publication.availability_date.map(|d| d.to_string()),
                now,
                PublicationStatus::Pending.as_str(),
            ],
        )?;

        Self::fetch_publication(&conn, &publication.id)
    }

    fn get_publication(&self, id: &str) -> Result<Option<Publication>, StoreError> {
        let conn = self.conn.lock().unwrap();
        match Self::fetch_publication(&conn, id) {
            Ok(publication) => Ok(Some(publication)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn list_publications(
        &self,
        filter: &PublicationFilter,
    ) -> Result<Vec<Publication>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let (where_clause, params) = Self::publication_where(filter);

        let sql = format!(
            "SELECT {} FROM publications {} ORDER BY publication_date DESC, id DESC LIMIT ? OFFSET ?",
            PUBLICATION_COLUMNS, where_clause
        );

        let mut all_params = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), Self::row_to_publication)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn count_publications(&self, filter: &PublicationFilter) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let (where_clause, params) = Self::publication_where(filter);
        let sql = format!("SELECT COUNT(*) FROM publications {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        Ok(conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?)
    }

    fn set_publication_status(
        &self,
        id: &str,
        status: PublicationStatus,
        error_message: Option<&str>,
    ) -> Result<Publication, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE publications SET status = ?, error_message = ?, updated_at = ? WHERE id = ?",
            params![status.as_str(), error_message, Utc::now().to_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "publication",
                id: id.to_string(),
            });
        }
        Self::fetch_publication(&conn, id)
    }

    fn refresh_publication_counts(&self, id: &str) -> Result<Publication, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            r#"
            UPDATE publications SET
                file_count = (SELECT COUNT(*) FROM acquired_files
                              WHERE publication_id = ?1 AND download_status = 'completed'),
                record_count = (SELECT COUNT(*) FROM extracted_records WHERE publication_id = ?1),
                updated_at = ?2
            WHERE id = ?1
            "#,
            params![id, Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "publication",
                id: id.to_string(),
            });
        }
        Self::fetch_publication(&conn, id)
    }

    fn delete_publication(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM publications WHERE id = ?", params![id])?;
        Ok(changed > 0)
    }

    fn delete_all(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute("DELETE FROM publications", [])?)
    }

    fn get_file(
        &self,
        publication_id: &str,
        file_name: &str,
    ) -> Result<Option<AcquiredFile>, StoreError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {} FROM acquired_files WHERE publication_id = ? AND file_name = ?",
                    FILE_COLUMNS
                ),
                params![publication_id, file_name],
                Self::row_to_file,
            )
            .optional()?)
    }

    fn get_file_by_id(&self, id: i64) -> Result<Option<AcquiredFile>, StoreError> {
        let conn = self.conn.lock().unwrap();
        match Self::fetch_file(&conn, id) {
            Ok(file) => Ok(Some(file)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn create_file(&self, file: &NewAcquiredFile) -> Result<AcquiredFile, StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::insert_file(&conn, file, FileStatus::Pending, 0, None)
    }

    fn adopt_file(
        &self,
        file: &NewAcquiredFile,
        size_bytes: u64,
    ) -> Result<AcquiredFile, StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::insert_file(
            &conn,
            file,
            FileStatus::Completed,
            size_bytes,
            Some(Utc::now()),
        )
    }

    fn delete_file(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM acquired_files WHERE id = ?", params![id])?;
        Ok(())
    }

    fn mark_downloaded(&self, id: i64, size_bytes: u64) -> Result<AcquiredFile, StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::update_file(
            &conn,
            id,
            "UPDATE acquired_files SET size_bytes = ?, downloaded_at = ?, download_status = 'completed', extraction_status = 'pending', error_message = NULL WHERE id = ?",
            params![size_bytes as i64, Utc::now().to_rfc3339(), id],
        )
    }

    fn mark_download_failed(&self, id: i64, message: &str) -> Result<AcquiredFile, StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::update_file(
            &conn,
            id,
            "UPDATE acquired_files SET download_status = 'error', extraction_status = 'error', error_message = ? WHERE id = ?",
            params![message, id],
        )
    }

    fn mark_extraction_started(&self, id: i64) -> Result<AcquiredFile, StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::update_file(
            &conn,
            id,
            "UPDATE acquired_files SET extraction_status = 'processing' WHERE id = ?",
            params![id],
        )
    }

    fn complete_extraction(
        &self,
        id: i64,
        records: &[RecordFields],
    ) -> Result<AcquiredFile, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let file = Self::fetch_file(&tx, id)?;
        let now = Utc::now().to_rfc3339();

        tx.execute("DELETE FROM extracted_records WHERE file_id = ?", params![id])?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO extracted_records ({}) VALUES (NULL, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                RECORD_COLUMNS
            ))?;
            for record in records {
                stmt.execute(params![
                    id,
                    file.publication_id,
                    now,
                    record.application_number,
                    record.filing_date.map(|d| d.to_string()),
                    record.name,
                    record.applicant_name,
                    record.applicant_address,
                    record.applicant_type,
                    record.class_number,
                    record.description,
                    record.representative_name,
                    record.representative_address,
                    record.usage_since,
                    record.association,
                    record.office_location,
                    record.page_number,
                    record.raw_text,
                ])?;
            }
        }

        tx.execute(
            "UPDATE acquired_files SET extraction_status = 'completed', extracted_at = ?, records_extracted = ?, error_message = NULL WHERE id = ?",
            params![now, records.len() as i64, id],
        )?;
        let updated = Self::fetch_file(&tx, id)?;
        tx.commit()?;

        Ok(updated)
    }

    fn mark_extraction_failed(&self, id: i64, message: &str) -> Result<AcquiredFile, StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::update_file(
            &conn,
            id,
            "UPDATE acquired_files SET extraction_status = 'error', extracted_at = ?, error_message = ? WHERE id = ?",
            params![Utc::now().to_rfc3339(), message, id],
        )
    }

    fn list_files(&self, filter: &FileFilter) -> Result<Vec<AcquiredFile>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let (where_clause, params) = Self::file_where(filter);

        let sql = format!(
            "SELECT {} FROM acquired_files {} ORDER BY publication_id DESC, id ASC LIMIT ? OFFSET ?",
            FILE_COLUMNS, where_clause
        );

        let mut all_params = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), Self::row_to_file)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn count_files(&self, filter: &FileFilter) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let (where_clause, params) = Self::file_where(filter);
        let sql = format!("SELECT COUNT(*) FROM acquired_files {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        Ok(conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?)
    }

    fn list_records(&self, filter: &RecordFilter) -> Result<Vec<ExtractedRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let (where_clause, params) = Self::record_where(filter);

        let sql = format!(
            "SELECT {} FROM extracted_records {} ORDER BY id ASC LIMIT ? OFFSET ?",
            RECORD_COLUMNS, where_clause
        );

        let mut all_params = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), Self::row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn count_records(&self, filter: &RecordFilter) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let (where_clause, params) = Self::record_where(filter);
        let sql = format!("SELECT COUNT(*) FROM extracted_records {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        Ok(conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?)
    }
}

fn where_clause(conditions: &[&str]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
