//! Import session persistence
//!
//! One row per pipeline invocation. Stage outputs are checkpointed into the
//! row as opaque JSON blobs after each stage completes, which is what makes
//! resume possible. Blobs are unversioned: a missing or malformed blob
//! forces the resume to restart from step 1.

use crate::db::DbPool;
use crate::error::Result;
use crate::pipeline::SessionStatus;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;

/// Highest step number a finished pipeline reaches
pub const TOTAL_STEPS: u8 = 5;

/// A persisted import session (stage blobs are loaded separately)
#[derive(Debug, Clone)]
pub struct ImportSession {
    /// Opaque session identifier
    pub session_id: String,
    /// Location the session imports into
    pub locid: String,
    /// Lifecycle state
    pub status: SessionStatus,
    /// Inputs as given to `import`
    pub source_paths: Vec<PathBuf>,
    /// Batch size in files, known after the scan
    pub total_files: u64,
    /// Files carried through the latest persisted stage
    pub processed_files: u64,
    /// Batch size in bytes, known after the scan
    pub total_bytes: u64,
    /// Bytes carried through the latest persisted stage
    pub processed_bytes: u64,
    /// RFC 3339
    pub started_at: String,
    /// RFC 3339, set on terminal states
    pub completed_at: Option<String>,
    /// Fatal error message, if the session failed
    pub error: Option<String>,
    /// False once the session reaches a terminal state
    pub can_resume: bool,
    /// Last fully persisted step, 0..=5
    pub last_step: u8,
}

impl ImportSession {
    /// Fresh session row for a new import
    pub fn new(session_id: impl Into<String>, locid: impl Into<String>, paths: &[PathBuf]) -> Self {
        Self {
            session_id: session_id.into(),
            locid: locid.into(),
            status: SessionStatus::Pending,
            source_paths: paths.to_vec(),
            total_files: 0,
            processed_files: 0,
            total_bytes: 0,
            processed_bytes: 0,
            started_at: Utc::now().to_rfc3339(),
            completed_at: None,
            error: None,
            can_resume: true,
            last_step: 0,
        }
    }
}

/// The four checkpoint columns, one per non-terminal stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageColumn {
    /// `scan_result`
    Scan,
    /// `hash_results`
    Hash,
    /// `copy_results`
    Copy,
    /// `validation_results`
    Validation,
}

impl StageColumn {
    fn column(&self) -> &'static str {
        match self {
            Self::Scan => "scan_result",
            Self::Hash => "hash_results",
            Self::Copy => "copy_results",
            Self::Validation => "validation_results",
        }
    }
}

/// CRUD over `import_sessions`
#[derive(Clone)]
pub struct SessionStore {
    pool: DbPool,
}

impl SessionStore {
    /// Wrap a pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a fresh session row
    pub fn create(&self, session: &ImportSession) -> Result<()> {
        let paths = serde_json::to_string(&session.source_paths)?;
        self.pool.get()?.execute(
            "INSERT INTO import_sessions
                 (session_id, locid, status, source_paths, total_files, processed_files,
                  total_bytes, processed_bytes, started_at, can_resume, last_step)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                session.session_id,
                session.locid,
                session.status.as_str(),
                paths,
                session.total_files as i64,
                session.processed_files as i64,
                session.total_bytes as i64,
                session.processed_bytes as i64,
                session.started_at,
                session.can_resume as i64,
                session.last_step as i64,
            ],
        )?;
        Ok(())
    }

    /// Load a session row by id
    pub fn load(&self, session_id: &str) -> Result<Option<ImportSession>> {
        let conn = self.pool.get()?;
        let session = conn
            .query_row(
                "SELECT session_id, locid, status, source_paths, total_files, processed_files,
                        total_bytes, processed_bytes, started_at, completed_at, error,
                        can_resume, last_step
                 FROM import_sessions WHERE session_id = ?1",
                params![session_id],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    /// Update the live status of a running session
    pub fn set_status(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        self.pool.get()?.execute(
            "UPDATE import_sessions SET status = ?2 WHERE session_id = ?1",
            params![session_id, status.as_str()],
        )?;
        Ok(())
    }

    /// Record the batch totals once the scan knows them
    pub fn set_totals(&self, session_id: &str, total_files: u64, total_bytes: u64) -> Result<()> {
        self.pool.get()?.execute(
            "UPDATE import_sessions SET total_files = ?2, total_bytes = ?3 WHERE session_id = ?1",
            params![session_id, total_files as i64, total_bytes as i64],
        )?;
        Ok(())
    }

    /// Record progress counters (called at stage boundaries)
    pub fn set_progress(
        &self,
        session_id: &str,
        processed_files: u64,
        processed_bytes: u64,
    ) -> Result<()> {
        self.pool.get()?.execute(
            "UPDATE import_sessions SET processed_files = ?2, processed_bytes = ?3
             WHERE session_id = ?1",
            params![session_id, processed_files as i64, processed_bytes as i64],
        )?;
        Ok(())
    }

    /// Persist a stage's output blob and advance `last_step`.
    ///
    /// The write is a single UPDATE, so a crash leaves either the previous
    /// checkpoint or the new one, never a torn state.
    pub fn save_stage<T: Serialize>(
        &self,
        session_id: &str,
        stage: StageColumn,
        value: &T,
        last_step: u8,
    ) -> Result<()> {
        let blob = serde_json::to_string(value)?;
        let sql = format!(
            "UPDATE import_sessions SET {} = ?2, last_step = ?3 WHERE session_id = ?1",
            stage.column()
        );
        self.pool
            .get()?
            .execute(&sql, params![session_id, blob, last_step as i64])?;
        Ok(())
    }

    /// Load a stage checkpoint, if present and well-formed.
    ///
    /// A malformed blob is treated as absent (with a warning); the caller
    /// restarts from scratch.
    pub fn load_stage<T: DeserializeOwned>(
        &self,
        session_id: &str,
        stage: StageColumn,
    ) -> Result<Option<T>> {
        let sql = format!(
            "SELECT {} FROM import_sessions WHERE session_id = ?1",
            stage.column()
        );
        let blob: Option<Option<String>> = self
            .pool
            .get()?
            .query_row(&sql, params![session_id], |row| row.get(0))
            .optional()?;

        let Some(Some(blob)) = blob else {
            return Ok(None);
        };

        match serde_json::from_str(&blob) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                tracing::warn!(
                    session_id,
                    stage = stage.column(),
                    "discarding malformed stage checkpoint: {err}"
                );
                Ok(None)
            }
        }
    }

    /// Terminal success: resume is no longer possible
    pub fn mark_completed(&self, session_id: &str) -> Result<()> {
        self.pool.get()?.execute(
            "UPDATE import_sessions
             SET status = 'completed', can_resume = 0, completed_at = ?2, last_step = ?3
             WHERE session_id = ?1",
            params![session_id, Utc::now().to_rfc3339(), TOTAL_STEPS as i64],
        )?;
        Ok(())
    }

    /// Terminal cancellation: resume is no longer possible
    pub fn mark_cancelled(&self, session_id: &str) -> Result<()> {
        self.pool.get()?.execute(
            "UPDATE import_sessions
             SET status = 'cancelled', can_resume = 0, completed_at = ?2
             WHERE session_id = ?1",
            params![session_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Failure: prior checkpoints are preserved so a later resume can
    /// continue past the failure
    pub fn mark_failed(&self, session_id: &str, error: &str) -> Result<()> {
        self.pool.get()?.execute(
            "UPDATE import_sessions
             SET status = 'failed', can_resume = 1, error = ?2
             WHERE session_id = ?1",
            params![session_id, error],
        )?;
        Ok(())
    }

    /// Every session that can still be resumed
    pub fn resumable(&self) -> Result<Vec<ImportSession>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT session_id, locid, status, source_paths, total_files, processed_files,
                    total_bytes, processed_bytes, started_at, completed_at, error,
                    can_resume, last_step
             FROM import_sessions WHERE can_resume = 1 ORDER BY started_at",
        )?;
        let sessions = stmt
            .query_map([], row_to_session)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<ImportSession> {
    let status: String = row.get(2)?;
    let paths: String = row.get(3)?;
    Ok(ImportSession {
        session_id: row.get(0)?,
        locid: row.get(1)?,
        status: SessionStatus::parse(&status).unwrap_or(SessionStatus::Failed),
        source_paths: serde_json::from_str(&paths).unwrap_or_default(),
        total_files: row.get::<_, i64>(4)? as u64,
        processed_files: row.get::<_, i64>(5)? as u64,
        total_bytes: row.get::<_, i64>(6)? as u64,
        processed_bytes: row.get::<_, i64>(7)? as u64,
        started_at: row.get(8)?,
        completed_at: row.get(9)?,
        error: row.get(10)?,
        can_resume: row.get::<_, i64>(11)? != 0,
        last_step: row.get::<_, i64>(12)? as u8,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_schema, open_pool};
    use tempfile::TempDir;

    fn store() -> (TempDir, SessionStore) {
        let dir = TempDir::new().unwrap();
        let pool = open_pool(&dir.path().join("db.sqlite")).unwrap();
        init_schema(&pool.get().unwrap()).unwrap();
        (dir, SessionStore::new(pool))
    }

    #[test]
    fn test_create_load_round_trip() {
        let (_dir, store) = store();
        let session = ImportSession::new("s1", "aaaaaaaaaaaaaaaa", &["/src/a.jpg".into()]);
        store.create(&session).unwrap();

        let loaded = store.load("s1").unwrap().unwrap();
        assert_eq!(loaded.session_id, "s1");
        assert_eq!(loaded.status, SessionStatus::Pending);
        assert_eq!(loaded.source_paths, vec![PathBuf::from("/src/a.jpg")]);
        assert!(loaded.can_resume);
        assert_eq!(loaded.last_step, 0);

        assert!(store.load("missing").unwrap().is_none());
    }

    #[test]
    fn test_stage_checkpoint_round_trip() {
        let (_dir, store) = store();
        store
            .create(&ImportSession::new("s1", "aaaaaaaaaaaaaaaa", &[]))
            .unwrap();

        let blob = vec!["x".to_string(), "y".to_string()];
        store
            .save_stage("s1", StageColumn::Scan, &blob, 1)
            .unwrap();

        let loaded: Option<Vec<String>> = store.load_stage("s1", StageColumn::Scan).unwrap();
        assert_eq!(loaded, Some(blob));
        assert_eq!(store.load("s1").unwrap().unwrap().last_step, 1);

        // Absent checkpoint reads as None.
        let missing: Option<Vec<String>> = store.load_stage("s1", StageColumn::Copy).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_malformed_checkpoint_reads_as_none() {
        let (_dir, store) = store();
        store
            .create(&ImportSession::new("s1", "aaaaaaaaaaaaaaaa", &[]))
            .unwrap();
        store
            .pool
            .get()
            .unwrap()
            .execute(
                "UPDATE import_sessions SET copy_results = 'not json' WHERE session_id = 's1'",
                [],
            )
            .unwrap();

        let loaded: Option<Vec<String>> = store.load_stage("s1", StageColumn::Copy).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_terminal_states() {
        let (_dir, store) = store();
        store
            .create(&ImportSession::new("s1", "aaaaaaaaaaaaaaaa", &[]))
            .unwrap();
        store
            .create(&ImportSession::new("s2", "bbbbbbbbbbbbbbbb", &[]))
            .unwrap();
        store
            .create(&ImportSession::new("s3", "cccccccccccccccc", &[]))
            .unwrap();

        store.mark_completed("s1").unwrap();
        store.mark_cancelled("s2").unwrap();
        store.mark_failed("s3", "disk on fire").unwrap();

        let s1 = store.load("s1").unwrap().unwrap();
        assert_eq!(s1.status, SessionStatus::Completed);
        assert!(!s1.can_resume);
        assert_eq!(s1.last_step, TOTAL_STEPS);

        let s3 = store.load("s3").unwrap().unwrap();
        assert_eq!(s3.status, SessionStatus::Failed);
        assert!(s3.can_resume);
        assert_eq!(s3.error.as_deref(), Some("disk on fire"));

        let resumable = store.resumable().unwrap();
        assert_eq!(resumable.len(), 1);
        assert_eq!(resumable[0].session_id, "s3");
    }
}
