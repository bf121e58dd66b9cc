//! Table definitions the core touches
//!
//! The wider application owns schema evolution; this DDL is the subset the
//! import core reads and writes, used by embedders bootstrapping a fresh
//! archive and by the test suite. Media-specific columns (dimensions,
//! duration, GPS) start NULL and are populated by downstream jobs.

use crate::error::Result;
use rusqlite::Connection;

/// Create every table and index the import core depends on (idempotent)
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS locations (
            locid         TEXT PRIMARY KEY,
            address_state TEXT,
            hero_img      TEXT
        );

        CREATE TABLE IF NOT EXISTS imports (
            import_id   TEXT PRIMARY KEY,
            locid       TEXT NOT NULL,
            import_date TEXT NOT NULL,
            auth_imp    TEXT NOT NULL,
            img_count   INTEGER NOT NULL DEFAULT 0,
            vid_count   INTEGER NOT NULL DEFAULT 0,
            doc_count   INTEGER NOT NULL DEFAULT 0,
            map_count   INTEGER NOT NULL DEFAULT 0,
            notes       TEXT
        );

        CREATE TABLE IF NOT EXISTS imgs (
            imghash           TEXT PRIMARY KEY,
            original_filename TEXT NOT NULL,
            archive_filename  TEXT NOT NULL,
            archive_path      TEXT NOT NULL,
            source_path       TEXT NOT NULL,
            locid             TEXT NOT NULL,
            subid             TEXT,
            imported_by       TEXT NOT NULL,
            import_date       TEXT NOT NULL,
            file_size_bytes   INTEGER NOT NULL,
            hidden            INTEGER NOT NULL DEFAULT 0,
            hidden_reason     TEXT,
            width             INTEGER,
            height            INTEGER,
            camera_model      TEXT,
            taken_at          TEXT,
            gps_lat           REAL,
            gps_lon           REAL
        );

        CREATE TABLE IF NOT EXISTS vids (
            vidhash           TEXT PRIMARY KEY,
            original_filename TEXT NOT NULL,
            archive_filename  TEXT NOT NULL,
            archive_path      TEXT NOT NULL,
            source_path      TEXT NOT NULL,
            locid             TEXT NOT NULL,
            subid             TEXT,
            imported_by       TEXT NOT NULL,
            import_date       TEXT NOT NULL,
            file_size_bytes   INTEGER NOT NULL,
            hidden            INTEGER NOT NULL DEFAULT 0,
            hidden_reason     TEXT,
            duration_secs     REAL,
            width             INTEGER,
            height            INTEGER,
            codec             TEXT,
            fps               REAL
        );

        CREATE TABLE IF NOT EXISTS docs (
            dochash           TEXT PRIMARY KEY,
            original_filename TEXT NOT NULL,
            archive_filename  TEXT NOT NULL,
            archive_path      TEXT NOT NULL,
            source_path       TEXT NOT NULL,
            locid             TEXT NOT NULL,
            subid             TEXT,
            imported_by       TEXT NOT NULL,
            import_date       TEXT NOT NULL,
            file_size_bytes   INTEGER NOT NULL,
            hidden            INTEGER NOT NULL DEFAULT 0,
            hidden_reason     TEXT,
            page_count        INTEGER
        );

        CREATE TABLE IF NOT EXISTS maps (
            maphash           TEXT PRIMARY KEY,
            original_filename TEXT NOT NULL,
            archive_filename  TEXT NOT NULL,
            archive_path      TEXT NOT NULL,
            source_path       TEXT NOT NULL,
            locid             TEXT NOT NULL,
            subid             TEXT,
            imported_by       TEXT NOT NULL,
            import_date       TEXT NOT NULL,
            file_size_bytes   INTEGER NOT NULL,
            hidden            INTEGER NOT NULL DEFAULT 0,
            hidden_reason     TEXT,
            waypoint_count    INTEGER
        );

        CREATE TABLE IF NOT EXISTS import_sessions (
            session_id         TEXT PRIMARY KEY,
            locid              TEXT NOT NULL,
            status             TEXT NOT NULL,
            source_paths       TEXT NOT NULL,
            total_files        INTEGER NOT NULL DEFAULT 0,
            processed_files    INTEGER NOT NULL DEFAULT 0,
            total_bytes        INTEGER NOT NULL DEFAULT 0,
            processed_bytes    INTEGER NOT NULL DEFAULT 0,
            started_at         TEXT NOT NULL,
            completed_at       TEXT,
            error              TEXT,
            can_resume         INTEGER NOT NULL DEFAULT 1,
            last_step          INTEGER NOT NULL DEFAULT 0,
            scan_result        TEXT,
            hash_results       TEXT,
            copy_results       TEXT,
            validation_results TEXT
        );

        CREATE TABLE IF NOT EXISTS job_queue (
            job_id     TEXT PRIMARY KEY,
            queue      TEXT NOT NULL,
            priority   TEXT NOT NULL,
            payload    TEXT NOT NULL,
            depends_on TEXT,
            status     TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_imports_locid ON imports(locid);
        CREATE INDEX IF NOT EXISTS idx_sessions_locid ON import_sessions(locid);
        CREATE INDEX IF NOT EXISTS idx_job_queue_status ON job_queue(status);
        "#,
    )?;
    Ok(())
}
