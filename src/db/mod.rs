//! Database layer
//!
//! A pooled SQLite connection shared by the whole pipeline. Stages 1-4 only
//! read (duplicate lookups); the finalizer is the single writer and works
//! inside one explicit transaction. Session checkpoints and the downstream
//! job queue live in the same database.

mod media;
mod queue;
mod schema;
mod sessions;

pub use media::*;
pub use queue::*;
pub use schema::*;
pub use sessions::*;

use crate::error::Result;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

/// Shared connection pool handed to the orchestrator once
pub type DbPool = r2d2::Pool<SqliteConnectionManager>;

/// Open (creating if needed) the archive database at `path`.
///
/// WAL journaling keeps the hasher's duplicate lookups readable while the
/// finalizer writes; the busy timeout covers short writer overlap.
pub fn open_pool(path: &Path) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = r2d2::Pool::builder().max_size(8).build(manager)?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_pool_and_schema() {
        let dir = TempDir::new().unwrap();
        let pool = open_pool(&dir.path().join("archive.sqlite")).unwrap();
        let conn = pool.get().unwrap();
        init_schema(&conn).unwrap();

        // Idempotent.
        init_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM import_sessions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
