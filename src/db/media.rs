//! Media table queries
//!
//! Duplicate lookups for the hasher and post-copy sweep, plus the insert
//! paths the finalizer drives. Table and column names are derived from
//! `MediaType`, never from caller input.

use crate::error::{ArchiveError, Result};
use crate::pipeline::MediaType;
use rusqlite::{params, types::ToSql, Connection};

/// One media row as the finalizer writes it.
///
/// Media-specific columns (dimensions, duration, GPS) are left NULL for
/// downstream jobs to populate.
#[derive(Debug, Clone)]
pub struct MediaRow {
    /// 16-hex content address, the table's primary key
    pub hash: String,
    /// File name as it arrived
    pub original_filename: String,
    /// `<hash><ext>` name inside the archive
    pub archive_filename: String,
    /// Full archive path
    pub archive_path: String,
    /// Where the file was imported from
    pub source_path: String,
    /// Owning location
    pub locid: String,
    /// Owning sub-location, if any
    pub subid: Option<String>,
    /// Importer identity
    pub imported_by: String,
    /// RFC 3339 import timestamp
    pub import_date: String,
    /// Size recorded at scan time
    pub file_size_bytes: i64,
}

/// Columns shared by all four media tables, after the per-table hash column
const ROW_COLUMNS: &str = "original_filename, archive_filename, archive_path, source_path, \
                           locid, subid, imported_by, import_date, file_size_bytes, \
                           hidden, hidden_reason";

/// Parameters per row in a multi-row insert (hidden/hidden_reason are literals)
const PARAMS_PER_ROW: usize = 10;

/// SQLite's default variable limit is 999; stay well under it.
const MAX_BATCH_ROWS: usize = 90;

fn table_and_hash_column(media_type: MediaType) -> Result<(&'static str, &'static str)> {
    match (media_type.table_name(), media_type.hash_column()) {
        (Some(table), Some(column)) => Ok((table, column)),
        _ => Err(ArchiveError::config(format!(
            "media type {:?} has no table",
            media_type
        ))),
    }
}

/// Does a row with this content hash already exist?
pub fn hash_exists(conn: &Connection, media_type: MediaType, hash: &str) -> Result<bool> {
    let (table, column) = table_and_hash_column(media_type)?;
    let sql = format!("SELECT 1 FROM {table} WHERE {column} = ?1 LIMIT 1");
    let mut stmt = conn.prepare_cached(&sql)?;
    let found = stmt.exists(params![hash])?;
    Ok(found)
}

impl MediaRow {
    fn push_params<'a>(&'a self, out: &mut Vec<&'a dyn ToSql>) {
        out.push(&self.hash);
        out.push(&self.original_filename);
        out.push(&self.archive_filename);
        out.push(&self.archive_path);
        out.push(&self.source_path);
        out.push(&self.locid);
        out.push(&self.subid);
        out.push(&self.imported_by);
        out.push(&self.import_date);
        out.push(&self.file_size_bytes);
    }
}

/// Insert a batch of rows with one multi-row INSERT per chunk.
///
/// All-or-nothing per chunk: a constraint violation fails the whole chunk,
/// and the caller falls back to per-row inserts to isolate the offender.
pub fn insert_media_batch(
    conn: &Connection,
    media_type: MediaType,
    rows: &[MediaRow],
) -> Result<usize> {
    let (table, column) = table_and_hash_column(media_type)?;
    let mut inserted = 0;

    for chunk in rows.chunks(MAX_BATCH_ROWS) {
        let values = build_row_placeholder(chunk.len());
        let sql = format!("INSERT INTO {table} ({column}, {ROW_COLUMNS}) VALUES {values}");

        let mut sql_params: Vec<&dyn ToSql> = Vec::with_capacity(chunk.len() * PARAMS_PER_ROW);
        for row in chunk {
            row.push_params(&mut sql_params);
        }

        conn.prepare(&sql)?.execute(&sql_params[..])?;
        inserted += chunk.len();
    }

    Ok(inserted)
}

fn build_row_placeholder(row_count: usize) -> String {
    let mut placeholder = String::new();
    let mut param = 1;
    for i in 0..row_count {
        if i > 0 {
            placeholder.push_str(", ");
        }
        placeholder.push('(');
        for j in 0..PARAMS_PER_ROW {
            if j > 0 {
                placeholder.push_str(", ");
            }
            placeholder.push_str(&format!("?{param}"));
            param += 1;
        }
        placeholder.push_str(", 0, NULL)");
    }
    placeholder
}

/// Insert a single row (the batch-failure fallback path)
pub fn insert_media_row(conn: &Connection, media_type: MediaType, row: &MediaRow) -> Result<()> {
    let (table, column) = table_and_hash_column(media_type)?;
    let sql = format!(
        "INSERT INTO {table} ({column}, {ROW_COLUMNS}) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, NULL)"
    );
    let mut sql_params: Vec<&dyn ToSql> = Vec::with_capacity(PARAMS_PER_ROW);
    row.push_params(&mut sql_params);
    conn.prepare_cached(&sql)?.execute(&sql_params[..])?;
    Ok(())
}

/// Archive path recorded for a content hash, if a row exists
pub fn media_archive_path(
    conn: &Connection,
    media_type: MediaType,
    hash: &str,
) -> Result<Option<String>> {
    use rusqlite::OptionalExtension;

    let (table, column) = table_and_hash_column(media_type)?;
    let sql = format!("SELECT archive_path FROM {table} WHERE {column} = ?1");
    let path = conn
        .prepare_cached(&sql)?
        .query_row(params![hash], |row| row.get(0))
        .optional()?;
    Ok(path)
}

/// Count rows in one media table (test and maintenance helper)
pub fn media_row_count(conn: &Connection, media_type: MediaType) -> Result<i64> {
    let (table, _) = table_and_hash_column(media_type)?;
    let count = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })?;
    Ok(count)
}

/// Set the location's hero image if it has none.
///
/// Best-effort by contract: runs outside the finalize transaction and the
/// caller logs rather than fails on error.
pub fn assign_hero_if_missing(conn: &Connection, locid: &str, imghash: &str) -> Result<bool> {
    conn.execute(
        "INSERT INTO locations (locid, hero_img) VALUES (?1, ?2)
         ON CONFLICT(locid) DO UPDATE SET hero_img = excluded.hero_img
         WHERE locations.hero_img IS NULL OR locations.hero_img = ''",
        params![locid, imghash],
    )?;
    let hero: Option<String> = conn.query_row(
        "SELECT hero_img FROM locations WHERE locid = ?1",
        params![locid],
        |row| row.get(0),
    )?;
    Ok(hero.as_deref() == Some(imghash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn row(hash: &str) -> MediaRow {
        MediaRow {
            hash: hash.into(),
            original_filename: "a.jpg".into(),
            archive_filename: format!("{hash}.jpg"),
            archive_path: format!("/archive/org-img/{hash}.jpg"),
            source_path: "/src/a.jpg".into(),
            locid: "aaaaaaaaaaaaaaaa".into(),
            subid: None,
            imported_by: "tester".into(),
            import_date: "2026-01-01T00:00:00Z".into(),
            file_size_bytes: 4,
        }
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_batch_insert_and_lookup() {
        let conn = test_conn();
        let rows = vec![row("0000000000000001"), row("0000000000000002")];
        let inserted = insert_media_batch(&conn, MediaType::Image, &rows).unwrap();
        assert_eq!(inserted, 2);
        assert!(hash_exists(&conn, MediaType::Image, "0000000000000001").unwrap());
        assert!(!hash_exists(&conn, MediaType::Image, "ffffffffffffffff").unwrap());
        assert!(!hash_exists(&conn, MediaType::Video, "0000000000000001").unwrap());
    }

    #[test]
    fn test_batch_insert_fails_whole_chunk_on_conflict() {
        let conn = test_conn();
        insert_media_row(&conn, MediaType::Image, &row("0000000000000001")).unwrap();

        let rows = vec![row("0000000000000002"), row("0000000000000001")];
        assert!(insert_media_batch(&conn, MediaType::Image, &rows).is_err());
        // The duplicate poisons the whole multi-row statement.
        assert!(!hash_exists(&conn, MediaType::Image, "0000000000000002").unwrap());
    }

    #[test]
    fn test_hero_assignment() {
        let conn = test_conn();
        assert!(assign_hero_if_missing(&conn, "aaaaaaaaaaaaaaaa", "0000000000000001").unwrap());
        // Second image does not displace the hero.
        assert!(!assign_hero_if_missing(&conn, "aaaaaaaaaaaaaaaa", "0000000000000002").unwrap());
    }
}
