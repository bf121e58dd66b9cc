//! Finalize stage
//!
//! Materializes the batch in the database inside one transaction: an
//! `imports` row recording the batch, then one media-table row per valid
//! file. Batches go in as multi-row INSERTs; a failed batch falls back to
//! per-row inserts (still inside the same transaction) so a single offender
//! cannot sink its siblings. After commit the downstream jobs are enqueued
//! and the location's hero image is assigned best-effort.

use crate::config::{ImportUser, LocationInfo};
use crate::db::{self, DbPool, MediaRow};
use crate::error::Result;
use crate::jobs::plan_jobs;
use crate::pipeline::{
    FinalizationResult, FinalizedFile, MediaType, StageContext, ValidatedFile,
};
use chrono::Utc;
use rusqlite::params;
use std::time::Instant;
use uuid::Uuid;

/// Finalize stage configuration
#[derive(Debug, Clone)]
pub struct FinalizerOptions {
    /// Location every row is attributed to
    pub location: LocationInfo,
    /// Importer identity recorded on every row
    pub user: ImportUser,
    /// Free-form note for the imports row
    pub notes: Option<String>,
}

/// Materialize the batch.
///
/// Cancellation is honored before the transaction opens, never inside it.
/// A transaction-level failure (open, imports insert, commit) is fatal and
/// propagates; per-row media insert failures are captured per file.
pub fn finalize_files(
    files: Vec<ValidatedFile>,
    pool: &DbPool,
    opts: &FinalizerOptions,
    ctx: &StageContext,
) -> Result<FinalizationResult> {
    ctx.check_cancelled()?;

    let start = Instant::now();
    let import_id = Uuid::new_v4().to_string();
    let import_date = Utc::now().to_rfc3339();

    let mut finalized: Vec<FinalizedFile> = files
        .into_iter()
        .map(|validated| FinalizedFile {
            validated,
            db_record_id: None,
            finalize_error: None,
        })
        .collect();

    let mut conn = pool.get()?;
    let mut tx = conn.transaction()?;

    insert_import_row(&tx, &import_id, &import_date, &finalized, opts)?;

    for media_type in MediaType::ARCHIVED {
        let indices: Vec<usize> = finalized
            .iter()
            .enumerate()
            .filter(|(_, f)| {
                f.validated.eligible_for_finalize()
                    && f.validated.scanned().media_type == media_type
            })
            .map(|(i, _)| i)
            .collect();
        if indices.is_empty() {
            continue;
        }

        let rows: Vec<MediaRow> = indices
            .iter()
            .map(|&i| media_row(&finalized[i].validated, opts, &import_date))
            .collect();

        // The batch attempt runs under a savepoint so a mid-batch failure
        // leaves nothing behind before the per-row fallback re-inserts.
        let batch_outcome = {
            let savepoint = tx.savepoint()?;
            match db::insert_media_batch(&savepoint, media_type, &rows) {
                Ok(count) => {
                    savepoint.commit()?;
                    Ok(count)
                }
                Err(err) => Err(err),
            }
        };

        match batch_outcome {
            Ok(_) => {
                for &i in &indices {
                    finalized[i].db_record_id = finalized[i].validated.hash().map(String::from);
                }
            }
            Err(err) => {
                tracing::warn!(
                    media = ?media_type,
                    "batch insert failed, isolating rows: {err}"
                );
                for (&i, row) in indices.iter().zip(&rows) {
                    match db::insert_media_row(&tx, media_type, row) {
                        Ok(()) => {
                            finalized[i].db_record_id =
                                finalized[i].validated.hash().map(String::from);
                        }
                        Err(err) => {
                            tracing::warn!(hash = %row.hash, "media insert failed: {err}");
                            finalized[i].finalize_error = Some(err.to_string());
                            ctx.tracker().add_error();
                        }
                    }
                }
            }
        }
    }

    tx.commit()?;

    for file in &finalized {
        if file.db_record_id.is_some() {
            ctx.tracker().file_done(file.scanned().size);
        }
    }

    let jobs = plan_jobs(&finalized, &opts.location, &import_id);
    let jobs_queued = db::enqueue_jobs(&mut conn, &jobs)?;

    assign_hero(&conn, &finalized, &opts.location);

    let total_finalized = finalized.iter().filter(|f| f.db_record_id.is_some()).count() as u64;
    let total_errors = finalized
        .iter()
        .filter(|f| f.finalize_error.is_some())
        .count() as u64;

    tracing::info!(
        %import_id,
        total_finalized,
        total_errors,
        jobs_queued,
        "finalize stage finished"
    );

    Ok(FinalizationResult {
        files: finalized,
        total_finalized,
        total_errors,
        jobs_queued,
        import_record_id: Some(import_id),
        finalize_time_ms: start.elapsed().as_millis() as u64,
    })
}

fn insert_import_row(
    conn: &rusqlite::Connection,
    import_id: &str,
    import_date: &str,
    files: &[FinalizedFile],
    opts: &FinalizerOptions,
) -> Result<()> {
    let count_of = |media_type: MediaType| -> i64 {
        files
            .iter()
            .filter(|f| {
                f.validated.eligible_for_finalize()
                    && f.validated.scanned().media_type == media_type
            })
            .count() as i64
    };

    conn.execute(
        "INSERT INTO imports
             (import_id, locid, import_date, auth_imp,
              img_count, vid_count, doc_count, map_count, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            import_id,
            opts.location.locid,
            import_date,
            opts.user.id,
            count_of(MediaType::Image),
            count_of(MediaType::Video),
            count_of(MediaType::Document),
            count_of(MediaType::Map),
            opts.notes,
        ],
    )?;
    Ok(())
}

fn media_row(file: &ValidatedFile, opts: &FinalizerOptions, import_date: &str) -> MediaRow {
    let scanned = file.scanned();
    let hash = file.hash().unwrap_or_default().to_string();
    let archive_path = file
        .copied
        .archive_path
        .as_deref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    MediaRow {
        archive_filename: format!("{hash}{}", scanned.extension),
        hash,
        original_filename: scanned.filename.clone(),
        archive_path,
        source_path: scanned.original_path.to_string_lossy().into_owned(),
        locid: opts.location.locid.clone(),
        subid: opts.location.subid.clone(),
        imported_by: opts.user.id.clone(),
        import_date: import_date.to_string(),
        file_size_bytes: scanned.size as i64,
    }
}

/// First inserted image becomes the location hero if it has none.
/// Best-effort by contract: a failure here never fails the import.
fn assign_hero(conn: &rusqlite::Connection, files: &[FinalizedFile], location: &LocationInfo) {
    let first_image = files.iter().find(|f| {
        f.db_record_id.is_some() && f.scanned().media_type == MediaType::Image
    });
    let Some(file) = first_image else {
        return;
    };
    let Some(hash) = file.validated.hash() else {
        return;
    };

    match db::assign_hero_if_missing(conn, &location.locid, hash) {
        Ok(true) => tracing::debug!(locid = %location.locid, hash, "assigned location hero"),
        Ok(false) => {}
        Err(err) => {
            tracing::warn!(locid = %location.locid, "hero assignment failed: {err}");
        }
    }
}
