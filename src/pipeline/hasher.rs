//! Content hashing stage
//!
//! Computes BLAKE3 over each file's bytes, truncates to the 16-hex content
//! address, and checks the matching media table for a pre-existing row. For
//! network sources the orchestrator skips this stage entirely and the copier
//! hashes inline while streaming, so the source is read only once.

use crate::db::{self, DbPool};
use crate::error::{ArchiveError, IoResultExt, Result};
use crate::pipeline::{HashResult, HashedFile, ScannedFile, StageContext};
use crate::storage::HASH_HEX_LEN;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Buffer size for hash reads
pub const HASH_BUFFER_SIZE: usize = 1024 * 1024;

/// Full 256-bit BLAKE3 digest of a file's bytes.
///
/// Exposed so embedders can widen content addresses beyond the truncated
/// form without re-reading the archive.
pub fn file_digest(path: &Path) -> Result<blake3::Hash> {
    let file = File::open(path).with_path(path)?;
    let mut reader = BufReader::with_capacity(HASH_BUFFER_SIZE, file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer).map_err(|e| ArchiveError::io(path, e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}

/// Truncate a digest to the 16-hex content address
pub fn truncate_digest(digest: &blake3::Hash) -> String {
    digest.to_hex().as_str()[..HASH_HEX_LEN].to_string()
}

/// 16-hex content address of a file
pub fn content_hash(path: &Path) -> Result<String> {
    Ok(truncate_digest(&file_digest(path)?))
}

/// 16-hex content address of in-memory bytes
pub fn hash_bytes(data: &[u8]) -> String {
    truncate_digest(&blake3::hash(data))
}

/// Hash a batch of scanned files on a bounded worker pool and mark
/// duplicates against the media tables.
///
/// Per-file failures (read errors, lookup errors) set `hash_error` and leave
/// the file out of the copy stage; the batch continues.
pub fn hash_files(
    files: Vec<ScannedFile>,
    pool: &DbPool,
    workers: usize,
    ctx: &StageContext,
) -> Result<HashResult> {
    use rayon::prelude::*;

    let thread_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| ArchiveError::ThreadPool(e.to_string()))?;

    let hashed: Vec<HashedFile> = thread_pool.install(|| {
        files
            .into_par_iter()
            .map(|scanned| {
                let mut file = HashedFile::from_scan(scanned);
                // In-flight work finishes; no new file begins once aborted.
                if ctx.is_cancelled() {
                    return file;
                }

                ctx.tracker().file_started(&file.scanned.filename);
                match content_hash(&file.scanned.original_path) {
                    Ok(hash) => {
                        file.hash = Some(hash);
                        if let Err(err) = mark_if_duplicate(pool, &mut file) {
                            tracing::warn!(
                                path = %file.scanned.original_path.display(),
                                "duplicate lookup failed: {err}"
                            );
                            file.hash_error = Some(format!("duplicate lookup failed: {err}"));
                            ctx.tracker().add_error();
                        } else if file.is_duplicate {
                            ctx.tracker().add_duplicate();
                        }
                    }
                    Err(err) => {
                        tracing::warn!(
                            path = %file.scanned.original_path.display(),
                            "hashing failed: {err}"
                        );
                        file.hash_error = Some(err.to_string());
                        ctx.tracker().add_error();
                    }
                }
                ctx.tracker().file_done(file.scanned.size);
                file
            })
            .collect()
    });

    ctx.check_cancelled()?;

    let total_hashed = hashed.iter().filter(|f| f.hash.is_some()).count() as u64;
    let total_duplicates = hashed.iter().filter(|f| f.is_duplicate).count() as u64;
    let total_errors = hashed.iter().filter(|f| f.hash_error.is_some()).count() as u64;

    Ok(HashResult {
        files: hashed,
        total_hashed,
        total_duplicates,
        total_errors,
    })
}

fn mark_if_duplicate(pool: &DbPool, file: &mut HashedFile) -> Result<()> {
    let Some(hash) = file.hash.as_deref() else {
        return Ok(());
    };
    let media_type = file.scanned.media_type;
    let conn = pool.get()?;
    if db::hash_exists(&conn, media_type, hash)? {
        file.is_duplicate = true;
        file.duplicate_in = media_type.table_name().map(String::from);
    }
    Ok(())
}

/// Produce the synthetic hash-stage result used for network sources: every
/// hash deferred to the copier, nothing hashed here.
pub fn skip_hashing(files: Vec<ScannedFile>) -> HashResult {
    let files: Vec<HashedFile> = files.into_iter().map(HashedFile::from_scan).collect();
    HashResult {
        files,
        total_hashed: 0,
        total_duplicates: 0,
        total_errors: 0,
    }
}
