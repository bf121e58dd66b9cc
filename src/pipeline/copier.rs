//! Copy stage
//!
//! Places each file into its content-addressed archive path atomically:
//! stream into a dot-prefixed temp file in the destination directory, fsync,
//! then rename. A file whose hash is still unknown (network source) is
//! hashed inline while streaming and renamed once the digest is known at
//! EOF, so the source is read exactly once.

use crate::config::LocationInfo;
use crate::error::{ArchiveError, IoResultExt, Result};
use crate::pipeline::{
    truncate_digest, CopiedFile, CopyResult, CopyStrategy, HashedFile, StageContext,
};
use crate::storage::archive_media_dir;
use humansize::{format_size, BINARY};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Backoff schedule for transient network errors
pub const COPY_RETRY_BACKOFF: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
];

/// Copy stage configuration, derived by the orchestrator from the storage
/// classification of the source paths and the archive base
#[derive(Debug, Clone)]
pub struct CopierOptions {
    /// Root of the archive tree
    pub archive_base: PathBuf,
    /// Location every file in the batch belongs to
    pub location: LocationInfo,
    /// Simultaneous copy tasks
    pub workers: usize,
    /// Read/write buffer size
    pub buffer_size: usize,
    /// Gap between file starts (network throttling)
    pub operation_delay: Duration,
    /// Either end of the transfer is a network mount; enables retry
    pub network: bool,
}

/// Copy a batch into the archive.
///
/// Ineligible files (duplicates, hash failures) pass through unchanged with
/// no archive path. Per-file copy failures set `copy_error` and the batch
/// continues; only cancellation aborts the stage.
pub fn copy_files(
    files: Vec<HashedFile>,
    opts: &CopierOptions,
    ctx: &StageContext,
) -> Result<CopyResult> {
    let start = Instant::now();

    let (to_copy, carried): (Vec<_>, Vec<_>) =
        files.into_iter().partition(|f| f.eligible_for_copy());

    precreate_directories(&to_copy, opts);

    let thread_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.workers.max(1))
        .build()
        .map_err(|e| ArchiveError::ThreadPool(e.to_string()))?;

    let mut copied: Vec<CopiedFile> = thread_pool.install(|| {
        to_copy
            .into_par_iter()
            .map(|file| {
                // In-flight copies finish their cleanup; nothing new starts.
                if ctx.is_cancelled() {
                    return pass_through(file);
                }
                if !opts.operation_delay.is_zero() {
                    std::thread::sleep(opts.operation_delay);
                }

                ctx.tracker().file_started(&file.scanned.filename);
                let size = file.scanned.size;
                let result = copy_one(file, opts);
                if result.copy_error.is_some() {
                    ctx.tracker().add_error();
                }
                ctx.tracker().file_done(size);
                result
            })
            .collect()
    });

    if ctx.is_cancelled() {
        // A cancelled import is terminal and never finalizes, so files this
        // stage already placed would be permanent orphans. Unlink them.
        for file in &copied {
            if let Some(path) = &file.archive_path {
                unlink_quiet(path);
            }
        }
        return Err(ArchiveError::Cancelled);
    }

    copied.extend(carried.into_iter().map(pass_through));

    let total_copied = copied.iter().filter(|f| f.archive_path.is_some()).count() as u64;
    let total_errors = copied.iter().filter(|f| f.copy_error.is_some()).count() as u64;
    let total_bytes: u64 = copied.iter().map(|f| f.bytes_copied).sum();

    let elapsed = start.elapsed();
    let throughput = total_bytes as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    tracing::info!(
        files = total_copied,
        errors = total_errors,
        "copy stage finished: {} in {:.2?} ({}/s)",
        format_size(total_bytes, BINARY),
        elapsed,
        format_size(throughput as u64, BINARY),
    );

    Ok(CopyResult {
        files: copied,
        total_copied,
        total_bytes,
        total_errors,
        strategy: CopyStrategy::Copy,
        copy_time_ms: elapsed.as_millis() as u64,
        throughput_mbps: total_bytes as f64 / 1_000_000.0 / elapsed.as_secs_f64().max(f64::EPSILON),
    })
}

/// Create every distinct destination directory before any copy starts.
/// Sequential on network mounts (SMB handles little mkdir concurrency),
/// parallel locally. Races and failures are left to surface at rename time.
fn precreate_directories(files: &[HashedFile], opts: &CopierOptions) {
    let dirs: BTreeSet<PathBuf> = files
        .iter()
        .map(|f| archive_media_dir(&opts.archive_base, &opts.location, f.scanned.media_type))
        .collect();

    let create = |dir: &PathBuf| {
        if let Err(err) = fs::create_dir_all(dir) {
            tracing::warn!(dir = %dir.display(), "directory pre-creation failed: {err}");
        }
    };

    if opts.network {
        dirs.iter().for_each(create);
    } else {
        dirs.par_iter().for_each(create);
    }
}

/// Wrap a file that does not get copied (duplicate, hash failure, abort)
fn pass_through(file: HashedFile) -> CopiedFile {
    CopiedFile {
        hashed: file,
        archive_path: None,
        copy_error: None,
        copy_strategy: CopyStrategy::Copy,
        bytes_copied: 0,
    }
}

fn copy_one(mut file: HashedFile, opts: &CopierOptions) -> CopiedFile {
    let media_dir = archive_media_dir(&opts.archive_base, &opts.location, file.scanned.media_type);
    let temp_path = media_dir.join(format!(".tmp-{}", file.scanned.id));
    let mut attempt = 0usize;

    loop {
        match copy_attempt(&file, &media_dir, &temp_path, opts.buffer_size) {
            Ok((bytes_copied, hash, final_path)) => {
                file.hash = Some(hash);
                return CopiedFile {
                    hashed: file,
                    archive_path: Some(final_path),
                    copy_error: None,
                    copy_strategy: CopyStrategy::Copy,
                    bytes_copied,
                };
            }
            Err(err) => {
                unlink_quiet(&temp_path);

                if opts.network && err.is_network_retryable() && attempt < COPY_RETRY_BACKOFF.len()
                {
                    tracing::warn!(
                        path = %file.scanned.original_path.display(),
                        attempt = attempt + 1,
                        "transient copy failure, retrying: {err}"
                    );
                    std::thread::sleep(COPY_RETRY_BACKOFF[attempt]);
                    attempt += 1;
                    continue;
                }

                tracing::warn!(
                    path = %file.scanned.original_path.display(),
                    "copy failed: {err}"
                );
                return CopiedFile {
                    hashed: file,
                    archive_path: None,
                    copy_error: Some(err.to_string()),
                    copy_strategy: CopyStrategy::Copy,
                    bytes_copied: 0,
                };
            }
        }
    }
}

/// One copy attempt: source -> temp -> fsync -> rename.
///
/// The rename target depends on the hash, which for inline-hash files is
/// only known at EOF; either way the temp file lives in the destination
/// directory so the rename stays on one filesystem.
fn copy_attempt(
    file: &HashedFile,
    media_dir: &Path,
    temp_path: &Path,
    buffer_size: usize,
) -> Result<(u64, String, PathBuf)> {
    let source = &file.scanned.original_path;
    let mut src = File::open(source).with_path(source)?;
    let mut temp = File::create(temp_path).with_path(temp_path)?;

    let mut inline_hasher = file.hash.is_none().then(blake3::Hasher::new);
    let mut buffer = vec![0u8; buffer_size];
    let mut bytes_copied = 0u64;

    loop {
        let bytes_read = src.read(&mut buffer).map_err(|e| ArchiveError::io(source, e))?;
        if bytes_read == 0 {
            break;
        }
        if let Some(hasher) = inline_hasher.as_mut() {
            hasher.update(&buffer[..bytes_read]);
        }
        temp.write_all(&buffer[..bytes_read])
            .map_err(|e| ArchiveError::io(temp_path, e))?;
        bytes_copied += bytes_read as u64;
    }

    temp.sync_all().with_path(temp_path)?;
    drop(temp);

    let hash = match (&file.hash, inline_hasher) {
        (Some(hash), _) => hash.clone(),
        (None, Some(hasher)) => truncate_digest(&hasher.finalize()),
        (None, None) => unreachable!("inline hasher exists whenever hash is unknown"),
    };

    let final_path = media_dir.join(format!("{hash}{}", file.scanned.extension));
    fs::rename(temp_path, &final_path).with_path(&final_path)?;

    Ok((bytes_copied, hash, final_path))
}

fn unlink_quiet(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), "cleanup unlink failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{hash_bytes, MediaType, ScannedFile};
    use crate::progress::ProgressTracker;
    use crate::storage::archive_file_path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn ctx() -> StageContext {
        StageContext::new(Arc::new(ProgressTracker::new("s1", None)), Vec::new())
    }

    fn location() -> LocationInfo {
        LocationInfo::new("aaaaaaaaaaaaaaaa", Some("NY"))
    }

    fn options(archive_base: &Path) -> CopierOptions {
        CopierOptions {
            archive_base: archive_base.to_path_buf(),
            location: location(),
            workers: 2,
            buffer_size: 64 * 1024,
            operation_delay: Duration::ZERO,
            network: false,
        }
    }

    fn hashed_file(path: &Path, contents: &[u8], with_hash: bool) -> HashedFile {
        std::fs::write(path, contents).unwrap();
        let scanned = ScannedFile {
            id: uuid::Uuid::new_v4().to_string(),
            filename: path.file_name().unwrap().to_string_lossy().into_owned(),
            original_path: path.to_path_buf(),
            extension: format!(
                ".{}",
                path.extension().unwrap().to_string_lossy().to_lowercase()
            ),
            size: contents.len() as u64,
            media_type: MediaType::from_extension(&path.extension().unwrap().to_string_lossy()),
        };
        let mut file = HashedFile::from_scan(scanned);
        if with_hash {
            file.hash = Some(hash_bytes(contents));
        }
        file
    }

    #[test]
    fn test_prehashed_copy_lands_at_content_address() {
        let src = TempDir::new().unwrap();
        let archive = TempDir::new().unwrap();
        let contents = b"four megabytes, notionally".to_vec();
        let file = hashed_file(&src.path().join("a.jpg"), &contents, true);
        let hash = file.hash.clone().unwrap();

        let result = copy_files(vec![file], &options(archive.path()), &ctx()).unwrap();

        assert_eq!(result.total_copied, 1);
        assert_eq!(result.total_errors, 0);
        assert_eq!(result.total_bytes, contents.len() as u64);

        let expected =
            archive_file_path(archive.path(), &location(), MediaType::Image, &hash, ".jpg");
        assert_eq!(result.files[0].archive_path.as_ref(), Some(&expected));
        assert_eq!(std::fs::read(&expected).unwrap(), contents);

        // No temp litter in the destination directory.
        let leftovers: Vec<_> = std::fs::read_dir(expected.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_inline_hash_mode_fills_hash_at_eof() {
        let src = TempDir::new().unwrap();
        let archive = TempDir::new().unwrap();
        let contents = vec![0x5Au8; 3 * 1024 * 1024];
        let file = hashed_file(&src.path().join("b.mov"), &contents, false);
        assert!(file.hash.is_none());

        let mut opts = options(archive.path());
        opts.buffer_size = 1024 * 1024;
        let result = copy_files(vec![file], &opts, &ctx()).unwrap();

        let copied = &result.files[0];
        let hash = copied.hashed.hash.clone().expect("hash filled during copy");
        assert_eq!(hash, hash_bytes(&contents));

        let expected =
            archive_file_path(archive.path(), &location(), MediaType::Video, &hash, ".mov");
        assert_eq!(copied.archive_path.as_ref(), Some(&expected));
        assert_eq!(
            crate::pipeline::content_hash(&expected).unwrap(),
            hash,
            "archived bytes re-hash to the inline hash"
        );
    }

    #[test]
    fn test_failed_copy_reports_error_and_cleans_temp() {
        let src = TempDir::new().unwrap();
        let archive = TempDir::new().unwrap();
        let mut file = hashed_file(&src.path().join("c.jpg"), b"gone", true);
        std::fs::remove_file(&file.scanned.original_path).unwrap();
        file.scanned.size = 4;

        let result = copy_files(vec![file], &options(archive.path()), &ctx()).unwrap();

        assert_eq!(result.total_copied, 0);
        assert_eq!(result.total_errors, 1);
        let failed = &result.files[0];
        assert!(failed.archive_path.is_none());
        assert!(failed.copy_error.is_some());

        let media_dir = archive_media_dir(archive.path(), &location(), MediaType::Image);
        if media_dir.exists() {
            assert_eq!(std::fs::read_dir(&media_dir).unwrap().count(), 0);
        }
    }

    #[test]
    fn test_duplicates_pass_through_unchanged() {
        let src = TempDir::new().unwrap();
        let archive = TempDir::new().unwrap();
        let mut file = hashed_file(&src.path().join("d.jpg"), b"dup", true);
        file.is_duplicate = true;
        file.duplicate_in = Some("imgs".into());

        let result = copy_files(vec![file], &options(archive.path()), &ctx()).unwrap();
        assert_eq!(result.total_copied, 0);
        assert_eq!(result.total_errors, 0);
        assert!(result.files[0].archive_path.is_none());
        assert!(result.files[0].copy_error.is_none());
    }
}
