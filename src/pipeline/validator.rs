//! Validation stage
//!
//! Re-reads every copied archive file, recomputes its content hash, and
//! compares against the recorded one. Mismatches and unreadable files are
//! marked invalid and, unless rollback is disabled, the archive file is
//! unlinked so no corrupt bytes survive. Each re-read is wrapped in a
//! wall-clock timeout so a dead mount cannot hang the stage.

use crate::error::{ArchiveError, Result};
use crate::pipeline::{
    content_hash, CopiedFile, StageContext, ValidatedFile, ValidationResult, COPY_RETRY_BACKOFF,
};
use crossbeam::channel::{bounded, RecvTimeoutError};
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Per-file wall-clock budget for a re-read
pub const VALIDATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Validation stage configuration
#[derive(Debug, Clone)]
pub struct ValidatorOptions {
    /// Simultaneous re-reads (hash workers locally, 1 on network archives)
    pub workers: usize,
    /// Unlink archive files that fail validation
    pub auto_rollback: bool,
    /// The archive lives on a network mount; enables re-read retry
    pub network: bool,
}

/// Validate a batch of copied files.
pub fn validate_files(
    files: Vec<CopiedFile>,
    opts: &ValidatorOptions,
    ctx: &StageContext,
) -> Result<ValidationResult> {
    let start = Instant::now();
    let rolled_back = AtomicU64::new(0);

    let thread_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.workers.max(1))
        .build()
        .map_err(|e| ArchiveError::ThreadPool(e.to_string()))?;

    let validated: Vec<ValidatedFile> = thread_pool.install(|| {
        files
            .into_par_iter()
            .map(|file| {
                if !file.eligible_for_validation() {
                    return ValidatedFile {
                        copied: file,
                        is_valid: false,
                        validation_error: None,
                        retry_count: 0,
                    };
                }
                if ctx.is_cancelled() {
                    return ValidatedFile {
                        copied: file,
                        is_valid: false,
                        validation_error: None,
                        retry_count: 0,
                    };
                }

                ctx.tracker().file_started(&file.hashed.scanned.filename);
                let size = file.hashed.scanned.size;
                let result = validate_one(file, opts, &rolled_back);
                if !result.is_valid {
                    ctx.tracker().add_error();
                }
                ctx.tracker().file_done(size);
                result
            })
            .collect()
    });

    ctx.check_cancelled()?;

    let total_valid = validated.iter().filter(|f| f.is_valid).count() as u64;
    let total_invalid = validated
        .iter()
        .filter(|f| !f.is_valid && f.validation_error.is_some())
        .count() as u64;
    let total_retried: u64 = validated.iter().map(|f| u64::from(f.retry_count)).sum();

    Ok(ValidationResult {
        files: validated,
        total_valid,
        total_invalid,
        total_rolled_back: rolled_back.load(Ordering::Relaxed),
        total_retried,
        validation_time_ms: start.elapsed().as_millis() as u64,
    })
}

fn validate_one(
    file: CopiedFile,
    opts: &ValidatorOptions,
    rolled_back: &AtomicU64,
) -> ValidatedFile {
    let (Some(archive_path), Some(expected)) =
        (file.archive_path.clone(), file.hashed.hash.clone())
    else {
        // Eligibility is checked by the caller; an ineligible file passes
        // through unvalidated.
        return ValidatedFile {
            copied: file,
            is_valid: false,
            validation_error: None,
            retry_count: 0,
        };
    };

    let mut retry_count = 0u32;
    let error = loop {
        match rehash_with_timeout(archive_path.clone(), VALIDATION_TIMEOUT) {
            Ok(actual) if actual == expected => break None,
            Ok(actual) => {
                break Some(
                    ArchiveError::integrity_mismatch(&archive_path, &expected, actual).to_string(),
                );
            }
            Err(err) => {
                if opts.network
                    && err.is_network_retryable()
                    && (retry_count as usize) < COPY_RETRY_BACKOFF.len()
                {
                    tracing::warn!(
                        path = %archive_path.display(),
                        attempt = retry_count + 1,
                        "transient re-read failure, retrying: {err}"
                    );
                    std::thread::sleep(COPY_RETRY_BACKOFF[retry_count as usize]);
                    retry_count += 1;
                    continue;
                }
                break Some(err.to_string());
            }
        }
    };

    let is_valid = error.is_none();
    if let Some(error) = &error {
        tracing::warn!(path = %archive_path.display(), "validation failed: {error}");
        if opts.auto_rollback {
            match std::fs::remove_file(&archive_path) {
                Ok(()) => {
                    rolled_back.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    rolled_back.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    tracing::warn!(
                        path = %archive_path.display(),
                        "rollback unlink failed: {err}"
                    );
                }
            }
        }
    }

    ValidatedFile {
        copied: file,
        is_valid,
        validation_error: error,
        retry_count,
    }
}

/// Recompute a file's content hash on a helper thread, bounded by `timeout`.
///
/// On timeout the helper thread is abandoned; it holds no locks and exits
/// when its blocked read finally returns.
fn rehash_with_timeout(path: PathBuf, timeout: Duration) -> Result<String> {
    let (tx, rx) = bounded(1);
    std::thread::spawn(move || {
        let _ = tx.send(content_hash(&path));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(ArchiveError::Timeout(timeout.as_secs())),
        Err(RecvTimeoutError::Disconnected) => Err(ArchiveError::Timeout(timeout.as_secs())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{hash_bytes, CopyStrategy, HashedFile, MediaType, ScannedFile};
    use crate::progress::ProgressTracker;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn ctx() -> StageContext {
        StageContext::new(Arc::new(ProgressTracker::new("s1", None)), Vec::new())
    }

    fn opts() -> ValidatorOptions {
        ValidatorOptions {
            workers: 2,
            auto_rollback: true,
            network: false,
        }
    }

    fn copied_file(dir: &TempDir, name: &str, contents: &[u8], hash: &str) -> CopiedFile {
        let archive_path = dir.path().join(name);
        std::fs::write(&archive_path, contents).unwrap();
        let scanned = ScannedFile {
            id: uuid::Uuid::new_v4().to_string(),
            filename: name.to_string(),
            original_path: format!("/src/{name}").into(),
            extension: ".jpg".into(),
            size: contents.len() as u64,
            media_type: MediaType::Image,
        };
        let mut hashed = HashedFile::from_scan(scanned);
        hashed.hash = Some(hash.to_string());
        CopiedFile {
            hashed,
            archive_path: Some(archive_path),
            copy_error: None,
            copy_strategy: CopyStrategy::Copy,
            bytes_copied: contents.len() as u64,
        }
    }

    #[test]
    fn test_matching_hash_is_valid() {
        let dir = TempDir::new().unwrap();
        let contents = b"intact bytes";
        let file = copied_file(&dir, "ok.jpg", contents, &hash_bytes(contents));

        let result = validate_files(vec![file], &opts(), &ctx()).unwrap();
        assert_eq!(result.total_valid, 1);
        assert_eq!(result.total_invalid, 0);
        assert_eq!(result.total_rolled_back, 0);
        assert!(result.files[0].is_valid);
    }

    #[test]
    fn test_corruption_rolls_back() {
        let dir = TempDir::new().unwrap();
        // Recorded hash is for different bytes than what landed on disk.
        let file = copied_file(&dir, "bad.jpg", b"flipped byte", &hash_bytes(b"original"));
        let archive_path = file.archive_path.clone().unwrap();

        let result = validate_files(vec![file], &opts(), &ctx()).unwrap();
        assert_eq!(result.total_valid, 0);
        assert_eq!(result.total_invalid, 1);
        assert_eq!(result.total_rolled_back, 1);
        assert!(!archive_path.exists());

        let failed = &result.files[0];
        assert!(!failed.is_valid);
        assert!(failed
            .validation_error
            .as_deref()
            .unwrap()
            .contains("Integrity check failed"));
    }

    #[test]
    fn test_rollback_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let file = copied_file(&dir, "keep.jpg", b"flipped", &hash_bytes(b"original"));
        let archive_path = file.archive_path.clone().unwrap();

        let mut options = opts();
        options.auto_rollback = false;
        let result = validate_files(vec![file], &options, &ctx()).unwrap();

        assert_eq!(result.total_invalid, 1);
        assert_eq!(result.total_rolled_back, 0);
        assert!(archive_path.exists());
    }

    #[test]
    fn test_skipped_files_pass_through_without_error() {
        let scanned = ScannedFile {
            id: "x".into(),
            filename: "dup.jpg".into(),
            original_path: "/src/dup.jpg".into(),
            extension: ".jpg".into(),
            size: 1,
            media_type: MediaType::Image,
        };
        let mut hashed = HashedFile::from_scan(scanned);
        hashed.is_duplicate = true;
        hashed.hash = Some("0123456789abcdef".into());
        let file = CopiedFile {
            hashed,
            archive_path: None,
            copy_error: None,
            copy_strategy: CopyStrategy::Copy,
            bytes_copied: 0,
        };

        let result = validate_files(vec![file], &opts(), &ctx()).unwrap();
        assert_eq!(result.total_valid, 0);
        assert_eq!(result.total_invalid, 0);
        assert!(!result.files[0].is_valid);
        assert!(result.files[0].validation_error.is_none());
    }

    #[test]
    fn test_missing_archive_file_is_invalid() {
        let dir = TempDir::new().unwrap();
        let file = copied_file(&dir, "gone.jpg", b"bytes", &hash_bytes(b"bytes"));
        std::fs::remove_file(file.archive_path.as_ref().unwrap()).unwrap();

        let result = validate_files(vec![file], &opts(), &ctx()).unwrap();
        assert_eq!(result.total_invalid, 1);
        assert!(result.files[0].validation_error.is_some());
    }
}
