//! Scan stage
//!
//! Expands the input paths, classifies each file by extension, and sizes the
//! batch. Files under the archive base are skipped so an import can never
//! ingest the archive into itself. Unknown media types are dropped here;
//! per-path problems are collected as warnings, and the scan only fails when
//! every input is unreadable.

use crate::error::{ArchiveError, Result};
use crate::pipeline::{MediaType, ScanResult, ScannedFile, StageContext};
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;

/// Assumed sustained throughput used for the duration estimate
const ESTIMATED_THROUGHPUT_BPS: u64 = 150 * 1024 * 1024;

/// Expand and classify the input paths.
///
/// Progress is reported as the fraction of input paths walked, not files
/// found (file counts are unknown until the walk finishes).
pub fn scan(paths: &[PathBuf], archive_base: &Path, ctx: &StageContext) -> Result<ScanResult> {
    ctx.tracker().set_totals(paths.len() as u64, 0);

    let mut files = Vec::new();
    let mut errors = Vec::new();
    let mut unreadable_inputs = 0usize;
    let mut dropped_unknown = 0u64;

    for input in paths {
        ctx.check_cancelled()?;
        ctx.tracker().file_started(&input.to_string_lossy());

        let metadata = match std::fs::metadata(input) {
            Ok(m) => m,
            Err(err) => {
                unreadable_inputs += 1;
                let message = format!("unreadable input '{}': {err}", input.display());
                tracing::warn!("{message}");
                errors.push(message);
                ctx.tracker().add_error();
                ctx.tracker().file_done(0);
                continue;
            }
        };

        if input.starts_with(archive_base) {
            tracing::warn!(
                path = %input.display(),
                "skipping input inside the archive base"
            );
            ctx.tracker().file_done(0);
            continue;
        }

        if metadata.is_file() {
            match classify(input) {
                Some(file) => files.push(file),
                None => dropped_unknown += 1,
            }
        } else {
            walk_directory(input, archive_base, &mut files, &mut errors, &mut dropped_unknown);
        }

        ctx.tracker().file_done(0);
    }

    if !paths.is_empty() && unreadable_inputs == paths.len() {
        return Err(ArchiveError::AllInputsUnreadable { count: paths.len() });
    }

    if dropped_unknown > 0 {
        tracing::debug!(dropped_unknown, "dropped files with unknown media type");
    }

    let total_files = files.len() as u64;
    let total_bytes: u64 = files.iter().map(|f| f.size).sum();
    let estimated_duration_ms = total_bytes * 1000 / ESTIMATED_THROUGHPUT_BPS;

    Ok(ScanResult {
        files,
        total_files,
        total_bytes,
        estimated_duration_ms,
        errors,
    })
}

fn walk_directory(
    root: &Path,
    archive_base: &Path,
    files: &mut Vec<ScannedFile>,
    errors: &mut Vec<String>,
    dropped_unknown: &mut u64,
) {
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                let message = format!("scan error under '{}': {err}", root.display());
                tracing::warn!("{message}");
                errors.push(message);
                continue;
            }
        };

        if !entry.file_type().is_file() || entry.path().starts_with(archive_base) {
            continue;
        }

        match classify(entry.path()) {
            Some(file) => files.push(file),
            None => *dropped_unknown += 1,
        }
    }
}

/// Build a scan record for one file, or `None` for unknown media types
fn classify(path: &Path) -> Option<ScannedFile> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let media_type = MediaType::from_extension(&extension);
    if media_type == MediaType::Unknown {
        return None;
    }

    let size = std::fs::metadata(path).map(|m| m.len()).ok()?;

    Some(ScannedFile {
        id: Uuid::new_v4().to_string(),
        filename: path.file_name()?.to_string_lossy().into_owned(),
        original_path: path.to_path_buf(),
        extension: if extension.is_empty() {
            String::new()
        } else {
            format!(".{extension}")
        },
        size,
        media_type,
    })
}
