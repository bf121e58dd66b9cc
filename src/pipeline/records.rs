//! Stage records and stage results
//!
//! A file record is created by the scanner and grows one layer per stage:
//! `ScannedFile` → `HashedFile` → `CopiedFile` → `ValidatedFile` →
//! `FinalizedFile`. Each layer embeds its predecessor (flattened when
//! serialized), so every stage's JSON is a strict superset of the previous
//! stage's and the scan-time `id` survives to the end.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Media classification by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Raster and RAW still images
    Image,
    /// Video containers, consumer and pro
    Video,
    /// Text-shaped files: PDFs, subtitles/telemetry, notes
    Document,
    /// Geodata: tracks, waypoints, overlays
    Map,
    /// Anything else; dropped at scan time
    Unknown,
}

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "tif", "tiff", "heic", "heif", "webp", "gif", "bmp", "cr2", "cr3",
    "nef", "arw", "dng", "raf", "orf", "rw2",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "m4v", "avi", "mkv", "mts", "m2ts", "mpg", "mpeg", "wmv", "mxf", "braw", "r3d",
];

const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "txt", "srt", "csv", "md", "rtf", "doc", "docx"];

const MAP_EXTENSIONS: &[&str] = &["gpx", "kml", "kmz", "geojson"];

impl MediaType {
    /// Classify a bare extension (no dot, any case)
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_lowercase();
        let ext = ext.as_str();
        if IMAGE_EXTENSIONS.contains(&ext) {
            Self::Image
        } else if VIDEO_EXTENSIONS.contains(&ext) {
            Self::Video
        } else if DOCUMENT_EXTENSIONS.contains(&ext) {
            Self::Document
        } else if MAP_EXTENSIONS.contains(&ext) {
            Self::Map
        } else {
            Self::Unknown
        }
    }

    /// Short code used in `org-<type>` archive directory names
    pub fn org_code(&self) -> &'static str {
        match self {
            Self::Image => "img",
            Self::Video => "vid",
            Self::Document => "doc",
            Self::Map => "map",
            Self::Unknown => "misc",
        }
    }

    /// Inverse of [`org_code`](Self::org_code)
    pub fn from_org_code(code: &str) -> Option<Self> {
        match code {
            "img" => Some(Self::Image),
            "vid" => Some(Self::Video),
            "doc" => Some(Self::Document),
            "map" => Some(Self::Map),
            "misc" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Media table this type materializes into (`None` for unknown)
    pub fn table_name(&self) -> Option<&'static str> {
        match self {
            Self::Image => Some("imgs"),
            Self::Video => Some("vids"),
            Self::Document => Some("docs"),
            Self::Map => Some("maps"),
            Self::Unknown => None,
        }
    }

    /// Hash column of the media table (`imghash`, `vidhash`, ...)
    pub fn hash_column(&self) -> Option<&'static str> {
        match self {
            Self::Image => Some("imghash"),
            Self::Video => Some("vidhash"),
            Self::Document => Some("dochash"),
            Self::Map => Some("maphash"),
            Self::Unknown => None,
        }
    }

    /// The four types that land in the archive
    pub const ARCHIVED: [MediaType; 4] = [Self::Image, Self::Video, Self::Document, Self::Map];
}

/// Lifecycle state of an import session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created, no stage started yet
    Pending,
    /// Stage 1 running
    Scanning,
    /// Stage 2 running
    Hashing,
    /// Stage 3 running
    Copying,
    /// Stage 4 running
    Validating,
    /// Stage 5 running
    Finalizing,
    /// Terminal success
    Completed,
    /// Stopped on a fatal error; checkpoints preserved for resume
    Failed,
    /// Aborted by the caller; terminal
    Cancelled,
}

impl SessionStatus {
    /// Stable string form stored in the session row
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scanning => "scanning",
            Self::Hashing => "hashing",
            Self::Copying => "copying",
            Self::Validating => "validating",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the stored string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "scanning" => Some(Self::Scanning),
            "hashing" => Some(Self::Hashing),
            "copying" => Some(Self::Copying),
            "validating" => Some(Self::Validating),
            "finalizing" => Some(Self::Finalizing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal-success and cancelled sessions cannot be resumed
    pub fn can_resume(&self) -> bool {
        !matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// A file discovered by the scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedFile {
    /// Opaque identifier assigned at scan time; survives through all stages
    pub id: String,
    /// File name including extension
    pub filename: String,
    /// Absolute source path
    pub original_path: PathBuf,
    /// Extension including the leading dot, lowercased (empty if none)
    pub extension: String,
    /// Size in bytes at scan time
    pub size: u64,
    /// Classification; `unknown` files never reach this record
    pub media_type: MediaType,
}

/// A scanned file after the hash stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashedFile {
    /// The scan-stage record this one extends
    #[serde(flatten)]
    pub scanned: ScannedFile,
    /// BLAKE3-16 content hash; `None` when hashing failed or was deferred
    /// to the copier (network sources)
    pub hash: Option<String>,
    /// Why hashing failed, if it did
    pub hash_error: Option<String>,
    /// An identical hash already exists in the archive
    pub is_duplicate: bool,
    /// Media table holding the pre-existing row
    pub duplicate_in: Option<String>,
}

impl HashedFile {
    /// Wrap a scan record with empty hash-stage fields
    pub fn from_scan(scanned: ScannedFile) -> Self {
        Self {
            scanned,
            hash: None,
            hash_error: None,
            is_duplicate: false,
            duplicate_in: None,
        }
    }

    /// Duplicates and hash failures are excluded from the copy stage
    pub fn eligible_for_copy(&self) -> bool {
        !self.is_duplicate && self.hash_error.is_none()
    }
}

/// Strategy used to place bytes into the archive.
///
/// A single strategy today; recorded per file so future strategies (reflink,
/// server-side copy) stay distinguishable in persisted results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyStrategy {
    /// Buffered stream copy through a temp file
    #[default]
    Copy,
}

/// A hashed file after the copy stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopiedFile {
    /// The hash-stage record this one extends
    #[serde(flatten)]
    pub hashed: HashedFile,
    /// Final content-addressed path; `None` when the copy failed
    pub archive_path: Option<PathBuf>,
    /// Why the copy failed, if it did
    pub copy_error: Option<String>,
    /// How the bytes were placed
    pub copy_strategy: CopyStrategy,
    /// Bytes actually written to the archive
    pub bytes_copied: u64,
}

impl CopiedFile {
    /// The scan-time record
    pub fn scanned(&self) -> &ScannedFile {
        &self.hashed.scanned
    }

    /// Copied files with a known hash proceed to validation. Duplicates are
    /// excluded: the post-copy sweep may have unlinked their archive file.
    pub fn eligible_for_validation(&self) -> bool {
        self.archive_path.is_some()
            && self.copy_error.is_none()
            && self.hashed.hash.is_some()
            && !self.hashed.is_duplicate
    }
}

/// A copied file after integrity validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedFile {
    /// The copy-stage record this one extends
    #[serde(flatten)]
    pub copied: CopiedFile,
    /// Re-read hash matched the recorded hash
    pub is_valid: bool,
    /// Why validation failed, if it did
    pub validation_error: Option<String>,
    /// Re-read attempts beyond the first
    pub retry_count: u32,
}

impl ValidatedFile {
    /// The scan-time record
    pub fn scanned(&self) -> &ScannedFile {
        &self.copied.hashed.scanned
    }

    /// The content hash, when known
    pub fn hash(&self) -> Option<&str> {
        self.copied.hashed.hash.as_deref()
    }

    /// Valid files with an archive path are materialized by the finalizer
    pub fn eligible_for_finalize(&self) -> bool {
        self.is_valid && self.copied.archive_path.is_some()
    }
}

/// A validated file after database materialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedFile {
    /// The validation-stage record this one extends
    #[serde(flatten)]
    pub validated: ValidatedFile,
    /// Key of the inserted media row (the content hash), `None` on failure
    pub db_record_id: Option<String>,
    /// Why the insert failed, if it did
    pub finalize_error: Option<String>,
}

impl FinalizedFile {
    /// The scan-time record
    pub fn scanned(&self) -> &ScannedFile {
        self.validated.scanned()
    }
}

/// Output of the scan stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Everything found, classified, and kept
    pub files: Vec<ScannedFile>,
    /// Count of `files`
    pub total_files: u64,
    /// Sum of file sizes
    pub total_bytes: u64,
    /// Rough wall-clock estimate for the whole import
    pub estimated_duration_ms: u64,
    /// Per-path problems that did not abort the scan
    pub errors: Vec<String>,
}

/// Output of the hash stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashResult {
    /// Every scanned file, hash fields filled in
    pub files: Vec<HashedFile>,
    /// Files with a computed hash (0 when deferred to the copier)
    pub total_hashed: u64,
    /// Files already present in a media table
    pub total_duplicates: u64,
    /// Files whose hashing failed
    pub total_errors: u64,
}

/// Output of the copy stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyResult {
    /// Every hashed file, copy fields filled in
    pub files: Vec<CopiedFile>,
    /// Files placed at their archive path
    pub total_copied: u64,
    /// Bytes written
    pub total_bytes: u64,
    /// Files whose copy failed
    pub total_errors: u64,
    /// Placement strategy used for the batch
    pub strategy: CopyStrategy,
    /// Stage wall-clock time
    pub copy_time_ms: u64,
    /// Megabytes per second over the stage
    pub throughput_mbps: f64,
}

/// Output of the validation stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Every copied file, validation fields filled in
    pub files: Vec<ValidatedFile>,
    /// Files whose re-read matched the recorded hash
    pub total_valid: u64,
    /// Files that failed re-read or mismatched
    pub total_invalid: u64,
    /// Invalid archive files unlinked
    pub total_rolled_back: u64,
    /// Total re-read retry attempts across the batch
    pub total_retried: u64,
    /// Stage wall-clock time
    pub validation_time_ms: u64,
}

/// Output of the finalize stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizationResult {
    /// Every validated file, finalize fields filled in
    pub files: Vec<FinalizedFile>,
    /// Media rows inserted
    pub total_finalized: u64,
    /// Per-row insert failures
    pub total_errors: u64,
    /// Downstream jobs enqueued after commit
    pub jobs_queued: u64,
    /// Key of the `imports` row recording the batch
    pub import_record_id: Option<String>,
    /// Stage wall-clock time
    pub finalize_time_ms: u64,
}
