//! Error types for the import pipeline
//!
//! This module defines all error types used throughout the crate,
//! providing detailed error information for debugging and user feedback.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for archive operations
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File or directory not found
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// None of the requested input paths could be read
    #[error("All input paths are unreadable ({count} paths)")]
    AllInputsUnreadable { count: usize },

    /// Hash verification failed
    #[error("Integrity check failed for '{path}': expected {expected}, got {actual}")]
    IntegrityMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Another session holds the lock for this location
    #[error("Location {locid} is already being imported (session {holder})")]
    LocationBusy { locid: String, holder: String },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool error
    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Stage checkpoint serialization error
    #[error("Session checkpoint error: {0}")]
    Checkpoint(#[from] serde_json::Error),

    /// No session with the given id exists
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The session exists but is in a terminal state
    #[error("Session {session_id} cannot be resumed (status: {status})")]
    SessionNotResumable { session_id: String, status: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Thread pool error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Operation cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Per-file operation exceeded its wall-clock budget
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),
}

impl ArchiveError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an integrity mismatch error
    pub fn integrity_mismatch(
        path: impl Into<PathBuf>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::IntegrityMismatch {
            path: path.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check whether this error is worth retrying on a network filesystem.
    ///
    /// The retryable set is the transient error family SMB and NFS mounts
    /// produce under load: EAGAIN, ECONNRESET, ETIMEDOUT, EBUSY, EIO,
    /// ENETUNREACH, EPIPE. Local filesystem errors are never retried.
    pub fn is_network_retryable(&self) -> bool {
        match self {
            Self::Io { source, .. } => io_error_is_network_retryable(source),
            Self::Timeout(_) => true,
            _ => false,
        }
    }

    /// Get the path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. }
            | Self::NotFound(path)
            | Self::IntegrityMismatch { path, .. } => Some(path),
            _ => None,
        }
    }
}

#[cfg(unix)]
fn io_error_is_network_retryable(err: &std::io::Error) -> bool {
    match err.raw_os_error() {
        Some(code) => matches!(
            code,
            libc::EAGAIN
                | libc::ECONNRESET
                | libc::ETIMEDOUT
                | libc::EBUSY
                | libc::EIO
                | libc::ENETUNREACH
                | libc::EPIPE
        ),
        None => matches!(
            err.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::WouldBlock
                | std::io::ErrorKind::BrokenPipe
        ),
    }
}

#[cfg(not(unix))]
fn io_error_is_network_retryable(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::BrokenPipe
    )
}

/// Result type alias for archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| ArchiveError::io(path, e))
    }
}
