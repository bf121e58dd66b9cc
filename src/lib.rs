//! # MediaVault - Import Pipeline Core
//!
//! MediaVault ingests batches of media files (images, videos, documents,
//! maps) from local disks or network shares into a content-addressed archive
//! tree, records them in a relational database, and enqueues downstream
//! processing jobs - concurrently, atomically, and resumably.
//!
//! ## Features
//!
//! - **Content-addressed storage**: archive paths are a pure function of
//!   location, media type, and a truncated BLAKE3 hash
//! - **Crash-safe placement**: temp-write, fsync, rename; corrupted writes
//!   are re-verified and rolled back
//! - **Adaptive I/O policy**: parallel on local disks, throttled and
//!   retry-heavy on SMB/NFS mounts
//! - **Resumable sessions**: every stage checkpoints to the database, so a
//!   crashed import continues at the step boundary it last completed
//! - **Single-writer locations**: at most one active import per location
//! - **Exactly-once materialization**: one transaction covers the whole
//!   batch across all media types
//!
//! ## Quick Start
//!
//! ```no_run
//! use mediavault::config::{ImportConfig, ImportOptions, ImportUser, LocationInfo};
//! use mediavault::db::{init_schema, open_pool};
//! use mediavault::pipeline::ImportEngine;
//! use std::path::Path;
//!
//! # fn main() -> mediavault::Result<()> {
//! let pool = open_pool(Path::new("/archive/mediavault.sqlite"))?;
//! let conn = pool.get()?;
//! init_schema(&conn)?;
//!
//! let engine = ImportEngine::new(ImportConfig::new("/archive", pool));
//! let options = ImportOptions::new(
//!     LocationInfo::new("aaaaaaaaaaaaaaaa", Some("NY")),
//!     ImportUser::new("nora"),
//! );
//!
//! let result = engine.import(&["/import/batch01".into()], &options);
//! println!("{:?}: {} files archived", result.status,
//!     result.finalization_result.map(|f| f.total_finalized).unwrap_or(0));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod pipeline;
pub mod progress;
pub mod storage;
pub mod sync;
pub mod system;

// Re-export commonly used types
pub use config::{ImportConfig, ImportOptions, ImportUser, LocationInfo};
pub use error::{ArchiveError, Result};
pub use pipeline::{ImportEngine, ImportResult, MediaType, SessionStatus};
pub use progress::{ProgressCallback, ProgressSnapshot};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use mediavault::prelude::*;
    //! ```

    pub use crate::config::{ImportConfig, ImportOptions, ImportUser, LocationInfo};
    pub use crate::db::{init_schema, open_pool, DbPool, ImportSession, SessionStore};
    pub use crate::error::{ArchiveError, Result};
    pub use crate::jobs::{JobPriority, JobQueueKind, JobRecord};
    pub use crate::pipeline::{ImportEngine, ImportResult, MediaType, SessionStatus};
    pub use crate::progress::{ProgressCallback, ProgressSnapshot};
    pub use crate::storage::{archive_file_path, is_network_path, storage_config};
    pub use crate::system::HardwareProfile;
}
