//! Option structs and identity records for import runs

use crate::db::DbPool;
use crate::progress::ProgressCallback;
use crate::sync::LocationLock;
use crate::system::HardwareProfile;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// A site being archived, identified by a stable 16-hex id.
///
/// `address_state` is a two-letter US state code when known; the archive
/// layout substitutes `XX` otherwise. `subid` names an optional child
/// structure (a sub-location) within the site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationInfo {
    /// 16-character lowercase hex identifier
    pub locid: String,
    /// Two-letter state code, if known
    pub address_state: Option<String>,
    /// 16-character lowercase hex sub-location identifier, if any
    pub subid: Option<String>,
}

impl LocationInfo {
    /// Create a location with no sub-location
    pub fn new(locid: impl Into<String>, address_state: Option<&str>) -> Self {
        Self {
            locid: locid.into(),
            address_state: address_state.map(|s| s.to_string()),
            subid: None,
        }
    }

    /// Builder-style sub-location
    pub fn with_subid(mut self, subid: impl Into<String>) -> Self {
        self.subid = Some(subid.into());
        self
    }
}

/// Opaque importer identity.
///
/// Credential management lives outside the core; the pipeline only records
/// who performed the import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportUser {
    /// Stable identifier recorded on every imported row
    pub id: String,
}

impl ImportUser {
    /// Create an importer identity
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Static engine configuration shared by every import run
#[derive(Clone)]
pub struct ImportConfig {
    /// Root of the content-addressed archive tree
    pub archive_base: PathBuf,
    /// Shared connection pool; stages 1-4 read, only the finalizer writes
    pub db: DbPool,
    /// Worker counts detected once at startup
    pub hardware: HardwareProfile,
    /// Process-wide per-location mutex
    pub lock: Arc<LocationLock>,
}

impl ImportConfig {
    /// Create an engine configuration with a freshly detected hardware profile
    pub fn new(archive_base: impl Into<PathBuf>, db: DbPool) -> Self {
        Self {
            archive_base: archive_base.into(),
            db,
            hardware: HardwareProfile::detect(),
            lock: Arc::new(LocationLock::new()),
        }
    }

    /// Override the hardware profile (tests pin worker counts with this)
    pub fn with_hardware(mut self, hardware: HardwareProfile) -> Self {
        self.hardware = hardware;
        self
    }

    /// Share a lock table across engines
    pub fn with_lock(mut self, lock: Arc<LocationLock>) -> Self {
        self.lock = lock;
        self
    }
}

/// Per-run options for `import` and `resume`
#[derive(Clone)]
pub struct ImportOptions {
    /// Target location for every file in the batch
    pub location: LocationInfo,
    /// Who is importing
    pub user: ImportUser,
    /// Snapshot callback; invoked at most every 200 ms plus stage boundaries
    pub progress: Option<ProgressCallback>,
    /// Caller-owned abort flag, merged with the engine's own
    pub cancel: Option<Arc<AtomicBool>>,
    /// Unlink archive files that fail validation (default true)
    pub auto_rollback: bool,
    /// Force the copier's inline-hash mode even for local sources.
    /// The orchestrator sets this automatically for network sources.
    pub force_inline_hash: bool,
    /// Free-form note recorded on the imports row
    pub notes: Option<String>,
}

impl ImportOptions {
    /// Create options with defaults for the given location and importer
    pub fn new(location: LocationInfo, user: ImportUser) -> Self {
        Self {
            location,
            user,
            progress: None,
            cancel: None,
            auto_rollback: true,
            force_inline_hash: false,
            notes: None,
        }
    }

    /// Attach a progress callback
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Attach a caller-owned cancellation flag
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Disable rollback of invalid archive files
    pub fn without_rollback(mut self) -> Self {
        self.auto_rollback = false;
        self
    }
}
