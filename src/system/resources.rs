//! Hardware-scaled concurrency limits

use serde::{Deserialize, Serialize};
use sysinfo::System;

const GIB: u64 = 1024 * 1024 * 1024;

/// Worker counts for the pipeline stages, scaled from CPU count and RAM.
///
/// Detected once at startup; the orchestrator never re-detects mid-import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareProfile {
    /// Parallel BLAKE3 workers for local sources
    pub hash_workers: usize,
    /// Parallel copy tasks for local destinations
    pub copy_workers: usize,
    /// Parallel copy tasks when either end is a network mount.
    /// SMB shares degrade badly past a single writer, so this is 1.
    pub copy_workers_network: usize,
}

impl HardwareProfile {
    /// Detect a profile from the current machine
    pub fn detect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        let total_ram = sys.total_memory();
        let logical_cores = num_cpus::get();

        Self::from_resources(logical_cores, total_ram)
    }

    /// Build a profile from explicit resource figures
    pub fn from_resources(logical_cores: usize, total_ram_bytes: u64) -> Self {
        let hash_workers = logical_cores.clamp(2, 16);

        // Copy tasks are I/O bound; oversubscribe the cores but stay under
        // the local storage config's concurrency ceiling of 22.
        let mut copy_workers = (logical_cores * 2).clamp(4, 22);
        if total_ram_bytes < 8 * GIB {
            copy_workers = (copy_workers / 2).max(2);
        }

        Self {
            hash_workers,
            copy_workers,
            copy_workers_network: 1,
        }
    }

    /// A profile with every stage pinned to one worker (deterministic tests)
    pub fn serial() -> Self {
        Self {
            hash_workers: 1,
            copy_workers: 1,
            copy_workers_network: 1,
        }
    }
}

impl Default for HardwareProfile {
    fn default() -> Self {
        Self::detect()
    }
}
