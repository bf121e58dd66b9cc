//! Atomic progress counters with throttled snapshot emission

use crate::pipeline::SessionStatus;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Share of the overall percentage each stage owns
/// (scan, hash, copy, validate, finalize).
pub const STAGE_WEIGHTS: [f64; 5] = [5.0, 35.0, 40.0, 15.0, 5.0];

/// Minimum gap between two emitted snapshots. Stage transitions and
/// terminal events bypass the throttle.
const EMIT_INTERVAL: Duration = Duration::from_millis(200);

/// Point-in-time view of a running import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Session the snapshot belongs to
    pub session_id: String,
    /// Lifecycle state at snapshot time
    pub status: SessionStatus,
    /// Current step, 1..=5 (0 before the scan starts)
    pub step: u8,
    /// Always 5
    pub total_steps: u8,
    /// Weighted across stages: scan 5%, hash 35%, copy 40%, validate 15%,
    /// finalize 5%
    pub percent: f64,
    /// File a worker most recently picked up
    pub current_file: Option<String>,
    /// Files handled within the current stage
    pub files_processed: u64,
    /// Batch size in files
    pub files_total: u64,
    /// Bytes handled within the current stage
    pub bytes_processed: u64,
    /// Batch size in bytes
    pub bytes_total: u64,
    /// Duplicates detected so far
    pub duplicates_found: u64,
    /// Per-file errors so far
    pub errors_found: u64,
    /// Extrapolated from elapsed time and weighted percent
    pub estimated_remaining_ms: Option<u64>,
}

/// Snapshot consumer supplied by the embedder
pub type ProgressCallback = Arc<dyn Fn(ProgressSnapshot) + Send + Sync>;

/// Shared, thread-safe progress state for one import session
pub struct ProgressTracker {
    session_id: String,
    callback: Option<ProgressCallback>,
    status: Mutex<SessionStatus>,
    step: AtomicU8,
    files_total: AtomicU64,
    bytes_total: AtomicU64,
    files_processed: AtomicU64,
    bytes_processed: AtomicU64,
    duplicates_found: AtomicU64,
    errors_found: AtomicU64,
    current_file: Mutex<Option<String>>,
    started: Instant,
    last_emit: Mutex<Instant>,
}

impl ProgressTracker {
    /// Create a tracker; `callback` may be `None` for silent runs
    pub fn new(session_id: impl Into<String>, callback: Option<ProgressCallback>) -> Self {
        let now = Instant::now();
        Self {
            session_id: session_id.into(),
            callback,
            status: Mutex::new(SessionStatus::Pending),
            step: AtomicU8::new(0),
            files_total: AtomicU64::new(0),
            bytes_total: AtomicU64::new(0),
            files_processed: AtomicU64::new(0),
            bytes_processed: AtomicU64::new(0),
            duplicates_found: AtomicU64::new(0),
            errors_found: AtomicU64::new(0),
            current_file: Mutex::new(None),
            started: now,
            // Backdate so the first in-stage emit is never throttled.
            last_emit: Mutex::new(now.checked_sub(EMIT_INTERVAL).unwrap_or(now)),
        }
    }

    /// Record the batch totals (known after the scan)
    pub fn set_totals(&self, files: u64, bytes: u64) {
        self.files_total.store(files, Ordering::Relaxed);
        self.bytes_total.store(bytes, Ordering::Relaxed);
    }

    /// Enter a stage: per-stage counters reset, snapshot emitted immediately
    pub fn begin_step(&self, step: u8, status: SessionStatus) {
        self.step.store(step, Ordering::Relaxed);
        *self.status.lock().expect("progress state poisoned") = status;
        self.files_processed.store(0, Ordering::Relaxed);
        self.bytes_processed.store(0, Ordering::Relaxed);
        self.emit(true);
    }

    /// Note the file a worker just picked up
    pub fn file_started(&self, name: &str) {
        *self.current_file.lock().expect("progress state poisoned") = Some(name.to_string());
        self.emit(false);
    }

    /// Count one finished file within the current stage
    pub fn file_done(&self, bytes: u64) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        self.bytes_processed.fetch_add(bytes, Ordering::Relaxed);
        self.emit(false);
    }

    /// Count a detected duplicate
    pub fn add_duplicate(&self) {
        self.duplicates_found.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a per-file error
    pub fn add_error(&self) {
        self.errors_found.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark a terminal state and emit unconditionally
    pub fn finish(&self, status: SessionStatus) {
        *self.status.lock().expect("progress state poisoned") = status;
        self.emit(true);
    }

    /// Weighted percentage across the five stages
    pub fn percent(&self) -> f64 {
        let step = self.step.load(Ordering::Relaxed);
        if step == 0 {
            return 0.0;
        }
        let completed: f64 = STAGE_WEIGHTS[..(step as usize - 1).min(5)].iter().sum();
        let total = self.files_total.load(Ordering::Relaxed);
        let fraction = if total == 0 {
            0.0
        } else {
            (self.files_processed.load(Ordering::Relaxed) as f64 / total as f64).min(1.0)
        };
        let current = STAGE_WEIGHTS.get(step as usize - 1).copied().unwrap_or(0.0);
        (completed + current * fraction).min(100.0)
    }

    /// Build a snapshot of the current state
    pub fn snapshot(&self) -> ProgressSnapshot {
        let percent = self.percent();
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let estimated_remaining_ms = if percent > 1.0 && percent < 100.0 {
            Some((elapsed_ms as f64 * (100.0 - percent) / percent) as u64)
        } else {
            None
        };

        ProgressSnapshot {
            session_id: self.session_id.clone(),
            status: *self.status.lock().expect("progress state poisoned"),
            step: self.step.load(Ordering::Relaxed),
            total_steps: 5,
            percent,
            current_file: self
                .current_file
                .lock()
                .expect("progress state poisoned")
                .clone(),
            files_processed: self.files_processed.load(Ordering::Relaxed),
            files_total: self.files_total.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
            bytes_total: self.bytes_total.load(Ordering::Relaxed),
            duplicates_found: self.duplicates_found.load(Ordering::Relaxed),
            errors_found: self.errors_found.load(Ordering::Relaxed),
            estimated_remaining_ms,
        }
    }

    fn emit(&self, force: bool) {
        let Some(callback) = &self.callback else {
            return;
        };

        {
            let mut last = self.last_emit.lock().expect("progress state poisoned");
            let now = Instant::now();
            if !force && now.duration_since(*last) < EMIT_INTERVAL {
                return;
            }
            *last = now;
        }

        callback(self.snapshot());
    }
}
