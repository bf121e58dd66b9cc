//! Pipeline orchestration
//!
//! Drives the five stages strictly in order, persisting each stage's output
//! to the session row before the next begins. Holds the per-location lock
//! for the whole run, merges abort signals, and converts every failure into
//! a typed `ImportResult`; nothing escapes the public boundary as an error.

use crate::config::{ImportConfig, ImportOptions};
use crate::db::{self, ImportSession, SessionStore, StageColumn};
use crate::error::{ArchiveError, Result};
use crate::pipeline::{
    copy_files, finalize_files, hash_files, scan, skip_hashing, validate_files, CopierOptions,
    CopyResult, FinalizationResult, FinalizerOptions, HashResult, ScanResult, SessionStatus,
    StageContext, ValidationResult, ValidatorOptions,
};
use crate::progress::{ProgressSnapshot, ProgressTracker};
use crate::storage::{is_network_path, LOCAL_STORAGE, NETWORK_STORAGE};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Outcome of an `import` or `resume` call
#[derive(Debug, Clone)]
pub struct ImportResult {
    /// Session this run created or resumed
    pub session_id: String,
    /// Terminal state of the run
    pub status: SessionStatus,
    /// What stopped the run, when it did not complete
    pub error: Option<String>,
    /// Stage 1 output, when the stage ran or was reloaded
    pub scan_result: Option<ScanResult>,
    /// Stage 2 output
    pub hash_result: Option<HashResult>,
    /// Stage 3 output
    pub copy_result: Option<CopyResult>,
    /// Stage 4 output
    pub validation_result: Option<ValidationResult>,
    /// Stage 5 output
    pub finalization_result: Option<FinalizationResult>,
    /// Run wall-clock time
    pub duration_ms: u64,
}

impl ImportResult {
    /// Did the pipeline run to completion?
    pub fn is_success(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    fn failed(session_id: &str, error: String, started: Instant) -> Self {
        Self {
            session_id: session_id.to_string(),
            status: SessionStatus::Failed,
            error: Some(error),
            scan_result: None,
            hash_result: None,
            copy_result: None,
            validation_result: None,
            finalization_result: None,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Stage outputs accumulated (or reloaded) during a run
#[derive(Default)]
struct StageOutputs {
    scan: Option<ScanResult>,
    hash: Option<HashResult>,
    copy: Option<CopyResult>,
    validation: Option<ValidationResult>,
    finalization: Option<FinalizationResult>,
}

impl StageOutputs {
    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// The import pipeline engine
pub struct ImportEngine {
    config: ImportConfig,
    store: SessionStore,
    cancelled: Arc<AtomicBool>,
    current: Mutex<Option<Arc<ProgressTracker>>>,
}

impl ImportEngine {
    /// Create an engine over a shared configuration
    pub fn new(config: ImportConfig) -> Self {
        let store = SessionStore::new(config.db.clone());
        Self {
            config,
            store,
            cancelled: Arc::new(AtomicBool::new(false)),
            current: Mutex::new(None),
        }
    }

    /// Run a fresh import of `paths` into the configured archive
    pub fn import(&self, paths: &[PathBuf], options: &ImportOptions) -> ImportResult {
        let session_id = Uuid::new_v4().to_string();
        self.run(&session_id, paths.to_vec(), options, false)
    }

    /// Resume a checkpointed session at the step after its `last_step`.
    ///
    /// Missing or malformed checkpoints restart the pipeline from step 1
    /// under the same session id.
    pub fn resume(&self, session_id: &str, options: &ImportOptions) -> ImportResult {
        let started = Instant::now();
        let session = match self.store.load(session_id) {
            Ok(Some(session)) => session,
            Ok(None) => {
                return ImportResult::failed(
                    session_id,
                    ArchiveError::SessionNotFound(session_id.to_string()).to_string(),
                    started,
                )
            }
            Err(err) => return ImportResult::failed(session_id, err.to_string(), started),
        };

        if !session.can_resume || !session.status.can_resume() {
            return ImportResult::failed(
                session_id,
                ArchiveError::SessionNotResumable {
                    session_id: session_id.to_string(),
                    status: session.status.as_str().to_string(),
                }
                .to_string(),
                started,
            );
        }

        self.run(session_id, session.source_paths, options, true)
    }

    /// Abort the running import. In-flight per-file work finishes; no new
    /// file starts; the session ends `cancelled` and cannot be resumed.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Snapshot of the most recent run, if any
    pub fn status(&self) -> Option<ProgressSnapshot> {
        self.current
            .lock()
            .expect("engine state poisoned")
            .as_ref()
            .map(|tracker| tracker.snapshot())
    }

    /// Sessions that can be resumed
    pub fn resumable_sessions(&self) -> Result<Vec<ImportSession>> {
        self.store.resumable()
    }

    fn run(
        &self,
        session_id: &str,
        paths: Vec<PathBuf>,
        options: &ImportOptions,
        resuming: bool,
    ) -> ImportResult {
        let started = Instant::now();
        // Rearm the engine's abort signal for this run.
        self.cancelled.store(false, Ordering::SeqCst);

        let locid = options.location.locid.clone();
        if let Err(err) = self.config.lock.acquire(&locid, session_id) {
            // Contender loses fast, with no filesystem or DB side effects.
            return ImportResult::failed(session_id, err.to_string(), started);
        }

        let tracker = Arc::new(ProgressTracker::new(session_id, options.progress.clone()));
        *self.current.lock().expect("engine state poisoned") = Some(Arc::clone(&tracker));

        let mut cancel_flags = vec![Arc::clone(&self.cancelled)];
        if let Some(caller_flag) = &options.cancel {
            cancel_flags.push(Arc::clone(caller_flag));
        }
        let ctx = StageContext::new(Arc::clone(&tracker), cancel_flags);

        let mut outputs = StageOutputs::default();
        let outcome = self.run_pipeline(session_id, &paths, options, resuming, &ctx, &mut outputs);

        self.config.lock.release(&locid, session_id);

        let (status, error) = match outcome {
            Ok(()) => (SessionStatus::Completed, None),
            Err(ArchiveError::Cancelled) => {
                self.cleanup_cancelled_copies(&outputs);
                if let Err(err) = self.store.mark_cancelled(session_id) {
                    tracing::warn!(session_id, "failed to mark session cancelled: {err}");
                }
                (
                    SessionStatus::Cancelled,
                    Some(ArchiveError::Cancelled.to_string()),
                )
            }
            Err(err) => {
                let message = err.to_string();
                if let Err(err) = self.store.mark_failed(session_id, &message) {
                    tracing::warn!(session_id, "failed to mark session failed: {err}");
                }
                (SessionStatus::Failed, Some(message))
            }
        };

        tracker.finish(status);

        ImportResult {
            session_id: session_id.to_string(),
            status,
            error,
            scan_result: outputs.scan,
            hash_result: outputs.hash,
            copy_result: outputs.copy,
            validation_result: outputs.validation,
            finalization_result: outputs.finalization,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn run_pipeline(
        &self,
        session_id: &str,
        paths: &[PathBuf],
        options: &ImportOptions,
        resuming: bool,
        ctx: &StageContext,
        outputs: &mut StageOutputs,
    ) -> Result<()> {
        let store = &self.store;
        let hardware = self.config.hardware;
        let archive_base = &self.config.archive_base;

        if resuming {
            self.load_checkpoints(session_id, outputs)?;
        } else {
            store.create(&ImportSession::new(
                session_id,
                &options.location.locid,
                paths,
            ))?;
        }

        let source_network = paths.iter().any(|p| is_network_path(p));
        let inline_mode = source_network || options.force_inline_hash;
        let dest_network = is_network_path(archive_base);
        let transfer_network = source_network || dest_network;

        // Step 1: scan.
        let scan_result = match outputs.scan.clone() {
            Some(result) => result,
            None => {
                store.set_status(session_id, SessionStatus::Scanning)?;
                ctx.tracker().begin_step(1, SessionStatus::Scanning);
                let result = scan(paths, archive_base, ctx)?;
                store.set_totals(session_id, result.total_files, result.total_bytes)?;
                store.save_stage(session_id, StageColumn::Scan, &result, 1)?;
                outputs.scan = Some(result.clone());
                result
            }
        };
        ctx.tracker()
            .set_totals(scan_result.total_files, scan_result.total_bytes);

        // Step 2: hash (skipped for network sources; the copier hashes
        // inline so the slow link is read once).
        let hash_result = match outputs.hash.clone() {
            Some(result) => result,
            None => {
                store.set_status(session_id, SessionStatus::Hashing)?;
                ctx.tracker().begin_step(2, SessionStatus::Hashing);
                let result = if inline_mode {
                    skip_hashing(scan_result.files.clone())
                } else {
                    hash_files(
                        scan_result.files.clone(),
                        &self.config.db,
                        hardware.hash_workers,
                        ctx,
                    )?
                };
                store.save_stage(session_id, StageColumn::Hash, &result, 2)?;
                outputs.hash = Some(result.clone());
                result
            }
        };

        // Step 3: copy.
        let copy_result = match outputs.copy.clone() {
            Some(result) => result,
            None => {
                store.set_status(session_id, SessionStatus::Copying)?;
                ctx.tracker().begin_step(3, SessionStatus::Copying);
                let copier_options = CopierOptions {
                    archive_base: archive_base.clone(),
                    location: options.location.clone(),
                    workers: if transfer_network {
                        hardware.copy_workers_network
                    } else {
                        hardware.copy_workers
                    },
                    buffer_size: if transfer_network {
                        NETWORK_STORAGE.buffer_size
                    } else {
                        LOCAL_STORAGE.buffer_size
                    },
                    operation_delay: Duration::from_millis(if transfer_network {
                        NETWORK_STORAGE.operation_delay_ms
                    } else {
                        LOCAL_STORAGE.operation_delay_ms
                    }),
                    network: transfer_network,
                };
                let mut result = copy_files(hash_result.files.clone(), &copier_options, ctx)?;
                if inline_mode {
                    self.post_copy_duplicate_sweep(&mut result, ctx);
                }
                store.save_stage(session_id, StageColumn::Copy, &result, 3)?;
                store.set_progress(session_id, result.total_copied, result.total_bytes)?;
                outputs.copy = Some(result.clone());
                result
            }
        };

        // Step 4: validate (same network-aware scaling as the copier).
        let validation_result = match outputs.validation.clone() {
            Some(result) => result,
            None => {
                store.set_status(session_id, SessionStatus::Validating)?;
                ctx.tracker().begin_step(4, SessionStatus::Validating);
                let validator_options = ValidatorOptions {
                    workers: if dest_network {
                        hardware.copy_workers_network
                    } else {
                        hardware.hash_workers
                    },
                    auto_rollback: options.auto_rollback,
                    network: dest_network,
                };
                let result = validate_files(copy_result.files.clone(), &validator_options, ctx)?;
                store.save_stage(session_id, StageColumn::Validation, &result, 4)?;
                outputs.validation = Some(result.clone());
                result
            }
        };

        // Step 5: finalize. Cancellation is checked here for the last time;
        // the transaction itself is never interrupted.
        ctx.check_cancelled()?;
        store.set_status(session_id, SessionStatus::Finalizing)?;
        ctx.tracker().begin_step(5, SessionStatus::Finalizing);
        let finalizer_options = FinalizerOptions {
            location: options.location.clone(),
            user: options.user.clone(),
            notes: options.notes.clone(),
        };
        let result = finalize_files(
            validation_result.files.clone(),
            &self.config.db,
            &finalizer_options,
            ctx,
        )?;
        outputs.finalization = Some(result);

        store.mark_completed(session_id)?;
        Ok(())
    }

    /// Load persisted checkpoints for a resumed session. If any blob needed
    /// for the recorded `last_step` is missing or malformed, every output is
    /// discarded and the pipeline restarts from step 1.
    fn load_checkpoints(&self, session_id: &str, outputs: &mut StageOutputs) -> Result<()> {
        let session = self
            .store
            .load(session_id)?
            .ok_or_else(|| ArchiveError::SessionNotFound(session_id.to_string()))?;
        let last_step = session.last_step.min(4);

        if last_step >= 1 {
            outputs.scan = self.store.load_stage(session_id, StageColumn::Scan)?;
        }
        if last_step >= 2 {
            outputs.hash = self.store.load_stage(session_id, StageColumn::Hash)?;
        }
        if last_step >= 3 {
            outputs.copy = self.store.load_stage(session_id, StageColumn::Copy)?;
        }
        if last_step >= 4 {
            outputs.validation = self.store.load_stage(session_id, StageColumn::Validation)?;
        }

        let complete = (last_step < 1 || outputs.scan.is_some())
            && (last_step < 2 || outputs.hash.is_some())
            && (last_step < 3 || outputs.copy.is_some())
            && (last_step < 4 || outputs.validation.is_some());
        if !complete {
            tracing::warn!(
                session_id,
                last_step,
                "incomplete checkpoints; restarting from scratch"
            );
            outputs.clear();
        }

        Ok(())
    }

    /// A cancelled session is terminal: copied files that never reached the
    /// finalizer would be permanent orphans, so they are unlinked here.
    /// Failed sessions keep their files - a later resume re-validates them.
    fn cleanup_cancelled_copies(&self, outputs: &StageOutputs) {
        if outputs.finalization.is_some() {
            return;
        }
        let Some(copy) = &outputs.copy else {
            return;
        };
        for file in &copy.files {
            let Some(path) = &file.archive_path else {
                continue;
            };
            if file.hashed.is_duplicate {
                continue;
            }
            if let Err(err) = std::fs::remove_file(path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), "cancel cleanup failed: {err}");
                }
            }
        }
    }

    /// After an inline-hash copy the hashes are known for the first time;
    /// drop anything the archive already holds. Unlink failures are logged
    /// and left for the orphan sweep.
    fn post_copy_duplicate_sweep(&self, copy: &mut CopyResult, ctx: &StageContext) {
        let conn = match self.config.db.get() {
            Ok(conn) => conn,
            Err(err) => {
                tracing::warn!("duplicate sweep skipped, pool unavailable: {err}");
                return;
            }
        };

        for file in &mut copy.files {
            if file.hashed.is_duplicate {
                continue;
            }
            let (Some(hash), Some(path)) = (file.hashed.hash.clone(), file.archive_path.clone())
            else {
                continue;
            };

            let media_type = file.hashed.scanned.media_type;
            match db::media_archive_path(&conn, media_type, &hash) {
                Ok(Some(existing_path)) => {
                    file.hashed.is_duplicate = true;
                    file.hashed.duplicate_in = media_type.table_name().map(String::from);
                    ctx.tracker().add_duplicate();
                    // Same location means the copy landed exactly on the
                    // already-archived file; unlinking would delete the only
                    // copy behind the existing row.
                    if std::path::Path::new(&existing_path) != path.as_path() {
                        if let Err(err) = std::fs::remove_file(&path) {
                            tracing::warn!(
                                path = %path.display(),
                                "duplicate unlink failed, leaving for orphan sweep: {err}"
                            );
                        }
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(%hash, "duplicate sweep lookup failed: {err}");
                }
            }
        }
    }
}
