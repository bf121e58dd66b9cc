//! The five-stage import pipeline
//!
//! Scan, hash, copy, validate, finalize. Stages run strictly in order; each
//! stage's output is persisted to the session row before the next begins, so
//! a crashed import can resume at the step boundary it last completed.

mod copier;
mod finalizer;
mod hasher;
mod orchestrator;
mod records;
mod scanner;
mod validator;

pub use copier::*;
pub use finalizer::*;
pub use hasher::*;
pub use orchestrator::*;
pub use records::*;
pub use scanner::*;
pub use validator::*;

use crate::error::{ArchiveError, Result};
use crate::progress::ProgressTracker;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared state threaded through every stage: the progress tracker and the
/// merged abort signals (the engine's own plus the caller's, if any).
#[derive(Clone)]
pub struct StageContext {
    tracker: Arc<ProgressTracker>,
    cancel_flags: Vec<Arc<AtomicBool>>,
}

impl StageContext {
    /// Build a context from a tracker and any number of abort flags
    pub fn new(tracker: Arc<ProgressTracker>, cancel_flags: Vec<Arc<AtomicBool>>) -> Self {
        Self {
            tracker,
            cancel_flags,
        }
    }

    /// The progress tracker for this run
    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Has any merged abort flag been raised?
    pub fn is_cancelled(&self) -> bool {
        self.cancel_flags.iter().any(|f| f.load(Ordering::SeqCst))
    }

    /// Error out if cancelled
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ArchiveError::Cancelled)
        } else {
            Ok(())
        }
    }
}
