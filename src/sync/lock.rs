//! Per-location import lock
//!
//! At most one active session may write to a location at a time. The lock
//! table is process-local: every engine in the process must share one
//! `LocationLock` (the default `ImportConfig` creates one per engine, so
//! embedders running multiple engines pass a shared `Arc`). Multi-process
//! exclusion would need a lock file or DB advisory lock and is out of scope.

use crate::error::{ArchiveError, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// Process-wide map from location id to the session holding it
#[derive(Debug, Default)]
pub struct LocationLock {
    held: Mutex<HashMap<String, String>>,
}

impl LocationLock {
    /// Empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `locid`, failing fast if any session holds it.
    /// There is no wait queue; contenders get an error immediately.
    pub fn acquire(&self, locid: &str, session_id: &str) -> Result<()> {
        let mut held = self.held.lock().expect("lock table poisoned");
        if let Some(holder) = held.get(locid) {
            return Err(ArchiveError::LocationBusy {
                locid: locid.to_string(),
                holder: holder.clone(),
            });
        }
        held.insert(locid.to_string(), session_id.to_string());
        Ok(())
    }

    /// Release the lock if and only if `session_id` holds it.
    /// Returns whether a release happened.
    pub fn release(&self, locid: &str, session_id: &str) -> bool {
        let mut held = self.held.lock().expect("lock table poisoned");
        match held.get(locid) {
            Some(holder) if holder == session_id => {
                held.remove(locid);
                true
            }
            _ => false,
        }
    }

    /// Session currently holding `locid`, if any
    pub fn holder(&self, locid: &str) -> Option<String> {
        self.held
            .lock()
            .expect("lock table poisoned")
            .get(locid)
            .cloned()
    }
}
