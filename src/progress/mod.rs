//! Progress tracking and snapshot emission
//!
//! The core renders nothing; it emits typed snapshots to a caller-provided
//! callback. Rendering (bars, UI) belongs to the embedding application.

mod tracker;

pub use tracker::*;
