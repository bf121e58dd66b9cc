//! System resource detection
//!
//! Detects CPU and memory capacity once at startup and scales the
//! per-stage worker counts from them.

mod resources;

pub use resources::*;
