//! Storage policy and archive layout
//!
//! Classifies paths into local vs network I/O policy, derives the
//! content-addressed archive layout, and provides the orphan maintenance
//! sweep.

mod classifier;
mod layout;
mod orphans;

pub use classifier::*;
pub use layout::*;
pub use orphans::*;
