//! Configuration module for the import pipeline
//!
//! Provides the option structs callers hand to the orchestrator, plus the
//! identity records (location, importer) the pipeline threads through every
//! stage.

mod settings;

pub use settings::*;
