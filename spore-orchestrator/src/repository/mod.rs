//! Repository Module
//!
//! Data access layer for the orchestrator. Job state lives in memory only.

pub mod job;

// Re-export for convenience
pub use job as job_repository;
