//! Data Transfer Objects for the HTTP API
//!
//! Submissions use [`crate::tools::JobRequest`] directly; snapshots and
//! stream events are the domain types themselves. This module holds the
//! remaining response bodies.

pub mod job;
