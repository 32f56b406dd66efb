//! Core domain types
//!
//! This module contains the structures shared between the orchestrator
//! (which owns job state), the runner (which executes commands) and the
//! client (which renders snapshots).

pub mod command;
pub mod job;
pub mod log;
pub mod tool;
