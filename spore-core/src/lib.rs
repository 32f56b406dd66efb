//! Spore Core
//!
//! Core types and abstractions for the Spore tool job service.
//!
//! This crate contains:
//! - Domain types: Job snapshots, log entries, command specifications
//! - Progress extraction: declarative rule tables and their interpreter
//! - Tools: parameter validation and command builders for wrapped tools
//! - DTOs: Response bodies shared by the orchestrator and its clients

pub mod domain;
pub mod dto;
pub mod progress;
pub mod tools;
