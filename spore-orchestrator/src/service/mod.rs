//! Service Module
//!
//! Business logic layer for the orchestrator: the job registry and the
//! progress broadcaster it publishes to.

pub mod broadcast;
pub mod registry;

// Re-export for convenience
pub use broadcast::{ProgressBroadcaster, Subscription};
pub use registry::{JobRegistry, RegistryError, RegistryOptions};
