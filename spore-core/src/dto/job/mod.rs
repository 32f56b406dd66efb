//! Job DTOs shared by the orchestrator API and its clients

use serde::{Deserialize, Serialize};

use crate::domain::job::JobId;

/// Response to an accepted job submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCreated {
    pub job_id: JobId,
}

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
