//! ID resolver module
//!
//! Resolves job id prefixes to full ids by listing the orchestrator's jobs,
//! so users can type a short unambiguous prefix instead of a full UUID.

use anyhow::{Context, Result, anyhow};
use spore_client::SporeClient;
use spore_core::domain::job::JobId;

/// Resolve a job ID or prefix to a full ID
pub async fn resolve_job_id(client: &SporeClient, input: &str) -> Result<JobId> {
    if let Ok(id) = input.parse::<JobId>() {
        return Ok(id);
    }

    tracing::debug!("Resolving job prefix '{}'", input);
    let jobs = client
        .list_jobs()
        .await
        .context("Failed to fetch jobs for ID resolution")?;

    match_prefix(jobs.iter().map(|job| job.id), input)
}

/// Picks the single id starting with `prefix`
fn match_prefix(ids: impl IntoIterator<Item = JobId>, prefix: &str) -> Result<JobId> {
    let prefix = prefix.trim().to_lowercase();
    if prefix.is_empty() {
        return Err(anyhow!("Job ID cannot be empty"));
    }

    let matches: Vec<JobId> = ids
        .into_iter()
        .filter(|id| id.to_string().starts_with(&prefix))
        .collect();

    match matches.as_slice() {
        [] => Err(anyhow!("No job found with ID starting with '{}'", prefix)),
        [id] => Ok(*id),
        _ => {
            let ids: Vec<String> = matches.iter().map(|id| id.to_string()).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple jobs: {}",
                prefix,
                ids.join(", ")
            ))
        }
    }
}
