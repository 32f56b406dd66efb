//! Job-related API endpoints

use futures::Stream;
use reqwest::header::ACCEPT;
use spore_core::domain::job::{JobId, JobSnapshot, ProgressEvent};
use spore_core::dto::job::JobCreated;
use spore_core::tools::JobRequest;

use crate::error::Result;
use crate::{SporeClient, check_status, sse};

impl SporeClient {
    /// Submit a tool job
    ///
    /// Fails with a 409 `ApiError` while every job slot is busy.
    pub async fn submit_job(&self, request: &JobRequest) -> Result<JobId> {
        let url = format!("{}/jobs", self.base_url);
        tracing::debug!("Submitting {} job to {}", request.tool(), url);
        let response = self.client.post(&url).json(request).send().await?;

        let created: JobCreated = self.handle_response(response).await?;
        Ok(created.job_id)
    }

    /// Get the current state of a job
    pub async fn get_job(&self, job_id: JobId) -> Result<JobSnapshot> {
        let url = format!("{}/jobs/{}", self.base_url, job_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// List retained jobs, newest first
    pub async fn list_jobs(&self) -> Result<Vec<JobSnapshot>> {
        let url = format!("{}/jobs", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Cancel a running job and return its settled state
    pub async fn cancel_job(&self, job_id: JobId) -> Result<JobSnapshot> {
        let url = format!("{}/jobs/{}/cancel", self.base_url, job_id);
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    /// Follow a job's progress events
    ///
    /// The first event is the job's current state; the stream ends after the
    /// job reaches a terminal state.
    pub async fn stream_job(
        &self,
        job_id: JobId,
    ) -> Result<impl Stream<Item = Result<ProgressEvent>> + Send + 'static> {
        let url = format!("{}/jobs/{}/stream", self.base_url, job_id);
        tracing::debug!("Following progress of job {}", job_id);
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(sse::progress_events(Box::pin(response.bytes_stream())))
    }
}
