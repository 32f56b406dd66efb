//! Spore HTTP Client
//!
//! A type-safe HTTP client for the Spore orchestrator API, shared by the CLI
//! and any other program that submits or follows jobs.
//!
//! # Example
//!
//! ```no_run
//! use futures::StreamExt;
//! use spore_client::SporeClient;
//! use spore_core::domain::command::CommandSpec;
//! use spore_core::tools::JobRequest;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SporeClient::new("http://localhost:8080");
//!
//!     let request = JobRequest::Command(CommandSpec::new("sleep").arg("5"));
//!     let job_id = client.submit_job(&request).await?;
//!
//!     let mut events = Box::pin(client.stream_job(job_id).await?);
//!     while let Some(event) = events.next().await {
//!         println!("{}%", event?.progress);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod jobs;
mod sse;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use spore_core::domain::job::{JobSnapshot, ProgressEvent};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Spore orchestrator API
#[derive(Debug, Clone)]
pub struct SporeClient {
    /// Base URL of the orchestrator (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl SporeClient {
    /// Create a new client for the orchestrator at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    /// Keep in mind that a total request timeout also cuts long-lived
    /// progress streams.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the orchestrator
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET /health
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        check_status(response).await.map(|_| ())
    }

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

/// Turns non-success responses into `ClientError::ApiError`
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    Ok(response)
}
