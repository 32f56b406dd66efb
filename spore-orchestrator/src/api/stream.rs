//! Progress stream endpoint
//!
//! Relays a job's progress events as Server-Sent Events. The first event
//! carries the current state and the stream ends after the terminal one.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use spore_core::domain::job::JobId;
use tokio_stream::StreamExt;

use crate::api::error::ApiResult;
use crate::service::JobRegistry;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// GET /jobs/{id}/stream
pub async fn stream_job(
    State(registry): State<JobRegistry>,
    Path(id): Path<JobId>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let subscription = registry.subscribe(id)?;
    tracing::debug!("Streaming job {} to subscriber {}", id, subscription.id());

    let events = subscription.into_stream().filter_map(|event| {
        match Event::default().event("progress").json_data(&event) {
            Ok(sse) => Some(Ok(sse)),
            Err(e) => {
                tracing::warn!("Failed to encode event for job {}: {}", event.job_id, e);
                None
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}
