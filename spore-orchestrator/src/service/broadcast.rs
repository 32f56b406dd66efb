//! Progress Broadcaster
//!
//! Fans progress events out to stream subscribers. Every subscriber owns a
//! latest-value channel, so publishing never blocks and a slow reader only
//! ever observes the newest event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::Stream;
use spore_core::domain::job::{JobId, ProgressEvent};
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

pub type SubscriberId = u64;

type Subscribers = HashMap<JobId, HashMap<SubscriberId, watch::Sender<ProgressEvent>>>;

#[derive(Debug, Default)]
pub struct ProgressBroadcaster {
    subscribers: Mutex<Subscribers>,
    next_id: AtomicU64,
}

impl ProgressBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber for `job_id`, seeded with `initial`
    pub fn subscribe(self: &Arc<Self>, job_id: JobId, initial: ProgressEvent) -> Subscription {
        let (id, receiver) = self.register(job_id, initial);
        Subscription {
            receiver,
            guard: Unsubscribe {
                broadcaster: Some(self.clone()),
                job_id,
                id,
            },
        }
    }

    /// A subscription that yields `last` and then ends
    ///
    /// Used for jobs that already finished: there is nothing left to publish.
    pub fn detached(job_id: JobId, last: ProgressEvent) -> Subscription {
        let (_, receiver) = watch::channel(last);
        Subscription {
            receiver,
            guard: Unsubscribe {
                broadcaster: None,
                job_id,
                id: 0,
            },
        }
    }

    pub(crate) fn register(
        &self,
        job_id: JobId,
        initial: ProgressEvent,
    ) -> (SubscriberId, watch::Receiver<ProgressEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = watch::channel(initial);
        self.subscribers
            .lock()
            .unwrap()
            .entry(job_id)
            .or_default()
            .insert(id, sender);
        debug!("Subscriber {} added for job {}", id, job_id);
        (id, receiver)
    }

    /// Removes a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, job_id: JobId, id: SubscriberId) {
        let mut subscribers = self.subscribers.lock().unwrap();
        if let Some(job_subscribers) = subscribers.get_mut(&job_id) {
            if job_subscribers.remove(&id).is_some() {
                debug!("Subscriber {} removed from job {}", id, job_id);
            }
            if job_subscribers.is_empty() {
                subscribers.remove(&job_id);
            }
        }
    }

    /// Delivers `event` to every subscriber of its job
    ///
    /// Subscribers whose receiving side is gone are dropped without
    /// affecting delivery to the rest.
    pub fn publish(&self, event: ProgressEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        let Some(job_subscribers) = subscribers.get_mut(&event.job_id) else {
            return;
        };

        job_subscribers.retain(|id, sender| match sender.send(event.clone()) {
            Ok(()) => true,
            Err(_) => {
                warn!("Dropping broken subscriber {} of job {}", id, event.job_id);
                false
            }
        });

        if job_subscribers.is_empty() {
            subscribers.remove(&event.job_id);
        }
    }

    /// Ends every stream of a finished job after its last event
    pub fn close_job(&self, job_id: JobId) {
        if let Some(closed) = self.subscribers.lock().unwrap().remove(&job_id) {
            debug!("Closed {} subscriber(s) of job {}", closed.len(), job_id);
        }
    }

    pub fn subscriber_count(&self, job_id: JobId) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .get(&job_id)
            .map_or(0, HashMap::len)
    }
}

/// A registered subscriber; unsubscribes itself when dropped
#[derive(Debug)]
pub struct Subscription {
    receiver: watch::Receiver<ProgressEvent>,
    guard: Unsubscribe,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.guard.id
    }

    pub fn job_id(&self) -> JobId {
        self.guard.job_id
    }

    /// The newest event delivered to this subscriber
    pub fn latest(&self) -> ProgressEvent {
        self.receiver.borrow().clone()
    }

    /// Events starting with the current one, ending when the job is closed
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        let Subscription { receiver, guard } = self;
        WatchStream::new(receiver).map(move |event| {
            let _keep = &guard;
            event
        })
    }
}

#[derive(Debug)]
struct Unsubscribe {
    broadcaster: Option<Arc<ProgressBroadcaster>>,
    job_id: JobId,
    id: SubscriberId,
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.unsubscribe(self.job_id, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use spore_core::domain::job::JobStatus;
    use uuid::Uuid;

    fn event(job_id: JobId, progress: u8, status: JobStatus) -> ProgressEvent {
        ProgressEvent {
            job_id,
            status,
            progress,
            phase: None,
            logs: Vec::new(),
            completed: status.is_terminal(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_subscriber_sees_initial_then_updates() {
        let broadcaster = Arc::new(ProgressBroadcaster::new());
        let job = Uuid::new_v4();
        let sub = broadcaster.subscribe(job, event(job, 30, JobStatus::Running));
        assert_eq!(sub.latest().progress, 30);

        let mut stream = Box::pin(sub.into_stream());
        assert_eq!(stream.next().await.unwrap().progress, 30);

        broadcaster.publish(event(job, 45, JobStatus::Running));
        assert_eq!(stream.next().await.unwrap().progress, 45);

        broadcaster.publish(event(job, 100, JobStatus::Completed));
        broadcaster.close_job(job);
        let last = stream.next().await.unwrap();
        assert!(last.completed);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_broken_subscriber_is_removed() {
        let broadcaster = Arc::new(ProgressBroadcaster::new());
        let job = Uuid::new_v4();
        let healthy = broadcaster.subscribe(job, event(job, 0, JobStatus::Running));
        let (_, broken) = broadcaster.register(job, event(job, 0, JobStatus::Running));
        drop(broken);
        assert_eq!(broadcaster.subscriber_count(job), 2);

        broadcaster.publish(event(job, 12, JobStatus::Running));

        assert_eq!(broadcaster.subscriber_count(job), 1);
        assert_eq!(healthy.latest().progress, 12);
    }

    #[tokio::test]
    async fn test_drop_unsubscribes_and_unsubscribe_is_idempotent() {
        let broadcaster = Arc::new(ProgressBroadcaster::new());
        let job = Uuid::new_v4();
        let sub = broadcaster.subscribe(job, event(job, 0, JobStatus::Running));
        let id = sub.id();
        assert_eq!(broadcaster.subscriber_count(job), 1);

        drop(sub);
        assert_eq!(broadcaster.subscriber_count(job), 0);

        broadcaster.unsubscribe(job, id);
        broadcaster.unsubscribe(job, id);
        assert_eq!(broadcaster.subscriber_count(job), 0);
    }

    #[tokio::test]
    async fn test_publish_only_reaches_own_job() {
        let broadcaster = Arc::new(ProgressBroadcaster::new());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let sub_a = broadcaster.subscribe(a, event(a, 0, JobStatus::Running));
        let sub_b = broadcaster.subscribe(b, event(b, 0, JobStatus::Running));

        broadcaster.publish(event(a, 60, JobStatus::Running));

        assert_eq!(sub_a.latest().progress, 60);
        assert_eq!(sub_b.latest().progress, 0);
    }

    #[tokio::test]
    async fn test_detached_subscription_yields_once() {
        let job = Uuid::new_v4();
        let sub = ProgressBroadcaster::detached(job, event(job, 100, JobStatus::Completed));
        let events: Vec<_> = sub.into_stream().collect().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].completed);
    }
}
