//! Tracks one background job through its completion or failure event.

use events::{Event, EventType, JobCategory};
use log::*;
use serde_json::{Map, Value};
use sse::{Error, EventRouter, Subscription};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Error reported when a failure event carries no message of its own.
pub const FALLBACK_ERROR: &str = "Job failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobStatus {
    #[default]
    Idle,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Outcome of a completed job: the produced resource and any metadata the
/// server attached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobResult {
    pub resource_id: Option<String>,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobSnapshot {
    pub job_id: Option<String>,
    pub status: JobStatus,
    pub error: Option<String>,
    pub result: Option<JobResult>,
}

type CompletedCallback = Box<dyn Fn(&JobResult) + Send + Sync>;
type FailedCallback = Box<dyn Fn(&str) + Send + Sync>;

struct Shared {
    category: JobCategory,
    snapshot: Mutex<JobSnapshot>,
    on_completed: Option<CompletedCallback>,
    on_failed: Option<FailedCallback>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, JobSnapshot> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the snapshot if `event` concerns the watched job while it is
    /// still processing.
    fn watched(&self, event: &Event) -> Option<MutexGuard<'_, JobSnapshot>> {
        let snapshot = self.lock();
        if snapshot.job_id.is_none() || snapshot.job_id != event.job_id {
            return None;
        }
        if snapshot.status != JobStatus::Processing {
            debug!(
                "Ignoring {} for job already {:?}",
                event.event_type, snapshot.status
            );
            return None;
        }
        Some(snapshot)
    }

    fn completed(&self, event: &Event) -> Result<(), Error> {
        let Some(mut snapshot) = self.watched(event) else {
            return Ok(());
        };

        let result = JobResult {
            resource_id: event.resource_id.clone(),
            metadata: event.metadata.clone().unwrap_or_default(),
        };
        snapshot.status = JobStatus::Completed;
        snapshot.error = None;
        snapshot.result = Some(result.clone());
        drop(snapshot);

        info!(
            "{} job completed with resource {:?}",
            self.category, result.resource_id
        );
        if let Some(callback) = &self.on_completed {
            callback(&result);
        }
        Ok(())
    }

    fn failed(&self, event: &Event) -> Result<(), Error> {
        let Some(mut snapshot) = self.watched(event) else {
            return Ok(());
        };

        let error = event
            .error
            .clone()
            .filter(|error| !error.is_empty())
            .unwrap_or_else(|| FALLBACK_ERROR.to_string());
        snapshot.status = JobStatus::Failed;
        snapshot.error = Some(error.clone());
        drop(snapshot);

        warn!("{} job failed: {}", self.category, error);
        if let Some(callback) = &self.on_failed {
            callback(&error);
        }
        Ok(())
    }
}

pub struct JobEventBridgeBuilder {
    category: JobCategory,
    job_id: Option<String>,
    on_completed: Option<CompletedCallback>,
    on_failed: Option<FailedCallback>,
}

impl JobEventBridgeBuilder {
    pub fn job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn on_completed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&JobResult) + Send + Sync + 'static,
    {
        self.on_completed = Some(Box::new(callback));
        self
    }

    pub fn on_failed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_failed = Some(Box::new(callback));
        self
    }

    /// Subscribes to the category's completed and failed events.
    pub fn attach(self, router: &EventRouter) -> JobEventBridge {
        let shared = Arc::new(Shared {
            category: self.category,
            snapshot: Mutex::new(JobSnapshot::default()),
            on_completed: self.on_completed,
            on_failed: self.on_failed,
        });

        let subscriptions = vec![
            subscribe(router, &shared, self.category.completed(), Shared::completed),
            subscribe(router, &shared, self.category.failed(), Shared::failed),
        ];

        let bridge = JobEventBridge {
            shared,
            subscriptions,
        };
        bridge.set_job_id(self.job_id);
        bridge
    }
}

fn subscribe<F>(
    router: &EventRouter,
    shared: &Arc<Shared>,
    event_type: EventType,
    handle: F,
) -> Subscription
where
    F: Fn(&Shared, &Event) -> Result<(), Error> + Send + Sync + 'static,
{
    let shared = Arc::clone(shared);
    router.subscribe_fn(event_type, move |event: &Event| -> Result<(), Error> {
        handle(&shared, event)
    })
}

/// Narrows the event stream to one job of one resource category.
///
/// `Idle` until given a job id, then `Processing` until a matching
/// `<category>.completed` or `<category>.failed` event arrives. Events for other
/// jobs are ignored. Unsubscribes on `teardown` or drop.
pub struct JobEventBridge {
    shared: Arc<Shared>,
    subscriptions: Vec<Subscription>,
}

impl JobEventBridge {
    pub fn builder(category: JobCategory) -> JobEventBridgeBuilder {
        JobEventBridgeBuilder {
            category,
            job_id: None,
            on_completed: None,
            on_failed: None,
        }
    }

    pub fn category(&self) -> JobCategory {
        self.shared.category
    }

    /// Points the bridge at another job. A missing or empty id resets it to
    /// `Idle` and clears any error and result.
    pub fn set_job_id(&self, job_id: Option<String>) {
        let job_id = job_id.filter(|id| !id.is_empty());
        let mut snapshot = self.shared.lock();

        snapshot.status = if job_id.is_some() {
            JobStatus::Processing
        } else {
            JobStatus::Idle
        };
        snapshot.job_id = job_id;
        snapshot.error = None;
        snapshot.result = None;
        debug!(
            "Watching {} job {:?}",
            self.shared.category, snapshot.job_id
        );
    }

    pub fn status(&self) -> JobStatus {
        self.shared.lock().status
    }

    pub fn error(&self) -> Option<String> {
        self.shared.lock().error.clone()
    }

    pub fn result(&self) -> Option<JobResult> {
        self.shared.lock().result.clone()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.shared.lock().clone()
    }

    /// Unsubscribes from both event types. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        for subscription in &mut self.subscriptions {
            subscription.unsubscribe();
        }
        self.subscriptions.clear();
    }
}

impl Drop for JobEventBridge {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sse::test_support::{ChannelTransport, TestTokenProvider};
    use sse::ConnectionConfig;

    fn router() -> EventRouter {
        EventRouter::new(
            ConnectionConfig::new("http://api.test"),
            Arc::new(TestTokenProvider::succeeding("tok")),
            Arc::new(ChannelTransport::new()),
        )
    }

    fn event(event_type: EventType, job_id: &str) -> Event {
        Event::new(event_type, "user-1").with_job_id(job_id)
    }

    #[tokio::test]
    async fn test_bridge_with_job_id_starts_processing() {
        let router = router();
        let bridge = JobEventBridge::builder(JobCategory::Quiz)
            .job_id("job-1")
            .attach(&router);

        assert_eq!(bridge.status(), JobStatus::Processing);
        assert!(bridge.error().is_none());
    }

    #[tokio::test]
    async fn test_bridge_without_job_id_is_idle() {
        let router = router();
        let bridge = JobEventBridge::builder(JobCategory::Quiz).attach(&router);
        assert_eq!(bridge.status(), JobStatus::Idle);

        // Nothing to match against while idle
        router.dispatch(&event(JobCategory::Quiz.completed(), "job-1"));
        assert_eq!(bridge.status(), JobStatus::Idle);
    }

    #[tokio::test]
    async fn test_matching_completion_builds_result_and_notifies() {
        let router = router();
        let received = Arc::new(Mutex::new(None));
        let bridge = {
            let received = Arc::clone(&received);
            JobEventBridge::builder(JobCategory::Flashcard)
                .job_id("job-1")
                .on_completed(move |result| {
                    *received.lock().unwrap() = Some(result.clone());
                })
                .attach(&router)
        };

        let mut metadata = Map::new();
        metadata.insert("cardCount".to_string(), json!(12));
        router.dispatch(
            &event(JobCategory::Flashcard.completed(), "job-1")
                .with_resource_id("deck-9")
                .with_metadata(metadata.clone()),
        );

        let expected = JobResult {
            resource_id: Some("deck-9".to_string()),
            metadata,
        };
        assert_eq!(bridge.status(), JobStatus::Completed);
        assert_eq!(bridge.result(), Some(expected.clone()));
        assert_eq!(*received.lock().unwrap(), Some(expected));
    }

    #[tokio::test]
    async fn test_matching_failure_surfaces_error() {
        let router = router();
        let received = Arc::new(Mutex::new(None));
        let bridge = {
            let received = Arc::clone(&received);
            JobEventBridge::builder(JobCategory::Summary)
                .job_id("job-1")
                .on_failed(move |error| {
                    *received.lock().unwrap() = Some(error.to_string());
                })
                .attach(&router)
        };

        router.dispatch(
            &event(JobCategory::Summary.failed(), "job-1").with_error("Document too large"),
        );

        assert_eq!(bridge.status(), JobStatus::Failed);
        assert_eq!(bridge.error().as_deref(), Some("Document too large"));
        assert_eq!(
            received.lock().unwrap().as_deref(),
            Some("Document too large")
        );
    }

    #[tokio::test]
    async fn test_failure_without_message_uses_fallback() {
        let router = router();
        let bridge = JobEventBridge::builder(JobCategory::Content)
            .job_id("job-1")
            .attach(&router);

        router.dispatch(&event(JobCategory::Content.failed(), "job-1"));

        assert_eq!(bridge.status(), JobStatus::Failed);
        assert_eq!(bridge.error().as_deref(), Some(FALLBACK_ERROR));
    }

    #[tokio::test]
    async fn test_foreign_job_id_leaves_bridge_processing() {
        let router = router();
        let bridge = JobEventBridge::builder(JobCategory::Quiz)
            .job_id("job-1")
            .attach(&router);

        router.dispatch(&event(JobCategory::Quiz.completed(), "job-2"));
        router.dispatch(&event(JobCategory::Quiz.failed(), "job-2"));
        router.dispatch(&Event::new(JobCategory::Quiz.completed(), "user-1"));

        assert_eq!(bridge.snapshot().status, JobStatus::Processing);
        assert!(bridge.result().is_none());
    }

    #[tokio::test]
    async fn test_other_category_is_ignored() {
        let router = router();
        let bridge = JobEventBridge::builder(JobCategory::Quiz)
            .job_id("job-1")
            .attach(&router);

        router.dispatch(&event(JobCategory::Flashcard.completed(), "job-1"));
        assert_eq!(bridge.status(), JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_terminal_state_ignores_later_outcomes() {
        let router = router();
        let bridge = JobEventBridge::builder(JobCategory::Quiz)
            .job_id("job-1")
            .attach(&router);

        router.dispatch(&event(JobCategory::Quiz.completed(), "job-1"));
        router.dispatch(&event(JobCategory::Quiz.failed(), "job-1"));

        assert_eq!(bridge.status(), JobStatus::Completed);
        assert!(bridge.error().is_none());
    }

    #[tokio::test]
    async fn test_clearing_job_id_resets_to_idle() {
        let router = router();
        let bridge = JobEventBridge::builder(JobCategory::Quiz)
            .job_id("job-1")
            .attach(&router);
        router.dispatch(&event(JobCategory::Quiz.failed(), "job-1"));
        assert_eq!(bridge.status(), JobStatus::Failed);

        bridge.set_job_id(None);
        assert_eq!(bridge.status(), JobStatus::Idle);
        assert!(bridge.error().is_none());

        bridge.set_job_id(Some("job-2".to_string()));
        assert_eq!(bridge.status(), JobStatus::Processing);
        router.dispatch(&event(JobCategory::Quiz.completed(), "job-2"));
        assert_eq!(bridge.status(), JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_repeated_attach_and_teardown_leaves_registry_empty() {
        let router = router();

        for round in 0..5 {
            let mut bridge = JobEventBridge::builder(JobCategory::Quiz)
                .job_id(format!("job-{round}"))
                .attach(&router);
            assert_eq!(
                router.registry().handler_count(&JobCategory::Quiz.completed()),
                1
            );
            bridge.teardown();
            bridge.teardown();
        }

        for _ in 0..5 {
            let _bridge = JobEventBridge::builder(JobCategory::Summary)
                .job_id("job")
                .attach(&router);
        }

        assert!(router.registry().is_empty());
    }

    #[tokio::test]
    async fn test_two_bridges_track_their_own_jobs() {
        let router = router();
        let first = JobEventBridge::builder(JobCategory::Quiz)
            .job_id("job-1")
            .attach(&router);
        let second = JobEventBridge::builder(JobCategory::Quiz)
            .job_id("job-2")
            .attach(&router);

        router.dispatch(&event(JobCategory::Quiz.completed(), "job-2"));

        assert_eq!(first.status(), JobStatus::Processing);
        assert_eq!(second.status(), JobStatus::Completed);
        assert_eq!(
            router.registry().handler_count(&JobCategory::Quiz.completed()),
            2
        );
    }
}
