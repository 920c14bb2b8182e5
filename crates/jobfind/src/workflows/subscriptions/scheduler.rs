use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{info, warn};

use super::dispatch::{
    DispatchReport, MailSender, NotificationDispatcher, NotificationStore, StoreError,
};
use super::domain::{Job, JobId, Subscriber};
use super::feed::{FeedError, JobFeed};
use super::matcher::matching_subscribers;
use super::registry::{RegistryError, SubscriberRegistry};

/// Events accepted by the trigger entry point: a single job posting, or a
/// periodic sweep over the whole active feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    JobPosted(JobId),
    Sweep,
}

/// How a trigger call was absorbed. `Coalesced` means an active run picked
/// the event up; the caller's work is done by that runner.
#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    Completed(BatchReport),
    Coalesced,
}

/// Accumulated result of one runner's drain, possibly covering several
/// queued events.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub jobs_considered: usize,
    pub matched_pairs: usize,
    pub dispatch: DispatchReport,
}

impl BatchReport {
    fn absorb(&mut self, other: BatchReport) {
        self.jobs_considered += other.jobs_considered;
        self.matched_pairs += other.matched_pairs;
        self.dispatch.merge(other.dispatch);
    }
}

/// Error enumeration for scheduler runs. Delivery failures are not here:
/// they are contained in the dispatcher and surface only as ledger rows.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Default)]
struct TriggerQueue {
    running: bool,
    pending: VecDeque<TriggerEvent>,
}

impl TriggerQueue {
    /// At-most-one-pending: an event equal to one already queued (same job
    /// id, or a second sweep) is dropped.
    fn coalesce(&mut self, event: TriggerEvent) {
        if !self.pending.contains(&event) {
            self.pending.push_back(event);
        }
    }
}

/// State machine `Idle -> Running -> Idle` feeding the dispatcher.
///
/// Triggers arriving while a run is active are queued with
/// at-most-one-pending semantics and drained by the active runner before it
/// returns to idle. The ledger dedup in the dispatcher remains the final
/// backstop either way.
pub struct NotificationScheduler<R, F, M, S> {
    registry: Arc<R>,
    feed: Arc<F>,
    dispatcher: Arc<NotificationDispatcher<M, S>>,
    queue: Mutex<TriggerQueue>,
}

impl<R, F, M, S> NotificationScheduler<R, F, M, S>
where
    R: SubscriberRegistry + 'static,
    F: JobFeed + 'static,
    M: MailSender + 'static,
    S: NotificationStore + 'static,
{
    pub fn new(
        registry: Arc<R>,
        feed: Arc<F>,
        dispatcher: Arc<NotificationDispatcher<M, S>>,
    ) -> Self {
        Self {
            registry,
            feed,
            dispatcher,
            queue: Mutex::new(TriggerQueue::default()),
        }
    }

    /// Trigger entry point for both event-driven and periodic callers.
    pub async fn trigger(&self, event: TriggerEvent) -> Result<TriggerOutcome, SchedulerError> {
        {
            let mut queue = self.queue.lock().expect("trigger queue poisoned");
            if queue.running {
                queue.coalesce(event);
                return Ok(TriggerOutcome::Coalesced);
            }
            queue.running = true;
        }

        let mut report = BatchReport::default();
        let mut current = event;

        loop {
            match self.run_batch(current).await {
                Ok(batch) => report.absorb(batch),
                Err(err) => {
                    // Pending events stay queued for the next trigger.
                    self.queue.lock().expect("trigger queue poisoned").running = false;
                    return Err(err);
                }
            }

            let next = {
                let mut queue = self.queue.lock().expect("trigger queue poisoned");
                match queue.pending.pop_front() {
                    Some(event) => Some(event),
                    None => {
                        queue.running = false;
                        None
                    }
                }
            };

            match next {
                Some(event) => current = event,
                None => break,
            }
        }

        Ok(TriggerOutcome::Completed(report))
    }

    async fn run_batch(&self, event: TriggerEvent) -> Result<BatchReport, SchedulerError> {
        match event {
            TriggerEvent::JobPosted(id) => {
                let Some(job) = self.feed.find(id)? else {
                    warn!(job = %id, "trigger for unknown job ignored");
                    return Ok(BatchReport::default());
                };
                self.notify_jobs(vec![job]).await
            }
            TriggerEvent::Sweep => {
                let jobs = self.feed.active_jobs()?;
                self.notify_jobs(jobs).await
            }
        }
    }

    async fn notify_jobs(&self, jobs: Vec<Job>) -> Result<BatchReport, SchedulerError> {
        let subscribers = self.registry.list_all()?;

        let mut pairs: Vec<(Subscriber, Job)> = Vec::new();
        for job in &jobs {
            for subscriber in matching_subscribers(job, &subscribers) {
                pairs.push((subscriber, job.clone()));
            }
        }

        let matched_pairs = pairs.len();
        let dispatch = self.dispatcher.dispatch(pairs).await?;
        info!(
            jobs = jobs.len(),
            matched = matched_pairs,
            sent = dispatch.sent(),
            failed = dispatch.failed(),
            deduplicated = dispatch.deduplicated,
            "notification batch complete"
        );

        Ok(BatchReport {
            jobs_considered: jobs.len(),
            matched_pairs,
            dispatch,
        })
    }
}
