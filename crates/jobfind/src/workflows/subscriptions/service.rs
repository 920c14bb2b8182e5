use std::sync::Arc;

use chrono::Utc;

use super::catalog::SkillCatalog;
use super::dispatch::{
    DispatchPolicy, DispatchReport, MailSender, NotificationDispatcher, NotificationStore,
    RetryBackoff, StoreError,
};
use super::domain::{EmailAddress, JobId, NotificationRecord, Skill, Subscriber};
use super::feed::{FeedError, JobFeed};
use super::intake::{SubscriberIntake, SubscriptionRequest, ValidationError};
use super::matcher::matching_jobs;
use super::registry::{RegistryError, SubscriberRegistry};
use super::scheduler::{NotificationScheduler, SchedulerError, TriggerEvent, TriggerOutcome};

/// Service composing the intake guard, registry, matcher, dispatcher, and
/// scheduler behind one API for routes and the CLI.
pub struct SubscriptionService<R, F, M, S> {
    catalog: Arc<SkillCatalog>,
    intake: SubscriberIntake,
    registry: Arc<R>,
    feed: Arc<F>,
    dispatcher: Arc<NotificationDispatcher<M, S>>,
    scheduler: Arc<NotificationScheduler<R, F, M, S>>,
    store: Arc<S>,
}

/// Result of an opt-in: the stored subscriber plus the welcome batch
/// outcome for currently active overlapping jobs.
#[derive(Debug, Clone)]
pub struct SubscriptionReceipt {
    pub subscriber: Subscriber,
    pub welcome: DispatchReport,
}

impl<R, F, M, S> SubscriptionService<R, F, M, S>
where
    R: SubscriberRegistry + 'static,
    F: JobFeed + 'static,
    M: MailSender + 'static,
    S: NotificationStore + 'static,
{
    pub fn new(
        catalog: Arc<SkillCatalog>,
        registry: Arc<R>,
        feed: Arc<F>,
        mailer: Arc<M>,
        store: Arc<S>,
        backoff: Arc<dyn RetryBackoff>,
        policy: DispatchPolicy,
    ) -> Self {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::clone(&catalog),
            mailer,
            Arc::clone(&store),
            backoff,
            policy,
        ));
        let scheduler = Arc::new(NotificationScheduler::new(
            Arc::clone(&registry),
            Arc::clone(&feed),
            Arc::clone(&dispatcher),
        ));

        Self {
            intake: SubscriberIntake::new(Arc::clone(&catalog)),
            catalog,
            registry,
            feed,
            dispatcher,
            scheduler,
            store,
        }
    }

    pub fn catalog(&self) -> &SkillCatalog {
        &self.catalog
    }

    pub fn skills(&self) -> Vec<Skill> {
        self.catalog.all()
    }

    /// Create or replace a subscription, then dispatch the welcome batch for
    /// active jobs overlapping the new interest set. Ledger dedup applies,
    /// so an update that unlocks no new jobs sends nothing.
    pub async fn subscribe(
        &self,
        request: SubscriptionRequest,
    ) -> Result<SubscriptionReceipt, SubscriptionError> {
        let draft = self.intake.subscriber_from_request(request, Utc::now())?;
        let subscriber = self.registry.upsert(draft)?;

        let jobs = self.feed.active_jobs()?;
        let pairs = matching_jobs(&subscriber, &jobs)
            .into_iter()
            .map(|job| (subscriber.clone(), job))
            .collect();
        let welcome = self.dispatcher.dispatch(pairs).await?;

        Ok(SubscriptionReceipt {
            subscriber,
            welcome,
        })
    }

    pub fn find(&self, raw_email: &str) -> Result<Subscriber, SubscriptionError> {
        let email = EmailAddress::parse(raw_email).map_err(ValidationError::from)?;
        self.registry
            .find(&email)?
            .ok_or_else(|| SubscriptionError::NotFound(format!("subscriber {email}")))
    }

    /// Fan a posted job out to matching subscribers via the scheduler.
    /// Unknown job ids surface as `NotFound` before any trigger happens.
    pub async fn announce_job(&self, id: JobId) -> Result<TriggerOutcome, SubscriptionError> {
        if self.feed.find(id)?.is_none() {
            return Err(SubscriptionError::NotFound(format!("job {id}")));
        }
        Ok(self.scheduler.trigger(TriggerEvent::JobPosted(id)).await?)
    }

    /// Periodic/administrative full sweep over the active feed.
    pub async fn run_sweep(&self) -> Result<TriggerOutcome, SubscriptionError> {
        Ok(self.scheduler.trigger(TriggerEvent::Sweep).await?)
    }

    /// Administrative view over dispatched outcomes. Failed deliveries are
    /// invisible to subscribers; this is where operators see them.
    pub fn notifications(&self) -> Result<Vec<NotificationRecord>, SubscriptionError> {
        Ok(self.store.records()?)
    }
}

/// Error raised by the subscription service.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("{0} not found")]
    NotFound(String),
}
