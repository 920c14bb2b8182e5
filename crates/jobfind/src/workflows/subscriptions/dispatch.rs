use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::catalog::SkillCatalog;
use super::domain::{
    EmailAddress, Job, JobMailMessage, NotificationOutcome, NotificationRecord, PairKey,
    Subscriber,
};

/// Outbound mail collaborator. One call per (subscriber, job) pair; the
/// dispatcher owns retry, the collaborator must not retry internally.
#[async_trait::async_trait]
pub trait MailSender: Send + Sync {
    async fn send(
        &self,
        recipient: &EmailAddress,
        message: &JobMailMessage,
    ) -> Result<(), DeliveryError>;
}

/// Delivery failures as reported by the mail collaborator. Transient errors
/// are retried up to the policy bound; permanent errors are recorded as
/// failed immediately.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeliveryError {
    #[error("transient delivery failure: {0}")]
    Transient(String),
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DeliveryError::Transient(_))
    }
}

/// Whether a reservation claimed the pair or found it already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Fresh,
    Duplicate,
}

/// Persistence seam for the notification ledger.
///
/// `reserve` must atomically claim the pair: it returns `Duplicate` when a
/// record already exists or another delivery for the same pair is in flight.
/// This is the single serialization point that makes dedup race-free.
/// `release` drops an unfinished reservation (store write failed, run
/// cancelled) so a later run may retry the pair; it must not remove
/// completed records.
pub trait NotificationStore: Send + Sync {
    fn reserve(&self, key: &PairKey) -> Result<Reservation, StoreError>;
    fn complete(&self, record: NotificationRecord) -> Result<(), StoreError>;
    fn release(&self, key: &PairKey) -> Result<(), StoreError>;
    fn find(&self, key: &PairKey) -> Result<Option<NotificationRecord>, StoreError>;
    fn records(&self) -> Result<Vec<NotificationRecord>, StoreError>;
}

/// Error enumeration for ledger failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("notification store unavailable: {0}")]
    Unavailable(String),
}

/// Delay source consulted between delivery attempts. `attempt` is the number
/// of the attempt that just failed, starting at 1.
pub trait RetryBackoff: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

/// Constant pause between attempts.
#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff(pub Duration);

impl RetryBackoff for FixedBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

/// Doubling pause, capped.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub cap: Duration,
}

impl RetryBackoff for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base.saturating_mul(1u32 << shift).min(self.cap)
    }
}

/// Zero-delay strategy for tests and demos.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl RetryBackoff for NoBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

/// Whether `dispatch` waits for delivery outcomes or detaches them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    WaitForOutcome,
    FireAndForget,
}

/// Dials for a dispatch batch.
#[derive(Debug, Clone, Copy)]
pub struct DispatchPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub max_in_flight: usize,
    pub mode: DeliveryMode,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(10),
            max_in_flight: 8,
            mode: DeliveryMode::WaitForOutcome,
        }
    }
}

/// What a dispatch call did: persisted outcomes, suppressed duplicates, and
/// deliveries still in flight (fire-and-forget mode only).
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub records: Vec<NotificationRecord>,
    pub deduplicated: usize,
    pub detached: usize,
}

impl DispatchReport {
    pub fn sent(&self) -> usize {
        self.records
            .iter()
            .filter(|record| record.outcome == NotificationOutcome::Sent)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.records
            .iter()
            .filter(|record| record.outcome == NotificationOutcome::Failed)
            .count()
    }

    pub(crate) fn merge(&mut self, other: DispatchReport) {
        self.records.extend(other.records);
        self.deduplicated += other.deduplicated;
        self.detached += other.detached;
    }
}

/// Takes matched (subscriber, job) pairs, dedups them against the ledger,
/// and hands the survivors to the mail collaborator under a bounded retry
/// loop. One pair's failure never blocks delivery to the others.
pub struct NotificationDispatcher<M, S> {
    catalog: Arc<SkillCatalog>,
    mailer: Arc<M>,
    store: Arc<S>,
    backoff: Arc<dyn RetryBackoff>,
    policy: DispatchPolicy,
    limiter: Arc<Semaphore>,
}

impl<M, S> NotificationDispatcher<M, S>
where
    M: MailSender + 'static,
    S: NotificationStore + 'static,
{
    pub fn new(
        catalog: Arc<SkillCatalog>,
        mailer: Arc<M>,
        store: Arc<S>,
        backoff: Arc<dyn RetryBackoff>,
        policy: DispatchPolicy,
    ) -> Self {
        let limiter = Arc::new(Semaphore::new(policy.max_in_flight.max(1)));
        Self {
            catalog,
            mailer,
            store,
            backoff,
            policy,
            limiter,
        }
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    /// Dedup (within the batch and against the ledger), then deliver each
    /// surviving pair. Delivery errors never escape: they surface only as
    /// `failed` ledger rows. The store is the only error source here.
    pub async fn dispatch(
        &self,
        pairs: Vec<(Subscriber, Job)>,
    ) -> Result<DispatchReport, StoreError> {
        let mut report = DispatchReport::default();
        let mut seen: HashSet<PairKey> = HashSet::new();
        let mut handles: Vec<JoinHandle<Option<NotificationRecord>>> = Vec::new();

        for (subscriber, job) in pairs {
            let key = PairKey {
                subscriber: subscriber.email.clone(),
                job: job.id,
            };

            if !seen.insert(key.clone()) {
                report.deduplicated += 1;
                continue;
            }

            match self.store.reserve(&key)? {
                Reservation::Duplicate => {
                    report.deduplicated += 1;
                    debug!(subscriber = %key.subscriber, job = %key.job, "pair already notified");
                    continue;
                }
                Reservation::Fresh => {}
            }

            handles.push(self.spawn_delivery(subscriber, job));
        }

        match self.policy.mode {
            DeliveryMode::FireAndForget => {
                report.detached = handles.len();
            }
            DeliveryMode::WaitForOutcome => {
                for handle in handles {
                    match handle.await {
                        Ok(Some(record)) => report.records.push(record),
                        Ok(None) => {}
                        Err(err) => error!("delivery task aborted: {err}"),
                    }
                }
            }
        }

        Ok(report)
    }

    fn spawn_delivery(
        &self,
        subscriber: Subscriber,
        job: Job,
    ) -> JoinHandle<Option<NotificationRecord>> {
        let mailer = Arc::clone(&self.mailer);
        let store = Arc::clone(&self.store);
        let backoff = Arc::clone(&self.backoff);
        let limiter = Arc::clone(&self.limiter);
        let policy = self.policy;
        let message = JobMailMessage {
            recipient_name: subscriber.name.clone(),
            job: self.catalog.summarize(&job),
        };
        let key = PairKey {
            subscriber: subscriber.email,
            job: job.id,
        };

        tokio::spawn(async move {
            let _permit = match limiter.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return None,
            };

            let (outcome, attempts) = deliver_with_retry(
                mailer.as_ref(),
                &key.subscriber,
                &message,
                backoff.as_ref(),
                policy,
            )
            .await;

            let record = NotificationRecord {
                subscriber: key.subscriber.clone(),
                job: key.job,
                outcome,
                attempts,
                recorded_at: Utc::now(),
            };

            if let Err(err) = store.complete(record.clone()) {
                error!(
                    subscriber = %record.subscriber,
                    job = %record.job,
                    "failed to persist notification record: {err}"
                );
                if let Err(release_err) = store.release(&key) {
                    error!("failed to release reservation: {release_err}");
                }
                return None;
            }

            Some(record)
        })
    }
}

async fn deliver_with_retry<M>(
    mailer: &M,
    recipient: &EmailAddress,
    message: &JobMailMessage,
    backoff: &dyn RetryBackoff,
    policy: DispatchPolicy,
) -> (NotificationOutcome, u32)
where
    M: MailSender + ?Sized,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match tokio::time::timeout(policy.attempt_timeout, mailer.send(recipient, message)).await
        {
            Ok(Ok(())) => return (NotificationOutcome::Sent, attempt),
            Ok(Err(err)) if !err.is_transient() => {
                warn!(recipient = %recipient, "permanent delivery failure: {err}");
                return (NotificationOutcome::Failed, attempt);
            }
            Ok(Err(err)) => {
                warn!(recipient = %recipient, attempt, "transient delivery failure: {err}");
            }
            Err(_) => {
                warn!(recipient = %recipient, attempt, "delivery attempt timed out");
            }
        }

        if attempt >= max_attempts {
            return (NotificationOutcome::Failed, attempt);
        }

        let delay = backoff.delay(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
