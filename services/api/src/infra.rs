use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use jobfind::config::NotificationConfig;
use jobfind::workflows::subscriptions::{
    DeliveryError, DeliveryMode, DispatchPolicy, EmailAddress, ExponentialBackoff, FeedError,
    Job, JobFeed, JobId, JobMailMessage, MailSender, NotificationRecord, NotificationStore,
    PairKey, RegistryError, Reservation, RetryBackoff, Skill, SkillCatalog, SkillId, StoreError,
    Subscriber, SubscriberRegistry, SubscriptionService,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type ApiService = SubscriptionService<
    InMemorySubscriberRegistry,
    InMemoryJobFeed,
    LoggingMailSender,
    InMemoryNotificationStore,
>;

#[derive(Default, Clone)]
pub(crate) struct InMemorySubscriberRegistry {
    records: Arc<Mutex<HashMap<EmailAddress, Subscriber>>>,
}

impl SubscriberRegistry for InMemorySubscriberRegistry {
    fn upsert(&self, mut subscriber: Subscriber) -> Result<Subscriber, RegistryError> {
        let mut guard = self.records.lock().expect("registry mutex poisoned");
        if let Some(existing) = guard.get(&subscriber.email) {
            subscriber.created_at = existing.created_at;
        }
        guard.insert(subscriber.email.clone(), subscriber.clone());
        Ok(subscriber)
    }

    fn find(&self, email: &EmailAddress) -> Result<Option<Subscriber>, RegistryError> {
        let guard = self.records.lock().expect("registry mutex poisoned");
        Ok(guard.get(email).cloned())
    }

    fn list_all(&self) -> Result<Vec<Subscriber>, RegistryError> {
        let guard = self.records.lock().expect("registry mutex poisoned");
        Ok(guard.values().cloned().collect())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryJobFeed {
    jobs: Arc<Mutex<HashMap<JobId, Job>>>,
}

impl InMemoryJobFeed {
    /// Ingestion hook for the posting endpoint; the matching core itself
    /// only ever reads through the `JobFeed` trait.
    pub(crate) fn publish(&self, job: Job) -> Job {
        let mut guard = self.jobs.lock().expect("feed mutex poisoned");
        guard.insert(job.id, job.clone());
        job
    }
}

impl JobFeed for InMemoryJobFeed {
    fn find(&self, id: JobId) -> Result<Option<Job>, FeedError> {
        let guard = self.jobs.lock().expect("feed mutex poisoned");
        Ok(guard.get(&id).cloned())
    }

    fn active_jobs(&self) -> Result<Vec<Job>, FeedError> {
        let guard = self.jobs.lock().expect("feed mutex poisoned");
        Ok(guard.values().filter(|job| job.active).cloned().collect())
    }
}

#[derive(Debug)]
enum LedgerSlot {
    InFlight,
    Done(NotificationRecord),
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryNotificationStore {
    slots: Arc<Mutex<HashMap<PairKey, LedgerSlot>>>,
}

impl NotificationStore for InMemoryNotificationStore {
    fn reserve(&self, key: &PairKey) -> Result<Reservation, StoreError> {
        let mut guard = self.slots.lock().expect("ledger mutex poisoned");
        if guard.contains_key(key) {
            return Ok(Reservation::Duplicate);
        }
        guard.insert(key.clone(), LedgerSlot::InFlight);
        Ok(Reservation::Fresh)
    }

    fn complete(&self, record: NotificationRecord) -> Result<(), StoreError> {
        let mut guard = self.slots.lock().expect("ledger mutex poisoned");
        guard.insert(record.pair_key(), LedgerSlot::Done(record));
        Ok(())
    }

    fn release(&self, key: &PairKey) -> Result<(), StoreError> {
        let mut guard = self.slots.lock().expect("ledger mutex poisoned");
        if matches!(guard.get(key), Some(LedgerSlot::InFlight)) {
            guard.remove(key);
        }
        Ok(())
    }

    fn find(&self, key: &PairKey) -> Result<Option<NotificationRecord>, StoreError> {
        let guard = self.slots.lock().expect("ledger mutex poisoned");
        match guard.get(key) {
            Some(LedgerSlot::Done(record)) => Ok(Some(record.clone())),
            _ => Ok(None),
        }
    }

    fn records(&self) -> Result<Vec<NotificationRecord>, StoreError> {
        let guard = self.slots.lock().expect("ledger mutex poisoned");
        Ok(guard
            .values()
            .filter_map(|slot| match slot {
                LedgerSlot::Done(record) => Some(record.clone()),
                LedgerSlot::InFlight => None,
            })
            .collect())
    }
}

/// Stand-in mail adapter until an SMTP gateway is wired up: logs the
/// delivery and reports success so the pipeline is fully observable.
#[derive(Default, Clone)]
pub(crate) struct LoggingMailSender;

#[async_trait::async_trait]
impl MailSender for LoggingMailSender {
    async fn send(
        &self,
        recipient: &EmailAddress,
        message: &JobMailMessage,
    ) -> Result<(), DeliveryError> {
        info!(
            recipient = %recipient,
            subject = %message.subject(),
            "delivering job notification"
        );
        Ok(())
    }
}

/// Seed catalog for the in-memory deployment. A real deployment hydrates
/// this from the skills table.
pub(crate) fn default_skill_catalog() -> SkillCatalog {
    let names = [
        "Java",
        "SQL",
        "React",
        "Python",
        "TypeScript",
        "Rust",
        "Go",
        "AWS",
    ];
    SkillCatalog::from_skills(names.iter().enumerate().map(|(index, name)| Skill {
        id: SkillId(index as i64 + 1),
        name: (*name).to_string(),
    }))
}

pub(crate) fn dispatch_policy(config: &NotificationConfig) -> DispatchPolicy {
    DispatchPolicy {
        max_attempts: config.max_attempts,
        attempt_timeout: config.attempt_timeout(),
        max_in_flight: config.max_in_flight,
        mode: if config.fire_and_forget {
            DeliveryMode::FireAndForget
        } else {
            DeliveryMode::WaitForOutcome
        },
    }
}

pub(crate) fn retry_backoff(config: &NotificationConfig) -> Arc<dyn RetryBackoff> {
    Arc::new(ExponentialBackoff {
        base: config.backoff_base(),
        cap: std::time::Duration::from_secs(5),
    })
}
