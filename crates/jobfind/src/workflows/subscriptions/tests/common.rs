use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::subscriptions::catalog::SkillCatalog;
use crate::workflows::subscriptions::dispatch::{
    DeliveryError, DispatchPolicy, MailSender, NoBackoff, NotificationDispatcher,
    NotificationStore, Reservation, StoreError,
};
use crate::workflows::subscriptions::domain::{
    EmailAddress, Job, JobId, JobMailMessage, NotificationRecord, PairKey, Skill, SkillId,
    SkillSet, Subscriber,
};
use crate::workflows::subscriptions::feed::{FeedError, JobFeed};
use crate::workflows::subscriptions::registry::{RegistryError, SubscriberRegistry};
use crate::workflows::subscriptions::service::SubscriptionService;

pub(super) const JAVA: SkillId = SkillId(1);
pub(super) const SQL: SkillId = SkillId(2);
pub(super) const REACT: SkillId = SkillId(3);
pub(super) const PYTHON: SkillId = SkillId(4);

pub(super) fn catalog() -> SkillCatalog {
    SkillCatalog::from_skills([
        Skill {
            id: JAVA,
            name: "Java".to_string(),
        },
        Skill {
            id: SQL,
            name: "SQL".to_string(),
        },
        Skill {
            id: REACT,
            name: "React".to_string(),
        },
        Skill {
            id: PYTHON,
            name: "Python".to_string(),
        },
    ])
}

pub(super) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, 3, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn subscriber(email: &str, name: &str, skills: &[SkillId]) -> Subscriber {
    Subscriber {
        email: EmailAddress::parse(email).expect("valid email"),
        name: name.to_string(),
        skills: SkillSet::from_ids(skills.iter().copied()),
        created_at: fixed_now(),
        updated_at: fixed_now(),
    }
}

pub(super) fn job(id: i64, name: &str, skills: &[SkillId], active: bool) -> Job {
    Job {
        id: JobId(id),
        name: name.to_string(),
        company: "Acme Corp".to_string(),
        salary: Some(90_000),
        skills: SkillSet::from_ids(skills.iter().copied()),
        active,
        created_at: fixed_now(),
    }
}

pub(super) fn email(raw: &str) -> EmailAddress {
    EmailAddress::parse(raw).expect("valid email")
}

#[derive(Default)]
pub(super) struct MemoryRegistry {
    records: Mutex<HashMap<EmailAddress, Subscriber>>,
}

impl SubscriberRegistry for MemoryRegistry {
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

#[derive(Default)]
pub(super) struct MemoryFeed {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl MemoryFeed {
    pub(super) fn publish(&self, job: Job) {
        self.jobs
            .lock()
            .expect("feed mutex poisoned")
            .insert(job.id, job);
    }
}

impl JobFeed for MemoryFeed {
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

#[derive(Default)]
pub(super) struct MemoryStore {
    slots: Mutex<HashMap<PairKey, LedgerSlot>>,
}

impl NotificationStore for MemoryStore {
    fn reserve(&self, key: &PairKey) -> Result<Reservation, StoreError> {
        let mut guard = self.slots.lock().expect("store mutex poisoned");
        if guard.contains_key(key) {
            return Ok(Reservation::Duplicate);
        }
        guard.insert(key.clone(), LedgerSlot::InFlight);
        Ok(Reservation::Fresh)
    }

    fn complete(&self, record: NotificationRecord) -> Result<(), StoreError> {
        let mut guard = self.slots.lock().expect("store mutex poisoned");
        guard.insert(record.pair_key(), LedgerSlot::Done(record));
        Ok(())
    }

    fn release(&self, key: &PairKey) -> Result<(), StoreError> {
        let mut guard = self.slots.lock().expect("store mutex poisoned");
        if matches!(guard.get(key), Some(LedgerSlot::InFlight)) {
            guard.remove(key);
        }
        Ok(())
    }

    fn find(&self, key: &PairKey) -> Result<Option<NotificationRecord>, StoreError> {
        let guard = self.slots.lock().expect("store mutex poisoned");
        match guard.get(key) {
            Some(LedgerSlot::Done(record)) => Ok(Some(record.clone())),
            _ => Ok(None),
        }
    }

    fn records(&self) -> Result<Vec<NotificationRecord>, StoreError> {
        let guard = self.slots.lock().expect("store mutex poisoned");
        Ok(guard
            .values()
            .filter_map(|slot| match slot {
                LedgerSlot::Done(record) => Some(record.clone()),
                LedgerSlot::InFlight => None,
            })
            .collect())
    }
}

/// Mailer recording deliveries; failures can be scripted per call.
#[derive(Default)]
pub(super) struct MemoryMailer {
    deliveries: Mutex<Vec<(EmailAddress, JobMailMessage)>>,
    script: Mutex<VecDeque<Result<(), DeliveryError>>>,
    calls: AtomicU32,
}

impl MemoryMailer {
    pub(super) fn script(&self, outcomes: impl IntoIterator<Item = Result<(), DeliveryError>>) {
        self.script
            .lock()
            .expect("mailer mutex poisoned")
            .extend(outcomes);
    }

    pub(super) fn deliveries(&self) -> Vec<(EmailAddress, JobMailMessage)> {
        self.deliveries
            .lock()
            .expect("mailer mutex poisoned")
            .clone()
    }

    pub(super) fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl MailSender for MemoryMailer {
    async fn send(
        &self,
        recipient: &EmailAddress,
        message: &JobMailMessage,
    ) -> Result<(), DeliveryError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let scripted = self
            .script
            .lock()
            .expect("mailer mutex poisoned")
            .pop_front();
        match scripted {
            Some(Err(err)) => Err(err),
            _ => {
                self.deliveries
                    .lock()
                    .expect("mailer mutex poisoned")
                    .push((recipient.clone(), message.clone()));
                Ok(())
            }
        }
    }
}

/// Mailer that never answers within a short attempt timeout.
pub(super) struct StalledMailer;

#[async_trait::async_trait]
impl MailSender for StalledMailer {
    async fn send(
        &self,
        _recipient: &EmailAddress,
        _message: &JobMailMessage,
    ) -> Result<(), DeliveryError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }
}

pub(super) struct UnavailableRegistry;

impl SubscriberRegistry for UnavailableRegistry {
    fn upsert(&self, _subscriber: Subscriber) -> Result<Subscriber, RegistryError> {
        Err(RegistryError::Unavailable("database offline".to_string()))
    }

    fn find(&self, _email: &EmailAddress) -> Result<Option<Subscriber>, RegistryError> {
        Err(RegistryError::Unavailable("database offline".to_string()))
    }

    fn list_all(&self) -> Result<Vec<Subscriber>, RegistryError> {
        Err(RegistryError::Unavailable("database offline".to_string()))
    }
}

pub(super) type TestService =
    SubscriptionService<MemoryRegistry, MemoryFeed, MemoryMailer, MemoryStore>;

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) registry: Arc<MemoryRegistry>,
    pub(super) feed: Arc<MemoryFeed>,
    pub(super) mailer: Arc<MemoryMailer>,
    pub(super) store: Arc<MemoryStore>,
}

pub(super) fn test_policy() -> DispatchPolicy {
    DispatchPolicy {
        max_attempts: 3,
        attempt_timeout: Duration::from_millis(200),
        max_in_flight: 4,
        ..DispatchPolicy::default()
    }
}

pub(super) fn build_harness() -> Harness {
    let policy = test_policy();
    let registry = Arc::new(MemoryRegistry::default());
    let feed = Arc::new(MemoryFeed::default());
    let mailer = Arc::new(MemoryMailer::default());
    let store = Arc::new(MemoryStore::default());
    let service = Arc::new(SubscriptionService::new(
        Arc::new(catalog()),
        registry.clone(),
        feed.clone(),
        mailer.clone(),
        store.clone(),
        Arc::new(NoBackoff),
        policy,
    ));

    Harness {
        service,
        registry,
        feed,
        mailer,
        store,
    }
}

pub(super) fn build_dispatcher(
    mailer: Arc<MemoryMailer>,
    store: Arc<MemoryStore>,
    policy: DispatchPolicy,
) -> NotificationDispatcher<MemoryMailer, MemoryStore> {
    NotificationDispatcher::new(
        Arc::new(catalog()),
        mailer,
        store,
        Arc::new(NoBackoff),
        policy,
    )
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
