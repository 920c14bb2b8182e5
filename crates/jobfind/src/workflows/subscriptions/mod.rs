//! Skill-based job subscription matching and notification dispatch.
//!
//! Data flow: job feed -> matcher (consulting the subscriber registry) ->
//! candidate (subscriber, job) pairs -> dispatcher -> mail collaborator,
//! with the ledger in the notification store suppressing duplicate sends.
//! The matcher is pure; the dispatcher owns the ledger exclusively; the
//! scheduler coalesces concurrent triggers.

pub mod catalog;
pub mod dispatch;
pub mod domain;
pub mod feed;
pub mod intake;
pub mod matcher;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod service;

#[cfg(test)]
mod tests;

pub use catalog::SkillCatalog;
pub use dispatch::{
    DeliveryError, DeliveryMode, DispatchPolicy, DispatchReport, ExponentialBackoff,
    FixedBackoff, MailSender, NoBackoff, NotificationDispatcher, NotificationStore,
    Reservation, RetryBackoff, StoreError,
};
pub use domain::{
    EmailAddress, InvalidEmail, Job, JobId, JobMailMessage, JobSummary, NotificationOutcome,
    NotificationRecord, PairKey, Skill, SkillId, SkillSet, Subscriber,
};
pub use feed::{FeedError, JobFeed};
pub use intake::{SubscriberIntake, SubscriptionRequest, ValidationError};
pub use matcher::{matching_jobs, matching_subscribers};
pub use registry::{RegistryError, SubscriberRegistry, SubscriberView};
pub use router::subscription_router;
pub use scheduler::{
    BatchReport, NotificationScheduler, SchedulerError, TriggerEvent, TriggerOutcome,
};
pub use service::{SubscriptionError, SubscriptionReceipt, SubscriptionService};
