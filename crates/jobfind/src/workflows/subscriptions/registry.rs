use chrono::{DateTime, Utc};
use serde::Serialize;

use super::catalog::SkillCatalog;
use super::domain::{EmailAddress, Skill, Subscriber};

/// Storage abstraction over subscription records, keyed by normalized email.
///
/// `upsert` is idempotent and last-write-wins for the same email; an
/// implementation must preserve `created_at` across replacements and refresh
/// `updated_at`. `list_all` returns a snapshot taken at call time: concurrent
/// upserts must never corrupt an iteration, and whether they are observed is
/// unspecified (matching is advisory, not transactional).
pub trait SubscriberRegistry: Send + Sync {
    fn upsert(&self, subscriber: Subscriber) -> Result<Subscriber, RegistryError>;
    fn find(&self, email: &EmailAddress) -> Result<Option<Subscriber>, RegistryError>;
    fn list_all(&self) -> Result<Vec<Subscriber>, RegistryError>;
}

/// Error enumeration for registry failures.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("subscriber registry unavailable: {0}")]
    Unavailable(String),
}

/// API-facing rendering of a subscriber with resolved skill names.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberView {
    pub email: String,
    pub name: String,
    pub skills: Vec<Skill>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriberView {
    pub fn render(subscriber: &Subscriber, catalog: &SkillCatalog) -> Self {
        Self {
            email: subscriber.email.as_str().to_string(),
            name: subscriber.name.clone(),
            skills: subscriber
                .skills
                .iter()
                .map(|id| Skill {
                    id,
                    name: catalog.display_name(id),
                })
                .collect(),
            updated_at: subscriber.updated_at,
        }
    }
}
