use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::SkillCatalog;
use super::domain::{EmailAddress, InvalidEmail, SkillId, SkillSet, Subscriber};

/// Validation errors raised at the subscription boundary. Rejections are
/// synchronous and never partially applied.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error(transparent)]
    MalformedEmail(#[from] InvalidEmail),
    #[error("subscriber name must not be blank")]
    BlankName,
    #[error("unknown skill identifier {0}")]
    UnknownSkill(SkillId),
}

/// Inbound opt-in payload. Skills arrive as raw catalog identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub skills: Vec<SkillId>,
}

/// Guard turning raw subscription payloads into registry-ready subscribers.
#[derive(Debug, Clone)]
pub struct SubscriberIntake {
    catalog: Arc<SkillCatalog>,
}

impl SubscriberIntake {
    pub fn new(catalog: Arc<SkillCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &SkillCatalog {
        &self.catalog
    }

    /// Validate a request and produce the subscriber to upsert.
    ///
    /// Unknown skill identifiers are rejected, not filtered. An empty skill
    /// set is accepted; such a subscriber simply never matches.
    pub fn subscriber_from_request(
        &self,
        request: SubscriptionRequest,
        now: DateTime<Utc>,
    ) -> Result<Subscriber, ValidationError> {
        let email = EmailAddress::parse(&request.email)?;

        let name = request.name.trim();
        if name.is_empty() {
            return Err(ValidationError::BlankName);
        }

        let mut skills = SkillSet::new();
        for id in request.skills {
            if !self.catalog.contains(id) {
                return Err(ValidationError::UnknownSkill(id));
            }
            skills.insert(id);
        }

        Ok(Subscriber {
            email,
            name: name.to_string(),
            skills,
            created_at: now,
            updated_at: now,
        })
    }
}
