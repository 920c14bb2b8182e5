use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for catalog skills. Identity is the number; display
/// names may be edited without affecting matching.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SkillId(pub i64);

impl fmt::Display for SkillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named competency used to characterize jobs and subscriber interests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub id: SkillId,
    pub name: String,
}

/// Set of skill identifiers. No duplicates, order irrelevant, comparisons by
/// identifier only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkillSet(BTreeSet<SkillId>);

impl SkillSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = SkillId>,
    {
        Self(ids.into_iter().collect())
    }

    pub fn insert(&mut self, id: SkillId) -> bool {
        self.0.insert(id)
    }

    pub fn contains(&self, id: SkillId) -> bool {
        self.0.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = SkillId> + '_ {
        self.0.iter().copied()
    }

    /// True iff the two sets share at least one identifier.
    pub fn intersects(&self, other: &SkillSet) -> bool {
        let (probe, base) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        probe.0.iter().any(|id| base.0.contains(id))
    }

    pub fn union(&self, other: &SkillSet) -> SkillSet {
        SkillSet(self.0.union(&other.0).copied().collect())
    }
}

impl FromIterator<SkillId> for SkillSet {
    fn from_iter<I: IntoIterator<Item = SkillId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Raised when an address fails the shape check at the parse boundary.
#[derive(Debug, thiserror::Error)]
#[error("malformed email address '{0}'")]
pub struct InvalidEmail(pub String);

/// Normalized (lowercased) email address. Subscriber identity key.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Parse and normalize an address. The check is deliberately shallow:
    /// one `@`, non-empty local part, dotted domain, no whitespace. Anything
    /// stricter belongs to the mail collaborator.
    pub fn parse(raw: &str) -> Result<Self, InvalidEmail> {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.chars().any(char::is_whitespace) {
            return Err(InvalidEmail(raw.to_string()));
        }

        let Some((local, domain)) = normalized.split_once('@') else {
            return Err(InvalidEmail(raw.to_string()));
        };

        let domain_ok = !domain.is_empty()
            && domain.contains('.')
            && !domain.contains('@')
            && !domain.starts_with('.')
            && !domain.ends_with('.');

        if local.is_empty() || !domain_ok {
            return Err(InvalidEmail(raw.to_string()));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An email-identified party who opted in to job-match notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub email: EmailAddress,
    pub name: String,
    pub skills: SkillSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identifier wrapper for job postings.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct JobId(pub i64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A job posting as supplied by the posting workflow. The matching core only
/// reads these; only active postings participate in matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub company: String,
    pub salary: Option<u64>,
    pub skills: SkillSet,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Mail-facing rendering of a job with skill display names resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub name: String,
    pub company: String,
    pub salary: Option<u64>,
    pub skills: Vec<String>,
}

/// Payload handed to the mail collaborator for one (subscriber, job) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMailMessage {
    pub recipient_name: String,
    pub job: JobSummary,
}

impl JobMailMessage {
    pub fn subject(&self) -> String {
        format!("New opportunity: {} at {}", self.job.name, self.job.company)
    }
}

/// Delivery outcome tracked per dispatched pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationOutcome {
    Sent,
    Failed,
}

impl NotificationOutcome {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationOutcome::Sent => "sent",
            NotificationOutcome::Failed => "failed",
        }
    }
}

/// Uniqueness key of the notification ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairKey {
    pub subscriber: EmailAddress,
    pub job: JobId,
}

/// One row of the notification ledger: outcome, attempt count, timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub subscriber: EmailAddress,
    pub job: JobId,
    pub outcome: NotificationOutcome,
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn pair_key(&self) -> PairKey {
        PairKey {
            subscriber: self.subscriber.clone(),
            job: self.job,
        }
    }
}
