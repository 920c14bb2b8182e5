use super::domain::{Job, JobId};

/// Read-only view of the job posting workflow.
///
/// Postings are created and updated elsewhere; the matching core only ever
/// reads them. `active_jobs` is the sweep source and must exclude inactive
/// postings.
pub trait JobFeed: Send + Sync {
    fn find(&self, id: JobId) -> Result<Option<Job>, FeedError>;
    fn active_jobs(&self) -> Result<Vec<Job>, FeedError>;
}

/// Error enumeration for feed failures.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("job feed unavailable: {0}")]
    Unavailable(String),
}
