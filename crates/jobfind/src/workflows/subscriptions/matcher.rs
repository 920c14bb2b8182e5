//! Pure skill-overlap matching.
//!
//! Output order is unspecified: callers must treat results as sets. The
//! dispatcher dedups by (subscriber email, job id) and never depends on
//! ordering.

use super::domain::{Job, Subscriber};

/// Subscribers whose interest sets overlap the job's required skills.
///
/// Inactive jobs match nobody regardless of overlap, and a job with an empty
/// skill set matches nothing by policy. A subscriber with an empty skill set
/// never appears in the output.
pub fn matching_subscribers(job: &Job, subscribers: &[Subscriber]) -> Vec<Subscriber> {
    if !job.active || job.skills.is_empty() {
        return Vec::new();
    }

    subscribers
        .iter()
        .filter(|subscriber| subscriber.skills.intersects(&job.skills))
        .cloned()
        .collect()
}

/// Active jobs overlapping a subscriber's interests. Used by the welcome
/// flow when a subscription is created or updated.
pub fn matching_jobs(subscriber: &Subscriber, jobs: &[Job]) -> Vec<Job> {
    if subscriber.skills.is_empty() {
        return Vec::new();
    }

    jobs.iter()
        .filter(|job| {
            job.active && !job.skills.is_empty() && job.skills.intersects(&subscriber.skills)
        })
        .cloned()
        .collect()
}
