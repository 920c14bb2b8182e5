use crate::infra::{ApiService, AppState, InMemoryJobFeed};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use chrono::Utc;
use jobfind::workflows::subscriptions::{
    subscription_router, Job, JobId, SkillId, SkillSet, SubscriptionError, TriggerOutcome,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Job posting payload accepted from the posting workflow.
#[derive(Debug, Deserialize)]
pub(crate) struct JobPostingRequest {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) company: String,
    #[serde(default)]
    pub(crate) salary: Option<u64>,
    #[serde(default)]
    pub(crate) skills: Vec<SkillId>,
    #[serde(default = "default_active")]
    pub(crate) active: bool,
}

fn default_active() -> bool {
    true
}

/// Board shared with the posting endpoint: the concrete feed plus the
/// service used to announce new postings.
#[derive(Clone)]
pub(crate) struct JobBoard {
    pub(crate) feed: Arc<InMemoryJobFeed>,
    pub(crate) service: Arc<ApiService>,
}

pub(crate) fn with_subscription_routes(
    service: Arc<ApiService>,
    feed: Arc<InMemoryJobFeed>,
) -> axum::Router {
    subscription_router(service.clone())
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route("/api/v1/jobs", axum::routing::post(create_job_endpoint))
        .layer(Extension(JobBoard { feed, service }))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Ingest a posting and fan it out to matching subscribers.
pub(crate) async fn create_job_endpoint(
    Extension(board): Extension<JobBoard>,
    Json(posting): Json<JobPostingRequest>,
) -> axum::response::Response {
    for id in &posting.skills {
        if !board.service.catalog().contains(*id) {
            let payload = json!({ "error": format!("unknown skill identifier {id}") });
            return (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response();
        }
    }

    let job = board.feed.publish(Job {
        id: JobId(posting.id),
        name: posting.name,
        company: posting.company,
        salary: posting.salary,
        skills: SkillSet::from_ids(posting.skills.iter().copied()),
        active: posting.active,
        created_at: Utc::now(),
    });

    match board.service.announce_job(job.id).await {
        Ok(outcome) => {
            let payload = json!({
                "job": job,
                "notifications": announce_view(&outcome),
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(SubscriptionError::NotFound(what)) => {
            let payload = json!({ "error": format!("{what} not found") });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        Err(other) => {
            let payload = json!({ "error": other.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

fn announce_view(outcome: &TriggerOutcome) -> serde_json::Value {
    match outcome {
        TriggerOutcome::Completed(report) => json!({
            "status": "completed",
            "matched_pairs": report.matched_pairs,
            "sent": report.dispatch.sent(),
            "failed": report.dispatch.failed(),
            "deduplicated": report.dispatch.deduplicated,
            "detached": report.dispatch.detached,
        }),
        TriggerOutcome::Coalesced => json!({ "status": "coalesced" }),
    }
}
