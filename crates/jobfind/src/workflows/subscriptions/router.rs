use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

use super::dispatch::{DispatchReport, MailSender, NotificationStore};
use super::domain::JobId;
use super::feed::JobFeed;
use super::intake::SubscriptionRequest;
use super::registry::{SubscriberRegistry, SubscriberView};
use super::scheduler::TriggerOutcome;
use super::service::{SubscriptionError, SubscriptionService};

/// Router builder exposing HTTP endpoints for opt-in, lookup, and the
/// notification triggers.
pub fn subscription_router<R, F, M, S>(
    service: Arc<SubscriptionService<R, F, M, S>>,
) -> Router
where
    R: SubscriberRegistry + 'static,
    F: JobFeed + 'static,
    M: MailSender + 'static,
    S: NotificationStore + 'static,
{
    Router::new()
        .route("/api/v1/subscribers", post(subscribe_handler::<R, F, M, S>))
        .route(
            "/api/v1/subscribers/:email",
            get(subscriber_handler::<R, F, M, S>),
        )
        .route("/api/v1/skills", get(skills_handler::<R, F, M, S>))
        .route(
            "/api/v1/jobs/:job_id/notifications",
            post(announce_handler::<R, F, M, S>),
        )
        .route(
            "/api/v1/notifications/sweep",
            post(sweep_handler::<R, F, M, S>),
        )
        .route(
            "/api/v1/notifications",
            get(notifications_handler::<R, F, M, S>),
        )
        .with_state(service)
}

pub(crate) async fn subscribe_handler<R, F, M, S>(
    State(service): State<Arc<SubscriptionService<R, F, M, S>>>,
    axum::Json(request): axum::Json<SubscriptionRequest>,
) -> Response
where
    R: SubscriberRegistry + 'static,
    F: JobFeed + 'static,
    M: MailSender + 'static,
    S: NotificationStore + 'static,
{
    match service.subscribe(request).await {
        Ok(receipt) => {
            let payload = json!({
                "subscriber": SubscriberView::render(&receipt.subscriber, service.catalog()),
                "welcome": dispatch_summary(&receipt.welcome),
            });
            (StatusCode::CREATED, axum::Json(payload)).into_response()
        }
        Err(SubscriptionError::Validation(error)) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        Err(other) => internal_error(other),
    }
}

pub(crate) async fn subscriber_handler<R, F, M, S>(
    State(service): State<Arc<SubscriptionService<R, F, M, S>>>,
    Path(email): Path<String>,
) -> Response
where
    R: SubscriberRegistry + 'static,
    F: JobFeed + 'static,
    M: MailSender + 'static,
    S: NotificationStore + 'static,
{
    match service.find(&email) {
        Ok(subscriber) => {
            let view = SubscriberView::render(&subscriber, service.catalog());
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(SubscriptionError::Validation(error)) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        Err(SubscriptionError::NotFound(what)) => not_found(what),
        Err(other) => internal_error(other),
    }
}

pub(crate) async fn skills_handler<R, F, M, S>(
    State(service): State<Arc<SubscriptionService<R, F, M, S>>>,
) -> Response
where
    R: SubscriberRegistry + 'static,
    F: JobFeed + 'static,
    M: MailSender + 'static,
    S: NotificationStore + 'static,
{
    (StatusCode::OK, axum::Json(service.skills())).into_response()
}

pub(crate) async fn announce_handler<R, F, M, S>(
    State(service): State<Arc<SubscriptionService<R, F, M, S>>>,
    Path(job_id): Path<i64>,
) -> Response
where
    R: SubscriberRegistry + 'static,
    F: JobFeed + 'static,
    M: MailSender + 'static,
    S: NotificationStore + 'static,
{
    match service.announce_job(JobId(job_id)).await {
        Ok(outcome) => (StatusCode::OK, axum::Json(trigger_view(&outcome))).into_response(),
        Err(SubscriptionError::NotFound(what)) => not_found(what),
        Err(other) => internal_error(other),
    }
}

pub(crate) async fn sweep_handler<R, F, M, S>(
    State(service): State<Arc<SubscriptionService<R, F, M, S>>>,
) -> Response
where
    R: SubscriberRegistry + 'static,
    F: JobFeed + 'static,
    M: MailSender + 'static,
    S: NotificationStore + 'static,
{
    match service.run_sweep().await {
        Ok(outcome) => (StatusCode::OK, axum::Json(trigger_view(&outcome))).into_response(),
        Err(other) => internal_error(other),
    }
}

pub(crate) async fn notifications_handler<R, F, M, S>(
    State(service): State<Arc<SubscriptionService<R, F, M, S>>>,
) -> Response
where
    R: SubscriberRegistry + 'static,
    F: JobFeed + 'static,
    M: MailSender + 'static,
    S: NotificationStore + 'static,
{
    match service.notifications() {
        Ok(records) => (StatusCode::OK, axum::Json(records)).into_response(),
        Err(other) => internal_error(other),
    }
}

fn dispatch_summary(report: &DispatchReport) -> serde_json::Value {
    json!({
        "sent": report.sent(),
        "failed": report.failed(),
        "deduplicated": report.deduplicated,
        "detached": report.detached,
    })
}

fn trigger_view(outcome: &TriggerOutcome) -> serde_json::Value {
    match outcome {
        TriggerOutcome::Completed(report) => json!({
            "status": "completed",
            "jobs_considered": report.jobs_considered,
            "matched_pairs": report.matched_pairs,
            "sent": report.dispatch.sent(),
            "failed": report.dispatch.failed(),
            "deduplicated": report.dispatch.deduplicated,
            "detached": report.dispatch.detached,
        }),
        TriggerOutcome::Coalesced => json!({ "status": "coalesced" }),
    }
}

fn not_found(what: String) -> Response {
    let payload = json!({ "error": format!("{what} not found") });
    (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
}

fn internal_error(error: SubscriptionError) -> Response {
    let payload = json!({ "error": error.to_string() });
    (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
}
