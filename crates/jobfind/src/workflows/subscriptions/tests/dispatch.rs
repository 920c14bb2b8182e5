use std::sync::Arc;
use std::time::Duration;

use super::common::*;
use crate::workflows::subscriptions::dispatch::{
    DeliveryError, DeliveryMode, DispatchPolicy, NoBackoff, NotificationDispatcher,
    NotificationStore,
};
use crate::workflows::subscriptions::domain::{NotificationOutcome, PairKey};

#[tokio::test]
async fn duplicate_pairs_within_a_batch_collapse_to_one_record() {
    let mailer = Arc::new(MemoryMailer::default());
    let store = Arc::new(MemoryStore::default());
    let dispatcher = build_dispatcher(mailer.clone(), store.clone(), test_policy());

    let sub = subscriber("a@x.com", "Anh", &[JAVA]);
    let posting = job(1, "Backend Engineer", &[JAVA], true);

    let report = dispatcher
        .dispatch(vec![
            (sub.clone(), posting.clone()),
            (sub.clone(), posting.clone()),
        ])
        .await
        .expect("dispatch succeeds");

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.deduplicated, 1);
    assert_eq!(report.sent(), 1);
    assert_eq!(mailer.calls(), 1);
    assert_eq!(store.records().expect("ledger").len(), 1);
}

#[tokio::test]
async fn second_dispatch_of_a_sent_pair_is_a_no_op() {
    let mailer = Arc::new(MemoryMailer::default());
    let store = Arc::new(MemoryStore::default());
    let dispatcher = build_dispatcher(mailer.clone(), store.clone(), test_policy());

    let sub = subscriber("a@x.com", "Anh", &[JAVA]);
    let posting = job(1, "Backend Engineer", &[JAVA], true);

    let first = dispatcher
        .dispatch(vec![(sub.clone(), posting.clone())])
        .await
        .expect("first dispatch");
    assert_eq!(first.sent(), 1);

    let second = dispatcher
        .dispatch(vec![(sub, posting)])
        .await
        .expect("second dispatch");
    assert!(second.records.is_empty());
    assert_eq!(second.deduplicated, 1);
    assert_eq!(mailer.calls(), 1, "no further delivery attempts");
    assert_eq!(store.records().expect("ledger").len(), 1);
}

#[tokio::test]
async fn transient_failures_are_retried_until_success_within_bound() {
    let mailer = Arc::new(MemoryMailer::default());
    mailer.script([
        Err(DeliveryError::Transient("smtp 421".to_string())),
        Err(DeliveryError::Transient("smtp 421".to_string())),
        Ok(()),
    ]);
    let store = Arc::new(MemoryStore::default());
    let dispatcher = build_dispatcher(mailer.clone(), store.clone(), test_policy());

    let report = dispatcher
        .dispatch(vec![(
            subscriber("a@x.com", "Anh", &[JAVA]),
            job(1, "Backend Engineer", &[JAVA], true),
        )])
        .await
        .expect("dispatch succeeds");

    assert_eq!(report.records.len(), 1);
    let record = &report.records[0];
    assert_eq!(record.outcome, NotificationOutcome::Sent);
    assert_eq!(record.attempts, 3);
    assert_eq!(mailer.calls(), 3);
    assert_eq!(mailer.deliveries().len(), 1);
}

#[tokio::test]
async fn exhausted_retries_record_a_failed_outcome() {
    let mailer = Arc::new(MemoryMailer::default());
    mailer.script([
        Err(DeliveryError::Transient("smtp 421".to_string())),
        Err(DeliveryError::Transient("smtp 421".to_string())),
        Err(DeliveryError::Transient("smtp 421".to_string())),
    ]);
    let store = Arc::new(MemoryStore::default());
    let dispatcher = build_dispatcher(mailer.clone(), store.clone(), test_policy());

    let report = dispatcher
        .dispatch(vec![(
            subscriber("a@x.com", "Anh", &[JAVA]),
            job(1, "Backend Engineer", &[JAVA], true),
        )])
        .await
        .expect("dispatch succeeds");

    let record = &report.records[0];
    assert_eq!(record.outcome, NotificationOutcome::Failed);
    assert_eq!(record.attempts, 3);
}

#[tokio::test]
async fn permanent_failures_are_not_retried() {
    let mailer = Arc::new(MemoryMailer::default());
    mailer.script([Err(DeliveryError::Permanent("bad recipient".to_string()))]);
    let store = Arc::new(MemoryStore::default());
    let dispatcher = build_dispatcher(mailer.clone(), store.clone(), test_policy());

    let report = dispatcher
        .dispatch(vec![(
            subscriber("bounce@x.com", "Bounce", &[JAVA]),
            job(1, "Backend Engineer", &[JAVA], true),
        )])
        .await
        .expect("dispatch succeeds");

    let record = &report.records[0];
    assert_eq!(record.outcome, NotificationOutcome::Failed);
    assert_eq!(record.attempts, 1);
    assert_eq!(mailer.calls(), 1);
}

#[tokio::test]
async fn one_failing_pair_does_not_block_the_rest_of_the_batch() {
    let mailer = Arc::new(MemoryMailer::default());
    mailer.script([Err(DeliveryError::Permanent("bad recipient".to_string()))]);
    let store = Arc::new(MemoryStore::default());
    let dispatcher = build_dispatcher(mailer.clone(), store.clone(), test_policy());

    let posting = job(1, "Backend Engineer", &[JAVA], true);
    let report = dispatcher
        .dispatch(vec![
            (subscriber("a@x.com", "Anh", &[JAVA]), posting.clone()),
            (subscriber("b@x.com", "Binh", &[JAVA]), posting),
        ])
        .await
        .expect("dispatch succeeds");

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.sent(), 1);
    assert_eq!(report.failed(), 1);
}

#[tokio::test]
async fn attempt_timeouts_count_as_transient_failures() {
    let mailer = Arc::new(StalledMailer);
    let store = Arc::new(MemoryStore::default());
    let policy = DispatchPolicy {
        max_attempts: 2,
        attempt_timeout: Duration::from_millis(20),
        ..test_policy()
    };
    let dispatcher = NotificationDispatcher::new(
        Arc::new(catalog()),
        mailer,
        store.clone(),
        Arc::new(NoBackoff),
        policy,
    );

    let report = dispatcher
        .dispatch(vec![(
            subscriber("a@x.com", "Anh", &[JAVA]),
            job(1, "Backend Engineer", &[JAVA], true),
        )])
        .await
        .expect("dispatch succeeds");

    let record = &report.records[0];
    assert_eq!(record.outcome, NotificationOutcome::Failed);
    assert_eq!(record.attempts, 2);
}

#[tokio::test]
async fn failed_records_also_suppress_redispatch() {
    let mailer = Arc::new(MemoryMailer::default());
    mailer.script([Err(DeliveryError::Permanent("bad recipient".to_string()))]);
    let store = Arc::new(MemoryStore::default());
    let dispatcher = build_dispatcher(mailer.clone(), store.clone(), test_policy());

    let sub = subscriber("bounce@x.com", "Bounce", &[JAVA]);
    let posting = job(1, "Backend Engineer", &[JAVA], true);

    let first = dispatcher
        .dispatch(vec![(sub.clone(), posting.clone())])
        .await
        .expect("first dispatch");
    assert_eq!(first.failed(), 1);

    let second = dispatcher
        .dispatch(vec![(sub, posting)])
        .await
        .expect("second dispatch");
    assert_eq!(second.deduplicated, 1);
    assert_eq!(mailer.calls(), 1);
}

#[tokio::test]
async fn fire_and_forget_detaches_deliveries_and_still_records_outcomes() {
    let mailer = Arc::new(MemoryMailer::default());
    let store = Arc::new(MemoryStore::default());
    let policy = DispatchPolicy {
        mode: DeliveryMode::FireAndForget,
        ..test_policy()
    };
    let dispatcher = build_dispatcher(mailer.clone(), store.clone(), policy);

    let sub = subscriber("a@x.com", "Anh", &[JAVA]);
    let posting = job(1, "Backend Engineer", &[JAVA], true);
    let key = PairKey {
        subscriber: sub.email.clone(),
        job: posting.id,
    };

    let report = dispatcher
        .dispatch(vec![(sub, posting)])
        .await
        .expect("dispatch succeeds");
    assert_eq!(report.detached, 1);
    assert!(report.records.is_empty());

    // The detached task persists its outcome shortly after.
    let mut found = None;
    for _ in 0..50 {
        if let Some(record) = store.find(&key).expect("ledger lookup") {
            found = Some(record);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let record = found.expect("detached delivery recorded");
    assert_eq!(record.outcome, NotificationOutcome::Sent);
    assert_eq!(mailer.deliveries().len(), 1);
}

#[tokio::test]
async fn mail_message_carries_rendered_job_summary() {
    let mailer = Arc::new(MemoryMailer::default());
    let store = Arc::new(MemoryStore::default());
    let dispatcher = build_dispatcher(mailer.clone(), store, test_policy());

    dispatcher
        .dispatch(vec![(
            subscriber("a@x.com", "Anh", &[JAVA]),
            job(7, "Backend Engineer", &[JAVA, REACT], true),
        )])
        .await
        .expect("dispatch succeeds");

    let deliveries = mailer.deliveries();
    assert_eq!(deliveries.len(), 1);
    let (recipient, message) = &deliveries[0];
    assert_eq!(recipient.as_str(), "a@x.com");
    assert_eq!(message.recipient_name, "Anh");
    assert_eq!(message.job.company, "Acme Corp");
    assert_eq!(
        message.job.skills,
        vec!["Java".to_string(), "React".to_string()]
    );
    assert!(message.subject().contains("Backend Engineer"));
}
