use crate::infra::{
    default_skill_catalog, InMemoryJobFeed, InMemoryNotificationStore, InMemorySubscriberRegistry,
};
use chrono::Utc;
use clap::Args;
use jobfind::error::AppError;
use jobfind::workflows::subscriptions::{
    DeliveryError, DeliveryMode, DispatchPolicy, EmailAddress, Job, JobId, JobMailMessage,
    MailSender, NoBackoff, SkillId, SkillSet, SubscriptionRequest, SubscriptionService,
    TriggerOutcome,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Detach deliveries instead of waiting for their outcomes
    #[arg(long)]
    pub(crate) fire_and_forget: bool,
}

/// Mailer used by the CLI demo: prints deliveries instead of sending them.
struct ConsoleMailer;

#[async_trait::async_trait]
impl MailSender for ConsoleMailer {
    async fn send(
        &self,
        recipient: &EmailAddress,
        message: &JobMailMessage,
    ) -> Result<(), DeliveryError> {
        println!(
            "    mail -> {recipient}: {} (skills: {})",
            message.subject(),
            message.job.skills.join(", ")
        );
        Ok(())
    }
}

type DemoService = SubscriptionService<
    InMemorySubscriberRegistry,
    InMemoryJobFeed,
    ConsoleMailer,
    InMemoryNotificationStore,
>;

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let catalog = Arc::new(default_skill_catalog());
    let feed = Arc::new(InMemoryJobFeed::default());
    let policy = DispatchPolicy {
        mode: if args.fire_and_forget {
            DeliveryMode::FireAndForget
        } else {
            DeliveryMode::WaitForOutcome
        },
        ..DispatchPolicy::default()
    };
    let service: DemoService = SubscriptionService::new(
        catalog.clone(),
        Arc::new(InMemorySubscriberRegistry::default()),
        feed.clone(),
        Arc::new(ConsoleMailer),
        Arc::new(InMemoryNotificationStore::default()),
        Arc::new(NoBackoff),
        policy,
    );

    println!("JobFind notification pipeline demo");
    println!("==================================");
    println!();
    println!("Skill catalog:");
    for skill in service.skills() {
        println!("    {:>2}  {}", skill.id.0, skill.name);
    }

    println!();
    println!("Opting in subscribers (no active jobs yet, so no welcome mail):");
    for (email, name, skills) in [
        ("anh@example.com", "Anh", vec![SkillId(1), SkillId(2)]),
        ("binh@example.com", "Binh", vec![SkillId(4)]),
        ("quiet@example.com", "Quiet", Vec::new()),
    ] {
        let receipt = service
            .subscribe(SubscriptionRequest {
                email: email.to_string(),
                name: name.to_string(),
                skills,
            })
            .await?;
        println!(
            "    {} subscribed with {} skill(s)",
            receipt.subscriber.email,
            receipt.subscriber.skills.len()
        );
    }

    let postings = [
        demo_job(101, "Backend Engineer", &[1, 3], true),
        demo_job(102, "Data Platform Engineer", &[2, 4], true),
        demo_job(103, "Legacy Java Maintainer", &[1], false),
    ];

    for posting in postings {
        println!();
        println!(
            "Posting job {} '{}' (active: {}):",
            posting.id, posting.name, posting.active
        );
        feed.publish(posting.clone());
        match service.announce_job(posting.id).await? {
            TriggerOutcome::Completed(report) => println!(
                "    matched {} pair(s), sent {}, deduplicated {}",
                report.matched_pairs,
                report.dispatch.sent(),
                report.dispatch.deduplicated
            ),
            TriggerOutcome::Coalesced => println!("    coalesced onto an active run"),
        }
    }

    println!();
    println!("Running a full sweep (everything already notified, dedup kicks in):");
    match service.run_sweep().await? {
        TriggerOutcome::Completed(report) => println!(
            "    considered {} job(s), sent {}, deduplicated {}",
            report.jobs_considered,
            report.dispatch.sent(),
            report.dispatch.deduplicated
        ),
        TriggerOutcome::Coalesced => println!("    coalesced onto an active run"),
    }

    if args.fire_and_forget {
        // Detached deliveries persist their outcomes shortly after dispatch.
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    println!();
    println!("Notification ledger:");
    let mut records = service.notifications()?;
    records.sort_by(|a, b| {
        (a.subscriber.as_str(), a.job.0).cmp(&(b.subscriber.as_str(), b.job.0))
    });
    for record in records {
        println!(
            "    {:<20} job {:<4} {:<7} attempts: {}",
            record.subscriber.as_str(),
            record.job.0,
            record.outcome.label(),
            record.attempts
        );
    }

    Ok(())
}

fn demo_job(id: i64, name: &str, skill_ids: &[i64], active: bool) -> Job {
    Job {
        id: JobId(id),
        name: name.to_string(),
        company: "JobFind Demo Co".to_string(),
        salary: Some(95_000),
        skills: SkillSet::from_ids(skill_ids.iter().map(|id| SkillId(*id))),
        active,
        created_at: Utc::now(),
    }
}
