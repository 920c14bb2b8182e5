use crate::cli::ServeArgs;
use crate::infra::{
    default_skill_catalog, dispatch_policy, retry_backoff, AppState, InMemoryJobFeed,
    InMemoryNotificationStore, InMemorySubscriberRegistry, LoggingMailSender,
};
use crate::routes::with_subscription_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use jobfind::config::AppConfig;
use jobfind::error::AppError;
use jobfind::telemetry;
use jobfind::workflows::subscriptions::SubscriptionService;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let registry = Arc::new(InMemorySubscriberRegistry::default());
    let feed = Arc::new(InMemoryJobFeed::default());
    let store = Arc::new(InMemoryNotificationStore::default());
    let service = Arc::new(SubscriptionService::new(
        Arc::new(default_skill_catalog()),
        registry,
        feed.clone(),
        Arc::new(LoggingMailSender),
        store,
        retry_backoff(&config.notifications),
        dispatch_policy(&config.notifications),
    ));

    if let Some(period) = config.notifications.sweep_interval() {
        let sweeper = Arc::clone(&service);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick fires immediately; skip it so startup stays quiet.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = sweeper.run_sweep().await {
                    warn!("scheduled sweep failed: {err}");
                }
            }
        });
    }

    let app = with_subscription_routes(service, feed)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "job subscription notification service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
