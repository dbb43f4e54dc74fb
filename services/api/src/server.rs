use crate::cli::ServeArgs;
use crate::infra::{marketplace_service, AppState, MarketplaceService, MarketplaceSnapshot};
use crate::routes::with_distribution_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use caseflow::config::{AppConfig, SchedulerConfig};
use caseflow::error::AppError;
use caseflow::telemetry;
use caseflow::workflows::distribution::{
    EnvSettingsSource, InMemoryMarketplace, SettingsProvider, SystemClock,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

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

    let store = Arc::new(InMemoryMarketplace::new());
    if let Some(path) = args.snapshot.take() {
        let snapshot = MarketplaceSnapshot::read(&path)?;
        info!(
            cases = snapshot.cases.len(),
            lawyers = snapshot.lawyers.len(),
            offers = snapshot.offers.len(),
            path = %path.display(),
            "marketplace seeded from snapshot"
        );
        snapshot.load_into(&store)?;
    }

    let settings = Arc::new(SettingsProvider::new(
        Arc::new(EnvSettingsSource),
        config.scheduler.settings_ttl,
    ));
    let service = Arc::new(marketplace_service(
        store,
        settings,
        Arc::new(SystemClock),
    ));

    let scheduler = spawn_scheduler(service.clone(), &config.scheduler);

    let app = with_distribution_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "case distribution service ready");

    let served = axum::serve(listener, app).await;
    for task in scheduler {
        task.abort();
    }
    served?;
    Ok(())
}

/// Periodic offer expiry and quota window resets.
fn spawn_scheduler(
    service: Arc<MarketplaceService>,
    config: &SchedulerConfig,
) -> Vec<JoinHandle<()>> {
    let sweep_service = service.clone();
    let sweep_every = config.sweep_interval;
    let sweeper = tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        loop {
            interval.tick().await;
            let service = sweep_service.clone();
            match tokio::task::spawn_blocking(move || service.sweep()).await {
                Ok(Ok(report)) => info!(
                    expired = report.expired_count,
                    failures = report.failures.len(),
                    "scheduled sweep complete"
                ),
                Ok(Err(err)) => error!(%err, "scheduled sweep failed"),
                Err(err) => error!(%err, "scheduled sweep task aborted"),
            }
        }
    });

    let reset_every = config.quota_reset_interval;
    let resetter = tokio::spawn(async move {
        let mut interval = tokio::time::interval(reset_every);
        loop {
            interval.tick().await;
            let service = service.clone();
            match tokio::task::spawn_blocking(move || service.reset_quotas()).await {
                Ok(Ok(reset)) => info!(reset, "scheduled quota reset complete"),
                Ok(Err(err)) => error!(%err, "scheduled quota reset failed"),
                Err(err) => error!(%err, "scheduled quota reset task aborted"),
            }
        }
    });

    vec![sweeper, resetter]
}
