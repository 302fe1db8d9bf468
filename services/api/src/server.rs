use crate::cli::ServeArgs;
use crate::infra::{
    notification_hooks, AppState, InMemoryEnrollmentStore, InMemoryLeadRepository,
    NotificationOutbox,
};
use crate::routes::with_lead_routes;
use academy_leads::config::AppConfig;
use academy_leads::error::AppError;
use academy_leads::telemetry;
use academy_leads::workflows::leads::LeadLifecycleService;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

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

    let lead_service = Arc::new(LeadLifecycleService::new(
        Arc::new(InMemoryLeadRepository::default()),
        Arc::new(InMemoryEnrollmentStore::default()),
        notification_hooks(NotificationOutbox::default()),
        &config.leads,
    ));

    let app = with_lead_routes(lead_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        qualification_threshold = config.leads.qualification_threshold,
        "academy lead service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
