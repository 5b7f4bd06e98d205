use crate::cli::ServeArgs;
use crate::demo::seed_demo_data;
use crate::infra::{build_service, AppState};
use crate::routes::with_housing_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use unihaven::config::AppConfig;
use unihaven::error::AppError;
use unihaven::telemetry;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if args.seed_demo {
        config.seed_demo_data = true;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let (service, _transport) = build_service(&config.mail);
    if config.seed_demo_data {
        let seed = seed_demo_data(&service)?;
        for seeded in &seed.universities {
            info!(
                university = %seeded.ctx.name,
                token = seeded.token.as_str(),
                "demo university seeded"
            );
        }
    }

    let app = with_housing_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, mail = ?config.mail.backend, "unihaven api ready");

    axum::serve(listener, app).await?;
    Ok(())
}
