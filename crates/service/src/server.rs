use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use summarizer::coordinator::PipelineCoordinator;
use summarizer_core::health::HealthChecker;
use summarizer_core::metrics::{metrics_handler, MetricsMiddleware};
use summarizer_core::ServiceConfig;
use tracing::info;

use crate::health;
use crate::middleware::RequestIdMiddleware;

/// Owns the wired `PipelineCoordinator` and serves only the health/metrics
/// surface over HTTP. The coordinator itself is a library handle for
/// whatever out-of-scope transport embeds this process; it is not routed.
pub struct Server {
    config: ServiceConfig,
    coordinator: Arc<PipelineCoordinator>,
    health_checker: Arc<HealthChecker>,
}

impl Server {
    pub fn new(config: ServiceConfig, coordinator: Arc<PipelineCoordinator>, health_checker: Arc<HealthChecker>) -> Self {
        Self {
            config,
            coordinator,
            health_checker,
        }
    }

    pub fn coordinator(&self) -> Arc<PipelineCoordinator> {
        self.coordinator.clone()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let bind_addr = format!("{}:{}", self.config.host, self.config.port);
        let coordinator = self.coordinator.clone();
        let health_checker = self.health_checker.clone();

        info!(%bind_addr, "binding health/metrics surface");

        HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(coordinator.clone()))
                .app_data(web::Data::new(health_checker.clone()))
                .wrap(MetricsMiddleware)
                .wrap(RequestIdMiddleware)
                .route("/health", web::get().to(health::health))
                .route("/health/ready", web::get().to(health::readiness))
                .route("/health/live", web::get().to(health::liveness))
                .route("/metrics", web::get().to(metrics_handler))
        })
        .bind(&bind_addr)?
        .run()
        .await?;

        Ok(())
    }
}
