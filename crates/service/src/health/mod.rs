//! Health/readiness HTTP handlers, thin wrappers over
//! `summarizer_core::health::HealthChecker`. No domain routes live here or
//! anywhere else in this crate: submitting and polling summarization
//! requests is a library API (`summarizer::PipelineCoordinator`) consumed by
//! whatever out-of-scope transport embeds this process, not an HTTP surface
//! this service exposes itself.

use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;
use summarizer_core::health::HealthChecker;

pub async fn liveness() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({"status": "alive"}))
}

pub async fn health(checker: web::Data<Arc<HealthChecker>>) -> impl Responder {
    let simple = checker.check_simple().await;
    HttpResponse::build(
        actix_web::http::StatusCode::from_u16(simple.status.http_status_code()).unwrap(),
    )
    .json(simple)
}

pub async fn readiness(checker: web::Data<Arc<HealthChecker>>) -> impl Responder {
    let aggregated = checker.check_ready().await;
    HttpResponse::build(
        actix_web::http::StatusCode::from_u16(aggregated.http_status_code()).unwrap(),
    )
    .json(aggregated)
}
