//! Ambient health/liveness endpoints.
//!
//! Grounded on `HealthVersionResource` in `original_source/antenna/
//! app.py`: spec.md names `/__version__` as an existing endpoint whose
//! logic is out of scope for the ingestion core, but a minimal
//! version of it is still carried as part of the ambient stack.

use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::lifecycle::{HealthState, Lifecycle};

#[derive(Serialize)]
struct VersionInfo {
    version: &'static str,
}

pub async fn version() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/json")
        .json(VersionInfo {
            version: env!("CARGO_PKG_VERSION"),
        })
}

#[derive(Serialize)]
struct HealthReport {
    storage_ok: bool,
    publish_ok: bool,
    queue_depth: usize,
    has_work_to_do: bool,
}

pub async fn health(lifecycle: web::Data<Arc<Lifecycle>>) -> HttpResponse {
    let mut state = HealthState::default();
    lifecycle.check_health(&mut state).await;

    let report = HealthReport {
        storage_ok: state.storage_ok,
        publish_ok: state.publish_ok,
        queue_depth: lifecycle.queue_depth(),
        has_work_to_do: lifecycle.has_work_to_do(),
    };

    if report.storage_ok && report.publish_ok {
        HttpResponse::Ok().json(report)
    } else {
        HttpResponse::ServiceUnavailable().json(report)
    }
}
