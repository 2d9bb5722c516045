//! The health namespace every ops service mounts.
//!
//! ## Paths
//!
//! ```text
//! /api/v1/health          # {"status": "UP"}
//! /api/v1/health/ready    # {"status": "READY"}
//! /api/v1/health/live     # {"status": "ALIVE"}
//! ```
//!
//! Everything under [`HEALTH_PREFIX`] (and the legacy [`ACTUATOR_PREFIX`]) is
//! reachable without credentials; see [`is_exempt`].

use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

/// Root of the health namespace.
pub const HEALTH_PREFIX: &str = "/api/v1/health";

/// Management prefix kept open for existing probes.
pub const ACTUATOR_PREFIX: &str = "/actuator";

/// Reported status of a health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Ready,
    Alive,
}

/// Body returned by every health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthBody {
    pub status: HealthStatus,
}

impl HealthBody {
    pub fn new(status: HealthStatus) -> Self {
        Self { status }
    }
}

/// Whether `path` belongs to a namespace that skips authentication.
pub fn is_exempt(path: &str) -> bool {
    path.starts_with(HEALTH_PREFIX) || path.starts_with(ACTUATOR_PREFIX)
}

/// Router for the health namespace, mergeable into any application router.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route(HEALTH_PREFIX, get(health))
        .route(&format!("{HEALTH_PREFIX}/ready"), get(ready))
        .route(&format!("{HEALTH_PREFIX}/live"), get(live))
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody::new(HealthStatus::Up))
}

async fn ready() -> Json<HealthBody> {
    Json(HealthBody::new(HealthStatus::Ready))
}

async fn live() -> Json<HealthBody> {
    Json(HealthBody::new(HealthStatus::Alive))
}
