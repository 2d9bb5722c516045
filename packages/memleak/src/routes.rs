use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use ops_support::HealthStatus;
use serde::Serialize;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::buffer::LeakStats;
use crate::memory::MemorySnapshot;

pub const HOME_MESSAGE: &str = "Memory Leak Demo Application";

#[derive(Clone)]
struct DemoState {
    stats: watch::Receiver<LeakStats>,
}

#[derive(Debug, Serialize)]
pub struct HomeBody {
    pub status: &'static str,
    pub message: &'static str,
}

/// Body of `GET /health`. Memory fields are absent when procfs can't be read.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    #[serde(rename = "usedMemoryMB", skip_serializing_if = "Option::is_none")]
    pub used_memory_mb: Option<u64>,
    #[serde(rename = "maxMemoryMB", skip_serializing_if = "Option::is_none")]
    pub max_memory_mb: Option<u64>,
    #[serde(rename = "usagePercent", skip_serializing_if = "Option::is_none")]
    pub usage_percent: Option<String>,
    #[serde(rename = "leakedMB")]
    pub leaked_mb: u64,
    pub iterations: u64,
}

impl HealthReport {
    fn new(stats: LeakStats, snapshot: Option<MemorySnapshot>) -> Self {
        Self {
            status: HealthStatus::Up,
            used_memory_mb: snapshot.map(|s| s.used_mb()),
            max_memory_mb: snapshot.map(|s| s.max_mb()),
            usage_percent: snapshot.map(|s| s.usage_percent_text()),
            leaked_mb: stats.leaked_mb(),
            iterations: stats.iterations,
        }
    }
}

pub fn router(stats: watch::Receiver<LeakStats>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .with_state(DemoState { stats })
        .merge(ops_support::health::router())
        .layer(TraceLayer::new_for_http())
}

async fn home() -> Json<HomeBody> {
    Json(HomeBody {
        status: "running",
        message: HOME_MESSAGE,
    })
}

async fn health(State(state): State<DemoState>) -> Json<HealthReport> {
    let stats = *state.stats.borrow();
    let snapshot = match MemorySnapshot::capture() {
        Ok(snapshot) => Some(snapshot),
        Err(err) => {
            tracing::warn!(error = %err, "failed to read memory usage");
            None
        }
    };

    Json(HealthReport::new(stats, snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http::StatusCode;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let request = http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn app_with(stats: LeakStats) -> (watch::Sender<LeakStats>, Router) {
        let (tx, rx) = watch::channel(stats);
        (tx, router(rx))
    }

    #[tokio::test]
    async fn test_home() {
        let (_tx, app) = app_with(LeakStats::default());
        let (status, body) = get_json(app, "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"status": "running", "message": "Memory Leak Demo Application"})
        );
    }

    #[tokio::test]
    async fn test_health_reports_memory_and_leak() {
        let (_tx, app) = app_with(LeakStats {
            iterations: 4,
            leaked_bytes: 40 * 1024 * 1024,
        });
        let (status, body) = get_json(app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "UP");
        assert_eq!(body["leakedMB"], 40);
        assert_eq!(body["iterations"], 4);
        assert!(body["usedMemoryMB"].is_u64());
        assert!(body["maxMemoryMB"].is_u64());

        let percent = body["usagePercent"].as_str().unwrap();
        let (_, decimals) = percent.split_once('.').unwrap();
        assert_eq!(decimals.len(), 2);
    }

    #[tokio::test]
    async fn test_health_sees_latest_stats() {
        let (tx, app) = app_with(LeakStats::default());
        tx.send(LeakStats {
            iterations: 9,
            leaked_bytes: 0,
        })
        .unwrap();

        let (_, body) = get_json(app, "/health").await;
        assert_eq!(body["iterations"], 9);
    }

    #[tokio::test]
    async fn test_ops_health_namespace_is_mounted() {
        let (_tx, app) = app_with(LeakStats::default());
        let (status, body) = get_json(app, "/api/v1/health/ready").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "READY"}));
    }

    #[test]
    fn test_report_without_snapshot_omits_memory_fields() {
        let report = HealthReport::new(LeakStats::default(), None);
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"status": "UP", "leakedMB": 0, "iterations": 0})
        );
    }
}
