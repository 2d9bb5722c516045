use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::error::ProvisionError;
use crate::gate::ApiKeyGate;
use crate::layout::MountRequest;
use crate::probe;
use crate::service::MountService;

type SharedService = Arc<MountService>;

pub const REGISTER_PATH: &str = "/api/v1/app/mount/register";
pub const READY_PATH: &str = "/api/v1/app/mount/ready";
pub const MOUNT_HEALTH_PATH: &str = "/api/v1/health/mount";

/// Full application router: mount endpoints, health namespace, API key gate.
pub fn router(service: Arc<MountService>) -> Router {
    let gate = ApiKeyGate::new(&service.config().api_key);

    Router::new()
        .route(REGISTER_PATH, post(register_mount))
        .route(READY_PATH, post(check_mount_ready))
        .route(MOUNT_HEALTH_PATH, get(mount_health))
        .with_state(service)
        .merge(ops_support::health::router())
        .layer(middleware::from_fn_with_state(gate, ApiKeyGate::check))
        .layer(TraceLayer::new_for_http())
}

async fn register_mount(
    State(service): State<SharedService>,
    payload: Result<Json<MountRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    tracing::info!(app_name = %request.app_name, "received mount register request");
    request.validate()?;

    if let Err(err) = service
        .register_mount(&request.app_name, &request.user_id)
        .await
    {
        tracing::error!(app_name = %request.app_name, error = %err, "failed to register mount");
        return Err(err.into());
    }

    Ok(Json(json!({
        "status": "success",
        "message": "Mount registered successfully",
        "appName": request.app_name,
    })))
}

async fn check_mount_ready(
    State(service): State<SharedService>,
    payload: Result<Json<MountRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(request) = payload?;
    tracing::info!(app_name = %request.app_name, "received mount ready check");
    request.validate()?;

    let app_name = request.app_name.clone();
    let ready = tokio::task::spawn_blocking(move || {
        service.is_mount_ready(&request.app_name, &request.user_id)
    })
    .await
    .unwrap_or_else(|err| {
        tracing::error!(error = %err, "readiness check did not complete");
        false
    });

    if ready {
        Ok((
            StatusCode::OK,
            Json(json!({ "status": "ready", "appName": app_name })),
        ))
    } else {
        Ok((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "status": "not_ready", "appName": app_name })),
        ))
    }
}

async fn mount_health(State(service): State<SharedService>) -> Response {
    let base_path = service.config().base_path.clone();
    let health = match tokio::task::spawn_blocking(move || probe::check_mount(&base_path)).await
    {
        Ok(health) => health,
        Err(err) => return ApiError::Internal(err.to_string()).into_response(),
    };

    let status = if health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health)).into_response()
}

// ── Error handling ──────────────────────────────────────────────────────

enum ApiError {
    BadRequest(String),
    Provision(ProvisionError),
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<ProvisionError> for ApiError {
    fn from(error: ProvisionError) -> Self {
        Self::Provision(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Provision(err @ ProvisionError::InvalidRequest(_)) => {
                (StatusCode::BAD_REQUEST, err.public_message())
            }
            Self::Provision(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.public_message()),
            Self::Internal(detail) => {
                tracing::error!(detail = %detail, "request handler failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "status": "error", "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MountConfig, OwnershipPolicy};
    use crate::executor::mock::MockExecutor;
    use axum::body::Body;
    use std::os::unix::fs::MetadataExt;
    use std::path::Path;
    use tower::ServiceExt;

    const KEY: &str = "test-key";

    fn app(base: &Path, ownership: OwnershipPolicy, executor: MockExecutor) -> Router {
        let config = MountConfig::new(base, ownership, KEY).unwrap();
        router(Arc::new(MountService::new(
            Arc::new(config),
            Arc::new(executor),
        )))
    }

    async fn post_json(app: Router, uri: &str, key: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header("X-API-Key", key);
        }
        let request = builder.body(Body::from(body.to_string())).unwrap();
        read(app.oneshot(request).await.unwrap()).await
    }

    async fn read(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_register_success() {
        let executor = MockExecutor::new();
        let app = app(Path::new("/mnt/dump"), OwnershipPolicy::Chown, executor.clone());

        let (status, body) = post_json(
            app,
            REGISTER_PATH,
            Some(KEY),
            json!({"appName": "app1", "userId": "1000"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "status": "success",
                "message": "Mount registered successfully",
                "appName": "app1"
            })
        );
        assert_eq!(executor.recorded().len(), 3);
    }

    #[tokio::test]
    async fn test_register_failure_is_500_without_paths() {
        let executor =
            MockExecutor::new().fail_command("chown -R 1000:1000 /mnt/dump/app1/heap", 1);
        let app = app(Path::new("/mnt/dump"), OwnershipPolicy::Chown, executor);

        let (status, body) = post_json(
            app,
            REGISTER_PATH,
            Some(KEY),
            json!({"appName": "app1", "userId": "1000"}),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert_eq!(
            body["message"],
            "Failed to register mount: chown failed with exit code: 1"
        );
    }

    #[tokio::test]
    async fn test_register_requires_key() {
        let executor = MockExecutor::new();
        let app = app(Path::new("/mnt/dump"), OwnershipPolicy::Chown, executor.clone());

        let (status, body) = post_json(
            app,
            REGISTER_PATH,
            None,
            json!({"appName": "app1", "userId": "1000"}),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"error": "Unauthorized - Invalid API Key"}));
        assert!(executor.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_register_rejects_missing_user() {
        let executor = MockExecutor::new();
        let app = app(Path::new("/mnt/dump"), OwnershipPolicy::Chown, executor.clone());

        let (status, body) =
            post_json(app, REGISTER_PATH, Some(KEY), json!({"appName": "app1"})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert!(executor.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_register_rejects_malformed_json() {
        let app = app(Path::new("/mnt/dump"), OwnershipPolicy::Chown, MockExecutor::new());
        let request = http::Request::builder()
            .method("POST")
            .uri(REGISTER_PATH)
            .header("content-type", "application/json")
            .header("X-API-Key", KEY)
            .body(Body::from("{not json"))
            .unwrap();

        let (status, body) = read(app.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_ready_for_owner() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("app1/heap")).unwrap();
        let uid = std::fs::metadata(dir.path()).unwrap().uid().to_string();
        let app = app(dir.path(), OwnershipPolicy::Chown, MockExecutor::new());

        let (status, body) = post_json(
            app,
            READY_PATH,
            Some(KEY),
            json!({"appName": "app1", "userId": uid}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ready", "appName": "app1"}));
    }

    #[tokio::test]
    async fn test_not_ready_is_401() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), OwnershipPolicy::Chown, MockExecutor::new());

        let (status, body) = post_json(
            app,
            READY_PATH,
            Some(KEY),
            json!({"appName": "missing", "userId": "1000"}),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"status": "not_ready", "appName": "missing"}));
    }

    #[tokio::test]
    async fn test_health_namespace_is_open() {
        let app = app(Path::new("/mnt/dump"), OwnershipPolicy::Chown, MockExecutor::new());
        for (uri, expected) in [
            ("/api/v1/health", "UP"),
            ("/api/v1/health/ready", "READY"),
            ("/api/v1/health/live", "ALIVE"),
        ] {
            let request = http::Request::builder()
                .uri(uri)
                .body(Body::empty())
                .unwrap();
            let (status, body) = read(app.clone().oneshot(request).await.unwrap()).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert_eq!(body, json!({"status": expected}));
        }
    }

    #[tokio::test]
    async fn test_mount_health_reports_base_path() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), OwnershipPolicy::Chmod, MockExecutor::new());
        let request = http::Request::builder()
            .uri(MOUNT_HEALTH_PATH)
            .body(Body::empty())
            .unwrap();

        let (status, body) = read(app.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "UP");
        assert!(body["disk"]["totalBytes"].as_u64().unwrap() > 0);
        assert!(body["disk"]["freeBytes"].is_u64());
    }

    #[tokio::test]
    async fn test_mount_health_down_for_missing_base() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir.path().join("gone"), OwnershipPolicy::Chmod, MockExecutor::new());
        let request = http::Request::builder()
            .uri(MOUNT_HEALTH_PATH)
            .body(Body::empty())
            .unwrap();

        let (status, body) = read(app.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "DOWN");
        assert!(body.get("disk").is_none());
    }
}
