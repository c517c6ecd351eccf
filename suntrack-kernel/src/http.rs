/**
 * CONTROL API - HTTP surface of the sun tracker
 *
 * RÔLE :
 * Start/stop the poll loop, override the interval, inspect scheduler state.
 *
 * ROUTES :
 * - GET  /health             liveness, unauthenticated
 * - GET  /system/health      kernel counters
 * - PUT  /start_stop_camera  {"action": "start" | "stop"}
 * - PUT  /change_interval    {"interval": <seconds>}
 * - GET  /status             poll state, last weather, detector availability
 *
 * SÉCURITÉ :
 * - Header x-api-key required on every route except /health*
 * - SUNTRACK_API_KEY unset means every protected route is denied
 */

use crate::health::{HealthTracker, KernelHealth};
use crate::service::{ControlError, SchedulerService, ServiceStatus};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::{info, warn};

pub const API_KEY_ENV: &str = "SUNTRACK_API_KEY";

#[derive(Clone)]
pub struct AppState {
    pub service: SchedulerService,
    pub health_tracker: HealthTracker,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/start_stop_camera", put(start_stop_camera))
        .route("/change_interval", put(change_interval))
        .route("/status", get(get_status))
        .with_state(app_state)
        .layer(middleware::from_fn(require_api_key))
}

fn key_allowed(path: &str, provided: Option<&str>, expected: &str) -> bool {
    if path.starts_with("/health") {
        return true;
    }
    if expected.is_empty() {
        return false;
    }
    provided == Some(expected)
}

async fn require_api_key(req: Request, next: Next) -> Result<Response, StatusCode> {
    let expected = std::env::var(API_KEY_ENV).unwrap_or_default();
    let provided = req.headers().get("x-api-key").and_then(|v| v.to_str().ok());

    if !key_allowed(req.uri().path(), provided, &expected) {
        if expected.is_empty() {
            warn!("🔒 {API_KEY_ENV} not set - API access denied");
        } else {
            warn!("🔒 rejected request to {} (bad or missing x-api-key)", req.uri().path());
        }
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

fn control_error(e: ControlError) -> (StatusCode, Json<Value>) {
    let code = match e {
        ControlError::ModelNotLoaded => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    };
    (code, Json(json!({ "ok": false, "error": e.to_string() })))
}

fn bad_request(msg: impl Into<String>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "ok": false, "error": msg.into() })),
    )
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health())
}

// GET /status
async fn get_status(State(app): State<AppState>) -> Json<ServiceStatus> {
    Json(app.service.status())
}

// PUT /start_stop_camera
async fn start_stop_camera(
    State(app): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Ok(Json(body)) = payload else {
        return bad_request("expected a JSON body with an 'action' field");
    };
    let Some(action) = body.get("action").and_then(Value::as_str) else {
        return bad_request("missing 'action'");
    };

    match app.service.apply_action(action) {
        Ok(()) => {
            info!("camera {action} requested");
            let msg = if action == "start" {
                "Camera started"
            } else {
                "Camera stopping"
            };
            (StatusCode::OK, Json(json!({ "ok": true, "message": msg })))
        }
        Err(e) => control_error(e),
    }
}

// PUT /change_interval
async fn change_interval(
    State(app): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Ok(Json(body)) = payload else {
        return bad_request("expected a JSON body with an 'interval' field");
    };
    let Some(interval) = body.get("interval").and_then(Value::as_i64) else {
        return bad_request("'interval' must be a positive integer");
    };

    match app.service.set_interval(interval).await {
        Ok(decision) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "message": decision.formula.to_string(),
                "interval_time": decision.interval_secs,
                "next_interval_time": decision.next_poll_at,
            })),
        ),
        Err(e) => control_error(e),
    }
}
