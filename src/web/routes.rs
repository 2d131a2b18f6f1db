//! HTTP route handlers for the host runtime API.
//!
//! Each inbound trigger (start-run, stop-run, get-status, schedule,
//! cancel-schedule, debug-current-page) is an asynchronous request/response
//! pair. All business logic is delegated to the coordinator, scheduler and
//! stats store.

use std::sync::Arc;
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tracing::info;

use crate::AppConfig;
use crate::AppState;
use crate::coordinator::{RunError, StartOptions};
use crate::pacing::DelayRange;
use crate::scheduler::DailySchedule;

/// JSON error response helper
fn err_response(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({ "error": msg })))
}

/// Build the API router with all endpoints.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Config
        .route("/config", get(get_config).post(configure))
        // Automation control
        .route("/automation/start", post(start_automation))
        .route("/automation/stop", post(stop_automation))
        .route("/automation/status", get(get_status))
        // Schedule
        .route(
            "/schedule",
            get(get_schedule).post(set_schedule).delete(cancel_schedule),
        )
        // Stats & events
        .route("/stats/daily", get(get_daily_stats))
        .route("/events", get(get_events))
        // Debug
        .route("/debug/page", post(debug_page))
        .layer(Extension(state))
}

// ========== Config Handlers ==========

async fn get_config(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let config = state.config.read().await.clone();
    Json(config)
}

async fn configure(
    Extension(state): Extension<Arc<AppState>>,
    Json(config): Json<AppConfig>,
) -> impl IntoResponse {
    info!("Configuring application via web API");
    state.configure(config).await;
    StatusCode::OK
}

// ========== Automation Handlers ==========

#[derive(serde::Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct StartRequest {
    /// Number of searches; falls back to the configured default
    count: Option<usize>,
    /// Topics; fall back to the configured selected tags
    topics: Option<Vec<String>>,
}

async fn start_automation(
    Extension(state): Extension<Arc<AppState>>,
    request: Option<Json<StartRequest>>,
) -> impl IntoResponse {
    let Json(request) = request.unwrap_or_default();
    let config = state.config.read().await.clone();

    let count = request.count.unwrap_or(config.search_count);
    let topics = request
        .topics
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| config.selected_tags.clone());

    if config.api_key.is_empty() {
        return err_response(StatusCode::BAD_REQUEST, "API key not configured").into_response();
    }
    if !(1..=AppConfig::MAX_SEARCH_COUNT).contains(&count) {
        return err_response(
            StatusCode::BAD_REQUEST,
            &format!("Search count must be between 1 and {}", AppConfig::MAX_SEARCH_COUNT),
        )
        .into_response();
    }
    if topics.is_empty() {
        return err_response(StatusCode::BAD_REQUEST, "No topics selected").into_response();
    }

    state
        .driver
        .configure(config.headless, config.scroll_duration_secs)
        .await;

    let options = StartOptions {
        count,
        topics,
        api_key: config.api_key.clone(),
        search_delay: DelayRange::new(config.min_search_delay_ms, config.max_search_delay_ms),
    };

    match state.coordinator.start(options).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e @ RunError::AlreadyRunning) => {
            err_response(StatusCode::CONFLICT, &e.to_string()).into_response()
        }
        Err(e) => err_response(StatusCode::BAD_REQUEST, &e.to_string()).into_response(),
    }
}

async fn stop_automation(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    match state.coordinator.stop().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => err_response(StatusCode::BAD_REQUEST, &e.to_string()).into_response(),
    }
}

async fn get_status(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    Json(state.coordinator.status())
}

// ========== Schedule Handlers ==========

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleRequest {
    /// Time of day in HH:MM format
    time: String,
}

async fn set_schedule(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<ScheduleRequest>,
) -> impl IntoResponse {
    let schedule = match DailySchedule::new(&request.time) {
        Ok(s) => s,
        Err(e) => return err_response(StatusCode::BAD_REQUEST, &e).into_response(),
    };

    info!("Setting daily schedule via web API: {}", schedule.time);
    state.scheduler.set(schedule.clone()).await;

    {
        let mut config = state.config.write().await;
        config.scheduled_time = Some(schedule.time);
        config.save();
    }

    StatusCode::OK.into_response()
}

async fn cancel_schedule(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    state.scheduler.clear().await;

    {
        let mut config = state.config.write().await;
        config.scheduled_time = None;
        config.save();
    }

    StatusCode::OK
}

async fn get_schedule(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    Json(state.scheduler.status().await)
}

// ========== Stats & Events Handlers ==========

async fn get_daily_stats(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    Json(state.stats.snapshot().await)
}

async fn get_events(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    Json(state.notifier.recent().await)
}

// ========== Debug Handlers ==========

async fn debug_page(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    match state.driver.debug_current_page().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => err_response(StatusCode::BAD_REQUEST, &e.to_string()).into_response(),
    }
}
