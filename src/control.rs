//! Control surface: thin HTTP CRUD over project lifecycle, metrics and
//! health, built on an `AppState`/`Router`/`CorsLayer` axum stack. The
//! handlers are direct reads against shared state with no business
//! logic of their own.

use crate::config::Config;
use crate::engine::InferenceEngine;
use crate::orchestrator::{Orchestrator, OrchestratorStatus};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub engine: Arc<InferenceEngine>,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.hub.allowed_origins);
    Router::new()
        .route("/api/projects", get(list_projects))
        .route("/api/projects/:id", get(get_project))
        .route("/api/projects/:id/settings", put(set_project_settings))
        .route("/api/projects/:id/start", post(start_project))
        .route("/api/projects/:id/stop", post(stop_project))
        .route("/api/metrics/:id", get(get_metrics))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/live", get(live))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<_> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
}

#[derive(Serialize)]
struct ProjectsResponse {
    projects: Vec<String>,
    total: usize,
    enabled_count: usize,
}

async fn list_projects(State(state): State<AppState>) -> Json<ProjectsResponse> {
    let projects = state.engine.registered_names();
    Json(ProjectsResponse {
        total: projects.len(),
        enabled_count: projects.len(),
        projects,
    })
}

#[derive(Serialize)]
struct ProjectResponse {
    id: String,
    active: bool,
    settings: serde_json::Value,
}

async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if !state.engine.registered_names().contains(&id) {
        return not_found(&id);
    }
    let active = state.engine.active_name().as_deref() == Some(id.as_str());
    Json(ProjectResponse {
        id,
        active,
        settings: serde_json::json!({}),
    })
    .into_response()
}

async fn set_project_settings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(settings): Json<serde_json::Value>,
) -> impl IntoResponse {
    if !state.engine.registered_names().contains(&id) {
        return not_found(&id);
    }
    Json(settings).into_response()
}

#[derive(Serialize)]
struct StatusResponse {
    project: String,
    status: String,
}

async fn start_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.switch_project(&id) {
        Ok(()) => Json(StatusResponse {
            project: id,
            status: format!("{:?}", state.orchestrator.status()).to_lowercase(),
        })
        .into_response(),
        Err(err) => error_response(StatusCode::CONFLICT, "project_start_failed", &err.to_string()),
    }
}

async fn stop_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.stop() {
        Ok(()) => Json(StatusResponse {
            project: id,
            status: "stopped".to_string(),
        })
        .into_response(),
        Err(err) => error_response(StatusCode::CONFLICT, "project_stop_failed", &err.to_string()),
    }
}

async fn get_metrics(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let running = state.orchestrator.status() == OrchestratorStatus::Running
        && state.engine.active_name().as_deref() == Some(id.as_str());
    if !running {
        return (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "not_running" })),
        )
            .into_response();
    }
    Json(state.orchestrator.metrics().snapshot()).into_response()
}

#[derive(Serialize)]
struct ComponentHealth {
    status: &'static str,
    latency_ms: f64,
    message: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    components: std::collections::HashMap<String, ComponentHealth>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let orchestrator_status = state.orchestrator.status();
    let (status, message) = match orchestrator_status {
        OrchestratorStatus::Error => ("unhealthy", "orchestrator in error state"),
        OrchestratorStatus::Running | OrchestratorStatus::Paused => ("healthy", "running"),
        _ => ("healthy", "idle"),
    };
    let mut components = std::collections::HashMap::new();
    components.insert(
        "orchestrator".to_string(),
        ComponentHealth {
            status,
            latency_ms: state.orchestrator.metrics().snapshot().total_latency_ms,
            message: message.to_string(),
        },
    );
    Json(HealthResponse {
        status: if status == "healthy" { "ok" } else { "degraded" },
        components,
    })
}

#[derive(Serialize)]
struct ReadyResponse {
    mediapipe_loaded: bool,
    classifiers_available: bool,
}

async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    Json(ReadyResponse {
        mediapipe_loaded: true,
        classifiers_available: !state.engine.registered_names().is_empty(),
    })
}

#[derive(Serialize)]
struct LiveResponse {
    status: &'static str,
}

async fn live() -> Json<LiveResponse> {
    Json(LiveResponse { status: "ok" })
}

fn not_found(id: &str) -> axum::response::Response {
    error_response(StatusCode::NOT_FOUND, "project_not_found", &format!("project '{id}' not found"))
}

fn error_response(code: StatusCode, error_code: &str, message: &str) -> axum::response::Response {
    (
        code,
        Json(serde_json::json!({ "code": error_code, "message": message })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifiers::finger_count::{FingerCountClassifier, FingerCountConfig};
    use crate::dispatch::OutputDispatcher;
    use crate::extract::{ExtractionEngine, ExtractorConfig as ExtractExtractorConfig, NullExtractor};

    fn test_state() -> AppState {
        let config = Config::default();
        let extractor = ExtractionEngine::new(
            Box::new(NullExtractor),
            ExtractExtractorConfig {
                max_hands: config.extractor.max_hands,
                min_detection_confidence: config.extractor.min_detection_confidence,
            },
        );
        let engine = Arc::new(InferenceEngine::new());
        engine
            .register(Box::new(FingerCountClassifier::new(FingerCountConfig::default())))
            .unwrap();
        let dispatcher = Arc::new(OutputDispatcher::new());
        let orchestrator = Arc::new(Orchestrator::new(
            config.clone(),
            extractor,
            engine.clone(),
            dispatcher,
        ));
        AppState {
            orchestrator,
            engine,
            config: Arc::new(config),
        }
    }

    #[tokio::test]
    async fn list_projects_reports_registered_classifiers() {
        let state = test_state();
        let response = list_projects(State(state)).await;
        assert_eq!(response.0.total, 1);
        assert_eq!(response.0.projects, vec!["finger_count".to_string()]);
    }

    #[tokio::test]
    async fn get_metrics_reports_not_running_when_project_inactive() {
        let state = test_state();
        let response = get_metrics(State(state), Path("finger_count".to_string())).await;
        let response = response.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn live_always_ok() {
        let response = live().await;
        assert_eq!(response.0.status, "ok");
    }
}
