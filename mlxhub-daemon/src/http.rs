//! HTTP control plane (spec §6.1): the axum `Router` wiring `HubRuntime`
//! operations to routes, and the JSON error mapping from spec §7.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use mlxhub_core::{HubRuntime, HubRuntimeError};
use mlxhub_wire::DetailResponse;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<HubRuntime>,
    pub shutdown: Arc<tokio::sync::Notify>,
}

/// Every route error is reported the same way: HTTP 400 with
/// `{"detail": "<message>"}`. The Hub Runtime never produces a 5xx for a
/// known operation — an unknown model name or a failed start are both
/// client-actionable facts about hub state, not server defects.
struct ApiError(HubRuntimeError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(DetailResponse::new(self.0.to_string()))).into_response()
    }
}

impl From<HubRuntimeError> for ApiError {
    fn from(err: HubRuntimeError) -> Self {
        Self(err)
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/hub/status", get(status))
        .route("/hub/reload", post(reload))
        .route("/hub/shutdown", post(shutdown))
        .route("/hub/models/stop-all", post(stop_all))
        .route("/hub/models/:name/start", post(start_model))
        .route("/hub/models/:name/stop", post(stop_model))
        .route("/hub/models/:name/load", post(load_model))
        .route("/hub/models/:name/unload", post(unload_model));

    if state.runtime.table().enable_status_page() {
        router = router.route("/hub/", get(status_page));
    }

    router.with_state(state)
}

async fn status(State(state): State<AppState>) -> Json<mlxhub_wire::StatusPayload> {
    Json(mlxhub_core::status::project(&state.runtime))
}

async fn reload(State(state): State<AppState>) -> ApiResult<Json<mlxhub_wire::StatusPayload>> {
    state.runtime.reload_config().await?;
    Ok(Json(mlxhub_core::status::project(&state.runtime)))
}

async fn shutdown(State(state): State<AppState>) -> Json<DetailResponse> {
    info!("shutdown requested via HTTP");
    let runtime = state.runtime.clone();
    let notify = state.shutdown.clone();
    tokio::spawn(async move {
        runtime.request_shutdown().await;
        notify.notify_waiters();
    });
    Json(DetailResponse::new("shutting down"))
}

async fn stop_all(State(state): State<AppState>) -> Json<DetailResponse> {
    state.runtime.stop_all_models().await;
    Json(DetailResponse::new("all models stopped"))
}

async fn start_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<DetailResponse>> {
    state.runtime.start_model(&name).await?;
    Ok(Json(DetailResponse::new(format!("model '{name}' started"))))
}

async fn stop_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<DetailResponse>> {
    state.runtime.stop_model(&name).await?;
    Ok(Json(DetailResponse::new(format!("model '{name}' stopped"))))
}

async fn load_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<DetailResponse>> {
    state.runtime.load_model(&name).await?;
    Ok(Json(DetailResponse::new(format!("model '{name}' loaded"))))
}

async fn unload_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<DetailResponse>> {
    state.runtime.unload_model(&name).await?;
    Ok(Json(DetailResponse::new(format!("model '{name}' unloaded"))))
}

async fn status_page(State(state): State<AppState>) -> Html<String> {
    let payload = mlxhub_core::status::project(&state.runtime);
    let rows: String = payload
        .models
        .iter()
        .map(|m| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                m.name,
                m.status,
                m.port,
                m.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            )
        })
        .collect();
    Html(format!(
        "<!DOCTYPE html><html><head><title>mlx-hub status</title>\
         <style>body{{font-family:monospace}}table{{border-collapse:collapse}}\
         td,th{{padding:4px 12px;border-bottom:1px solid #ccc}}</style></head><body>\
         <h1>mlx-hub</h1>\
         <table><thead><tr><th>name</th><th>status</th><th>port</th><th>pid</th></tr></thead>\
         <tbody>{rows}</tbody></table></body></html>"
    ))
}
