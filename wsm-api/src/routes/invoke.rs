use crate::{error::ApiError, state::AppState};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::Value;
use tracing::warn;
use wsm_manager::{dispatch_value, ActionResponse, WorkspaceEvent};

pub const INVOKE_TOKEN_HEADER: &str = "x-wsm-invoke-token";

pub fn routes() -> Router<AppState> {
    Router::new().route("/invoke", post(invoke))
}

/// Run one action event and relay its status code and body.
#[utoipa::path(
    post,
    path = "/invoke",
    request_body = WorkspaceEvent,
    responses(
        (status = 200, description = "Action succeeded", body = serde_json::Value),
        (status = 400, description = "Unknown action or invalid input", body = serde_json::Value),
        (status = 401, description = "Missing or wrong invoke token"),
        (status = 404, description = "Workspace not found", body = serde_json::Value),
        (status = 500, description = "Action failed", body = serde_json::Value)
    ),
    tag = "invoke"
)]
pub async fn invoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<Value>,
) -> Result<Response, ApiError> {
    if let Some(expected) = &state.invoke_token {
        let presented = headers
            .get(INVOKE_TOKEN_HEADER)
            .and_then(|h| h.to_str().ok());
        if presented != Some(expected.as_str()) {
            warn!("Rejected /invoke call with missing or wrong token");
            return Err(ApiError::Unauthorized("invalid invoke token".to_string()));
        }
    }

    let response = dispatch_value(&state.manager, event).await;
    Ok(into_http(response))
}

fn into_http(response: ActionResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response.body)).into_response()
}
