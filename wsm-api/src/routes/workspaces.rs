use crate::{
    auth::{check_workspace_owner, AuthenticatedUser},
    error::{ApiError, ApiResult},
    state::AppState,
};
use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;
use wsm_manager::{LaunchOutcome, TerminationResult, WorkspaceKind, WorkspaceRecord};

/// Reason recorded when a user stops their own workspace.
pub const MANUAL_REASON: &str = "manual";

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct LaunchRequest {
    /// Defaults to `editor`.
    #[serde(default)]
    pub workspace_type: Option<WorkspaceKind>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/workspaces", post(launch_workspace))
        .route("/api/v1/workspaces/current", get(current_workspace))
        .route("/api/v1/workspaces/{task_handle}", delete(terminate_workspace))
        .route(
            "/api/v1/workspaces/{task_handle}/activity",
            post(record_activity),
        )
}

#[utoipa::path(
    post,
    path = "/api/v1/workspaces",
    request_body = LaunchRequest,
    responses(
        (status = 200, description = "Workspace ready", body = LaunchOutcome),
        (status = 401, description = "Missing user"),
        (status = 500, description = "Launch failed", body = serde_json::Value)
    ),
    tag = "workspaces"
)]
pub async fn launch_workspace(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<LaunchRequest>,
) -> ApiResult<Json<LaunchOutcome>> {
    let kind = req.workspace_type.unwrap_or_default();
    debug!(
        "Launch requested by {} ({:?}) for {}",
        user.username, user.email, kind
    );

    let outcome = state.manager.launch(&user.username, kind).await?;

    Ok(Json(outcome))
}

#[utoipa::path(
    get,
    path = "/api/v1/workspaces/current",
    responses(
        (status = 200, description = "Most recent workspace of the caller", body = WorkspaceRecord),
        (status = 404, description = "Caller has no workspace")
    ),
    tag = "workspaces"
)]
pub async fn current_workspace(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<WorkspaceRecord>> {
    let record = state
        .manager
        .store()
        .latest_for_owner(&user.username)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No workspace for user {}", user.username)))?;

    Ok(Json(record))
}

#[utoipa::path(
    delete,
    path = "/api/v1/workspaces/{task_handle}",
    params(("task_handle" = String, Path, description = "Task handle")),
    responses(
        (status = 200, description = "Workspace terminated", body = TerminationResult),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Workspace not found"),
        (status = 500, description = "Termination failed")
    ),
    tag = "workspaces"
)]
pub async fn terminate_workspace(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(task_handle): Path<String>,
) -> ApiResult<Json<TerminationResult>> {
    check_workspace_owner(&state.manager, &task_handle, &user).await?;

    match state.manager.terminate(&task_handle, MANUAL_REASON).await {
        TerminationResult::Failed { error, .. } => Err(ApiError::Internal(error)),
        result => Ok(Json(result)),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/workspaces/{task_handle}/activity",
    params(("task_handle" = String, Path, description = "Task handle")),
    responses(
        (status = 200, description = "Activity recorded", body = WorkspaceRecord),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Workspace not found or not running")
    ),
    tag = "workspaces"
)]
pub async fn record_activity(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(task_handle): Path<String>,
) -> ApiResult<Json<WorkspaceRecord>> {
    check_workspace_owner(&state.manager, &task_handle, &user).await?;

    let record = state.manager.record_activity(&task_handle).await?;

    Ok(Json(record))
}
