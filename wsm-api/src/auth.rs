use crate::error::ApiError;
use tracing::warn;
use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use wsm_manager::{WorkspaceManager, WorkspaceRecord, WARM_POOL_OWNER};

#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub username: String,
    pub email: Option<String>,
}

/// Auth middleware - extracts the user set by the fronting auth proxy
///
/// The proxy sets X-WSM-User after verifying the session. oauth2-proxy
/// deployments send X-Forwarded-User instead.
///
/// For local development without a proxy, we fall back to x-user header.
///
/// The warm pool owner id is reserved and never accepted as a user.
pub async fn auth_middleware(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let username = req
        .headers()
        .get("x-wsm-user")
        .or_else(|| req.headers().get("x-forwarded-user")) // oauth2-proxy format
        .or_else(|| req.headers().get("x-user")) // fallback for dev
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let email = req
        .headers()
        .get("x-wsm-email")
        .or_else(|| req.headers().get("x-forwarded-email"))
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());

    let username = username.ok_or(StatusCode::UNAUTHORIZED)?;
    if username == WARM_POOL_OWNER {
        warn!("Rejected request authenticated as reserved user {}", username);
        return Err(StatusCode::UNAUTHORIZED);
    }

    req.extensions_mut()
        .insert(AuthenticatedUser { username, email });

    Ok(next.run(req).await)
}

/// Check that the authenticated user owns the workspace
///
/// Returns the record on success, otherwise:
/// - ApiError::NotFound if the workspace doesn't exist
/// - ApiError::Forbidden if the workspace exists but the user is not the owner
pub async fn check_workspace_owner(
    manager: &WorkspaceManager,
    task_handle: &str,
    user: &AuthenticatedUser,
) -> Result<WorkspaceRecord, ApiError> {
    let record = manager
        .store()
        .get(task_handle)
        .await
        .map_err(|_| ApiError::NotFound(format!("Workspace not found: {}", task_handle)))?;

    if record.owner_id != user.username {
        return Err(ApiError::Forbidden(format!(
            "Access denied: workspace {} is owned by {}",
            task_handle, record.owner_id
        )));
    }

    Ok(record)
}
