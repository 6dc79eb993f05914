use crate::routes::workspaces::LaunchRequest;
use utoipa::OpenApi;
use wsm_manager::{
    Action, ActionResponse, LaunchOutcome, LaunchSource, MonitorReport, PoolStatus,
    TerminationResult, WarmPoolReport, WorkspaceEvent, WorkspaceKind, WorkspaceRecord,
    WorkspaceStatus,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::health::readiness_check,
        crate::routes::invoke::invoke,
        crate::routes::workspaces::launch_workspace,
        crate::routes::workspaces::current_workspace,
        crate::routes::workspaces::terminate_workspace,
        crate::routes::workspaces::record_activity,
    ),
    components(
        schemas(
            Action,
            ActionResponse,
            WorkspaceEvent,
            LaunchRequest,
            LaunchOutcome,
            LaunchSource,
            TerminationResult,
            MonitorReport,
            WarmPoolReport,
            PoolStatus,
            WorkspaceRecord,
            WorkspaceKind,
            WorkspaceStatus
        )
    ),
    tags(
        (name = "wsm-api", description = "Workspace manager API")
    )
)]
pub struct ApiDoc;
