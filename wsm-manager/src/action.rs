//! Single entry point: an event names an action, the dispatcher runs the
//! matching handler and folds the outcome into a status code and JSON body.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::error::{ManagerError, Result};
use crate::manager::{TerminationResult, WorkspaceManager};
use crate::record::WorkspaceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Launch,
    Monitor,
    Terminate,
    WarmPool,
    Activity,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Launch => "launch",
            Action::Monitor => "monitor",
            Action::Terminate => "terminate",
            Action::WarmPool => "warm_pool",
            Action::Activity => "activity",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "launch" => Ok(Action::Launch),
            "monitor" => Ok(Action::Monitor),
            "terminate" => Ok(Action::Terminate),
            "warm_pool" => Ok(Action::WarmPool),
            "activity" => Ok(Action::Activity),
            other => Err(ManagerError::InvalidInput(format!("Unknown action: {}", other))),
        }
    }
}

/// Invocation payload. A missing `action` means `monitor`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct WorkspaceEvent {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub workspace_type: Option<WorkspaceKind>,
    #[serde(default)]
    pub task_arn: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl WorkspaceEvent {
    pub fn new(action: Action) -> Self {
        Self {
            action: Some(action.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ActionResponse {
    pub status_code: u16,
    #[schema(value_type = Object)]
    pub body: Value,
}

impl ActionResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            status_code: 200,
            body,
        }
    }

    pub fn error(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            body: json!({ "error": message.into() }),
        }
    }
}

impl From<&ManagerError> for ActionResponse {
    fn from(err: &ManagerError) -> Self {
        let status_code = match err {
            ManagerError::InvalidInput(_) => 400,
            ManagerError::NotFound(_) => 404,
            _ => 500,
        };
        ActionResponse::error(status_code, err.to_string())
    }
}

impl From<TerminationResult> for ActionResponse {
    fn from(result: TerminationResult) -> Self {
        match result {
            TerminationResult::Terminated { task_arn } => ActionResponse::ok(json!({
                "status": "terminated",
                "task_arn": task_arn,
            })),
            TerminationResult::Failed { task_arn, error } => ActionResponse {
                status_code: 500,
                body: json!({ "error": error, "task_arn": task_arn }),
            },
        }
    }
}

/// Decode a raw event and dispatch it. Malformed events are a 400.
pub async fn dispatch_value(manager: &WorkspaceManager, event: Value) -> ActionResponse {
    match serde_json::from_value::<WorkspaceEvent>(event) {
        Ok(event) => dispatch(manager, event).await,
        Err(e) => ActionResponse::error(400, format!("Invalid event: {}", e)),
    }
}

/// Run the handler named by `event.action`.
pub async fn dispatch(manager: &WorkspaceManager, event: WorkspaceEvent) -> ActionResponse {
    let name = event
        .action
        .clone()
        .unwrap_or_else(|| Action::Monitor.to_string());

    info!(action = %name, event = ?event, "Dispatching workspace action");

    let result = match name.parse::<Action>() {
        Ok(action) => run_action(manager, action, event).await,
        Err(e) => Err(e),
    };

    result.unwrap_or_else(|e| {
        error!("Error: {}", e);
        ActionResponse::from(&e)
    })
}

async fn run_action(
    manager: &WorkspaceManager,
    action: Action,
    event: WorkspaceEvent,
) -> Result<ActionResponse> {
    match action {
        Action::Launch => {
            let user_id = required(event.user_id, "user_id")?;
            let kind = event.workspace_type.unwrap_or_default();
            let outcome = manager.launch(&user_id, kind).await?;
            Ok(ActionResponse::ok(serde_json::to_value(outcome)?))
        }
        Action::Monitor => {
            let report = manager.monitor().await?;
            Ok(ActionResponse::ok(serde_json::to_value(report)?))
        }
        Action::Terminate => {
            let task_arn = required(event.task_arn, "task_arn")?;
            let reason = event.reason.unwrap_or_else(|| "manual".to_string());
            Ok(manager.terminate(&task_arn, &reason).await.into())
        }
        Action::WarmPool => {
            let report = manager.maintain_warm_pool().await?;
            Ok(ActionResponse::ok(serde_json::to_value(report)?))
        }
        Action::Activity => {
            let task_arn = required(event.task_arn, "task_arn")?;
            let record = manager.record_activity(&task_arn).await?;
            Ok(ActionResponse::ok(json!({
                "status": "active",
                "task_arn": record.task_handle,
                "last_activity": record.last_activity.to_rfc3339(),
            })))
        }
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ManagerError::InvalidInput(format!("missing required field: {}", field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_names_round_trip() {
        for action in [
            Action::Launch,
            Action::Monitor,
            Action::Terminate,
            Action::WarmPool,
            Action::Activity,
        ] {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
    }

    #[test]
    fn test_unknown_action_is_invalid_input() {
        let err = "reboot".parse::<Action>().unwrap_err();
        assert!(matches!(err, ManagerError::InvalidInput(_)));
        assert_eq!(ActionResponse::from(&err).status_code, 400);
    }

    #[test]
    fn test_error_status_codes() {
        let not_found = ManagerError::NotFound("task-1".to_string());
        assert_eq!(ActionResponse::from(&not_found).status_code, 404);

        let timeout = ManagerError::LaunchTimeout {
            task_handle: "task-1".to_string(),
            timeout_secs: 60,
        };
        let response = ActionResponse::from(&timeout);
        assert_eq!(response.status_code, 500);
        assert_eq!(
            response.body["error"],
            "Task task-1 did not reach RUNNING state within 60s"
        );
    }

    #[test]
    fn test_failed_termination_is_structured() {
        let response = ActionResponse::from(TerminationResult::Failed {
            task_arn: "task-1".to_string(),
            error: "boom".to_string(),
        });

        assert_eq!(response.status_code, 500);
        assert_eq!(response.body["error"], "boom");
        assert_eq!(response.body["task_arn"], "task-1");
    }

    #[test]
    fn test_event_accepts_legacy_workspace_type() {
        let event: WorkspaceEvent = serde_json::from_value(json!({
            "action": "launch",
            "user_id": "42",
            "workspace_type": "superset"
        }))
        .unwrap();

        assert_eq!(event.workspace_type, Some(WorkspaceKind::Dashboard));
    }
}
