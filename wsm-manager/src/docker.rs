//! Docker-backed container orchestrator.
//!
//! Maps the run/stop/describe task contract onto the `docker` CLI:
//! a task definition is an image reference, the first subnet is the
//! container network, tags become `wsm.*` labels and the container id
//! is the task handle.

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::error::{ManagerError, Result};
use crate::orchestrator::{
    Attachment, ContainerOrchestrator, RunTaskRequest, TaskDescription, TaskState,
};

const LABEL_PREFIX: &str = "wsm.";
const CLUSTER_LABEL: &str = "wsm.cluster";

/// Builder for Docker commands with consistent error handling.
#[derive(Debug, Clone, Default)]
pub struct DockerCommand {
    subcommand: Option<String>,
    args: Vec<String>,
}

impl DockerCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Docker subcommand (e.g., "run", "stop", "inspect").
    pub fn subcommand<S: Into<String>>(mut self, cmd: S) -> Self {
        self.subcommand = Some(cmd.into());
        self
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the command and return stdout, or the stderr text on failure.
    pub async fn execute_with_output(self) -> Result<String> {
        let mut cmd = Command::new("docker");
        if let Some(subcmd) = &self.subcommand {
            cmd.arg(subcmd);
        }
        cmd.args(&self.args);

        debug!("Executing Docker command: {:?}", &cmd);

        let output = cmd.output().await.map_err(|e| {
            ManagerError::Orchestrator(format!("Failed to execute Docker command: {}", e))
        })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(ManagerError::Orchestrator(format!(
                "Docker command failed with status: {}. Error: {}",
                output.status, stderr
            )))
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DockerOrchestrator;

impl DockerOrchestrator {
    pub fn new() -> Self {
        Self
    }

    /// Arguments for `docker run` derived from a task request.
    ///
    /// The container name gets a random suffix so repeated launches of the
    /// same definition never collide. A public IP maps to `--publish-all`.
    pub fn run_args(request: &RunTaskRequest) -> Vec<String> {
        let suffix = Uuid::new_v4().simple().to_string();
        let mut args = vec![
            "--detach".to_string(),
            "--name".to_string(),
            format!("{}-{}", request.container_name, &suffix[..12]),
            "--label".to_string(),
            format!("{}={}", CLUSTER_LABEL, request.cluster),
        ];

        if let Some(network) = request.network.subnets.first() {
            args.push("--network".to_string());
            args.push(network.clone());
        }

        if request.network.assign_public_ip {
            args.push("--publish-all".to_string());
        }

        for group in &request.network.security_groups {
            args.push("--label".to_string());
            args.push(format!("{}security_group={}", LABEL_PREFIX, group));
        }

        for (key, value) in &request.tags {
            args.push("--label".to_string());
            args.push(format!("{}{}={}", LABEL_PREFIX, key, value));
        }

        for (key, value) in &request.environment {
            args.push("--env".to_string());
            args.push(format!("{}={}", key, value));
        }

        args.push(request.task_definition.clone());
        args
    }

    /// Translate `docker inspect` output into a task description.
    pub fn parse_inspect(task_handle: &str, raw: &str) -> Result<Option<TaskDescription>> {
        let parsed: Value = serde_json::from_str(raw)?;
        let Some(container) = parsed.as_array().and_then(|items| items.first()) else {
            return Ok(None);
        };

        let last_status = match container
            .pointer("/State/Status")
            .and_then(Value::as_str)
            .unwrap_or_default()
        {
            "running" | "paused" => TaskState::Running,
            "created" | "restarting" => TaskState::Pending,
            "removing" => TaskState::Stopping,
            "exited" | "dead" => TaskState::Stopped,
            _ => TaskState::Provisioning,
        };

        let attachments = container
            .pointer("/NetworkSettings/Networks")
            .and_then(Value::as_object)
            .map(|networks| {
                networks
                    .values()
                    .filter_map(|n| n.get("IPAddress").and_then(Value::as_str))
                    .filter(|ip| !ip.is_empty())
                    .map(Attachment::network_interface)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(TaskDescription {
            task_handle: task_handle.to_string(),
            last_status,
            attachments,
        }))
    }
}

#[async_trait]
impl ContainerOrchestrator for DockerOrchestrator {
    #[instrument(skip(self, request), fields(cluster = %request.cluster, image = %request.task_definition))]
    async fn run_task(&self, request: &RunTaskRequest) -> Result<String> {
        let container_id = DockerCommand::new()
            .subcommand("run")
            .args(Self::run_args(request))
            .execute_with_output()
            .await?;

        if container_id.is_empty() {
            return Err(ManagerError::Orchestrator(
                "docker run returned no container id".to_string(),
            ));
        }

        Ok(container_id)
    }

    #[instrument(skip(self))]
    async fn stop_task(&self, cluster: &str, task_handle: &str, reason: &str) -> Result<()> {
        debug!("Stopping container {} in {}: {}", task_handle, cluster, reason);

        DockerCommand::new()
            .subcommand("stop")
            .arg(task_handle)
            .execute_with_output()
            .await
            .map(|_| ())
    }

    async fn describe_task(
        &self,
        cluster: &str,
        task_handle: &str,
    ) -> Result<Option<TaskDescription>> {
        let raw = match DockerCommand::new()
            .subcommand("inspect")
            .arg(task_handle)
            .execute_with_output()
            .await
        {
            Ok(raw) => raw,
            Err(ManagerError::Orchestrator(msg)) if msg.contains("No such object") => {
                return Ok(None)
            }
            Err(e) => {
                error!("Failed to inspect {} in {}: {}", task_handle, cluster, e);
                return Err(e);
            }
        };

        Self::parse_inspect(task_handle, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::NetworkConfig;
    use std::collections::BTreeMap;

    #[test]
    fn test_docker_command_chaining() {
        let cmd = DockerCommand::new()
            .subcommand("stop")
            .arg("abc123")
            .args(["--time", "10"]);

        assert_eq!(cmd.subcommand.as_deref(), Some("stop"));
        assert_eq!(cmd.args, vec!["abc123", "--time", "10"]);
    }

    fn sample_request(assign_public_ip: bool) -> RunTaskRequest {
        let mut tags = BTreeMap::new();
        tags.insert("user_id".to_string(), "42".to_string());
        let mut environment = BTreeMap::new();
        environment.insert("USER_ID".to_string(), "42".to_string());

        RunTaskRequest {
            cluster: "workspaces".to_string(),
            task_definition: "codercom/code-server:latest".to_string(),
            network: NetworkConfig {
                subnets: vec!["wsm-net".to_string()],
                security_groups: vec!["sg-1".to_string()],
                assign_public_ip,
            },
            container_name: "workspace".to_string(),
            environment,
            tags,
        }
    }

    #[test]
    fn test_run_args_carry_labels_env_and_image() {
        let args = DockerOrchestrator::run_args(&sample_request(false));

        assert_eq!(args.first().map(String::as_str), Some("--detach"));
        assert!(args.contains(&"wsm.cluster=workspaces".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "--network" && w[1] == "wsm-net"));
        assert!(args.contains(&"wsm.security_group=sg-1".to_string()));
        assert!(args.contains(&"wsm.user_id=42".to_string()));
        assert!(args.contains(&"USER_ID=42".to_string()));
        assert_eq!(
            args.last().map(String::as_str),
            Some("codercom/code-server:latest")
        );
        assert!(!args.contains(&"--publish-all".to_string()));
    }

    #[test]
    fn test_run_args_name_container_uniquely() {
        let request = sample_request(false);

        let first = DockerOrchestrator::run_args(&request);
        let second = DockerOrchestrator::run_args(&request);

        let name_of = |args: &[String]| {
            args.windows(2)
                .find(|w| w[0] == "--name")
                .map(|w| w[1].clone())
                .expect("run args should name the container")
        };
        assert!(name_of(&first).starts_with("workspace-"));
        assert_ne!(name_of(&first), name_of(&second));
    }

    #[test]
    fn test_run_args_publish_ports_only_for_public_tasks() {
        let args = DockerOrchestrator::run_args(&sample_request(true));

        assert!(args.contains(&"--publish-all".to_string()));
    }

    #[test]
    fn test_parse_inspect_running_container() {
        let raw = r#"[{
            "Id": "abc123",
            "State": {"Status": "running"},
            "NetworkSettings": {"Networks": {"wsm-net": {"IPAddress": "172.18.0.5"}}}
        }]"#;

        let description = DockerOrchestrator::parse_inspect("abc123", raw)
            .unwrap()
            .unwrap();

        assert_eq!(description.last_status, TaskState::Running);
        assert_eq!(description.private_ipv4(), Some("172.18.0.5"));
    }

    #[test]
    fn test_parse_inspect_exited_container() {
        let raw = r#"[{"State": {"Status": "exited"}, "NetworkSettings": {"Networks": {}}}]"#;

        let description = DockerOrchestrator::parse_inspect("abc123", raw)
            .unwrap()
            .unwrap();

        assert_eq!(description.last_status, TaskState::Stopped);
        assert!(description.private_ipv4().is_none());
    }

    #[test]
    fn test_parse_inspect_empty() {
        assert!(DockerOrchestrator::parse_inspect("abc123", "[]")
            .unwrap()
            .is_none());
    }
}
