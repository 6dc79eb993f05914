//! Seam over the container orchestrator.
//!
//! The manager only needs three calls: run a task, stop a task and describe a
//! task. `DockerOrchestrator` (see `docker.rs`) is the production backend;
//! tests use `test_utils::FakeOrchestrator`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;

/// Attachment detail holding the task's private address.
pub const PRIVATE_IPV4_ADDRESS: &str = "privateIPv4Address";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub assign_public_ip: bool,
}

/// Everything needed to start one workspace container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTaskRequest {
    pub cluster: String,
    pub task_definition: String,
    pub network: NetworkConfig,
    /// Name of the container receiving `environment`.
    pub container_name: String,
    pub environment: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Provisioning,
    Pending,
    Running,
    Stopping,
    Stopped,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Stopping | TaskState::Stopped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentKind {
    NetworkInterface,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub details: BTreeMap<String, String>,
}

impl Attachment {
    pub fn network_interface(private_ip: impl Into<String>) -> Self {
        let mut details = BTreeMap::new();
        details.insert(PRIVATE_IPV4_ADDRESS.to_string(), private_ip.into());
        Self {
            kind: AttachmentKind::NetworkInterface,
            details,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescription {
    pub task_handle: String,
    pub last_status: TaskState,
    pub attachments: Vec<Attachment>,
}

impl TaskDescription {
    /// First private IPv4 address found on a network interface attachment.
    pub fn private_ipv4(&self) -> Option<&str> {
        self.attachments
            .iter()
            .filter(|a| a.kind == AttachmentKind::NetworkInterface)
            .find_map(|a| a.details.get(PRIVATE_IPV4_ADDRESS))
            .map(String::as_str)
    }
}

#[async_trait]
pub trait ContainerOrchestrator: Send + Sync {
    /// Start a task and return its handle.
    async fn run_task(&self, request: &RunTaskRequest) -> Result<String>;

    /// Ask the orchestrator to stop a task.
    async fn stop_task(&self, cluster: &str, task_handle: &str, reason: &str) -> Result<()>;

    /// Current state of a task, `None` if the orchestrator does not know it.
    async fn describe_task(
        &self,
        cluster: &str,
        task_handle: &str,
    ) -> Result<Option<TaskDescription>>;
}
