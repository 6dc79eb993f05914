use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;

pub const WORKSPACE_LAUNCH_TIME: &str = "WorkspaceLaunchTime";
pub const WARM_POOL_HIT: &str = "WarmPoolHit";
pub const WARM_POOL_MISS: &str = "WarmPoolMiss";
pub const ACTIVE_WORKSPACES: &str = "ActiveWorkspaces";
pub const TERMINATED_WORKSPACES: &str = "TerminatedWorkspaces";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricUnit {
    Seconds,
    Count,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub namespace: String,
    pub name: String,
    pub value: f64,
    pub unit: MetricUnit,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn put_metric(&self, metric: Metric) -> Result<()>;
}

/// Emits every observation as a structured `tracing` event.
#[derive(Debug, Clone, Default)]
pub struct TracingMetricsSink;

#[async_trait]
impl MetricsSink for TracingMetricsSink {
    async fn put_metric(&self, metric: Metric) -> Result<()> {
        info!(
            target: "wsm_manager::metrics",
            namespace = %metric.namespace,
            metric = %metric.name,
            value = metric.value,
            unit = ?metric.unit,
            timestamp = %metric.timestamp.to_rfc3339(),
            "metric"
        );
        Ok(())
    }
}

/// Namespaced front for a sink. Failures are logged, never returned.
#[derive(Clone)]
pub struct MetricsRecorder {
    namespace: String,
    sink: std::sync::Arc<dyn MetricsSink>,
}

impl MetricsRecorder {
    pub fn new(namespace: impl Into<String>, sink: std::sync::Arc<dyn MetricsSink>) -> Self {
        Self {
            namespace: namespace.into(),
            sink,
        }
    }

    pub async fn record(&self, name: &str, value: f64, unit: MetricUnit) {
        let metric = Metric {
            namespace: self.namespace.clone(),
            name: name.to_string(),
            value,
            unit,
            timestamp: Utc::now(),
        };

        if let Err(e) = self.sink.put_metric(metric).await {
            warn!("Error recording metric {}: {}", name, e);
        }
    }
}
