//! Deployment metric model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Environment;

/// One discrete stage of the deployment pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentPhase {
    Validation,
    Backup,
    Migration,
    Deployment,
    Verification,
    Rollback,
}

impl DeploymentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentPhase::Validation => "validation",
            DeploymentPhase::Backup => "backup",
            DeploymentPhase::Migration => "migration",
            DeploymentPhase::Deployment => "deployment",
            DeploymentPhase::Verification => "verification",
            DeploymentPhase::Rollback => "rollback",
        }
    }
}

impl fmt::Display for DeploymentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome attached to a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricStatus {
    Started,
    Success,
    Warning,
    Error,
    Failed,
}

impl MetricStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricStatus::Started => "started",
            MetricStatus::Success => "success",
            MetricStatus::Warning => "warning",
            MetricStatus::Error => "error",
            MetricStatus::Failed => "failed",
        }
    }

    /// Statuses the failure rules count
    pub fn is_failure(&self) -> bool {
        matches!(self, MetricStatus::Failed | MetricStatus::Error)
    }
}

/// One observation reported by the pipeline. Append-only, never mutated
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentMetric {
    pub timestamp: DateTime<Utc>,
    pub environment: Environment,
    pub deployment_id: String,
    pub phase: DeploymentPhase,
    pub status: MetricStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl DeploymentMetric {
    pub fn new(
        environment: Environment,
        deployment_id: &str,
        phase: DeploymentPhase,
        status: MetricStatus,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            environment,
            deployment_id: deployment_id.to_string(),
            phase,
            status,
            duration_ms: None,
            error: None,
            details: None,
        }
    }
}
