//! Alert model and per-environment alerting policy

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Environment;
use crate::monitor::metric::DeploymentMetric;

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Error => "error",
            AlertSeverity::Critical => "critical",
        }
    }

    /// Color every channel payload shares
    pub fn color(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "#36a64f",
            AlertSeverity::Warning => "#ff9500",
            AlertSeverity::Error => "#ff0000",
            AlertSeverity::Critical => "#8b0000",
        }
    }

    /// Emoji every channel payload shares
    pub fn emoji(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "ℹ️",
            AlertSeverity::Warning => "⚠️",
            AlertSeverity::Error => "❌",
            AlertSeverity::Critical => "🚨",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An alert raised by the monitor. Appended to the alert log, never
/// deleted; may later be marked resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub environment: Environment,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,

    /// Metrics that triggered this alert
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<DeploymentMetric>,

    pub resolved: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(
        severity: AlertSeverity,
        title: impl Into<String>,
        message: impl Into<String>,
        environment: Environment,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            severity,
            title: title.into(),
            message: message.into(),
            environment,
            deployment_id: None,
            metrics: Vec::new(),
            resolved: false,
            resolved_at: None,
        }
    }

    pub fn with_deployment_id(mut self, deployment_id: impl Into<String>) -> Self {
        self.deployment_id = Some(deployment_id.into());
        self
    }

    pub fn with_metrics(mut self, metrics: Vec<DeploymentMetric>) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Channel destination kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Chat,
    Email,
    Webhook,
    Pager,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Chat => "chat",
            ChannelKind::Email => "email",
            ChannelKind::Webhook => "webhook",
            ChannelKind::Pager => "pager",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured alert destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertChannelConfig {
    pub kind: ChannelKind,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Type-specific configuration blob (webhook URL, recipients, ...)
    #[serde(default)]
    pub config: serde_json::Value,
}

fn default_true() -> bool {
    true
}

/// Threshold values driving the alert rules
#[derive(Debug, Clone)]
pub struct AlertThresholds {
    pub max_deployment_duration: Duration,
    pub max_migration_duration: Duration,
    pub max_error_rate: f64,
    pub max_consecutive_failures: usize,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_deployment_duration: Duration::from_millis(600_000),
            max_migration_duration: Duration::from_millis(300_000),
            max_error_rate: 0.1,
            max_consecutive_failures: 3,
        }
    }
}

/// Per-environment alerting policy
#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub enabled: bool,
    pub channels: Vec<AlertChannelConfig>,
    pub thresholds: AlertThresholds,
}

impl AlertConfig {
    /// Policy derived from the deployment timeout: the full budget bounds
    /// the deploy phase, half of it bounds migrations. Alerting is off in
    /// development.
    pub fn for_environment(
        environment: Environment,
        timeout: Duration,
        channels: Vec<AlertChannelConfig>,
    ) -> Self {
        Self {
            enabled: environment != Environment::Development,
            channels,
            thresholds: AlertThresholds {
                max_deployment_duration: timeout,
                max_migration_duration: timeout / 2,
                ..Default::default()
            },
        }
    }
}
