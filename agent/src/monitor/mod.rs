//! Deployment monitoring and alerting
//!
//! [`DeploymentMonitor`] receives metrics from the pipeline, evaluates
//! threshold rules against them and fans resulting alerts out to the
//! configured channels. It owns the full metric and alert history for one
//! deployment manager lifetime; nothing here is shared process-wide.

pub mod alert;
pub mod channels;
pub mod metric;
pub mod stats;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::errors::ShipwrightError;
use self::alert::{Alert, AlertConfig, AlertSeverity};
use self::channels::{AlertTransport, HttpAlertTransport};
use self::metric::{DeploymentMetric, DeploymentPhase, MetricStatus};
use self::stats::DeploymentStats;

/// Serialization format for the metric export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = ShipwrightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            _ => Err(ShipwrightError::ConfigError(format!(
                "Unknown export format: {}",
                s
            ))),
        }
    }
}

/// How many of the most recent metrics the consecutive-failure rule
/// examines. Deliberately spans all phases, not deployment attempts.
const FAILURE_WINDOW: usize = 5;

/// Metric sink and alerting engine for one deployment run
pub struct DeploymentMonitor {
    config: AlertConfig,
    transport: Arc<dyn AlertTransport>,
    metrics: RwLock<Vec<DeploymentMetric>>,
    alerts: RwLock<Vec<Alert>>,
}

impl DeploymentMonitor {
    pub fn new(config: AlertConfig) -> Result<Self, ShipwrightError> {
        let transport = Arc::new(HttpAlertTransport::new()?);
        Ok(Self::with_transport(config, transport))
    }

    /// Construct with an injected transport (used by tests)
    pub fn with_transport(config: AlertConfig, transport: Arc<dyn AlertTransport>) -> Self {
        Self {
            config,
            transport,
            metrics: RwLock::new(Vec::new()),
            alerts: RwLock::new(Vec::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Append one metric and evaluate the alert rules against it. Nothing
    /// in here propagates to the caller; a monitoring failure must never
    /// block a deployment.
    pub async fn record_metric(&self, metric: DeploymentMetric) {
        self.metrics.write().await.push(metric.clone());

        if self.config.enabled {
            self.evaluate_rules(&metric).await;
        }

        debug!(
            "Metric recorded: {} {} {} ({:?} ms)",
            metric.deployment_id,
            metric.phase,
            metric.status.as_str(),
            metric.duration_ms
        );
    }

    async fn evaluate_rules(&self, metric: &DeploymentMetric) {
        let thresholds = &self.config.thresholds;

        // Slow deployment
        if metric.phase == DeploymentPhase::Deployment && metric.status == MetricStatus::Success {
            if let Some(duration_ms) = metric.duration_ms {
                if Duration::from_millis(duration_ms) > thresholds.max_deployment_duration {
                    self.raise(
                        Alert::new(
                            AlertSeverity::Warning,
                            "Slow deployment",
                            format!(
                                "Deployment took {} ms (threshold {} ms)",
                                duration_ms,
                                thresholds.max_deployment_duration.as_millis()
                            ),
                            metric.environment,
                        )
                        .with_deployment_id(&metric.deployment_id)
                        .with_metrics(vec![metric.clone()]),
                    )
                    .await;
                }
            }
        }

        // Slow migration
        if metric.phase == DeploymentPhase::Migration && metric.status == MetricStatus::Success {
            if let Some(duration_ms) = metric.duration_ms {
                if Duration::from_millis(duration_ms) > thresholds.max_migration_duration {
                    self.raise(
                        Alert::new(
                            AlertSeverity::Warning,
                            "Slow migration",
                            format!(
                                "Migrations took {} ms (threshold {} ms)",
                                duration_ms,
                                thresholds.max_migration_duration.as_millis()
                            ),
                            metric.environment,
                        )
                        .with_deployment_id(&metric.deployment_id)
                        .with_metrics(vec![metric.clone()]),
                    )
                    .await;
                }
            }
        }

        // Phase failure; a broken migration is the worst case
        if metric.status.is_failure() {
            let severity = if metric.phase == DeploymentPhase::Migration {
                AlertSeverity::Critical
            } else {
                AlertSeverity::Error
            };
            let cause = metric
                .error
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string());
            self.raise(
                Alert::new(
                    severity,
                    format!("{} phase failed", metric.phase),
                    format!("{} failed: {}", metric.phase, cause),
                    metric.environment,
                )
                .with_deployment_id(&metric.deployment_id)
                .with_metrics(vec![metric.clone()]),
            )
            .await;
        }

        // Consecutive failures over the recent window
        let recent_failures: Vec<DeploymentMetric> = {
            let metrics = self.metrics.read().await;
            let mut recent: Vec<DeploymentMetric> = metrics.clone();
            recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            recent
                .into_iter()
                .take(FAILURE_WINDOW)
                .filter(|m| m.status.is_failure())
                .collect()
        };
        if recent_failures.len() >= thresholds.max_consecutive_failures {
            self.raise(
                Alert::new(
                    AlertSeverity::Critical,
                    "Consecutive deployment failures",
                    format!(
                        "{} of the last {} recorded metrics are failures",
                        recent_failures.len(),
                        FAILURE_WINDOW
                    ),
                    metric.environment,
                )
                .with_deployment_id(&metric.deployment_id)
                .with_metrics(recent_failures),
            )
            .await;
        }
    }

    /// Append an alert to the log and offer it to every enabled channel
    async fn raise(&self, alert: Alert) {
        match alert.severity {
            AlertSeverity::Info => info!("Alert: {} - {}", alert.title, alert.message),
            AlertSeverity::Warning => warn!("Alert: {} - {}", alert.title, alert.message),
            _ => error!("Alert: {} - {}", alert.title, alert.message),
        }

        self.alerts.write().await.push(alert.clone());
        self.dispatch(&alert).await;
    }

    /// Send to all enabled channels; one channel failing never aborts
    /// delivery to the rest.
    async fn dispatch(&self, alert: &Alert) {
        let sends = self
            .config
            .channels
            .iter()
            .filter(|channel| channel.enabled)
            .map(|channel| {
                let payload = channels::payload_for(channel.kind, alert);
                let transport = self.transport.clone();
                async move {
                    if let Err(e) = transport.deliver(channel, payload).await {
                        warn!("Failed to deliver alert over {} channel: {}", channel.kind, e);
                    }
                }
            });
        join_all(sends).await;
    }

    /// Aggregate statistics, optionally restricted to one environment
    pub async fn get_deployment_stats(
        &self,
        environment: Option<crate::config::Environment>,
    ) -> DeploymentStats {
        let metrics = self.metrics.read().await;
        let alerts = self.alerts.read().await;
        stats::compute_stats(&metrics, &alerts, environment)
    }

    /// Mark an alert resolved. A resolution note is echoed back into the
    /// alert stream as an info alert so the resolution is auditable.
    pub async fn resolve_alert(
        &self,
        id: &str,
        resolution: Option<&str>,
    ) -> Result<(), ShipwrightError> {
        let (title, environment, deployment_id) = {
            let mut alerts = self.alerts.write().await;
            let alert = alerts
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or_else(|| ShipwrightError::MonitorError(format!("Unknown alert: {}", id)))?;
            alert.resolved = true;
            alert.resolved_at = Some(Utc::now());
            (alert.title.clone(), alert.environment, alert.deployment_id.clone())
        };

        if let Some(note) = resolution {
            let mut follow_up = Alert::new(
                AlertSeverity::Info,
                "Alert resolved",
                format!("{}: {}", title, note),
                environment,
            );
            if let Some(deployment_id) = deployment_id {
                follow_up = follow_up.with_deployment_id(deployment_id);
            }
            self.raise(follow_up).await;
        }

        Ok(())
    }

    /// Serialize the full metric log
    pub async fn export_metrics(&self, format: ExportFormat) -> Result<String, ShipwrightError> {
        let metrics = self.metrics.read().await;
        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(&*metrics)?),
            ExportFormat::Csv => {
                let mut out =
                    String::from("timestamp,environment,deploymentId,phase,status,duration,error\n");
                for metric in metrics.iter() {
                    let duration = metric
                        .duration_ms
                        .map(|d| d.to_string())
                        .unwrap_or_default();
                    let error = metric
                        .error
                        .as_deref()
                        .map(csv_field)
                        .unwrap_or_default();
                    out.push_str(&format!(
                        "{},{},{},{},{},{},{}\n",
                        metric.timestamp.to_rfc3339(),
                        metric.environment,
                        metric.deployment_id,
                        metric.phase,
                        metric.status.as_str(),
                        duration,
                        error,
                    ));
                }
                Ok(out)
            }
        }
    }

    /// Snapshot of the alert log
    pub async fn alerts(&self) -> Vec<Alert> {
        self.alerts.read().await.clone()
    }

    /// Snapshot of the metric log
    pub async fn metrics(&self) -> Vec<DeploymentMetric> {
        self.metrics.read().await.clone()
    }
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
