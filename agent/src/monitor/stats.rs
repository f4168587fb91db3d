//! Aggregate deployment statistics

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Environment;
use crate::monitor::alert::Alert;
use crate::monitor::metric::{DeploymentMetric, DeploymentPhase, MetricStatus};

/// Answer to a statistics query over the retained metric and alert logs
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentStats {
    /// Distinct deployment ids observed
    pub total_deployments: usize,

    /// Deployments with at least one successful verification metric
    pub successful_deployments: usize,

    pub success_rate: f64,

    /// Mean time from validation start to verification end, over
    /// deployments where both ends were observed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_deployment_time_ms: Option<f64>,

    /// Mean of all recorded migration phase durations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_migration_duration_ms: Option<f64>,

    pub total_alerts: usize,
    pub unresolved_alerts: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_metric_at: Option<DateTime<Utc>>,
}

/// Compute statistics, optionally restricted to one environment
pub fn compute_stats(
    metrics: &[DeploymentMetric],
    alerts: &[Alert],
    environment: Option<Environment>,
) -> DeploymentStats {
    let in_scope = |env: Environment| environment.map_or(true, |wanted| env == wanted);
    let metrics: Vec<&DeploymentMetric> =
        metrics.iter().filter(|m| in_scope(m.environment)).collect();

    let mut by_deployment: BTreeMap<&str, Vec<&DeploymentMetric>> = BTreeMap::new();
    for metric in metrics.iter().copied() {
        by_deployment
            .entry(metric.deployment_id.as_str())
            .or_default()
            .push(metric);
    }

    let total_deployments = by_deployment.len();
    let mut successful_deployments = 0;
    let mut total_times = Vec::new();

    for group in by_deployment.values() {
        if group.iter().any(|m| {
            m.phase == DeploymentPhase::Verification && m.status == MetricStatus::Success
        }) {
            successful_deployments += 1;
        }

        let start = group
            .iter()
            .filter(|m| {
                m.phase == DeploymentPhase::Validation && m.status == MetricStatus::Started
            })
            .map(|m| m.timestamp)
            .min();
        let end = group
            .iter()
            .filter(|m| {
                m.phase == DeploymentPhase::Verification
                    && matches!(m.status, MetricStatus::Success | MetricStatus::Failed)
            })
            .map(|m| m.timestamp)
            .max();
        if let (Some(start), Some(end)) = (start, end) {
            total_times.push((end - start).num_milliseconds() as f64);
        }
    }

    let migration_durations: Vec<f64> = metrics
        .iter()
        .filter(|m| m.phase == DeploymentPhase::Migration)
        .filter_map(|m| m.duration_ms)
        .map(|d| d as f64)
        .collect();

    let alerts: Vec<&Alert> = alerts.iter().filter(|a| in_scope(a.environment)).collect();

    DeploymentStats {
        total_deployments,
        successful_deployments,
        success_rate: if total_deployments > 0 {
            successful_deployments as f64 / total_deployments as f64
        } else {
            0.0
        },
        average_deployment_time_ms: mean(&total_times),
        average_migration_duration_ms: mean(&migration_durations),
        total_alerts: alerts.len(),
        unresolved_alerts: alerts.iter().filter(|a| !a.resolved).count(),
        last_metric_at: metrics.iter().map(|m| m.timestamp).max(),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
