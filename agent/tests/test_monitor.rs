//! Monitor rule, dispatch, statistics and export tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{channel, monitor_with, FakeTransport};
use shipwright::config::Environment;
use shipwright::monitor::alert::{AlertConfig, AlertSeverity, AlertThresholds, ChannelKind};
use shipwright::monitor::metric::{DeploymentMetric, DeploymentPhase, MetricStatus};
use shipwright::monitor::{DeploymentMonitor, ExportFormat};

fn metric(
    phase: DeploymentPhase,
    status: MetricStatus,
    duration_ms: Option<u64>,
) -> DeploymentMetric {
    let mut metric = DeploymentMetric::new(
        Environment::Staging,
        "deploy-staging-20250101T000000Z-abcd1234",
        phase,
        status,
    );
    metric.duration_ms = duration_ms;
    metric
}

fn tight_monitor(transport: Arc<FakeTransport>) -> DeploymentMonitor {
    // thresholds low enough for test durations to trip them
    let config = AlertConfig {
        enabled: true,
        channels: vec![channel(ChannelKind::Webhook)],
        thresholds: AlertThresholds {
            max_deployment_duration: Duration::from_millis(1_000),
            max_migration_duration: Duration::from_millis(500),
            ..Default::default()
        },
    };
    DeploymentMonitor::with_transport(config, transport)
}

#[tokio::test]
async fn test_slow_deployment_raises_a_warning() {
    let transport = Arc::new(FakeTransport::default());
    let monitor = tight_monitor(transport.clone());

    monitor
        .record_metric(metric(
            DeploymentPhase::Deployment,
            MetricStatus::Success,
            Some(5_000),
        ))
        .await;

    let alerts = monitor.alerts().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, AlertSeverity::Warning);
    assert_eq!(alerts[0].title, "Slow deployment");
    assert_eq!(transport.delivered().len(), 1);
}

#[tokio::test]
async fn test_fast_deployment_raises_nothing() {
    let transport = Arc::new(FakeTransport::default());
    let monitor = tight_monitor(transport);

    monitor
        .record_metric(metric(
            DeploymentPhase::Deployment,
            MetricStatus::Success,
            Some(200),
        ))
        .await;

    assert!(monitor.alerts().await.is_empty());
}

#[tokio::test]
async fn test_slow_migration_raises_a_warning() {
    let transport = Arc::new(FakeTransport::default());
    let monitor = tight_monitor(transport);

    monitor
        .record_metric(metric(
            DeploymentPhase::Migration,
            MetricStatus::Success,
            Some(800),
        ))
        .await;

    let alerts = monitor.alerts().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].title, "Slow migration");
}

#[tokio::test]
async fn test_migration_failure_is_critical_other_phases_error() {
    let transport = Arc::new(FakeTransport::default());
    let monitor = tight_monitor(transport);

    let mut failed_migration =
        metric(DeploymentPhase::Migration, MetricStatus::Failed, Some(100));
    failed_migration.error = Some("relation users already exists".to_string());
    monitor.record_metric(failed_migration).await;

    monitor
        .record_metric(metric(DeploymentPhase::Deployment, MetricStatus::Failed, None))
        .await;

    let alerts = monitor.alerts().await;
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].severity, AlertSeverity::Critical);
    assert!(alerts[0].message.contains("relation users already exists"));
    assert_eq!(alerts[1].severity, AlertSeverity::Error);
    assert!(alerts[1].message.contains("Unknown error"));
}

#[tokio::test]
async fn test_three_consecutive_failures_escalate() {
    let transport = Arc::new(FakeTransport::default());
    let monitor = tight_monitor(transport);

    for _ in 0..3 {
        monitor
            .record_metric(metric(
                DeploymentPhase::Validation,
                MetricStatus::Failed,
                None,
            ))
            .await;
    }

    let alerts = monitor.alerts().await;
    let escalation: Vec<_> = alerts
        .iter()
        .filter(|a| a.title == "Consecutive deployment failures")
        .collect();
    assert!(!escalation.is_empty());
    assert_eq!(escalation[0].severity, AlertSeverity::Critical);
    // references all three failing metrics
    assert_eq!(escalation[0].metrics.len(), 3);
}

#[tokio::test]
async fn test_disabled_monitor_skips_every_rule() {
    let config = AlertConfig {
        enabled: false,
        channels: vec![channel(ChannelKind::Webhook)],
        thresholds: AlertThresholds::default(),
    };
    let transport = Arc::new(FakeTransport::default());
    let monitor = DeploymentMonitor::with_transport(config, transport.clone());
    assert!(!monitor.is_enabled());

    for _ in 0..5 {
        monitor
            .record_metric(metric(DeploymentPhase::Migration, MetricStatus::Failed, None))
            .await;
    }

    // metrics are still retained, but nothing alerts
    assert_eq!(monitor.metrics().await.len(), 5);
    assert!(monitor.alerts().await.is_empty());
    assert!(transport.delivered().is_empty());
}

#[tokio::test]
async fn test_one_broken_channel_does_not_block_the_rest() {
    let transport = Arc::new(FakeTransport::failing_for(&[ChannelKind::Chat]));
    let config = AlertConfig {
        enabled: true,
        channels: vec![channel(ChannelKind::Chat), channel(ChannelKind::Pager)],
        thresholds: AlertThresholds::default(),
    };
    let monitor = DeploymentMonitor::with_transport(config, transport.clone());

    monitor
        .record_metric(metric(DeploymentPhase::Deployment, MetricStatus::Failed, None))
        .await;

    let delivered = transport.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, ChannelKind::Pager);
    // the alert itself is still in the log
    assert_eq!(monitor.alerts().await.len(), 1);
}

#[tokio::test]
async fn test_disabled_channels_are_never_offered() {
    let transport = Arc::new(FakeTransport::default());
    let mut muted = channel(ChannelKind::Webhook);
    muted.enabled = false;
    let config = AlertConfig {
        enabled: true,
        channels: vec![muted],
        thresholds: AlertThresholds::default(),
    };
    let monitor = DeploymentMonitor::with_transport(config, transport.clone());

    monitor
        .record_metric(metric(DeploymentPhase::Deployment, MetricStatus::Failed, None))
        .await;

    assert_eq!(monitor.alerts().await.len(), 1);
    assert!(transport.delivered().is_empty());
}

#[tokio::test]
async fn test_stats_for_one_successful_deployment() {
    let transport = Arc::new(FakeTransport::default());
    let monitor = monitor_with(Vec::new(), transport);

    let start = metric(DeploymentPhase::Validation, MetricStatus::Started, None);
    let mut end = metric(DeploymentPhase::Verification, MetricStatus::Success, None);
    end.timestamp = start.timestamp + chrono::Duration::milliseconds(5_000);

    monitor.record_metric(start).await;
    monitor.record_metric(end).await;

    let stats = monitor.get_deployment_stats(None).await;
    assert_eq!(stats.total_deployments, 1);
    assert_eq!(stats.successful_deployments, 1);
    assert_eq!(stats.success_rate, 1.0);
    assert_eq!(stats.average_deployment_time_ms, Some(5_000.0));
    assert_eq!(stats.total_alerts, 0);
    assert!(stats.last_metric_at.is_some());
}

#[tokio::test]
async fn test_stats_average_migration_duration_and_env_filter() {
    let transport = Arc::new(FakeTransport::default());
    let monitor = monitor_with(Vec::new(), transport);

    monitor
        .record_metric(metric(
            DeploymentPhase::Migration,
            MetricStatus::Success,
            Some(1_000),
        ))
        .await;
    monitor
        .record_metric(metric(
            DeploymentPhase::Migration,
            MetricStatus::Success,
            Some(3_000),
        ))
        .await;

    let mut other_env = DeploymentMetric::new(
        Environment::Production,
        "deploy-production-20250101T000000Z-ffff0000",
        DeploymentPhase::Migration,
        MetricStatus::Success,
    );
    other_env.duration_ms = Some(9_000);
    monitor.record_metric(other_env).await;

    let staging = monitor
        .get_deployment_stats(Some(Environment::Staging))
        .await;
    assert_eq!(staging.total_deployments, 1);
    assert_eq!(staging.average_migration_duration_ms, Some(2_000.0));

    let all = monitor.get_deployment_stats(None).await;
    assert_eq!(all.total_deployments, 2);
}

#[tokio::test]
async fn test_resolving_with_a_note_raises_one_info_alert() {
    let transport = Arc::new(FakeTransport::default());
    let monitor = monitor_with(Vec::new(), transport);

    monitor
        .record_metric(metric(DeploymentPhase::Migration, MetricStatus::Failed, None))
        .await;
    let alerts = monitor.alerts().await;
    assert_eq!(alerts.len(), 1);
    let id = alerts[0].id.clone();

    monitor
        .resolve_alert(&id, Some("failed migration rolled back by hand"))
        .await
        .unwrap();

    let alerts = monitor.alerts().await;
    assert_eq!(alerts.len(), 2);
    assert!(alerts[0].resolved);
    assert!(alerts[0].resolved_at.is_some());
    assert_eq!(alerts[1].severity, AlertSeverity::Info);
    assert_eq!(alerts[1].title, "Alert resolved");
    assert!(alerts[1]
        .message
        .contains("failed migration rolled back by hand"));
}

#[tokio::test]
async fn test_resolving_without_a_note_adds_nothing() {
    let transport = Arc::new(FakeTransport::default());
    let monitor = monitor_with(Vec::new(), transport);

    monitor
        .record_metric(metric(DeploymentPhase::Deployment, MetricStatus::Failed, None))
        .await;
    let id = monitor.alerts().await[0].id.clone();

    monitor.resolve_alert(&id, None).await.unwrap();

    let alerts = monitor.alerts().await;
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].resolved);
}

#[tokio::test]
async fn test_resolving_an_unknown_alert_fails() {
    let transport = Arc::new(FakeTransport::default());
    let monitor = monitor_with(Vec::new(), transport);

    assert!(monitor.resolve_alert("no-such-id", None).await.is_err());
}

#[tokio::test]
async fn test_csv_export_field_order() {
    let transport = Arc::new(FakeTransport::default());
    let monitor = monitor_with(Vec::new(), transport);

    let mut failed = metric(DeploymentPhase::Migration, MetricStatus::Failed, Some(1_234));
    failed.error = Some("syntax error at line 3, near SELECT".to_string());
    monitor.record_metric(failed).await;
    monitor
        .record_metric(metric(DeploymentPhase::Validation, MetricStatus::Started, None))
        .await;

    let csv = monitor.export_metrics(ExportFormat::Csv).await.unwrap();
    let lines: Vec<&str> = csv.trim_end().lines().collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        "timestamp,environment,deploymentId,phase,status,duration,error"
    );
    assert!(lines[1].contains(",staging,"));
    assert!(lines[1].contains(",migration,failed,1234,"));
    // commas inside the error text are quoted
    assert!(lines[1].ends_with("\"syntax error at line 3, near SELECT\""));
    assert!(lines[2].contains(",validation,started,,"));
}

#[tokio::test]
async fn test_json_export_round_trips() {
    let transport = Arc::new(FakeTransport::default());
    let monitor = monitor_with(Vec::new(), transport);

    monitor
        .record_metric(metric(
            DeploymentPhase::Deployment,
            MetricStatus::Success,
            Some(42),
        ))
        .await;

    let json = monitor.export_metrics(ExportFormat::Json).await.unwrap();
    let parsed: Vec<DeploymentMetric> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].phase, DeploymentPhase::Deployment);
    assert_eq!(parsed[0].duration_ms, Some(42));
}
