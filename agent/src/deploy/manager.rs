//! Deployment pipeline orchestration
//!
//! [`DeploymentManager`] owns the phase sequence for one deployment run:
//! validate, backup, migrate, deploy, verify, with rollback as the escape
//! path. Each phase outcome is reported to the monitor before the next
//! phase starts. The pipeline is strictly sequential; the only
//! fire-and-forget work is the failure notification.

use std::sync::Arc;
use std::time::Instant;

use secrecy::ExposeSecret;
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::{
    database_url, first_missing_env, generate_deployment_id, DeploymentConfig,
    DeploymentOverrides, Environment, REQUIRED_ENV_VARS,
};
use crate::deploy::results::{
    BackupResult, DeployResult, FullDeploymentResult, MigrationCheck, MigrationInfo,
    MigrationResult, RollbackKind, RollbackOptions, RollbackResult, ValidationResult,
    VerificationResult,
};
use crate::errors::ShipwrightError;
use crate::exec::{CommandRunner, TokioCommandRunner};
use crate::monitor::alert::AlertConfig;
use crate::monitor::metric::{DeploymentMetric, DeploymentPhase, MetricStatus};
use crate::monitor::DeploymentMonitor;
use crate::notify::{NoopNotifier, NotificationPayload, NotificationSink, WebhookNotifier};
use crate::probe::{AppProbe, HttpProbe};
use crate::settings::Settings;

/// Orchestrates one deployment run to one environment
pub struct DeploymentManager {
    config: DeploymentConfig,
    settings: Settings,
    deployment_id: String,
    runner: Arc<dyn CommandRunner>,
    probe: Arc<dyn AppProbe>,
    notifier: Arc<dyn NotificationSink>,
    monitor: Option<DeploymentMonitor>,
}

impl DeploymentManager {
    /// Build a manager for `environment`, merging overrides over the
    /// environment defaults. Fails only on configuration errors; a
    /// monitoring outage never blocks a deployment.
    pub fn new(
        environment: &str,
        overrides: DeploymentOverrides,
        settings: Settings,
    ) -> Result<Self, ShipwrightError> {
        let config = DeploymentConfig::resolve(environment, overrides)?;

        let probe: Arc<dyn AppProbe> = Arc::new(HttpProbe::new(&settings.application.base_url)?);
        let notifier: Arc<dyn NotificationSink> = match &settings.notifications.webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url)?),
            None => Arc::new(NoopNotifier),
        };

        let alert_config = AlertConfig::for_environment(
            config.environment,
            config.timeout,
            settings.alerts.channels.clone(),
        );
        let monitor = match DeploymentMonitor::new(alert_config) {
            Ok(monitor) => Some(monitor),
            Err(e) => {
                warn!("Deployment monitor unavailable, metrics become no-ops: {}", e);
                None
            }
        };

        Ok(Self::assemble(
            config,
            settings,
            Arc::new(TokioCommandRunner),
            probe,
            notifier,
            monitor,
        ))
    }

    /// Construct with every collaborator injected (used by tests)
    pub fn with_collaborators(
        config: DeploymentConfig,
        settings: Settings,
        runner: Arc<dyn CommandRunner>,
        probe: Arc<dyn AppProbe>,
        notifier: Arc<dyn NotificationSink>,
        monitor: Option<DeploymentMonitor>,
    ) -> Self {
        Self::assemble(config, settings, runner, probe, notifier, monitor)
    }

    fn assemble(
        config: DeploymentConfig,
        settings: Settings,
        runner: Arc<dyn CommandRunner>,
        probe: Arc<dyn AppProbe>,
        notifier: Arc<dyn NotificationSink>,
        monitor: Option<DeploymentMonitor>,
    ) -> Self {
        let deployment_id = generate_deployment_id(config.environment);
        Self {
            config,
            settings,
            deployment_id,
            runner,
            probe,
            notifier,
            monitor,
        }
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    pub fn monitor(&self) -> Option<&DeploymentMonitor> {
        self.monitor.as_ref()
    }

    /// Run all pre-deployment checks, accumulating every failure instead
    /// of stopping at the first one.
    pub async fn validate_pre_deployment(&self) -> ValidationResult {
        let mut errors = Vec::new();

        // Migration schema validation; a failure is recorded but the
        // remaining checks still run.
        if let Err(e) = self
            .runner
            .run(&self.settings.tooling.migrate_validate, None)
            .await
        {
            errors.push(format!("Migration validation failed: {}", e));
        }

        // Pending migrations; unreadable status output degrades to "none".
        let pending_migrations = match self
            .runner
            .run(&self.settings.tooling.migrate_status, None)
            .await
        {
            Ok(output) => parse_pending_migrations(&output.stdout),
            Err(e) => {
                warn!("Could not read migration status: {}", e);
                Vec::new()
            }
        };

        // Required environment variables, first missing wins.
        if let Some(name) = first_missing_env(&REQUIRED_ENV_VARS, |name| std::env::var(name).ok())
        {
            errors.push(format!("Missing required environment variable: {}", name));
        }

        // The build must pass.
        let build_ok = match self.runner.run(&self.settings.tooling.build, None).await {
            Ok(_) => true,
            Err(e) => {
                errors.push(format!("Build failed: {}", e));
                false
            }
        };

        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
            pending_migrations,
            build_ok,
        }
    }

    /// Dump the datastore to a timestamped file. A no-op success on dry
    /// runs and when backups are disabled for the environment.
    pub async fn create_backup(&self) -> BackupResult {
        if self.config.dry_run || !self.config.backup_enabled {
            return BackupResult {
                success: true,
                skipped: true,
                path: None,
                error: None,
            };
        }

        let database_url = match database_url() {
            Ok(url) => url,
            Err(e) => {
                return BackupResult {
                    success: false,
                    skipped: false,
                    path: None,
                    error: Some(e.to_string()),
                };
            }
        };

        let path = format!(
            "{}/backup-{}-{}.dump",
            self.settings.tooling.backup_dir,
            self.config.environment,
            chrono::Utc::now().format("%Y%m%dT%H%M%SZ"),
        );

        let spec = self
            .settings
            .tooling
            .db_dump
            .clone()
            .arg("--dbname")
            .arg(database_url.expose_secret())
            .arg("--file")
            .arg(&path);

        match self.runner.run(&spec, None).await {
            Ok(_) => {
                info!("Backup written to {}", path);
                BackupResult {
                    success: true,
                    skipped: false,
                    path: Some(path),
                    error: None,
                }
            }
            Err(e) => BackupResult {
                success: false,
                skipped: false,
                path: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Apply pending migrations inside the configured time budget. A
    /// timeout is reported distinctly from other failures.
    pub async fn run_migrations(&self) -> MigrationResult {
        if self.config.skip_migrations {
            return MigrationResult {
                success: true,
                skipped: true,
                duration_ms: 0,
                timed_out: false,
                error: None,
            };
        }

        let mut spec = self.settings.tooling.migrate_apply.clone();
        if self.config.dry_run {
            spec = spec.with_env("MIGRATE_DRY_RUN", "1");
        }

        let started = Instant::now();
        let result = self.runner.run(&spec, Some(self.config.timeout)).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(_) => MigrationResult {
                success: true,
                skipped: false,
                duration_ms,
                timed_out: false,
                error: None,
            },
            Err(e) if e.is_timeout() => MigrationResult {
                success: false,
                skipped: false,
                duration_ms,
                timed_out: true,
                error: Some(format!(
                    "Migration run exceeded the configured timeout of {} ms",
                    self.config.timeout_ms()
                )),
            },
            Err(e) => MigrationResult {
                success: false,
                skipped: false,
                duration_ms,
                timed_out: false,
                error: Some(e.to_string()),
            },
        }
    }

    /// Ship the application through the hosting platform CLI. Production
    /// deploys select the production config file.
    pub async fn deploy_to_target(&self) -> DeployResult {
        let mut spec = self.settings.tooling.platform_deploy.clone();
        if self.config.environment == Environment::Production {
            spec = spec
                .arg("--config")
                .arg(&self.settings.tooling.production_deploy_config);
        }

        let started = Instant::now();
        let result = self.runner.run(&spec, None).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(output) => DeployResult {
                success: true,
                release_id: extract_release_id(&output.stdout),
                release_command_failed: false,
                duration_ms,
                error: None,
            },
            Err(e) => {
                let text = e.to_string();
                // A failed release command means the new release may
                // already be partially live.
                let release_command_failed =
                    text.to_lowercase().contains("release command");
                DeployResult {
                    success: false,
                    release_id: None,
                    release_command_failed,
                    duration_ms,
                    error: Some(text),
                }
            }
        }
    }

    /// Check the shipped release: health endpoint, migration completeness
    /// and application responsiveness. All three run even when one fails.
    pub async fn verify_deployment(&self) -> VerificationResult {
        let health_ok = match self.probe.health_check().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Health check failed: {}", e);
                false
            }
        };

        let (migration_status, pending_migrations) = match self
            .runner
            .run(&self.settings.tooling.migrate_status, None)
            .await
        {
            Ok(output) => {
                let pending = parse_pending_migrations(&output.stdout);
                if pending.is_empty() {
                    (MigrationCheck::Complete, pending)
                } else {
                    (MigrationCheck::Incomplete, pending)
                }
            }
            Err(e) => {
                warn!("Migration status re-check failed: {}", e);
                (MigrationCheck::Failed, Vec::new())
            }
        };

        let app_responsive = match self.probe.responsiveness().await {
            Ok(body) => body.get("status").and_then(|v| v.as_str()) == Some("ok"),
            Err(e) => {
                warn!("Responsiveness probe failed: {}", e);
                false
            }
        };

        let success =
            health_ok && app_responsive && migration_status == MigrationCheck::Complete;

        VerificationResult {
            success,
            health_ok,
            app_responsive,
            migration_status,
            pending_migrations,
        }
    }

    /// Roll back using the first strategy the options select: restore a
    /// named backup, step back migrations, or revert the platform release.
    pub async fn rollback(&self, options: RollbackOptions) -> RollbackResult {
        if let Some(path) = options.backup_path {
            let database_url = match database_url() {
                Ok(url) => url,
                Err(e) => {
                    return RollbackResult {
                        success: false,
                        rollback_type: RollbackKind::DataRestore,
                        error: Some(e.to_string()),
                    };
                }
            };
            let spec = self
                .settings
                .tooling
                .db_restore
                .clone()
                .arg("--dbname")
                .arg(database_url.expose_secret())
                .arg(&path);
            self.run_rollback(spec, RollbackKind::DataRestore).await
        } else if let Some(steps) = options.migration_steps {
            let spec = self
                .settings
                .tooling
                .migrate_rollback
                .clone()
                .arg(steps.to_string());
            self.run_rollback(spec, RollbackKind::MigrationRollback)
                .await
        } else {
            let spec = self.settings.tooling.platform_rollback.clone();
            self.run_rollback(spec, RollbackKind::ReleaseRollback).await
        }
    }

    async fn run_rollback(
        &self,
        spec: crate::exec::CommandSpec,
        rollback_type: RollbackKind,
    ) -> RollbackResult {
        info!("Rolling back ({:?}): {}", rollback_type, spec.display());
        match self.runner.run(&spec, None).await {
            Ok(_) => RollbackResult {
                success: true,
                rollback_type,
                error: None,
            },
            Err(e) => RollbackResult {
                success: false,
                rollback_type,
                error: Some(e.to_string()),
            },
        }
    }

    /// Run the full pipeline. Always returns a result; any unexpected
    /// error is converted into a failed result and a fire-and-forget
    /// failure notification.
    pub async fn deploy(&self) -> FullDeploymentResult {
        let started = Instant::now();
        let mut result = FullDeploymentResult::new(self.config.dry_run);

        info!(
            "Starting deployment {} to {}",
            self.deployment_id, self.config.environment
        );

        match self.run_pipeline(started, &mut result).await {
            Ok(()) => {
                // phase failures return early without stamping the total
                if !result.success {
                    result.metrics.total_ms = started.elapsed().as_millis() as u64;
                }
            }
            Err(e) => {
                error!("Deployment {} aborted: {}", self.deployment_id, e);
                result.success = false;
                result.metrics.total_ms = started.elapsed().as_millis() as u64;

                let notifier = self.notifier.clone();
                let payload =
                    NotificationPayload::failed(self.config.environment, e.to_string());
                tokio::spawn(async move {
                    let _ = notifier.send_notification(payload).await;
                });
            }
        }

        result
    }

    async fn run_pipeline(
        &self,
        started: Instant,
        result: &mut FullDeploymentResult,
    ) -> Result<(), ShipwrightError> {
        self.notifier
            .send_notification(NotificationPayload::started(self.config.environment))
            .await?;

        // 1. validate; nothing has changed yet, so a failure just stops
        let phase_start = Instant::now();
        self.record(DeploymentPhase::Validation, MetricStatus::Started, None, None, None)
            .await;
        let validation = self.validate_pre_deployment().await;
        if validation.is_valid {
            self.record(
                DeploymentPhase::Validation,
                MetricStatus::Success,
                Some(phase_start.elapsed().as_millis() as u64),
                None,
                Some(json!({"pending_migrations": validation.pending_migrations.len()})),
            )
            .await;
            result.completed_steps.push("validate".to_string());
        } else {
            self.record(
                DeploymentPhase::Validation,
                MetricStatus::Failed,
                Some(phase_start.elapsed().as_millis() as u64),
                Some(validation.errors.join("; ")),
                None,
            )
            .await;
            result.failed_step = Some("validate".to_string());
            return Ok(());
        }

        // 2. backup; skipped entirely on dry runs and when disabled
        let backup = self.create_backup().await;
        if backup.skipped {
            info!("Backup skipped");
            result.completed_steps.push("backup".to_string());
        } else {
            let phase_start = Instant::now();
            self.record(DeploymentPhase::Backup, MetricStatus::Started, None, None, None)
                .await;
            if backup.success {
                self.record(
                    DeploymentPhase::Backup,
                    MetricStatus::Success,
                    Some(phase_start.elapsed().as_millis() as u64),
                    None,
                    Some(json!({"path": backup.path})),
                )
                .await;
                result.completed_steps.push("backup".to_string());
            } else {
                self.record(
                    DeploymentPhase::Backup,
                    MetricStatus::Failed,
                    Some(phase_start.elapsed().as_millis() as u64),
                    backup.error.clone(),
                    None,
                )
                .await;
                result.failed_step = Some("backup".to_string());
                return Ok(());
            }
        }

        // 3. migrate; failures here are the class operators care about most
        self.record(DeploymentPhase::Migration, MetricStatus::Started, None, None, None)
            .await;
        let migration = self.run_migrations().await;
        result.metrics.migration_ms = migration.duration_ms;
        if migration.success {
            self.record(
                DeploymentPhase::Migration,
                MetricStatus::Success,
                Some(migration.duration_ms),
                None,
                Some(json!({"skipped": migration.skipped})),
            )
            .await;
            result.completed_steps.push("migrate".to_string());
        } else {
            self.record(
                DeploymentPhase::Migration,
                MetricStatus::Failed,
                Some(migration.duration_ms),
                migration.error.clone(),
                Some(json!({"timed_out": migration.timed_out})),
            )
            .await;
            result.failed_step = Some("migrate".to_string());
            result.migration_error = migration.error.clone();
            if self.config.auto_rollback {
                self.auto_rollback(result).await;
            }
            return Ok(());
        }

        // 4. deploy
        self.record(DeploymentPhase::Deployment, MetricStatus::Started, None, None, None)
            .await;
        let deploy = self.deploy_to_target().await;
        result.metrics.deployment_ms = deploy.duration_ms;
        if deploy.success {
            self.record(
                DeploymentPhase::Deployment,
                MetricStatus::Success,
                Some(deploy.duration_ms),
                None,
                Some(json!({"release_id": deploy.release_id})),
            )
            .await;
            result.completed_steps.push("deploy".to_string());
        } else {
            self.record(
                DeploymentPhase::Deployment,
                MetricStatus::Failed,
                Some(deploy.duration_ms),
                deploy.error.clone(),
                Some(json!({"release_command_failed": deploy.release_command_failed})),
            )
            .await;
            result.failed_step = Some("deploy".to_string());
            if self.config.auto_rollback {
                self.auto_rollback(result).await;
            }
            return Ok(());
        }

        // 5. verify; the release already happened, failures are surfaced
        // but never auto-reverted
        let phase_start = Instant::now();
        self.record(DeploymentPhase::Verification, MetricStatus::Started, None, None, None)
            .await;
        let verification = self.verify_deployment().await;
        result.metrics.verification_ms = phase_start.elapsed().as_millis() as u64;
        if verification.success {
            self.record(
                DeploymentPhase::Verification,
                MetricStatus::Success,
                Some(result.metrics.verification_ms),
                None,
                None,
            )
            .await;
            result.completed_steps.push("verify".to_string());
        } else {
            self.record(
                DeploymentPhase::Verification,
                MetricStatus::Failed,
                Some(result.metrics.verification_ms),
                Some(format!(
                    "health_ok={} app_responsive={} migrations={:?}",
                    verification.health_ok,
                    verification.app_responsive,
                    verification.migration_status
                )),
                None,
            )
            .await;
            result.failed_step = Some("verify".to_string());
            return Ok(());
        }

        result.success = true;
        result.metrics.total_ms = started.elapsed().as_millis() as u64;
        info!(
            "Deployment {} to {} succeeded",
            self.deployment_id, self.config.environment
        );

        self.notifier
            .send_notification(NotificationPayload::success(
                self.config.environment,
                result.metrics.clone(),
            ))
            .await?;

        Ok(())
    }

    /// Best-effort release rollback after a failed migrate or deploy phase
    async fn auto_rollback(&self, result: &mut FullDeploymentResult) {
        info!("Auto-rollback enabled, reverting release");
        let phase_start = Instant::now();
        self.record(DeploymentPhase::Rollback, MetricStatus::Started, None, None, None)
            .await;

        let rollback = self.rollback(RollbackOptions::default()).await;
        let status = if rollback.success {
            MetricStatus::Success
        } else {
            MetricStatus::Failed
        };
        self.record(
            DeploymentPhase::Rollback,
            status,
            Some(phase_start.elapsed().as_millis() as u64),
            rollback.error.clone(),
            Some(json!({"rollback_type": rollback.rollback_type})),
        )
        .await;

        result.rollback_triggered = true;
    }

    async fn record(
        &self,
        phase: DeploymentPhase,
        status: MetricStatus,
        duration_ms: Option<u64>,
        error: Option<String>,
        details: Option<serde_json::Value>,
    ) {
        let Some(monitor) = &self.monitor else {
            return;
        };

        let mut metric =
            DeploymentMetric::new(self.config.environment, &self.deployment_id, phase, status);
        metric.duration_ms = duration_ms;
        metric.error = error;
        metric.details = details;
        monitor.record_metric(metric).await;
    }
}

/// Parse the migration status tool's JSON output, keeping only pending
/// entries. Unparseable output is tolerated as an empty list.
fn parse_pending_migrations(stdout: &str) -> Vec<MigrationInfo> {
    serde_json::from_str::<Vec<MigrationInfo>>(stdout)
        .unwrap_or_default()
        .into_iter()
        .filter(|m| m.status == "pending")
        .collect()
}

/// Pull a release identifier (a `v<digits>` token) out of the platform
/// CLI output. Absence is not an error.
fn extract_release_id(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .filter(|line| line.to_lowercase().contains("release"))
        .flat_map(|line| line.split_whitespace())
        .find(|token| {
            let token = token.trim_end_matches(|c: char| !c.is_ascii_alphanumeric());
            token.len() > 1
                && token.starts_with('v')
                && token[1..].chars().all(|c| c.is_ascii_digit())
        })
        .map(|token| {
            token
                .trim_end_matches(|c: char| !c.is_ascii_alphanumeric())
                .to_string()
        })
}
