//! Per-phase result records
//!
//! Each phase returns a small success/failure record carrying its own
//! evidence. These are transient: produced and consumed within a single
//! pipeline run, never persisted.

use serde::{Deserialize, Serialize};

/// One migration known to the status tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationInfo {
    pub version: String,
    pub status: String,
}

/// Outcome of the pre-deployment checks
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,

    /// Every failure encountered, in check order
    pub errors: Vec<String>,

    /// Migrations still waiting to be applied
    pub pending_migrations: Vec<MigrationInfo>,

    pub build_ok: bool,
}

/// Outcome of the datastore backup
#[derive(Debug, Clone, Serialize)]
pub struct BackupResult {
    pub success: bool,

    /// True when the phase was a no-op (dry run or backups disabled)
    pub skipped: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of the migration run
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    pub success: bool,
    pub skipped: bool,

    /// Wall-clock time, tracked regardless of outcome
    pub duration_ms: u64,

    /// True when the run was cut off by the configured timeout
    pub timed_out: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of the platform deploy
#[derive(Debug, Clone, Serialize)]
pub struct DeployResult {
    pub success: bool,

    /// Release identifier extracted from the platform CLI output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_id: Option<String>,

    /// True when the platform's release command failed after the image was
    /// shipped; the new release may already be partially live.
    pub release_command_failed: bool,

    pub duration_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Migration state observed during verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationCheck {
    Complete,
    Incomplete,
    Failed,
}

/// Outcome of post-deploy verification. All three checks run even when
/// one fails; any failure flips `success`.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub success: bool,
    pub health_ok: bool,
    pub app_responsive: bool,
    pub migration_status: MigrationCheck,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pending_migrations: Vec<MigrationInfo>,
}

/// Which rollback strategy ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackKind {
    /// Datastore restored from a backup
    DataRestore,
    /// Migrations stepped back
    MigrationRollback,
    /// Platform release reverted; data untouched
    ReleaseRollback,
}

/// Outcome of a rollback
#[derive(Debug, Clone, Serialize)]
pub struct RollbackResult {
    pub success: bool,
    pub rollback_type: RollbackKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Strategy selection for [`rollback`](crate::deploy::manager::DeploymentManager::rollback):
/// restore a named backup, step back N migrations, or (neither set) revert
/// the platform release.
#[derive(Debug, Clone, Default)]
pub struct RollbackOptions {
    pub backup_path: Option<String>,
    pub migration_steps: Option<u32>,
}

/// Wall-clock accounting for one full pipeline run
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeploymentMetricsSummary {
    pub total_ms: u64,
    pub migration_ms: u64,
    pub deployment_ms: u64,
    pub verification_ms: u64,
}

/// Final output of the pipeline. Always returned, never an error.
#[derive(Debug, Clone, Serialize)]
pub struct FullDeploymentResult {
    pub success: bool,

    /// Step names completed, in order
    pub completed_steps: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,

    pub rollback_triggered: bool,

    /// Set when the failure was in the migration phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration_error: Option<String>,

    pub dry_run: bool,

    pub metrics: DeploymentMetricsSummary,
}

impl FullDeploymentResult {
    pub fn new(dry_run: bool) -> Self {
        Self {
            success: false,
            completed_steps: Vec::new(),
            failed_step: None,
            rollback_triggered: false,
            migration_error: None,
            dry_run,
            metrics: DeploymentMetricsSummary::default(),
        }
    }
}
