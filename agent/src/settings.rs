//! Agent settings file management

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ShipwrightError;
use crate::exec::CommandSpec;
use crate::logs::LogLevel;
use crate::monitor::alert::AlertChannelConfig;

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Deployed application configuration
    #[serde(default)]
    pub application: ApplicationSettings,

    /// External tool command lines
    #[serde(default)]
    pub tooling: ToolingSettings,

    /// Run-level notification configuration
    #[serde(default)]
    pub notifications: NotificationSettings,

    /// Alert channel configuration
    #[serde(default)]
    pub alerts: AlertSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            application: ApplicationSettings::default(),
            tooling: ToolingSettings::default(),
            notifications: NotificationSettings::default(),
            alerts: AlertSettings::default(),
        }
    }
}

impl Settings {
    /// Read settings from a JSON file
    pub async fn load(path: &Path) -> Result<Self, ShipwrightError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Deployed application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationSettings {
    /// Base URL of the deployed application
    #[serde(default = "default_app_base_url")]
    pub base_url: String,
}

fn default_app_base_url() -> String {
    "http://localhost:3000".to_string()
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            base_url: default_app_base_url(),
        }
    }
}

/// External tool command lines, each overridable per installation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolingSettings {
    /// Application build
    #[serde(default = "default_build")]
    pub build: CommandSpec,

    /// Migration schema validation
    #[serde(default = "default_migrate_validate")]
    pub migrate_validate: CommandSpec,

    /// Migration status report (JSON array of `{version, status}`)
    #[serde(default = "default_migrate_status")]
    pub migrate_status: CommandSpec,

    /// Apply pending migrations
    #[serde(default = "default_migrate_apply")]
    pub migrate_apply: CommandSpec,

    /// Step back migrations; the step count is appended as an argument
    #[serde(default = "default_migrate_rollback")]
    pub migrate_rollback: CommandSpec,

    /// Datastore dump; connection string and output path are appended
    #[serde(default = "default_db_dump")]
    pub db_dump: CommandSpec,

    /// Datastore restore; connection string and input path are appended
    #[serde(default = "default_db_restore")]
    pub db_restore: CommandSpec,

    /// Hosting platform deploy
    #[serde(default = "default_platform_deploy")]
    pub platform_deploy: CommandSpec,

    /// Hosting platform release rollback
    #[serde(default = "default_platform_rollback")]
    pub platform_rollback: CommandSpec,

    /// Platform config file used for production deploys
    #[serde(default = "default_production_deploy_config")]
    pub production_deploy_config: String,

    /// Directory backups are written to
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
}

fn default_build() -> CommandSpec {
    CommandSpec::new("npm", &["run", "build"])
}

fn default_migrate_validate() -> CommandSpec {
    CommandSpec::new("migrate", &["validate"])
}

fn default_migrate_status() -> CommandSpec {
    CommandSpec::new("migrate", &["status", "--json"])
}

fn default_migrate_apply() -> CommandSpec {
    CommandSpec::new("migrate", &["up"])
}

fn default_migrate_rollback() -> CommandSpec {
    CommandSpec::new("migrate", &["down"])
}

fn default_db_dump() -> CommandSpec {
    CommandSpec::new("pg_dump", &["--format", "custom"])
}

fn default_db_restore() -> CommandSpec {
    CommandSpec::new("pg_restore", &["--clean"])
}

fn default_platform_deploy() -> CommandSpec {
    CommandSpec::new("flyctl", &["deploy", "--remote-only"])
}

fn default_platform_rollback() -> CommandSpec {
    CommandSpec::new("flyctl", &["releases", "rollback"])
}

fn default_production_deploy_config() -> String {
    "fly.production.toml".to_string()
}

fn default_backup_dir() -> String {
    "backups".to_string()
}

impl Default for ToolingSettings {
    fn default() -> Self {
        Self {
            build: default_build(),
            migrate_validate: default_migrate_validate(),
            migrate_status: default_migrate_status(),
            migrate_apply: default_migrate_apply(),
            migrate_rollback: default_migrate_rollback(),
            db_dump: default_db_dump(),
            db_restore: default_db_restore(),
            platform_deploy: default_platform_deploy(),
            platform_rollback: default_platform_rollback(),
            production_deploy_config: default_production_deploy_config(),
            backup_dir: default_backup_dir(),
        }
    }
}

/// Run-level notification settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Webhook the started/success/failed payloads are posted to.
    /// When absent, notifications are dropped.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Alert channel settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertSettings {
    /// Configured alert destinations
    #[serde(default)]
    pub channels: Vec<AlertChannelConfig>,
}
