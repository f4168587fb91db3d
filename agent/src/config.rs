//! Deployment configuration and per-environment policy

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::ShipwrightError;
use crate::utils::short_token;

/// Environment variables every deployment target must provide
pub const REQUIRED_ENV_VARS: [&str; 3] = ["DATABASE_URL", "SESSION_SECRET", "SESSION_URL"];

/// Deployment target environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ShipwrightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            _ => Err(ShipwrightError::ConfigError(format!(
                "Unknown environment: {}",
                s
            ))),
        }
    }
}

/// Caller-supplied configuration; any field left unset falls back to the
/// environment defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeploymentOverrides {
    pub dry_run: Option<bool>,
    pub skip_migrations: Option<bool>,
    pub timeout_ms: Option<u64>,
    pub backup_enabled: Option<bool>,
    pub require_confirmation: Option<bool>,
    pub auto_rollback: Option<bool>,
}

/// Resolved deployment configuration. Immutable after construction.
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    pub environment: Environment,
    pub dry_run: bool,
    pub skip_migrations: bool,
    pub timeout: Duration,
    pub backup_enabled: bool,
    pub require_confirmation: bool,
    pub auto_rollback: bool,
}

impl DeploymentConfig {
    /// Policy defaults for one environment
    pub fn defaults(environment: Environment) -> Self {
        match environment {
            Environment::Development => Self {
                environment,
                dry_run: false,
                skip_migrations: false,
                timeout: Duration::from_millis(120_000),
                backup_enabled: false,
                require_confirmation: false,
                auto_rollback: false,
            },
            Environment::Staging => Self {
                environment,
                dry_run: false,
                skip_migrations: false,
                timeout: Duration::from_millis(300_000),
                backup_enabled: true,
                require_confirmation: false,
                auto_rollback: true,
            },
            Environment::Production => Self {
                environment,
                dry_run: false,
                skip_migrations: false,
                timeout: Duration::from_millis(600_000),
                backup_enabled: true,
                require_confirmation: true,
                auto_rollback: true,
            },
        }
    }

    /// Merge caller overrides over the environment defaults. Fails when the
    /// environment string is not recognized.
    pub fn resolve(
        environment: &str,
        overrides: DeploymentOverrides,
    ) -> Result<Self, ShipwrightError> {
        let environment = environment.parse::<Environment>()?;
        let defaults = Self::defaults(environment);

        Ok(Self {
            environment,
            dry_run: overrides.dry_run.unwrap_or(defaults.dry_run),
            skip_migrations: overrides
                .skip_migrations
                .unwrap_or(defaults.skip_migrations),
            timeout: overrides
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            backup_enabled: overrides.backup_enabled.unwrap_or(defaults.backup_enabled),
            require_confirmation: overrides
                .require_confirmation
                .unwrap_or(defaults.require_confirmation),
            auto_rollback: overrides.auto_rollback.unwrap_or(defaults.auto_rollback),
        })
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

/// Generate a deployment id: `deploy-<environment>-<compact ISO>-<random>`.
/// Stable for the lifetime of one manager instance.
pub fn generate_deployment_id(environment: Environment) -> String {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    format!("deploy-{}-{}-{}", environment, stamp, short_token())
}

/// First missing name from `names`, looked up through `lookup`
pub fn first_missing_env<F>(names: &[&str], lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    names
        .iter()
        .find(|name| lookup(name).is_none())
        .map(|name| name.to_string())
}

/// Datastore connection string, kept out of logs and error text
pub fn database_url() -> Result<SecretString, ShipwrightError> {
    std::env::var("DATABASE_URL")
        .map(SecretString::from)
        .map_err(|_| ShipwrightError::ConfigError("DATABASE_URL is not set".to_string()))
}
