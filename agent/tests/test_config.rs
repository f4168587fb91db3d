//! Configuration contract tests

use std::time::Duration;

use shipwright::config::{DeploymentConfig, DeploymentOverrides, Environment};
use shipwright::errors::ShipwrightError;

#[test]
fn test_development_defaults() {
    let config =
        DeploymentConfig::resolve("development", DeploymentOverrides::default()).unwrap();
    assert_eq!(config.environment, Environment::Development);
    assert!(!config.dry_run);
    assert!(!config.skip_migrations);
    assert_eq!(config.timeout, Duration::from_millis(120_000));
    assert!(!config.backup_enabled);
    assert!(!config.require_confirmation);
    assert!(!config.auto_rollback);
}

#[test]
fn test_staging_defaults() {
    let config = DeploymentConfig::resolve("staging", DeploymentOverrides::default()).unwrap();
    assert_eq!(config.environment, Environment::Staging);
    assert!(!config.dry_run);
    assert!(!config.skip_migrations);
    assert_eq!(config.timeout, Duration::from_millis(300_000));
    assert!(config.backup_enabled);
    assert!(!config.require_confirmation);
    assert!(config.auto_rollback);
}

#[test]
fn test_production_defaults() {
    let config =
        DeploymentConfig::resolve("production", DeploymentOverrides::default()).unwrap();
    assert_eq!(config.environment, Environment::Production);
    assert!(!config.dry_run);
    assert!(!config.skip_migrations);
    assert_eq!(config.timeout, Duration::from_millis(600_000));
    assert!(config.backup_enabled);
    assert!(config.require_confirmation);
    assert!(config.auto_rollback);
}

#[test]
fn test_unrecognized_environment_is_a_configuration_error() {
    for bad in ["prod", "qa", "Production", ""] {
        let err = DeploymentConfig::resolve(bad, DeploymentOverrides::default()).unwrap_err();
        assert!(
            matches!(err, ShipwrightError::ConfigError(_)),
            "expected ConfigError for {:?}",
            bad
        );
    }
}

#[test]
fn test_partial_overrides_keep_remaining_defaults() {
    let config = DeploymentConfig::resolve(
        "production",
        DeploymentOverrides {
            skip_migrations: Some(true),
            auto_rollback: Some(false),
            ..Default::default()
        },
    )
    .unwrap();

    assert!(config.skip_migrations);
    assert!(!config.auto_rollback);
    // everything else still carries the production defaults
    assert_eq!(config.timeout, Duration::from_millis(600_000));
    assert!(config.backup_enabled);
    assert!(config.require_confirmation);
}
