//! Shipwright - Entry Point
//!
//! Ships an application and its schema migrations to a target environment
//! and watches the pipeline with a threshold-driven alerting engine.

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::process::ExitCode;

use colored::Colorize;
use tracing::{error, warn};

use shipwright::config::DeploymentOverrides;
use shipwright::deploy::manager::DeploymentManager;
use shipwright::deploy::results::FullDeploymentResult;
use shipwright::logs::{init_logging, LogOptions};
use shipwright::monitor::ExportFormat;
use shipwright::settings::Settings;
use shipwright::utils::version_info;

const USAGE: &str = "Usage: shipwright --env=<development|staging|production> \
[--dry-run] [--skip-migrations] [--timeout=<ms>] [--backup=<true|false>] \
[--auto-rollback=<true|false>] [--yes] [--settings=<path>] [--export=<json|csv>]";

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        let version = version_info();
        println!("{}", serde_json::to_string_pretty(&version).unwrap());
        return ExitCode::SUCCESS;
    }

    // Retrieve the settings file
    let settings = match cli_args.get("settings") {
        Some(path) => match Settings::load(Path::new(path)).await {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Unable to read settings file {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => Settings::default(),
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: cli_args.get("log-json").map(|v| v == "true").unwrap_or(false),
    };
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }

    let Some(environment) = cli_args.get("env").or_else(|| cli_args.get("environment"))
    else {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    };

    let overrides = DeploymentOverrides {
        dry_run: flag(&cli_args, "dry-run"),
        skip_migrations: flag(&cli_args, "skip-migrations"),
        timeout_ms: cli_args.get("timeout").and_then(|v| v.parse().ok()),
        backup_enabled: flag(&cli_args, "backup"),
        require_confirmation: flag(&cli_args, "confirm"),
        auto_rollback: flag(&cli_args, "auto-rollback"),
    };

    let manager = match DeploymentManager::new(environment, overrides, settings) {
        Ok(manager) => manager,
        Err(e) => {
            error!("Cannot start deployment: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Confirmation gate: production refuses to run without --yes
    if manager.config().require_confirmation && !cli_args.contains_key("yes") {
        error!(
            "Deployments to {} require confirmation; re-run with --yes",
            manager.config().environment
        );
        return ExitCode::from(2);
    }

    let result = manager.deploy().await;
    print_summary(&result);

    // Capture the metric log of the run that just happened
    if let Some(format) = cli_args.get("export") {
        match format.parse::<ExportFormat>() {
            Ok(format) => {
                if let Some(monitor) = manager.monitor() {
                    match monitor.export_metrics(format).await {
                        Ok(exported) => println!("{}", exported),
                        Err(e) => warn!("Metric export failed: {}", e),
                    }
                }
            }
            Err(e) => warn!("{}", e),
        }
    }

    if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn flag(cli_args: &HashMap<String, String>, key: &str) -> Option<bool> {
    cli_args.get(key).map(|v| v == "true")
}

fn print_summary(result: &FullDeploymentResult) {
    println!();
    if result.success {
        println!(
            "{}",
            format!("Deployment succeeded in {} ms", result.metrics.total_ms)
                .green()
                .bold()
        );
    } else {
        let step = result.failed_step.as_deref().unwrap_or("unknown");
        println!(
            "{}",
            format!("Deployment failed at step: {}", step).red().bold()
        );
        if let Some(migration_error) = &result.migration_error {
            println!("{}", format!("Migration error: {}", migration_error).red());
        }
        if result.rollback_triggered {
            println!("{}", "Rollback was triggered".yellow());
        }
    }
    if result.dry_run {
        println!("{}", "(dry run)".yellow());
    }
    if !result.completed_steps.is_empty() {
        println!("Completed steps: {}", result.completed_steps.join(", "));
    }
}
