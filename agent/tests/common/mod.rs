//! Shared test doubles for the pipeline and monitor tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use shipwright::config::{DeploymentConfig, DeploymentOverrides};
use shipwright::deploy::manager::DeploymentManager;
use shipwright::errors::ShipwrightError;
use shipwright::exec::{CommandOutput, CommandRunner, CommandSpec, ExecError};
use shipwright::monitor::alert::{
    AlertChannelConfig, AlertConfig, AlertThresholds, ChannelKind,
};
use shipwright::monitor::channels::AlertTransport;
use shipwright::monitor::DeploymentMonitor;
use shipwright::notify::{NotificationPayload, NotificationSink};
use shipwright::probe::AppProbe;
use shipwright::settings::Settings;

/// Set the environment variables validation requires. Values are shared
/// by every test and never unset, so parallel tests do not race.
pub fn ensure_required_env() {
    std::env::set_var("DATABASE_URL", "postgres://localhost/app_test");
    std::env::set_var("SESSION_SECRET", "test-secret");
    std::env::set_var("SESSION_URL", "http://localhost:4000");
}

/// Scripted command runner keyed by substrings of the command line
#[derive(Default)]
pub struct FakeRunner {
    fail: Vec<&'static str>,
    timeout: Vec<&'static str>,
    stdout: HashMap<&'static str, String>,
    calls: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands whose display contains `needle` exit non-zero
    pub fn failing_on(mut self, needle: &'static str) -> Self {
        self.fail.push(needle);
        self
    }

    /// Commands whose display contains `needle` hit the time budget
    pub fn timing_out_on(mut self, needle: &'static str) -> Self {
        self.timeout.push(needle);
        self
    }

    /// Stdout returned for commands whose display contains `needle`
    pub fn with_stdout(mut self, needle: &'static str, stdout: &str) -> Self {
        self.stdout.insert(needle, stdout.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called_with(&self, needle: &str) -> bool {
        self.calls().iter().any(|call| call.contains(needle))
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, ExecError> {
        let display = spec.display();
        self.calls.lock().unwrap().push(display.clone());

        if self.timeout.iter().any(|n| display.contains(n)) {
            return Err(ExecError::Timeout {
                command: display,
                timeout_ms: timeout.map(|t| t.as_millis() as u64).unwrap_or(0),
            });
        }
        if self.fail.iter().any(|n| display.contains(n)) {
            return Err(ExecError::Failed {
                command: display,
                status: 1,
                stderr: "boom".to_string(),
            });
        }

        let stdout = self
            .stdout
            .iter()
            .find(|(n, _)| display.contains(*n))
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        Ok(CommandOutput {
            stdout,
            stderr: String::new(),
        })
    }
}

/// Probe with a scripted health state and response body
pub struct FakeProbe {
    pub healthy: bool,
    pub body: Value,
}

impl Default for FakeProbe {
    fn default() -> Self {
        Self {
            healthy: true,
            body: json!({"status": "ok"}),
        }
    }
}

#[async_trait]
impl AppProbe for FakeProbe {
    async fn health_check(&self) -> Result<(), ShipwrightError> {
        if self.healthy {
            Ok(())
        } else {
            Err(ShipwrightError::VerifyError("unreachable".to_string()))
        }
    }

    async fn responsiveness(&self) -> Result<Value, ShipwrightError> {
        if self.healthy {
            Ok(self.body.clone())
        } else {
            Err(ShipwrightError::VerifyError("unreachable".to_string()))
        }
    }
}

/// Notification sink that remembers every payload
#[derive(Default)]
pub struct FakeSink {
    pub sent: Mutex<Vec<NotificationPayload>>,
}

impl FakeSink {
    pub fn sent(&self) -> Vec<NotificationPayload> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for FakeSink {
    async fn send_notification(
        &self,
        payload: NotificationPayload,
    ) -> Result<(), ShipwrightError> {
        self.sent.lock().unwrap().push(payload);
        Ok(())
    }
}

/// Alert transport that remembers deliveries and can fail per kind
#[derive(Default)]
pub struct FakeTransport {
    pub fail_kinds: Vec<ChannelKind>,
    pub delivered: Mutex<Vec<(ChannelKind, Value)>>,
}

impl FakeTransport {
    pub fn failing_for(kinds: &[ChannelKind]) -> Self {
        Self {
            fail_kinds: kinds.to_vec(),
            ..Default::default()
        }
    }

    pub fn delivered(&self) -> Vec<(ChannelKind, Value)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertTransport for FakeTransport {
    async fn deliver(
        &self,
        channel: &AlertChannelConfig,
        payload: Value,
    ) -> Result<(), ShipwrightError> {
        if self.fail_kinds.contains(&channel.kind) {
            return Err(ShipwrightError::MonitorError("channel down".to_string()));
        }
        self.delivered.lock().unwrap().push((channel.kind, payload));
        Ok(())
    }
}

/// An always-on monitor wired to the given transport
pub fn monitor_with(
    channels: Vec<AlertChannelConfig>,
    transport: Arc<FakeTransport>,
) -> DeploymentMonitor {
    let config = AlertConfig {
        enabled: true,
        channels,
        thresholds: AlertThresholds::default(),
    };
    DeploymentMonitor::with_transport(config, transport)
}

/// A channel config pointing at a placeholder URL
pub fn channel(kind: ChannelKind) -> AlertChannelConfig {
    AlertChannelConfig {
        kind,
        enabled: true,
        config: json!({"url": "https://hooks.example.com/x"}),
    }
}

/// A manager wired entirely to fakes, with an enabled channel-less monitor
pub fn manager_for(
    environment: &str,
    overrides: DeploymentOverrides,
    runner: Arc<FakeRunner>,
    probe: FakeProbe,
    sink: Arc<FakeSink>,
) -> DeploymentManager {
    let config = DeploymentConfig::resolve(environment, overrides).unwrap();
    let monitor = DeploymentMonitor::with_transport(
        AlertConfig::for_environment(config.environment, config.timeout, Vec::new()),
        Arc::new(FakeTransport::default()),
    );
    DeploymentManager::with_collaborators(
        config,
        Settings::default(),
        runner,
        Arc::new(probe),
        sink,
        Some(monitor),
    )
}
