//! Run-level notifications
//!
//! One started/success/failed payload per pipeline run, posted to an
//! external sink. The failure payload is fire-and-forget; the pipeline
//! never waits on it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::config::Environment;
use crate::deploy::results::DeploymentMetricsSummary;
use crate::errors::ShipwrightError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Started,
    Success,
    Failed,
}

/// Payload accepted by the notification sink
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub environment: Environment,
    pub timestamp: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<DeploymentMetricsSummary>,
}

impl NotificationPayload {
    pub fn started(environment: Environment) -> Self {
        Self {
            kind: NotificationKind::Started,
            environment,
            timestamp: Utc::now(),
            error: None,
            metrics: None,
        }
    }

    pub fn success(environment: Environment, metrics: DeploymentMetricsSummary) -> Self {
        Self {
            kind: NotificationKind::Success,
            environment,
            timestamp: Utc::now(),
            error: None,
            metrics: Some(metrics),
        }
    }

    pub fn failed(environment: Environment, error: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Failed,
            environment,
            timestamp: Utc::now(),
            error: Some(error.into()),
            metrics: None,
        }
    }
}

/// External notification sink
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_notification(&self, payload: NotificationPayload)
        -> Result<(), ShipwrightError>;
}

/// Posts payloads to a configured webhook
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self, ShipwrightError> {
        url::Url::parse(url)
            .map_err(|e| ShipwrightError::ConfigError(format!("Invalid webhook URL: {}", e)))?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn send_notification(
        &self,
        payload: NotificationPayload,
    ) -> Result<(), ShipwrightError> {
        debug!("POST {} (notification)", self.url);
        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(ShipwrightError::NotifyError(format!(
                "Notification sink returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Sink used when no webhook is configured
pub struct NoopNotifier;

#[async_trait]
impl NotificationSink for NoopNotifier {
    async fn send_notification(
        &self,
        payload: NotificationPayload,
    ) -> Result<(), ShipwrightError> {
        debug!("Notification dropped (no sink configured): {:?}", payload.kind);
        Ok(())
    }
}
