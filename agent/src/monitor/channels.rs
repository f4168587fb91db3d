//! Alert channel payloads and delivery

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::errors::ShipwrightError;
use crate::monitor::alert::{Alert, AlertChannelConfig, AlertSeverity, ChannelKind};

/// Build the payload shape one channel kind expects
pub fn payload_for(kind: ChannelKind, alert: &Alert) -> Value {
    match kind {
        ChannelKind::Chat => chat_payload(alert),
        ChannelKind::Email => email_payload(alert),
        ChannelKind::Webhook => webhook_payload(alert),
        ChannelKind::Pager => pager_payload(alert),
    }
}

/// Chat attachment: title, severity color, short fields
pub fn chat_payload(alert: &Alert) -> Value {
    json!({
        "attachments": [{
            "color": alert.severity.color(),
            "title": format!("{} {}", alert.severity.emoji(), alert.title),
            "text": alert.message,
            "fields": [
                {"title": "Environment", "value": alert.environment.as_str(), "short": true},
                {"title": "Severity", "value": alert.severity.as_str(), "short": true},
                {"title": "Deployment", "value": alert.deployment_id.clone().unwrap_or_else(|| "-".to_string()), "short": true},
            ],
            "ts": alert.timestamp.timestamp(),
        }]
    })
}

/// Email: subject encodes severity, title and environment
pub fn email_payload(alert: &Alert) -> Value {
    let subject = format!(
        "[{}] {} - {}",
        alert.severity.as_str().to_uppercase(),
        alert.title,
        alert.environment
    );
    let body = format!(
        "{} {}\n\n{}\n\nEnvironment: {}\nDeployment: {}\nRaised at: {}",
        alert.severity.emoji(),
        alert.title,
        alert.message,
        alert.environment,
        alert.deployment_id.clone().unwrap_or_else(|| "-".to_string()),
        alert.timestamp.to_rfc3339(),
    );
    json!({"subject": subject, "body": body})
}

/// Webhook: JSON envelope carrying the whole alert
pub fn webhook_payload(alert: &Alert) -> Value {
    json!({
        "event": "deployment_alert",
        "color": alert.severity.color(),
        "alert": alert,
    })
}

/// Pager event: trigger for error/critical, acknowledge otherwise, deduped
/// per environment and deployment
pub fn pager_payload(alert: &Alert) -> Value {
    let action = match alert.severity {
        AlertSeverity::Error | AlertSeverity::Critical => "trigger",
        AlertSeverity::Info | AlertSeverity::Warning => "acknowledge",
    };
    let dedup_key = format!(
        "{}-{}",
        alert.environment,
        alert.deployment_id.clone().unwrap_or_else(|| "none".to_string())
    );
    json!({
        "event_action": action,
        "dedup_key": dedup_key,
        "payload": {
            "summary": format!("{} {}", alert.severity.emoji(), alert.title),
            "severity": alert.severity.as_str(),
            "source": alert.environment.as_str(),
            "custom_details": {"message": alert.message},
        },
    })
}

/// Delivers a built payload to one configured channel
#[async_trait]
pub trait AlertTransport: Send + Sync {
    async fn deliver(
        &self,
        channel: &AlertChannelConfig,
        payload: Value,
    ) -> Result<(), ShipwrightError>;
}

/// Posts chat/webhook/pager payloads to the channel's configured URL.
/// Email payloads are written to the log; the agent carries no SMTP
/// transport.
pub struct HttpAlertTransport {
    client: Client,
}

impl HttpAlertTransport {
    pub fn new() -> Result<Self, ShipwrightError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AlertTransport for HttpAlertTransport {
    async fn deliver(
        &self,
        channel: &AlertChannelConfig,
        payload: Value,
    ) -> Result<(), ShipwrightError> {
        if channel.kind == ChannelKind::Email {
            let subject = payload
                .get("subject")
                .and_then(|v| v.as_str())
                .unwrap_or("(no subject)");
            info!("Email alert: {}", subject);
            return Ok(());
        }

        let url = channel
            .config
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ShipwrightError::MonitorError(format!(
                    "{} channel has no url configured",
                    channel.kind
                ))
            })?;

        debug!("POST {} ({} channel)", url, channel.kind);
        let response = self.client.post(url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(ShipwrightError::MonitorError(format!(
                "{} channel returned {}",
                channel.kind,
                response.status()
            )));
        }
        Ok(())
    }
}
