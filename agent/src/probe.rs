//! HTTP probes against the deployed application

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::errors::ShipwrightError;

/// Post-deploy checks against the running application
#[async_trait]
pub trait AppProbe: Send + Sync {
    /// Plain reachability of the health endpoint
    async fn health_check(&self) -> Result<(), ShipwrightError>;

    /// Health endpoint body, for the responsiveness check
    async fn responsiveness(&self) -> Result<Value, ShipwrightError>;
}

/// Probes the application's health endpoint over HTTP
pub struct HttpProbe {
    client: Client,
    base_url: String,
}

impl HttpProbe {
    pub fn new(base_url: &str) -> Result<Self, ShipwrightError> {
        url::Url::parse(base_url)
            .map_err(|e| ShipwrightError::ConfigError(format!("Invalid application URL: {}", e)))?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }
}

#[async_trait]
impl AppProbe for HttpProbe {
    async fn health_check(&self) -> Result<(), ShipwrightError> {
        let url = self.health_url();
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ShipwrightError::VerifyError(format!(
                "Health check returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn responsiveness(&self) -> Result<Value, ShipwrightError> {
        let url = self.health_url();
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ShipwrightError::VerifyError(format!(
                "Responsiveness probe returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(HttpProbe::new("not a url").is_err());
    }

    #[test]
    fn test_health_url_joins_cleanly() {
        let probe = HttpProbe::new("https://app.example.com/").unwrap();
        assert_eq!(probe.health_url(), "https://app.example.com/health");
    }
}
