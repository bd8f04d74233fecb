use anyhow::Context;
use async_trait::async_trait;
use std::time::Duration;

use crate::core::notifier::NotifyPayload;
use crate::plugins::http::driver::HttpDriverError;
use crate::plugins::registry::NotifyTransport;

/// POSTs each payload as JSON to the job's notify endpoint.
pub struct WebhookTransport {
    client: reqwest::Client,
}

impl WebhookTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("build webhook client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NotifyTransport for WebhookTransport {
    async fn deliver(&self, endpoint: &str, payload: &NotifyPayload, timeout: Duration) -> anyhow::Result<()> {
        let resp = self.client
            .post(endpoint)
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("POST {}", endpoint))?;

        if !resp.status().is_success() {
            return Err(HttpDriverError::Status(resp.status()).into());
        }
        Ok(())
    }
}
