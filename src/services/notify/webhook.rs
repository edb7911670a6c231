use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;

use super::NotificationProvider;

/// Delivers notifications by POSTing them as JSON to a downstream service.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationPayload<'a> {
    recipient_id: &'a str,
    message: &'a str,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationProvider for WebhookNotifier {
    async fn send_notification(&self, recipient_id: &str, message: &str) -> anyhow::Result<()> {
        self.client
            .post(&self.url)
            .json(&NotificationPayload {
                recipient_id,
                message,
            })
            .send()
            .await
            .context("failed to reach notification webhook")?
            .error_for_status()
            .context("notification webhook returned error")?;

        Ok(())
    }
}
