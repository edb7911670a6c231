pub mod webhook;

use async_trait::async_trait;

#[async_trait]
pub trait NotificationProvider: Send + Sync {
    async fn send_notification(&self, recipient_id: &str, message: &str) -> anyhow::Result<()>;
}

/// Writes notifications to the log. Used when no delivery endpoint is configured.
pub struct LogNotifier;

#[async_trait]
impl NotificationProvider for LogNotifier {
    async fn send_notification(&self, recipient_id: &str, message: &str) -> anyhow::Result<()> {
        tracing::info!(recipient_id, message, "notification");
        Ok(())
    }
}
