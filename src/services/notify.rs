use serde::Serialize;
use uuid::Uuid;

/// Outbound event for the notification/activity-feed service. Delivery is
/// fire-and-forget: callers log failures and move on.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub user_id: Uuid,
    pub habit_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    HabitReminder,
    StreakMilestone,
    GoalReached,
    CommunityActivity,
}

#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()>;
}

/// Posts notifications to the configured webhook. An empty URL turns
/// dispatch into a no-op log line, which keeps local development quiet.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to build notification HTTP client");
        Self { client, url }
    }
}

impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()> {
        if self.url.is_empty() {
            tracing::debug!(
                user_id = %notification.user_id,
                kind = ?notification.kind,
                "Notification webhook not configured; dropping"
            );
            return Ok(());
        }

        let response = self
            .client
            .post(&self.url)
            .json(&notification)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Notification webhook error {}: {}", status, body);
        }

        Ok(())
    }
}

#[cfg(test)]
pub mod fakes {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Records everything it is asked to send.
    #[derive(Clone, Default)]
    pub struct CollectingNotifier {
        pub sent: Arc<Mutex<Vec<Notification>>>,
    }

    impl Notifier for CollectingNotifier {
        async fn notify(&self, notification: Notification) -> anyhow::Result<()> {
            self.sent.lock().await.push(notification);
            Ok(())
        }
    }

    /// Fails every dispatch, for exercising best-effort paths.
    #[derive(Clone, Default)]
    pub struct FailingNotifier;

    impl Notifier for FailingNotifier {
        async fn notify(&self, _notification: Notification) -> anyhow::Result<()> {
            anyhow::bail!("sink offline")
        }
    }
}
