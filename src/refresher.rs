//! One-shot status refresh
//!
//! After a quick action (start, stop, reset, refresh) the displayed status
//! is refreshed once, after a fixed delay. No retries and no loop.

use crate::notify::{NotificationQueue, Severity};
use crate::status::StatusClient;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Status text currently shown for a machine.
pub type StatusDisplay = Arc<RwLock<Option<String>>>;

#[derive(Clone)]
pub struct OneShotRefresher {
    client: Arc<dyn StatusClient>,
    queue: NotificationQueue,
    delay: Duration,
}

impl OneShotRefresher {
    pub fn new(client: Arc<dyn StatusClient>, queue: NotificationQueue, delay: Duration) -> Self {
        Self {
            client,
            queue,
            delay,
        }
    }

    pub fn schedule(&self, serial: impl Into<String>, display: StatusDisplay) -> JoinHandle<Option<String>> {
        let refresher = self.clone();
        let serial = serial.into();
        tokio::spawn(async move { refresher.refresh_once(&serial, &display).await })
    }

    /// Waits the configured delay, then checks the status exactly once.
    /// Returns the new status text if the display was updated.
    pub async fn refresh_once(&self, serial: &str, display: &StatusDisplay) -> Option<String> {
        sleep(self.delay).await;

        let status = match self.client.fetch_action_status(serial).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Status check for {} failed: {}", serial, e);
                return None;
            }
        };

        let Some(text) = status.display_text() else {
            debug!("No status text for {}: {:?}", serial, status);
            return None;
        };
        let text = text.to_string();

        *display.write().await = Some(text.clone());
        self.queue
            .post(format!("Status updated: {}", text), Severity::Success)
            .await;
        Some(text)
    }
}
