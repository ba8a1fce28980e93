//! Fallback notifier that only writes notifications to the log.

use retouch_core::notify::{Notification, Notifier};

/// Used when no chat bot is configured. Always reports success.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> bool {
        tracing::info!(
            recipient_id = notification.recipient_id,
            task_kind = ?notification.task_kind,
            success = notification.success,
            result_locator = notification.result_locator.as_deref(),
            message = notification.message.as_deref(),
            "Notification (log only)",
        );
        true
    }
}
