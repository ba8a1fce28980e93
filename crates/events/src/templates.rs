//! Rendering of outcome notifications into chat messages.

use retouch_core::messages;
use retouch_core::notify::Notification;

/// A message ready to be sent through the chat bot API.
#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingMessage {
    /// Plain text (failures, or successes without a previewable result).
    Text { chat_id: i64, text: String },
    /// A photo by URL with a caption.
    Photo {
        chat_id: i64,
        photo_url: String,
        caption: String,
    },
}

impl OutgoingMessage {
    /// Bot API method name for this message.
    pub fn method(&self) -> &'static str {
        match self {
            OutgoingMessage::Text { .. } => "sendMessage",
            OutgoingMessage::Photo { .. } => "sendPhoto",
        }
    }

    /// JSON body for the bot API call.
    pub fn body(&self) -> serde_json::Value {
        match self {
            OutgoingMessage::Text { chat_id, text } => serde_json::json!({
                "chat_id": chat_id,
                "text": text,
                "disable_web_page_preview": true,
            }),
            OutgoingMessage::Photo {
                chat_id,
                photo_url,
                caption,
            } => serde_json::json!({
                "chat_id": chat_id,
                "photo": photo_url,
                "caption": caption,
            }),
        }
    }
}

/// Fallback text when a failure arrives without a translated message.
const GENERIC_FAILURE: &str =
    "Something went wrong while processing your request. You have not been charged.";

/// Render a notification into a chat message.
pub fn render(notification: &Notification) -> OutgoingMessage {
    let chat_id = notification.recipient_id;

    if notification.success {
        let caption = match (notification.message.as_deref(), notification.task_kind) {
            (Some(text), _) => text.to_string(),
            (None, Some(kind)) => messages::success_message(kind),
            (None, None) => "Your result is ready!".to_string(),
        };
        return match &notification.result_locator {
            Some(url) => OutgoingMessage::Photo {
                chat_id,
                photo_url: url.clone(),
                caption,
            },
            None => OutgoingMessage::Text {
                chat_id,
                text: caption,
            },
        };
    }

    OutgoingMessage::Text {
        chat_id,
        text: notification
            .message
            .clone()
            .unwrap_or_else(|| GENERIC_FAILURE.to_string()),
    }
}
