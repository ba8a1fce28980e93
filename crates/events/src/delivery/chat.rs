//! Chat bot delivery with a short backoff retry.
//!
//! [`ChatDelivery`] posts rendered notifications to a bot HTTP API
//! (`{api_url}/bot{token}/{method}`). Failed attempts are retried twice
//! (after 1 s and 2 s) before the notification is given up on. Delivery is
//! best-effort: the caller only learns whether it eventually succeeded.

use std::time::Duration;

use retouch_core::notify::{Notification, Notifier};

use crate::templates::{render, OutgoingMessage};

/// Retry delays in seconds between delivery attempts.
const RETRY_DELAYS_SECS: [u64; 2] = [1, 2];

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bot API base URL.
const DEFAULT_API_URL: &str = "https://api.telegram.org";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for chat delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum ChatDeliveryError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    ///
    /// The request URL carries the bot token, so it is stripped before the
    /// error is built.
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),

    /// The bot API returned a non-2xx status code.
    #[error("Chat API returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
}

// ---------------------------------------------------------------------------
// ChatConfig
// ---------------------------------------------------------------------------

/// Configuration for the chat bot delivery channel.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Bot API base URL (defaults to the public Telegram endpoint).
    pub api_url: String,
    /// Bot token.
    pub token: String,
}

impl ChatConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `CHAT_BOT_TOKEN` is not set, signalling that chat
    /// delivery is not configured and a log-only notifier should be used.
    ///
    /// | Env Var            | Default                    |
    /// |--------------------|----------------------------|
    /// | `CHAT_BOT_TOKEN`   | (required)                 |
    /// | `CHAT_BOT_API_URL` | `https://api.telegram.org` |
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("CHAT_BOT_TOKEN").ok().filter(|t| !t.is_empty())?;
        let api_url =
            std::env::var("CHAT_BOT_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
        Some(Self { api_url, token })
    }
}

// ---------------------------------------------------------------------------
// ChatDelivery
// ---------------------------------------------------------------------------

/// Delivers task outcome notifications through the chat bot.
pub struct ChatDelivery {
    client: reqwest::Client,
    config: ChatConfig,
}

impl ChatDelivery {
    pub fn new(config: ChatConfig) -> Result<Self, ChatDeliveryError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()
            .map_err(|e| ChatDeliveryError::Request(e.without_url()))?;
        Ok(Self { client, config })
    }

    /// Send a rendered message, retrying with backoff.
    pub async fn deliver(&self, message: &OutgoingMessage) -> Result<(), ChatDeliveryError> {
        let url = self.method_url(message.method());
        let body = message.body();

        for (attempt, delay_secs) in RETRY_DELAYS_SECS.iter().enumerate() {
            match self.try_send(&url, &body).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %e,
                        "Chat delivery attempt failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
                }
            }
        }

        // Final attempt after the last backoff.
        self.try_send(&url, &body).await
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.token,
            method
        )
    }

    /// Execute a single POST request and check the response status.
    async fn try_send(&self, url: &str, body: &serde_json::Value) -> Result<(), ChatDeliveryError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| ChatDeliveryError::Request(e.without_url()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatDeliveryError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Notifier for ChatDelivery {
    async fn notify(&self, notification: &Notification) -> bool {
        let message = render(notification);
        match self.deliver(&message).await {
            Ok(()) => {
                tracing::debug!(
                    recipient_id = notification.recipient_id,
                    method = message.method(),
                    "Notification delivered",
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    recipient_id = notification.recipient_id,
                    error = %e,
                    "Notification delivery failed after all retries",
                );
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
