//! User notification delivery for terminal task outcomes.
//!
//! - [`templates`]: renders a [`Notification`](retouch_core::notify::Notification)
//!   into the outgoing chat message.
//! - [`delivery`]: delivery channels implementing
//!   [`Notifier`](retouch_core::notify::Notifier): the chat bot, and a
//!   log-only fallback for deployments without a bot token.

pub mod delivery;
pub mod templates;

pub use delivery::chat::{ChatConfig, ChatDelivery};
pub use delivery::log::LogNotifier;
