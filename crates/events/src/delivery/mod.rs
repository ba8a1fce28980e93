//! Delivery channels for task outcome notifications.

pub mod chat;
pub mod log;
