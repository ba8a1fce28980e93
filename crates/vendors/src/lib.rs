//! HTTP handlers for the external image-processing vendors.
//!
//! [`api::VendorApi`] wraps a vendor's REST endpoint; [`handler::VendorHandler`]
//! adapts a [`TaskPayload`](retouch_core::task::TaskPayload) into that
//! vendor's request shape and folds every response into a
//! [`HandlerOutcome`](retouch_core::handler::HandlerOutcome).

pub mod api;
pub mod handler;

pub use api::{VendorApi, VendorApiError};
pub use handler::VendorHandler;
