//! [`TaskHandler`] implementation backed by a vendor REST endpoint.

use std::sync::Arc;

use retouch_core::handler::{HandlerOutcome, TaskHandler};
use retouch_core::retry::ErrorKind;
use retouch_core::task::TaskPayload;
use serde_json::{json, Value};

use crate::api::{VendorApi, VendorApiError};

/// Top-level response keys that may carry the result URL, in priority order.
const LOCATOR_KEYS: [&str; 4] = ["output_url", "result_url", "url", "image_url"];

/// Executes tasks by posting them to one vendor endpoint.
pub struct VendorHandler {
    api: Arc<VendorApi>,
    endpoint: String,
}

impl VendorHandler {
    /// * `endpoint` - path below the vendor's base URL, e.g. `restore`.
    pub fn new(api: Arc<VendorApi>, endpoint: impl Into<String>) -> Self {
        Self {
            api,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait::async_trait]
impl TaskHandler for VendorHandler {
    async fn execute(&self, payload: &TaskPayload) -> HandlerOutcome {
        let body = request_body(payload);
        tracing::debug!(
            endpoint = %self.endpoint,
            kind = %payload.kind(),
            "Submitting task to vendor",
        );

        match self.api.submit(&self.endpoint, &body).await {
            Ok(response) => outcome_from_response(&response),
            Err(e) => outcome_from_error(&e),
        }
    }
}

/// Shape a payload into the JSON body the vendor expects.
pub fn request_body(payload: &TaskPayload) -> Value {
    match payload {
        TaskPayload::Restore(p) => json!({
            "image_url": p.source_url,
            "colorize": p.colorize,
            "upscale": p.upscale.unwrap_or(1),
        }),
        TaskPayload::Stylize(p) => {
            let mut body = json!({
                "image_url": p.source_url,
                "style": p.style,
            });
            if let Some(strength) = p.strength {
                body["strength"] = json!(strength);
            }
            body
        }
        TaskPayload::EraStyle(p) => json!({
            "image_url": p.source_url,
            "style": "era",
            "era": p.era,
        }),
        TaskPayload::Generate(p) => {
            let mut body = json!({ "prompt": p.prompt });
            if let Some(negative) = &p.negative_prompt {
                body["negative_prompt"] = json!(negative);
            }
            if let Some(width) = p.width {
                body["width"] = json!(width);
            }
            if let Some(height) = p.height {
                body["height"] = json!(height);
            }
            if let Some(reference) = &p.reference_url {
                body["image_url"] = json!(reference);
            }
            body
        }
    }
}

/// Pull the result URL out of a vendor response.
///
/// Checks the known top-level keys, then `output` as either a string or
/// the first element of an array.
pub fn extract_locator(response: &Value) -> Option<String> {
    LOCATOR_KEYS
        .iter()
        .filter_map(|key| response.get(*key))
        .chain(response.get("output").and_then(|o| match o {
            Value::Array(items) => items.first(),
            other => Some(other),
        }))
        .find_map(|v| v.as_str().filter(|s| !s.is_empty()).map(str::to_string))
}

/// Pull an error description out of a 2xx response that reports failure.
fn extract_error(response: &Value) -> Option<String> {
    let error = response.get("error")?;
    match error {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => {
            let code = obj.get("code").and_then(Value::as_str);
            let message = obj.get("message").and_then(Value::as_str);
            match (code, message) {
                (Some(code), Some(message)) => Some(format!("{code}: {message}")),
                (Some(text), None) | (None, Some(text)) => Some(text.to_string()),
                (None, None) => Some(error.to_string()),
            }
        }
        other => Some(other.to_string()),
    }
}

fn outcome_from_response(response: &Value) -> HandlerOutcome {
    if let Some(error) = extract_error(response) {
        return HandlerOutcome::unclassified(error);
    }
    match extract_locator(response) {
        Some(locator) => HandlerOutcome::success(locator),
        None => HandlerOutcome::failure(
            ErrorKind::Transient,
            "Vendor response did not include a result URL",
        ),
    }
}

fn outcome_from_error(error: &VendorApiError) -> HandlerOutcome {
    tracing::warn!(error = %error, "Vendor call failed");
    match error {
        // Policy markers in the body decide between block and retry.
        VendorApiError::ApiError { .. } => HandlerOutcome::unclassified(error.to_string()),
        VendorApiError::Request(_) => HandlerOutcome::failure(ErrorKind::Transient, error.to_string()),
    }
}
