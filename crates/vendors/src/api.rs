//! REST client for a vendor's processing endpoint.
//!
//! Each vendor exposes a synchronous `POST` that accepts a JSON job and
//! answers with a JSON document containing either an output URL or an
//! error. Vendor-specific fields are left as raw JSON for the handler
//! layer to pick apart.

use std::time::Duration;

/// Default per-request timeout. Generation calls routinely take a minute.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// HTTP client for a single vendor.
pub struct VendorApi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

/// Errors from the vendor REST layer.
#[derive(Debug, thiserror::Error)]
pub enum VendorApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The vendor returned a non-2xx status code.
    #[error("Vendor API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl VendorApi {
    /// Create a client with its own connection pool and the given timeout.
    ///
    /// * `base_url` - e.g. `https://api.vendor.example/v1`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, VendorApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, api_key))
    }

    /// Create a client reusing an existing [`reqwest::Client`] (useful for
    /// connection pooling across vendors).
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a job to `{base_url}/{path}` and return the parsed JSON body.
    pub async fn submit(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, VendorApiError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut request = self.client.post(url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, capturing the body
    /// text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, VendorApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(VendorApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response(
        response: reqwest::Response,
    ) -> Result<serde_json::Value, VendorApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<serde_json::Value>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let api = VendorApi::with_client(reqwest::Client::new(), "http://vendor/v1/", None);
        assert_eq!(api.base_url(), "http://vendor/v1");
    }

    #[test]
    fn api_error_display_includes_status_and_body() {
        let err = VendorApiError::ApiError {
            status: 422,
            body: "nsfw content".into(),
        };
        assert_eq!(err.to_string(), "Vendor API error (422): nsfw content");
    }
}
