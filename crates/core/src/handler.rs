//! Capability interface implemented by each external processing service.

use serde::{Deserialize, Serialize};

use crate::retry::ErrorKind;
use crate::task::TaskPayload;

/// Result of one handler invocation.
///
/// Handlers never return `Err`: every vendor or network problem is folded
/// into a failed outcome so the scheduler can classify it uniformly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerOutcome {
    pub success: bool,
    /// Where the result can be fetched, e.g. a CDN URL.
    pub result_locator: Option<String>,
    /// Explicit classification, when the handler knows better than the
    /// error text.
    pub error_kind: Option<ErrorKind>,
    pub error_detail: Option<String>,
}

impl HandlerOutcome {
    pub fn success(result_locator: impl Into<String>) -> Self {
        Self {
            success: true,
            result_locator: Some(result_locator.into()),
            error_kind: None,
            error_detail: None,
        }
    }

    pub fn failure(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            result_locator: None,
            error_kind: Some(kind),
            error_detail: Some(detail.into()),
        }
    }

    /// A failure whose kind is left to the error-text classifier.
    pub fn unclassified(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            result_locator: None,
            error_kind: None,
            error_detail: Some(detail.into()),
        }
    }
}

/// Executes one kind of task against an external service.
#[async_trait::async_trait]
pub trait TaskHandler: Send + Sync {
    async fn execute(&self, payload: &TaskPayload) -> HandlerOutcome;
}
