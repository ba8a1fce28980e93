//! Retry policy: outcome classification and the backoff table.
//!
//! Everything here is pure so it can be exercised without a database or
//! a vendor. The worker calls [`classify`] once per failed attempt and
//! persists whatever [`RetryDecision`] it returns.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Delay before the next attempt, indexed by the attempt that just failed
/// (attempt 1 -> index 0). Attempts past the end reuse the last entry.
pub const BACKOFF_TABLE_SECS: [u64; 3] = [30, 120, 600];

/// Default ceiling on execution attempts for a new task.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

static CONTENT_SAFETY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(nsfw|safety|content[ _-]?policy|moderation|inappropriate)\b")
        .expect("valid regex")
});

static COPYRIGHT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(copyright(ed)?|trademark(ed)?|intellectual[ _-]property)\b")
        .expect("valid regex")
});

static CONSENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(consent|public[ _-]figure|celebrity)\b").expect("valid regex")
});

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

/// Policy reasons that terminate a task without retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    ContentSafety,
    Copyright,
    ConsentRequired,
}

impl BlockReason {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockReason::ContentSafety => "content_safety",
            BlockReason::Copyright => "copyright",
            BlockReason::ConsentRequired => "consent_required",
        }
    }
}

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network or vendor hiccup; retried while attempts remain.
    Transient,
    /// Unknown task type, malformed payload, missing handler. Never retried.
    Permanent,
    /// Content, copyright or consent policy. Never retried.
    Blocked(BlockReason),
}

impl ErrorKind {
    /// Classify a raw error text by matching it against the policy markers.
    ///
    /// Anything that matches no marker is [`ErrorKind::Transient`].
    pub fn from_detail(detail: &str) -> Self {
        if CONTENT_SAFETY_RE.is_match(detail) {
            ErrorKind::Blocked(BlockReason::ContentSafety)
        } else if COPYRIGHT_RE.is_match(detail) {
            ErrorKind::Blocked(BlockReason::Copyright)
        } else if CONSENT_RE.is_match(detail) {
            ErrorKind::Blocked(BlockReason::ConsentRequired)
        } else {
            ErrorKind::Transient
        }
    }

    /// Resolve the kind for a failed outcome.
    ///
    /// An explicit kind reported by the handler wins, except that a
    /// `Transient` report is still checked against the policy markers
    /// since vendors often surface moderation as a generic error.
    pub fn resolve(reported: Option<ErrorKind>, detail: &str) -> Self {
        match reported {
            Some(ErrorKind::Transient) | None => Self::from_detail(detail),
            Some(kind) => kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// What the scheduler does with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Move to `pending_retry`, eligible again after `delay`.
    Retry { delay: Duration },
    /// Move to `failed`.
    FailTerminal,
    /// Move to `blocked`.
    BlockTerminal(BlockReason),
}

/// Backoff delay after the given (1-based) attempt failed.
pub fn backoff_delay(attempt: i32) -> Duration {
    let index = usize::try_from(attempt.saturating_sub(1))
        .unwrap_or(0)
        .min(BACKOFF_TABLE_SECS.len() - 1);
    Duration::from_secs(BACKOFF_TABLE_SECS[index])
}

/// Decide the fate of an attempt that failed with `kind`.
///
/// `attempt_count` is the value after the increment that preceded the
/// attempt, so the first attempt is `1`.
pub fn classify(attempt_count: i32, max_attempts: i32, kind: ErrorKind) -> RetryDecision {
    match kind {
        ErrorKind::Blocked(reason) => RetryDecision::BlockTerminal(reason),
        ErrorKind::Permanent => RetryDecision::FailTerminal,
        ErrorKind::Transient if attempt_count < max_attempts => RetryDecision::Retry {
            delay: backoff_delay(attempt_count),
        },
        ErrorKind::Transient => RetryDecision::FailTerminal,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
