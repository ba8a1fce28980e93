//! Task status state machine.
//!
//! Status IDs match the `task_statuses` seed data (1-based SMALLSERIAL).
//! The ids are duplicated from the `db` crate's `TaskStatus` enum because
//! `core` must have zero internal deps.

pub const PENDING: i16 = 1;
pub const PROCESSING: i16 = 2;
pub const PENDING_RETRY: i16 = 3;
pub const COMPLETED: i16 = 4;
pub const FAILED: i16 = 5;
pub const BLOCKED: i16 = 6;

/// Statuses the scheduler may select for execution.
pub const SELECTABLE: [i16; 2] = [PENDING, PENDING_RETRY];

/// Statuses no further transition may leave.
pub const TERMINAL: [i16; 3] = [COMPLETED, FAILED, BLOCKED];

/// Returns the set of valid target status IDs reachable from `from_status`.
pub fn valid_transitions(from_status: i16) -> &'static [i16] {
    match from_status {
        // Pending -> Processing
        PENDING => &[PROCESSING],
        // PendingRetry -> Processing
        PENDING_RETRY => &[PROCESSING],
        // Processing -> Completed, Failed, Blocked, PendingRetry
        PROCESSING => &[COMPLETED, FAILED, BLOCKED, PENDING_RETRY],
        // Terminal states and unknown ids
        _ => &[],
    }
}

/// Check whether a transition from `from` to `to` is valid.
pub fn can_transition(from: i16, to: i16) -> bool {
    valid_transitions(from).contains(&to)
}

/// Validate a state transition, returning an error message for invalid ones.
pub fn validate_transition(from: i16, to: i16) -> Result<(), String> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(format!(
            "Invalid task status transition from {} to {}",
            status_name(from),
            status_name(to)
        ))
    }
}

pub fn is_terminal(status: i16) -> bool {
    TERMINAL.contains(&status)
}

/// Human-readable name for a status ID, used in logs and error messages.
pub fn status_name(status: i16) -> &'static str {
    match status {
        PENDING => "pending",
        PROCESSING => "processing",
        PENDING_RETRY => "pending_retry",
        COMPLETED => "completed",
        FAILED => "failed",
        BLOCKED => "blocked",
        _ => "unknown",
    }
}
