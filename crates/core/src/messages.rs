//! User-facing messages for task outcomes.
//!
//! Raw vendor errors are kept in `tasks.error_message` for diagnostics;
//! users only ever see the friendly text produced here.

use crate::retry::{BlockReason, ErrorKind};
use crate::task::TaskKind;

/// Short noun phrase for a task kind, e.g. "photo restoration".
pub fn task_label(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::Restore => "photo restoration",
        TaskKind::Stylize => "stylization",
        TaskKind::EraStyle => "era portrait",
        TaskKind::Generate => "image generation",
    }
}

/// Friendly explanation for a policy block.
pub fn block_message(reason: BlockReason) -> &'static str {
    match reason {
        BlockReason::ContentSafety => {
            "This image can't be processed because it doesn't meet our content guidelines."
        }
        BlockReason::Copyright => {
            "This request appears to include copyrighted material, so we can't process it."
        }
        BlockReason::ConsentRequired => {
            "This photo shows a person who needs to give consent before it can be processed."
        }
    }
}

/// Translate a failed outcome into the message shown to the user.
///
/// `kind` is `None` when the stored task type is not recognised.
pub fn failure_message(kind: Option<TaskKind>, error: ErrorKind) -> String {
    match error {
        ErrorKind::Blocked(reason) => block_message(reason).to_string(),
        ErrorKind::Permanent => {
            "We couldn't read this request. Please submit it again.".to_string()
        }
        ErrorKind::Transient => match kind {
            Some(kind) => format!(
                "Your {} couldn't be completed right now. You have not been charged.",
                task_label(kind)
            ),
            None => {
                "Your request couldn't be completed right now. You have not been charged."
                    .to_string()
            }
        },
    }
}

/// Message sent together with the result locator on success.
pub fn success_message(kind: TaskKind) -> String {
    let label = task_label(kind);
    let mut chars = label.chars();
    let capitalised = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    format!("{capitalised} is ready!")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_messages_do_not_leak_raw_reason() {
        let msg = failure_message(
            Some(TaskKind::Stylize),
            ErrorKind::Blocked(BlockReason::ContentSafety),
        );
        assert_eq!(msg, block_message(BlockReason::ContentSafety));
        assert!(!msg.contains("content_safety"));
    }

    #[test]
    fn transient_failure_names_the_task() {
        let msg = failure_message(Some(TaskKind::Restore), ErrorKind::Transient);
        assert!(msg.contains("photo restoration"));
        assert!(msg.contains("not been charged"));
    }

    #[test]
    fn unknown_kind_gets_generic_text() {
        let msg = failure_message(None, ErrorKind::Transient);
        assert!(msg.starts_with("Your request"));
    }

    #[test]
    fn success_message_is_capitalised() {
        assert_eq!(success_message(TaskKind::Generate), "Image generation is ready!");
        assert_eq!(success_message(TaskKind::EraStyle), "Era portrait is ready!");
    }
}
