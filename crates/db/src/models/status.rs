//! Status helper enums mapping to SMALLSERIAL/SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Look up a variant by its database status ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Task queue lifecycle status.
    TaskStatus {
        Pending = 1,
        Processing = 2,
        PendingRetry = 3,
        Completed = 4,
        Failed = 5,
        Blocked = 6,
    }
}

impl TaskStatus {
    /// Lower-case name, as stored in `task_statuses.name`.
    pub fn name(self) -> &'static str {
        retouch_core::task_state::status_name(self.id())
    }

    pub fn is_terminal(self) -> bool {
        retouch_core::task_state::is_terminal(self.id())
    }
}

#[cfg(test)]
mod tests {
    use retouch_core::task_state;

    use super::*;

    #[test]
    fn task_status_ids_match_seed_data() {
        assert_eq!(TaskStatus::Pending.id(), 1);
        assert_eq!(TaskStatus::Processing.id(), 2);
        assert_eq!(TaskStatus::PendingRetry.id(), 3);
        assert_eq!(TaskStatus::Completed.id(), 4);
        assert_eq!(TaskStatus::Failed.id(), 5);
        assert_eq!(TaskStatus::Blocked.id(), 6);
    }

    #[test]
    fn task_status_ids_agree_with_core_state_machine() {
        assert_eq!(TaskStatus::Pending.id(), task_state::PENDING);
        assert_eq!(TaskStatus::Processing.id(), task_state::PROCESSING);
        assert_eq!(TaskStatus::PendingRetry.id(), task_state::PENDING_RETRY);
        assert_eq!(TaskStatus::Completed.id(), task_state::COMPLETED);
        assert_eq!(TaskStatus::Failed.id(), task_state::FAILED);
        assert_eq!(TaskStatus::Blocked.id(), task_state::BLOCKED);
    }

    #[test]
    fn from_id_round_trips() {
        for id in 1..=6 {
            assert_eq!(TaskStatus::from_id(id).map(TaskStatus::id), Some(id));
        }
        assert_eq!(TaskStatus::from_id(0), None);
        assert_eq!(TaskStatus::from_id(7), None);
    }

    #[test]
    fn status_into_status_id() {
        let id: StatusId = TaskStatus::Blocked.into();
        assert_eq!(id, 6);
        assert_eq!(TaskStatus::PendingRetry.name(), "pending_retry");
        assert!(TaskStatus::Blocked.is_terminal());
    }
}
