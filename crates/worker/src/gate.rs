//! Concurrency gate: counting admission control for task executions.
//!
//! The set of admitted task ids is the only in-memory state shared between
//! the scheduler loop and running executions. It lives behind a single
//! mutex; the in-flight count is its length.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use retouch_core::types::DbId;

/// Default cap on simultaneous executions.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Why a task could not be admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AdmitError {
    #[error("concurrency limit reached")]
    Full,
    #[error("task is already running")]
    AlreadyRunning,
}

/// Bounds the number of tasks executing at once.
#[derive(Debug)]
pub struct ConcurrencyGate {
    max_concurrent: usize,
    running: Arc<Mutex<HashSet<DbId>>>,
}

impl ConcurrencyGate {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Admit `task_id` if there is a free slot and it is not already
    /// running. The slot is held until the returned permit is dropped.
    pub fn try_admit(&self, task_id: DbId) -> Result<GatePermit, AdmitError> {
        let mut running = lock(&self.running);
        if running.contains(&task_id) {
            return Err(AdmitError::AlreadyRunning);
        }
        if running.len() >= self.max_concurrent {
            return Err(AdmitError::Full);
        }
        running.insert(task_id);
        Ok(GatePermit {
            task_id,
            running: Arc::clone(&self.running),
        })
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.running).len()
    }

    pub fn free_capacity(&self) -> usize {
        self.max_concurrent.saturating_sub(self.in_flight())
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn is_running(&self, task_id: DbId) -> bool {
        lock(&self.running).contains(&task_id)
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT)
    }
}

/// A held execution slot. Releases the slot on drop, including when the
/// execution unwinds.
#[derive(Debug)]
pub struct GatePermit {
    task_id: DbId,
    running: Arc<Mutex<HashSet<DbId>>>,
}

impl GatePermit {
    pub fn task_id(&self) -> DbId {
        self.task_id
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        lock(&self.running).remove(&self.task_id);
    }
}

// A panic while holding the lock cannot leave the set inconsistent, so a
// poisoned mutex is still safe to use.
fn lock(running: &Mutex<HashSet<DbId>>) -> MutexGuard<'_, HashSet<DbId>> {
    running.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn admits_up_to_max() {
        let gate = ConcurrencyGate::new(2);
        let a = gate.try_admit(1).unwrap();
        let _b = gate.try_admit(2).unwrap();
        assert_eq!(gate.try_admit(3).unwrap_err(), AdmitError::Full);
        assert_eq!(gate.in_flight(), 2);
        assert_eq!(gate.free_capacity(), 0);

        drop(a);
        assert_eq!(gate.free_capacity(), 1);
        assert!(gate.try_admit(3).is_ok());
    }

    #[test]
    fn rejects_duplicate_task_id() {
        let gate = ConcurrencyGate::new(3);
        let permit = gate.try_admit(7).unwrap();
        assert_eq!(permit.task_id(), 7);
        assert_eq!(gate.try_admit(7).unwrap_err(), AdmitError::AlreadyRunning);
        assert!(gate.is_running(7));
        drop(permit);
        assert!(!gate.is_running(7));
    }

    #[test]
    fn permit_released_on_panic() {
        let gate = Arc::new(ConcurrencyGate::new(1));
        let g = Arc::clone(&gate);
        let result = thread::spawn(move || {
            let _permit = g.try_admit(1).unwrap();
            panic!("handler blew up");
        })
        .join();

        assert!(result.is_err());
        assert_eq!(gate.in_flight(), 0);
        assert!(gate.try_admit(1).is_ok());
    }

    #[test]
    fn in_flight_never_exceeds_max_under_contention() {
        let gate = Arc::new(ConcurrencyGate::new(3));
        let peak = Arc::new(Mutex::new(0usize));

        let handles: Vec<_> = (0..16)
            .map(|worker| {
                let gate = Arc::clone(&gate);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    for round in 0..200 {
                        let id = worker * 1000 + round;
                        if let Ok(permit) = gate.try_admit(id) {
                            let now = gate.in_flight();
                            let mut p = peak.lock().unwrap();
                            *p = (*p).max(now);
                            drop(p);
                            drop(permit);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert!(*peak.lock().unwrap() <= 3);
        assert_eq!(gate.in_flight(), 0);
    }
}
