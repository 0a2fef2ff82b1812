//! Deduplication of concurrent end-event submissions.
//!
//! The guard is the only per-robot mutual exclusion in the core, and it
//! covers exactly one operation kind: ending the dynamic event phase.
//! Membership is held through an RAII permit so the key is released on
//! every exit path.

use crate::store::robot_key;
use dashmap::DashSet;

/// Set of `(fleet, robot)` keys with an end goal currently in flight.
#[derive(Default)]
pub struct EndEventGuard {
    active: DashSet<String>,
}

/// Holds the guard entry for one end submission; dropping it releases
/// the key.
pub struct EndEventPermit<'a> {
    guard: &'a EndEventGuard,
    key: String,
}

impl Drop for EndEventPermit<'_> {
    fn drop(&mut self) {
        self.guard.active.remove(&self.key);
    }
}

impl EndEventGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the key for `(fleet, robot)`. Returns `None` when an end
    /// goal is already in flight for that robot.
    pub fn try_acquire(&self, fleet: &str, robot: &str) -> Option<EndEventPermit<'_>> {
        let key = robot_key(fleet, robot);
        if self.active.insert(key.clone()) {
            Some(EndEventPermit { guard: self, key })
        } else {
            None
        }
    }

    pub fn is_held(&self, fleet: &str, robot: &str) -> bool {
        self.active.contains(&robot_key(fleet, robot))
    }
}
