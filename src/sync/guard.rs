//! Per-entity write marks
//!
//! Every local write holds a mark on the entity it touches for as long as
//! the write is pending. A mark remembers when the newest local write was
//! issued, so a refetched row stamped earlier than that is known to predate
//! the local edit.
//!
//! A resolved mark lives until a refetch shows the store has caught up, or
//! until `prune` finds its entity gone from the menu. Deleting an entity
//! forgets its mark. The map therefore holds at most one mark per row of
//! the loaded menu plus the writes still in flight.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct WriteMark {
    issued_at: DateTime<Utc>,
    in_flight: usize,
}

/// Tracks which entities have local writes newer than the store's copy
#[derive(Debug, Default)]
pub struct VersionGuard {
    marks: HashMap<Uuid, WriteMark>,
}

impl VersionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a local write to `id` that has not been confirmed yet
    pub fn hold(&mut self, id: Uuid) {
        self.hold_at(id, Utc::now());
    }

    fn hold_at(&mut self, id: Uuid, now: DateTime<Utc>) {
        let mark = self.marks.entry(id).or_insert(WriteMark {
            issued_at: now,
            in_flight: 0,
        });
        mark.issued_at = mark.issued_at.max(now);
        mark.in_flight += 1;
    }

    /// The write held by a matching `hold` has resolved
    pub fn release(&mut self, id: Uuid) {
        if let Some(mark) = self.marks.get_mut(&id) {
            mark.in_flight = mark.in_flight.saturating_sub(1);
        }
    }

    /// Stop protecting `id`; the next refetch takes the store's copy
    pub fn forget(&mut self, id: Uuid) {
        self.marks.remove(&id);
    }

    /// Decide whether the local copy of `id` should survive a refetch.
    ///
    /// Local wins while a write is pending or when the remote row was last
    /// written before the newest local write was issued. Otherwise the
    /// store has caught up and the mark is dropped.
    pub fn prefer_local(&mut self, id: Uuid, remote_updated_at: Option<DateTime<Utc>>) -> bool {
        let mark = match self.marks.get(&id) {
            Some(mark) => *mark,
            None => return false,
        };

        if mark.in_flight > 0 {
            return true;
        }

        match remote_updated_at {
            Some(remote) if remote < mark.issued_at => true,
            _ => {
                self.marks.remove(&id);
                false
            }
        }
    }

    /// Drop resolved marks of entities that are not in `live`
    pub fn prune(&mut self, live: &HashSet<Uuid>) {
        self.marks.retain(|id, mark| mark.in_flight > 0 || live.contains(id));
    }

    pub fn is_pending(&self, id: Uuid) -> bool {
        self.marks.get(&id).map_or(false, |m| m.in_flight > 0)
    }

    /// Number of entities currently marked
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_unmarked_entities_take_remote() {
        let mut guard = VersionGuard::new();
        assert!(!guard.prefer_local(Uuid::new_v4(), Some(Utc::now())));
    }

    #[test]
    fn test_pending_write_wins() {
        let mut guard = VersionGuard::new();
        let id = Uuid::new_v4();
        guard.hold(id);

        assert!(guard.is_pending(id));
        assert!(guard.prefer_local(id, Some(Utc::now() + Duration::hours(1))));
        assert!(guard.prefer_local(id, None));
    }

    #[test]
    fn test_stale_remote_loses_after_release() {
        let mut guard = VersionGuard::new();
        let id = Uuid::new_v4();
        let issued = Utc::now();
        guard.hold_at(id, issued);
        guard.release(id);

        assert!(!guard.is_pending(id));
        assert!(guard.prefer_local(id, Some(issued - Duration::seconds(1))));
        assert_eq!(guard.len(), 1);

        // Store caught up: remote wins and the mark is gone
        assert!(!guard.prefer_local(id, Some(issued + Duration::milliseconds(5))));
        assert!(guard.is_empty());
    }

    #[test]
    fn test_unstamped_remote_clears_resolved_mark() {
        let mut guard = VersionGuard::new();
        let id = Uuid::new_v4();
        guard.hold(id);
        guard.release(id);
        assert!(!guard.prefer_local(id, None));
        assert!(guard.is_empty());
    }

    #[test]
    fn test_overlapping_holds() {
        let mut guard = VersionGuard::new();
        let id = Uuid::new_v4();
        guard.hold(id);
        guard.hold(id);
        guard.release(id);
        assert!(guard.is_pending(id));
        guard.release(id);
        assert!(!guard.is_pending(id));

        guard.forget(id);
        assert!(guard.is_empty());
    }

    #[test]
    fn test_prune_keeps_live_and_pending_marks() {
        let mut guard = VersionGuard::new();
        let (live, gone, in_flight) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        for id in [live, gone, in_flight] {
            guard.hold(id);
        }
        guard.release(live);
        guard.release(gone);

        guard.prune(&HashSet::from([live]));
        assert_eq!(guard.len(), 2);
        assert!(guard.is_pending(in_flight));
        // A stale refetch no longer protects the pruned row
        assert!(!guard.prefer_local(gone, Some(Utc::now() - Duration::hours(1))));
    }
}
