//! Merging a refetched menu into local state

use std::collections::{HashMap, HashSet};

use crate::config::ConflictPolicy;
use crate::menu::{MenuItem, Section, SectionId};
use crate::reorder::sort_canonical;

use super::guard::VersionGuard;

pub trait ConflictResolver<T>: Send + Sync {
    fn resolve(&self, local: &T, remote: T, guard: &mut VersionGuard) -> T;
}

/// The refetched state replaces local state outright
pub struct LastRefetchWins;

impl<T> ConflictResolver<T> for LastRefetchWins {
    fn resolve(&self, _local: &T, remote: T, _guard: &mut VersionGuard) -> T {
        remote
    }
}

/// Keep the local copy of every section or item the guard still protects
pub struct PendingWritesWin;

impl ConflictResolver<Vec<Section>> for PendingWritesWin {
    fn resolve(
        &self,
        local: &Vec<Section>,
        remote: Vec<Section>,
        guard: &mut VersionGuard,
    ) -> Vec<Section> {
        let local_sections: HashMap<SectionId, &Section> =
            local.iter().map(|s| (s.id, s)).collect();
        let local_items: HashMap<_, &MenuItem> =
            local.iter().flat_map(|s| &s.items).map(|i| (i.id, i)).collect();

        let mut headers: Vec<Section> = Vec::with_capacity(remote.len());
        let mut items: Vec<MenuItem> = Vec::new();
        let mut seen_sections = HashSet::new();
        let mut seen_items = HashSet::new();

        for mut section in remote {
            seen_sections.insert(section.id);
            for item in section.items.drain(..) {
                seen_items.insert(item.id);
                match local_items.get(&item.id) {
                    Some(mine) if guard.prefer_local(item.id, item.updated_at) => {
                        items.push((*mine).clone())
                    }
                    _ => items.push(item),
                }
            }
            match local_sections.get(&section.id) {
                Some(mine) if guard.prefer_local(section.id, section.updated_at) => {
                    headers.push(mine.header())
                }
                _ => headers.push(section),
            }
        }

        // Local rows the store has not seen yet
        for section in local {
            if !seen_sections.contains(&section.id) && guard.prefer_local(section.id, None) {
                headers.push(section.header());
            }
            for item in &section.items {
                if !seen_items.contains(&item.id) && guard.prefer_local(item.id, None) {
                    items.push(item.clone());
                }
            }
        }

        let mut by_section: HashMap<SectionId, Vec<MenuItem>> = HashMap::new();
        for item in items {
            by_section.entry(item.section_id).or_default().push(item);
        }

        for section in &mut headers {
            section.items = by_section.remove(&section.id).unwrap_or_default();
            sort_canonical(&mut section.items);
        }
        for (section_id, orphans) in by_section {
            log::debug!("Dropping {} items of missing section {}", orphans.len(), section_id);
        }

        sort_canonical(&mut headers);
        headers
    }
}

pub fn resolver_for(policy: ConflictPolicy) -> Box<dyn ConflictResolver<Vec<Section>>> {
    match policy {
        ConflictPolicy::LastRefetchWins => Box::new(LastRefetchWins),
        ConflictPolicy::PendingWritesWin => Box::new(PendingWritesWin),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::ItemDraft;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn menu() -> Vec<Section> {
        let restaurant_id = Uuid::new_v4();
        let mut starters = Section::new(restaurant_id, "Starters", 0).unwrap();
        for (i, name) in ["Soup", "Salad"].iter().enumerate() {
            let draft = ItemDraft { name: name.to_string(), ..ItemDraft::default() };
            starters
                .items
                .push(MenuItem::from_draft(starters.id, draft, i as i32).unwrap());
        }
        let mains = Section::new(restaurant_id, "Mains", 1).unwrap();
        vec![starters, mains]
    }

    #[test]
    fn test_last_refetch_wins() {
        let local = menu();
        let mut remote = local.clone();
        remote[0].name = "Small Plates".into();

        let mut guard = VersionGuard::new();
        guard.hold(local[0].id);

        let merged = LastRefetchWins.resolve(&local, remote.clone(), &mut guard);
        assert_eq!(merged, remote);
    }

    #[test]
    fn test_pending_item_edit_survives_refetch() {
        let mut local = menu();
        local[0].items[0].price = 7.5;
        let soup = local[0].items[0].id;

        let mut remote = local.clone();
        remote[0].items[0].price = 0.0;
        remote[0].items[1].name = "Greek Salad".into();

        let mut guard = VersionGuard::new();
        guard.hold(soup);

        let merged = PendingWritesWin.resolve(&local, remote, &mut guard);
        assert_eq!(merged[0].items[0].price, 7.5);
        assert_eq!(merged[0].items[1].name, "Greek Salad");
    }

    #[test]
    fn test_resolved_write_takes_remote() {
        let mut local = menu();
        local[0].items[0].price = 7.5;
        let soup = local[0].items[0].id;

        let mut remote = local.clone();
        remote[0].items[0].price = 9.0;
        remote[0].items[0].updated_at = Some(Utc::now() + Duration::seconds(1));

        let mut guard = VersionGuard::new();
        guard.hold(soup);
        guard.release(soup);

        let merged = PendingWritesWin.resolve(&local, remote, &mut guard);
        assert_eq!(merged[0].items[0].price, 9.0);
        assert!(guard.is_empty());
    }

    #[test]
    fn test_pending_move_keeps_local_container() {
        let mut local = menu();
        let salad = local[0].items.remove(1);
        let mains_id = local[1].id;
        let mut moved = salad.clone();
        moved.section_id = mains_id;
        moved.position = 0;
        local[1].items.push(moved);

        // Remote still has the salad under starters
        let mut remote = local.clone();
        remote[1].items.clear();
        remote[0].items.push(salad.clone());

        let mut guard = VersionGuard::new();
        guard.hold(salad.id);

        let merged = PendingWritesWin.resolve(&local, remote, &mut guard);
        assert_eq!(merged[0].items.len(), 1);
        assert_eq!(merged[1].items[0].id, salad.id);
    }

    #[test]
    fn test_unsynced_local_section_is_kept_until_resolved() {
        let mut local = menu();
        let remote = local.clone();
        let fresh = Section::new(local[0].restaurant_id, "Desserts", 2).unwrap();
        local.push(fresh.clone());

        let mut guard = VersionGuard::new();
        guard.hold(fresh.id);
        let merged = PendingWritesWin.resolve(&local, remote.clone(), &mut guard);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[2].id, fresh.id);

        // Once resolved, a refetch without the row removes it
        guard.release(fresh.id);
        let merged = PendingWritesWin.resolve(&local, remote, &mut guard);
        assert_eq!(merged.len(), 2);
    }
}
