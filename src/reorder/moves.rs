//! Single-element list moves and the position writes they imply

use uuid::Uuid;

use super::{Contained, PositionUpdate, Positioned, ReorderError, ReorderPolicy};

/// A list after a move, with the writes that persist it
#[derive(Clone, Debug, PartialEq)]
pub struct MoveOutcome<T> {
    pub list: Vec<T>,
    pub updates: Vec<PositionUpdate>,
}

impl<T> MoveOutcome<T> {
    pub fn is_noop(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Both lists after an element crossed between containers
#[derive(Clone, Debug, PartialEq)]
pub struct CrossMoveOutcome<T> {
    pub source: Vec<T>,
    pub destination: Vec<T>,
    pub updates: Vec<PositionUpdate>,
    /// True when source and destination were the same container
    pub same_container: bool,
}

fn check_index(index: usize, len: usize) -> Result<(), ReorderError> {
    if index >= len {
        return Err(ReorderError::IndexOutOfBounds { index, len });
    }
    Ok(())
}

/// Give every element its index as position and collect the writes the
/// policy asks for. `span` is the inclusive index range touched by the move.
fn renumber<T: Positioned>(
    list: &mut [T],
    policy: ReorderPolicy,
    span: Option<(usize, usize)>,
) -> Vec<PositionUpdate> {
    let mut updates = Vec::new();

    for (index, element) in list.iter_mut().enumerate() {
        let target = index as i32;
        let changed = element.position() != target;
        let in_span = span.map_or(false, |(lo, hi)| index >= lo && index <= hi);

        let include = match policy {
            ReorderPolicy::FullRewrite => true,
            ReorderPolicy::AffectedRange => in_span || changed,
            ReorderPolicy::ChangedOnly => changed,
        };

        element.set_position(target);
        if include {
            updates.push(PositionUpdate {
                id: element.id(),
                position: target,
                container_id: None,
            });
        }
    }

    updates
}

/// Move the element at `source` so that it ends up at `destination`.
///
/// This is a remove-then-insert, not a swap: the elements between the two
/// indices shift by one and everything else keeps its relative order.
/// Moving an element onto its own index returns the list unchanged and no
/// writes.
pub fn apply_move<T: Positioned>(
    list: &[T],
    source: usize,
    destination: usize,
    policy: ReorderPolicy,
) -> Result<MoveOutcome<T>, ReorderError> {
    check_index(source, list.len())?;
    check_index(destination, list.len())?;

    if source == destination {
        return Ok(MoveOutcome {
            list: list.to_vec(),
            updates: Vec::new(),
        });
    }

    let mut moved = list.to_vec();
    let element = moved.remove(source);
    moved.insert(destination, element);

    let span = (source.min(destination), source.max(destination));
    let updates = renumber(&mut moved, policy, Some(span));

    Ok(MoveOutcome { list: moved, updates })
}

/// Move an element from one container's list into another's.
///
/// The moved element takes `destination_container` as its container and its
/// write carries the new container together with the new position. When the
/// element already belongs to `destination_container` this is the
/// single-list move applied to `source_list`, and `destination_list` is
/// ignored.
pub fn apply_cross_container_move<T: Contained>(
    source_list: &[T],
    destination_list: &[T],
    source: usize,
    destination: usize,
    destination_container: Uuid,
    policy: ReorderPolicy,
) -> Result<CrossMoveOutcome<T>, ReorderError> {
    check_index(source, source_list.len())?;

    if source_list[source].container_id() == destination_container {
        let outcome = apply_move(source_list, source, destination, policy)?;
        return Ok(CrossMoveOutcome {
            source: outcome.list.clone(),
            destination: outcome.list,
            updates: outcome.updates,
            same_container: true,
        });
    }

    // Dropping past the last element appends
    if destination > destination_list.len() {
        return Err(ReorderError::IndexOutOfBounds {
            index: destination,
            len: destination_list.len(),
        });
    }

    let mut remaining = source_list.to_vec();
    let mut element = remaining.remove(source);
    element.set_container_id(destination_container);
    let moved_id = element.id();

    let mut receiving = destination_list.to_vec();
    receiving.insert(destination, element);

    let mut updates = Vec::new();
    if !remaining.is_empty() {
        let span = (source.min(remaining.len() - 1), remaining.len() - 1);
        updates.extend(renumber(&mut remaining, policy, Some(span)));
    }

    let span = (destination, receiving.len() - 1);
    let mut receiving_updates = renumber(&mut receiving, policy, Some(span));

    // The moved element always persists its new container, even when its
    // index happens to equal its old position.
    match receiving_updates.iter_mut().find(|u| u.id == moved_id) {
        Some(update) => update.container_id = Some(destination_container),
        None => receiving_updates.push(PositionUpdate {
            id: moved_id,
            position: destination as i32,
            container_id: Some(destination_container),
        }),
    }
    updates.extend(receiving_updates);

    Ok(CrossMoveOutcome {
        source: remaining,
        destination: receiving,
        updates,
        same_container: false,
    })
}

/// Renumber a list in its current order and return the writes needed for
/// the store to match. A list whose positions already read `0..n` yields
/// nothing.
pub fn reconcile_positions<T: Positioned>(list: &mut [T]) -> Vec<PositionUpdate> {
    renumber(list, ReorderPolicy::ChangedOnly, None)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::super::test_support::*;
    use super::super::is_dense;
    use super::*;

    const ALL_POLICIES: [ReorderPolicy; 3] = [
        ReorderPolicy::FullRewrite,
        ReorderPolicy::AffectedRange,
        ReorderPolicy::ChangedOnly,
    ];

    fn positions_by_label(list: &[Card]) -> HashMap<&'static str, i32> {
        list.iter().map(|c| (c.label, c.position)).collect()
    }

    fn updated_ids(updates: &[PositionUpdate]) -> Vec<Uuid> {
        updates.iter().map(|u| u.id).collect()
    }

    #[test]
    fn test_move_forward() {
        let list = cards(Uuid::new_v4(), &["A", "B", "C", "D"]);
        let outcome = apply_move(&list, 0, 2, ReorderPolicy::ChangedOnly).unwrap();

        assert_eq!(labels(&outcome.list), vec!["B", "C", "A", "D"]);
        let positions = positions_by_label(&outcome.list);
        assert_eq!(positions["B"], 0);
        assert_eq!(positions["C"], 1);
        assert_eq!(positions["A"], 2);
        assert_eq!(positions["D"], 3);

        // D keeps its position, so only the span is written
        assert_eq!(outcome.updates.len(), 3);
        assert!(!updated_ids(&outcome.updates).contains(&list[3].id));
    }

    #[test]
    fn test_move_backward() {
        let list = cards(Uuid::new_v4(), &["A", "B", "C"]);
        let outcome = apply_move(&list, 2, 0, ReorderPolicy::ChangedOnly).unwrap();
        assert_eq!(labels(&outcome.list), vec!["C", "A", "B"]);
        assert!(is_dense(&outcome.list));
    }

    #[test]
    fn test_move_onto_self_is_noop() {
        let list = cards(Uuid::new_v4(), &["A", "B", "C"]);
        for policy in ALL_POLICIES {
            let outcome = apply_move(&list, 1, 1, policy).unwrap();
            assert_eq!(outcome.list, list);
            assert!(outcome.is_noop());
        }
    }

    #[test]
    fn test_move_preserves_elements_and_density() {
        let list = cards(Uuid::new_v4(), &["A", "B", "C", "D", "E"]);
        for policy in ALL_POLICIES {
            for source in 0..list.len() {
                for destination in 0..list.len() {
                    let outcome = apply_move(&list, source, destination, policy).unwrap();
                    assert_eq!(outcome.list.len(), list.len());

                    let mut before: Vec<Uuid> = list.iter().map(|c| c.id).collect();
                    let mut after: Vec<Uuid> = outcome.list.iter().map(|c| c.id).collect();
                    before.sort();
                    after.sort();
                    assert_eq!(before, after);

                    assert!(is_dense(&outcome.list));

                    // The writes bring a store holding the old positions to the new ones
                    let mut remote: HashMap<Uuid, i32> =
                        list.iter().map(|c| (c.id, c.position)).collect();
                    for update in &outcome.updates {
                        remote.insert(update.id, update.position);
                    }
                    for card in &outcome.list {
                        assert_eq!(remote[&card.id], card.position);
                    }
                }
            }
        }
    }

    #[test]
    fn test_full_rewrite_writes_every_sibling() {
        let list = cards(Uuid::new_v4(), &["A", "B", "C", "D"]);
        let outcome = apply_move(&list, 0, 1, ReorderPolicy::FullRewrite).unwrap();
        assert_eq!(outcome.updates.len(), 4);
    }

    #[test]
    fn test_affected_range_writes_span() {
        let list = cards(Uuid::new_v4(), &["A", "B", "C", "D", "E"]);
        let outcome = apply_move(&list, 1, 3, ReorderPolicy::AffectedRange).unwrap();
        assert_eq!(labels(&outcome.list), vec!["A", "C", "D", "B", "E"]);

        let written = updated_ids(&outcome.updates);
        assert_eq!(written.len(), 3);
        assert!(!written.contains(&list[0].id));
        assert!(!written.contains(&list[4].id));
    }

    #[test]
    fn test_move_repairs_sparse_positions() {
        let mut list = cards(Uuid::new_v4(), &["A", "B", "C", "D"]);
        list[3].position = 10;

        let outcome = apply_move(&list, 0, 1, ReorderPolicy::AffectedRange).unwrap();
        assert!(is_dense(&outcome.list));
        assert!(updated_ids(&outcome.updates).contains(&list[3].id));
    }

    #[test]
    fn test_move_out_of_bounds() {
        let list = cards(Uuid::new_v4(), &["A", "B"]);
        assert_eq!(
            apply_move(&list, 2, 0, ReorderPolicy::ChangedOnly),
            Err(ReorderError::IndexOutOfBounds { index: 2, len: 2 })
        );
        assert_eq!(
            apply_move(&list, 0, 2, ReorderPolicy::ChangedOnly),
            Err(ReorderError::IndexOutOfBounds { index: 2, len: 2 })
        );

        let empty: Vec<Card> = Vec::new();
        assert!(apply_move(&empty, 0, 0, ReorderPolicy::ChangedOnly).is_err());
    }

    #[test]
    fn test_cross_container_move() {
        let left = Uuid::new_v4();
        let right = Uuid::new_v4();
        let source = cards(left, &["A", "B"]);
        let destination = cards(right, &["X", "Y"]);

        for policy in ALL_POLICIES {
            let outcome =
                apply_cross_container_move(&source, &destination, 0, 1, right, policy).unwrap();

            assert!(!outcome.same_container);
            assert_eq!(labels(&outcome.source), vec!["B"]);
            assert_eq!(labels(&outcome.destination), vec!["X", "A", "Y"]);
            assert_eq!(positions_by_label(&outcome.source)["B"], 0);

            let positions = positions_by_label(&outcome.destination);
            assert_eq!(positions["X"], 0);
            assert_eq!(positions["A"], 1);
            assert_eq!(positions["Y"], 2);
            assert_eq!(outcome.destination[1].container, right);

            let moved: Vec<&PositionUpdate> = outcome
                .updates
                .iter()
                .filter(|u| u.id == source[0].id)
                .collect();
            assert_eq!(moved.len(), 1);
            assert_eq!(moved[0].position, 1);
            assert_eq!(moved[0].container_id, Some(right));

            // Only the moved element changes container
            assert!(outcome
                .updates
                .iter()
                .filter(|u| u.id != source[0].id)
                .all(|u| u.container_id.is_none()));
        }
    }

    #[test]
    fn test_cross_container_move_of_only_element() {
        let left = Uuid::new_v4();
        let right = Uuid::new_v4();
        let source = cards(left, &["A"]);
        let destination = cards(right, &["X"]);

        let outcome = apply_cross_container_move(
            &source,
            &destination,
            0,
            0,
            right,
            ReorderPolicy::ChangedOnly,
        )
        .unwrap();

        assert!(outcome.source.is_empty());
        assert_eq!(labels(&outcome.destination), vec!["A", "X"]);
        // A and X are written; nothing is written for the emptied source
        assert_eq!(outcome.updates.len(), 2);
    }

    #[test]
    fn test_cross_container_move_into_empty_container() {
        let left = Uuid::new_v4();
        let right = Uuid::new_v4();
        let source = cards(left, &["A", "B"]);
        let destination: Vec<Card> = Vec::new();

        let outcome = apply_cross_container_move(
            &source,
            &destination,
            1,
            0,
            right,
            ReorderPolicy::ChangedOnly,
        )
        .unwrap();

        assert_eq!(labels(&outcome.source), vec!["A"]);
        assert_eq!(labels(&outcome.destination), vec!["B"]);
        // B lands on position 0 after holding position 1; A is untouched
        assert_eq!(
            outcome.updates,
            vec![PositionUpdate {
                id: source[1].id,
                position: 0,
                container_id: Some(right),
            }]
        );
    }

    #[test]
    fn test_cross_container_move_keeps_container_write_at_same_position() {
        let left = Uuid::new_v4();
        let right = Uuid::new_v4();
        let source = cards(left, &["A", "B"]);
        let destination = cards(right, &["X"]);

        // B sits at position 1 and lands at index 1: position is unchanged
        // but the container write must still go out.
        let outcome = apply_cross_container_move(
            &source,
            &destination,
            1,
            1,
            right,
            ReorderPolicy::ChangedOnly,
        )
        .unwrap();

        assert_eq!(
            outcome.updates,
            vec![PositionUpdate {
                id: source[1].id,
                position: 1,
                container_id: Some(right),
            }]
        );
    }

    #[test]
    fn test_cross_container_move_within_same_container() {
        let container = Uuid::new_v4();
        let list = cards(container, &["A", "B", "C"]);

        let outcome = apply_cross_container_move(
            &list,
            &list,
            0,
            2,
            container,
            ReorderPolicy::ChangedOnly,
        )
        .unwrap();

        assert!(outcome.same_container);
        assert_eq!(labels(&outcome.source), vec!["B", "C", "A"]);
        assert_eq!(outcome.source, outcome.destination);
        // Three writes, one per element, not doubled
        assert_eq!(outcome.updates.len(), 3);
        assert!(outcome.updates.iter().all(|u| u.container_id.is_none()));
    }

    #[test]
    fn test_cross_container_move_bounds() {
        let left = Uuid::new_v4();
        let right = Uuid::new_v4();
        let source = cards(left, &["A"]);
        let destination = cards(right, &["X"]);

        let policy = ReorderPolicy::ChangedOnly;
        assert!(apply_cross_container_move(&source, &destination, 1, 0, right, policy).is_err());
        assert_eq!(
            apply_cross_container_move(&source, &destination, 0, 2, right, policy),
            Err(ReorderError::IndexOutOfBounds { index: 2, len: 1 })
        );
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut list = cards(Uuid::new_v4(), &["A", "B", "C"]);
        assert!(reconcile_positions(&mut list).is_empty());

        list[0].position = 4;
        list[2].position = 4;
        let updates = reconcile_positions(&mut list);
        assert_eq!(updates.len(), 2);
        assert!(is_dense(&list));
        assert!(reconcile_positions(&mut list).is_empty());
    }
}
