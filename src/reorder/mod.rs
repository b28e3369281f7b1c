//! Ordered collection reconciliation
//!
//! Sections within a restaurant and items within a section are ordered by
//! an integer `position`. A drag-and-drop gesture is applied to the local
//! list first (optimistically) and produces the set of `PositionUpdate`s the
//! remote store needs in order to agree with it.
//!
//! After any move the local list carries dense positions `0..n`. Remote
//! lists may be transiently sparse or contain duplicates when several
//! editors write at once; `sort_canonical` gives those a deterministic
//! order and `reconcile_positions` repairs them.

mod moves;

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use moves::{
    apply_cross_container_move, apply_move, reconcile_positions, CrossMoveOutcome, MoveOutcome,
};

/// An element ordered among its siblings
pub trait Positioned: Clone {
    fn id(&self) -> Uuid;

    fn position(&self) -> i32;

    fn set_position(&mut self, position: i32);

    /// Secondary sort key when two siblings share a position
    fn created_at(&self) -> DateTime<Utc>;
}

/// An element that can move between containers
pub trait Contained: Positioned {
    fn container_id(&self) -> Uuid;

    fn set_container_id(&mut self, container_id: Uuid);
}

/// Which position writes a move emits
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReorderPolicy {
    /// Rewrite every sibling of every touched list
    FullRewrite,

    /// Rewrite the span between source and destination, plus any sibling
    /// outside it whose stored position was out of line
    AffectedRange,

    /// Rewrite only siblings whose stored position differs from their index
    #[default]
    ChangedOnly,
}

/// One remote write produced by a move
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub id: Uuid,
    pub position: i32,
    /// Set only for an element that changed container
    pub container_id: Option<Uuid>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReorderError {
    #[error("Index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Element not found: {0}")]
    NotFound(Uuid),
}

fn canonical_cmp<T: Positioned>(a: &T, b: &T) -> Ordering {
    a.position()
        .cmp(&b.position())
        .then_with(|| a.created_at().cmp(&b.created_at()))
        .then_with(|| a.id().cmp(&b.id()))
}

/// Sort by `(position, created_at, id)`.
pub fn sort_canonical<T: Positioned>(list: &mut [T]) {
    list.sort_by(canonical_cmp);
}

/// Position for an element appended after every existing sibling
pub fn next_position<T: Positioned>(list: &[T]) -> i32 {
    list.iter().map(|e| e.position()).max().map_or(0, |max| max + 1)
}

/// Index of the element with `id`
pub fn index_of<T: Positioned>(list: &[T], id: Uuid) -> Result<usize, ReorderError> {
    list.iter()
        .position(|e| e.id() == id)
        .ok_or(ReorderError::NotFound(id))
}

/// True when positions already read `0, 1, .., n-1` in list order
pub fn is_dense<T: Positioned>(list: &[T]) -> bool {
    list.iter().enumerate().all(|(i, e)| e.position() == i as i32)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_sort_canonical_breaks_ties() {
        let container = Uuid::new_v4();
        let mut list = cards(container, &["A", "B", "C"]);
        let base = Utc::now();

        list[0].position = 1;
        list[0].created_at = base + Duration::seconds(5);
        list[1].position = 1;
        list[1].created_at = base;
        list[2].position = 0;

        sort_canonical(&mut list);
        assert_eq!(labels(&list), vec!["C", "B", "A"]);
    }

    #[test]
    fn test_sort_canonical_falls_back_to_id() {
        let container = Uuid::new_v4();
        let mut list = cards(container, &["A", "B"]);
        list[0].position = 0;
        list[1].position = 0;

        let mut expected = list.clone();
        expected.sort_by_key(|c| c.id);

        sort_canonical(&mut list);
        assert_eq!(list, expected);
    }

    #[test]
    fn test_next_position() {
        let container = Uuid::new_v4();
        let empty: Vec<Card> = Vec::new();
        assert_eq!(next_position(&empty), 0);

        let mut list = cards(container, &["A", "B"]);
        list[1].position = 7;
        assert_eq!(next_position(&list), 8);
    }

    #[test]
    fn test_index_of_and_density() {
        let container = Uuid::new_v4();
        let mut list = cards(container, &["A", "B", "C"]);
        assert_eq!(index_of(&list, list[2].id), Ok(2));

        let missing = Uuid::new_v4();
        assert_eq!(index_of(&list, missing), Err(ReorderError::NotFound(missing)));

        assert!(is_dense(&list));
        list[1].position = 5;
        assert!(!is_dense(&list));
    }
}
