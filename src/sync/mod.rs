//! Keeping the local menu and the remote store in agreement
//!
//! `MenuBuilder` owns the local copy of one restaurant's menu. Structural
//! edits (moves, adds, deletes) are applied locally first and then written
//! to the store; field edits go through `FieldAutosave`, which coalesces
//! bursts of typing into one write. Push notifications from the store
//! trigger a refetch that is merged through a `ConflictResolver`, with the
//! `VersionGuard` protecting entities whose local writes are still newer.

mod autosave;
mod builder;
mod conflict;
mod guard;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::menu::{FieldKey, ItemId, ValidationError};
use crate::reorder::ReorderError;
use crate::session::SessionError;
use crate::store::StoreError;

pub use autosave::{FieldAutosave, FieldState};
pub use builder::MenuBuilder;
pub use conflict::{resolver_for, ConflictResolver, LastRefetchWins, PendingWritesWin};
pub use guard::VersionGuard;

/// Error types for builder operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// Rejected before any remote call
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Reorder error: {0}")]
    Reorder(#[from] ReorderError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Some writes of a batch failed; local state has been handled per the
    /// configured failure policy
    #[error("{failed} of {total} remote writes failed")]
    RemoteWrite { failed: usize, total: usize },

    #[error("Not found: {0}")]
    NotFound(Uuid),

    #[error("Menu is not loaded")]
    NotLoaded,

    #[error("Builder has shut down")]
    ShutDown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Something the editor UI may want to react to
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuilderEvent {
    /// The local menu changed
    Changed,

    /// Local state was replaced by a merge with the store's copy
    Refetched,

    /// A debounced field write reached the store
    FieldSaved { item_id: ItemId, field: FieldKey },

    /// Transient, dismissible message
    Notice { level: NoticeLevel, message: String },
}

/// Progress of the initial fetch
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Ready,
    Failed(String),
}
