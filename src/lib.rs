// Menuboard - Restaurant Menu Builder Core

pub mod config;
pub mod menu;
pub mod reorder;
pub mod session;
pub mod store;
pub mod sync;

pub use config::MenuboardConfig;
pub use menu::{
    ItemDraft, ItemField, MenuItem, PublicMenu, Restaurant, RestaurantSettings, Section, Theme,
};
pub use session::{Role, Session, SessionHandle};
pub use store::{InMemoryStore, MenuStore};
pub use sync::{BuilderEvent, LoadState, MenuBuilder, SyncError};
