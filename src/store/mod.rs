//! Remote menu storage
//!
//! `MenuStore` is the contract with the hosted backend: row CRUD scoped by
//! tenant, per-entity position writes and a change-notification channel.
//! `InMemoryStore` keeps everything in process; `HttpStore` talks to a
//! PostgREST-style REST API.

pub mod memory;
#[cfg(feature = "http-store")]
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::menu::{
    ItemField, ItemId, MenuItem, Restaurant, RestaurantId, RestaurantSettings, Section, SectionId,
    UserId,
};
use crate::reorder::PositionUpdate;

pub use memory::InMemoryStore;
#[cfg(feature = "http-store")]
pub use http::HttpStore;

/// Error types for store operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(Uuid),

    #[error("No restaurant with subdomain: {0}")]
    UnknownSubdomain(String),

    #[error("Record already exists: {0}")]
    Conflict(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),
}

/// Which kind of row a position write targets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Section,
    Item,
}

impl EntityKind {
    pub fn table(&self) -> ChangeTable {
        match self {
            EntityKind::Section => ChangeTable::Sections,
            EntityKind::Item => ChangeTable::Items,
        }
    }
}

/// Watched tables
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTable {
    Restaurants,
    Sections,
    Items,
}

impl ChangeTable {
    /// Table name on the backend
    pub fn name(&self) -> &'static str {
        match self {
            ChangeTable::Restaurants => "restaurants",
            ChangeTable::Sections => "menu_sections",
            ChangeTable::Items => "menu_items",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Notification that a row under a restaurant changed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub restaurant_id: RestaurantId,
    pub table: ChangeTable,
    pub kind: ChangeKind,
    /// Row id. A polling store that cannot tell which row changed reports
    /// the restaurant id.
    pub id: Uuid,
}

/// Remote storage for restaurants and their menus
#[async_trait]
pub trait MenuStore: Send + Sync {
    async fn fetch_restaurant(&self, id: RestaurantId) -> Result<Restaurant, StoreError>;

    async fn fetch_restaurant_by_subdomain(
        &self,
        subdomain: &str,
    ) -> Result<Restaurant, StoreError>;

    /// Restaurants owned by `owner_id`, oldest first
    async fn fetch_restaurants_by_owner(
        &self,
        owner_id: UserId,
    ) -> Result<Vec<Restaurant>, StoreError>;

    async fn insert_restaurant(&self, restaurant: &Restaurant) -> Result<(), StoreError>;

    async fn update_restaurant(
        &self,
        id: RestaurantId,
        settings: &RestaurantSettings,
    ) -> Result<(), StoreError>;

    /// Delete a restaurant together with its sections and their items
    async fn delete_restaurant(&self, id: RestaurantId) -> Result<(), StoreError>;

    /// All sections of a restaurant with their items, both in canonical order
    async fn fetch_sections(&self, restaurant_id: RestaurantId) -> Result<Vec<Section>, StoreError>;

    /// Insert a section row. Items carried by `section` are ignored.
    async fn insert_section(&self, section: &Section) -> Result<(), StoreError>;

    async fn update_section_name(&self, id: SectionId, name: &str) -> Result<(), StoreError>;

    /// Delete a section and every item in it
    async fn delete_section(&self, id: SectionId) -> Result<(), StoreError>;

    async fn insert_item(&self, item: &MenuItem) -> Result<(), StoreError>;

    async fn update_item_field(&self, id: ItemId, field: &ItemField) -> Result<(), StoreError>;

    async fn delete_item(&self, id: ItemId) -> Result<(), StoreError>;

    /// Persist one element's position, and its new container when it moved
    async fn update_position(
        &self,
        update: &PositionUpdate,
        kind: EntityKind,
    ) -> Result<(), StoreError>;

    /// Change notifications for everything under `restaurant_id`
    async fn subscribe(&self, restaurant_id: RestaurantId) -> broadcast::Receiver<ChangeEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names() {
        assert_eq!(EntityKind::Section.table().name(), "menu_sections");
        assert_eq!(EntityKind::Item.table().name(), "menu_items");
    }

    #[test]
    fn test_change_event_serialization() {
        let event = ChangeEvent {
            restaurant_id: Uuid::new_v4(),
            table: ChangeTable::Items,
            kind: ChangeKind::Delete,
            id: Uuid::new_v4(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["table"], "items");
        assert_eq!(json["kind"], "delete");
    }
}
