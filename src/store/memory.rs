//! In-process menu store
//!
//! Holds every tenant in one set of maps and notifies subscribers after
//! each successful write. Writes can be made to fail per entity, which is
//! how the builder's rollback path is exercised.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::{ChangeEvent, ChangeKind, ChangeTable, EntityKind, MenuStore, StoreError};
use crate::menu::{
    ItemField, ItemId, MenuItem, Restaurant, RestaurantId, RestaurantSettings, Section, SectionId,
    UserId,
};
use crate::reorder::{sort_canonical, PositionUpdate};

#[derive(Default)]
struct Tables {
    restaurants: HashMap<RestaurantId, Restaurant>,
    /// Section rows, stored without items
    sections: HashMap<SectionId, Section>,
    items: HashMap<ItemId, MenuItem>,
}

impl Tables {
    fn section_owner(&self, section_id: SectionId) -> Result<RestaurantId, StoreError> {
        self.sections
            .get(&section_id)
            .map(|s| s.restaurant_id)
            .ok_or(StoreError::NotFound(section_id))
    }

    fn item_owner(&self, item_id: ItemId) -> Result<RestaurantId, StoreError> {
        let item = self.items.get(&item_id).ok_or(StoreError::NotFound(item_id))?;
        self.section_owner(item.section_id)
    }
}

/// A `MenuStore` backed by in-memory maps
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    channels: RwLock<HashMap<RestaurantId, broadcast::Sender<ChangeEvent>>>,
    failing: RwLock<HashSet<Uuid>>,
    writes: AtomicUsize,
    event_buffer: usize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_event_buffer(64)
    }

    pub fn with_event_buffer(event_buffer: usize) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            channels: RwLock::new(HashMap::new()),
            failing: RwLock::new(HashSet::new()),
            writes: AtomicUsize::new(0),
            event_buffer: event_buffer.max(1),
        }
    }

    /// Load a restaurant and its menu without counting writes or notifying
    pub async fn seed(&self, restaurant: Restaurant, sections: Vec<Section>) {
        let mut tables = self.tables.write().await;
        for mut section in sections {
            for item in section.items.drain(..) {
                tables.items.insert(item.id, item);
            }
            tables.sections.insert(section.id, section);
        }
        tables.restaurants.insert(restaurant.id, restaurant);
    }

    /// Make every later write touching `id` fail
    pub async fn fail_writes_for(&self, id: Uuid) {
        self.failing.write().await.insert(id);
    }

    pub async fn clear_failures(&self) {
        self.failing.write().await.clear();
    }

    /// Number of write calls received, failed ones included
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn begin_write(&self, id: Uuid) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.failing.read().await.contains(&id) {
            log::debug!("Injected write failure for {}", id);
            return Err(StoreError::Network(format!("write to {} failed", id)));
        }
        Ok(())
    }

    async fn notify(
        &self,
        restaurant_id: RestaurantId,
        table: ChangeTable,
        kind: ChangeKind,
        id: Uuid,
    ) {
        let channels = self.channels.read().await;
        if let Some(tx) = channels.get(&restaurant_id) {
            // No receivers is fine
            let _ = tx.send(ChangeEvent { restaurant_id, table, kind, id });
        }
    }
}

#[async_trait]
impl MenuStore for InMemoryStore {
    async fn fetch_restaurant(&self, id: RestaurantId) -> Result<Restaurant, StoreError> {
        let tables = self.tables.read().await;
        tables.restaurants.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn fetch_restaurant_by_subdomain(
        &self,
        subdomain: &str,
    ) -> Result<Restaurant, StoreError> {
        let tables = self.tables.read().await;
        let wanted = subdomain.to_ascii_lowercase();
        tables
            .restaurants
            .values()
            .find(|r| r.subdomain == wanted)
            .cloned()
            .ok_or_else(|| StoreError::UnknownSubdomain(subdomain.to_string()))
    }

    async fn fetch_restaurants_by_owner(
        &self,
        owner_id: UserId,
    ) -> Result<Vec<Restaurant>, StoreError> {
        let tables = self.tables.read().await;
        let mut owned: Vec<Restaurant> = tables
            .restaurants
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(owned)
    }

    async fn insert_restaurant(&self, restaurant: &Restaurant) -> Result<(), StoreError> {
        self.begin_write(restaurant.id).await?;
        let mut tables = self.tables.write().await;
        if tables.restaurants.values().any(|r| r.subdomain == restaurant.subdomain) {
            let taken = format!("subdomain {} is taken", restaurant.subdomain);
            return Err(StoreError::Conflict(taken));
        }
        if tables.restaurants.contains_key(&restaurant.id) {
            return Err(StoreError::Conflict(restaurant.id.to_string()));
        }
        tables.restaurants.insert(restaurant.id, restaurant.clone());
        Ok(())
    }

    async fn update_restaurant(
        &self,
        id: RestaurantId,
        settings: &RestaurantSettings,
    ) -> Result<(), StoreError> {
        self.begin_write(id).await?;
        {
            let mut tables = self.tables.write().await;
            let restaurant = tables.restaurants.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            restaurant.apply_settings(settings);
        }
        self.notify(id, ChangeTable::Restaurants, ChangeKind::Update, id).await;
        Ok(())
    }

    async fn delete_restaurant(&self, id: RestaurantId) -> Result<(), StoreError> {
        self.begin_write(id).await?;
        {
            let mut tables = self.tables.write().await;
            tables.restaurants.remove(&id).ok_or(StoreError::NotFound(id))?;
            let sections: HashSet<SectionId> = tables
                .sections
                .values()
                .filter(|s| s.restaurant_id == id)
                .map(|s| s.id)
                .collect();
            tables.sections.retain(|section_id, _| !sections.contains(section_id));
            tables.items.retain(|_, item| !sections.contains(&item.section_id));
        }
        self.notify(id, ChangeTable::Restaurants, ChangeKind::Delete, id).await;
        Ok(())
    }

    async fn fetch_sections(
        &self,
        restaurant_id: RestaurantId,
    ) -> Result<Vec<Section>, StoreError> {
        let tables = self.tables.read().await;
        if !tables.restaurants.contains_key(&restaurant_id) {
            return Err(StoreError::NotFound(restaurant_id));
        }

        let mut sections: Vec<Section> = tables
            .sections
            .values()
            .filter(|s| s.restaurant_id == restaurant_id)
            .cloned()
            .collect();

        for section in &mut sections {
            section.items = tables
                .items
                .values()
                .filter(|i| i.section_id == section.id)
                .cloned()
                .collect();
            sort_canonical(&mut section.items);
        }
        sort_canonical(&mut sections);

        Ok(sections)
    }

    async fn insert_section(&self, section: &Section) -> Result<(), StoreError> {
        self.begin_write(section.id).await?;
        {
            let mut tables = self.tables.write().await;
            if !tables.restaurants.contains_key(&section.restaurant_id) {
                return Err(StoreError::NotFound(section.restaurant_id));
            }
            if tables.sections.contains_key(&section.id) {
                return Err(StoreError::Conflict(section.id.to_string()));
            }
            let mut row = section.header();
            row.updated_at = Some(Utc::now());
            tables.sections.insert(row.id, row);
        }
        self.notify(section.restaurant_id, ChangeTable::Sections, ChangeKind::Insert, section.id)
            .await;
        Ok(())
    }

    async fn update_section_name(&self, id: SectionId, name: &str) -> Result<(), StoreError> {
        self.begin_write(id).await?;
        let restaurant_id = {
            let mut tables = self.tables.write().await;
            let section = tables.sections.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            section.name = name.to_string();
            section.updated_at = Some(Utc::now());
            section.restaurant_id
        };
        self.notify(restaurant_id, ChangeTable::Sections, ChangeKind::Update, id).await;
        Ok(())
    }

    async fn delete_section(&self, id: SectionId) -> Result<(), StoreError> {
        self.begin_write(id).await?;
        let restaurant_id = {
            let mut tables = self.tables.write().await;
            let section = tables.sections.remove(&id).ok_or(StoreError::NotFound(id))?;
            tables.items.retain(|_, item| item.section_id != id);
            section.restaurant_id
        };
        self.notify(restaurant_id, ChangeTable::Sections, ChangeKind::Delete, id).await;
        Ok(())
    }

    async fn insert_item(&self, item: &MenuItem) -> Result<(), StoreError> {
        self.begin_write(item.id).await?;
        let restaurant_id = {
            let mut tables = self.tables.write().await;
            let restaurant_id = tables.section_owner(item.section_id)?;
            if tables.items.contains_key(&item.id) {
                return Err(StoreError::Conflict(item.id.to_string()));
            }
            let mut row = item.clone();
            row.updated_at = Some(Utc::now());
            tables.items.insert(row.id, row);
            restaurant_id
        };
        self.notify(restaurant_id, ChangeTable::Items, ChangeKind::Insert, item.id).await;
        Ok(())
    }

    async fn update_item_field(&self, id: ItemId, field: &ItemField) -> Result<(), StoreError> {
        self.begin_write(id).await?;
        let restaurant_id = {
            let mut tables = self.tables.write().await;
            let restaurant_id = tables.item_owner(id)?;
            let item = tables.items.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            item.apply_field(field);
            item.updated_at = Some(Utc::now());
            restaurant_id
        };
        self.notify(restaurant_id, ChangeTable::Items, ChangeKind::Update, id).await;
        Ok(())
    }

    async fn delete_item(&self, id: ItemId) -> Result<(), StoreError> {
        self.begin_write(id).await?;
        let restaurant_id = {
            let mut tables = self.tables.write().await;
            let restaurant_id = tables.item_owner(id)?;
            tables.items.remove(&id);
            restaurant_id
        };
        self.notify(restaurant_id, ChangeTable::Items, ChangeKind::Delete, id).await;
        Ok(())
    }

    async fn update_position(
        &self,
        update: &PositionUpdate,
        kind: EntityKind,
    ) -> Result<(), StoreError> {
        self.begin_write(update.id).await?;
        let restaurant_id = {
            let mut tables = self.tables.write().await;
            match kind {
                EntityKind::Section => {
                    let section = tables
                        .sections
                        .get_mut(&update.id)
                        .ok_or(StoreError::NotFound(update.id))?;
                    section.position = update.position;
                    section.updated_at = Some(Utc::now());
                    section.restaurant_id
                }
                EntityKind::Item => {
                    if let Some(section_id) = update.container_id {
                        tables.section_owner(section_id)?;
                    }
                    let item = tables
                        .items
                        .get_mut(&update.id)
                        .ok_or(StoreError::NotFound(update.id))?;
                    item.position = update.position;
                    if let Some(section_id) = update.container_id {
                        item.section_id = section_id;
                    }
                    item.updated_at = Some(Utc::now());
                    let section_id = item.section_id;
                    tables.section_owner(section_id)?
                }
            }
        };
        self.notify(restaurant_id, kind.table(), ChangeKind::Update, update.id).await;
        Ok(())
    }

    async fn subscribe(&self, restaurant_id: RestaurantId) -> broadcast::Receiver<ChangeEvent> {
        let mut channels = self.channels.write().await;
        channels
            .entry(restaurant_id)
            .or_insert_with(|| broadcast::channel(self.event_buffer).0)
            .subscribe()
    }
}
