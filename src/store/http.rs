//! REST-backed menu store
//!
//! Talks to a PostgREST-style endpoint (`/rest/v1/<table>?<col>=eq.<value>`).
//! Every request carries the project's `apikey` header and a bearer token:
//! the session's access token when one is live, otherwise the anon key for
//! reads. Writes require a live session.
//!
//! The backend's push channel is emulated by polling: each subscribed
//! restaurant gets a task that refetches its sections on an interval and
//! publishes one `ChangeEvent` per row that differs from the last snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::{ChangeEvent, ChangeKind, ChangeTable, EntityKind, MenuStore, StoreError};
use crate::config::StoreConfig;
use crate::menu::{
    ItemField, ItemId, MenuItem, Restaurant, RestaurantId, RestaurantSettings, Section, SectionId,
    Tag, UserId,
};
use crate::reorder::{sort_canonical, PositionUpdate};
use crate::session::SessionHandle;

/// Row shape of `menu_sections`, optionally with embedded items
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SectionRow {
    id: SectionId,
    restaurant_id: RestaurantId,
    name: String,
    #[serde(default)]
    sort_order: Option<i32>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    items: Vec<ItemRow>,
}

/// Row shape of `menu_items`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ItemRow {
    id: ItemId,
    section_id: SectionId,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    price: f64,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default = "default_visible")]
    is_visible: bool,
    #[serde(default)]
    is_featured: bool,
    /// Tags embedded through the `menu_item_tags` join table
    #[serde(default)]
    tag_links: Vec<TagLink>,
    #[serde(default)]
    sort_order: Option<i32>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// One `menu_item_tags` row with its tag embedded
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TagLink {
    #[serde(default)]
    tags: Option<Tag>,
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: Uuid,
}

fn default_visible() -> bool {
    true
}

impl From<ItemRow> for MenuItem {
    fn from(row: ItemRow) -> Self {
        MenuItem {
            id: row.id,
            section_id: row.section_id,
            name: row.name,
            description: row.description,
            price: row.price,
            image_url: row.image_url,
            is_visible: row.is_visible,
            is_featured: row.is_featured,
            // Join rows whose tag was deleted embed null
            tags: row.tag_links.into_iter().filter_map(|link| link.tags).collect(),
            // A null sort order sorts first
            position: row.sort_order.unwrap_or(0),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<SectionRow> for Section {
    fn from(row: SectionRow) -> Self {
        let mut items: Vec<MenuItem> = row.items.into_iter().map(MenuItem::from).collect();
        sort_canonical(&mut items);
        Section {
            id: row.id,
            restaurant_id: row.restaurant_id,
            name: row.name,
            position: row.sort_order.unwrap_or(0),
            created_at: row.created_at,
            updated_at: row.updated_at,
            items,
        }
    }
}

fn table_url(base_url: &str, table: &str) -> String {
    format!("{}/rest/v1/{}", base_url.trim_end_matches('/'), table)
}

fn eq_filter(column: &str, value: &str) -> String {
    format!("{}=eq.{}", column, urlencoding::encode(value))
}

fn in_filter(column: &str, ids: &[Uuid]) -> String {
    let list: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    format!("{}=in.({})", column, list.join(","))
}

/// Sections with their items, each item with its tags from the join table
const SECTION_COLUMNS: &str = "*,items:menu_items(*,tag_links:menu_item_tags(tags(id,name,color)))";

fn sections_query(restaurant_id: RestaurantId) -> String {
    format!(
        "select={}&{}&order=sort_order.asc",
        SECTION_COLUMNS,
        eq_filter("restaurant_id", &restaurant_id.to_string())
    )
}

fn section_payload(section: &Section) -> serde_json::Value {
    json!({
        "id": section.id,
        "restaurant_id": section.restaurant_id,
        "name": section.name,
        "sort_order": section.position,
        "created_at": section.created_at,
    })
}

fn item_payload(item: &MenuItem) -> serde_json::Value {
    json!({
        "id": item.id,
        "section_id": item.section_id,
        "name": item.name,
        "description": item.description,
        "price": item.price,
        "image_url": item.image_url,
        "is_visible": item.is_visible,
        "is_featured": item.is_featured,
        "sort_order": item.position,
        "created_at": item.created_at,
    })
}

fn position_payload(update: &PositionUpdate, kind: EntityKind) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    body.insert("sort_order".into(), json!(update.position));
    if let (EntityKind::Item, Some(section_id)) = (kind, update.container_id) {
        body.insert("section_id".into(), json!(section_id));
    }
    serde_json::Value::Object(body)
}

fn field_payload(field: &ItemField) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    body.insert(field.key().column().into(), field.to_json());
    serde_json::Value::Object(body)
}

/// Row-level differences between two snapshots of a restaurant's menu
fn diff_snapshots(
    restaurant_id: RestaurantId,
    old: &[Section],
    new: &[Section],
) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    let event = |table, kind, id| ChangeEvent { restaurant_id, table, kind, id };

    let old_sections: HashMap<SectionId, &Section> = old.iter().map(|s| (s.id, s)).collect();
    let new_sections: HashMap<SectionId, &Section> = new.iter().map(|s| (s.id, s)).collect();

    for section in new {
        match old_sections.get(&section.id) {
            None => events.push(event(ChangeTable::Sections, ChangeKind::Insert, section.id)),
            Some(previous) if previous.header() != section.header() => {
                events.push(event(ChangeTable::Sections, ChangeKind::Update, section.id))
            }
            Some(_) => {}
        }
    }
    for section in old {
        if !new_sections.contains_key(&section.id) {
            events.push(event(ChangeTable::Sections, ChangeKind::Delete, section.id));
        }
    }

    let old_items: HashMap<ItemId, &MenuItem> =
        old.iter().flat_map(|s| &s.items).map(|i| (i.id, i)).collect();
    let new_items: HashMap<ItemId, &MenuItem> =
        new.iter().flat_map(|s| &s.items).map(|i| (i.id, i)).collect();

    for item in new.iter().flat_map(|s| &s.items) {
        match old_items.get(&item.id) {
            None => events.push(event(ChangeTable::Items, ChangeKind::Insert, item.id)),
            Some(previous) if *previous != item => {
                events.push(event(ChangeTable::Items, ChangeKind::Update, item.id))
            }
            Some(_) => {}
        }
    }
    for item in old.iter().flat_map(|s| &s.items) {
        if !new_items.contains_key(&item.id) {
            events.push(event(ChangeTable::Items, ChangeKind::Delete, item.id));
        }
    }

    events
}

/// Authenticated access to the REST endpoint
struct RestClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    session: Option<SessionHandle>,
}

impl RestClient {
    async fn bearer(&self, write: bool) -> Result<String, StoreError> {
        match &self.session {
            Some(handle) => match handle.current().await {
                Ok(session) => Ok(session.access_token().to_string()),
                Err(e) if write => Err(StoreError::Unauthorized(e.to_string())),
                Err(_) => Ok(self.api_key.clone()),
            },
            None if write => Err(StoreError::Unauthorized("no session".into())),
            None => Ok(self.api_key.clone()),
        }
    }

    async fn request(
        &self,
        method: reqwest::Method,
        table: &str,
        query: &str,
    ) -> Result<reqwest::RequestBuilder, StoreError> {
        let write = method != reqwest::Method::GET;
        let token = self.bearer(write).await?;
        let mut url = table_url(&self.base_url, table);
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }
        Ok(self
            .client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(token))
    }

    async fn send(request: reqwest::RequestBuilder) -> Result<reqwest::Response, StoreError> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            401 | 403 => StoreError::Unauthorized(message),
            409 => StoreError::Conflict(message),
            code => StoreError::Rejected { status: code, message },
        })
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
    ) -> Result<Vec<T>, StoreError> {
        let request = self.request(reqwest::Method::GET, table, query).await?;
        Self::send(request)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::SerializationError(e.to_string()))
    }

    async fn insert(&self, table: &str, body: &serde_json::Value) -> Result<(), StoreError> {
        let request = self
            .request(reqwest::Method::POST, table, "")
            .await?
            .header("Prefer", "return=minimal")
            .json(body);
        Self::send(request).await?;
        Ok(())
    }

    /// PATCH the row with `id`; a write that matches no row is `NotFound`
    async fn update(
        &self,
        table: &str,
        id: Uuid,
        body: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let request = self
            .request(reqwest::Method::PATCH, table, &eq_filter("id", &id.to_string()))
            .await?
            .header("Prefer", "return=representation")
            .json(body);
        let rows: Vec<serde_json::Value> = Self::send(request)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn delete(&self, table: &str, filter: &str) -> Result<(), StoreError> {
        let request = self.request(reqwest::Method::DELETE, table, filter).await?;
        Self::send(request).await?;
        Ok(())
    }

    async fn fetch_sections(
        &self,
        restaurant_id: RestaurantId,
    ) -> Result<Vec<Section>, StoreError> {
        let rows: Vec<SectionRow> = self
            .select(ChangeTable::Sections.name(), &sections_query(restaurant_id))
            .await?;
        let mut sections: Vec<Section> = rows.into_iter().map(Section::from).collect();
        sort_canonical(&mut sections);
        Ok(sections)
    }

    async fn restaurants(&self, query: &str) -> Result<Vec<Restaurant>, StoreError> {
        self.select(ChangeTable::Restaurants.name(), query).await
    }
}

/// A `MenuStore` speaking to a hosted PostgREST-style backend
pub struct HttpStore {
    rest: Arc<RestClient>,
    channels: RwLock<HashMap<RestaurantId, broadcast::Sender<ChangeEvent>>>,
    poll_interval: Duration,
    event_buffer: usize,
    shutdown_tx: broadcast::Sender<()>,
}

impl HttpStore {
    /// `session` may be `None` for read-only access with the anon key
    pub fn new(config: &StoreConfig, session: Option<SessionHandle>) -> Result<Self, StoreError> {
        config
            .validate()
            .map_err(|e| StoreError::InvalidConfig(e.to_string()))?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            rest: Arc::new(RestClient {
                client,
                base_url: config.base_url.clone(),
                api_key: config.api_key.clone(),
                session,
            }),
            channels: RwLock::new(HashMap::new()),
            poll_interval: config.poll_interval(),
            event_buffer: 64,
            shutdown_tx,
        })
    }

    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer.max(1);
        self
    }

    /// Stop every polling task
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    fn spawn_poller(&self, restaurant_id: RestaurantId, tx: broadcast::Sender<ChangeEvent>) {
        let rest = Arc::clone(&self.rest);
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tokio::spawn(async move {
            let mut last: Option<Vec<Section>> = None;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if tx.receiver_count() == 0 {
                            continue;
                        }
                        match rest.fetch_sections(restaurant_id).await {
                            Ok(current) => {
                                if let Some(previous) = &last {
                                    for event in diff_snapshots(restaurant_id, previous, &current) {
                                        let _ = tx.send(event);
                                    }
                                }
                                last = Some(current);
                            }
                            Err(e) => {
                                log::warn!("Polling menu {} failed: {}", restaurant_id, e);
                            }
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
            log::debug!("Stopped polling menu {}", restaurant_id);
        });
    }
}

impl Drop for HttpStore {
    fn drop(&mut self) {
        self.stop();
    }
}

#[async_trait]
impl MenuStore for HttpStore {
    async fn fetch_restaurant(&self, id: RestaurantId) -> Result<Restaurant, StoreError> {
        let query = format!("select=*&{}", eq_filter("id", &id.to_string()));
        let rows = self.rest.restaurants(&query).await?;
        rows.into_iter().next().ok_or(StoreError::NotFound(id))
    }

    async fn fetch_restaurant_by_subdomain(
        &self,
        subdomain: &str,
    ) -> Result<Restaurant, StoreError> {
        let wanted = subdomain.to_ascii_lowercase();
        let query = format!("select=*&{}", eq_filter("subdomain", &wanted));
        let rows = self.rest.restaurants(&query).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::UnknownSubdomain(subdomain.to_string()))
    }

    async fn fetch_restaurants_by_owner(
        &self,
        owner_id: UserId,
    ) -> Result<Vec<Restaurant>, StoreError> {
        let query = format!(
            "select=*&{}&order=created_at.asc",
            eq_filter("owner_id", &owner_id.to_string())
        );
        self.rest.restaurants(&query).await
    }

    async fn insert_restaurant(&self, restaurant: &Restaurant) -> Result<(), StoreError> {
        let body = serde_json::to_value(restaurant)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        self.rest.insert(ChangeTable::Restaurants.name(), &body).await
    }

    async fn update_restaurant(
        &self,
        id: RestaurantId,
        settings: &RestaurantSettings,
    ) -> Result<(), StoreError> {
        self.rest
            .update(ChangeTable::Restaurants.name(), id, &settings.to_json())
            .await
    }

    async fn delete_restaurant(&self, id: RestaurantId) -> Result<(), StoreError> {
        let sections: Vec<IdRow> = self
            .rest
            .select(
                ChangeTable::Sections.name(),
                &format!("select=id&{}", eq_filter("restaurant_id", &id.to_string())),
            )
            .await?;
        if !sections.is_empty() {
            let ids: Vec<Uuid> = sections.iter().map(|row| row.id).collect();
            self.rest
                .delete(ChangeTable::Items.name(), &in_filter("section_id", &ids))
                .await?;
            self.rest
                .delete(ChangeTable::Sections.name(), &in_filter("id", &ids))
                .await?;
        }
        self.rest
            .delete(ChangeTable::Restaurants.name(), &eq_filter("id", &id.to_string()))
            .await
    }

    async fn fetch_sections(
        &self,
        restaurant_id: RestaurantId,
    ) -> Result<Vec<Section>, StoreError> {
        self.rest.fetch_sections(restaurant_id).await
    }

    async fn insert_section(&self, section: &Section) -> Result<(), StoreError> {
        self.rest
            .insert(ChangeTable::Sections.name(), &section_payload(section))
            .await
    }

    async fn update_section_name(&self, id: SectionId, name: &str) -> Result<(), StoreError> {
        self.rest
            .update(ChangeTable::Sections.name(), id, &json!({ "name": name }))
            .await
    }

    async fn delete_section(&self, id: SectionId) -> Result<(), StoreError> {
        self.rest
            .delete(ChangeTable::Items.name(), &eq_filter("section_id", &id.to_string()))
            .await?;
        self.rest
            .delete(ChangeTable::Sections.name(), &eq_filter("id", &id.to_string()))
            .await
    }

    async fn insert_item(&self, item: &MenuItem) -> Result<(), StoreError> {
        self.rest.insert(ChangeTable::Items.name(), &item_payload(item)).await
    }

    async fn update_item_field(&self, id: ItemId, field: &ItemField) -> Result<(), StoreError> {
        self.rest
            .update(ChangeTable::Items.name(), id, &field_payload(field))
            .await
    }

    async fn delete_item(&self, id: ItemId) -> Result<(), StoreError> {
        self.rest
            .delete(ChangeTable::Items.name(), &eq_filter("id", &id.to_string()))
            .await
    }

    async fn update_position(
        &self,
        update: &PositionUpdate,
        kind: EntityKind,
    ) -> Result<(), StoreError> {
        self.rest
            .update(kind.table().name(), update.id, &position_payload(update, kind))
            .await
    }

    async fn subscribe(&self, restaurant_id: RestaurantId) -> broadcast::Receiver<ChangeEvent> {
        let mut channels = self.channels.write().await;
        if let Some(tx) = channels.get(&restaurant_id) {
            return tx.subscribe();
        }

        let (tx, rx) = broadcast::channel(self.event_buffer);
        self.spawn_poller(restaurant_id, tx.clone());
        channels.insert(restaurant_id, tx);
        log::debug!("Polling menu {} every {:?}", restaurant_id, self.poll_interval);
        rx
    }
}
