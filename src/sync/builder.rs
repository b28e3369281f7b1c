//! The menu editor's local state and its synchronisation with the store

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::{broadcast, Mutex, RwLock};
use uuid::Uuid;

use super::autosave::{FieldAutosave, FieldState};
use super::conflict::{resolver_for, ConflictResolver};
use super::guard::VersionGuard;
use super::{BuilderEvent, LoadState, NoticeLevel, SyncError};
use crate::config::{MenuboardConfig, WriteFailurePolicy};
use crate::menu::{
    normalize_name, FieldKey, ItemDraft, ItemField, ItemId, MenuItem, PublicMenu, Restaurant,
    RestaurantId, RestaurantSettings, Section, SectionId,
};
use crate::reorder::{
    apply_cross_container_move, apply_move, index_of, next_position, reconcile_positions,
    PositionUpdate,
};
use crate::session::SessionHandle;
use crate::store::{ChangeEvent, ChangeTable, EntityKind, MenuStore, StoreError};

struct BuilderInner {
    restaurant_id: RestaurantId,
    store: Arc<dyn MenuStore>,
    session: SessionHandle,
    config: MenuboardConfig,
    restaurant: RwLock<Option<Restaurant>>,
    sections: RwLock<Vec<Section>>,
    status: RwLock<LoadState>,
    guard: Arc<Mutex<VersionGuard>>,
    resolver: Box<dyn ConflictResolver<Vec<Section>>>,
    autosave: FieldAutosave,
    events: broadcast::Sender<BuilderEvent>,
    shutdown_tx: broadcast::Sender<()>,
    /// Serialises structural edits
    ops: Mutex<()>,
    watching: AtomicBool,
    closed: AtomicBool,
}

/// Editor for one restaurant's menu.
///
/// Every edit is applied to the local copy first and then written to the
/// store. When a write fails, the local copy is either left as is or rolled
/// back to its state before the edit and refetched, per
/// `MenuboardConfig::on_write_failure`. Cloning gives another handle to the
/// same editor.
#[derive(Clone)]
pub struct MenuBuilder {
    inner: Arc<BuilderInner>,
}

/// `snapshot`'s structure and ordering, with item field values taken from
/// `current`
fn rolled_back(current: &[Section], snapshot: &[Section]) -> Vec<Section> {
    let current_items: HashMap<ItemId, &MenuItem> =
        current.iter().flat_map(|s| &s.items).map(|i| (i.id, i)).collect();

    let mut restored = snapshot.to_vec();
    for item in restored.iter_mut().flat_map(|s| s.items.iter_mut()) {
        if let Some(latest) = current_items.get(&item.id) {
            let (section_id, position) = (item.section_id, item.position);
            *item = (*latest).clone();
            item.section_id = section_id;
            item.position = position;
        }
    }
    restored
}

fn find_item_mut(sections: &mut [Section], id: ItemId) -> Option<&mut MenuItem> {
    sections.iter_mut().flat_map(|s| s.items.iter_mut()).find(|i| i.id == id)
}

fn live_ids(sections: &[Section]) -> HashSet<Uuid> {
    sections
        .iter()
        .flat_map(|s| std::iter::once(s.id).chain(s.items.iter().map(|i| i.id)))
        .collect()
}

impl MenuBuilder {
    pub fn new(
        restaurant_id: RestaurantId,
        store: Arc<dyn MenuStore>,
        session: SessionHandle,
        config: MenuboardConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let (shutdown_tx, _) = broadcast::channel(1);
        let guard = Arc::new(Mutex::new(VersionGuard::new()));
        let autosave = FieldAutosave::new(
            Arc::clone(&store),
            Arc::clone(&guard),
            events.clone(),
            config.coalesce_window(),
        );

        Self {
            inner: Arc::new(BuilderInner {
                restaurant_id,
                store,
                session,
                resolver: resolver_for(config.conflict_policy),
                config,
                restaurant: RwLock::new(None),
                sections: RwLock::new(Vec::new()),
                status: RwLock::new(LoadState::Loading),
                guard,
                autosave,
                events,
                shutdown_tx,
                ops: Mutex::new(()),
                watching: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn restaurant_id(&self) -> RestaurantId {
        self.inner.restaurant_id
    }

    /// Fetch the restaurant and its menu, replacing any local state
    pub async fn load(&self) -> Result<(), SyncError> {
        self.ensure_open()?;
        *self.inner.status.write().await = LoadState::Loading;

        let store = &self.inner.store;
        let id = self.inner.restaurant_id;
        let fetched = async {
            let restaurant = store.fetch_restaurant(id).await?;
            let sections = store.fetch_sections(id).await?;
            Ok::<_, StoreError>((restaurant, sections))
        }
        .await;

        match fetched {
            Ok((restaurant, sections)) => {
                log::info!("Loaded menu {} with {} sections", id, sections.len());
                *self.inner.restaurant.write().await = Some(restaurant);
                *self.inner.sections.write().await = sections;
                *self.inner.status.write().await = LoadState::Ready;
                self.emit(BuilderEvent::Refetched);
                Ok(())
            }
            Err(e) => {
                log::error!("Loading menu {} failed: {}", id, e);
                *self.inner.status.write().await = LoadState::Failed(e.to_string());
                self.notice(NoticeLevel::Error, format!("Couldn't load the menu: {}", e));
                Err(e.into())
            }
        }
    }

    /// Merge the store's current copy into local state
    pub async fn refetch(&self) -> Result<(), SyncError> {
        let remote = match self.inner.store.fetch_sections(self.inner.restaurant_id).await {
            Ok(remote) => remote,
            Err(e) => {
                log::warn!("Refetching menu {} failed: {}", self.inner.restaurant_id, e);
                *self.inner.status.write().await = LoadState::Failed(e.to_string());
                self.notice(NoticeLevel::Error, format!("Couldn't refresh the menu: {}", e));
                return Err(e.into());
            }
        };

        {
            let mut sections = self.inner.sections.write().await;
            let mut guard = self.inner.guard.lock().await;
            let merged = self.inner.resolver.resolve(&sections, remote, &mut guard);
            guard.prune(&live_ids(&merged));
            *sections = merged;
        }
        *self.inner.status.write().await = LoadState::Ready;
        log::debug!("Refetched menu {}", self.inner.restaurant_id);
        self.emit(BuilderEvent::Refetched);
        Ok(())
    }

    /// Re-read the restaurant row. A restaurant deleted elsewhere leaves the
    /// builder without a menu.
    async fn reload_restaurant(&self) -> Result<(), SyncError> {
        let id = self.inner.restaurant_id;
        match self.inner.store.fetch_restaurant(id).await {
            Ok(restaurant) => {
                *self.inner.restaurant.write().await = Some(restaurant);
                self.emit(BuilderEvent::Refetched);
                Ok(())
            }
            Err(StoreError::NotFound(_)) => {
                log::info!("Restaurant {} was deleted", id);
                *self.inner.restaurant.write().await = None;
                self.inner.sections.write().await.clear();
                *self.inner.status.write().await =
                    LoadState::Failed("restaurant was deleted".into());
                self.emit(BuilderEvent::Changed);
                self.notice(NoticeLevel::Warning, "This restaurant was deleted".into());
                Ok(())
            }
            Err(e) => {
                log::warn!("Reloading restaurant {} failed: {}", id, e);
                Err(e.into())
            }
        }
    }

    /// React to one change notification from the store
    pub async fn handle_change(&self, event: ChangeEvent) -> Result<(), SyncError> {
        if event.restaurant_id != self.inner.restaurant_id {
            return Ok(());
        }
        if self.inner.restaurant.read().await.is_none() {
            return Ok(());
        }
        log::debug!("{:?} {:?} on {}, refetching", event.kind, event.table, event.id);
        match event.table {
            ChangeTable::Restaurants => self.reload_restaurant().await,
            ChangeTable::Sections | ChangeTable::Items => self.refetch().await,
        }
    }

    /// Refetch whenever the store reports a change, until `shutdown`.
    /// Calling it again while a watcher runs does nothing.
    pub async fn watch(&self) -> Result<(), SyncError> {
        self.ensure_open()?;
        if self.inner.watching.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut rx = self.inner.store.subscribe(self.inner.restaurant_id).await;
        let mut shutdown = self.inner.shutdown_tx.subscribe();
        let builder = self.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = rx.recv() => {
                        let event = match result {
                            Ok(event) => event,
                            Err(broadcast::error::RecvError::Lagged(missed)) => {
                                log::debug!("Missed {} change events", missed);
                                if let Err(e) = builder.refetch().await {
                                    log::warn!("Refetch failed: {}", e);
                                }
                                continue;
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        };

                        // One reload per kind covers a burst of notifications
                        let mut restaurant = None;
                        let mut menu = None;
                        let burst = std::iter::once(event)
                            .chain(std::iter::from_fn(|| rx.try_recv().ok()));
                        for event in burst {
                            match event.table {
                                ChangeTable::Restaurants => restaurant = Some(event),
                                ChangeTable::Sections | ChangeTable::Items => menu = Some(event),
                            }
                        }
                        for event in restaurant.into_iter().chain(menu) {
                            if let Err(e) = builder.handle_change(event).await {
                                log::warn!("Refetch failed: {}", e);
                            }
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
            builder.inner.watching.store(false, Ordering::SeqCst);
            log::debug!("Stopped watching menu {}", builder.inner.restaurant_id);
        });

        Ok(())
    }

    /// Reorder sections by dragging the one at `source` to `destination`
    pub async fn move_section(&self, source: usize, destination: usize) -> Result<(), SyncError> {
        self.authorize().await?;
        let _op = self.inner.ops.lock().await;

        let (snapshot, updates) = {
            let mut sections = self.inner.sections.write().await;
            let policy = self.inner.config.reorder_policy;
            let outcome = apply_move(sections.as_slice(), source, destination, policy)?;
            if outcome.is_noop() {
                return Ok(());
            }
            self.hold(outcome.updates.iter().map(|u| u.id)).await;
            let snapshot = sections.clone();
            *sections = outcome.list;
            (snapshot, outcome.updates)
        };
        self.emit(BuilderEvent::Changed);

        self.write_positions(updates, EntityKind::Section, snapshot, "the section order")
            .await
    }

    /// Drag the item at `source` in one section to `destination` in another
    /// (or the same) section
    pub async fn move_item(
        &self,
        source_section: SectionId,
        source: usize,
        destination_section: SectionId,
        destination: usize,
    ) -> Result<(), SyncError> {
        self.authorize().await?;
        let _op = self.inner.ops.lock().await;

        let (snapshot, updates) = {
            let mut sections = self.inner.sections.write().await;
            let from = index_of(sections.as_slice(), source_section)?;
            let to = index_of(sections.as_slice(), destination_section)?;
            let outcome = apply_cross_container_move(
                &sections[from].items,
                &sections[to].items,
                source,
                destination,
                destination_section,
                self.inner.config.reorder_policy,
            )?;
            if outcome.updates.is_empty() {
                return Ok(());
            }
            self.hold(outcome.updates.iter().map(|u| u.id)).await;
            let snapshot = sections.clone();
            sections[from].items = outcome.source;
            if !outcome.same_container {
                sections[to].items = outcome.destination;
            }
            (snapshot, outcome.updates)
        };
        self.emit(BuilderEvent::Changed);

        self.write_positions(updates, EntityKind::Item, snapshot, "the item order")
            .await
    }

    /// Append a section after every existing one
    pub async fn add_section(&self, name: &str) -> Result<SectionId, SyncError> {
        self.authorize().await?;
        let _op = self.inner.ops.lock().await;

        let (snapshot, section) = {
            let mut sections = self.inner.sections.write().await;
            let position = next_position(sections.as_slice());
            let section = Section::new(self.inner.restaurant_id, name, position)?;
            self.hold([section.id]).await;
            let snapshot = sections.clone();
            sections.push(section.clone());
            (snapshot, section)
        };
        self.emit(BuilderEvent::Changed);

        let write = self.inner.store.insert_section(&section);
        self.write_one(section.id, snapshot, "the new section", write).await?;
        Ok(section.id)
    }

    pub async fn rename_section(&self, id: SectionId, name: &str) -> Result<(), SyncError> {
        self.authorize().await?;
        let name = normalize_name(name)?;
        let _op = self.inner.ops.lock().await;

        let snapshot = {
            let mut sections = self.inner.sections.write().await;
            let snapshot = sections.clone();
            let section = sections
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or(SyncError::NotFound(id))?;
            if section.name == name {
                return Ok(());
            }
            self.hold([id]).await;
            section.name = name.clone();
            snapshot
        };
        self.emit(BuilderEvent::Changed);

        let write = self.inner.store.update_section_name(id, &name);
        self.write_one(id, snapshot, "the section name", write).await
    }

    /// Delete a section together with its items
    pub async fn delete_section(&self, id: SectionId) -> Result<(), SyncError> {
        self.authorize().await?;
        let _op = self.inner.ops.lock().await;

        let (snapshot, removed) = {
            let mut sections = self.inner.sections.write().await;
            let index = index_of(sections.as_slice(), id).map_err(|_| SyncError::NotFound(id))?;
            self.hold([id]).await;
            let snapshot = sections.clone();
            let removed = sections.remove(index);
            (snapshot, removed)
        };
        for item in &removed.items {
            self.inner.autosave.discard_item(item.id).await;
        }
        self.emit(BuilderEvent::Changed);

        let write = self.inner.store.delete_section(id);
        self.write_one(id, snapshot, "the section deletion", write).await?;
        self.forget(std::iter::once(id).chain(removed.items.iter().map(|i| i.id)))
            .await;
        Ok(())
    }

    /// Append an item to the end of a section
    pub async fn add_item(
        &self,
        section_id: SectionId,
        draft: ItemDraft,
    ) -> Result<ItemId, SyncError> {
        self.authorize().await?;
        let _op = self.inner.ops.lock().await;

        let (snapshot, item) = {
            let mut sections = self.inner.sections.write().await;
            let snapshot = sections.clone();
            let section = sections
                .iter_mut()
                .find(|s| s.id == section_id)
                .ok_or(SyncError::NotFound(section_id))?;
            let item = MenuItem::from_draft(section_id, draft, section.next_item_position())?;
            self.hold([item.id]).await;
            section.items.push(item.clone());
            (snapshot, item)
        };
        self.emit(BuilderEvent::Changed);

        let write = self.inner.store.insert_item(&item);
        self.write_one(item.id, snapshot, "the new item", write).await?;
        Ok(item.id)
    }

    pub async fn delete_item(&self, id: ItemId) -> Result<(), SyncError> {
        self.authorize().await?;
        let _op = self.inner.ops.lock().await;

        let snapshot = {
            let mut sections = self.inner.sections.write().await;
            let snapshot = sections.clone();
            let section = sections
                .iter_mut()
                .find(|s| s.items.iter().any(|i| i.id == id))
                .ok_or(SyncError::NotFound(id))?;
            self.hold([id]).await;
            section.items.retain(|i| i.id != id);
            snapshot
        };
        self.inner.autosave.discard_item(id).await;
        self.emit(BuilderEvent::Changed);

        let write = self.inner.store.delete_item(id);
        self.write_one(id, snapshot, "the item deletion", write).await?;
        self.forget([id]).await;
        Ok(())
    }

    /// Change one field of an item. Local state updates at once; the write
    /// follows after the coalescing window.
    pub async fn edit_item(&self, id: ItemId, field: ItemField) -> Result<(), SyncError> {
        self.authorize().await?;
        let field = field.validated()?;

        {
            let mut sections = self.inner.sections.write().await;
            let item = find_item_mut(&mut sections, id).ok_or(SyncError::NotFound(id))?;
            item.apply_field(&field);
            // Holds the guard before a refetch can see the new value
            self.inner.autosave.record(id, field).await;
        }
        self.emit(BuilderEvent::Changed);
        Ok(())
    }

    /// Write failed field edits again without waiting for another edit
    pub async fn retry_failed_edits(&self) -> Result<(), SyncError> {
        self.ensure_open()?;
        self.inner.autosave.flush().await;
        Ok(())
    }

    /// Renumber every list to dense positions and write whatever differs.
    /// Does nothing when the menu is already dense.
    pub async fn repair_positions(&self) -> Result<(), SyncError> {
        self.authorize().await?;
        let _op = self.inner.ops.lock().await;

        let (snapshot, section_updates, item_updates) = {
            let mut sections = self.inner.sections.write().await;
            let snapshot = sections.clone();
            let section_updates = reconcile_positions(sections.as_mut_slice());
            let item_updates: Vec<PositionUpdate> = sections
                .iter_mut()
                .flat_map(|s| reconcile_positions(&mut s.items))
                .collect();
            let touched = section_updates.iter().chain(&item_updates).map(|u| u.id);
            self.hold(touched).await;
            (snapshot, section_updates, item_updates)
        };
        if section_updates.is_empty() && item_updates.is_empty() {
            return Ok(());
        }
        log::info!(
            "Repairing {} section and {} item positions",
            section_updates.len(),
            item_updates.len()
        );
        self.emit(BuilderEvent::Changed);

        let what = "the section order";
        let sections = self
            .write_positions(section_updates, EntityKind::Section, snapshot.clone(), what)
            .await;
        let items = self
            .write_positions(item_updates, EntityKind::Item, snapshot, "the item order")
            .await;
        sections.and(items)
    }

    /// Save the restaurant's name, description, logo and theme
    pub async fn update_settings(&self, settings: RestaurantSettings) -> Result<(), SyncError> {
        self.authorize().await?;
        let settings = settings.validated()?;
        let _op = self.inner.ops.lock().await;
        let id = self.inner.restaurant_id;

        let previous = {
            let mut restaurant = self.inner.restaurant.write().await;
            let current = restaurant.as_mut().ok_or(SyncError::NotLoaded)?;
            let previous = current.clone();
            current.apply_settings(&settings);
            previous
        };
        self.emit(BuilderEvent::Changed);

        let error = match self.inner.store.update_restaurant(id, &settings).await {
            Ok(()) => {
                log::info!("Saved settings of restaurant {}", id);
                return Ok(());
            }
            Err(e) => e,
        };

        log::warn!("Saving settings of restaurant {} failed: {}", id, error);
        match self.inner.config.on_write_failure {
            WriteFailurePolicy::KeepOptimistic => {
                self.notice(NoticeLevel::Warning, "Couldn't save the settings".into());
            }
            WriteFailurePolicy::Rollback => {
                *self.inner.restaurant.write().await = Some(previous);
                self.emit(BuilderEvent::Changed);
                let message = "Couldn't save the settings. Your change was undone.";
                self.notice(NoticeLevel::Error, message.into());
            }
        }
        Err(error.into())
    }

    /// Delete the restaurant and its whole menu, then shut the builder down.
    /// Pending field edits are dropped.
    pub async fn delete_restaurant(&self) -> Result<(), SyncError> {
        self.authorize().await?;
        let id = self.inner.restaurant_id;
        {
            let _op = self.inner.ops.lock().await;
            if let Err(e) = self.inner.store.delete_restaurant(id).await {
                log::warn!("Deleting restaurant {} failed: {}", id, e);
                let message = format!("Couldn't delete the restaurant: {}", e);
                self.notice(NoticeLevel::Error, message);
                return Err(e.into());
            }
            *self.inner.restaurant.write().await = None;
            self.inner.sections.write().await.clear();
        }
        log::info!("Deleted restaurant {}", id);
        self.emit(BuilderEvent::Changed);

        self.close(false).await;
        Ok(())
    }

    /// Snapshot of the local menu
    pub async fn sections(&self) -> Vec<Section> {
        self.inner.sections.read().await.clone()
    }

    pub async fn restaurant(&self) -> Option<Restaurant> {
        self.inner.restaurant.read().await.clone()
    }

    pub async fn status(&self) -> LoadState {
        self.inner.status.read().await.clone()
    }

    pub async fn field_state(&self, id: ItemId, key: FieldKey) -> FieldState {
        self.inner.autosave.state(id, key).await
    }

    /// Entities whose local copy currently outranks the store's
    pub async fn guarded(&self) -> usize {
        self.inner.guard.lock().await.len()
    }

    /// What the public page would show for the local menu
    pub async fn preview(&self) -> Result<PublicMenu, SyncError> {
        let restaurant = self.restaurant().await.ok_or(SyncError::NotLoaded)?;
        let sections = self.inner.sections.read().await;
        Ok(PublicMenu::build(&restaurant, &sections))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BuilderEvent> {
        self.inner.events.subscribe()
    }

    /// Stop watching, then flush or abandon pending field edits per
    /// `MenuboardConfig::flush_on_teardown`. Later edits fail with
    /// `SyncError::ShutDown`.
    pub async fn shutdown(&self) {
        self.close(self.inner.config.flush_on_teardown).await;
    }

    async fn close(&self, flush: bool) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.inner.shutdown_tx.send(());
        self.inner.autosave.shutdown(flush).await;
        log::info!("Menu builder for {} shut down", self.inner.restaurant_id);
    }

    fn ensure_open(&self) -> Result<(), SyncError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(SyncError::ShutDown);
        }
        Ok(())
    }

    async fn authorize(&self) -> Result<(), SyncError> {
        self.ensure_open()?;
        let restaurant = self
            .inner
            .restaurant
            .read()
            .await
            .clone()
            .ok_or(SyncError::NotLoaded)?;
        self.inner.session.authorize_edit(&restaurant).await?;
        Ok(())
    }

    fn emit(&self, event: BuilderEvent) {
        // Nobody listening is fine
        let _ = self.inner.events.send(event);
    }

    fn notice(&self, level: NoticeLevel, message: String) {
        self.emit(BuilderEvent::Notice { level, message });
    }

    /// Mark entities as written locally. Called with the `sections` lock
    /// held, so no refetch can slip in before the mark.
    async fn hold(&self, ids: impl IntoIterator<Item = Uuid>) {
        let mut guard = self.inner.guard.lock().await;
        for id in ids {
            guard.hold(id);
        }
    }

    async fn forget(&self, ids: impl IntoIterator<Item = Uuid>) {
        let mut guard = self.inner.guard.lock().await;
        for id in ids {
            guard.forget(id);
        }
    }

    /// Await one write whose entity `id` is already held
    async fn write_one<F>(
        &self,
        id: Uuid,
        snapshot: Vec<Section>,
        what: &str,
        write: F,
    ) -> Result<(), SyncError>
    where
        F: Future<Output = Result<(), StoreError>>,
    {
        let result = write.await;
        self.inner.guard.lock().await.release(id);

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                log::warn!("Saving {} ({}) failed: {}", what, id, e);
                self.recover(snapshot, &[id], what).await;
                Err(e.into())
            }
        }
    }

    /// Issue position writes concurrently. Every update must already be
    /// held. Each write is independent, so some may land while others fail.
    async fn write_positions(
        &self,
        updates: Vec<PositionUpdate>,
        kind: EntityKind,
        snapshot: Vec<Section>,
        what: &str,
    ) -> Result<(), SyncError> {
        if updates.is_empty() {
            return Ok(());
        }
        let total = updates.len();

        let store = &self.inner.store;
        let results = join_all(updates.iter().map(|u| store.update_position(u, kind))).await;
        {
            let mut guard = self.inner.guard.lock().await;
            for update in &updates {
                guard.release(update.id);
            }
        }

        let mut failed = 0;
        for (update, result) in updates.iter().zip(&results) {
            if let Err(e) = result {
                log::warn!("Position write for {} failed: {}", update.id, e);
                failed += 1;
            }
        }
        if failed == 0 {
            log::debug!("Saved {} {:?} positions", total, kind);
            return Ok(());
        }

        let touched: Vec<Uuid> = updates.iter().map(|u| u.id).collect();
        self.recover(snapshot, &touched, what).await;
        Err(SyncError::RemoteWrite { failed, total })
    }

    async fn recover(&self, snapshot: Vec<Section>, touched: &[Uuid], what: &str) {
        match self.inner.config.on_write_failure {
            WriteFailurePolicy::KeepOptimistic => {
                self.notice(NoticeLevel::Warning, format!("Couldn't save {}", what));
            }
            WriteFailurePolicy::Rollback => {
                {
                    let mut sections = self.inner.sections.write().await;
                    let restored = rolled_back(&sections, &snapshot);
                    *sections = restored;
                }
                log::info!("Rolled back {} after a failed write", what);
                self.emit(BuilderEvent::Changed);

                self.forget(touched.iter().copied()).await;
                // Some writes of the batch may have landed
                if let Err(e) = self.refetch().await {
                    log::warn!("Refetch after rollback failed: {}", e);
                }
                let message = format!("Couldn't save {}. Your change was undone.", what);
                self.notice(NoticeLevel::Error, message);
            }
        }
    }
}
