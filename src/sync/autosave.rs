//! Debounced field writes
//!
//! Each `(item, field)` pair moves through
//! `Clean -> Dirty(v) -> InFlight(v) -> Clean`. An edit marks the field
//! dirty and restarts its coalescing timer; only when the timer runs out
//! without another edit is the newest value written. An edit made while a
//! write is in flight does not cancel it. The newer value is written once
//! its own timer has run out and the earlier write has resolved. A failed
//! write leaves the field dirty with the value that failed, to be sent by
//! the next edit or an explicit `flush`.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{broadcast, Mutex};

use super::guard::VersionGuard;
use super::{BuilderEvent, NoticeLevel};
use crate::menu::{FieldKey, ItemField, ItemId};
use crate::store::MenuStore;

type SlotKey = (ItemId, FieldKey);

/// Where one field is in its save cycle
#[derive(Clone, Debug, PartialEq)]
pub enum FieldState {
    Clean,
    Dirty(ItemField),
    InFlight(ItemField),
}

#[derive(Default)]
struct Slot {
    dirty: Option<ItemField>,
    in_flight: Option<ItemField>,
    generation: u64,
    /// The timer ran out while a write was in flight
    due: bool,
}

struct AutosaveInner {
    store: Arc<dyn MenuStore>,
    guard: Arc<Mutex<VersionGuard>>,
    events: broadcast::Sender<BuilderEvent>,
    window: Duration,
    slots: Mutex<HashMap<SlotKey, Slot>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl AutosaveInner {
    /// Send the dirty value for `key`. With `expected` set, only if no edit
    /// has arrived since that timer was armed.
    async fn fire(&self, key: SlotKey, expected: Option<u64>) {
        let mut expected = expected;
        loop {
            let value = {
                let mut slots = self.slots.lock().await;
                let slot = match slots.get_mut(&key) {
                    Some(slot) => slot,
                    None => return,
                };
                if let Some(generation) = expected.take() {
                    if slot.generation != generation {
                        return;
                    }
                }
                if slot.in_flight.is_some() {
                    slot.due = true;
                    return;
                }
                let value = match slot.dirty.take() {
                    Some(value) => value,
                    None => return,
                };
                slot.due = false;
                slot.in_flight = Some(value.clone());
                value
            };

            log::debug!("Writing {:?} of item {}", key.1, key.0);
            let result = self.store.update_item_field(key.0, &value).await;

            let mut slots = self.slots.lock().await;
            let slot = match slots.get_mut(&key) {
                Some(slot) => slot,
                // Discarded while the write was out
                None => return,
            };
            slot.in_flight = None;

            match result {
                Ok(()) => {
                    let _ = self.events.send(BuilderEvent::FieldSaved {
                        item_id: key.0,
                        field: key.1,
                    });
                    if slot.dirty.is_none() {
                        slots.remove(&key);
                        self.guard.lock().await.release(key.0);
                        return;
                    }
                }
                Err(e) => {
                    log::warn!("Saving {} of item {} failed: {}", key.1.column(), key.0, e);
                    let _ = self.events.send(BuilderEvent::Notice {
                        level: NoticeLevel::Error,
                        message: format!("Couldn't save {}: {}", key.1.column(), e),
                    });
                    if slot.dirty.is_none() {
                        slot.dirty = Some(value);
                        return;
                    }
                }
            }

            // A newer value is waiting; send it now only if its timer already ran out
            if !slot.due {
                return;
            }
        }
    }
}

/// Coalesces field edits into one write per quiet period
#[derive(Clone)]
pub struct FieldAutosave {
    inner: Arc<AutosaveInner>,
}

impl FieldAutosave {
    pub fn new(
        store: Arc<dyn MenuStore>,
        guard: Arc<Mutex<VersionGuard>>,
        events: broadcast::Sender<BuilderEvent>,
        window: Duration,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(AutosaveInner {
                store,
                guard,
                events,
                window,
                slots: Mutex::new(HashMap::new()),
                shutdown_tx,
            }),
        }
    }

    /// Record a new value and restart the field's coalescing timer
    pub async fn record(&self, item_id: ItemId, field: ItemField) {
        let key = (item_id, field.key());
        let generation = {
            let mut slots = self.inner.slots.lock().await;
            let slot = match slots.entry(key) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    self.inner.guard.lock().await.hold(item_id);
                    entry.insert(Slot::default())
                }
            };
            slot.dirty = Some(field);
            slot.due = false;
            slot.generation += 1;
            slot.generation
        };
        self.arm(key, generation);
    }

    fn arm(&self, key: SlotKey, generation: u64) {
        let inner = Arc::clone(&self.inner);
        let mut shutdown = inner.shutdown_tx.subscribe();
        log::debug!("Armed {:?} timer for item {}", key.1, key.0);

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(inner.window) => {
                    inner.fire(key, Some(generation)).await;
                }
                _ = shutdown.recv() => {}
            }
        });
    }

    pub async fn state(&self, item_id: ItemId, key: FieldKey) -> FieldState {
        let slots = self.inner.slots.lock().await;
        match slots.get(&(item_id, key)) {
            Some(Slot { in_flight: Some(value), .. }) => FieldState::InFlight(value.clone()),
            Some(Slot { dirty: Some(value), .. }) => FieldState::Dirty(value.clone()),
            _ => FieldState::Clean,
        }
    }

    /// Number of fields not yet confirmed by the store
    pub async fn pending(&self) -> usize {
        self.inner.slots.lock().await.len()
    }

    /// Write every dirty field now, without waiting for its timer
    pub async fn flush(&self) {
        let keys: Vec<SlotKey> = {
            let slots = self.inner.slots.lock().await;
            slots
                .iter()
                .filter(|(_, slot)| slot.dirty.is_some())
                .map(|(key, _)| *key)
                .collect()
        };
        if keys.is_empty() {
            return;
        }
        log::debug!("Flushing {} pending field edits", keys.len());
        join_all(keys.into_iter().map(|key| self.inner.fire(key, None))).await;
    }

    /// Drop pending edits for a deleted item
    pub async fn discard_item(&self, item_id: ItemId) {
        let mut slots = self.inner.slots.lock().await;
        let before = slots.len();
        slots.retain(|(id, _), _| *id != item_id);
        let dropped = before - slots.len();
        if dropped > 0 {
            let mut guard = self.inner.guard.lock().await;
            for _ in 0..dropped {
                guard.release(item_id);
            }
        }
    }

    /// Cancel all timers, then either flush or abandon what is pending
    pub async fn shutdown(&self, flush: bool) {
        let _ = self.inner.shutdown_tx.send(());
        if flush {
            self.flush().await;
            return;
        }

        let mut slots = self.inner.slots.lock().await;
        let abandoned: Vec<SlotKey> = slots
            .iter()
            .filter(|(_, slot)| slot.in_flight.is_none())
            .map(|(key, _)| *key)
            .collect();
        if abandoned.is_empty() {
            return;
        }
        log::warn!("Abandoning {} unsaved field edits", abandoned.len());
        let mut guard = self.inner.guard.lock().await;
        for key in abandoned {
            slots.remove(&key);
            guard.release(key.0);
        }
    }
}
