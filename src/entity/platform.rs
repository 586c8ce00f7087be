use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

use crate::bus::{delete_channel, update_channel, EventBus, Signal, Subscription};
use crate::entity::geo_entity::GeoEntity;
use crate::services::{FeedEntityManager, FeedHandle};

struct TrackedEntity {
    instance: u64,
    entity: GeoEntity,
    subscriptions: Arc<[Subscription; 2]>,
}

#[derive(Default)]
struct PlatformState {
    next_instance: AtomicU64,
    entities: Mutex<HashMap<String, TrackedEntity>>,
}

impl PlatformState {
    fn entities(&self) -> MutexGuard<'_, HashMap<String, TrackedEntity>> {
        self.entities.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process entity layer driven by bus signals.
///
/// Each new-record signal becomes a [`GeoEntity`] with its own task listening
/// on the record's update and delete channels.
#[derive(Clone)]
pub struct EntityPlatform {
    bus: EventBus,
    state: Arc<PlatformState>,
}

impl EntityPlatform {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            state: Arc::new(PlatformState::default()),
        }
    }

    /// Start creating entities for a feed's new records.
    pub fn setup(&self, manager: &FeedEntityManager) {
        let subscription = self.listen(manager.signal_new_entity());
        manager.add_listener(subscription);
        debug!(entry_id = manager.entry_id(), "Geolocation setup done");
    }

    /// Subscribe to a new-record channel. The listening task ends once the
    /// returned subscription is dropped from the bus.
    pub fn listen(&self, signal_new_entity: &str) -> Subscription {
        let (subscription, mut rx) = self.bus.subscribe(signal_new_entity);
        let platform = self.clone();

        tokio::spawn(async move {
            while let Some(signal) = rx.recv().await {
                if let Signal::NewRecord { feed, external_id } = signal {
                    platform.add_entity(feed, &external_id);
                }
            }
        });
        subscription
    }

    fn add_entity(&self, feed: FeedHandle, external_id: &str) {
        // Subscribe before reading the snapshot, so a removal cycle either
        // shows up in the snapshot or on the delete channel.
        let (delete_sub, delete_rx) = self.bus.subscribe(delete_channel(external_id));
        let (update_sub, update_rx) = self.bus.subscribe(update_channel(external_id));
        let subscriptions = Arc::new([delete_sub, update_sub]);

        let mut entity = GeoEntity::new(&feed, external_id);
        if !entity.refresh(&feed) {
            debug!(unique_id = %entity.unique_id, "Record gone before entity was added");
            unsubscribe_all(&subscriptions);
            return;
        }
        info!(unique_id = %entity.unique_id, name = ?entity.name, "Adding geolocation");

        let instance = self.state.next_instance.fetch_add(1, Ordering::SeqCst);
        let unique_id = entity.unique_id.clone();
        let replaced = self.state.entities().insert(
            unique_id.clone(),
            TrackedEntity {
                instance,
                entity,
                subscriptions: subscriptions.clone(),
            },
        );
        if let Some(old) = replaced {
            unsubscribe_all(&old.subscriptions);
        }

        let platform = self.clone();
        tokio::spawn(async move {
            platform
                .run_entity(unique_id, instance, feed, subscriptions, update_rx, delete_rx)
                .await;
        });
    }

    async fn run_entity(
        &self,
        unique_id: String,
        instance: u64,
        feed: FeedHandle,
        subscriptions: Arc<[Subscription; 2]>,
        mut update_rx: UnboundedReceiver<Signal>,
        mut delete_rx: UnboundedReceiver<Signal>,
    ) {
        loop {
            tokio::select! {
                biased;
                signal = delete_rx.recv() => {
                    if signal.is_some() {
                        unsubscribe_all(&subscriptions);
                        self.remove_instance(&unique_id, instance);
                    }
                    break;
                }
                signal = update_rx.recv() => {
                    if signal.is_none() {
                        break;
                    }
                    self.refresh_instance(&unique_id, instance, &feed);
                }
            }
        }
    }

    fn refresh_instance(&self, unique_id: &str, instance: u64, feed: &FeedHandle) {
        let mut entities = self.state.entities();
        if let Some(tracked) = entities.get_mut(unique_id) {
            if tracked.instance == instance {
                debug!(unique_id, "Updating geolocation");
                tracked.entity.refresh(feed);
            }
        }
    }

    fn remove_instance(&self, unique_id: &str, instance: u64) {
        let mut entities = self.state.entities();
        // A newer entity may already have taken over this id
        if entities.get(unique_id).map(|t| t.instance) == Some(instance) {
            entities.remove(unique_id);
            info!(unique_id, "Removing geolocation");
        }
    }

    /// Drop every entity belonging to a feed.
    pub fn unload_entry(&self, entry_id: &str) -> usize {
        let mut entities = self.state.entities();
        let ids: Vec<String> = entities
            .iter()
            .filter(|(_, t)| t.entity.entry_id == entry_id)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &ids {
            if let Some(tracked) = entities.remove(id) {
                unsubscribe_all(&tracked.subscriptions);
            }
        }
        ids.len()
    }

    pub fn get(&self, unique_id: &str) -> Option<GeoEntity> {
        self.state.entities().get(unique_id).map(|t| t.entity.clone())
    }

    /// Snapshot of all live entities, ordered by unique id.
    pub fn entities(&self) -> Vec<GeoEntity> {
        let mut entities: Vec<GeoEntity> = self
            .state
            .entities()
            .values()
            .map(|t| t.entity.clone())
            .collect();
        entities.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));
        entities
    }

    pub fn len(&self) -> usize {
        self.state.entities().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn unsubscribe_all(subscriptions: &[Subscription; 2]) {
    for subscription in subscriptions {
        subscription.unsubscribe();
    }
}
