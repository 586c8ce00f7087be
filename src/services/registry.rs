use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::bus::EventBus;
use crate::config::Config;
use crate::entity::EntityPlatform;
use crate::errors::{GeoFeedError, GeoFeedResult};
use crate::services::entity_manager::FeedEntityManager;
use crate::sources::RemoteSource;

/// Host-owned set of running feeds, keyed by entry id.
pub struct FeedRegistry {
    bus: EventBus,
    platform: EntityPlatform,
    entries: Mutex<HashMap<String, Arc<FeedEntityManager>>>,
}

impl FeedRegistry {
    pub fn new(bus: EventBus) -> Self {
        Self {
            platform: EntityPlatform::new(bus.clone()),
            bus,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn platform(&self) -> &EntityPlatform {
        &self.platform
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Arc<FeedEntityManager>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create, wire and start a feed.
    ///
    /// The first poll runs in the background so setup returns as soon as the
    /// login succeeds. On a failed login the entry is unloaded again.
    pub async fn setup_entry(
        &self,
        config: Config,
        source: Arc<dyn RemoteSource>,
    ) -> GeoFeedResult<Arc<FeedEntityManager>> {
        let manager = FeedEntityManager::new(config, source, self.bus.clone());
        self.register(manager.clone())?;
        debug!(entry_id = manager.entry_id(), "Feed entity manager added");

        self.platform.setup(&manager);

        if let Err(err) = manager.init().await {
            self.unload_entry(manager.entry_id())?;
            return Err(err);
        }

        let first = manager.clone();
        tokio::spawn(async move {
            first.update().await;
        });
        Ok(manager)
    }

    fn register(&self, manager: Arc<FeedEntityManager>) -> GeoFeedResult<()> {
        let mut entries = self.entries();
        let config = manager.config();

        if entries.contains_key(manager.entry_id()) {
            return Err(GeoFeedError::AlreadyConfigured(manager.entry_id().to_string()));
        }
        let duplicate = entries.values().any(|existing| {
            let other = existing.config();
            other.username == config.username
                && other.latitude == config.latitude
                && other.longitude == config.longitude
        });
        if duplicate {
            return Err(GeoFeedError::AlreadyConfigured(config.title()));
        }

        entries.insert(manager.entry_id().to_string(), manager.clone());
        Ok(())
    }

    pub fn get(&self, entry_id: &str) -> Option<Arc<FeedEntityManager>> {
        self.entries().get(entry_id).cloned()
    }

    pub fn entry_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Remove a feed's entities, then stop the feed.
    pub fn unload_entry(&self, entry_id: &str) -> GeoFeedResult<()> {
        let manager = self
            .entries()
            .remove(entry_id)
            .ok_or_else(|| GeoFeedError::EntryNotFound(entry_id.to_string()))?;

        let removed = self.platform.unload_entry(entry_id);
        manager.stop();
        debug!(entry_id, removed, "Feed entry unloaded");
        Ok(())
    }

    pub fn unload_all(&self) {
        for entry_id in self.entry_ids() {
            // Only fails if a concurrent unload won the race
            self.unload_entry(&entry_id).ok();
        }
    }
}
