use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::bus::{delete_channel, new_entity_channel, update_channel, EventBus, Signal, Subscription};
use crate::config::Config;
use crate::domain::{CycleReport, Record};
use crate::errors::{GeoFeedError, GeoFeedResult};
use crate::services::feed_handle::FeedHandle;
use crate::services::feed_manager::{FeedManager, FeedNotifier};
use crate::sources::RemoteSource;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Result of [`FeedEntityManager::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Completed(CycleReport),
    /// Another cycle was already running; this call did nothing.
    Skipped,
}

/// Turns feed manager callbacks into bus signals.
struct BusNotifier {
    bus: EventBus,
    handle: FeedHandle,
    signal_new_entity: String,
}

#[async_trait]
impl FeedNotifier for BusNotifier {
    async fn create(&self, external_id: &str) {
        self.bus.publish(
            &self.signal_new_entity,
            Signal::NewRecord {
                feed: self.handle.clone(),
                external_id: external_id.to_string(),
            },
        );
    }

    async fn update(&self, external_id: &str) {
        self.bus.publish(&update_channel(external_id), Signal::Update);
    }

    async fn remove(&self, external_id: &str) {
        self.bus.publish(&delete_channel(external_id), Signal::Delete);
    }

    async fn status(&self, report: &CycleReport) {
        if !report.status.is_success() {
            return;
        }
        info!(
            entry_id = self.handle.entry_id(),
            status = %report.status,
            created = report.created,
            updated = report.updated,
            removed = report.removed,
            "Feed updated"
        );
    }
}

/// Owns one feed: its client, its polling timer and its bus wiring.
///
/// Cycles are single-flight. A tick or manual [`update`](Self::update) that
/// arrives while a cycle is running is skipped rather than queued.
pub struct FeedEntityManager {
    config: Config,
    source: Arc<dyn RemoteSource>,
    handle: FeedHandle,
    feed_manager: tokio::sync::Mutex<FeedManager>,
    signal_new_entity: String,
    shutdown: CancellationToken,
    timer: Mutex<Option<JoinHandle<()>>>,
    listeners: Mutex<Vec<Subscription>>,
}

impl FeedEntityManager {
    pub fn new(config: Config, source: Arc<dyn RemoteSource>, bus: EventBus) -> Arc<Self> {
        let handle = FeedHandle::new(&config.entry_id, config.scope(), config.unit);
        let signal_new_entity = new_entity_channel(&config.entry_id);

        let notifier = Arc::new(BusNotifier {
            bus,
            handle: handle.clone(),
            signal_new_entity: signal_new_entity.clone(),
        });
        let feed_manager = FeedManager::new(source.clone(), notifier, handle.clone())
            .with_category_filter(config.category_filter.clone())
            .with_empty_policy(config.empty_policy);

        Arc::new(Self {
            config,
            source,
            handle,
            feed_manager: tokio::sync::Mutex::new(feed_manager),
            signal_new_entity,
            shutdown: CancellationToken::new(),
            timer: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn entry_id(&self) -> &str {
        &self.config.entry_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Channel the entity layer listens on for new records.
    pub fn signal_new_entity(&self) -> &str {
        &self.signal_new_entity
    }

    pub fn handle(&self) -> FeedHandle {
        self.handle.clone()
    }

    /// Keep a bus subscription alive until [`stop`](Self::stop).
    pub fn add_listener(&self, subscription: Subscription) {
        if self.is_stopped() {
            subscription.unsubscribe();
            return;
        }
        lock(&self.listeners).push(subscription);
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Start the polling timer, then log in.
    ///
    /// The timer is registered first so polling resumes on its own once the
    /// credentials are fixed. A rejected login is returned as
    /// [`GeoFeedError::ReauthRequired`].
    pub async fn init(self: &Arc<Self>) -> GeoFeedResult<()> {
        self.start_timer();

        if let Err(err) = self
            .source
            .authenticate(&self.config.username, &self.config.password)
            .await
        {
            error!(entry_id = self.entry_id(), error = %err, "Error authenticating account");
            return Err(if err.is_auth() {
                GeoFeedError::ReauthRequired(err)
            } else {
                GeoFeedError::Source(err)
            });
        }

        debug!(entry_id = self.entry_id(), "Feed entity manager initialized");
        Ok(())
    }

    fn start_timer(self: &Arc<Self>) {
        let mut timer = lock(&self.timer);
        if timer.is_some() || self.is_stopped() {
            return;
        }

        let manager = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        let period = self.config.update_interval;

        *timer = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                // Cancellation is only observed between cycles
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.update().await;
            }
            debug!("Update timer finished");
        }));
    }

    /// Run one reconciliation cycle unless one is already in flight.
    pub async fn update(&self) -> UpdateOutcome {
        let Ok(mut feed_manager) = self.feed_manager.try_lock() else {
            debug!(entry_id = self.entry_id(), "Update already in progress, skipping");
            return UpdateOutcome::Skipped;
        };

        let report = feed_manager.update().await;
        debug!(entry_id = self.entry_id(), "Feed entity manager updated");
        UpdateOutcome::Completed(report)
    }

    /// Stop future cycles and drop every bus listener. Safe to call twice.
    ///
    /// A cycle already running is left to finish and may still publish.
    pub fn stop(&self) {
        self.shutdown.cancel();
        let timer = lock(&self.timer).take();
        let listeners = std::mem::take(&mut *lock(&self.listeners));

        for listener in &listeners {
            listener.unsubscribe();
        }
        if timer.is_some() || !listeners.is_empty() {
            debug!(entry_id = self.entry_id(), "Feed entity manager stopped");
        }
    }

    pub fn get_entry(&self, external_id: &str) -> Option<Record> {
        self.handle.get_entry(external_id)
    }

    pub fn get_distance(&self, external_id: &str) -> Option<f64> {
        self.handle.get_distance(external_id)
    }
}

impl Drop for FeedEntityManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::config::DEFAULT_UPDATE_INTERVAL;
    use crate::domain::{DistanceUnit, EmptyFeedPolicy, Summary};
    use crate::errors::SourceError;
    use crate::sources::MockRemoteSource;

    fn config() -> Config {
        Config {
            entry_id: "entry1".to_string(),
            username: "ola".to_string(),
            password: "hunter2".to_string(),
            latitude: 59.9139,
            longitude: 10.7522,
            radius_km: 20.0,
            category_filter: Vec::new(),
            unit: DistanceUnit::Kilometers,
            api_url: "http://127.0.0.1:9".to_string(),
            empty_policy: EmptyFeedPolicy::Retain,
            update_interval: DEFAULT_UPDATE_INTERVAL,
        }
    }

    /// Source whose polls return the ids currently stored in `ids`.
    fn shared_source(ids: Arc<Mutex<Vec<&'static str>>>, polls: Arc<AtomicUsize>) -> MockRemoteSource {
        let mut source = MockRemoteSource::new();
        source.expect_authenticate().returning(|_, _| Ok(()));
        source.expect_list_in_radius().returning(move |_, _, _| {
            polls.fetch_add(1, Ordering::SeqCst);
            Ok(ids
                .lock()
                .unwrap()
                .iter()
                .map(|id| Summary {
                    id: id.to_string(),
                    lat: 60.0,
                    lng: 10.7522,
                })
                .collect())
        });
        source.expect_fetch_details().returning(|summaries: &[Summary]| {
            Ok(summaries
                .iter()
                .map(|s| Record::new(s.id.clone(), s.lat, s.lng))
                .collect())
        });
        source
    }

    #[tokio::test]
    async fn test_update_publishes_lifecycle_signals() {
        let bus = EventBus::new();
        let ids = Arc::new(Mutex::new(vec!["7"]));
        let source = shared_source(ids.clone(), Arc::new(AtomicUsize::new(0)));
        let manager = FeedEntityManager::new(config(), Arc::new(source), bus.clone());

        let (_new, mut new_rx) = bus.subscribe(manager.signal_new_entity());
        let (_upd, mut update_rx) = bus.subscribe(update_channel("7"));
        let (_del, mut delete_rx) = bus.subscribe(delete_channel("7"));

        // First cycle announces the record with a handle back to the feed
        manager.update().await;
        match new_rx.try_recv() {
            Ok(Signal::NewRecord { feed, external_id }) => {
                assert_eq!(external_id, "7");
                assert_eq!(feed.entry_id(), "entry1");
                assert!(feed.get_entry("7").is_some());
            }
            other => panic!("expected new record signal, got {:?}", other),
        }

        // Second cycle with the same record only updates
        manager.update().await;
        assert!(matches!(update_rx.try_recv(), Ok(Signal::Update)));
        assert!(new_rx.try_recv().is_err());

        // Record disappears upstream
        ids.lock().unwrap().clear();
        ids.lock().unwrap().push("8");
        manager.update().await;
        assert!(matches!(delete_rx.try_recv(), Ok(Signal::Delete)));
        assert!(manager.get_entry("7").is_none());
        assert!(manager.get_entry("8").is_some());
    }

    #[tokio::test]
    async fn test_lookups() {
        let ids = Arc::new(Mutex::new(vec!["1"]));
        let source = shared_source(ids, Arc::new(AtomicUsize::new(0)));
        let manager = FeedEntityManager::new(config(), Arc::new(source), EventBus::new());

        assert!(manager.get_entry("1").is_none());
        assert!(manager.get_distance("1").is_none());

        manager.update().await;

        assert_eq!(manager.get_entry("1").unwrap().lat, 60.0);
        let distance = manager.get_distance("1").unwrap();
        assert!((9.0..10.5).contains(&distance), "got {}", distance);
        assert!(manager.get_distance("missing").is_none());
    }

    #[tokio::test]
    async fn test_overlapping_update_is_skipped() {
        let ids = Arc::new(Mutex::new(vec!["1"]));
        let polls = Arc::new(AtomicUsize::new(0));
        let source = shared_source(ids, polls.clone());
        let manager = FeedEntityManager::new(config(), Arc::new(source), EventBus::new());

        let in_flight = manager.feed_manager.lock().await;
        assert_eq!(manager.update().await, UpdateOutcome::Skipped);
        drop(in_flight);

        assert!(matches!(manager.update().await, UpdateOutcome::Completed(_)));
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_init_rejected_credentials() {
        let mut source = MockRemoteSource::new();
        source
            .expect_authenticate()
            .returning(|_, _| Err(SourceError::Authentication("bad password".to_string())));
        let manager = FeedEntityManager::new(config(), Arc::new(source), EventBus::new());

        let err = manager.init().await.unwrap_err();

        assert!(matches!(err, GeoFeedError::ReauthRequired(_)));
        assert!(lock(&manager.timer).is_some());
        manager.stop();
    }

    #[tokio::test]
    async fn test_init_transport_failure() {
        let mut source = MockRemoteSource::new();
        source
            .expect_authenticate()
            .returning(|_, _| Err(SourceError::Transport("refused".to_string())));
        let manager = FeedEntityManager::new(config(), Arc::new(source), EventBus::new());

        let err = manager.init().await.unwrap_err();

        assert!(matches!(err, GeoFeedError::Source(SourceError::Transport(_))));
        manager.stop();
    }

    #[tokio::test]
    async fn test_init_passes_credentials() {
        let mut source = MockRemoteSource::new();
        source
            .expect_authenticate()
            .withf(|user, pass| user == "ola" && pass == "hunter2")
            .times(1)
            .returning(|_, _| Ok(()));
        let manager = FeedEntityManager::new(config(), Arc::new(source), EventBus::new());

        manager.init().await.unwrap();
        manager.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_polls_until_stopped() {
        let ids = Arc::new(Mutex::new(vec!["1"]));
        let polls = Arc::new(AtomicUsize::new(0));
        let source = shared_source(ids, polls.clone());
        let manager = FeedEntityManager::new(config(), Arc::new(source), EventBus::new());

        manager.init().await.unwrap();
        assert_eq!(polls.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_secs(301)).await;
        assert_eq!(polls.load(Ordering::SeqCst), 1);

        time::sleep(Duration::from_secs(300)).await;
        assert_eq!(polls.load(Ordering::SeqCst), 2);

        manager.stop();
        time::sleep(Duration::from_secs(900)).await;
        assert_eq!(polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_runs_after_failed_login() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        let mut source = MockRemoteSource::new();
        source
            .expect_authenticate()
            .returning(|_, _| Err(SourceError::Authentication("expired".to_string())));
        source.expect_list_in_radius().returning(move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(SourceError::NotAuthenticated)
        });
        let manager = FeedEntityManager::new(config(), Arc::new(source), EventBus::new());

        assert!(manager.init().await.is_err());
        time::sleep(Duration::from_secs(301)).await;

        assert_eq!(polls.load(Ordering::SeqCst), 1);
        manager.stop();
    }

    #[tokio::test]
    async fn test_stop_twice() {
        let bus = EventBus::new();
        let manager = FeedEntityManager::new(config(), Arc::new(MockRemoteSource::new()), bus.clone());
        let (subscription, _rx) = bus.subscribe(manager.signal_new_entity());
        manager.add_listener(subscription);
        assert_eq!(bus.subscriber_count(manager.signal_new_entity()), 1);

        manager.stop();
        assert!(manager.is_stopped());
        assert_eq!(bus.subscriber_count(manager.signal_new_entity()), 0);
        assert!(lock(&manager.listeners).is_empty());

        manager.stop();
        assert_eq!(bus.subscriber_count(manager.signal_new_entity()), 0);
    }

    #[tokio::test]
    async fn test_listener_added_after_stop_is_dropped() {
        let bus = EventBus::new();
        let manager = FeedEntityManager::new(config(), Arc::new(MockRemoteSource::new()), bus.clone());
        manager.stop();

        let (subscription, _rx) = bus.subscribe(manager.signal_new_entity());
        manager.add_listener(subscription);

        assert_eq!(bus.subscriber_count(manager.signal_new_entity()), 0);
    }
}
