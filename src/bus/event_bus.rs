use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::bus::signals::Signal;

struct Listener {
    id: u64,
    tx: UnboundedSender<Signal>,
}

#[derive(Default)]
struct BusState {
    next_id: u64,
    channels: HashMap<String, Vec<Listener>>,
}

fn lock(state: &Mutex<BusState>) -> MutexGuard<'_, BusState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Publish/subscribe hub keyed by channel name.
///
/// Each subscriber gets its own unbounded queue, so `publish` never waits on
/// a slow consumer. Receivers that have been dropped are pruned on the next
/// publish to their channel.
#[derive(Clone, Default)]
pub struct EventBus {
    state: Arc<Mutex<BusState>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, channel: impl Into<String>) -> (Subscription, UnboundedReceiver<Signal>) {
        let channel = channel.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut state = lock(&self.state);
        state.next_id += 1;
        let id = state.next_id;
        state
            .channels
            .entry(channel.clone())
            .or_default()
            .push(Listener { id, tx });

        let subscription = Subscription {
            bus: Arc::downgrade(&self.state),
            channel,
            id,
            active: AtomicBool::new(true),
        };
        (subscription, rx)
    }

    /// Send `signal` to every live subscriber of `channel`.
    /// Returns how many subscribers received it.
    pub fn publish(&self, channel: &str, signal: Signal) -> usize {
        let mut state = lock(&self.state);
        let Some(listeners) = state.channels.get_mut(channel) else {
            return 0;
        };

        listeners.retain(|l| !l.tx.is_closed());
        let delivered = listeners
            .iter()
            .filter(|l| l.tx.send(signal.clone()).is_ok())
            .count();

        if listeners.is_empty() {
            state.channels.remove(channel);
        }
        delivered
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        lock(&self.state)
            .channels
            .get(channel)
            .map(|l| l.iter().filter(|l| !l.tx.is_closed()).count())
            .unwrap_or(0)
    }
}

/// Handle returned by [`EventBus::subscribe`].
pub struct Subscription {
    bus: Weak<Mutex<BusState>>,
    channel: String,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Detach from the bus. Returns false if already detached.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::SeqCst) {
            return false;
        }
        let Some(state) = self.bus.upgrade() else {
            return false;
        };

        let mut state = lock(&state);
        let Some(listeners) = state.channels.get_mut(&self.channel) else {
            return false;
        };

        let before = listeners.len();
        listeners.retain(|l| l.id != self.id);
        let removed = listeners.len() != before;

        if listeners.is_empty() {
            state.channels.remove(&self.channel);
        }
        removed
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
