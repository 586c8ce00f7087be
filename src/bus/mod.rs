pub mod event_bus;
pub mod signals;

pub use event_bus::{EventBus, Subscription};
pub use signals::{delete_channel, new_entity_channel, update_channel, Signal};
