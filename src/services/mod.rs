pub mod entity_manager;
pub mod feed_handle;
pub mod feed_manager;
pub mod registry;

pub use entity_manager::{FeedEntityManager, UpdateOutcome};
pub use feed_handle::FeedHandle;
pub use feed_manager::{FeedManager, FeedNotifier};
pub use registry::FeedRegistry;
