pub mod geo;
pub mod record;
pub mod status;

pub use geo::{Coordinates, DistanceUnit, GeoScope};
pub use record::{Category, FeedSnapshot, Record, Summary};
pub use status::{CycleReport, EmptyFeedPolicy, UpdateStatus};
