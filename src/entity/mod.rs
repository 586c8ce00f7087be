pub mod geo_entity;
pub mod platform;

pub use geo_entity::GeoEntity;
pub use platform::EntityPlatform;
