use crate::config::DOMAIN;
use crate::services::FeedHandle;

/// Payload published on the bus.
#[derive(Debug, Clone)]
pub enum Signal {
    /// A record entered the managed set and needs an entity.
    NewRecord {
        feed: FeedHandle,
        external_id: String,
    },
    /// The record behind this channel may have changed.
    Update,
    /// The record behind this channel is gone upstream.
    Delete,
}

/// Channel carrying new-record signals for one feed.
pub fn new_entity_channel(entry_id: &str) -> String {
    format!("{}_new_geolocation_{}", DOMAIN, entry_id)
}

/// Per-record update channel. Depends only on the identifier.
pub fn update_channel(external_id: &str) -> String {
    format!("{}_update_{}", DOMAIN, external_id)
}

/// Per-record delete channel. Depends only on the identifier.
pub fn delete_channel(external_id: &str) -> String {
    format!("{}_delete_{}", DOMAIN, external_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names() {
        assert_eq!(new_entity_channel("abc"), "geofeeder_new_geolocation_abc");
        assert_eq!(update_channel("42"), "geofeeder_update_42");
        assert_eq!(delete_channel("42"), "geofeeder_delete_42");
    }

    #[test]
    fn test_channels_are_per_identifier() {
        assert_eq!(update_channel("7"), update_channel("7"));
        assert_ne!(update_channel("7"), update_channel("70"));
        assert_ne!(update_channel("7"), delete_channel("7"));
    }
}
