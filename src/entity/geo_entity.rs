use chrono::{Local, SecondsFormat};
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::DOMAIN;
use crate::domain::{Category, DistanceUnit, Record};
use crate::services::FeedHandle;

/// Display-side view of one managed record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoEntity {
    pub unique_id: String,
    pub entry_id: String,
    pub external_id: String,
    pub source: &'static str,
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub distance: Option<f64>,
    pub unit: DistanceUnit,
    pub category: Option<Category>,
    pub description: Option<String>,
    pub last_updated: Option<String>,
    pub details: Option<Value>,
}

impl GeoEntity {
    pub fn new(feed: &FeedHandle, external_id: &str) -> Self {
        Self {
            unique_id: format!("{}_{}", feed.entry_id(), external_id),
            entry_id: feed.entry_id().to_string(),
            external_id: external_id.to_string(),
            source: DOMAIN,
            name: None,
            latitude: None,
            longitude: None,
            distance: None,
            unit: feed.unit(),
            category: None,
            description: None,
            last_updated: None,
            details: None,
        }
    }

    /// Pull the current record from the feed. Returns false if it is gone.
    pub fn refresh(&mut self, feed: &FeedHandle) -> bool {
        match feed.get_entry(&self.external_id) {
            Some(entry) => {
                let distance = feed.get_distance(&self.external_id);
                self.update_from_feed(&entry, distance);
                true
            }
            None => false,
        }
    }

    fn update_from_feed(&mut self, entry: &Record, distance: Option<f64>) {
        self.name = Some(entry.title.clone());
        self.latitude = Some(entry.lat);
        self.longitude = Some(entry.lng);
        self.distance = distance;
        self.category = Some(entry.category);
        self.description = entry.description.clone();
        if let Some(last_updated) = entry.last_updated() {
            self.last_updated = Some(
                last_updated
                    .with_timezone(&Local)
                    .to_rfc3339_opts(SecondsFormat::Secs, false),
            );
        }
        self.details = serde_json::to_value(entry).ok();
    }

    pub fn attributes(&self) -> Value {
        json!({
            "external_id": self.external_id,
            "type": self.category.map(|c| c.as_str()),
            "description": self.description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Coordinates, FeedSnapshot, GeoScope};
    use chrono::{DateTime, TimeZone, Utc};

    fn feed_with(record: Record) -> FeedHandle {
        let feed = FeedHandle::new(
            "entry",
            GeoScope::new(Coordinates::new(59.9139, 10.7522), 20.0),
            DistanceUnit::Kilometers,
        );
        feed.replace(FeedSnapshot::from([(record.id.clone(), record)]));
        feed
    }

    #[test]
    fn test_refresh_copies_record() {
        let seen = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let record = Record::new("9", 60.0, 10.7522)
            .with_title("Checkpoint E18")
            .with_category(Category::Checkpoint)
            .with_description(Some("Both directions".to_string()))
            .with_timestamps(None, Some(seen));
        let feed = feed_with(record);

        let mut entity = GeoEntity::new(&feed, "9");
        assert!(entity.refresh(&feed));

        assert_eq!(entity.unique_id, "entry_9");
        assert_eq!(entity.name.as_deref(), Some("Checkpoint E18"));
        assert_eq!(entity.category, Some(Category::Checkpoint));
        assert!(entity.distance.unwrap() > 9.0);
        let parsed = DateTime::parse_from_rfc3339(entity.last_updated.as_deref().unwrap()).unwrap();
        assert_eq!(parsed.with_timezone(&Utc), seen);
        assert_eq!(entity.details.as_ref().unwrap()["id"], "9");

        let attrs = entity.attributes();
        assert_eq!(attrs["external_id"], "9");
        assert_eq!(attrs["type"], "checkpoint");
        assert_eq!(attrs["description"], "Both directions");
    }

    #[test]
    fn test_refresh_missing_record_keeps_state() {
        let feed = feed_with(Record::new("1", 60.0, 10.0).with_title("Old"));
        let mut entity = GeoEntity::new(&feed, "1");
        entity.refresh(&feed);

        feed.clear();
        assert!(!entity.refresh(&feed));
        assert_eq!(entity.name.as_deref(), Some("Old"));
    }
}
