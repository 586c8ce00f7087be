use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of report carried by a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    SpeedTrap,
    SpeedCamera,
    Checkpoint,
    Accident,
    Roadwork,
    Hazard,
    #[serde(other)]
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::SpeedTrap,
        Category::SpeedCamera,
        Category::Checkpoint,
        Category::Accident,
        Category::Roadwork,
        Category::Hazard,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::SpeedTrap => "speed_trap",
            Category::SpeedCamera => "speed_camera",
            Category::Checkpoint => "checkpoint",
            Category::Accident => "accident",
            Category::Roadwork => "roadwork",
            Category::Hazard => "hazard",
            Category::Other => "other",
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Accepts an identifier sent either as a JSON string or a JSON number.
fn deserialize_external_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    use std::fmt;

    struct ExternalIdVisitor;

    impl<'de> Visitor<'de> for ExternalIdVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or integer identifier")
        }

        fn visit_i64<E>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_str<E>(self, v: &str) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(ExternalIdVisitor)
}

/// Lightweight listing entry returned by a radius search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(deserialize_with = "deserialize_external_id")]
    pub id: String,
    pub lat: f64,
    pub lng: f64,
}

/// One upstream record with full details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(deserialize_with = "deserialize_external_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "type", alias = "category", default = "default_category")]
    pub category: Category,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

fn default_category() -> Category {
    Category::Other
}

impl Record {
    pub fn new(id: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            lat,
            lng,
            category: Category::Other,
            description: None,
            last_seen: None,
            timestamp: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_timestamps(
        mut self,
        timestamp: Option<DateTime<Utc>>,
        last_seen: Option<DateTime<Utc>>,
    ) -> Self {
        self.timestamp = timestamp;
        self.last_seen = last_seen;
        self
    }

    /// Most recent sighting, falling back to the report time.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_seen.or(self.timestamp)
    }
}

/// Latest poll result keyed by external identifier.
pub type FeedSnapshot = HashMap<String, Record>;
