use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::SourceError;

/// Outcome of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateStatus {
    /// Data received, snapshot replaced.
    #[serde(rename = "OK")]
    Ok,
    /// Call succeeded but the source reported zero records.
    #[serde(rename = "OK_NO_DATA")]
    OkNoData,
    /// Transport or authentication failure.
    #[serde(rename = "ERROR")]
    Error,
}

impl UpdateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStatus::Ok => "OK",
            UpdateStatus::OkNoData => "OK_NO_DATA",
            UpdateStatus::Error => "ERROR",
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, UpdateStatus::Error)
    }
}

impl std::fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What to do with managed records when a poll succeeds but is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyFeedPolicy {
    /// Keep the snapshot and every managed identifier.
    #[default]
    Retain,
    /// Treat the empty poll as authoritative and remove everything.
    Sweep,
}

impl std::str::FromStr for EmptyFeedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "retain" => Ok(EmptyFeedPolicy::Retain),
            "sweep" => Ok(EmptyFeedPolicy::Sweep),
            _ => Err(format!("Unknown empty feed policy: {}", s)),
        }
    }
}

/// Summary of one reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub status: UpdateStatus,
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<SourceError>,
    pub finished_at: DateTime<Utc>,
}

fn serialize_error<S>(error: &Option<SourceError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match error {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

impl CycleReport {
    pub fn summary(&self) -> String {
        format!(
            "{}: {} created, {} updated, {} removed",
            self.status, self.created, self.updated, self.removed
        )
    }
}
