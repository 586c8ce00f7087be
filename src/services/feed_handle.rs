use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::{Coordinates, DistanceUnit, FeedSnapshot, GeoScope, Record};

/// Cheap, cloneable read view onto a feed's latest snapshot.
///
/// Entities hold one of these to look up their current record. Only the
/// owning [`FeedManager`](crate::services::FeedManager) replaces the snapshot;
/// readers may observe a value that is about to be swapped out.
#[derive(Clone)]
pub struct FeedHandle {
    entry_id: Arc<str>,
    scope: GeoScope,
    unit: DistanceUnit,
    snapshot: Arc<RwLock<FeedSnapshot>>,
}

impl FeedHandle {
    pub fn new(entry_id: &str, scope: GeoScope, unit: DistanceUnit) -> Self {
        Self {
            entry_id: Arc::from(entry_id),
            scope,
            unit,
            snapshot: Arc::new(RwLock::new(FeedSnapshot::new())),
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn scope(&self) -> GeoScope {
        self.scope
    }

    pub fn unit(&self) -> DistanceUnit {
        self.unit
    }

    fn read(&self) -> RwLockReadGuard<'_, FeedSnapshot> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, FeedSnapshot> {
        self.snapshot.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current record for an identifier, if the latest poll reported it.
    pub fn get_entry(&self, external_id: &str) -> Option<Record> {
        self.read().get(external_id).cloned()
    }

    /// Distance from the scope center to the record, in the display unit.
    /// `None` when the identifier is not in the snapshot.
    pub fn get_distance(&self, external_id: &str) -> Option<f64> {
        let snapshot = self.read();
        let entry = snapshot.get(external_id)?;
        let km = self
            .scope
            .center
            .distance_km(&Coordinates::new(entry.lat, entry.lng));
        Some(self.unit.convert_km(km))
    }

    /// All records, ordered by identifier.
    pub fn records(&self) -> Vec<Record> {
        let mut records: Vec<Record> = self.read().values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub(crate) fn replace(&self, snapshot: FeedSnapshot) {
        *self.write() = snapshot;
    }

    pub(crate) fn clear(&self) {
        self.write().clear();
    }
}

impl std::fmt::Debug for FeedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedHandle")
            .field("entry_id", &self.entry_id)
            .field("records", &self.len())
            .finish()
    }
}
