use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::domain::{
    Category, CycleReport, EmptyFeedPolicy, FeedSnapshot, Record, UpdateStatus,
};
use crate::errors::SourceError;
use crate::services::feed_handle::FeedHandle;
use crate::sources::RemoteSource;

/// Receives the create/update/remove work produced by a cycle.
#[async_trait]
pub trait FeedNotifier: Send + Sync {
    async fn create(&self, external_id: &str);

    async fn update(&self, external_id: &str);

    async fn remove(&self, external_id: &str);

    /// Called once at the end of every cycle.
    async fn status(&self, report: &CycleReport) {
        debug!(
            status = %report.status,
            created = report.created,
            updated = report.updated,
            removed = report.removed,
            "Update status"
        );
    }
}

/// Reconciles each poll against the set of identifiers already announced.
///
/// After a cycle the managed set equals the snapshot's identifiers when the
/// poll succeeded, and is empty when it failed. `update` takes `&mut self`,
/// so callers that share a manager must serialize cycles themselves.
pub struct FeedManager {
    source: Arc<dyn RemoteSource>,
    notifier: Arc<dyn FeedNotifier>,
    handle: FeedHandle,
    category_filter: Vec<Category>,
    empty_policy: EmptyFeedPolicy,
    managed_external_ids: HashSet<String>,
    last_update: Option<DateTime<Utc>>,
    last_update_successful: Option<DateTime<Utc>>,
}

impl FeedManager {
    pub fn new(
        source: Arc<dyn RemoteSource>,
        notifier: Arc<dyn FeedNotifier>,
        handle: FeedHandle,
    ) -> Self {
        Self {
            source,
            notifier,
            handle,
            category_filter: Vec::new(),
            empty_policy: EmptyFeedPolicy::default(),
            managed_external_ids: HashSet::new(),
            last_update: None,
            last_update_successful: None,
        }
    }

    /// Only keep records of these categories. Empty keeps everything.
    pub fn with_category_filter(mut self, categories: Vec<Category>) -> Self {
        self.category_filter = categories;
        self
    }

    pub fn with_empty_policy(mut self, policy: EmptyFeedPolicy) -> Self {
        self.empty_policy = policy;
        self
    }

    pub fn handle(&self) -> &FeedHandle {
        &self.handle
    }

    pub fn managed_external_ids(&self) -> &HashSet<String> {
        &self.managed_external_ids
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    pub fn last_update_successful(&self) -> Option<DateTime<Utc>> {
        self.last_update_successful
    }

    /// Poll the source once and notify about every change.
    ///
    /// Client errors never escape; they turn the cycle into an
    /// [`UpdateStatus::Error`] that sweeps every managed record.
    pub async fn update(&mut self) -> CycleReport {
        let (status, feed_entries, error) = match self.fetch().await {
            Ok(Some(records)) => (UpdateStatus::Ok, records, None),
            Ok(None) => (UpdateStatus::OkNoData, Vec::new(), None),
            Err(err) => (UpdateStatus::Error, Vec::new(), Some(err)),
        };

        let now = Utc::now();
        self.last_update = Some(now);
        let mut count_created = 0;
        let mut count_updated = 0;
        let mut count_removed = 0;

        match status {
            UpdateStatus::Ok => {
                self.last_update_successful = Some(now);
                let snapshot = self.build_snapshot(feed_entries);
                let feed_external_ids: HashSet<String> = snapshot.keys().cloned().collect();
                self.handle.replace(snapshot);

                // Removal only looks at the pre-cycle managed set
                count_removed = self.remove_entries(&feed_external_ids).await;
                count_updated = self.update_entries(&feed_external_ids).await;
                count_created = self.create_entries(&feed_external_ids).await;
            }
            UpdateStatus::OkNoData => {
                self.last_update_successful = Some(now);
                debug!("Update successful, but no data received");
                if self.empty_policy == EmptyFeedPolicy::Sweep {
                    self.handle.clear();
                    count_removed = self.remove_entries(&HashSet::new()).await;
                }
            }
            UpdateStatus::Error => {
                if let Some(err) = &error {
                    warn!(
                        kind = err.kind(),
                        error = %err,
                        "Update not successful, no data received"
                    );
                }
                self.handle.clear();
                count_removed = self.remove_entries(&HashSet::new()).await;
            }
        }

        let report = CycleReport {
            status,
            created: count_created,
            updated: count_updated,
            removed: count_removed,
            error,
            finished_at: now,
        };
        self.notifier.status(&report).await;
        report
    }

    /// `Ok(None)` means the source answered with zero records.
    async fn fetch(&self) -> Result<Option<Vec<Record>>, SourceError> {
        let scope = self.handle.scope();
        let summaries = self
            .source
            .list_in_radius(scope.center.latitude, scope.center.longitude, scope.radius_km)
            .await?;
        debug!(count = summaries.len(), "Data retrieved");

        if summaries.is_empty() {
            return Ok(None);
        }
        let records = self.source.fetch_details(&summaries).await?;
        Ok(Some(records))
    }

    fn build_snapshot(&self, feed_entries: Vec<Record>) -> FeedSnapshot {
        let filter = &self.category_filter;
        feed_entries
            .into_iter()
            .filter(|r| filter.is_empty() || filter.contains(&r.category))
            .map(|r| (r.id.clone(), r))
            .collect()
    }

    async fn remove_entries(&mut self, feed_external_ids: &HashSet<String>) -> usize {
        let remove_external_ids: Vec<String> = self
            .managed_external_ids
            .difference(feed_external_ids)
            .cloned()
            .collect();

        for external_id in &remove_external_ids {
            debug!(external_id = %external_id, "Entity not current anymore");
            self.managed_external_ids.remove(external_id);
            self.notifier.remove(external_id).await;
        }
        remove_external_ids.len()
    }

    async fn update_entries(&self, feed_external_ids: &HashSet<String>) -> usize {
        let update_external_ids: Vec<String> = self
            .managed_external_ids
            .intersection(feed_external_ids)
            .cloned()
            .collect();

        for external_id in &update_external_ids {
            debug!(external_id = %external_id, "Existing entity found");
            self.notifier.update(external_id).await;
        }
        update_external_ids.len()
    }

    async fn create_entries(&mut self, feed_external_ids: &HashSet<String>) -> usize {
        let create_external_ids: Vec<String> = feed_external_ids
            .difference(&self.managed_external_ids)
            .cloned()
            .collect();

        for external_id in &create_external_ids {
            self.notifier.create(external_id).await;
            debug!(external_id = %external_id, "New entity added");
            self.managed_external_ids.insert(external_id.clone());
        }
        create_external_ids.len()
    }
}
