use async_trait::async_trait;

use crate::domain::{Record, Summary};
use crate::errors::SourceError;

/// Client for the upstream service a feed polls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Log in with stored credentials. Bad credentials fail with
    /// [`SourceError::Authentication`].
    async fn authenticate(&self, username: &str, password: &str) -> Result<(), SourceError>;

    /// List records within `radius_km` of the given point.
    async fn list_in_radius(
        &self,
        lat: f64,
        lng: f64,
        radius_km: f64,
    ) -> Result<Vec<Summary>, SourceError>;

    /// Resolve listing entries into full records.
    async fn fetch_details(&self, summaries: &[Summary]) -> Result<Vec<Record>, SourceError>;
}
