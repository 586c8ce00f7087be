use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;

use crate::domain::{Record, Summary};
use crate::errors::{GeoFeedError, GeoFeedResult, SourceError};
use crate::sources::traits::RemoteSource;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct LoginPayload<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

/// JSON-over-HTTP implementation of [`RemoteSource`].
pub struct HttpSource {
    client: Client,
    base: Url,
    token: RwLock<Option<String>>,
}

impl HttpSource {
    pub fn new(api_url: &str) -> GeoFeedResult<Self> {
        // Url::join drops the last path segment unless it ends with a slash
        let mut normalized = api_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base = Url::parse(&normalized)
            .map_err(|e| GeoFeedError::Config(format!("Invalid API URL {}: {}", api_url, e)))?;

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base,
            token: RwLock::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, SourceError> {
        self.base
            .join(path)
            .map_err(|e| SourceError::Transport(format!("Invalid endpoint {}: {}", path, e)))
    }

    fn record_url(&self, external_id: &str) -> Result<Url, SourceError> {
        let mut url = self.endpoint("controls")?;
        url.path_segments_mut()
            .map_err(|_| SourceError::Transport("API URL cannot be a base".to_string()))?
            .push(external_id);
        Ok(url)
    }

    fn radius_url(&self, lat: f64, lng: f64, radius_km: f64) -> Result<Url, SourceError> {
        let mut url = self.endpoint("controls")?;
        url.query_pairs_mut()
            .append_pair("lat", &lat.to_string())
            .append_pair("lng", &lng.to_string())
            .append_pair("radius", &radius_km.to_string());
        Ok(url)
    }

    async fn bearer(&self) -> Result<String, SourceError> {
        self.token
            .read()
            .await
            .clone()
            .ok_or(SourceError::NotAuthenticated)
    }
}

/// Map a non-success HTTP status to a source error.
fn check_status(status: StatusCode) -> Result<(), SourceError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SourceError::Authentication(format!("server returned {}", status)));
    }
    if !status.is_success() {
        return Err(SourceError::Transport(format!("server returned {}", status)));
    }
    Ok(())
}

#[async_trait]
impl RemoteSource for HttpSource {
    async fn authenticate(&self, username: &str, password: &str) -> Result<(), SourceError> {
        let response = self
            .client
            .post(self.endpoint("auth/login")?)
            .json(&LoginPayload { username, password })
            .send()
            .await?;
        check_status(response.status())?;

        let login: LoginResponse = response.json().await?;
        *self.token.write().await = Some(login.token);
        Ok(())
    }

    async fn list_in_radius(
        &self,
        lat: f64,
        lng: f64,
        radius_km: f64,
    ) -> Result<Vec<Summary>, SourceError> {
        let token = self.bearer().await?;
        let response = self
            .client
            .get(self.radius_url(lat, lng, radius_km)?)
            .bearer_auth(token)
            .send()
            .await?;
        check_status(response.status())?;

        Ok(response.json().await?)
    }

    async fn fetch_details(&self, summaries: &[Summary]) -> Result<Vec<Record>, SourceError> {
        let token = self.bearer().await?;
        let mut records = Vec::with_capacity(summaries.len());

        for summary in summaries {
            let response = self
                .client
                .get(self.record_url(&summary.id)?)
                .bearer_auth(&token)
                .send()
                .await?;
            check_status(response.status())?;
            records.push(response.json::<Record>().await?);
        }

        Ok(records)
    }
}
