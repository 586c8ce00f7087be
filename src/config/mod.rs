use std::time::Duration;

use crate::domain::{Category, Coordinates, DistanceUnit, EmptyFeedPolicy, GeoScope};
use crate::errors::{GeoFeedError, GeoFeedResult};

pub const DOMAIN: &str = "geofeeder";
pub const DEFAULT_API_URL: &str = "https://api.geofeeder.example/v1";
pub const DEFAULT_ENTRY_ID: &str = "default";
pub const DEFAULT_RADIUS_IN_M: f64 = 20_000.0;
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct Config {
    pub entry_id: String,
    pub username: String,
    pub password: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: f64,
    pub category_filter: Vec<Category>,
    pub unit: DistanceUnit,
    pub api_url: String,
    pub empty_policy: EmptyFeedPolicy,
    pub update_interval: Duration,
}

impl Config {
    /// Get the directory where the executable is located
    fn exe_dir() -> Option<std::path::PathBuf> {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    pub fn from_env() -> GeoFeedResult<Self> {
        // Try to load .env from executable's directory first
        if let Some(dir) = Self::exe_dir() {
            let env_path = dir.join(".env");
            if env_path.exists() {
                dotenvy::from_path(&env_path).ok();
            }
        }
        // Fall back to current directory
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> GeoFeedResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> GeoFeedResult<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| GeoFeedError::MissingEnvVar(key.to_string()))
        };

        let username = required("GEOFEED_USERNAME")?;
        let password = required("GEOFEED_PASSWORD")?;
        let latitude = parse_number("GEOFEED_LATITUDE", &required("GEOFEED_LATITUDE")?)?;
        let longitude = parse_number("GEOFEED_LONGITUDE", &required("GEOFEED_LONGITUDE")?)?;

        // Radius is entered in meters but handled in kilometers
        let radius_m = match lookup("GEOFEED_RADIUS_M") {
            Some(v) => parse_number("GEOFEED_RADIUS_M", &v)?,
            None => DEFAULT_RADIUS_IN_M,
        };

        let category_filter = match lookup("GEOFEED_CATEGORIES") {
            Some(v) => v
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.parse::<Category>().map_err(GeoFeedError::Config))
                .collect::<GeoFeedResult<Vec<_>>>()?,
            None => Vec::new(),
        };

        let unit = match lookup("GEOFEED_UNIT") {
            Some(v) => v.parse::<DistanceUnit>().map_err(GeoFeedError::Config)?,
            None => DistanceUnit::default(),
        };

        let empty_policy = match lookup("GEOFEED_EMPTY_POLICY") {
            Some(v) => v.parse::<EmptyFeedPolicy>().map_err(GeoFeedError::Config)?,
            None => EmptyFeedPolicy::default(),
        };

        let api_url = lookup("GEOFEED_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let entry_id = lookup("GEOFEED_ENTRY_ID").unwrap_or_else(|| DEFAULT_ENTRY_ID.to_string());

        let config = Self {
            entry_id,
            username,
            password,
            latitude,
            longitude,
            radius_km: radius_m / 1000.0,
            category_filter,
            unit,
            api_url,
            empty_policy,
            update_interval: DEFAULT_UPDATE_INTERVAL,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GeoFeedResult<()> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(GeoFeedError::Config(format!(
                "latitude {} out of range",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(GeoFeedError::Config(format!(
                "longitude {} out of range",
                self.longitude
            )));
        }
        if self.radius_km.is_nan() || self.radius_km <= 0.0 {
            return Err(GeoFeedError::Config(format!(
                "radius must be positive, got {} km",
                self.radius_km
            )));
        }
        Ok(())
    }

    pub fn scope(&self) -> GeoScope {
        GeoScope::new(Coordinates::new(self.latitude, self.longitude), self.radius_km)
    }

    pub fn title(&self) -> String {
        format!("{} ({}, {})", self.username, self.latitude, self.longitude)
    }
}

fn parse_number(key: &str, value: &str) -> GeoFeedResult<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| GeoFeedError::Config(format!("{} is not a number: {}", key, value)))
}
