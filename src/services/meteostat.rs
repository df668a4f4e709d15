//! Meteostat daily point data client.
//!
//! Fetches interpolated daily observations for a coordinate from the
//! Meteostat JSON API.
//! See: https://dev.meteostat.net/api/point/daily.html

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use std::time::Duration;

use crate::db::models::Observation;
use crate::errors::AppError;
use crate::helpers::{
    date_windows, finite_or_none, parse_provider_date, validate_coordinates, validate_date_range,
};
use crate::services::etl::WeatherSource;
use crate::services::registry::Region;

const DAILY_POINT_PATH: &str = "/point/daily";
const REQUEST_TIMEOUT_SECS: u64 = 60;
/// Meteostat serves at most ten years of daily data per request.
const MAX_DAYS_PER_REQUEST: i64 = 3650;

/// Client for the Meteostat point API.
#[derive(Debug, Clone)]
pub struct MeteostatClient {
    client: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
}

// --- Meteostat JSON response types ---

#[derive(Debug, Deserialize)]
struct MeteostatResponse {
    #[serde(default)]
    data: Option<Vec<MeteostatDaily>>,
}

#[derive(Debug, Deserialize)]
struct MeteostatDaily {
    date: String,
    tavg: Option<f64>,
    tmin: Option<f64>,
    tmax: Option<f64>,
    prcp: Option<f64>,
    wspd: Option<f64>,
    wpgt: Option<f64>,
    pres: Option<f64>,
    tsun: Option<f64>,
}

impl MeteostatClient {
    /// Build a client. With an API key, RapidAPI authentication headers are
    /// sent on every request.
    pub fn new(base_url: &str, api_key: Option<&str>) -> Result<Self, AppError> {
        let base_url = base_url.trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let host = reqwest::Url::parse(&base_url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .ok_or_else(|| {
                    AppError::Config(format!("Invalid Meteostat base URL '{}'", base_url))
                })?;
            headers.insert(
                "x-rapidapi-key",
                HeaderValue::from_str(key)
                    .map_err(|e| AppError::Config(format!("Invalid Meteostat API key: {}", e)))?,
            );
            headers.insert(
                "x-rapidapi-host",
                HeaderValue::from_str(&host)
                    .map_err(|e| AppError::Config(format!("Invalid Meteostat host: {}", e)))?,
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            headers,
        })
    }

    /// Fetch daily observations for `[start, end]` at a coordinate, in the
    /// order Meteostat returns them (ascending by date). Long ranges are
    /// split into consecutive requests; any failed request fails the fetch.
    pub async fn fetch_daily(
        &self,
        lat: f64,
        lon: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Observation>, AppError> {
        validate_coordinates(lat, lon)?;
        validate_date_range(start, end)?;

        let windows = date_windows(start, end, MAX_DAYS_PER_REQUEST);
        if windows.len() > 1 {
            tracing::debug!(
                "Splitting {}..{} into {} Meteostat requests",
                start,
                end,
                windows.len()
            );
        }

        let mut observations = Vec::new();
        for (window_start, window_end) in windows {
            observations.extend(self.fetch_window(lat, lon, window_start, window_end).await?);
        }
        Ok(observations)
    }

    async fn fetch_window(
        &self,
        lat: f64,
        lon: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Observation>, AppError> {
        let url = format!("{}{}", self.base_url, DAILY_POINT_PATH);
        let query = [
            ("lat", format!("{:.4}", lat)),
            ("lon", format!("{:.4}", lon)),
            ("start", start.format("%Y-%m-%d").to_string()),
            ("end", end.format("%Y-%m-%d").to_string()),
        ];

        let response = self
            .client
            .get(&url)
            .headers(self.headers.clone())
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                AppError::ExternalServiceError(format!("Meteostat request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(AppError::ExternalServiceError(format!(
                "Meteostat returned HTTP {}",
                response.status()
            )));
        }

        let body: MeteostatResponse = response.json().await.map_err(|e| {
            AppError::ExternalServiceError(format!("Meteostat JSON parse error: {}", e))
        })?;

        into_observations(body)
    }
}

#[async_trait]
impl WeatherSource for MeteostatClient {
    async fn fetch(
        &self,
        region: &Region,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Observation>, AppError> {
        self.fetch_daily(region.latitude, region.longitude, start, end)
            .await
    }
}

/// Map Meteostat rows onto observations, field by field.
fn into_observations(body: MeteostatResponse) -> Result<Vec<Observation>, AppError> {
    body.data
        .unwrap_or_default()
        .into_iter()
        .map(|row| -> Result<Observation, AppError> {
            Ok(Observation {
                date: parse_provider_date(&row.date)?,
                avg_temp: finite_or_none(row.tavg),
                min_temp: finite_or_none(row.tmin),
                max_temp: finite_or_none(row.tmax),
                precipitation: finite_or_none(row.prcp),
                wind_speed: finite_or_none(row.wspd),
                wind_gust: finite_or_none(row.wpgt),
                pressure: finite_or_none(row.pres),
                sunshine_duration: finite_or_none(row.tsun),
            })
        })
        .collect()
}
