use chrono::NaiveDate;

use crate::services::registry::Region;

/// One calendar day of weather for a region, as returned by the provider.
/// `None` means the provider had no reading for that field.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub avg_temp: Option<f64>,
    pub min_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub precipitation: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_gust: Option<f64>,
    pub pressure: Option<f64>,
    pub sunshine_duration: Option<f64>,
}

/// A row for `historical_weather_data`, minus the database-generated
/// `id` and `created_on` columns.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub state: String,
    pub capital: String,
    pub region: String,
    pub observation: Observation,
}

impl NewRecord {
    pub fn new(region: &Region, observation: &Observation) -> Self {
        Self {
            state: region.name.clone(),
            capital: region.capital.clone(),
            region: region.region_group.clone(),
            observation: observation.clone(),
        }
    }
}

/// Result of a single insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The (state, date) key was already stored.
    Duplicate,
}
