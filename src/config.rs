use chrono::{NaiveDate, Utc};
use sqlx::postgres::PgConnectOptions;

use crate::errors::AppError;

const DEFAULT_START_DATE: &str = "2010-01-01";
const DEFAULT_METEOSTAT_BASE_URL: &str = "https://meteostat.p.rapidapi.com";

/// PostgreSQL connection settings.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Database holding `historical_weather_data`; created on first run.
    pub database: String,
    /// Database used to check for and create `database`.
    pub maintenance_database: String,
}

impl DbConfig {
    /// Connect options for the target database.
    pub fn connect_options(&self) -> PgConnectOptions {
        self.options_for(&self.database)
    }

    /// Connect options for the maintenance database.
    pub fn maintenance_options(&self) -> PgConnectOptions {
        self.options_for(&self.maintenance_database)
    }

    fn options_for(&self, database: &str) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(database)
    }
}

/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db: DbConfig,
    pub meteostat_base_url: String,
    pub meteostat_api_key: Option<String>,
    /// JSON file listing the regions to load.
    pub regions_file: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub log_file: String,
    /// Emit JSON lines on stdout instead of the human-readable format.
    pub log_json: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port = var("DB_PORT", "5432")
            .parse::<u16>()
            .map_err(|e| AppError::Config(format!("DB_PORT must be a valid u16: {}", e)))?;
        let password = lookup("DB_PASSWORD")
            .ok_or_else(|| AppError::Config("DB_PASSWORD must be set".to_string()))?;

        let start_date = parse_date("START_DATE", &var("START_DATE", DEFAULT_START_DATE))?;
        let end_date = match lookup("END_DATE") {
            Some(raw) => parse_date("END_DATE", &raw)?,
            None => Utc::now().date_naive(),
        };
        if start_date > end_date {
            return Err(AppError::Config(format!(
                "START_DATE {} is after END_DATE {}",
                start_date, end_date
            )));
        }

        Ok(Self {
            db: DbConfig {
                host: var("DB_HOST", "localhost"),
                port,
                user: var("DB_USER", "postgres"),
                password,
                database: var("DB_NAME", "weather_data"),
                maintenance_database: var("DB_MAINTENANCE_NAME", "postgres"),
            },
            meteostat_base_url: var("METEOSTAT_BASE_URL", DEFAULT_METEOSTAT_BASE_URL),
            meteostat_api_key: lookup("METEOSTAT_API_KEY").filter(|k| !k.is_empty()),
            regions_file: var("REGIONS_FILE", "./data/regions.json"),
            start_date,
            end_date,
            log_file: var("LOG_FILE", "weather_etl.log"),
            log_json: var("LOG_FORMAT", "text").eq_ignore_ascii_case("json"),
        })
    }
}

fn parse_date(key: &str, raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| AppError::Config(format!("{} must be YYYY-MM-DD, got '{}': {}", key, raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, AppError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = config_from(&[("DB_PASSWORD", "secret")]).unwrap();

        assert_eq!(config.db.host, "localhost");
        assert_eq!(config.db.port, 5432);
        assert_eq!(config.db.user, "postgres");
        assert_eq!(config.db.database, "weather_data");
        assert_eq!(config.db.maintenance_database, "postgres");
        assert_eq!(config.meteostat_base_url, DEFAULT_METEOSTAT_BASE_URL);
        assert!(config.meteostat_api_key.is_none());
        assert_eq!(config.regions_file, "./data/regions.json");
        assert_eq!(
            config.start_date,
            NaiveDate::from_ymd_opt(2010, 1, 1).unwrap()
        );
        assert_eq!(config.end_date, Utc::now().date_naive());
        assert_eq!(config.log_file, "weather_etl.log");
        assert!(!config.log_json);
    }

    #[test]
    fn test_explicit_values() {
        let config = config_from(&[
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "6543"),
            ("DB_USER", "etl"),
            ("DB_PASSWORD", "secret"),
            ("DB_NAME", "wx"),
            ("METEOSTAT_API_KEY", "abc"),
            ("START_DATE", "2020-01-01"),
            ("END_DATE", "2020-01-03"),
            ("LOG_FORMAT", "JSON"),
        ])
        .unwrap();

        assert_eq!(config.db.host, "db.internal");
        assert_eq!(config.db.port, 6543);
        assert_eq!(config.db.user, "etl");
        assert_eq!(config.db.database, "wx");
        assert_eq!(config.meteostat_api_key.as_deref(), Some("abc"));
        assert_eq!(
            config.end_date,
            NaiveDate::from_ymd_opt(2020, 1, 3).unwrap()
        );
        assert!(config.log_json);
    }

    #[test]
    fn test_missing_password_is_rejected() {
        let err = config_from(&[]).unwrap_err();
        assert!(err.to_string().contains("DB_PASSWORD"));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let err = config_from(&[("DB_PASSWORD", "x"), ("DB_PORT", "not-a-port")]).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_inverted_date_range_is_rejected() {
        let err = config_from(&[
            ("DB_PASSWORD", "x"),
            ("START_DATE", "2020-02-01"),
            ("END_DATE", "2020-01-01"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("after END_DATE"));
    }

    #[test]
    fn test_empty_api_key_is_ignored() {
        let config = config_from(&[("DB_PASSWORD", "x"), ("METEOSTAT_API_KEY", "")]).unwrap();
        assert!(config.meteostat_api_key.is_none());
    }
}
