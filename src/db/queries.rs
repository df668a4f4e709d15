use chrono::NaiveDate;
use sqlx::PgConnection;

use super::models::{InsertOutcome, NewRecord};

/// Whether the maintenance connection can see a database named `name`.
pub async fn database_exists(conn: &mut PgConnection, name: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1 FROM pg_database WHERE datname = $1")
        .bind(name)
        .fetch_optional(conn)
        .await
        .map(|row| row.is_some())
}

/// Create a database. Identifiers cannot be bound, so the name is quoted.
pub async fn create_database(conn: &mut PgConnection, name: &str) -> Result<(), sqlx::Error> {
    let statement = format!("CREATE DATABASE {}", quote_identifier(name));
    sqlx::query(&statement).execute(conn).await?;
    Ok(())
}

/// Point lookup on the (state, date) unique key.
pub async fn record_exists(
    conn: &mut PgConnection,
    state: &str,
    date: NaiveDate,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, i32>(
        "SELECT 1 FROM historical_weather_data WHERE state = $1 AND date = $2 LIMIT 1",
    )
    .bind(state)
    .bind(date)
    .fetch_optional(conn)
    .await
    .map(|row| row.is_some())
}

/// Insert one record (append-only). A row already holding the same
/// (state, date) key leaves the table untouched and reports `Duplicate`.
pub async fn insert_record(
    conn: &mut PgConnection,
    record: &NewRecord,
) -> Result<InsertOutcome, sqlx::Error> {
    let obs = &record.observation;
    let result = sqlx::query(
        "INSERT INTO historical_weather_data (
            state, capital, region, date,
            avg_temperature, min_temperature, max_temperature,
            precipitation, wind_speed, wind_gust, pressure, sunshine_duration
        ) VALUES (
            $1, $2, $3, $4,
            $5, $6, $7,
            $8, $9, $10, $11, $12
        )
        ON CONFLICT (state, date) DO NOTHING",
    )
    .bind(&record.state)
    .bind(&record.capital)
    .bind(&record.region)
    .bind(obs.date)
    .bind(obs.avg_temp)
    .bind(obs.min_temp)
    .bind(obs.max_temp)
    .bind(obs.precipitation)
    .bind(obs.wind_speed)
    .bind(obs.wind_gust)
    .bind(obs.pressure)
    .bind(obs.sunshine_duration)
    .execute(conn)
    .await?;

    if result.rows_affected() > 0 {
        Ok(InsertOutcome::Inserted)
    } else {
        Ok(InsertOutcome::Duplicate)
    }
}

/// Number of stored rows for a region.
pub async fn count_records(conn: &mut PgConnection, state: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM historical_weather_data WHERE state = $1")
        .bind(state)
        .fetch_one(conn)
        .await
}

/// Round trip on a connection; fails when its transaction is aborted.
pub async fn ping(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(conn).await?;
    Ok(())
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
