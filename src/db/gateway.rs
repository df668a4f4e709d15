//! PostgreSQL storage gateway.
//!
//! Owns the single database connection used for a run, bootstraps the
//! schema, and scopes each region's inserts to one transaction. Every lookup
//! and insert runs inside a savepoint so one bad row cannot poison the
//! region's transaction.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Connection, PgConnection, Postgres, Transaction};

use super::models::{InsertOutcome, NewRecord, Observation};
use super::queries;
use crate::config::DbConfig;
use crate::errors::AppError;
use crate::services::etl::WeatherStore;
use crate::services::registry::Region;

/// The pipeline is sequential, so one connection is all it ever needs.
const DB_POOL_MAX_CONNECTIONS: u32 = 1;

pub struct StorageGateway {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl StorageGateway {
    /// Create the target database if absent, connect to it and apply the
    /// embedded migrations. Safe to run on every start.
    pub async fn initialize(config: &DbConfig) -> Result<Self, AppError> {
        tracing::info!(
            "Initializing database '{}' on {}:{}",
            config.database,
            config.host,
            config.port
        );

        ensure_database(config).await?;

        let pool = PgPoolOptions::new()
            .max_connections(DB_POOL_MAX_CONNECTIONS)
            .connect_with(config.connect_options())
            .await?;

        sqlx::migrate!().run(&pool).await?;

        tracing::info!("Database and table initialized successfully");

        Ok(Self { pool, tx: None })
    }

    /// Number of rows stored for a region.
    pub async fn count_records(&self, region_name: &str) -> Result<i64, AppError> {
        let mut conn = self.pool.acquire().await?;
        Ok(queries::count_records(&mut conn, region_name).await?)
    }

    pub async fn close(self) {
        if self.tx.is_some() {
            tracing::warn!("Closing storage with an open transaction; it will be rolled back");
        }
        drop(self.tx);
        self.pool.close().await;
    }
}

async fn ensure_database(config: &DbConfig) -> Result<(), AppError> {
    let mut conn = PgConnection::connect_with(&config.maintenance_options()).await?;

    if !queries::database_exists(&mut conn, &config.database).await? {
        if let Err(e) = queries::create_database(&mut conn, &config.database).await {
            // Another run may have created it between the check and the create.
            if !queries::database_exists(&mut conn, &config.database).await? {
                return Err(e.into());
            }
            tracing::debug!("Database '{}' appeared concurrently: {}", config.database, e);
        } else {
            tracing::info!("Database '{}' created successfully", config.database);
        }
    }

    conn.close().await?;
    Ok(())
}

async fn lookup_in_savepoint(
    tx: &mut Transaction<'static, Postgres>,
    region_name: &str,
    date: NaiveDate,
) -> Result<bool, AppError> {
    let mut savepoint = Connection::begin(&mut **tx).await?;

    match queries::record_exists(&mut savepoint, region_name, date).await {
        Ok(exists) => {
            savepoint.commit().await?;
            Ok(exists)
        }
        Err(err) => {
            savepoint.rollback().await?;
            Err(AppError::from(err))
        }
    }
}

async fn insert_in_savepoint(
    tx: &mut Transaction<'static, Postgres>,
    record: &NewRecord,
) -> Result<InsertOutcome, AppError> {
    let mut savepoint = Connection::begin(&mut **tx).await?;

    match queries::insert_record(&mut savepoint, record).await {
        Ok(outcome) => {
            savepoint.commit().await?;
            Ok(outcome)
        }
        Err(err) => {
            savepoint.rollback().await?;
            classify_insert_error(AppError::from(err))
        }
    }
}

/// A unique violation means another writer stored the row first.
fn classify_insert_error(err: AppError) -> Result<InsertOutcome, AppError> {
    if err.is_unique_violation() {
        Ok(InsertOutcome::Duplicate)
    } else {
        Err(err)
    }
}

#[async_trait]
impl WeatherStore for StorageGateway {
    async fn begin(&mut self) -> Result<(), AppError> {
        if let Some(stale) = self.tx.take() {
            tracing::warn!("Rolling back a transaction left open by the previous region");
            stale.rollback().await?;
        }
        self.tx = Some(self.pool.begin().await?);
        Ok(())
    }

    async fn record_exists(&mut self, region_name: &str, date: NaiveDate) -> Result<bool, AppError> {
        let exists = match self.tx.as_mut() {
            Some(tx) => lookup_in_savepoint(tx, region_name, date).await?,
            None => {
                let mut conn = self.pool.acquire().await?;
                queries::record_exists(&mut conn, region_name, date).await?
            }
        };
        Ok(exists)
    }

    async fn insert_record(
        &mut self,
        region: &Region,
        observation: &Observation,
    ) -> Result<InsertOutcome, AppError> {
        let record = NewRecord::new(region, observation);
        match self.tx.as_mut() {
            Some(tx) => insert_in_savepoint(tx, &record).await,
            None => {
                let mut conn = self.pool.acquire().await?;
                match queries::insert_record(&mut conn, &record).await {
                    Ok(outcome) => Ok(outcome),
                    Err(err) => classify_insert_error(AppError::from(err)),
                }
            }
        }
    }

    /// PostgreSQL answers COMMIT on an aborted transaction with a silent
    /// rollback, so the transaction is pinged first and an aborted one is
    /// reported as an error.
    async fn commit(&mut self) -> Result<(), AppError> {
        if let Some(mut tx) = self.tx.take() {
            if let Err(e) = queries::ping(&mut tx).await {
                tx.rollback().await?;
                return Err(AppError::TransactionAborted(e.to_string()));
            }
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), AppError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}
