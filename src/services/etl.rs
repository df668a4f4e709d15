//! The extract-transform-load loop.
//!
//! Regions are processed strictly one after another. Each region moves
//! through fetch → reconcile → commit and ends as a [`RegionOutcome`];
//! a failure never leaves the region that caused it. Reconciliation checks
//! every observation's (region, date) key inside the region's transaction,
//! so a date the provider repeats within one fetch is caught by the same
//! lookup that catches rows stored by earlier runs.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::db::models::{InsertOutcome, Observation};
use crate::errors::AppError;
use crate::services::registry::Region;

/// Source of daily observations for a region.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Observations for every day the provider has in `[start, end]`,
    /// in provider (ascending date) order.
    async fn fetch(
        &self,
        region: &Region,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Observation>, AppError>;
}

/// Transactional store keyed by (region name, date).
#[async_trait]
pub trait WeatherStore: Send {
    async fn begin(&mut self) -> Result<(), AppError>;

    async fn record_exists(&mut self, region_name: &str, date: NaiveDate) -> Result<bool, AppError>;

    /// Insert one row. A row that already exists must come back as
    /// `InsertOutcome::Duplicate`, not as an error.
    async fn insert_record(
        &mut self,
        region: &Region,
        observation: &Observation,
    ) -> Result<InsertOutcome, AppError>;

    async fn commit(&mut self) -> Result<(), AppError>;

    async fn rollback(&mut self) -> Result<(), AppError>;
}

/// Per-region tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionCounts {
    pub inserted: usize,
    pub duplicates: usize,
    /// Rows whose lookup or insert failed and were skipped.
    pub failed: usize,
}

/// Where a region's processing stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionStage {
    Fetching,
    Reconciling,
    Committing,
}

impl std::fmt::Display for RegionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RegionStage::Fetching => "fetching",
            RegionStage::Reconciling => "reconciling",
            RegionStage::Committing => "committing",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegionOutcome {
    Committed {
        region: String,
        counts: RegionCounts,
    },
    Failed {
        region: String,
        stage: RegionStage,
        reason: String,
    },
}

impl RegionOutcome {
    pub fn region(&self) -> &str {
        match self {
            RegionOutcome::Committed { region, .. } | RegionOutcome::Failed { region, .. } => {
                region
            }
        }
    }

    pub fn counts(&self) -> Option<RegionCounts> {
        match self {
            RegionOutcome::Committed { counts, .. } => Some(*counts),
            RegionOutcome::Failed { .. } => None,
        }
    }
}

/// Aggregate of one full run, in registry order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub outcomes: Vec<RegionOutcome>,
}

impl RunSummary {
    pub fn committed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.counts().is_some()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.committed()
    }

    pub fn totals(&self) -> RegionCounts {
        self.outcomes
            .iter()
            .filter_map(RegionOutcome::counts)
            .fold(RegionCounts::default(), |acc, c| RegionCounts {
                inserted: acc.inserted + c.inserted,
                duplicates: acc.duplicates + c.duplicates,
                failed: acc.failed + c.failed,
            })
    }
}

/// Run the loop over every region in order.
pub async fn run_etl<S, W>(
    source: &S,
    store: &mut W,
    regions: &[Region],
    start: NaiveDate,
    end: NaiveDate,
) -> RunSummary
where
    S: WeatherSource,
    W: WeatherStore,
{
    tracing::info!(
        "Starting data fetch and load for {} regions ({} to {})",
        regions.len(),
        start,
        end
    );

    let mut summary = RunSummary::default();
    for region in regions {
        let outcome = process_region(source, store, region, start, end).await;
        summary.outcomes.push(outcome);
    }

    let totals = summary.totals();
    tracing::info!(
        "Run finished: {} regions committed, {} failed; inserted {}, duplicates skipped {}, rows failed {}",
        summary.committed(),
        summary.failed(),
        totals.inserted,
        totals.duplicates,
        totals.failed,
    );

    summary
}

/// Fetch, reconcile and commit a single region.
pub async fn process_region<S, W>(
    source: &S,
    store: &mut W,
    region: &Region,
    start: NaiveDate,
    end: NaiveDate,
) -> RegionOutcome
where
    S: WeatherSource,
    W: WeatherStore,
{
    tracing::info!("Fetching data for {}...", region.name);

    let observations = match source.fetch(region, start, end).await {
        Ok(obs) => obs,
        Err(e) => {
            return fail(region, RegionStage::Fetching, e);
        }
    };
    tracing::debug!(
        "Fetched {} observations for {}",
        observations.len(),
        region.name
    );

    if let Err(e) = store.begin().await {
        return fail(region, RegionStage::Reconciling, e);
    }

    let counts = reconcile(store, region, &observations).await;

    if let Err(e) = store.commit().await {
        if let Err(rb) = store.rollback().await {
            tracing::warn!("Rollback after failed commit for {} failed: {}", region.name, rb);
        }
        return fail(region, RegionStage::Committing, e);
    }

    tracing::info!(
        "Data for {} done. Inserted: {}, Duplicates skipped: {}, Failed rows: {}",
        region.name,
        counts.inserted,
        counts.duplicates,
        counts.failed,
    );

    RegionOutcome::Committed {
        region: region.name.clone(),
        counts,
    }
}

async fn reconcile<W: WeatherStore>(
    store: &mut W,
    region: &Region,
    observations: &[Observation],
) -> RegionCounts {
    let mut counts = RegionCounts::default();

    for obs in observations {
        match store.record_exists(&region.name, obs.date).await {
            Ok(true) => {
                counts.duplicates += 1;
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(
                    "Failed to check existing data for {} on {}: {}",
                    region.name,
                    obs.date,
                    e
                );
                counts.failed += 1;
                continue;
            }
        }

        match store.insert_record(region, obs).await {
            Ok(InsertOutcome::Inserted) => counts.inserted += 1,
            Ok(InsertOutcome::Duplicate) => counts.duplicates += 1,
            Err(e) => {
                tracing::error!(
                    "Failed to insert data for {} on {}: {}",
                    region.name,
                    obs.date,
                    e
                );
                counts.failed += 1;
            }
        }
    }

    counts
}

fn fail(region: &Region, stage: RegionStage, err: AppError) -> RegionOutcome {
    tracing::error!(
        "Error processing data for {} while {}: {}",
        region.name,
        stage,
        err
    );
    RegionOutcome::Failed {
        region: region.name.clone(),
        stage,
        reason: err.to_string(),
    }
}
