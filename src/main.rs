// Weather ETL v0.1
use std::fs::OpenOptions;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod errors;
mod helpers;
mod services;

use config::AppConfig;
use db::gateway::StorageGateway;
use errors::AppError;
use services::etl::{self, RegionOutcome, RunSummary};
use services::meteostat::MeteostatClient;
use services::registry::load_regions;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("weather-etl: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_tracing(&config) {
        eprintln!("weather-etl: cannot open log file {}: {}", config.log_file, e);
        return ExitCode::FAILURE;
    }

    match run(&config).await {
        Ok(_) => {
            println!("ETL process completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("ETL setup failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Log to stdout and append to the log file.
fn init_tracing(config: &AppConfig) -> Result<(), AppError> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(log_file));
    let json_layer = config
        .log_json
        .then(|| tracing_subscriber::fmt::layer().json());
    let text_layer = (!config.log_json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weather_etl=info".into()),
        )
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .init();

    Ok(())
}

/// Bootstrap storage, then load every region. Only setup failures are
/// returned as errors; region and row failures live in the summary.
async fn run(config: &AppConfig) -> Result<RunSummary, AppError> {
    tracing::info!("Starting Weather ETL run");

    let regions = load_regions(Path::new(&config.regions_file))?;
    let names: Vec<&str> = regions.iter().map(|r| r.name.as_str()).collect();
    tracing::info!("Configured regions: {:?}", names);
    if regions.is_empty() {
        tracing::warn!("No regions configured in {}", config.regions_file);
    }

    let source = MeteostatClient::new(
        &config.meteostat_base_url,
        config.meteostat_api_key.as_deref(),
    )?;
    let mut store = StorageGateway::initialize(&config.db).await?;

    let summary = etl::run_etl(
        &source,
        &mut store,
        &regions,
        config.start_date,
        config.end_date,
    )
    .await;

    report(&store, &summary).await;
    store.close().await;

    tracing::info!("ETL process completed.");
    Ok(summary)
}

/// Log how many rows each committed region now holds. Per-region counts
/// and failures are already logged by the loop.
async fn report(store: &StorageGateway, summary: &RunSummary) {
    let committed = summary
        .outcomes
        .iter()
        .filter(|o| matches!(o, RegionOutcome::Committed { .. }));
    for outcome in committed {
        let region = outcome.region();
        match store.count_records(region).await {
            Ok(total) => tracing::info!("{}: {} rows stored", region, total),
            Err(e) => tracing::warn!("{}: cannot count stored rows: {}", region, e),
        }
    }
}
