use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use geofeeder::bus::EventBus;
use geofeeder::cli::{Cli, Commands};
use geofeeder::config::Config;
use geofeeder::errors::{GeoFeedError, GeoFeedResult};
use geofeeder::services::{FeedEntityManager, FeedRegistry, UpdateOutcome};
use geofeeder::sources::{HttpSource, RemoteSource};

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("geofeeder=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> GeoFeedResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize remote client
    let source: Arc<dyn RemoteSource> = Arc::new(HttpSource::new(&config.api_url)?);

    match cli.command {
        Commands::Run => cmd_run(config, source).await,
        Commands::Poll { json } => cmd_poll(config, source, json).await,
        Commands::Check => cmd_check(config, source).await,
    }
}

async fn cmd_run(config: Config, source: Arc<dyn RemoteSource>) -> GeoFeedResult<()> {
    let registry = FeedRegistry::new(EventBus::new());
    let title = config.title();
    let interval = config.update_interval;

    registry.setup_entry(config, source).await?;
    println!(
        "Watching {} every {}s (Ctrl-C to stop)",
        title,
        interval.as_secs()
    );

    tokio::signal::ctrl_c().await?;

    let tracked = registry.platform().len();
    registry.unload_all();
    println!("Stopped. {} entities were tracked.", tracked);

    Ok(())
}

async fn cmd_poll(config: Config, source: Arc<dyn RemoteSource>, json: bool) -> GeoFeedResult<()> {
    let manager = FeedEntityManager::new(config, source, EventBus::new());
    let result = poll_once(&manager, json).await;
    manager.stop();
    result
}

async fn poll_once(manager: &Arc<FeedEntityManager>, json: bool) -> GeoFeedResult<()> {
    manager.init().await?;

    let report = match manager.update().await {
        UpdateOutcome::Completed(report) => report,
        UpdateOutcome::Skipped => {
            return Err(GeoFeedError::InvalidInput(
                "a poll is already running".to_string(),
            ))
        }
    };

    let feed = manager.handle();
    let records = feed.records();

    if json {
        let records: Vec<_> = records
            .iter()
            .map(|record| {
                json!({
                    "record": record,
                    "distance": feed.get_distance(&record.id),
                    "unit": feed.unit(),
                })
            })
            .collect();
        let output = json!({ "report": report, "records": records });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}\n", report.summary());
        if records.is_empty() {
            println!("No records in range.");
        }
        for record in &records {
            let distance = feed.get_distance(&record.id).unwrap_or_default();
            println!(
                "  {} [{}] {:.1} {} ({})",
                record.title,
                record.category,
                distance,
                feed.unit(),
                record.id
            );
            if let Some(description) = &record.description {
                println!("    {}", description);
            }
        }
    }

    match report.error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

async fn cmd_check(config: Config, source: Arc<dyn RemoteSource>) -> GeoFeedResult<()> {
    println!("Checking credentials for {}...", config.title());

    let manager = FeedEntityManager::new(config, source, EventBus::new());
    let result = manager.init().await;
    manager.stop();
    result?;

    println!("Credentials accepted.");
    Ok(())
}
