//! Trendwire application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialize tracing
//! 3. Open the SQLite item store
//! 4. Wire the offline collaborators into the pipeline orchestrator
//! 5. Run the requested command and print its result as JSON

mod cli;
mod collaborators;

use std::collections::BTreeMap;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use trendwire_core::config::TrendwireConfig;
use trendwire_pipeline::{Collaborators, PipelineOrchestrator, PipelineRunStats};
use trendwire_storage::{Database, ItemRepository, ItemStore};

use crate::cli::{CliArgs, Command};
use crate::collaborators::{
    load_feed, ImportedAnalyzer, JsonFeedCollector, JsonFileSink, UnavailableExtractor,
};

/// Upper bound for reading the feed file.
const FEED_TIMEOUT: Duration = Duration::from_secs(30);

fn init_tracing(cli_level: Option<String>, config_level: &str) {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config_level)),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn init_config(path: &Path, force: bool) -> Result<ExitCode, Box<dyn std::error::Error>> {
    if path.exists() && !force {
        tracing::error!(path = %path.display(), "Config file exists; pass --force to overwrite");
        return Ok(ExitCode::FAILURE);
    }
    TrendwireConfig::default().save(path)?;
    println!("{}", path.display());
    Ok(ExitCode::SUCCESS)
}

fn print_status(store: &dyn ItemStore) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let counts: BTreeMap<String, u64> = store
        .count_by_status()?
        .into_iter()
        .map(|(status, count)| (status.to_string(), count))
        .collect();
    println!("{}", serde_json::to_string_pretty(&counts)?);
    Ok(ExitCode::SUCCESS)
}

fn report(stats: &PipelineRunStats) -> Result<ExitCode, Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(stats)?);
    if stats.success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    if let Command::InitConfig { force } = args.command {
        init_tracing(args.resolve_log_level(), "info");
        return init_config(&config_file, force);
    }
    let config = TrendwireConfig::load_or_default(&config_file);

    // Tracing.
    init_tracing(args.resolve_log_level(), &config.general.log_level);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_file.display(),
        "Starting Trendwire"
    );

    // Storage.
    let data_dir = args.resolve_data_dir(&config);
    let db_path = data_dir.join(&config.general.database_file);
    let db = Database::new(&db_path)?;
    let store = Arc::new(ItemRepository::new(Arc::new(db)));
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    let (kind, days) = match args.command {
        Command::Status => return print_status(store.as_ref()),
        Command::RunDaily => ("daily", None),
        Command::RunPeriodic { days } => (
            "periodic",
            Some(days.unwrap_or(config.pipeline.periodic_window_days)),
        ),
        Command::InitConfig { .. } => return Ok(ExitCode::SUCCESS),
    };

    // Collaborators.
    let feed = args.resolve_feed(&data_dir);
    let entries = load_feed(&feed).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "No analyses imported");
        Vec::new()
    });
    let analyzer = ImportedAnalyzer::from_entries(&entries);
    tracing::info!(feed = %feed.display(), imported = analyzer.imported(), "Feed analyses imported");

    let collaborators = Collaborators {
        collector: Arc::new(JsonFeedCollector::new(feed, FEED_TIMEOUT)),
        extractor: Arc::new(UnavailableExtractor),
        analyzer: Arc::new(analyzer),
        sink: Arc::new(JsonFileSink::new(args.resolve_out_dir(&data_dir))),
    };

    let orchestrator = PipelineOrchestrator::new(store, collaborators, config)?
        .with_span(tracing::info_span!("pipeline", kind));

    let stats = match days {
        Some(days) => orchestrator.run_periodic(Utc::now(), days).await,
        None => orchestrator.run_daily(Utc::now()).await,
    };
    report(&stats)
}
