use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;

use headline_enricher::config;
use headline_enricher::db;
use headline_enricher::report::{build_report, log_report, Thresholds};

#[derive(Debug, Parser)]
#[command(author, version, about = "Print the enrichment report without processing anything")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Window start (RFC 3339); defaults to the start of the current UTC day
    #[arg(long)]
    since: Option<DateTime<Utc>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let since = match args.since {
        Some(since) => since,
        None => Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .context("invalid start of day")?
            .and_utc(),
    };

    let report = build_report(&pool, since, Thresholds::from(&cfg.report)).await?;
    log_report(&report);
    println!("{}", serde_json::to_string_pretty(&report)?);
    pool.close().await;
    Ok(())
}
