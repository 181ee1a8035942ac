use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use headline_enricher::batch::BatchOptions;
use headline_enricher::classifier;
use headline_enricher::config;
use headline_enricher::db;
use headline_enricher::pipeline::{Pipeline, PipelineOptions};
use headline_enricher::report::Thresholds;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Enrich pending headlines with sentiment and category, then exit"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Headlines per window (defaults to app.batch_size)
    #[arg(long)]
    batch_size: Option<usize>,
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
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let classifier = classifier::build_service(&cfg)?;
    info!(model = classifier.model_id(), "classifier ready");

    let opts = PipelineOptions {
        batch: BatchOptions::from_config(&cfg),
        thresholds: Thresholds::from(&cfg.report),
    };
    let pipeline = Pipeline::new(pool.clone(), classifier, opts);

    // Ctrl-C stops the run at the next window boundary.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing the current window");
            on_signal.cancel();
        }
    });

    let batch_size = args.batch_size.unwrap_or(cfg.app.batch_size);
    let summary = pipeline.run_pass(batch_size, &cancel).await;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    pool.close().await;
    std::process::exit(summary.status.exit_code());
}
