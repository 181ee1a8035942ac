use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use headline_enricher::classifier::{self, classify, ClassifyOptions};
use headline_enricher::config;

#[derive(Debug, Parser)]
#[command(author, version, about = "Classify a single headline without touching the database")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Headline text
    title: String,
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
    let service = classifier::build_service(&cfg)?;

    let result = classify(service.as_ref(), &args.title, &ClassifyOptions::from_config(&cfg)).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
