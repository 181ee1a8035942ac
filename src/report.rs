//! Read-only run summary over the persisted state.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::config;
use crate::db::{self, LabelCount, Pool};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunReport {
    pub window_start: DateTime<Utc>,
    pub total_raw: i64,
    pub total_enriched: i64,
    pub pending: i64,
    pub processed_in_window: i64,
    pub errors_in_window: i64,
    pub error_rate: f64,
    pub avg_processing_time_seconds: f64,
    pub avg_confidence: f64,
    pub categories: Vec<LabelCount>,
    pub sentiments: Vec<LabelCount>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub max_error_rate: f64,
    pub min_avg_confidence: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        let r = config::Report::default();
        Self {
            max_error_rate: r.max_error_rate,
            min_avg_confidence: r.min_avg_confidence,
        }
    }
}

impl From<&config::Report> for Thresholds {
    fn from(r: &config::Report) -> Self {
        Self {
            max_error_rate: r.max_error_rate,
            min_avg_confidence: r.min_avg_confidence,
        }
    }
}

/// Build the summary for rows processed since `window_start`.
#[instrument(skip_all)]
pub async fn build_report(
    pool: &Pool,
    window_start: DateTime<Utc>,
    thresholds: Thresholds,
) -> Result<RunReport> {
    let total_raw = db::count_raw(pool).await?;
    let total_enriched = db::count_enriched(pool).await?;
    let stats = db::window_stats(pool, window_start).await?;
    let categories = db::category_counts(pool, window_start).await?;
    let sentiments = db::sentiment_counts(pool, window_start).await?;

    let error_rate = if stats.processed > 0 {
        stats.errors as f64 / stats.processed as f64
    } else {
        0.0
    };

    let mut warnings = Vec::new();
    if stats.processed == 0 {
        warnings.push("no headlines were processed in this window".to_string());
    }
    if error_rate > thresholds.max_error_rate {
        warnings.push(format!(
            "error rate {:.1}% is above {:.1}%",
            error_rate * 100.0,
            thresholds.max_error_rate * 100.0
        ));
    }
    if stats.processed > stats.errors && stats.avg_confidence < thresholds.min_avg_confidence {
        warnings.push(format!(
            "average confidence {:.3} is below {:.3}",
            stats.avg_confidence, thresholds.min_avg_confidence
        ));
    }

    Ok(RunReport {
        window_start,
        total_raw,
        total_enriched,
        pending: (total_raw - total_enriched).max(0),
        processed_in_window: stats.processed,
        errors_in_window: stats.errors,
        error_rate,
        avg_processing_time_seconds: stats.avg_processing_time_seconds,
        avg_confidence: stats.avg_confidence,
        categories,
        sentiments,
        warnings,
    })
}

/// Emit the report through `tracing`.
pub fn log_report(report: &RunReport) {
    info!(
        total_raw = report.total_raw,
        total_enriched = report.total_enriched,
        pending = report.pending,
        processed = report.processed_in_window,
        errors = report.errors_in_window,
        avg_processing_time_seconds = report.avg_processing_time_seconds,
        avg_confidence = report.avg_confidence,
        "enrichment report"
    );
    for c in report.categories.iter().take(5) {
        info!(category = %c.label, count = c.count, "top category");
    }
    for w in &report.warnings {
        warn!("{}", w);
    }
}
