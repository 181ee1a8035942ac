//! Row and view models used by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! lives in the pipeline and report modules.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{Category, Sentiment};

/// Result of writing one batch window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchWrite {
    /// Candidates handed to the writer.
    pub submitted: usize,
    /// Rows actually created; lower than `submitted` when links already existed.
    pub inserted: usize,
}

/// A persisted enrichment row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredHeadline {
    pub source_link: String,
    pub title: String,
    pub link: String,
    pub source: String,
    pub scraped_at: DateTime<Utc>,
    pub sentiment: String,
    pub category: String,
    pub confidence: f64,
    pub processing_time_seconds: f64,
    pub processed_at: DateTime<Utc>,
    pub model_used: String,
}

impl StoredHeadline {
    pub fn sentiment(&self) -> Option<Sentiment> {
        Sentiment::parse_stored(&self.sentiment)
    }

    pub fn category(&self) -> Option<Category> {
        Category::parse_stored(&self.category)
    }
}

/// Aggregates over rows processed since a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowStats {
    pub processed: i64,
    pub errors: i64,
    pub avg_processing_time_seconds: f64,
    /// Mean confidence of non-error rows.
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}
