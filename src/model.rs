use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    Error,
}

impl Sentiment {
    /// Labels the classifier may return. `Error` is never offered to it.
    pub const LABELS: [Sentiment; 3] = [
        Sentiment::Positive,
        Sentiment::Negative,
        Sentiment::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "Positive",
            Sentiment::Negative => "Negative",
            Sentiment::Neutral => "Neutral",
            Sentiment::Error => "Error",
        }
    }

    /// Match a classifier label against the closed set, ignoring case and
    /// surrounding whitespace. `Error` is not an acceptable answer.
    pub fn parse_label(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::LABELS
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s))
    }

    /// Decode a stored column value, including `Error`.
    pub fn parse_stored(s: &str) -> Option<Self> {
        if s == "Error" {
            return Some(Sentiment::Error);
        }
        Self::parse_label(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    Politics,
    Economy,
    Sports,
    Technology,
    Culture,
    Health,
    International,
    Justice,
    Education,
    Environment,
    Security,
    Other,
    Error,
}

impl Category {
    pub const LABELS: [Category; 12] = [
        Category::Politics,
        Category::Economy,
        Category::Sports,
        Category::Technology,
        Category::Culture,
        Category::Health,
        Category::International,
        Category::Justice,
        Category::Education,
        Category::Environment,
        Category::Security,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Politics => "Politics",
            Category::Economy => "Economy",
            Category::Sports => "Sports",
            Category::Technology => "Technology",
            Category::Culture => "Culture",
            Category::Health => "Health",
            Category::International => "International",
            Category::Justice => "Justice",
            Category::Education => "Education",
            Category::Environment => "Environment",
            Category::Security => "Security",
            Category::Other => "Other",
            Category::Error => "Error",
        }
    }

    pub fn parse_label(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::LABELS
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s))
    }

    pub fn parse_stored(s: &str) -> Option<Self> {
        if s == "Error" {
            return Some(Category::Error);
        }
        Self::parse_label(s)
    }
}

/// A scraped headline as the scraper left it in `raw_headlines`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct RawHeadline {
    pub title: String,
    pub link: String,
    pub source: String,
    pub scraped_at: DateTime<Utc>,
}

/// Normalized output of one classification attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub sentiment: Sentiment,
    pub category: Category,
    pub confidence: f64,
    pub processing_time_seconds: f64,
}

impl Classification {
    /// Deterministic stand-in used whenever the classifier cannot be trusted.
    pub fn fallback(processing_time_seconds: f64) -> Self {
        Self {
            sentiment: Sentiment::Error,
            category: Category::Error,
            confidence: 0.0,
            processing_time_seconds: clamp_elapsed(processing_time_seconds),
        }
    }

    pub fn is_error(&self) -> bool {
        self.sentiment == Sentiment::Error || self.category == Category::Error
    }
}

/// Enrichment candidate, ready for the writer. `processed_at` is assigned
/// when the batch is written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichedHeadline {
    pub source_link: String,
    pub title: String,
    pub link: String,
    pub source: String,
    pub scraped_at: DateTime<Utc>,
    pub sentiment: Sentiment,
    pub category: Category,
    pub confidence: f64,
    pub processing_time_seconds: f64,
    pub model_used: String,
}

impl EnrichedHeadline {
    pub fn from_raw(raw: &RawHeadline, classification: Classification, model_used: &str) -> Self {
        Self {
            source_link: raw.link.clone(),
            title: raw.title.clone(),
            link: raw.link.clone(),
            source: raw.source.clone(),
            scraped_at: raw.scraped_at,
            sentiment: classification.sentiment,
            category: classification.category,
            confidence: classification.confidence,
            processing_time_seconds: classification.processing_time_seconds,
            model_used: model_used.to_string(),
        }
    }

    /// Same rule as [`Classification::is_error`].
    pub fn is_error(&self) -> bool {
        self.sentiment == Sentiment::Error || self.category == Category::Error
    }
}

/// Finite and inside [0, 1], otherwise 0.0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        value
    } else {
        0.0
    }
}

fn clamp_elapsed(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
