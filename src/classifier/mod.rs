//! Headline classification: the service seam, the prompt, and the
//! parse-and-validate boundary that turns whatever the service returns into a
//! trusted [`Classification`].
//!
//! [`classify`] never fails. Transport faults, timeouts and payloads that do
//! not fit the closed label sets all collapse into
//! [`Classification::fallback`], where sentiment and category are both
//! `Error` and confidence is `0.0`.

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use crate::config::{Config, Provider};
use crate::model::{clamp_confidence, Category, Classification, Sentiment};

pub mod mock;
pub mod model;
pub mod openai;

pub use mock::MockClassifier;
pub use openai::OpenAiClient;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

static FENCED_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```(?:json|JSON)?\s*(.*?)\s*```\s*$").expect("valid fence regex")
});

/// A text-in, JSON-text-out classification service.
#[async_trait]
pub trait ClassifierService: Send + Sync {
    /// Send one prompt and return the raw payload text.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Identifier recorded as `model_used` on every enriched row.
    fn model_id(&self) -> &str;
}

/// Build the configured service.
pub fn build_service(cfg: &Config) -> Result<Arc<dyn ClassifierService>> {
    match cfg.classifier.provider {
        Provider::Openai => Ok(Arc::new(OpenAiClient::from_config(cfg)?)),
        Provider::Mock => Ok(Arc::new(MockClassifier::default())),
    }
}

#[derive(Debug, Clone)]
pub struct ClassifyOptions {
    /// Per-attempt deadline.
    pub timeout: Duration,
    /// Extra attempts after a transport fault or timeout.
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 0,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

impl ClassifyOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(cfg.classifier.timeout_seconds),
            max_retries: cfg.classifier.max_retries,
            retry_backoff: Duration::from_millis(cfg.classifier.retry_backoff_ms),
        }
    }
}

/// Labels that passed validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Labels {
    pub sentiment: Sentiment,
    pub category: Category,
    pub confidence: f64,
}

/// Outcome of the parse boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    Valid(Labels),
    Invalid(String),
}

/// Fixed instruction asking for exactly one JSON object with closed label sets.
pub fn build_prompt(title: &str) -> String {
    let sentiments = Sentiment::LABELS
        .iter()
        .map(|s| format!("\"{}\"", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    let categories = Category::LABELS
        .iter()
        .map(|c| format!("\"{}\"", c.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Classify the following news headline and return ONLY a JSON object with the keys \
         \"sentiment\", \"category\" and \"confidence\".\n\
         - \"sentiment\" must be exactly one of: {sentiments}.\n\
         - \"category\" must be exactly one of: {categories}.\n\
         - \"confidence\" is a number between 0 and 1.\n\n\
         Headline: \"{title}\""
    )
}

/// Validate a raw payload.
///
/// Both labels must belong to their closed sets; if either one does not, the
/// whole payload is rejected so the two fields always fail together. A
/// missing or out-of-range confidence on an otherwise valid payload becomes
/// `0.0`.
pub fn parse_response(body: &str) -> ParsedResponse {
    let json = match FENCED_JSON.captures(body).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => body.trim(),
    };
    let value: Value = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(err) => return ParsedResponse::Invalid(format!("payload is not JSON: {}", err)),
    };
    let Some(obj) = value.as_object() else {
        return ParsedResponse::Invalid("payload is not a JSON object".into());
    };

    let raw_sentiment = obj.get("sentiment").and_then(Value::as_str);
    let Some(sentiment) = raw_sentiment.and_then(Sentiment::parse_label) else {
        return ParsedResponse::Invalid(format!("unknown sentiment {:?}", raw_sentiment));
    };
    let raw_category = obj.get("category").and_then(Value::as_str);
    let Some(category) = raw_category.and_then(Category::parse_label) else {
        return ParsedResponse::Invalid(format!("unknown category {:?}", raw_category));
    };

    let confidence = obj
        .get("confidence")
        .and_then(|v| {
            v.as_f64()
                .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
        })
        .map(clamp_confidence)
        .unwrap_or(0.0);

    ParsedResponse::Valid(Labels {
        sentiment,
        category,
        confidence,
    })
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(10)).min(MAX_BACKOFF)
}

/// Classify one headline title. Never fails; see the module docs.
pub async fn classify(
    service: &dyn ClassifierService,
    title: &str,
    opts: &ClassifyOptions,
) -> Classification {
    let title = title.trim();
    if title.is_empty() {
        warn!("refusing to classify an empty title");
        return Classification::fallback(0.0);
    }

    let started = Instant::now();
    let prompt = build_prompt(title);
    let mut attempt = 0u32;
    let payload = loop {
        match tokio::time::timeout(opts.timeout, service.complete(&prompt)).await {
            Ok(Ok(body)) => break Some(body),
            Ok(Err(err)) => warn!(?err, attempt, "classifier call failed"),
            Err(_) => warn!(
                attempt,
                timeout_ms = opts.timeout.as_millis() as u64,
                "classifier call timed out"
            ),
        }
        if attempt >= opts.max_retries {
            break None;
        }
        tokio::time::sleep(backoff_delay(opts.retry_backoff, attempt)).await;
        attempt += 1;
    };
    let elapsed = started.elapsed().as_secs_f64();

    match payload.as_deref().map(parse_response) {
        Some(ParsedResponse::Valid(labels)) => Classification {
            sentiment: labels.sentiment,
            category: labels.category,
            confidence: labels.confidence,
            processing_time_seconds: elapsed,
        },
        Some(ParsedResponse::Invalid(reason)) => {
            warn!(%reason, "classifier returned an unusable payload");
            Classification::fallback(elapsed)
        }
        None => Classification::fallback(elapsed),
    }
}
