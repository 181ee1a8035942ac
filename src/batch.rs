use futures::stream::{self, StreamExt};
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::classifier::{classify, ClassifierService, ClassifyOptions};
use crate::config::Config;
use crate::model::{EnrichedHeadline, RawHeadline};

pub const MAX_CONCURRENCY: usize = 8;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Classifier calls in flight at once.
    pub concurrency: usize,
    /// Pause each slot takes after its call.
    pub inter_call_delay: Duration,
    pub classify: ClassifyOptions,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            inter_call_delay: Duration::from_millis(500),
            classify: ClassifyOptions::default(),
        }
    }
}

impl BatchOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            concurrency: cfg.app.concurrency,
            inter_call_delay: Duration::from_millis(cfg.app.inter_call_delay_ms),
            classify: ClassifyOptions::from_config(cfg),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// One candidate per input, in input order.
    pub candidates: Vec<EnrichedHeadline>,
    /// Candidates carrying the `Error` fallback.
    pub fallbacks: usize,
}

/// Classify every headline of a window. Nothing is dropped: a failed
/// classification still yields a candidate with the fallback labels.
#[instrument(skip_all, fields(items = items.len()))]
pub async fn process_batch(
    service: &dyn ClassifierService,
    items: &[RawHeadline],
    opts: &BatchOptions,
) -> BatchOutcome {
    let width = opts.concurrency.clamp(1, MAX_CONCURRENCY);
    let model_used = service.model_id().to_string();
    let total = items.len();

    let candidates: Vec<EnrichedHeadline> = stream::iter(items.iter().enumerate())
        .map(|(idx, raw)| {
            let model_used = model_used.as_str();
            async move {
                let classification = classify(service, &raw.title, &opts.classify).await;
                if classification.is_error() {
                    warn!(
                        n = idx + 1,
                        total,
                        link = %raw.link,
                        "headline stored with error fallback"
                    );
                } else {
                    info!(
                        n = idx + 1,
                        total,
                        sentiment = classification.sentiment.as_str(),
                        category = classification.category.as_str(),
                        confidence = classification.confidence,
                        "headline classified"
                    );
                }
                if !opts.inter_call_delay.is_zero() {
                    tokio::time::sleep(opts.inter_call_delay).await;
                }
                EnrichedHeadline::from_raw(raw, classification, model_used)
            }
        })
        .buffered(width)
        .collect()
        .await;

    let fallbacks = candidates.iter().filter(|c| c.is_error()).count();
    BatchOutcome {
        candidates,
        fallbacks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, Sentiment};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails for titles containing "fail", garbles titles containing "junk",
    /// and tracks the peak number of concurrent calls.
    #[derive(Default)]
    struct TitleKeyedService {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ClassifierService for TitleKeyedService {
        async fn complete(&self, prompt: &str) -> Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if prompt.contains("fail") {
                return Err(anyhow!("upstream unavailable"));
            }
            if prompt.contains("junk") {
                return Ok("<html>oops</html>".into());
            }
            Ok(r#"{"sentiment":"Neutral","category":"Politics","confidence":0.7}"#.into())
        }

        fn model_id(&self) -> &str {
            "keyed"
        }
    }

    struct InstantService;

    #[async_trait]
    impl ClassifierService for InstantService {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(r#"{"sentiment":"Positive","category":"Health","confidence":0.9}"#.into())
        }

        fn model_id(&self) -> &str {
            "instant"
        }
    }

    fn raw(title: &str, n: usize) -> RawHeadline {
        RawHeadline {
            title: title.to_string(),
            link: format!("https://news.example/{}", n),
            source: "g1".into(),
            scraped_at: Utc::now(),
        }
    }

    fn opts(concurrency: usize) -> BatchOptions {
        BatchOptions {
            concurrency,
            inter_call_delay: Duration::from_millis(1),
            classify: ClassifyOptions::default(),
        }
    }

    #[tokio::test]
    async fn every_input_yields_one_candidate_in_order() {
        let svc = TitleKeyedService::default();
        let items = vec![
            raw("Senado aprova reforma", 1),
            raw("this call will fail", 2),
            raw("junk payload please", 3),
            raw("Governo anuncia plano", 4),
        ];
        let out = process_batch(&svc, &items, &opts(3)).await;

        assert_eq!(out.candidates.len(), items.len());
        for (c, r) in out.candidates.iter().zip(&items) {
            assert_eq!(c.source_link, r.link);
            assert_eq!(c.title, r.title);
            assert_eq!(c.model_used, "keyed");
            assert!((0.0..=1.0).contains(&c.confidence));
            assert_eq!(c.sentiment == Sentiment::Error, c.category == Category::Error);
        }
        assert_eq!(out.fallbacks, 2);
        assert_eq!(out.candidates[0].category, Category::Politics);
        assert_eq!(out.candidates[1].sentiment, Sentiment::Error);
        assert_eq!(out.candidates[2].category, Category::Error);
        assert_eq!(out.candidates[3].sentiment, Sentiment::Neutral);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let svc = TitleKeyedService::default();
        let items: Vec<_> = (0..12).map(|n| raw(&format!("Headline {}", n), n)).collect();
        let out = process_batch(&svc, &items, &opts(2)).await;
        assert_eq!(out.candidates.len(), 12);
        assert!(svc.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn width_is_clamped_to_allowed_range() {
        let svc = TitleKeyedService::default();
        let items: Vec<_> = (0..20).map(|n| raw(&format!("Headline {}", n), n)).collect();
        let out = process_batch(&svc, &items, &opts(64)).await;
        assert_eq!(out.candidates.len(), 20);
        assert!(svc.peak.load(Ordering::SeqCst) <= MAX_CONCURRENCY);

        let out = process_batch(&svc, &items[..3], &opts(0)).await;
        assert_eq!(out.candidates.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn each_slot_waits_out_the_inter_call_delay() {
        let items: Vec<_> = (0..4).map(|n| raw(&format!("Headline {}", n), n)).collect();
        let mut opts = opts(2);
        opts.inter_call_delay = Duration::from_secs(10);

        let started = tokio::time::Instant::now();
        let out = process_batch(&InstantService, &items, &opts).await;
        let elapsed = started.elapsed();
        assert_eq!(out.candidates.len(), 4);
        assert!(elapsed >= Duration::from_secs(20), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(30), "{:?}", elapsed);

        opts.concurrency = 1;
        let started = tokio::time::Instant::now();
        let out = process_batch(&InstantService, &items, &opts).await;
        assert_eq!(out.candidates.len(), 4);
        assert!(started.elapsed() >= Duration::from_secs(40));
    }

    #[tokio::test]
    async fn empty_window_is_empty_outcome() {
        let svc = TitleKeyedService::default();
        let out = process_batch(&svc, &[], &opts(4)).await;
        assert!(out.candidates.is_empty());
        assert_eq!(out.fallbacks, 0);
    }
}
