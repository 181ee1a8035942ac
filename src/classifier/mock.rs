use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use super::ClassifierService;
use crate::model::{Category, Sentiment};

/// Offline classifier with stable, title-derived labels. Used when no
/// service is configured and for local dry runs.
#[derive(Debug, Clone)]
pub struct MockClassifier {
    model: String,
}

impl MockClassifier {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new("mock")
    }
}

// FNV-1a; std's hasher is not stable across releases.
fn stable_hash(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |h, b| {
        (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl ClassifierService for MockClassifier {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let h = stable_hash(prompt);
        let sentiment = Sentiment::LABELS[(h % Sentiment::LABELS.len() as u64) as usize];
        let category = Category::LABELS[((h >> 8) % Category::LABELS.len() as u64) as usize];
        let confidence = 0.6 + ((h >> 16) % 40) as f64 / 100.0;
        Ok(json!({
            "sentiment": sentiment.as_str(),
            "category": category.as_str(),
            "confidence": confidence,
        })
        .to_string())
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{parse_response, ParsedResponse};

    #[tokio::test]
    async fn mock_answers_are_deterministic_and_valid() {
        let mock = MockClassifier::default();
        let a = mock.complete("Flamengo vence classico").await.unwrap();
        let b = mock.complete("Flamengo vence classico").await.unwrap();
        assert_eq!(a, b);
        match parse_response(&a) {
            ParsedResponse::Valid(labels) => {
                assert!((0.6..1.0).contains(&labels.confidence));
            }
            ParsedResponse::Invalid(reason) => panic!("mock produced invalid payload: {}", reason),
        }
        assert_eq!(mock.model_id(), "mock");
    }
}
