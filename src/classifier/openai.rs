use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use super::model::ChatCompletionResp;
use super::ClassifierService;
use crate::config::Config;

/// Chat Completions client for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: Url,
    api_key: String,
    model: String,
    temperature: f32,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    pub fn new(
        base_url: Url,
        api_key: String,
        model: String,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent("headline-enricher/0.1")
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            api_key,
            model,
            temperature,
        })
    }

    /// Build from config; the API key is read from `classifier.api_key_env`.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let c = &cfg.classifier;
        let api_key = std::env::var(&c.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("environment variable {} is not set", c.api_key_env))?;
        let base_url = Url::parse(&c.api_base)
            .with_context(|| format!("invalid classifier.api_base {}", c.api_base))?;
        Self::new(
            base_url,
            api_key,
            c.model.clone(),
            c.temperature,
            Duration::from_secs(c.timeout_seconds),
        )
    }

    pub fn build_request(&self, prompt: &str) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join("v1/chat/completions")
            .context("invalid classifier base URL")?;
        let body = build_chat_request(&self.model, self.temperature, prompt);
        self.http
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .build()
            .context("failed to build classifier request")
    }
}

#[async_trait]
impl ClassifierService for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = self.build_request(prompt)?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach classifier")?;

        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("rate limited by classifier: {}", body);
            return Err(anyhow!("received 429 from classifier: {}", body));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("classifier error {}: {}", status, body));
        }

        let payload: ChatCompletionResp = res
            .json()
            .await
            .context("invalid classifier response JSON")?;
        debug!(model = ?payload.model, choices = payload.choices.len(), "classifier responded");
        payload
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("classifier response had no message content"))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Chat Completions body asking for a single JSON object.
pub fn build_chat_request(model: &str, temperature: f32, prompt: &str) -> Value {
    json!({
        "model": model,
        "messages": [
            { "role": "user", "content": prompt }
        ],
        "response_format": { "type": "json_object" },
        "temperature": temperature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiClient {
        OpenAiClient::new(
            Url::parse("http://localhost:9999/").unwrap(),
            "sk-secret".into(),
            "gpt-3.5-turbo-1106".into(),
            0.0,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn chat_request_asks_for_json_at_zero_temperature() {
        let body = build_chat_request("gpt-3.5-turbo-1106", 0.0, "classify this");
        assert_eq!(body["model"], "gpt-3.5-turbo-1106");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "classify this");
    }

    #[test]
    fn build_request_targets_chat_completions_with_bearer() {
        let req = client().build_request("hello").unwrap();
        assert_eq!(req.method(), reqwest::Method::POST);
        assert_eq!(req.url().as_str(), "http://localhost:9999/v1/chat/completions");
        let auth = req.headers().get("authorization").unwrap().to_str().unwrap();
        assert_eq!(auth, "Bearer sk-secret");
        let bytes = req.body().and_then(|b| b.as_bytes()).unwrap();
        let body: Value = serde_json::from_slice(bytes).unwrap();
        assert_eq!(body["messages"][0]["content"], "hello");
    }

    #[test]
    fn debug_output_hides_api_key() {
        let dbg = format!("{:?}", client());
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("gpt-3.5-turbo-1106"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let err = client().complete("hello").await;
        assert!(err.is_err());
    }
}
