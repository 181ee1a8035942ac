//! Configuration loader and validator for the headline enricher.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub classifier: Classifier,
    #[serde(default)]
    pub report: Report,
}

/// Run-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_inter_call_delay_ms")]
    pub inter_call_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Openai,
    Mock,
}

/// Classification service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classifier {
    pub provider: Provider,
    pub api_base: String,
    pub api_key_env: String,
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    pub timeout_seconds: u64,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

/// Quality thresholds for the run report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub max_error_rate: f64,
    pub min_avg_confidence: f64,
}

impl Default for Report {
    fn default() -> Self {
        Self {
            max_error_rate: 0.10,
            min_avg_confidence: 0.70,
        }
    }
}

fn default_batch_size() -> usize {
    50
}

fn default_concurrency() -> usize {
    4
}

fn default_inter_call_delay_ms() -> u64 {
    500
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        fs::create_dir_all(&self.app.data_dir)
    }

    /// `DATABASE_URL` wins; otherwise a SQLite file under `app.data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!(
                "sqlite://{}/headlines.db",
                self.app.data_dir.trim_end_matches('/')
            )
        })
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.batch_size == 0 {
        return Err(ConfigError::Invalid("app.batch_size must be > 0"));
    }
    if !(1..=8).contains(&cfg.app.concurrency) {
        return Err(ConfigError::Invalid("app.concurrency must be between 1 and 8"));
    }

    let c = &cfg.classifier;
    if c.api_base.trim().is_empty() {
        return Err(ConfigError::Invalid("classifier.api_base must be non-empty"));
    }
    if c.provider == Provider::Openai && c.api_key_env.trim().is_empty() {
        return Err(ConfigError::Invalid("classifier.api_key_env must be non-empty"));
    }
    if c.model.trim().is_empty() {
        return Err(ConfigError::Invalid("classifier.model must be non-empty"));
    }
    if !c.temperature.is_finite() || !(0.0..=2.0).contains(&c.temperature) {
        return Err(ConfigError::Invalid("classifier.temperature must be within [0, 2]"));
    }
    if c.timeout_seconds == 0 {
        return Err(ConfigError::Invalid("classifier.timeout_seconds must be > 0"));
    }

    if !(0.0..=1.0).contains(&cfg.report.max_error_rate) {
        return Err(ConfigError::Invalid("report.max_error_rate must be within [0, 1]"));
    }
    if !(0.0..=1.0).contains(&cfg.report.min_avg_confidence) {
        return Err(ConfigError::Invalid("report.min_avg_confidence must be within [0, 1]"));
    }

    Ok(())
}

/// Returns the documented example YAML.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  batch_size: 50
  concurrency: 4
  inter_call_delay_ms: 500

classifier:
  provider: "openai"
  api_base: "https://api.openai.com/"
  api_key_env: "OPENAI_API_KEY"
  model: "gpt-3.5-turbo-1106"
  temperature: 0.0
  timeout_seconds: 30
  max_retries: 2
  retry_backoff_ms: 1000

report:
  max_error_rate: 0.10
  min_avg_confidence: 0.70
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn example_cfg() -> Config {
        serde_yaml::from_str(example()).unwrap()
    }

    #[test]
    fn parse_example_ok() {
        let cfg = example_cfg();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.batch_size, 50);
        assert_eq!(cfg.classifier.provider, Provider::Openai);
        assert_eq!(cfg.classifier.temperature, 0.0);
    }

    #[test]
    fn defaults_fill_optional_fields() {
        let yaml = r#"app:
  data_dir: "./data"
classifier:
  provider: "mock"
  api_base: "http://localhost/"
  api_key_env: ""
  model: "mock"
  timeout_seconds: 5
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.batch_size, 50);
        assert_eq!(cfg.app.concurrency, 4);
        assert_eq!(cfg.app.inter_call_delay_ms, 500);
        assert_eq!(cfg.classifier.max_retries, 0);
        assert_eq!(cfg.report, Report::default());
    }

    #[test]
    fn invalid_batch_size() {
        let mut cfg = example_cfg();
        cfg.app.batch_size = 0;
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("batch_size")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_concurrency() {
        let mut cfg = example_cfg();
        cfg.app.concurrency = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_cfg();
        cfg.app.concurrency = 9;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_classifier_fields() {
        let mut cfg = example_cfg();
        cfg.classifier.model = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("classifier.model")),
            _ => panic!("wrong error"),
        }

        let mut cfg = example_cfg();
        cfg.classifier.api_key_env = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_cfg();
        cfg.classifier.temperature = 3.5;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_cfg();
        cfg.classifier.timeout_seconds = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_report_thresholds() {
        let mut cfg = example_cfg();
        cfg.report.max_error_rate = 1.5;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg = example_cfg();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.classifier.model, "gpt-3.5-turbo-1106");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let td = tempdir().unwrap();
        let err = load(Some(&td.path().join("nope.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
