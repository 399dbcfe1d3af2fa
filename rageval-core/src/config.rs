//! Configuration system for rageval.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace `rageval.toml` -> explicit config file -> environment -> CLI overrides.
//! Defaults (`model = "gpt-4o-mini"`, `threshold = 0.5`) are applied here, at the
//! call boundary, and handed to the runner as an explicit value.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::embeddings::EmbeddingConfig;
use crate::error::ConfigError;
use crate::metrics::{MetricKind, ScorerSettings};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Top-level configuration for an evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Judge model used by every LLM-judge metric unless overridden.
    pub model: String,
    /// Pass threshold applied to every metric unless overridden.
    pub threshold: f64,
    /// Log every score and reason at info level.
    pub verbose: bool,
    /// Ask judges for a rationale and keep it on the result.
    pub include_reason: bool,
    /// Subset of metric names to run; all registered metrics when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_to_use: Option<BTreeSet<String>>,
    /// Key results as `<metric>@<model>` so passes with different judge
    /// models sit side by side instead of replacing each other.
    #[serde(default)]
    pub qualify_metric_keys: bool,
    /// Per-metric overrides keyed by metric name.
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricOverride>,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            threshold: DEFAULT_THRESHOLD,
            verbose: false,
            include_reason: true,
            metrics_to_use: None,
            qualify_metric_keys: false,
            metrics: BTreeMap::new(),
            judge: JudgeConfig::default(),
            embedding: EmbeddingConfig::default(),
            runner: RunnerConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Per-metric settings that take precedence over the global ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    /// Disabled metrics are skipped even when listed in `metrics_to_use`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// LLM judge endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Provider name: "openai" (any OpenAI-compatible endpoint).
    pub provider: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            temperature: 0.0,
            max_tokens: 1024,
        }
    }
}

/// Worker pool and per-call limits for the evaluation runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Maximum scorer calls in flight at once.
    pub concurrency: usize,
    /// Per scorer call timeout, covering retries.
    pub timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            timeout_secs: 60,
        }
    }
}

/// Retry policy for transient judge and embedding failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Values set explicitly on the command line. Unset fields leave lower layers alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_reason: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_to_use: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualify_metric_keys: Option<bool>,
}

impl EvalConfig {
    /// Fail fast on settings that would make scoring meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_threshold("threshold", self.threshold)?;

        if let Some(requested) = &self.metrics_to_use {
            for name in requested {
                name.parse::<MetricKind>()?;
            }
        }
        for (name, ov) in &self.metrics {
            name.parse::<MetricKind>()?;
            if let Some(t) = ov.threshold {
                check_threshold(&format!("metrics.{name}.threshold"), t)?;
            }
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::invalid("model must not be empty"));
        }
        if self.runner.concurrency == 0 {
            return Err(ConfigError::invalid("runner.concurrency must be at least 1"));
        }
        if self.runner.timeout_secs == 0 {
            return Err(ConfigError::invalid("runner.timeout_secs must be positive"));
        }
        Ok(())
    }

    /// Metrics selected for a pass: the requested subset (or all), minus
    /// any explicitly disabled ones, in canonical order.
    pub fn selected_metrics(&self) -> Result<Vec<MetricKind>, ConfigError> {
        let requested: Vec<MetricKind> = match &self.metrics_to_use {
            Some(names) => names
                .iter()
                .map(|n| n.parse::<MetricKind>())
                .collect::<Result<_, _>>()?,
            None => MetricKind::ALL.to_vec(),
        };
        let mut selected: Vec<MetricKind> = requested
            .into_iter()
            .filter(|kind| {
                self.metrics
                    .get(kind.as_str())
                    .and_then(|ov| ov.enabled)
                    .unwrap_or(true)
            })
            .collect();
        selected.sort();
        selected.dedup();
        Ok(selected)
    }

    /// Resolve the effective settings for one metric.
    pub fn settings_for(&self, kind: MetricKind) -> ScorerSettings {
        let ov = self.metrics.get(kind.as_str());
        let model = ov
            .and_then(|o| o.model.clone())
            .unwrap_or_else(|| match kind {
                MetricKind::Similarity => self.embedding.model_name().to_string(),
                _ => self.model.clone(),
            });
        ScorerSettings {
            model,
            threshold: ov.and_then(|o| o.threshold).unwrap_or(self.threshold),
            include_reason: self.include_reason,
            verbose: self.verbose,
        }
    }
}

fn check_threshold(field: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::invalid(format!(
            "{field} ({value}) must be within [0, 1]"
        )));
    }
    Ok(())
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `RAGEVAL_`, `__` for nesting)
/// 3. Explicit config file
/// 4. Workspace config (`rageval.toml`)
/// 5. User config (`~/.config/rageval/config.toml`)
/// 6. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: Option<&ConfigOverrides>,
) -> Result<EvalConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(EvalConfig::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "rageval", "rageval") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join("rageval.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = config_file {
        if !path.exists() {
            return Err(ConfigError::ParseError {
                message: format!("config file not found: {}", path.display()),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("RAGEVAL_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: EvalConfig = figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = EvalConfig::default();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.threshold, 0.5);
        assert!(config.include_reason);
        assert!(!config.verbose);
        assert!(config.metrics_to_use.is_none());
        assert_eq!(config.runner.concurrency, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = EvalConfig::default();
        config.metrics.insert(
            "similarity".into(),
            MetricOverride {
                threshold: Some(0.8),
                ..Default::default()
            },
        );
        let toml_str = toml::to_string(&config).unwrap();
        let restored: EvalConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.model, config.model);
        assert_eq!(restored.metrics, config.metrics);
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let config = EvalConfig {
            threshold: 1.5,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let config = EvalConfig {
            threshold: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_metric_rejected() {
        let config = EvalConfig {
            metrics_to_use: Some(["bleu".to_string()].into_iter().collect()),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownMetric { ref name } if name == "bleu"));
    }

    #[test]
    fn test_per_metric_threshold_validated() {
        let mut config = EvalConfig::default();
        config.metrics.insert(
            "faithfulness".into(),
            MetricOverride {
                threshold: Some(-0.1),
                ..Default::default()
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_selected_metrics_defaults_to_all() {
        let config = EvalConfig::default();
        assert_eq!(config.selected_metrics().unwrap(), MetricKind::ALL.to_vec());
    }

    #[test]
    fn test_selected_metrics_respects_subset_and_disabled() {
        let mut config = EvalConfig {
            metrics_to_use: Some(
                ["faithfulness", "answer_relevancy", "similarity"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
            ..Default::default()
        };
        config.metrics.insert(
            "similarity".into(),
            MetricOverride {
                enabled: Some(false),
                ..Default::default()
            },
        );
        assert_eq!(
            config.selected_metrics().unwrap(),
            vec![MetricKind::AnswerRelevancy, MetricKind::Faithfulness]
        );
    }

    #[test]
    fn test_settings_for_applies_overrides() {
        let mut config = EvalConfig::default();
        config.metrics.insert(
            "hallucination".into(),
            MetricOverride {
                model: Some("gpt-4o".into()),
                threshold: Some(0.9),
                enabled: None,
            },
        );
        let s = config.settings_for(MetricKind::Hallucination);
        assert_eq!(s.model, "gpt-4o");
        assert_eq!(s.threshold, 0.9);

        let s = config.settings_for(MetricKind::Faithfulness);
        assert_eq!(s.model, "gpt-4o-mini");
        assert_eq!(s.threshold, 0.5);

        let s = config.settings_for(MetricKind::Similarity);
        assert_eq!(s.model, config.embedding.model_name());
    }

    #[test]
    fn test_load_config_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(dir.path()), None, None).unwrap();
        assert_eq!(config.judge.provider, "openai");
        assert_eq!(config.runner.timeout_secs, 60);
    }

    #[test]
    fn test_load_config_with_overrides() {
        let overrides = ConfigOverrides {
            model: Some("gpt-4o".into()),
            threshold: Some(0.7),
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(dir.path()), None, Some(&overrides)).unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.threshold, 0.7);
        assert!(config.include_reason);
        assert!(!config.qualify_metric_keys);

        let overrides = ConfigOverrides {
            qualify_metric_keys: Some(true),
            ..Default::default()
        };
        let config = load_config(Some(dir.path()), None, Some(&overrides)).unwrap();
        assert!(config.qualify_metric_keys);
        assert_eq!(config.model, "gpt-4o-mini");
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("rageval.toml"),
            r#"
model = "gpt-4o"
threshold = 0.6
metrics_to_use = ["faithfulness", "similarity"]

[metrics.similarity]
threshold = 0.8

[runner]
concurrency = 8
timeout_secs = 30
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None, None).unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.threshold, 0.6);
        assert_eq!(config.runner.concurrency, 8);
        assert_eq!(config.settings_for(MetricKind::Similarity).threshold, 0.8);
        assert_eq!(
            config.selected_metrics().unwrap(),
            vec![MetricKind::Similarity, MetricKind::Faithfulness]
        );
    }

    #[test]
    fn test_load_config_invalid_file_threshold_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "threshold = 2.0\n").unwrap();
        assert!(load_config(Some(dir.path()), Some(&path), None).is_err());
    }

    #[test]
    fn test_load_config_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = load_config(None, Some(&missing), None).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }
}
