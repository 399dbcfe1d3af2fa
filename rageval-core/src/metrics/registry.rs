use std::collections::BTreeMap;
use std::sync::Arc;

use super::{JudgeScorer, MetricKind, Scorer, ScorerSettings, SimilarityScorer};
use crate::config::EvalConfig;
use crate::embeddings::Embedder;
use crate::error::ConfigError;
use crate::judge::Judge;

/// A configured scorer plus its resolved settings.
#[derive(Clone)]
pub struct RegisteredMetric {
    pub scorer: Arc<dyn Scorer>,
    pub settings: ScorerSettings,
}

/// Maps metric kinds to configured scorer instances.
#[derive(Clone, Default)]
pub struct MetricRegistry {
    metrics: BTreeMap<MetricKind, RegisteredMetric>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one scorer per selected metric. Fails before any scoring starts
    /// on unknown metric names or out-of-range thresholds.
    pub fn build(
        config: &EvalConfig,
        judge: Option<Arc<dyn Judge>>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let selected = config.selected_metrics()?;
        if selected.is_empty() {
            return Err(ConfigError::invalid("no metrics selected"));
        }

        let mut registry = Self::new();
        for kind in selected {
            let scorer: Arc<dyn Scorer> = match kind {
                MetricKind::Similarity => Arc::new(SimilarityScorer::new(embedder.clone())),
                judge_kind => {
                    let judge = judge.clone().ok_or_else(|| {
                        ConfigError::invalid(format!(
                            "metric '{judge_kind}' needs an LLM judge but none is configured"
                        ))
                    })?;
                    Arc::new(JudgeScorer::new(judge_kind, judge)?)
                }
            };
            let mut settings = config.settings_for(kind);
            if kind == MetricKind::Similarity {
                settings.model = embedder.model_name().to_string();
            }
            registry.register(scorer, settings)?;
        }

        tracing::debug!(
            metrics = ?registry.names(),
            judge = judge.as_ref().map_or("none", |j| j.provider_name()),
            embedder = embedder.provider_name(),
            "Metric registry built"
        );
        Ok(registry)
    }

    /// Register a scorer, replacing any scorer already registered for its kind.
    pub fn register(
        &mut self,
        scorer: Arc<dyn Scorer>,
        settings: ScorerSettings,
    ) -> Result<(), ConfigError> {
        let kind = scorer.kind();
        if !(0.0..=1.0).contains(&settings.threshold) {
            return Err(ConfigError::invalid(format!(
                "threshold for '{kind}' ({}) must be within [0, 1]",
                settings.threshold
            )));
        }
        self.metrics
            .insert(kind, RegisteredMetric { scorer, settings });
        Ok(())
    }

    /// Swap the implementation for an already configured metric, keeping its settings.
    pub fn replace_scorer(&mut self, scorer: Arc<dyn Scorer>) -> Result<(), ConfigError> {
        let kind = scorer.kind();
        match self.metrics.get_mut(&kind) {
            Some(entry) => {
                entry.scorer = scorer;
                Ok(())
            }
            None => Err(ConfigError::UnknownMetric {
                name: kind.to_string(),
            }),
        }
    }

    pub fn get(&self, kind: MetricKind) -> Option<&RegisteredMetric> {
        self.metrics.get(&kind)
    }

    /// Registered metrics in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (MetricKind, &RegisteredMetric)> {
        self.metrics.iter().map(|(k, v)| (*k, v))
    }

    pub fn names(&self) -> Vec<String> {
        self.metrics.keys().map(|k| k.to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}
