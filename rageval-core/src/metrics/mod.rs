//! Scorer interface and the closed set of metric kinds.
//!
//! Every metric implements [`Scorer`]. The embedding-similarity scorer compares
//! numbers only; the judge scorers share one implementation that differs per
//! kind in the prompt and in which record fields it consults.

mod judge;
mod registry;
mod similarity;

pub use judge::JudgeScorer;
pub use registry::{MetricRegistry, RegisteredMetric};
pub use similarity::SimilarityScorer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{ConfigError, ScorerError};
use crate::types::{AnswerRecord, Scenario};

/// Closed set of metrics. Declaration order is the canonical run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Similarity,
    AnswerRelevancy,
    Faithfulness,
    ContextualPrecision,
    ContextualRecall,
    ContextualRelevancy,
    Hallucination,
    Traceability,
    Correctness,
}

impl MetricKind {
    pub const ALL: [MetricKind; 9] = [
        MetricKind::Similarity,
        MetricKind::AnswerRelevancy,
        MetricKind::Faithfulness,
        MetricKind::ContextualPrecision,
        MetricKind::ContextualRecall,
        MetricKind::ContextualRelevancy,
        MetricKind::Hallucination,
        MetricKind::Traceability,
        MetricKind::Correctness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Similarity => "similarity",
            MetricKind::AnswerRelevancy => "answer_relevancy",
            MetricKind::Faithfulness => "faithfulness",
            MetricKind::ContextualPrecision => "contextual_precision",
            MetricKind::ContextualRecall => "contextual_recall",
            MetricKind::ContextualRelevancy => "contextual_relevancy",
            MetricKind::Hallucination => "hallucination",
            MetricKind::Traceability => "traceability",
            MetricKind::Correctness => "correctness",
        }
    }

    /// Whether the metric is scored by an LLM judge.
    pub fn is_judge(&self) -> bool {
        !matches!(self, MetricKind::Similarity)
    }

    pub fn judge_kinds() -> impl Iterator<Item = MetricKind> {
        Self::ALL.into_iter().filter(MetricKind::is_judge)
    }

    pub fn description(&self) -> &'static str {
        match self {
            MetricKind::Similarity => "embedding cosine similarity of answer and expected output",
            MetricKind::AnswerRelevancy => "how directly the answer addresses the query",
            MetricKind::Faithfulness => "whether answer claims are supported by retrieval context",
            MetricKind::ContextualPrecision => "whether relevant context chunks are ranked first",
            MetricKind::ContextualRecall => "how much of the expected output the context covers",
            MetricKind::ContextualRelevancy => "share of retrieval context relevant to the query",
            MetricKind::Hallucination => "answer stays grounded in the reference (1.0 = grounded)",
            MetricKind::Traceability => "answer claims trace back to the reference",
            MetricKind::Correctness => "answer correctly and completely matches expected output",
        }
    }

    /// Check that the record carries the fields this metric consults.
    pub fn check_preconditions(
        &self,
        scenario: &Scenario,
        answer: &AnswerRecord,
    ) -> Result<(), ScorerError> {
        let needs_expected = matches!(
            self,
            MetricKind::Similarity
                | MetricKind::ContextualRecall
                | MetricKind::Hallucination
                | MetricKind::Traceability
                | MetricKind::Correctness
        );
        let needs_context = matches!(
            self,
            MetricKind::Faithfulness
                | MetricKind::ContextualPrecision
                | MetricKind::ContextualRecall
                | MetricKind::ContextualRelevancy
        );

        if needs_expected && scenario.expected().is_none() {
            return Err(self.precondition("expected_output is missing"));
        }
        if needs_context && !answer.retrieval_context.iter().any(|c| !c.trim().is_empty()) {
            return Err(self.precondition("retrieval_context is empty"));
        }
        Ok(())
    }

    fn precondition(&self, reason: &str) -> ScorerError {
        ScorerError::Precondition {
            metric: self.as_str().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        MetricKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnknownMetric {
                name: s.to_string(),
            })
    }
}

/// Resolved per-metric settings handed to a scorer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScorerSettings {
    pub model: String,
    pub threshold: f64,
    pub include_reason: bool,
    pub verbose: bool,
}

/// Everything a scorer needs for one (record, metric) pair.
#[derive(Debug, Clone)]
pub struct ScoringInput {
    pub scenario: Arc<Scenario>,
    pub answer: Arc<AnswerRecord>,
    pub settings: ScorerSettings,
}

/// Raw outcome of a scorer, before the threshold is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub score: f64,
    pub reason: Option<String>,
}

impl Measurement {
    pub fn new(score: f64, reason: Option<String>) -> Self {
        Self { score, reason }
    }
}

/// A single metric.
#[async_trait]
pub trait Scorer: Send + Sync {
    fn kind(&self) -> MetricKind;

    async fn measure(&self, input: &ScoringInput) -> Result<Measurement, ScorerError>;
}
