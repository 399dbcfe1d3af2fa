//! Core type definitions for rageval.
//!
//! Defines the scenario and answer inputs, the per-metric and per-record results
//! produced by a scoring pass, and the batch structure persisted across passes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::ScorerError;

/// A canonical test input: the question, its reference context and an optional
/// expected answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    #[serde(alias = "input", alias = "prompt")]
    pub query: String,
    #[serde(default, alias = "context")]
    pub reference_context: Vec<String>,
    #[serde(default, alias = "reference", alias = "expected")]
    pub expected_output: Option<String>,
}

impl Scenario {
    pub fn new(id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            reference_context: Vec::new(),
            expected_output: None,
        }
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected_output = Some(expected.into());
        self
    }

    pub fn with_context(mut self, context: Vec<String>) -> Self {
        self.reference_context = context;
        self
    }

    /// Expected output, treating blank strings as absent.
    pub fn expected(&self) -> Option<&str> {
        self.expected_output
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }
}

/// A generated answer paired with the retrieval context used to produce it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    #[serde(alias = "id")]
    pub scenario_id: String,
    #[serde(alias = "answer")]
    pub actual_output: String,
    #[serde(default, alias = "contexts")]
    pub retrieval_context: Vec<String>,
}

impl AnswerRecord {
    pub fn new(scenario_id: impl Into<String>, actual_output: impl Into<String>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            actual_output: actual_output.into(),
            retrieval_context: Vec::new(),
        }
    }

    pub fn with_retrieval_context(mut self, context: Vec<String>) -> Self {
        self.retrieval_context = context;
        self
    }
}

/// Classification of an error recorded as data on a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The answer references a scenario id missing from the store.
    UnknownScenario,
    /// The scorer did not finish within the per-call timeout.
    Timeout,
    /// The judge call itself failed (transport, auth, rate limit, panic).
    JudgeFailure,
    /// The judge answered but the payload could not be interpreted.
    MalformedResponse,
    /// The record lacks a field the metric requires.
    Precondition,
    /// The embedding provider failed.
    EmbeddingFailure,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::UnknownScenario => "unknown_scenario",
            ErrorKind::Timeout => "timeout",
            ErrorKind::JudgeFailure => "judge_failure",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::Precondition => "precondition",
            ErrorKind::EmbeddingFailure => "embedding_failure",
        };
        write!(f, "{s}")
    }
}

/// An error captured on a metric or record result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown_scenario(scenario_id: &str) -> Self {
        Self::new(
            ErrorKind::UnknownScenario,
            format!("Scenario '{scenario_id}' not found in scenario store"),
        )
    }
}

impl From<&ScorerError> for ErrorInfo {
    fn from(err: &ScorerError) -> Self {
        let kind = match err {
            ScorerError::Precondition { .. } => ErrorKind::Precondition,
            ScorerError::Timeout { .. } => ErrorKind::Timeout,
            ScorerError::Judge(_) | ScorerError::Aborted { .. } => ErrorKind::JudgeFailure,
            ScorerError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            ScorerError::Embedding { .. } => ErrorKind::EmbeddingFailure,
        };
        Self::new(kind, err.to_string())
    }
}

/// Outcome of one metric on one record in one pass.
///
/// `passed` is `Some(score >= threshold)` for a successful measurement and
/// `None` when `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub metric_name: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// Judge or embedding model that produced the score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub evaluated_at: DateTime<Utc>,
}

impl MetricResult {
    /// Build a successful result. The score is clamped to `[0, 1]`.
    pub fn success(
        metric_name: impl Into<String>,
        score: f64,
        threshold: f64,
        reason: Option<String>,
    ) -> Self {
        let score = clamp_score(score);
        Self {
            metric_name: metric_name.into(),
            score,
            passed: Some(score >= threshold),
            threshold,
            reason,
            error: None,
            model: None,
            duration_ms: None,
            evaluated_at: Utc::now(),
        }
    }

    /// Build an errored result. Errored metrics carry no verdict.
    pub fn failure(metric_name: impl Into<String>, threshold: f64, error: ErrorInfo) -> Self {
        Self {
            metric_name: metric_name.into(),
            score: 0.0,
            passed: None,
            threshold,
            reason: None,
            error: Some(error),
            model: None,
            duration_ms: None,
            evaluated_at: Utc::now(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Whether this metric ran without error.
    pub fn is_scored(&self) -> bool {
        self.error.is_none()
    }
}

/// Clamp a raw score into `[0, 1]`; NaN maps to 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Accumulated metric results for one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordResult {
    pub scenario_id: String,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_passed: Option<bool>,
    /// Record-level error, e.g. an unknown scenario id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl RecordResult {
    pub fn new(scenario_id: impl Into<String>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            metrics: BTreeMap::new(),
            overall_passed: None,
            error: None,
        }
    }

    /// A record whose scenario could not be resolved.
    pub fn orphan(scenario_id: impl Into<String>) -> Self {
        let scenario_id = scenario_id.into();
        let error = ErrorInfo::unknown_scenario(&scenario_id);
        Self {
            scenario_id,
            metrics: BTreeMap::new(),
            overall_passed: None,
            error: Some(error),
        }
    }

    pub fn insert(&mut self, result: MetricResult) {
        self.metrics.insert(result.metric_name.clone(), result);
    }

    /// Logical AND of `passed` over metrics without error; `None` when no
    /// metric was scored successfully.
    pub fn compute_overall(&self) -> Option<bool> {
        let mut verdicts = self
            .metrics
            .values()
            .filter(|m| m.is_scored())
            .filter_map(|m| m.passed)
            .peekable();
        verdicts.peek()?;
        Some(verdicts.all(|p| p))
    }

    pub fn refresh_overall(&mut self) {
        self.overall_passed = self.compute_overall();
    }

    /// Number of metrics that ran without error.
    pub fn scored_count(&self) -> usize {
        self.metrics.values().filter(|m| m.is_scored()).count()
    }
}

/// Ledger entry for one runner pass that contributed to a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassInfo {
    pub id: Uuid,
    pub metrics: Vec<String>,
    pub records: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Aggregate statistics for one metric across a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub average: f64,
    pub pass_rate: f64,
    pub scored: usize,
    pub errored: usize,
}

/// Batch-level summary derived from the records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    #[serde(default)]
    pub per_metric_averages: BTreeMap<String, f64>,
    #[serde(default)]
    pub per_metric: BTreeMap<String, MetricStats>,
    /// Scenario ids whose overall verdict is a failure.
    #[serde(default)]
    pub failures: Vec<String>,
}

/// All record results of a batch plus the summary derived from them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    #[serde(default)]
    pub records: BTreeMap<String, RecordResult>,
    #[serde(default)]
    pub summary: BatchSummary,
    #[serde(default)]
    pub passes: Vec<PassInfo>,
}

impl BatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, scenario_id: &str) -> Option<&RecordResult> {
        self.records.get(scenario_id)
    }
}
