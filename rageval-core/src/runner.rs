//! Evaluation runner: one pass of the configured metrics over a batch of answers.
//!
//! Each (record, metric) pair is an independent task on a bounded worker pool.
//! A failing, panicking or slow scorer only ever affects its own pair.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EvalConfig;
use crate::error::ScorerError;
use crate::metrics::{MetricKind, MetricRegistry, RegisteredMetric, ScoringInput};
use crate::scenario::ScenarioStore;
use crate::types::{AnswerRecord, ErrorInfo, MetricResult, PassInfo, RecordResult};

/// Worker pool limits for a pass.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub concurrency: usize,
    /// Per scorer call.
    pub timeout: Duration,
    pub verbose: bool,
    /// Key results as `<metric>@<model>`.
    pub qualify_keys: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            timeout: Duration::from_secs(60),
            verbose: false,
            qualify_keys: false,
        }
    }
}

impl RunnerOptions {
    pub fn from_config(config: &EvalConfig) -> Self {
        Self {
            concurrency: config.runner.concurrency.max(1),
            timeout: Duration::from_secs(config.runner.timeout_secs),
            verbose: config.verbose,
            qualify_keys: config.qualify_metric_keys,
        }
    }
}

/// Results of one pass, one record per input answer in input order.
#[derive(Debug, Clone)]
pub struct PassOutput {
    pub pass: PassInfo,
    pub records: Vec<RecordResult>,
}

pub struct EvaluationRunner {
    store: Arc<ScenarioStore>,
    registry: Arc<MetricRegistry>,
    options: RunnerOptions,
}

impl EvaluationRunner {
    pub fn new(
        store: Arc<ScenarioStore>,
        registry: Arc<MetricRegistry>,
        options: RunnerOptions,
    ) -> Self {
        Self {
            store,
            registry,
            options,
        }
    }

    /// Score every answer with every registered metric.
    ///
    /// Never fails: unknown scenarios and scorer errors are recorded on the
    /// returned records.
    pub async fn run_pass(&self, answers: &[AnswerRecord]) -> PassOutput {
        let started_at = Utc::now();
        let pass_id = Uuid::new_v4();
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));

        info!(
            pass = %pass_id,
            records = answers.len(),
            metrics = ?self.result_keys(),
            concurrency = self.options.concurrency,
            "Starting evaluation pass"
        );

        let mut records: Vec<RecordResult> = Vec::with_capacity(answers.len());
        let mut handles = Vec::new();

        for (idx, answer) in answers.iter().enumerate() {
            let Some(scenario) = self.store.get(&answer.scenario_id) else {
                warn!(scenario_id = %answer.scenario_id, "Answer references unknown scenario");
                records.push(RecordResult::orphan(&answer.scenario_id));
                continue;
            };
            records.push(RecordResult::new(&answer.scenario_id));

            let scenario = Arc::new(scenario.clone());
            let answer = Arc::new(answer.clone());

            for (kind, metric) in self.registry.iter() {
                let input = ScoringInput {
                    scenario: scenario.clone(),
                    answer: answer.clone(),
                    settings: metric.settings.clone(),
                };
                let threshold = metric.settings.threshold;
                let key = self.result_key(kind, metric);
                let task_key = key.clone();
                let metric = metric.clone();
                let sem = semaphore.clone();
                let timeout = self.options.timeout;

                let handle = tokio::spawn(async move {
                    let _permit = match sem.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return Err(ScorerError::Aborted {
                                message: "worker pool closed".into(),
                            });
                        }
                    };
                    score_pair(kind, task_key, &metric, &input, timeout).await
                });
                handles.push((idx, key, threshold, Instant::now(), handle));
            }
        }

        for (idx, key, threshold, queued_at, handle) in handles {
            let result = match handle.await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => MetricResult::failure(key, threshold, ErrorInfo::from(&e))
                    .with_duration_ms(queued_at.elapsed().as_millis() as u64),
                Err(join_err) => {
                    let e = ScorerError::Aborted {
                        message: join_err.to_string(),
                    };
                    MetricResult::failure(key, threshold, ErrorInfo::from(&e))
                }
            };
            self.log_result(&records[idx].scenario_id, &result);
            records[idx].insert(result);
        }

        for record in &mut records {
            record.refresh_overall();
        }

        let pass = PassInfo {
            id: pass_id,
            metrics: self.result_keys(),
            records: records.len(),
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            pass = %pass.id,
            records = pass.records,
            elapsed_ms = (pass.finished_at - pass.started_at).num_milliseconds(),
            "Evaluation pass finished"
        );
        PassOutput { pass, records }
    }

    /// Name a metric's results are stored under.
    fn result_key(&self, kind: MetricKind, metric: &RegisteredMetric) -> String {
        if self.options.qualify_keys {
            format!("{kind}@{}", metric.settings.model)
        } else {
            kind.to_string()
        }
    }

    fn result_keys(&self) -> Vec<String> {
        self.registry
            .iter()
            .map(|(kind, metric)| self.result_key(kind, metric))
            .collect()
    }

    fn log_result(&self, scenario_id: &str, result: &MetricResult) {
        match (&result.error, self.options.verbose) {
            (Some(err), _) => warn!(
                scenario_id,
                metric = %result.metric_name,
                kind = %err.kind,
                error = %err.message,
                "Metric errored"
            ),
            (None, true) => info!(
                scenario_id,
                metric = %result.metric_name,
                score = result.score,
                passed = ?result.passed,
                reason = result.reason.as_deref().unwrap_or(""),
                "Metric scored"
            ),
            (None, false) => debug!(
                scenario_id,
                metric = %result.metric_name,
                score = result.score,
                passed = ?result.passed,
                "Metric scored"
            ),
        }
    }
}

/// Run one scorer on one record under the per-call timeout.
async fn score_pair(
    kind: MetricKind,
    key: String,
    metric: &RegisteredMetric,
    input: &ScoringInput,
    timeout: Duration,
) -> Result<MetricResult, ScorerError> {
    kind.check_preconditions(&input.scenario, &input.answer)?;

    let start = Instant::now();
    let measurement = tokio::time::timeout(timeout, metric.scorer.measure(input))
        .await
        .map_err(|_| ScorerError::Timeout {
            metric: kind.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })??;

    Ok(MetricResult::success(
        key,
        measurement.score,
        input.settings.threshold,
        measurement.reason,
    )
    .with_model(input.settings.model.clone())
    .with_duration_ms(start.elapsed().as_millis() as u64))
}
