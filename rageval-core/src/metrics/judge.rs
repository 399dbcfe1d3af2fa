use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;

use super::{Measurement, MetricKind, Scorer, ScoringInput};
use crate::error::{ConfigError, ScorerError};
use crate::judge::{Judge, JudgeRequest, VerdictKeys, parse_verdict};

const SYSTEM_PROMPT: &str = "You are an evaluation judge for retrieval-augmented generation. \
Assess the material you are given against the stated criterion. Return STRICT JSON only.";

/// An LLM-judge metric. One implementation serves every judge kind.
pub struct JudgeScorer {
    kind: MetricKind,
    judge: Arc<dyn Judge>,
}

impl JudgeScorer {
    pub fn new(kind: MetricKind, judge: Arc<dyn Judge>) -> Result<Self, ConfigError> {
        if !kind.is_judge() {
            return Err(ConfigError::invalid(format!(
                "metric '{kind}' is not a judge metric"
            )));
        }
        Ok(Self { kind, judge })
    }

    fn criterion(&self) -> &'static str {
        match self.kind {
            MetricKind::AnswerRelevancy => {
                "Answer relevancy: how much of the actual output directly addresses the query. \
                 Irrelevant or off-topic statements lower the score."
            }
            MetricKind::Faithfulness => {
                "Faithfulness: the fraction of claims in the actual output that are supported \
                 by the retrieval context. Do not use outside knowledge."
            }
            MetricKind::ContextualPrecision => {
                "Contextual precision: whether the retrieval context chunks that are relevant \
                 to the query are ranked above irrelevant ones."
            }
            MetricKind::ContextualRecall => {
                "Contextual recall: the fraction of statements in the expected output that can \
                 be attributed to the retrieval context."
            }
            MetricKind::ContextualRelevancy => {
                "Contextual relevancy: the fraction of the retrieval context that is relevant \
                 to the query."
            }
            MetricKind::Hallucination => {
                "Hallucination: whether the actual output stays grounded in the expected \
                 response and reference material. Score 1 when nothing is invented, 0 when \
                 the answer contradicts or fabricates facts."
            }
            MetricKind::Traceability => {
                "Traceability: whether every claim in the actual output can be traced back to \
                 the expected response or reference material."
            }
            MetricKind::Correctness => {
                "Correctness: whether the actual output correctly and completely matches the \
                 expected output."
            }
            MetricKind::Similarity => "",
        }
    }

    /// Extra boolean and rationale keys accepted in place of the generic ones.
    fn verdict_keys(&self) -> VerdictKeys {
        match self.kind {
            MetricKind::Hallucination => VerdictKeys {
                verdict: &["hallucination_success", "grounded"],
                reason: &["hallucination_reason"],
            },
            MetricKind::Traceability => VerdictKeys {
                verdict: &[
                    "traceability_success",
                    "traceability_geval_success",
                    "traceable",
                ],
                reason: &["traceability_reason", "traceability_geval_reason"],
            },
            _ => VerdictKeys::GENERIC,
        }
    }

    fn build_prompt(&self, input: &ScoringInput) -> String {
        let scenario = &input.scenario;
        let answer = &input.answer;
        let mut prompt = String::new();

        let _ = writeln!(prompt, "CRITERION:\n{}\n", self.criterion());
        let _ = writeln!(prompt, "QUERY:\n{}\n", scenario.query);
        if !matches!(
            self.kind,
            MetricKind::ContextualPrecision
                | MetricKind::ContextualRecall
                | MetricKind::ContextualRelevancy
        ) {
            let _ = writeln!(prompt, "ACTUAL OUTPUT:\n{}\n", answer.actual_output);
        }

        let uses_expected = !matches!(
            self.kind,
            MetricKind::AnswerRelevancy | MetricKind::Faithfulness | MetricKind::ContextualRelevancy
        );
        if uses_expected && let Some(expected) = scenario.expected() {
            let _ = writeln!(prompt, "EXPECTED OUTPUT:\n{expected}\n");
        }

        let uses_retrieval = matches!(
            self.kind,
            MetricKind::Faithfulness
                | MetricKind::ContextualPrecision
                | MetricKind::ContextualRecall
                | MetricKind::ContextualRelevancy
        );
        if uses_retrieval {
            push_numbered(&mut prompt, "RETRIEVAL CONTEXT", &answer.retrieval_context);
        }
        if matches!(self.kind, MetricKind::Hallucination | MetricKind::Traceability) {
            push_numbered(&mut prompt, "REFERENCE CONTEXT", &scenario.reference_context);
        }

        if input.settings.include_reason {
            prompt.push_str(
                "Return JSON only: {\"score\": <number between 0 and 1>, \"reason\": \"<one or two sentences>\"}",
            );
        } else {
            prompt.push_str("Return JSON only: {\"score\": <number between 0 and 1>}");
        }
        prompt
    }
}

fn push_numbered(prompt: &mut String, title: &str, items: &[String]) {
    let items: Vec<&String> = items.iter().filter(|c| !c.trim().is_empty()).collect();
    if items.is_empty() {
        return;
    }
    let _ = writeln!(prompt, "{title}:");
    for (i, item) in items.iter().enumerate() {
        let _ = writeln!(prompt, "[{}] {}", i + 1, item);
    }
    prompt.push('\n');
}

#[async_trait]
impl Scorer for JudgeScorer {
    fn kind(&self) -> MetricKind {
        self.kind
    }

    async fn measure(&self, input: &ScoringInput) -> Result<Measurement, ScorerError> {
        let request = JudgeRequest {
            metric: self.kind.to_string(),
            model: input.settings.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            prompt: self.build_prompt(input),
        };
        let text = self.judge.complete(request).await?;
        let verdict = parse_verdict(&text, &self.verdict_keys())?;
        let reason = if input.settings.include_reason {
            verdict.reason
        } else {
            None
        };
        Ok(Measurement::new(verdict.score, reason))
    }
}
