//! LLM-as-a-judge collaborators.
//!
//! The runner only ever sees the [`Judge`] trait. [`OpenAiJudge`] talks to any
//! OpenAI-compatible chat endpoint; [`ScriptedJudge`] answers in-process and is
//! used by tests and dry runs.

mod openai;
pub mod parse;

pub use openai::OpenAiJudge;
pub use parse::{
    JudgeVerdict, VerdictKeys, as_bool, extract_json, normalize_score, parse_verdict,
};

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::JudgeError;

/// A single judge prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeRequest {
    /// Metric on whose behalf the judge is asked. Used for logging and routing.
    pub metric: String,
    pub model: String,
    pub system: String,
    pub prompt: String,
}

/// Anything that turns a prompt into raw judge text.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn complete(&self, request: JudgeRequest) -> Result<String, JudgeError>;

    /// Provider name for logs.
    fn provider_name(&self) -> &str;
}

type Responder = dyn Fn(&JudgeRequest) -> Result<String, JudgeError> + Send + Sync;

/// Deterministic judge backed by a closure.
pub struct ScriptedJudge {
    responder: Arc<Responder>,
    calls: AtomicUsize,
}

impl ScriptedJudge {
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&JudgeRequest) -> Result<String, JudgeError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always answer with the same text.
    pub fn constant(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::from_fn(move |_| Ok(text.clone()))
    }

    /// Answer `{"score": s, "reason": ...}` for every request.
    pub fn scoring(score: f64) -> Self {
        Self::constant(format!(
            r#"{{"score": {score}, "reason": "scripted score {score}"}}"#
        ))
    }

    /// Number of completed `complete` calls.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    async fn complete(&self, request: JudgeRequest) -> Result<String, JudgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.responder)(&request)
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(metric: &str) -> JudgeRequest {
        JudgeRequest {
            metric: metric.into(),
            model: "gpt-4o-mini".into(),
            system: "judge".into(),
            prompt: "is it right?".into(),
        }
    }

    #[tokio::test]
    async fn test_scripted_judge_routes_by_metric() {
        let judge = ScriptedJudge::from_fn(|req| match req.metric.as_str() {
            "faithfulness" => Ok(r#"{"score": 0.9}"#.into()),
            _ => Err(JudgeError::Connection {
                message: "offline".into(),
            }),
        });
        assert_eq!(
            judge.complete(request("faithfulness")).await.unwrap(),
            r#"{"score": 0.9}"#
        );
        assert!(judge.complete(request("hallucination")).await.is_err());
        assert_eq!(judge.call_count(), 2);
    }

    #[tokio::test]
    async fn test_scoring_judge_output_parses() {
        let judge = ScriptedJudge::scoring(0.75);
        let text = judge.complete(request("answer_relevancy")).await.unwrap();
        let verdict = parse_verdict(&text, &VerdictKeys::GENERIC).unwrap();
        assert_eq!(verdict.score, 0.75);
    }
}
