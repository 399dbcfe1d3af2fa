use async_trait::async_trait;
use std::sync::Arc;

use super::{Measurement, MetricKind, Scorer, ScoringInput};
use crate::embeddings::{Embedder, cosine};
use crate::error::ScorerError;

/// Cosine similarity between the embedded answer and expected output.
pub struct SimilarityScorer {
    embedder: Arc<dyn Embedder>,
}

impl SimilarityScorer {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ScorerError> {
        self.embedder
            .embed(text)
            .await
            .map_err(|e| ScorerError::Embedding {
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl Scorer for SimilarityScorer {
    fn kind(&self) -> MetricKind {
        MetricKind::Similarity
    }

    async fn measure(&self, input: &ScoringInput) -> Result<Measurement, ScorerError> {
        let expected = input
            .scenario
            .expected()
            .ok_or_else(|| ScorerError::Precondition {
                metric: MetricKind::Similarity.to_string(),
                reason: "expected_output is missing".into(),
            })?;

        let answer_vec = self.embed(&input.answer.actual_output).await?;
        let expected_vec = self.embed(expected).await?;
        let score = cosine(&answer_vec, &expected_vec).max(0.0);

        let reason = input.settings.include_reason.then(|| {
            format!(
                "cosine similarity {score:.3} via {} embeddings ({})",
                self.embedder.provider_name(),
                self.embedder.model_name()
            )
        });
        Ok(Measurement::new(score, reason))
    }
}
