//! # rageval core
//!
//! Scoring and aggregation for retrieval-augmented generation answers.
//! Provides the scenario store, the scorer interface and metric registry,
//! the evaluation runner, result merging across passes, the batch aggregator,
//! result stores and configuration.

pub mod aggregate;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod judge;
pub mod merge;
pub mod metrics;
pub mod retry;
pub mod runner;
pub mod scenario;
pub mod store;
pub mod types;

// Re-export commonly used types at the crate root.
pub use aggregate::summarize;
pub use config::{ConfigOverrides, EvalConfig, load_config};
pub use embeddings::{Embedder, EmbeddingConfig, LocalEmbedder, OpenAiEmbedder, create_embedder};
pub use error::{ConfigError, JudgeError, RagEvalError, Result, ScorerError, StoreError};
pub use judge::{Judge, JudgeRequest, OpenAiJudge, ScriptedJudge};
pub use merge::ResultMerger;
pub use metrics::{Measurement, MetricKind, MetricRegistry, Scorer, ScorerSettings, ScoringInput};
pub use runner::{EvaluationRunner, PassOutput, RunnerOptions};
pub use scenario::ScenarioStore;
pub use store::{JsonFileStore, MemoryStore, ResultStore};
pub use types::{
    AnswerRecord, BatchResult, BatchSummary, ErrorInfo, ErrorKind, MetricResult, MetricStats,
    PassInfo, RecordResult, Scenario,
};
