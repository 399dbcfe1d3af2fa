//! Dataset ingestion: turns scenario, answer and combined RAG files into core types.

use anyhow::{Context, bail};
use serde::Deserialize;
use std::path::Path;

use rageval_core::{AnswerRecord, Scenario};

/// Rows that were skipped while reading a line-delimited file.
#[derive(Debug, Default)]
pub struct Skipped {
    pub lines: Vec<(usize, String)>,
}

impl Skipped {
    fn push(&mut self, line: usize, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(line, reason = %reason, "Skipping dataset line");
        self.lines.push((line, reason));
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScenarioFile {
    Wrapped { scenarios: Vec<Scenario> },
    Bare(Vec<Scenario>),
}

/// Load scenarios from `{"scenarios": [...]}` or a bare JSON array.
pub fn load_scenarios(path: &Path) -> anyhow::Result<Vec<Scenario>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenarios from {}", path.display()))?;
    let file: ScenarioFile = serde_json::from_str(&text)
        .with_context(|| format!("parsing scenarios in {}", path.display()))?;
    Ok(match file {
        ScenarioFile::Wrapped { scenarios } => scenarios,
        ScenarioFile::Bare(scenarios) => scenarios,
    })
}

/// Load answers from a JSONL file, one answer per line.
pub fn load_answers(path: &Path) -> anyhow::Result<(Vec<AnswerRecord>, Skipped)> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading answers from {}", path.display()))?;
    Ok(parse_answers(&text))
}

fn parse_answers(text: &str) -> (Vec<AnswerRecord>, Skipped) {
    let mut answers = Vec::new();
    let mut skipped = Skipped::default();
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AnswerRecord>(line) {
            Ok(answer) => answers.push(answer),
            Err(e) => skipped.push(line_no, e.to_string()),
        }
    }
    (answers, skipped)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Contexts {
    Many(Vec<String>),
    One(String),
}

impl Contexts {
    fn into_vec(self) -> Vec<String> {
        match self {
            Contexts::Many(v) => v,
            Contexts::One(s) if s.trim().is_empty() => Vec::new(),
            Contexts::One(s) => vec![s],
        }
    }
}

#[derive(Deserialize)]
struct RagRow {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, alias = "query", alias = "prompt")]
    input: String,
    #[serde(default, alias = "answer")]
    actual_output: String,
    #[serde(default, alias = "contexts")]
    retrieval_context: Option<Contexts>,
    #[serde(default, alias = "context")]
    reference_context: Option<Contexts>,
    #[serde(default, alias = "reference", alias = "expected")]
    expected_output: Option<String>,
}

/// A combined RAG dataset: each line yields one scenario and its answer.
#[derive(Debug, Default)]
pub struct RagDataset {
    pub scenarios: Vec<Scenario>,
    pub answers: Vec<AnswerRecord>,
    pub skipped: Skipped,
}

pub fn load_rag_dataset(path: &Path) -> anyhow::Result<RagDataset> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading RAG dataset from {}", path.display()))?;
    let dataset = parse_rag_dataset(&text);
    if dataset.scenarios.is_empty() && !dataset.skipped.is_empty() {
        bail!(
            "no usable rows in {} ({} skipped)",
            path.display(),
            dataset.skipped.lines.len()
        );
    }
    Ok(dataset)
}

fn parse_rag_dataset(text: &str) -> RagDataset {
    let mut dataset = RagDataset::default();
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let row: RagRow = match serde_json::from_str(line) {
            Ok(row) => row,
            Err(e) => {
                dataset.skipped.push(line_no, e.to_string());
                continue;
            }
        };
        if row.input.trim().is_empty() || row.actual_output.trim().is_empty() {
            dataset
                .skipped
                .push(line_no, "missing required fields (input, actual_output)");
            continue;
        }

        let id = row
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("line-{line_no}"));
        let mut scenario = Scenario::new(&id, row.input)
            .with_context(row.reference_context.map(Contexts::into_vec).unwrap_or_default());
        scenario.expected_output = row.expected_output;
        dataset.scenarios.push(scenario);
        dataset.answers.push(
            AnswerRecord::new(id, row.actual_output).with_retrieval_context(
                row.retrieval_context
                    .map(Contexts::into_vec)
                    .unwrap_or_default(),
            ),
        );
    }
    dataset
}
