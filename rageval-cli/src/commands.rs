//! Sub-command handlers.

use anyhow::{Context, bail};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rageval_core::{
    BatchResult, BatchSummary, ConfigOverrides, EmbeddingConfig, EvaluationRunner, JsonFileStore,
    Judge, MetricKind, MetricRegistry, OpenAiJudge, ResultMerger, ResultStore, RunnerOptions,
    ScenarioStore, create_embedder, load_config,
};

use crate::dataset;

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Run one scoring pass and merge it into a results file
    Score(ScoreArgs),
    /// Print the summary of a results file
    Summary {
        /// Results file
        #[arg(long)]
        results: PathBuf,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Merge result files into one
    Merge {
        /// Target results file (created if missing)
        #[arg(long)]
        into: PathBuf,
        /// Result files to merge, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List available metrics
    Metrics,
}

#[derive(clap::Args, Debug)]
#[command(group(
    clap::ArgGroup::new("input")
        .required(true)
        .args(["scenarios", "dataset"])
))]
pub struct ScoreArgs {
    /// Scenarios JSON (`{"scenarios": [...]}` or an array)
    #[arg(long, requires = "answers")]
    pub scenarios: Option<PathBuf>,

    /// Answers JSONL, one answer per line
    #[arg(long, requires = "scenarios")]
    pub answers: Option<PathBuf>,

    /// Combined RAG JSONL (input, actual_output, retrieval_context, expected_output)
    #[arg(long, conflicts_with_all = ["scenarios", "answers"])]
    pub dataset: Option<PathBuf>,

    /// Results file to merge this pass into
    #[arg(long)]
    pub results: PathBuf,

    /// Comma separated metric names (default: all configured)
    #[arg(long, value_delimiter = ',')]
    pub metrics: Vec<String>,

    /// Judge model
    #[arg(long)]
    pub model: Option<String>,

    /// Pass threshold for every metric
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Also write one record per line to this JSONL file
    #[arg(long)]
    pub jsonl: Option<PathBuf>,

    /// Use the local embedder and no LLM judge
    #[arg(long)]
    pub offline: bool,

    /// Do not ask judges for a rationale
    #[arg(long)]
    pub no_reason: bool,

    /// Store results as `<metric>@<model>` to compare judge models
    #[arg(long)]
    pub by_model: bool,
}

/// Global options shared by every sub-command.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub workspace: PathBuf,
    pub config_file: Option<PathBuf>,
    pub verbose: bool,
    pub quiet: bool,
}

pub async fn handle_command(command: Commands, ctx: &CliContext) -> anyhow::Result<()> {
    match command {
        Commands::Score(args) => {
            let batch = run_score(args, ctx).await?;
            if !ctx.quiet {
                print!("{}", render_summary(&batch.summary));
            }
            Ok(())
        }
        Commands::Summary { results, json } => {
            let mut batch = JsonFileStore::new(&results).load()?;
            batch.refresh_summary();
            if json {
                println!("{}", serde_json::to_string_pretty(&batch.summary)?);
            } else {
                print!("{}", render_summary(&batch.summary));
            }
            Ok(())
        }
        Commands::Merge { into, files } => {
            let target = JsonFileStore::new(&into);
            let mut merger = ResultMerger::new(target.load()?);
            for file in &files {
                let other = JsonFileStore::new(file).load()?;
                tracing::info!(file = %file.display(), records = other.len(), "Merging results file");
                merger.merge_batch(other);
            }
            target.save(merger.batch())?;
            if !ctx.quiet {
                print!("{}", render_summary(&merger.batch().summary));
            }
            Ok(())
        }
        Commands::Metrics => {
            for kind in MetricKind::ALL {
                let tag = if kind.is_judge() { "judge" } else { "embedding" };
                println!("{:<22} {:<10} {}", kind.as_str(), tag, kind.description());
            }
            Ok(())
        }
    }
}

async fn run_score(args: ScoreArgs, ctx: &CliContext) -> anyhow::Result<BatchResult> {
    let mut metrics_to_use: Option<BTreeSet<String>> = if args.metrics.is_empty() {
        None
    } else {
        Some(args.metrics.iter().map(|m| m.trim().to_string()).collect())
    };
    if args.offline && metrics_to_use.is_none() {
        metrics_to_use = Some(BTreeSet::from([MetricKind::Similarity.to_string()]));
    }

    let overrides = ConfigOverrides {
        model: args.model.clone(),
        threshold: args.threshold,
        verbose: ctx.verbose.then_some(true),
        include_reason: args.no_reason.then_some(false),
        metrics_to_use,
        qualify_metric_keys: args.by_model.then_some(true),
    };
    let mut config = load_config(
        Some(&ctx.workspace),
        ctx.config_file.as_deref(),
        Some(&overrides),
    )?;
    if args.offline {
        config.embedding = EmbeddingConfig::local();
    }

    let (scenarios, answers) = match (&args.dataset, &args.scenarios, &args.answers) {
        (Some(path), _, _) => {
            let data = dataset::load_rag_dataset(path)?;
            report_skipped(&data.skipped);
            (data.scenarios, data.answers)
        }
        (None, Some(scenarios), Some(answers)) => {
            let scenarios = dataset::load_scenarios(scenarios)?;
            let (answers, skipped) = dataset::load_answers(answers)?;
            report_skipped(&skipped);
            (scenarios, answers)
        }
        _ => bail!("either --dataset or both --scenarios and --answers are required"),
    };
    let store = ScenarioStore::from_scenarios(scenarios)?;

    let selected = config.selected_metrics()?;
    let judge: Option<Arc<dyn Judge>> = if selected.iter().any(MetricKind::is_judge) {
        if args.offline {
            bail!("judge metrics cannot run with --offline; use --metrics similarity");
        }
        let judge = OpenAiJudge::from_config(
            &config.judge,
            &config.retry,
            Duration::from_secs(config.runner.timeout_secs),
        )
        .context("creating LLM judge")?;
        Some(Arc::new(judge))
    } else {
        None
    };
    let embedder = create_embedder(&config.embedding, &config.retry);
    let registry = MetricRegistry::build(&config, judge, embedder)?;

    let runner = EvaluationRunner::new(
        Arc::new(store),
        Arc::new(registry),
        RunnerOptions::from_config(&config),
    );
    let output = runner.run_pass(&answers).await;

    let mut results = JsonFileStore::new(&args.results);
    if let Some(jsonl) = &args.jsonl {
        results = results.with_jsonl(jsonl);
    }
    let mut merger = ResultMerger::new(results.load()?);
    merger.apply(output);
    results.save(merger.batch())?;
    tracing::info!(results = %args.results.display(), "Results written");
    Ok(merger.into_inner())
}

fn report_skipped(skipped: &dataset::Skipped) {
    if !skipped.is_empty() {
        eprintln!("Skipped {} malformed line(s):", skipped.lines.len());
        for (line, reason) in &skipped.lines {
            eprintln!("  line {line}: {reason}");
        }
    }
}

/// Plain-text batch summary.
pub fn render_summary(summary: &BatchSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Records: {}  passed: {}  failed: {}  errored: {}",
        summary.total, summary.passed, summary.failed, summary.errored
    );
    if !summary.per_metric.is_empty() {
        let _ = writeln!(
            out,
            "\n{:<22} {:>8} {:>10} {:>7} {:>8}",
            "metric", "average", "pass rate", "scored", "errored"
        );
        for (name, stats) in &summary.per_metric {
            let average = summary
                .per_metric_averages
                .get(name)
                .map_or_else(|| "-".to_string(), |a| format!("{a:.3}"));
            let _ = writeln!(
                out,
                "{:<22} {:>8} {:>9.1}% {:>7} {:>8}",
                name,
                average,
                stats.pass_rate * 100.0,
                stats.scored,
                stats.errored
            );
        }
    }
    if !summary.failures.is_empty() {
        let _ = writeln!(out, "\nFailed: {}", summary.failures.join(", "));
    }
    out
}
