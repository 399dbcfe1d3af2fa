//! Batch summary derived from record results.

use std::collections::BTreeMap;

use crate::types::{BatchResult, BatchSummary, MetricStats, RecordResult};

#[derive(Default)]
struct Tally {
    score_sum: f64,
    scored: usize,
    passed: usize,
    errored: usize,
}

/// Summarise a record set. Pure: the same records always give the same summary.
///
/// A record counts as passed or failed from its `overall_passed`; records with
/// no successfully scored metric count as errored. Metric averages and pass
/// rates only cover records where that metric ran without error.
pub fn summarize(records: &BTreeMap<String, RecordResult>) -> BatchSummary {
    let mut summary = BatchSummary {
        total: records.len(),
        ..Default::default()
    };
    let mut tallies: BTreeMap<&str, Tally> = BTreeMap::new();

    for (id, record) in records {
        match record.compute_overall() {
            Some(true) => summary.passed += 1,
            Some(false) => {
                summary.failed += 1;
                summary.failures.push(id.clone());
            }
            None => summary.errored += 1,
        }

        for (name, metric) in &record.metrics {
            let tally = tallies.entry(name.as_str()).or_default();
            if metric.is_scored() {
                tally.score_sum += metric.score;
                tally.scored += 1;
                if metric.passed == Some(true) {
                    tally.passed += 1;
                }
            } else {
                tally.errored += 1;
            }
        }
    }

    for (name, tally) in tallies {
        let (average, pass_rate) = if tally.scored > 0 {
            let n = tally.scored as f64;
            (tally.score_sum / n, tally.passed as f64 / n)
        } else {
            (0.0, 0.0)
        };
        if tally.scored > 0 {
            summary.per_metric_averages.insert(name.to_string(), average);
        }
        summary.per_metric.insert(
            name.to_string(),
            MetricStats {
                average,
                pass_rate,
                scored: tally.scored,
                errored: tally.errored,
            },
        );
    }

    summary
}

impl BatchResult {
    /// Recompute the summary from the current records.
    pub fn refresh_summary(&mut self) {
        self.summary = summarize(&self.records);
    }
}
