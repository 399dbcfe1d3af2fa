//! Merging results from independent passes.
//!
//! Per scenario id, metric maps are unioned and a later value replaces an
//! earlier one only under the same metric name. Metrics are never removed.
//! `overall_passed` and the batch summary are recomputed after every merge.

use tracing::debug;

use crate::runner::PassOutput;
use crate::types::{BatchResult, RecordResult};

impl RecordResult {
    /// Fold a later result for the same scenario into this one.
    pub fn merge_from(&mut self, incoming: RecordResult) {
        debug_assert_eq!(self.scenario_id, incoming.scenario_id);
        self.metrics.extend(incoming.metrics);
        self.error = incoming.error;
        self.refresh_overall();
    }
}

impl BatchResult {
    /// Merge partial records into the batch and recompute the summary.
    pub fn merge_records(&mut self, records: impl IntoIterator<Item = RecordResult>) {
        for mut record in records {
            match self.records.get_mut(&record.scenario_id) {
                Some(existing) => existing.merge_from(record),
                None => {
                    record.refresh_overall();
                    self.records.insert(record.scenario_id.clone(), record);
                }
            }
        }
        self.refresh_summary();
    }

    /// Merge another batch into this one. `b.merge(b.clone())` leaves `b` unchanged.
    pub fn merge(&mut self, other: BatchResult) {
        for pass in other.passes {
            if !self.passes.iter().any(|p| p.id == pass.id) {
                self.passes.push(pass);
            }
        }
        self.merge_records(other.records.into_values());
    }
}

/// Sole owner of the accumulated batch. Merges are serialised through `&mut self`.
#[derive(Debug, Default)]
pub struct ResultMerger {
    batch: BatchResult,
}

impl ResultMerger {
    pub fn new(batch: BatchResult) -> Self {
        Self { batch }
    }

    /// Merge the records of one runner pass and record the pass in the ledger.
    pub fn apply(&mut self, output: PassOutput) {
        let PassOutput { pass, records } = output;
        debug!(
            pass = %pass.id,
            records = records.len(),
            existing = self.batch.len(),
            "Merging pass into batch"
        );
        if !self.batch.passes.iter().any(|p| p.id == pass.id) {
            self.batch.passes.push(pass);
        }
        self.batch.merge_records(records);
    }

    pub fn merge_batch(&mut self, other: BatchResult) {
        self.batch.merge(other);
    }

    pub fn batch(&self) -> &BatchResult {
        &self.batch
    }

    pub fn into_inner(self) -> BatchResult {
        self.batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ErrorInfo, ErrorKind, MetricResult, PassInfo};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn pass_output(metric: &str, scores: &[(&str, f64)]) -> PassOutput {
        let records = scores
            .iter()
            .map(|(id, score)| {
                let mut r = RecordResult::new(*id);
                r.insert(MetricResult::success(metric, *score, 0.5, None));
                r.refresh_overall();
                r
            })
            .collect::<Vec<_>>();
        PassOutput {
            pass: PassInfo {
                id: Uuid::new_v4(),
                metrics: vec![metric.to_string()],
                records: records.len(),
                started_at: Utc::now(),
                finished_at: Utc::now(),
            },
            records,
        }
    }

    #[test]
    fn test_passes_accumulate_without_clobbering() {
        let mut merger = ResultMerger::default();
        merger.apply(pass_output("similarity", &[("s1", 0.9), ("s2", 0.8)]));
        merger.apply(pass_output("faithfulness", &[("s1", 0.2)]));

        let batch = merger.batch();
        let s1 = batch.get("s1").unwrap();
        assert_eq!(s1.metrics.len(), 2);
        assert_eq!(s1.metrics["similarity"].score, 0.9);
        assert_eq!(s1.overall_passed, Some(false));
        assert_eq!(batch.get("s2").unwrap().metrics.len(), 1);
        assert_eq!(batch.passes.len(), 2);
        assert_eq!(batch.summary.failed, 1);
        assert_eq!(batch.summary.passed, 1);
    }

    #[test]
    fn test_same_metric_last_write_wins() {
        let mut merger = ResultMerger::default();
        merger.apply(pass_output("faithfulness", &[("s1", 0.2)]));
        merger.apply(pass_output("faithfulness", &[("s1", 0.7)]));
        let s1 = merger.batch().get("s1").unwrap();
        assert_eq!(s1.metrics["faithfulness"].score, 0.7);
        assert_eq!(s1.overall_passed, Some(true));
    }

    #[test]
    fn test_remerge_keeps_later_metrics() {
        let a = pass_output("similarity", &[("s1", 0.9)]);
        let b = pass_output("hallucination", &[("s1", 0.6)]);
        let mut merger = ResultMerger::default();
        merger.apply(a.clone());
        merger.apply(b);
        merger.apply(a);
        let s1 = merger.batch().get("s1").unwrap();
        assert!(s1.metrics.contains_key("hallucination"));
        assert!(s1.metrics.contains_key("similarity"));
        assert_eq!(merger.batch().passes.len(), 2);
    }

    #[test]
    fn test_merge_with_self_is_idempotent() {
        let mut merger = ResultMerger::default();
        merger.apply(pass_output("similarity", &[("s1", 0.9), ("s2", 0.1)]));
        merger.apply(pass_output("correctness", &[("s2", 0.7)]));
        let batch = merger.into_inner();

        let mut merged = batch.clone();
        merged.merge(batch.clone());
        assert_eq!(merged, batch);
    }

    #[test]
    fn test_record_error_follows_incoming_pass() {
        let mut existing = RecordResult::orphan("s1");
        let mut incoming = RecordResult::new("s1");
        incoming.insert(MetricResult::success("similarity", 0.9, 0.5, None));
        existing.merge_from(incoming);
        assert!(existing.error.is_none());
        assert_eq!(existing.overall_passed, Some(true));
    }

    #[test]
    fn test_errored_metric_does_not_flip_overall() {
        let mut record = RecordResult::new("s1");
        record.insert(MetricResult::success("similarity", 0.9, 0.5, None));
        record.refresh_overall();

        let mut incoming = RecordResult::new("s1");
        incoming.insert(MetricResult::failure(
            "faithfulness",
            0.5,
            ErrorInfo::new(ErrorKind::JudgeFailure, "502"),
        ));
        record.merge_from(incoming);
        assert_eq!(record.overall_passed, Some(true));
        assert_eq!(record.metrics.len(), 2);
    }
}
