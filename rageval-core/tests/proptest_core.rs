//! Property-based tests for scoring, merging and aggregation using proptest.

use proptest::prelude::*;

use rageval_core::summarize;
use rageval_core::{JsonFileStore, ResultStore};
use rageval_core::types::{BatchResult, ErrorInfo, ErrorKind, MetricResult, RecordResult};

const METRICS: [&str; 4] = ["similarity", "answer_relevancy", "faithfulness", "hallucination"];

#[derive(Debug, Clone)]
struct Entry {
    scenario: u8,
    metric: usize,
    score: f64,
    errored: bool,
}

fn entry() -> impl Strategy<Value = Entry> {
    (0u8..6, 0usize..METRICS.len(), 0.0f64..=1.0, any::<bool>()).prop_map(
        |(scenario, metric, score, errored)| Entry {
            scenario,
            metric,
            score,
            errored,
        },
    )
}

fn to_records(entries: &[Entry], metrics: &[usize]) -> Vec<RecordResult> {
    entries
        .iter()
        .filter(|e| metrics.contains(&e.metric))
        .map(|e| {
            let mut r = RecordResult::new(format!("s{}", e.scenario));
            let name = METRICS[e.metric];
            if e.errored {
                r.insert(MetricResult::failure(
                    name,
                    0.5,
                    ErrorInfo::new(ErrorKind::JudgeFailure, "injected"),
                ));
            } else {
                r.insert(MetricResult::success(name, e.score, 0.5, None));
            }
            r
        })
        .collect()
}

fn batch_from(records: Vec<RecordResult>) -> BatchResult {
    let mut batch = BatchResult::new();
    batch.merge_records(records);
    batch
}

// --- Threshold properties ---

proptest! {
    #[test]
    fn passed_matches_threshold(score in 0.0f64..=1.0, threshold in 0.0f64..=1.0) {
        let r = MetricResult::success("m", score, threshold, None);
        prop_assert_eq!(r.passed, Some(score >= threshold));
    }

    #[test]
    fn scores_always_clamped(score in -100.0f64..100.0) {
        let r = MetricResult::success("m", score, 0.5, None);
        prop_assert!((0.0..=1.0).contains(&r.score));
    }
}

// --- Merge properties ---

proptest! {
    #[test]
    fn merge_with_self_is_idempotent(entries in prop::collection::vec(entry(), 0..30)) {
        let batch = batch_from(to_records(&entries, &[0, 1, 2, 3]));
        let mut merged = batch.clone();
        merged.merge(batch.clone());
        prop_assert_eq!(merged, batch);
    }

    #[test]
    fn disjoint_passes_commute_on_metric_sets(entries in prop::collection::vec(entry(), 0..30)) {
        let a = to_records(&entries, &[0, 1]);
        let b = to_records(&entries, &[2, 3]);

        let mut ab = batch_from(a.clone());
        ab.merge_records(b.clone());
        let mut ba = batch_from(b);
        ba.merge_records(a);

        prop_assert_eq!(ab.records.len(), ba.records.len());
        for (id, rec) in &ab.records {
            let other = &ba.records[id];
            let left: Vec<_> = rec.metrics.keys().collect();
            let right: Vec<_> = other.metrics.keys().collect();
            prop_assert_eq!(left, right);
            prop_assert_eq!(rec.overall_passed, other.overall_passed);
        }
    }

    #[test]
    fn remerge_never_removes_metrics(entries in prop::collection::vec(entry(), 1..30)) {
        let a = to_records(&entries, &[0]);
        let b = to_records(&entries, &[1, 2]);
        let mut batch = batch_from(a.clone());
        batch.merge_records(b);
        let before: Vec<(String, usize)> = batch
            .records
            .iter()
            .map(|(id, r)| (id.clone(), r.metrics.len()))
            .collect();
        batch.merge_records(a);
        let after: Vec<(String, usize)> = batch
            .records
            .iter()
            .map(|(id, r)| (id.clone(), r.metrics.len()))
            .collect();
        prop_assert_eq!(before, after);
    }
}

// --- Aggregation properties ---

proptest! {
    #[test]
    fn summary_counts_add_up(entries in prop::collection::vec(entry(), 0..40)) {
        let batch = batch_from(to_records(&entries, &[0, 1, 2, 3]));
        let s = &batch.summary;
        prop_assert_eq!(s.passed + s.failed + s.errored, s.total);
        prop_assert_eq!(s.total, batch.records.len());
        for avg in s.per_metric_averages.values() {
            prop_assert!((0.0..=1.0).contains(avg));
        }
    }

    #[test]
    fn summary_ignores_insertion_order(entries in prop::collection::vec(entry(), 0..40)) {
        let forward = batch_from(to_records(&entries, &[0, 1, 2, 3]));
        let mut reversed_records = Vec::new();
        for rec in forward.records.values().rev() {
            reversed_records.push(rec.clone());
        }
        let mut map = std::collections::BTreeMap::new();
        for rec in reversed_records {
            map.insert(rec.scenario_id.clone(), rec);
        }
        prop_assert_eq!(summarize(&map), forward.summary);
    }
}

// --- Persistence properties ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn saved_batch_reloads_without_loss(
        entries in prop::collection::vec(entry(), 1..30),
        threshold in 0.0f64..=1.0,
    ) {
        let mut batch = batch_from(to_records(&entries, &[0, 1, 2, 3]));
        for record in batch.records.values_mut() {
            for metric in record.metrics.values_mut() {
                metric.threshold = threshold;
            }
        }
        batch.refresh_summary();

        let dir = tempfile::TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("results.json"));
        store.save(&batch).unwrap();
        let reloaded = store.load().unwrap();
        prop_assert_eq!(reloaded, batch);
    }
}
