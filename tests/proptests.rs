//! Property-based tests for featurizers and the batch runner.

use std::sync::Arc;

use compdesc::{
    BatchConfig, BatchInput, BatchRunner, CompositionInput, ElementTable, Featurizer, FeaturizerKind, OnErrors,
};
use proptest::prelude::*;

const SYMBOLS: [&str; 12] = ["H", "Li", "C", "O", "Na", "Mg", "Al", "Si", "Cl", "Fe", "Cu", "Ba"];

fn table() -> Arc<ElementTable> {
    ElementTable::load(None).unwrap()
}

// ===== Strategies =====

/// Element/amount pairs drawn from a fixed vocabulary.
fn arb_composition() -> impl Strategy<Value = Vec<(String, f64)>> {
    prop::collection::vec((prop::sample::select(SYMBOLS.to_vec()), 0.1f64..8.0), 1..5)
        .prop_map(|pairs| pairs.into_iter().map(|(s, a)| (s.to_string(), a)).collect())
}

/// A mix of valid compositions and formulas that cannot be featurized.
fn arb_row() -> impl Strategy<Value = CompositionInput> {
    prop_oneof![
        4 => arb_composition().prop_map(CompositionInput::from),
        1 => prop::sample::select(vec!["Xx2", "Fe-O", "((O", ""]).prop_map(CompositionInput::from),
    ]
}

fn arb_kind() -> impl Strategy<Value = FeaturizerKind> {
    prop::sample::select(FeaturizerKind::ALL.to_vec())
}

fn arb_policy() -> impl Strategy<Value = OnErrors> {
    prop::sample::select(vec![OnErrors::Nan, OnErrors::Keep])
}

// ===== Property Tests =====

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_width_depends_only_on_table(kind in arb_kind(), comp in arb_composition()) {
        let table = table();
        let featurizer = kind.build(Arc::clone(&table));
        let vec = featurizer.featurize(&comp.into()).unwrap();
        let expected = match kind {
            FeaturizerKind::Counting => table.len(),
            _ => table.width(),
        };
        prop_assert_eq!(vec.len(), expected);
        prop_assert!(vec.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn prop_featurize_is_idempotent(kind in arb_kind(), comp in arb_composition()) {
        let featurizer = kind.build(table());
        let input: CompositionInput = comp.into();
        prop_assert_eq!(featurizer.featurize(&input).unwrap(), featurizer.featurize(&input).unwrap());
    }

    #[test]
    fn prop_row_count_is_preserved(
        kind in arb_kind(),
        rows in prop::collection::vec(arb_row(), 0..30),
        policy in arb_policy(),
        jobs in 1i32..5,
    ) {
        let featurizer = kind.build(table());
        let n = rows.len();
        let config = BatchConfig::new().with_n_jobs(jobs).with_on_errors(policy);
        let out = BatchRunner::new(config).unwrap().run(featurizer.as_ref(), &BatchInput::Rows(rows)).unwrap();
        prop_assert_eq!(out.nrows(), n);
        prop_assert_eq!(out.ncols(), featurizer.width());
        for record in out.failures() {
            let row_failed = match policy {
                OnErrors::Keep => out.cells().row(record.row).iter().all(|c| c.is_failed()),
                _ => out.cells().row(record.row).iter().all(|c| c.value().is_some_and(f64::is_nan)),
            };
            prop_assert!(row_failed);
        }
    }

    #[test]
    fn prop_output_order_ignores_jobs(
        rows in prop::collection::vec(arb_composition().prop_map(CompositionInput::from), 1..40),
        jobs in 2i32..9,
    ) {
        let featurizer = FeaturizerKind::WeightedVariance.build(table());
        let input = BatchInput::Rows(rows);
        let serial = BatchRunner::new(BatchConfig::new().with_n_jobs(1)).unwrap()
            .run(featurizer.as_ref(), &input).unwrap().to_values().unwrap();
        let parallel = BatchRunner::new(BatchConfig::new().with_n_jobs(jobs)).unwrap()
            .run(featurizer.as_ref(), &input).unwrap().to_values().unwrap();
        prop_assert_eq!(serial, parallel);
    }
}
