//! Parallel batch featurization with per-row error isolation.
//!
//! [`BatchRunner::run`] applies one featurizer to every row of a
//! [`BatchInput`]. Rows are split into contiguous chunks, one per worker, and
//! every result is written into a slot reserved for its row index, so the
//! output order is the input order whatever the worker count.
//!
//! Failing rows are handled by the configured [`OnErrors`] policy:
//!
//! - `raise`: the failing row with the lowest index aborts the batch; workers
//!   skip every row after the earliest failure seen so far.
//! - `nan`: the row is filled with NaN and listed in the failures.
//! - `keep`: the row's cells hold the captured failure.
//!
//! ```
//! use compdesc::batch::BatchRunner;
//! use compdesc::config::{BatchConfig, OnErrors};
//! use compdesc::descriptors::{Featurizer, WeightedAverage};
//! use compdesc::elements::ElementTable;
//!
//! let ave = WeightedAverage::new(ElementTable::load(None).unwrap());
//! let runner = BatchRunner::new(BatchConfig::new().with_n_jobs(2).with_on_errors(OnErrors::Nan)).unwrap();
//! let out = runner.run(&ave, &vec!["Fe2O3", "Xx2", "NaCl"].into()).unwrap();
//!
//! assert_eq!(out.nrows(), 3);
//! assert_eq!(out.ncols(), ave.width());
//! assert!(out.to_values().unwrap().row(1).iter().all(|v| v.is_nan()));
//! assert_eq!(out.failures()[0].row, 1);
//! ```
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use log::{debug, trace, warn};
use ndarray::Array2;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::composition::{CompositionInput, CompositionTable};
use crate::config::{BatchConfig, InputShape, OnErrors, OutputShape};
use crate::descriptors::{DescriptorError, Featurizer, Result};
use crate::frame::{Cell, Descriptor, DescriptorFrame, ErrorRecord};
use crate::timing::Timer;

/// Rows to featurize.
#[derive(Debug, Clone)]
pub enum BatchInput {
    /// A plain sequence of compositions.
    Rows(Vec<CompositionInput>),
    /// A labelled table with one or more composition columns.
    Table(CompositionTable),
}

impl BatchInput {
    /// Shape used to resolve `ReturnType::Any`.
    pub fn shape(&self) -> InputShape {
        match self {
            BatchInput::Rows(_) => InputShape::Rows,
            BatchInput::Table(_) => InputShape::Table,
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        match self {
            BatchInput::Rows(rows) => rows.len(),
            BatchInput::Table(table) => table.nrows(),
        }
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Into<CompositionInput>> From<Vec<T>> for BatchInput {
    fn from(rows: Vec<T>) -> Self {
        BatchInput::Rows(rows.into_iter().map(Into::into).collect())
    }
}

impl From<CompositionTable> for BatchInput {
    fn from(table: CompositionTable) -> Self {
        BatchInput::Table(table)
    }
}

/// Featurized cells of one column plus its failures.
struct Block {
    cells: Array2<Cell>,
    failures: Vec<Arc<ErrorRecord>>,
}

type Slot = Option<Result<Vec<f64>>>;

/// Runs a featurizer over a batch according to a [`BatchConfig`].
///
/// The worker pool is started on the first parallel run and reused by every
/// later run of the same runner, including clones made after that run.
#[derive(Debug, Clone, Default)]
pub struct BatchRunner {
    config: BatchConfig,
    pool: OnceLock<Arc<ThreadPool>>,
}

impl BatchRunner {
    /// Create a runner.
    ///
    /// # Errors
    ///
    /// `ConfigError` for invalid settings such as `n_jobs == 0`.
    pub fn new(config: BatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, pool: OnceLock::new() })
    }

    /// Active configuration.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Featurize every row of `inputs`.
    ///
    /// The output always has one row per input row. Table inputs are
    /// featurized column by column (or only `target_column`), and the blocks
    /// are joined left to right.
    ///
    /// # Errors
    ///
    /// Under `raise`, a [`DescriptorError::RowFailed`] wrapping the first
    /// failing row's error. `ConfigError` for an unknown `target_column`, a
    /// table without composition columns, or a worker pool that cannot be
    /// built.
    pub fn run<F: Featurizer + ?Sized>(&self, featurizer: &F, inputs: &BatchInput) -> Result<Descriptor> {
        let shape = self.config.return_type.resolve(inputs.shape());
        let jobs = self.config.resolve_jobs()?;
        let mut timer = Timer::new();
        timer.start("main")?;

        let labels = featurizer.feature_labels();
        let (index, labels, block) = match inputs {
            BatchInput::Rows(rows) => {
                let block = timer.time("featurize", || self.featurize_column(featurizer, rows, None, jobs))?;
                let index = (0..rows.len()).map(|i| i.to_string()).collect::<Vec<_>>();
                (index, labels, block)
            }
            BatchInput::Table(table) => {
                let columns: Vec<(&str, &[CompositionInput])> = match &self.config.target_column {
                    Some(target) => {
                        let values = table.column(target).ok_or_else(|| {
                            DescriptorError::ConfigError(format!("no column named {target} in input table"))
                        })?;
                        vec![(target.as_str(), values)]
                    }
                    None => table.columns().collect(),
                };
                if columns.is_empty() {
                    return Err(DescriptorError::ConfigError(
                        "input table has no composition columns".to_string(),
                    ));
                }

                let mut blocks = Vec::with_capacity(columns.len());
                for (name, values) in &columns {
                    trace!("{}: featurizing column {name}", featurizer.name());
                    let block = timer.time("featurize", || {
                        self.featurize_column(featurizer, values, Some(table.index()), jobs)
                    })?;
                    blocks.push(block);
                }
                let all_labels: Vec<String> =
                    labels.iter().cloned().cycle().take(labels.len() * blocks.len()).collect();
                (table.index().to_vec(), all_labels, join_blocks(blocks, table.nrows(), labels.len()))
            }
        };

        timer.stop("main")?;
        debug!(
            "{} featurized {} rows x {} columns with {} job(s); {timer}",
            featurizer.name(),
            block.cells.nrows(),
            block.cells.ncols(),
            jobs
        );
        if !block.failures.is_empty() {
            warn!(
                "{}: {} of {} rows failed (on_errors = {})",
                featurizer.name(),
                block.failures.len(),
                inputs.len(),
                self.config.on_errors
            );
        }

        Ok(match shape {
            OutputShape::Array => Descriptor::Array { cells: block.cells, failures: block.failures },
            OutputShape::Frame => {
                Descriptor::Frame(DescriptorFrame::new(index, labels, block.cells, block.failures)?)
            }
        })
    }

    /// Pool of `jobs` workers, started on first use.
    fn pool(&self, jobs: usize) -> Result<&ThreadPool> {
        if let Some(pool) = self.pool.get() {
            return Ok(pool.as_ref());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .map_err(|e| DescriptorError::ConfigError(format!("cannot start {jobs} workers: {e}")))?;
        debug!("started worker pool with {jobs} thread(s)");
        Ok(self.pool.get_or_init(|| Arc::new(pool)).as_ref())
    }

    /// Featurize one column of rows into a block of `rows x width` cells.
    fn featurize_column<F: Featurizer + ?Sized>(
        &self,
        featurizer: &F,
        rows: &[CompositionInput],
        index: Option<&[String]>,
        jobs: usize,
    ) -> Result<Block> {
        let n = rows.len();
        let width = featurizer.width();
        let raise = self.config.on_errors == OnErrors::Raise;

        let mut slots: Vec<Slot> = (0..n).map(|_| None).collect();
        let first_failure = AtomicUsize::new(usize::MAX);

        let work = |offset: usize, chunk: &mut [Slot]| {
            for (k, slot) in chunk.iter_mut().enumerate() {
                let row = offset + k;
                if raise && row > first_failure.load(Ordering::Relaxed) {
                    break;
                }
                let result = featurizer.featurize(&rows[row]);
                let failed = result.is_err();
                *slot = Some(result);
                if raise && failed {
                    first_failure.fetch_min(row, Ordering::Relaxed);
                    break;
                }
            }
        };

        let workers = jobs.min(n).max(1);
        if workers == 1 {
            work(0, &mut slots);
        } else {
            let chunk_size = n.div_ceil(workers);
            let mut dispatch = || {
                slots
                    .par_chunks_mut(chunk_size)
                    .enumerate()
                    .for_each(|(i, chunk)| work(i * chunk_size, chunk));
            };
            if rayon::current_thread_index().is_some() {
                // already on a rayon worker: reuse its pool instead of nesting a new one
                dispatch();
            } else {
                self.pool(jobs)?.install(dispatch);
            }
        }

        let label_of = |row: usize| index.and_then(|idx| idx.get(row).cloned());

        if raise {
            let row = first_failure.into_inner();
            if row != usize::MAX {
                if let Some(Some(Err(error))) = slots.get_mut(row).map(Option::take) {
                    return Err(DescriptorError::RowFailed {
                        row,
                        label: label_of(row),
                        featurizer: featurizer.name().to_string(),
                        source: Box::new(error),
                    });
                }
            }
        }

        let mut cells = Array2::from_elem((n, width), Cell::Value(0.0));
        let mut failures = Vec::new();
        for (row, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(Ok(vec)) => {
                    if vec.len() != width {
                        return Err(DescriptorError::ComputationError(format!(
                            "{} returned {} values for row {row}, expected {width}",
                            featurizer.name(),
                            vec.len()
                        )));
                    }
                    for (cell, value) in cells.row_mut(row).iter_mut().zip(vec) {
                        *cell = Cell::Value(value);
                    }
                }
                Some(Err(error)) => {
                    let record = Arc::new(ErrorRecord {
                        row,
                        label: label_of(row),
                        featurizer: featurizer.name().to_string(),
                        error,
                    });
                    let fill = match self.config.on_errors {
                        OnErrors::Keep => Cell::Failed(Arc::clone(&record)),
                        _ => Cell::Value(f64::NAN),
                    };
                    cells.row_mut(row).fill(fill);
                    failures.push(record);
                }
                None => {
                    return Err(DescriptorError::ComputationError(format!(
                        "row {row} was never evaluated"
                    )))
                }
            }
        }

        Ok(Block { cells, failures })
    }
}

/// Join column blocks side by side.
fn join_blocks(blocks: Vec<Block>, nrows: usize, width: usize) -> Block {
    let mut cells = Array2::from_elem((nrows, width * blocks.len()), Cell::Value(0.0));
    let mut failures = Vec::new();
    for (i, block) in blocks.into_iter().enumerate() {
        cells
            .slice_mut(ndarray::s![.., i * width..(i + 1) * width])
            .assign(&block.cells);
        failures.extend(block.failures);
    }
    Block { cells, failures }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReturnType;
    use crate::descriptors::{Counting, ErrorKind, WeightedAverage, WeightedSum, WeightedVariance};
    use crate::elements::ElementTable;

    fn runner(n_jobs: i32, on_errors: OnErrors) -> BatchRunner {
        BatchRunner::new(BatchConfig::new().with_n_jobs(n_jobs).with_on_errors(on_errors)).unwrap()
    }

    fn rows(n: usize) -> BatchInput {
        let formulas = ["Fe2O3", "NaCl", "LiCoO2", "CaTiO3", "SiO2", "Al2O3", "MgO"];
        (0..n).map(|i| formulas[i % formulas.len()]).collect::<Vec<_>>().into()
    }

    #[test]
    fn row_order_is_independent_of_jobs() {
        let ave = WeightedAverage::new(ElementTable::load(None).unwrap());
        let input = rows(50);
        let serial = runner(1, OnErrors::Raise).run(&ave, &input).unwrap().to_values().unwrap();
        for jobs in [2, 3, 8, -1] {
            let parallel = runner(jobs, OnErrors::Raise).run(&ave, &input).unwrap().to_values().unwrap();
            assert_eq!(serial, parallel, "n_jobs = {jobs}");
        }
    }

    #[test]
    fn raise_reports_lowest_failing_row() {
        let ave = WeightedAverage::new(ElementTable::load(None).unwrap());
        let mut input: Vec<CompositionInput> = (0..40).map(|_| "NaCl".into()).collect();
        input[7] = "Xx".into();
        input[31] = "Qq2".into();
        let input = BatchInput::Rows(input);
        for jobs in [1, 4] {
            let err = runner(jobs, OnErrors::Raise).run(&ave, &input).unwrap_err();
            assert_eq!(err.row(), Some(7), "n_jobs = {jobs}");
            assert_eq!(err.kind(), ErrorKind::Parse);
        }
    }

    #[test]
    fn zero_weights_follow_each_policy() {
        let var = WeightedVariance::new(ElementTable::load(None).unwrap());
        let input: BatchInput = vec![vec![("Fe", 0.0), ("O", 0.0)]].into();

        let err = runner(1, OnErrors::Raise).run(&var, &input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Computation);

        let nan = runner(1, OnErrors::Nan).run(&var, &input).unwrap();
        assert_eq!(nan.ncols(), var.width());
        assert!(nan.to_values().unwrap().iter().all(|v| v.is_nan()));
        assert_eq!(nan.failures().len(), 1);

        let keep = runner(1, OnErrors::Keep).run(&var, &input).unwrap();
        assert_eq!(keep.ncols(), var.width());
        let cell = &keep.cells()[[0, 0]];
        assert_eq!(cell.error().map(|r| r.error.kind()), Some(ErrorKind::Computation));
    }

    #[test]
    fn overflow_becomes_a_nan_row() {
        let sum = WeightedSum::new(ElementTable::load(None).unwrap());
        let input: BatchInput = vec![vec![("Fe", 2.0)], vec![("Fe", 1e308)], vec![("O", 1.0)]].into();

        let err = runner(2, OnErrors::Raise).run(&sum, &input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Computation);
        assert_eq!(err.row(), Some(1));

        let out = runner(2, OnErrors::Nan).run(&sum, &input).unwrap();
        let values = out.to_values().unwrap();
        assert!(values.row(1).iter().all(|v| v.is_nan()));
        assert!(values.row(0).iter().chain(values.row(2).iter()).all(|v| v.is_finite()));
        assert_eq!(out.failures().len(), 1);
        assert_eq!(out.failures()[0].row, 1);
        assert_eq!(out.failures()[0].error.kind(), ErrorKind::Computation);
    }

    #[test]
    fn table_input_featurizes_every_column() {
        let counting = Counting::new(ElementTable::load(None).unwrap());
        let table = CompositionTable::new(vec!["a".into(), "b".into()])
            .with_column("host", vec!["Fe2O3".into(), "NaCl".into()])
            .unwrap()
            .with_column("dopant", vec!["Cu".into(), "Zn".into()])
            .unwrap();
        let input = BatchInput::Table(table);

        let both = runner(1, OnErrors::Raise).run(&counting, &input).unwrap();
        assert!(both.is_frame());
        assert_eq!(both.ncols(), 2 * counting.width());
        assert_eq!(both.as_frame().unwrap().index(), &["a".to_string(), "b".to_string()]);

        let config = BatchConfig::new().with_n_jobs(1).with_target_column("dopant");
        let one = BatchRunner::new(config).unwrap().run(&counting, &input).unwrap();
        assert_eq!(one.ncols(), counting.width());

        let config = BatchConfig::new().with_target_column("missing");
        let err = BatchRunner::new(config).unwrap().run(&counting, &input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn table_without_columns_is_rejected() {
        let ave = WeightedAverage::new(ElementTable::load(None).unwrap());
        let table = CompositionTable::new(vec!["a".into(), "b".into()]);
        let err = runner(1, OnErrors::Nan).run(&ave, &table.into()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn worker_pool_is_reused_across_runs() {
        let ave = WeightedAverage::new(ElementTable::load(None).unwrap());
        let r = runner(3, OnErrors::Raise);
        assert!(r.pool.get().is_none());

        r.run(&ave, &rows(12)).unwrap();
        let first = Arc::clone(r.pool.get().unwrap());
        assert_eq!(first.current_num_threads(), 3);

        r.run(&ave, &rows(30)).unwrap();
        r.clone().run(&ave, &rows(5)).unwrap();
        assert!(Arc::ptr_eq(&first, r.pool.get().unwrap()));
    }

    #[test]
    fn return_type_overrides_input_shape() {
        let ave = WeightedAverage::new(ElementTable::load(None).unwrap());
        let config = BatchConfig::new().with_n_jobs(1).with_return_type(ReturnType::Df);
        let out = BatchRunner::new(config).unwrap().run(&ave, &rows(3)).unwrap();
        let frame = out.as_frame().unwrap();
        assert_eq!(frame.index(), &["0".to_string(), "1".to_string(), "2".to_string()]);
        assert_eq!(frame.labels(), ave.feature_labels().as_slice());

        let table = CompositionTable::from_rows("formula", vec!["Fe2O3".into()]);
        let config = BatchConfig::new().with_n_jobs(1).with_return_type(ReturnType::Array);
        let out = BatchRunner::new(config).unwrap().run(&ave, &table.into()).unwrap();
        assert!(!out.is_frame());
    }

    #[test]
    fn empty_input_keeps_width() {
        let ave = WeightedAverage::new(ElementTable::load(None).unwrap());
        let out = runner(4, OnErrors::Raise).run(&ave, &rows(0)).unwrap();
        assert_eq!(out.nrows(), 0);
        assert_eq!(out.ncols(), ave.width());
    }

    #[test]
    fn nested_runs_reuse_the_outer_pool() {
        let ave = WeightedAverage::new(ElementTable::load(None).unwrap());
        let input = rows(20);
        let expected = runner(1, OnErrors::Raise).run(&ave, &input).unwrap().to_values().unwrap();
        let outer = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let nested = outer.install(|| {
            let r = runner(-1, OnErrors::Raise);
            r.run(&ave, &input).unwrap().to_values().unwrap()
        });
        assert_eq!(nested, expected);
    }
}
