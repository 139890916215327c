//! Batch outputs: plain matrices and labelled frames of [`Cell`]s.
//!
//! A cell is either a number or, under the `keep` error policy, the captured
//! failure of its row. Rows that failed under the `nan` policy hold NaN values
//! and are still listed in [`Descriptor::failures`].
use std::fmt;
use std::sync::Arc;

use ndarray::{concatenate, Array2, ArrayView1, Axis};

use crate::descriptors::{DescriptorError, Result};

/// A failed (row, featurizer) pair.
#[derive(Debug)]
pub struct ErrorRecord {
    /// Zero-based row position.
    pub row: usize,
    /// Row label when the input was a labelled table.
    pub label: Option<String>,
    /// Featurizer that failed.
    pub featurizer: String,
    /// The captured failure.
    pub error: DescriptorError,
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}", self.row)?;
        if let Some(label) = &self.label {
            write!(f, " ({label})")?;
        }
        write!(f, " in {}: {}", self.featurizer, self.error)
    }
}

/// One matrix entry.
#[derive(Debug, Clone)]
pub enum Cell {
    /// A computed (or NaN-filled) value.
    Value(f64),
    /// The failure kept for this row.
    Failed(Arc<ErrorRecord>),
}

impl Cell {
    /// Numeric value, if any.
    pub fn value(&self) -> Option<f64> {
        match self {
            Cell::Value(v) => Some(*v),
            Cell::Failed(_) => None,
        }
    }

    /// Captured failure, if any.
    pub fn error(&self) -> Option<&ErrorRecord> {
        match self {
            Cell::Value(_) => None,
            Cell::Failed(record) => Some(record),
        }
    }

    /// Whether the cell holds a failure.
    pub fn is_failed(&self) -> bool {
        matches!(self, Cell::Failed(_))
    }
}

impl Default for Cell {
    fn default() -> Self {
        Cell::Value(f64::NAN)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Value(v) => write!(f, "{v}"),
            Cell::Failed(record) => write!(f, "{}", record.error),
        }
    }
}

/// Convert cells to numbers; a kept failure is an error naming its row.
fn cells_to_values(cells: &Array2<Cell>) -> Result<Array2<f64>> {
    let mut out = Array2::from_elem(cells.dim(), f64::NAN);
    for ((r, c), cell) in cells.indexed_iter() {
        match cell {
            Cell::Value(v) => out[[r, c]] = *v,
            Cell::Failed(record) => {
                return Err(DescriptorError::ComputationError(format!(
                    "cannot convert kept failure to a number: {record}"
                )))
            }
        }
    }
    Ok(out)
}

/// Labelled output: row index, column labels and cells.
#[derive(Debug, Clone)]
pub struct DescriptorFrame {
    index: Vec<String>,
    labels: Vec<String>,
    cells: Array2<Cell>,
    failures: Vec<Arc<ErrorRecord>>,
}

impl DescriptorFrame {
    /// Assemble a frame.
    ///
    /// # Errors
    ///
    /// `ComputationError` when index or labels do not match the cell shape.
    pub fn new(
        index: Vec<String>,
        labels: Vec<String>,
        cells: Array2<Cell>,
        failures: Vec<Arc<ErrorRecord>>,
    ) -> Result<Self> {
        if cells.nrows() != index.len() || cells.ncols() != labels.len() {
            return Err(DescriptorError::ComputationError(format!(
                "frame shape {:?} does not match {} index labels and {} columns",
                cells.dim(),
                index.len(),
                labels.len()
            )));
        }
        Ok(Self { index, labels, cells, failures })
    }

    /// Row labels.
    pub fn index(&self) -> &[String] {
        &self.index
    }

    /// Column labels.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// All cells.
    pub fn cells(&self) -> &Array2<Cell> {
        &self.cells
    }

    /// Every failed (row, featurizer) pair, in row order per featurizer.
    pub fn failures(&self) -> &[Arc<ErrorRecord>] {
        &self.failures
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.cells.nrows()
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.cells.ncols()
    }

    /// Cells of the column labelled `label` (first match).
    pub fn column(&self, label: &str) -> Option<ArrayView1<'_, Cell>> {
        let pos = self.labels.iter().position(|l| l == label)?;
        Some(self.cells.column(pos))
    }

    /// Cells of the row labelled `label` (first match).
    pub fn row(&self, label: &str) -> Option<ArrayView1<'_, Cell>> {
        let pos = self.index.iter().position(|l| l == label)?;
        Some(self.cells.row(pos))
    }

    /// Numeric matrix; fails if any cell holds a kept failure.
    pub fn to_values(&self) -> Result<Array2<f64>> {
        cells_to_values(&self.cells)
    }

    /// Join frames side by side, keeping the first frame's index.
    ///
    /// # Errors
    ///
    /// `ConfigError` for an empty list, `ComputationError` for differing row counts.
    pub fn hstack(frames: Vec<DescriptorFrame>) -> Result<DescriptorFrame> {
        let mut frames = frames.into_iter();
        let first = frames
            .next()
            .ok_or_else(|| DescriptorError::ConfigError("nothing to concatenate".to_string()))?;

        let mut labels = first.labels;
        let mut failures = first.failures;
        let mut cells = first.cells;
        for frame in frames {
            if frame.cells.nrows() != cells.nrows() {
                return Err(DescriptorError::ComputationError(format!(
                    "cannot concatenate {} rows with {} rows",
                    cells.nrows(),
                    frame.cells.nrows()
                )));
            }
            cells = concatenate(Axis(1), &[cells.view(), frame.cells.view()])
                .map_err(|e| DescriptorError::ComputationError(e.to_string()))?;
            labels.extend(frame.labels);
            failures.extend(frame.failures);
        }
        Ok(DescriptorFrame { index: first.index, labels, cells, failures })
    }
}

/// Output of a batch run.
#[derive(Debug, Clone)]
pub enum Descriptor {
    /// Plain matrix.
    Array {
        /// Cells, one row per input row.
        cells: Array2<Cell>,
        /// Failed rows.
        failures: Vec<Arc<ErrorRecord>>,
    },
    /// Labelled frame.
    Frame(DescriptorFrame),
}

impl Descriptor {
    /// All cells.
    pub fn cells(&self) -> &Array2<Cell> {
        match self {
            Descriptor::Array { cells, .. } => cells,
            Descriptor::Frame(frame) => frame.cells(),
        }
    }

    /// Failed rows.
    pub fn failures(&self) -> &[Arc<ErrorRecord>] {
        match self {
            Descriptor::Array { failures, .. } => failures,
            Descriptor::Frame(frame) => frame.failures(),
        }
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.cells().nrows()
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.cells().ncols()
    }

    /// Whether this is a labelled frame.
    pub fn is_frame(&self) -> bool {
        matches!(self, Descriptor::Frame(_))
    }

    /// The frame, if this is one.
    pub fn as_frame(&self) -> Option<&DescriptorFrame> {
        match self {
            Descriptor::Frame(frame) => Some(frame),
            Descriptor::Array { .. } => None,
        }
    }

    /// Numeric matrix; fails if any cell holds a kept failure.
    pub fn to_values(&self) -> Result<Array2<f64>> {
        cells_to_values(self.cells())
    }

    /// Convert into a frame, labelling an array with `labels` and rows `0..n`.
    pub fn into_frame(self, labels: Vec<String>) -> Result<DescriptorFrame> {
        match self {
            Descriptor::Frame(frame) => Ok(frame),
            Descriptor::Array { cells, failures } => {
                let index = (0..cells.nrows()).map(|i| i.to_string()).collect();
                DescriptorFrame::new(index, labels, cells, failures)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::ErrorKind;

    fn frame(prefix: &str, rows: usize, cols: usize) -> DescriptorFrame {
        let cells = Array2::from_shape_fn((rows, cols), |(r, c)| Cell::Value((r * 10 + c) as f64));
        DescriptorFrame::new(
            (0..rows).map(|i| format!("r{i}")).collect(),
            (0..cols).map(|i| format!("{prefix}:{i}")).collect(),
            cells,
            Vec::new(),
        )
        .unwrap()
    }

    fn kept(row: usize) -> Cell {
        Cell::Failed(Arc::new(ErrorRecord {
            row,
            label: None,
            featurizer: "WeightedAverage".to_string(),
            error: DescriptorError::UnknownElement("Xx".to_string()),
        }))
    }

    #[test]
    fn hstack_preserves_order() {
        let joined = DescriptorFrame::hstack(vec![frame("ave", 3, 2), frame("max", 3, 4)]).unwrap();
        assert_eq!(joined.ncols(), 6);
        assert_eq!(joined.labels()[..2], ["ave:0".to_string(), "ave:1".to_string()]);
        assert_eq!(joined.labels()[2], "max:0");
        assert_eq!(joined.index(), frame("x", 3, 1).index());
        assert_eq!(joined.column("max:3").unwrap()[2].value(), Some(23.0));
    }

    #[test]
    fn hstack_checks_rows() {
        let err = DescriptorFrame::hstack(vec![frame("a", 2, 1), frame("b", 3, 1)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Computation);
        assert_eq!(DescriptorFrame::hstack(Vec::new()).unwrap_err().kind(), ErrorKind::Config);
    }

    #[test]
    fn kept_failures_block_numeric_conversion() {
        let mut cells = Array2::from_elem((2, 2), Cell::Value(1.0));
        cells[[1, 0]] = kept(1);
        cells[[1, 1]] = kept(1);
        let desc = Descriptor::Array { cells, failures: Vec::new() };
        let err = desc.to_values().unwrap_err();
        assert!(err.to_string().contains("row 1"), "{err}");
        assert!(desc.cells()[[1, 0]].is_failed());
        assert_eq!(desc.cells()[[1, 0]].error().unwrap().featurizer, "WeightedAverage");
    }

    #[test]
    fn array_converts_into_frame() {
        let cells = Array2::from_elem((2, 1), Cell::Value(0.5));
        let desc = Descriptor::Array { cells, failures: Vec::new() };
        let frame = desc.into_frame(vec!["ave:x".to_string()]).unwrap();
        assert_eq!(frame.index(), &["0".to_string(), "1".to_string()]);
        assert_eq!(frame.row("1").unwrap()[0].value(), Some(0.5));
        assert_eq!(frame.to_values().unwrap()[[1, 0]], 0.5);
    }

    #[test]
    fn frame_shape_is_checked() {
        let cells = Array2::from_elem((2, 1), Cell::default());
        let err = DescriptorFrame::new(vec!["a".into()], vec!["x".into()], cells, Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Computation);
    }
}
