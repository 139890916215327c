//! Composition featurizers and the error type shared across the crate.
//!
//! A featurizer aggregates per-element reference data into one fixed-length
//! vector for a composition. All six kinds implement the same [`Featurizer`]
//! capability:
//!
//! | Kind               | Rule                                           | Labels        |
//! |--------------------|------------------------------------------------|---------------|
//! | `Counting`         | amount (or 1) per vocabulary slot              | element symbol|
//! | `WeightedAverage`  | Σ wᵢ·rowᵢ with normalised weights              | `ave:<prop>`  |
//! | `WeightedSum`      | Σ amountᵢ·rowᵢ                                 | `sum:<prop>`  |
//! | `WeightedVariance` | Σ wᵢ·(rowᵢ − mean)² with normalised weights    | `var:<prop>`  |
//! | `MaxPooling`       | column-wise maximum over present elements      | `max:<prop>`  |
//! | `MinPooling`       | column-wise minimum over present elements      | `min:<prop>`  |
//!
//! Kinds are selected through the closed [`FeaturizerKind`] registry.
//!
//! ```
//! use compdesc::descriptors::{Featurizer, FeaturizerKind};
//! use compdesc::elements::ElementTable;
//!
//! let table = ElementTable::load(None).unwrap();
//! let ave = "WeightedAverage".parse::<FeaturizerKind>().unwrap().build(table);
//! let vec = ave.featurize(&"Fe2O3".into()).unwrap();
//! assert_eq!(vec.len(), ave.width());
//! ```
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::composition::{parse, CompositionInput};
use crate::elements::ElementTable;

pub mod counting;
pub mod pooling;
pub mod weighted;

pub use counting::Counting;
pub use pooling::{MaxPooling, MinPooling};
pub use weighted::{WeightedAverage, WeightedSum, WeightedVariance};

/// Errors returned by parsing, featurization, batch execution and the model adapters.
///
/// Row-scoped failures (`ParseError`, `UnknownElement`, `NegativeAmount`,
/// `ComputationError`) are routed through the batch error policy. Schema and
/// configuration errors are raised at construction time and always propagate.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// The composition could not be read as element/amount pairs.
    #[error("unsupported or invalid composition: {0}")]
    ParseError(String),

    /// An element symbol that is not part of the active element table.
    #[error("unknown element: {0}")]
    UnknownElement(String),

    /// A composition carried a negative (or non-finite) amount.
    #[error("invalid amount {amount} for element {element}")]
    NegativeAmount {
        /// Element the amount belongs to.
        element: String,
        /// The offending amount.
        amount: f64,
    },

    /// A caller-supplied element table failed validation.
    #[error("invalid element table: {0}")]
    SchemaError(String),

    /// An aggregation rule hit an undefined numeric operation.
    #[error("computation failed: {0}")]
    ComputationError(String),

    /// A runner, descriptor or timer was configured or used incorrectly.
    #[error("invalid configuration: {0}")]
    ConfigError(String),

    /// The predictor adapter could not fit or predict.
    #[error("prediction failed: {0}")]
    PredictError(String),

    /// A row failed under the `raise` policy; `source` is the original failure.
    #[error("row {} failed in {featurizer}: {source}", describe_row(.row, .label))]
    RowFailed {
        /// Zero-based row position in the input.
        row: usize,
        /// Row label when the input was a labelled table.
        label: Option<String>,
        /// Name of the featurizer that failed.
        featurizer: String,
        /// The failure itself.
        source: Box<DescriptorError>,
    },

    /// CSV reading or writing failed.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// Filesystem access failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn describe_row(row: &usize, label: &Option<String>) -> String {
    match label {
        Some(label) => format!("{row} ({label})"),
        None => row.to_string(),
    }
}

/// Coarse classification of a [`DescriptorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Input could not be interpreted (including unknown symbols and negative amounts).
    Parse,
    /// Element table validation.
    Schema,
    /// Undefined numeric operation.
    Computation,
    /// Invalid configuration.
    Config,
    /// Predictor adapter failure.
    Predict,
    /// CSV or filesystem failure.
    Io,
}

impl DescriptorError {
    /// Kind of the underlying failure; looks through [`DescriptorError::RowFailed`].
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Self::ParseError(_) | Self::UnknownElement(_) | Self::NegativeAmount { .. } => {
                ErrorKind::Parse
            }
            Self::SchemaError(_) => ErrorKind::Schema,
            Self::ComputationError(_) => ErrorKind::Computation,
            Self::ConfigError(_) => ErrorKind::Config,
            Self::PredictError(_) => ErrorKind::Predict,
            Self::Csv(_) | Self::Io(_) => ErrorKind::Io,
            Self::RowFailed { source, .. } => source.kind(),
        }
    }

    /// The original failure with any row context stripped.
    pub fn root(&self) -> &DescriptorError {
        match self {
            Self::RowFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Row position when this error was attached to a row.
    pub fn row(&self) -> Option<usize> {
        match self {
            Self::RowFailed { row, .. } => Some(*row),
            _ => None,
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DescriptorError>;

/// The featurizer capability: one composition in, one fixed-length vector out.
///
/// Implementations must be pure: the same input always yields the same vector
/// and no state is mutated, which is what lets [`crate::batch::BatchRunner`]
/// call them from many threads at once.
pub trait Featurizer: Send + Sync {
    /// Stable name used in error records and logs.
    fn name(&self) -> &'static str;

    /// Column names, one per output slot.
    fn feature_labels(&self) -> Vec<String>;

    /// Output vector length; constant for the lifetime of the featurizer.
    fn width(&self) -> usize;

    /// Element table the featurizer reads from.
    fn elements(&self) -> &ElementTable;

    /// Aggregate one composition given as index-aligned symbols and amounts.
    fn mix_function(&self, elements: &[String], amounts: &[f64]) -> Result<Vec<f64>>;

    /// Parse `input`, check it against the element table and aggregate it.
    ///
    /// # Errors
    ///
    /// Parse-kind errors for unreadable input or symbols missing from the
    /// table; `ComputationError` when the aggregate is not finite.
    fn featurize(&self, input: &CompositionInput) -> Result<Vec<f64>> {
        let composition = parse(input)?;
        let table = self.elements();
        if let Some(unknown) = composition.elements().iter().find(|e| !table.contains(e)) {
            return Err(DescriptorError::UnknownElement(unknown.clone()));
        }

        let vec = self.mix_function(composition.elements(), composition.amounts())?;
        if let Some(pos) = vec.iter().position(|v| !v.is_finite()) {
            return Err(DescriptorError::ComputationError(format!(
                "{} produced a non-finite value for {}",
                self.name(),
                self.feature_labels()[pos]
            )));
        }
        Ok(vec)
    }
}

/// Closed registry of the available featurizer kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeaturizerKind {
    /// [`Counting`]
    Counting,
    /// [`WeightedAverage`]
    WeightedAverage,
    /// [`WeightedSum`]
    WeightedSum,
    /// [`WeightedVariance`]
    WeightedVariance,
    /// [`MaxPooling`]
    MaxPooling,
    /// [`MinPooling`]
    MinPooling,
}

impl FeaturizerKind {
    /// Every kind, in registry order.
    pub const ALL: [FeaturizerKind; 6] = [
        Self::Counting,
        Self::WeightedAverage,
        Self::WeightedSum,
        Self::WeightedVariance,
        Self::MaxPooling,
        Self::MinPooling,
    ];

    /// The five table-based kinds used by default in [`crate::Compositions`].
    pub const CLASSIC: [FeaturizerKind; 5] = [
        Self::WeightedAverage,
        Self::WeightedSum,
        Self::WeightedVariance,
        Self::MaxPooling,
        Self::MinPooling,
    ];

    /// Canonical name of the kind.
    pub fn name(self) -> &'static str {
        match self {
            Self::Counting => "Counting",
            Self::WeightedAverage => "WeightedAverage",
            Self::WeightedSum => "WeightedSum",
            Self::WeightedVariance => "WeightedVariance",
            Self::MaxPooling => "MaxPooling",
            Self::MinPooling => "MinPooling",
        }
    }

    /// Build a featurizer of this kind over `elements`.
    pub fn build(self, elements: Arc<ElementTable>) -> Box<dyn Featurizer> {
        self.build_with(elements, false)
    }

    /// Like [`FeaturizerKind::build`]; `one_hot` only affects `Counting`.
    pub fn build_with(self, elements: Arc<ElementTable>, one_hot: bool) -> Box<dyn Featurizer> {
        match self {
            Self::Counting => Box::new(Counting::new(elements).with_one_hot(one_hot)),
            Self::WeightedAverage => Box::new(WeightedAverage::new(elements)),
            Self::WeightedSum => Box::new(WeightedSum::new(elements)),
            Self::WeightedVariance => Box::new(WeightedVariance::new(elements)),
            Self::MaxPooling => Box::new(MaxPooling::new(elements)),
            Self::MinPooling => Box::new(MinPooling::new(elements)),
        }
    }
}

impl fmt::Display for FeaturizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FeaturizerKind {
    type Err = DescriptorError;

    /// Accepts the canonical name in any case, with or without `_`/`-` separators
    /// (`"WeightedAverage"`, `"weighted_average"`, `"max-pooling"`).
    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        FeaturizerKind::ALL
            .into_iter()
            .find(|kind| kind.name().to_lowercase() == key)
            .ok_or_else(|| DescriptorError::ConfigError(format!("unknown featurizer: {s}")))
    }
}

/// Look up the table row of every element, failing on the first unknown symbol.
pub(crate) fn gather_rows<'a>(table: &'a ElementTable, elements: &[String]) -> Result<Vec<&'a [f64]>> {
    elements
        .iter()
        .map(|e| table.row(e).ok_or_else(|| DescriptorError::UnknownElement(e.clone())))
        .collect()
}

/// Check that `elements` and `amounts` line up and are not empty.
pub(crate) fn check_aligned(elements: &[String], amounts: &[f64]) -> Result<()> {
    if elements.len() != amounts.len() {
        return Err(DescriptorError::ParseError(format!(
            "{} elements but {} amounts",
            elements.len(),
            amounts.len()
        )));
    }
    if elements.is_empty() {
        return Err(DescriptorError::ParseError("empty composition".to_string()));
    }
    Ok(())
}

/// Prefix every property column of `table` with `tag`.
pub(crate) fn tagged_labels(table: &ElementTable, tag: &str) -> Vec<String> {
    table.columns().iter().map(|c| format!("{tag}:{c}")).collect()
}
