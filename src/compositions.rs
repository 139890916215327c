//! Composite composition descriptor: several featurizers side by side.
//!
//! ```
//! use compdesc::Compositions;
//!
//! let desc = Compositions::builder()
//!     .featurizers(&["WeightedAverage", "MaxPooling"])
//!     .n_jobs(1)
//!     .build()
//!     .unwrap();
//! let frame = desc.transform(vec!["Fe2O3", "NaCl"]).unwrap();
//!
//! assert_eq!(frame.nrows(), 2);
//! assert_eq!(frame.ncols(), desc.width());
//! assert!(frame.labels()[0].starts_with("ave:"));
//! assert!(frame.labels().last().unwrap().starts_with("max:"));
//! ```
use std::sync::Arc;

use log::debug;

use crate::batch::{BatchInput, BatchRunner};
use crate::config::{BatchConfig, OnErrors, ReturnType};
use crate::descriptors::{DescriptorError, Featurizer, FeaturizerKind, Result};
use crate::elements::{default_table, ElementTable};
use crate::frame::DescriptorFrame;
use crate::timing::Timer;

/// A fixed list of featurizers whose outputs are concatenated column-wise,
/// in configuration order.
pub struct Compositions {
    elements: Arc<ElementTable>,
    featurizers: Vec<Box<dyn Featurizer>>,
    runner: BatchRunner,
}

impl std::fmt::Debug for Compositions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositions")
            .field("featurizers", &self.featurizer_names())
            .field("elements", &self.elements.len())
            .field("config", self.runner.config())
            .finish()
    }
}

/// Builder for [`Compositions`].
#[derive(Debug, Clone)]
pub struct CompositionsBuilder {
    elements: Option<Arc<ElementTable>>,
    names: Option<Vec<String>>,
    kinds: Vec<FeaturizerKind>,
    n_jobs: i32,
    on_errors: OnErrors,
    one_hot: bool,
}

impl Default for CompositionsBuilder {
    fn default() -> Self {
        Self {
            elements: None,
            names: None,
            kinds: FeaturizerKind::CLASSIC.to_vec(),
            n_jobs: -1,
            on_errors: OnErrors::Nan,
            one_hot: false,
        }
    }
}

impl CompositionsBuilder {
    /// Builder with the classic featurizers, all cores and the `nan` policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `elements` instead of the process-wide default table.
    pub fn elements(mut self, elements: Arc<ElementTable>) -> Self {
        self.elements = Some(elements);
        self
    }

    /// Select featurizers by name; resolved in [`CompositionsBuilder::build`].
    pub fn featurizers<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.names = Some(names.iter().map(|n| n.as_ref().to_string()).collect());
        self
    }

    /// Select featurizers by kind.
    pub fn kinds(mut self, kinds: &[FeaturizerKind]) -> Self {
        self.names = None;
        self.kinds = kinds.to_vec();
        self
    }

    /// Worker count for every featurizer.
    pub fn n_jobs(mut self, n_jobs: i32) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Error policy for every featurizer.
    pub fn on_errors(mut self, on_errors: OnErrors) -> Self {
        self.on_errors = on_errors;
        self
    }

    /// One-hot encoding for `Counting`.
    pub fn one_hot(mut self, one_hot: bool) -> Self {
        self.one_hot = one_hot;
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// `ConfigError` when no featurizer is selected, a name is unknown or a
    /// kind is repeated, or `n_jobs` is 0.
    pub fn build(self) -> Result<Compositions> {
        let kinds = match &self.names {
            Some(names) => names.iter().map(|n| n.parse()).collect::<Result<Vec<FeaturizerKind>>>()?,
            None => self.kinds.clone(),
        };
        if kinds.is_empty() {
            return Err(DescriptorError::ConfigError("at least one featurizer is required".to_string()));
        }
        if let Some(dup) = kinds.iter().enumerate().find(|(i, k)| kinds[..*i].contains(k)) {
            return Err(DescriptorError::ConfigError(format!("featurizer {} listed twice", dup.1)));
        }

        let config = BatchConfig::new()
            .with_n_jobs(self.n_jobs)
            .with_on_errors(self.on_errors)
            .with_return_type(ReturnType::Df);
        let runner = BatchRunner::new(config)?;

        let elements = match self.elements {
            Some(elements) => elements,
            None => default_table()?,
        };
        let featurizers = kinds
            .iter()
            .map(|kind| kind.build_with(Arc::clone(&elements), self.one_hot))
            .collect();

        Ok(Compositions { elements, featurizers, runner })
    }
}

impl Compositions {
    /// Start a builder.
    pub fn builder() -> CompositionsBuilder {
        CompositionsBuilder::new()
    }

    /// The classic five featurizers over the default table.
    pub fn classic() -> Result<Self> {
        Self::builder().build()
    }

    /// Names of the configured featurizers, in order.
    pub fn featurizer_names(&self) -> Vec<&'static str> {
        self.featurizers.iter().map(|f| f.name()).collect()
    }

    /// All output labels, in column order.
    pub fn feature_labels(&self) -> Vec<String> {
        self.featurizers.iter().flat_map(|f| f.feature_labels()).collect()
    }

    /// Total output width.
    pub fn width(&self) -> usize {
        self.featurizers.iter().map(|f| f.width()).sum()
    }

    /// Element table shared by the featurizers.
    pub fn elements(&self) -> &Arc<ElementTable> {
        &self.elements
    }

    /// Run every featurizer over `inputs` and join the results column-wise.
    ///
    /// # Errors
    ///
    /// Row failures only propagate under the `raise` policy.
    pub fn transform(&self, inputs: impl Into<BatchInput>) -> Result<DescriptorFrame> {
        let inputs = inputs.into();
        let mut timer = Timer::new();

        let mut frames = Vec::with_capacity(self.featurizers.len());
        for featurizer in &self.featurizers {
            let out = timer.time(featurizer.name(), || self.runner.run(featurizer.as_ref(), &inputs))?;
            frames.push(out.into_frame(featurizer.feature_labels())?);
        }

        let frame = DescriptorFrame::hstack(frames)?;
        debug!("composition descriptor {} rows x {} columns; {timer}", frame.nrows(), frame.ncols());
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::ErrorKind;

    #[test]
    fn empty_featurizer_list_is_rejected() {
        let empty: [&str; 0] = [];
        let err = Compositions::builder().featurizers(&empty).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        let err = Compositions::builder().kinds(&[]).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn unknown_or_repeated_names_are_rejected() {
        let err = Compositions::builder().featurizers(&["WeightedAverage", "Median"]).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        let err = Compositions::builder().featurizers(&["MaxPooling", "max_pooling"]).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn classic_layout() {
        let desc = Compositions::classic().unwrap();
        assert_eq!(
            desc.featurizer_names(),
            vec!["WeightedAverage", "WeightedSum", "WeightedVariance", "MaxPooling", "MinPooling"]
        );
        assert_eq!(desc.width(), 5 * desc.elements().width());
    }

    #[test]
    fn one_hot_reaches_counting() {
        let desc = Compositions::builder()
            .kinds(&[FeaturizerKind::Counting, FeaturizerKind::WeightedSum])
            .one_hot(true)
            .n_jobs(1)
            .build()
            .unwrap();
        let frame = desc.transform(vec!["Fe2O3"]).unwrap();
        let fe = frame.column("Fe").unwrap()[0].value();
        let o = frame.column("O").unwrap()[0].value();
        assert_eq!((fe, o), (Some(1.0), Some(1.0)));
        assert_eq!(frame.column("Na").unwrap()[0].value(), Some(0.0));

        // amounts still drive the other featurizers
        let sum = frame.column("sum:atomic_number").unwrap()[0].value().unwrap();
        assert!((sum - (2.0 * 26.0 + 3.0 * 8.0)).abs() < 1e-12);

        let plain = Compositions::builder().kinds(&[FeaturizerKind::Counting]).n_jobs(1).build().unwrap();
        let frame = plain.transform(vec!["Fe2O3"]).unwrap();
        assert_eq!(frame.column("O").unwrap()[0].value(), Some(3.0));
    }

    #[test]
    fn widths_add_up_and_labels_are_disjoint() {
        let desc = Compositions::builder()
            .kinds(&[FeaturizerKind::WeightedAverage, FeaturizerKind::MaxPooling])
            .n_jobs(2)
            .build()
            .unwrap();
        let frame = desc.transform(vec!["Fe2O3", "SiO2", "CaTiO3"]).unwrap();
        let width = desc.elements().width();
        assert_eq!(frame.ncols(), 2 * width);
        assert!(frame.labels()[..width].iter().all(|l| l.starts_with("ave:")));
        assert!(frame.labels()[width..].iter().all(|l| l.starts_with("max:")));

        let mut unique = frame.labels().to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), frame.ncols());
    }

    #[test]
    fn default_policy_fills_nan() {
        let desc = Compositions::builder().n_jobs(1).build().unwrap();
        let frame = desc.transform(vec!["Fe2O3", "Unobtainium"]).unwrap();
        assert_eq!(frame.nrows(), 2);
        let values = frame.to_values().unwrap();
        assert!(values.row(1).iter().all(|v| v.is_nan()));
        assert!(values.row(0).iter().all(|v| v.is_finite()));
        assert_eq!(frame.failures().len(), desc.featurizer_names().len());
    }

    #[test]
    fn transform_is_repeatable() {
        let desc = Compositions::builder().n_jobs(3).build().unwrap();
        let input = vec!["LiFePO4", "BaTiO3", "GaAs", "ZnO"];
        let a = desc.transform(input.clone()).unwrap().to_values().unwrap();
        let b = desc.transform(input).unwrap().to_values().unwrap();
        assert_eq!(a, b);
    }
}
