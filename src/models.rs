//! Property-prediction boundary on top of composition descriptors.
//!
//! This module contains:
//! - [`Predictor`], the capability a trained model exposes: a descriptor
//!   matrix (and optionally a checkpoint) in, one prediction per row out.
//! - [`LinearPredictor`], an ordinary-least-squares adapter backed by
//!   `linfa_linear::LinearRegression` with named checkpoints.
//! - [`predict_volume`], which featurizes compositions with the classic
//!   descriptor set and hands the matrix to a predictor.
//! - [`dissimilarity`] and [`to_ndarrays`] helpers.
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use linfa::prelude::*;
use linfa_linear::LinearRegression;
use log::debug;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::batch::BatchInput;
use crate::compositions::Compositions;
use crate::config::OnErrors;
use crate::descriptors::{DescriptorError, Result};

/// Which saved state of a model to predict with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Checkpoint {
    /// The most recent fit.
    Latest,
    /// The state marked best by the caller.
    Best,
    /// The state with the lowest mean absolute error.
    Mae,
    /// Any other named state.
    Named(String),
}

impl Checkpoint {
    /// Checkpoint name.
    pub fn name(&self) -> &str {
        match self {
            Checkpoint::Latest => "latest",
            Checkpoint::Best => "best",
            Checkpoint::Mae => "mae",
            Checkpoint::Named(name) => name,
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Checkpoint {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        if name.is_empty() {
            return Err(DescriptorError::PredictError("empty checkpoint name".to_string()));
        }
        Ok(match name.to_ascii_lowercase().as_str() {
            "latest" => Checkpoint::Latest,
            "best" => Checkpoint::Best,
            "mae" => Checkpoint::Mae,
            _ => Checkpoint::Named(name.to_string()),
        })
    }
}

/// A trained model that maps descriptor rows to one value each.
pub trait Predictor: Send + Sync {
    /// Predict every row of `x`; `None` selects the model's default state.
    ///
    /// # Errors
    ///
    /// `PredictError` for an unknown checkpoint or a matrix of the wrong width.
    fn predict(&self, x: ArrayView2<'_, f64>, checkpoint: Option<&Checkpoint>) -> Result<Array1<f64>>;
}

/// Coefficients of one linear fit.
#[derive(Debug, Clone, PartialEq)]
struct LinearFit {
    params: Array1<f64>,
    intercept: f64,
}

/// Ordinary least squares over descriptor columns, with named checkpoints.
///
/// ```
/// use compdesc::models::{Checkpoint, LinearPredictor, Predictor};
/// use ndarray::array;
///
/// let x = array![[1.0, 0.0], [0.0, 1.0], [2.0, 3.0], [3.0, 1.0], [4.0, 2.0]];
/// let y = array![3.0, 0.0, 2.0, 6.0, 7.0];
/// let mut model = LinearPredictor::new();
/// model.fit(x, y).unwrap();
/// model.checkpoint(Checkpoint::Best).unwrap();
///
/// let pred = model.predict(array![[1.0, 1.0]].view(), Some(&Checkpoint::Best)).unwrap();
/// assert!((pred[0] - 2.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Default)]
pub struct LinearPredictor {
    checkpoints: BTreeMap<Checkpoint, LinearFit>,
}

impl LinearPredictor {
    /// Unfitted predictor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit on `x` (rows x features) and `y`, replacing the `latest` checkpoint.
    ///
    /// # Errors
    ///
    /// `PredictError` when the shapes disagree or the solver fails.
    pub fn fit(&mut self, x: Array2<f64>, y: Array1<f64>) -> Result<&mut Self> {
        if x.nrows() != y.len() {
            return Err(DescriptorError::PredictError(format!(
                "{} descriptor rows but {} targets",
                x.nrows(),
                y.len()
            )));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(DescriptorError::PredictError("training data contains NaN or infinite values".to_string()));
        }

        let dataset = Dataset::from((x, y));
        let model = LinearRegression::default()
            .fit(&dataset)
            .map_err(|e| DescriptorError::PredictError(e.to_string()))?;
        debug!("fitted linear model on {} rows x {} features", dataset.nsamples(), dataset.nfeatures());

        self.checkpoints.insert(
            Checkpoint::Latest,
            LinearFit { params: model.params().clone(), intercept: model.intercept() },
        );
        Ok(self)
    }

    /// Save the latest fit under `checkpoint`.
    ///
    /// # Errors
    ///
    /// `PredictError` if nothing has been fitted yet.
    pub fn checkpoint(&mut self, checkpoint: Checkpoint) -> Result<()> {
        let latest = self.resolve(&Checkpoint::Latest)?.clone();
        self.checkpoints.insert(checkpoint, latest);
        Ok(())
    }

    /// Names of the saved checkpoints.
    pub fn checkpoints(&self) -> impl Iterator<Item = &Checkpoint> + '_ {
        self.checkpoints.keys()
    }

    /// Coefficients and intercept of `checkpoint`.
    pub fn coefficients(&self, checkpoint: &Checkpoint) -> Option<(ArrayView1<'_, f64>, f64)> {
        self.checkpoints.get(checkpoint).map(|fit| (fit.params.view(), fit.intercept))
    }

    fn resolve(&self, checkpoint: &Checkpoint) -> Result<&LinearFit> {
        self.checkpoints
            .get(checkpoint)
            .ok_or_else(|| DescriptorError::PredictError(format!("no checkpoint named {checkpoint}")))
    }
}

impl Predictor for LinearPredictor {
    fn predict(&self, x: ArrayView2<'_, f64>, checkpoint: Option<&Checkpoint>) -> Result<Array1<f64>> {
        let fit = self.resolve(checkpoint.unwrap_or(&Checkpoint::Latest))?;
        if x.ncols() != fit.params.len() {
            return Err(DescriptorError::PredictError(format!(
                "model expects {} features, got {}",
                fit.params.len(),
                x.ncols()
            )));
        }
        // NaN rows propagate to NaN predictions
        Ok(x.dot(&fit.params) + fit.intercept)
    }
}

/// Featurize `compositions` with the classic descriptor set and predict a
/// value per composition.
///
/// Rows that cannot be featurized are filled with NaN, so their predictions
/// are NaN as well.
pub fn predict_volume<P: Predictor + ?Sized>(
    compositions: impl Into<BatchInput>,
    predictor: &P,
    checkpoint: Option<&Checkpoint>,
    n_jobs: i32,
) -> Result<Array1<f64>> {
    let desc = Compositions::builder().n_jobs(n_jobs).on_errors(OnErrors::Nan).build()?;
    let frame = desc.transform(compositions)?;
    predictor.predict(frame.to_values()?.view(), checkpoint)
}

/// Euclidean distance from `anchor` to every row of `others`.
///
/// # Errors
///
/// `ComputationError` when the widths differ.
pub fn dissimilarity(anchor: ArrayView1<'_, f64>, others: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
    if others.ncols() != anchor.len() {
        return Err(DescriptorError::ComputationError(format!(
            "anchor has {} features, rows have {}",
            anchor.len(),
            others.ncols()
        )));
    }
    Ok(others
        .rows()
        .into_iter()
        .map(|row| (&row - &anchor).mapv(|d| d * d).sum().sqrt())
        .collect())
}

/// Convert descriptor and target vectors into `ndarray` arrays for fitting.
///
/// # Errors
///
/// `PredictError` for empty or ragged descriptors, or a target count that
/// does not match the row count.
pub fn to_ndarrays(descriptors: Vec<Vec<f64>>, targets: Vec<f64>) -> Result<(Array2<f64>, Array1<f64>)> {
    let n_samples = descriptors.len();
    if n_samples == 0 {
        return Err(DescriptorError::PredictError("descriptors is empty".to_string()));
    }
    if targets.len() != n_samples {
        return Err(DescriptorError::PredictError(format!(
            "{} targets for {n_samples} descriptor rows",
            targets.len()
        )));
    }
    let n_features = descriptors[0].len();

    let mut flat = Vec::with_capacity(n_samples * n_features);
    for (i, row) in descriptors.iter().enumerate() {
        if row.len() != n_features {
            return Err(DescriptorError::PredictError(format!(
                "row {i} has {} features, expected {n_features}",
                row.len()
            )));
        }
        flat.extend_from_slice(row);
    }

    let x = Array2::from_shape_vec((n_samples, n_features), flat)
        .map_err(|e| DescriptorError::PredictError(e.to_string()))?;
    Ok((x, Array1::from_vec(targets)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::ErrorKind;
    use ndarray::array;

    fn fitted() -> LinearPredictor {
        // y = 2 x0 - x1 + 1
        let x = array![[1.0, 0.0], [0.0, 1.0], [2.0, 3.0], [3.0, 1.0], [4.0, 2.0]];
        let y = array![3.0, 0.0, 2.0, 6.0, 7.0];
        let mut model = LinearPredictor::new();
        model.fit(x, y).unwrap();
        model
    }

    #[test]
    fn fit_recovers_coefficients() {
        let model = fitted();
        let (params, intercept) = model.coefficients(&Checkpoint::Latest).unwrap();
        assert!((params[0] - 2.0).abs() < 1e-6);
        assert!((params[1] + 1.0).abs() < 1e-6);
        assert!((intercept - 1.0).abs() < 1e-6);
    }

    #[test]
    fn checkpoints_snapshot_the_latest_fit() {
        let mut model = fitted();
        model.checkpoint(Checkpoint::Mae).unwrap();
        model.fit(array![[0.0], [1.0], [2.0]], array![1.0, 1.0, 1.0]).unwrap();

        let pred = model.predict(array![[5.0, 6.0]].view(), Some(&Checkpoint::Mae)).unwrap();
        assert!((pred[0] - 5.0).abs() < 1e-6);
        let pred = model.predict(array![[7.0]].view(), None).unwrap();
        assert!((pred[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unknown_checkpoint_and_width_are_errors() {
        let model = fitted();
        let err = model.predict(array![[1.0, 1.0]].view(), Some(&Checkpoint::Best)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Predict);
        let err = model.predict(array![[1.0, 1.0, 1.0]].view(), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Predict);
        assert_eq!(LinearPredictor::new().checkpoint(Checkpoint::Best).unwrap_err().kind(), ErrorKind::Predict);
    }

    #[test]
    fn nan_rows_predict_nan() {
        let model = fitted();
        let pred = model.predict(array![[f64::NAN, 1.0], [1.0, 1.0]].view(), None).unwrap();
        assert!(pred[0].is_nan());
        assert!(pred[1].is_finite());
    }

    #[test]
    fn checkpoint_names_parse() {
        assert_eq!("MAE".parse::<Checkpoint>().unwrap(), Checkpoint::Mae);
        assert_eq!("epoch-12".parse::<Checkpoint>().unwrap(), Checkpoint::Named("epoch-12".into()));
        assert!(" ".parse::<Checkpoint>().is_err());
    }

    #[test]
    fn dissimilarity_is_euclidean() {
        let d = dissimilarity(array![0.0, 0.0].view(), array![[3.0, 4.0], [0.0, 0.0]].view()).unwrap();
        assert_eq!(d, array![5.0, 0.0]);
        let err = dissimilarity(array![0.0].view(), array![[1.0, 2.0]].view()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Computation);
    }

    #[test]
    fn conversion_checks_shapes() {
        let (x, y) = to_ndarrays(vec![vec![1.0, 2.0], vec![3.0, 4.0]], vec![3.0, 7.0]).unwrap();
        assert_eq!(x.shape(), &[2, 2]);
        assert_eq!(y.len(), 2);
        assert!(to_ndarrays(vec![vec![1.0], vec![1.0, 2.0]], vec![0.0, 0.0]).is_err());
        assert!(to_ndarrays(vec![vec![1.0]], vec![0.0, 1.0]).is_err());
        assert!(to_ndarrays(Vec::new(), Vec::new()).is_err());
    }
}
