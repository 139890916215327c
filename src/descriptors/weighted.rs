// src/descriptors/weighted.rs
//! Amount-weighted aggregates of the elemental property columns.
//!
//! For a composition with elements `e₁..eₙ`, amounts `a₁..aₙ` and table rows
//! `r₁..rₙ`:
//!
//! - **WeightedAverage**: `Σ wᵢ·rᵢ` with `wᵢ = aᵢ / Σ a`
//! - **WeightedSum**: `Σ aᵢ·rᵢ`
//! - **WeightedVariance**: `Σ wᵢ·(rᵢ − mean)²` with the normalised weights
//!
//! The normalised variants fail with `ComputationError` when the amounts sum
//! to zero.
//!
//! ```
//! use compdesc::descriptors::{Featurizer, WeightedAverage};
//! use compdesc::elements::ElementTable;
//!
//! let table = ElementTable::load(None).unwrap();
//! let ave = WeightedAverage::new(table.clone());
//! let vec = ave.featurize(&"Fe2O3".into()).unwrap();
//!
//! let z = table.column_position("atomic_number").unwrap();
//! assert!((vec[z] - (0.4 * 26.0 + 0.6 * 8.0)).abs() < 1e-12);
//! ```

use std::sync::Arc;

use super::{check_aligned, gather_rows, tagged_labels, DescriptorError, Featurizer, Result};
use crate::elements::ElementTable;

/// Weighted mean of each property column.
#[derive(Debug, Clone)]
pub struct WeightedAverage {
    elements: Arc<ElementTable>,
}

/// Weighted sum of each property column using raw amounts.
#[derive(Debug, Clone)]
pub struct WeightedSum {
    elements: Arc<ElementTable>,
}

/// Weighted variance of each property column about the weighted mean.
#[derive(Debug, Clone)]
pub struct WeightedVariance {
    elements: Arc<ElementTable>,
}

impl WeightedAverage {
    /// Featurizer over `elements`.
    pub fn new(elements: Arc<ElementTable>) -> Self {
        Self { elements }
    }
}

impl WeightedSum {
    /// Featurizer over `elements`.
    pub fn new(elements: Arc<ElementTable>) -> Self {
        Self { elements }
    }
}

impl WeightedVariance {
    /// Featurizer over `elements`.
    pub fn new(elements: Arc<ElementTable>) -> Self {
        Self { elements }
    }
}

/// Amounts scaled to sum to one.
fn normalized_weights(amounts: &[f64]) -> Result<Vec<f64>> {
    let total: f64 = amounts.iter().sum();
    if !(total > 0.0 && total.is_finite()) {
        return Err(DescriptorError::ComputationError(format!(
            "amounts sum to {total}, weights cannot be normalised"
        )));
    }
    Ok(amounts.iter().map(|a| a / total).collect())
}

/// `Σ weightsᵢ · rowsᵢ`, column by column.
fn weighted_dot(weights: &[f64], rows: &[&[f64]], width: usize) -> Vec<f64> {
    let mut out = vec![0.0; width];
    for (w, row) in weights.iter().zip(rows) {
        for (acc, value) in out.iter_mut().zip(row.iter()) {
            *acc += w * value;
        }
    }
    out
}

impl Featurizer for WeightedAverage {
    fn name(&self) -> &'static str {
        "WeightedAverage"
    }

    fn feature_labels(&self) -> Vec<String> {
        tagged_labels(&self.elements, "ave")
    }

    fn width(&self) -> usize {
        self.elements.width()
    }

    fn elements(&self) -> &ElementTable {
        &self.elements
    }

    fn mix_function(&self, elements: &[String], amounts: &[f64]) -> Result<Vec<f64>> {
        check_aligned(elements, amounts)?;
        let rows = gather_rows(&self.elements, elements)?;
        let weights = normalized_weights(amounts)?;
        Ok(weighted_dot(&weights, &rows, self.elements.width()))
    }
}

impl Featurizer for WeightedSum {
    fn name(&self) -> &'static str {
        "WeightedSum"
    }

    fn feature_labels(&self) -> Vec<String> {
        tagged_labels(&self.elements, "sum")
    }

    fn width(&self) -> usize {
        self.elements.width()
    }

    fn elements(&self) -> &ElementTable {
        &self.elements
    }

    fn mix_function(&self, elements: &[String], amounts: &[f64]) -> Result<Vec<f64>> {
        check_aligned(elements, amounts)?;
        let rows = gather_rows(&self.elements, elements)?;
        Ok(weighted_dot(amounts, &rows, self.elements.width()))
    }
}

impl Featurizer for WeightedVariance {
    fn name(&self) -> &'static str {
        "WeightedVariance"
    }

    fn feature_labels(&self) -> Vec<String> {
        tagged_labels(&self.elements, "var")
    }

    fn width(&self) -> usize {
        self.elements.width()
    }

    fn elements(&self) -> &ElementTable {
        &self.elements
    }

    fn mix_function(&self, elements: &[String], amounts: &[f64]) -> Result<Vec<f64>> {
        check_aligned(elements, amounts)?;
        let rows = gather_rows(&self.elements, elements)?;
        let weights = normalized_weights(amounts)?;
        let width = self.elements.width();
        let mean = weighted_dot(&weights, &rows, width);

        let mut var = vec![0.0; width];
        for (w, row) in weights.iter().zip(&rows) {
            for ((acc, value), m) in var.iter_mut().zip(row.iter()).zip(&mean) {
                let d = value - m;
                *acc += w * d * d;
            }
        }
        Ok(var)
    }
}
