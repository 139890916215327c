// src/descriptors/pooling.rs
//! Column-wise max/min pooling over the elements present in a composition.
//! Amounts are ignored; an element listed with amount `0` still takes part.

use std::sync::Arc;

use super::{check_aligned, gather_rows, tagged_labels, Featurizer, Result};
use crate::elements::ElementTable;

/// Column-wise maximum of the property rows.
#[derive(Debug, Clone)]
pub struct MaxPooling {
    elements: Arc<ElementTable>,
}

/// Column-wise minimum of the property rows.
#[derive(Debug, Clone)]
pub struct MinPooling {
    elements: Arc<ElementTable>,
}

impl MaxPooling {
    /// Featurizer over `elements`.
    pub fn new(elements: Arc<ElementTable>) -> Self {
        Self { elements }
    }
}

impl MinPooling {
    /// Featurizer over `elements`.
    pub fn new(elements: Arc<ElementTable>) -> Self {
        Self { elements }
    }
}

fn pool(rows: &[&[f64]], width: usize, init: f64, pick: fn(f64, f64) -> f64) -> Vec<f64> {
    let mut out = vec![init; width];
    for row in rows {
        for (acc, &value) in out.iter_mut().zip(row.iter()) {
            *acc = pick(*acc, value);
        }
    }
    out
}

impl Featurizer for MaxPooling {
    fn name(&self) -> &'static str {
        "MaxPooling"
    }

    fn feature_labels(&self) -> Vec<String> {
        tagged_labels(&self.elements, "max")
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
        Ok(pool(&rows, self.elements.width(), f64::NEG_INFINITY, f64::max))
    }
}

impl Featurizer for MinPooling {
    fn name(&self) -> &'static str {
        "MinPooling"
    }

    fn feature_labels(&self) -> Vec<String> {
        tagged_labels(&self.elements, "min")
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
        Ok(pool(&rows, self.elements.width(), f64::INFINITY, f64::min))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Arc<ElementTable> {
        ElementTable::load(None).unwrap()
    }

    #[test]
    fn max_and_min_bracket_every_column() {
        let table = table();
        let elements = vec!["Ba".to_string(), "Ti".to_string(), "O".to_string()];
        let amounts = [1.0, 1.0, 3.0];
        let max = MaxPooling::new(table.clone()).mix_function(&elements, &amounts).unwrap();
        let min = MinPooling::new(table.clone()).mix_function(&elements, &amounts).unwrap();

        let z = table.column_position("atomic_number").unwrap();
        assert_eq!(max[z], 56.0);
        assert_eq!(min[z], 8.0);
        assert!(max.iter().zip(&min).all(|(hi, lo)| hi >= lo));
    }

    #[test]
    fn amounts_do_not_matter() {
        let table = table();
        let elements = vec!["Fe".to_string(), "O".to_string()];
        let a = MaxPooling::new(table.clone()).mix_function(&elements, &[2.0, 3.0]).unwrap();
        let b = MaxPooling::new(table).mix_function(&elements, &[0.0, 100.0]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn labels_carry_tags() {
        let table = table();
        assert!(MaxPooling::new(table.clone()).feature_labels().iter().all(|l| l.starts_with("max:")));
        assert!(MinPooling::new(table).feature_labels().iter().all(|l| l.starts_with("min:")));
    }
}
