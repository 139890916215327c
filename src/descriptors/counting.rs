// src/descriptors/counting.rs
//! Element counting: one slot per element of the table vocabulary.
//!
//! The vector has as many entries as the element table has symbols, in table
//! order. A present element's slot holds its amount (or `1.0` in one-hot
//! mode); every other slot is `0.0`.
//!
//! ```
//! use compdesc::descriptors::{Counting, Featurizer};
//! use compdesc::elements::ElementTable;
//!
//! let table = ElementTable::load(None).unwrap();
//! let counting = Counting::new(table.clone());
//! let vec = counting.featurize(&"Fe2O3".into()).unwrap();
//! assert_eq!(vec.len(), table.len());
//! assert_eq!(vec[table.position("Fe").unwrap()], 2.0);
//! assert_eq!(vec[table.position("O").unwrap()], 3.0);
//! ```

use std::sync::Arc;

use super::{check_aligned, DescriptorError, Featurizer, Result};
use crate::elements::ElementTable;

/// Counting featurizer over the full element vocabulary.
#[derive(Debug, Clone)]
pub struct Counting {
    elements: Arc<ElementTable>,
    one_hot: bool,
}

impl Counting {
    /// Counting with raw amounts.
    pub fn new(elements: Arc<ElementTable>) -> Self {
        Self { elements, one_hot: false }
    }

    /// Counting that marks present elements with `1.0` regardless of amount.
    pub fn one_hot(elements: Arc<ElementTable>) -> Self {
        Self { elements, one_hot: true }
    }

    /// Switch one-hot encoding on or off.
    pub fn with_one_hot(mut self, one_hot: bool) -> Self {
        self.one_hot = one_hot;
        self
    }

    /// Whether one-hot encoding is active.
    pub fn is_one_hot(&self) -> bool {
        self.one_hot
    }
}

impl Featurizer for Counting {
    fn name(&self) -> &'static str {
        "Counting"
    }

    fn feature_labels(&self) -> Vec<String> {
        self.elements.symbols().to_vec()
    }

    fn width(&self) -> usize {
        self.elements.len()
    }

    fn elements(&self) -> &ElementTable {
        &self.elements
    }

    fn mix_function(&self, elements: &[String], amounts: &[f64]) -> Result<Vec<f64>> {
        check_aligned(elements, amounts)?;
        let mut vec = vec![0.0; self.elements.len()];
        for (element, &amount) in elements.iter().zip(amounts) {
            let slot = self
                .elements
                .position(element)
                .ok_or_else(|| DescriptorError::UnknownElement(element.clone()))?;
            vec[slot] = if self.one_hot { 1.0 } else { amount };
        }
        Ok(vec)
    }
}
