#![warn(missing_docs)]
//! compdesc — fixed-length descriptor vectors from chemical compositions.
//!
//! A composition (`"Fe2O3"`, or element/amount pairs) is turned into a numeric
//! vector by aggregating per-element reference properties:
//!
//! - **elements** — the element reference table (bundled, or loaded from CSV)
//! - **composition** — formula parsing and labelled composition tables
//! - **descriptors** — the six featurizers and the crate error type
//! - **batch** — parallel featurization with per-row error policies
//! - **compositions** — several featurizers concatenated column-wise
//! - **models** — the predictor boundary, a linear adapter and helpers
//! - **data_io** — CSV readers and writers
//!
//! # Quick examples
//!
//! ### One composition, one featurizer
//! ```
//! use compdesc::{ElementTable, Featurizer, WeightedAverage};
//!
//! let ave = WeightedAverage::new(ElementTable::load(None).unwrap());
//! let vec = ave.featurize(&"Fe2O3".into()).unwrap();
//! assert_eq!(vec.len(), ave.width());
//! ```
//!
//! ### Many compositions, classic descriptor set
//! ```
//! use compdesc::Compositions;
//!
//! let desc = Compositions::classic().unwrap();
//! let frame = desc.transform(vec!["LiFePO4", "BaTiO3", "GaAs"]).unwrap();
//! assert_eq!(frame.nrows(), 3);
//! assert_eq!(frame.labels(), desc.feature_labels().as_slice());
//! ```
//!
//! ### Fit a predictor on descriptors
//! ```no_run
//! use compdesc::{data_io::read_csv_descriptors, models::{to_ndarrays, LinearPredictor}};
//!
//! let (desc, targets) = read_csv_descriptors("volumes.csv", &["ave:atomic_weight", "ave:covalent_radius"], "volume")?;
//! let (x, y) = to_ndarrays(desc, targets)?;
//! let mut model = LinearPredictor::new();
//! model.fit(x, y)?;
//! # Ok::<(), compdesc::DescriptorError>(())
//! ```

pub mod batch;
pub mod composition;
pub mod compositions;
pub mod config;
pub mod data_io;
pub mod descriptors;
pub mod elements;
pub mod frame;
pub mod models;
pub mod timing;

// ─────────────────────────────────────────────────────────────────────────────
// Convenience re-exports
// ─────────────────────────────────────────────────────────────────────────────
pub use batch::{BatchInput, BatchRunner};
pub use composition::{parse_formula, CompositionInput, CompositionTable, ParsedComposition};
pub use compositions::{Compositions, CompositionsBuilder};
pub use config::{BatchConfig, OnErrors, ReturnType};
pub use descriptors::{
    Counting, DescriptorError, ErrorKind, Featurizer, FeaturizerKind, MaxPooling, MinPooling, Result,
    WeightedAverage, WeightedSum, WeightedVariance,
};
pub use elements::{default_table, ElementSource, ElementTable};
pub use frame::{Cell, Descriptor, DescriptorFrame, ErrorRecord};
pub use models::{predict_volume, Checkpoint, LinearPredictor, Predictor};

/// Initialise `env_logger` from `RUST_LOG`; later calls are no-ops.
pub fn init_logger() {
    let _ = env_logger::try_init();
}
