//! Batch configuration: parallelism, error policy and output shape.
//!
//! ```
//! use compdesc::config::{BatchConfig, OnErrors, ReturnType};
//!
//! let config = BatchConfig::new()
//!     .with_n_jobs(4)
//!     .with_on_errors(OnErrors::Nan)
//!     .with_return_type(ReturnType::Df);
//! assert_eq!(config.resolve_jobs().unwrap(), 4);
//!
//! let from_json = BatchConfig::from_json(r#"{"n_jobs": 1, "on_errors": "keep"}"#).unwrap();
//! assert_eq!(from_json.on_errors, OnErrors::Keep);
//! assert_eq!(from_json.return_type, ReturnType::Any);
//! ```
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::descriptors::{DescriptorError, Result};

/// What to do with a row whose featurization fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnErrors {
    /// Abort the batch with the first failing row.
    #[default]
    Raise,
    /// Fill the row with NaN of the featurizer's width.
    Nan,
    /// Keep the captured failure in the row's cells.
    Keep,
}

/// Requested output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnType {
    /// Mirror the input: rows give an array, a table gives a frame.
    #[default]
    Any,
    /// Always a plain matrix.
    Array,
    /// Always a labelled frame.
    Df,
}

/// Shape of a batch input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputShape {
    /// Plain sequence of compositions.
    Rows,
    /// Labelled table.
    Table,
}

/// Shape of a batch output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    /// Plain matrix.
    Array,
    /// Labelled frame.
    Frame,
}

impl ReturnType {
    /// Resolve the output shape for an input shape.
    ///
    /// | return type | rows  | table |
    /// |-------------|-------|-------|
    /// | `any`       | array | frame |
    /// | `array`     | array | array |
    /// | `df`        | frame | frame |
    pub fn resolve(self, input: InputShape) -> OutputShape {
        match (self, input) {
            (ReturnType::Array, _) | (ReturnType::Any, InputShape::Rows) => OutputShape::Array,
            (ReturnType::Df, _) | (ReturnType::Any, InputShape::Table) => OutputShape::Frame,
        }
    }
}

impl FromStr for OnErrors {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raise" => Ok(Self::Raise),
            "nan" => Ok(Self::Nan),
            "keep" => Ok(Self::Keep),
            other => Err(DescriptorError::ConfigError(format!(
                "on_errors must be 'raise', 'nan' or 'keep', got '{other}'"
            ))),
        }
    }
}

impl FromStr for ReturnType {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(Self::Any),
            "array" => Ok(Self::Array),
            "df" => Ok(Self::Df),
            other => Err(DescriptorError::ConfigError(format!(
                "return_type must be 'any', 'array' or 'df', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for OnErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Raise => "raise",
            Self::Nan => "nan",
            Self::Keep => "keep",
        })
    }
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Any => "any",
            Self::Array => "array",
            Self::Df => "df",
        })
    }
}

/// Configuration for [`crate::batch::BatchRunner`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker count; negative means all available execution units, `1` runs
    /// on the calling thread, `0` is invalid.
    pub n_jobs: i32,
    /// Per-row error policy.
    pub on_errors: OnErrors,
    /// Output container.
    pub return_type: ReturnType,
    /// For table inputs, featurize only this column.
    pub target_column: Option<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            n_jobs: -1, // all cores
            on_errors: OnErrors::Raise,
            return_type: ReturnType::Any,
            target_column: None,
        }
    }
}

impl BatchConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DescriptorError::ConfigError(format!("invalid batch config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the worker count.
    pub fn with_n_jobs(mut self, n_jobs: i32) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Set the error policy.
    pub fn with_on_errors(mut self, on_errors: OnErrors) -> Self {
        self.on_errors = on_errors;
        self
    }

    /// Set the output container.
    pub fn with_return_type(mut self, return_type: ReturnType) -> Self {
        self.return_type = return_type;
        self
    }

    /// Restrict table inputs to one column.
    pub fn with_target_column(mut self, column: impl Into<String>) -> Self {
        self.target_column = Some(column.into());
        self
    }

    /// Reject configurations no batch can run with.
    pub fn validate(&self) -> Result<()> {
        if self.n_jobs == 0 {
            return Err(DescriptorError::ConfigError("n_jobs must not be 0".to_string()));
        }
        Ok(())
    }

    /// Number of workers to use.
    ///
    /// Negative values resolve to the size of the current rayon pool when
    /// called from inside one, and to the machine's available parallelism
    /// otherwise.
    pub fn resolve_jobs(&self) -> Result<usize> {
        self.validate()?;
        if self.n_jobs > 0 {
            return Ok(self.n_jobs as usize);
        }
        Ok(available_jobs())
    }
}

/// Execution units available to a batch started from the current thread.
pub(crate) fn available_jobs() -> usize {
    if rayon::current_thread_index().is_some() {
        return rayon::current_num_threads();
    }
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}
