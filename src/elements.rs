//! Per-element reference data.
//!
//! An [`ElementTable`] maps element symbols to fixed-width rows of numeric
//! properties (atomic number, covalent radius, ...). Tables are validated on
//! construction and immutable afterwards; featurizers share them through
//! `Arc`.
//!
//! The bundled table covers H..Cm with the columns `atomic_number`,
//! `atomic_weight`, `period`, `group` and `covalent_radius`. Any other table
//! keyed by element symbol can be supplied instead, as long as every row has
//! the same numeric columns.
//!
//! ```
//! use compdesc::elements::ElementTable;
//!
//! let table = ElementTable::load(None).unwrap();
//! assert_eq!(table.row("Fe").unwrap()[0], 26.0);
//! assert_eq!(table.columns()[4], "covalent_radius");
//! ```
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use log::{debug, warn};
use ndarray::Array2;

use crate::descriptors::{DescriptorError, Result};

/// Environment variable naming a CSV file that replaces the bundled table
/// as the process-wide default.
pub const ELEMENTS_ENV: &str = "COMPDESC_ELEMENTS";

const BUNDLED_CSV: &str = include_str!("../data/elements.csv");

static DEFAULT_TABLE: OnceLock<Arc<ElementTable>> = OnceLock::new();

/// Where [`ElementTable::load`] takes a caller-supplied table from.
#[derive(Debug, Clone)]
pub enum ElementSource {
    /// CSV file: first column is the symbol, remaining columns are properties.
    Path(PathBuf),
    /// In-memory rows: `(symbol, values)` aligned with `columns`.
    Rows {
        /// Property names.
        columns: Vec<String>,
        /// One row per element.
        rows: Vec<(String, Vec<f64>)>,
    },
}

/// Immutable element-symbol → property-row table.
#[derive(Debug, Clone)]
pub struct ElementTable {
    symbols: Vec<String>,
    columns: Vec<String>,
    values: Vec<f64>,
    index: HashMap<String, usize>,
}

impl ElementTable {
    /// Build a validated table.
    ///
    /// # Errors
    ///
    /// `SchemaError` when there are no columns or no rows, a column name or
    /// symbol repeats, a row's width differs from the column count, or a value
    /// is not finite.
    pub fn new(columns: Vec<String>, rows: Vec<(String, Vec<f64>)>) -> Result<Self> {
        if columns.is_empty() {
            return Err(DescriptorError::SchemaError("table has no property columns".to_string()));
        }
        if rows.is_empty() {
            return Err(DescriptorError::SchemaError("table has no elements".to_string()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(DescriptorError::SchemaError(format!("duplicate column: {dup}")));
        }

        let width = columns.len();
        let mut symbols = Vec::with_capacity(rows.len());
        let mut values = Vec::with_capacity(rows.len() * width);
        let mut index = HashMap::with_capacity(rows.len());

        for (symbol, row) in rows {
            if symbol.trim().is_empty() {
                return Err(DescriptorError::SchemaError("empty element symbol".to_string()));
            }
            if row.len() != width {
                return Err(DescriptorError::SchemaError(format!(
                    "element {symbol} has {} values, expected {width}",
                    row.len()
                )));
            }
            if let Some(pos) = row.iter().position(|v| !v.is_finite()) {
                return Err(DescriptorError::SchemaError(format!(
                    "element {symbol} has a missing value in column {}",
                    columns[pos]
                )));
            }
            if index.insert(symbol.clone(), symbols.len()).is_some() {
                return Err(DescriptorError::SchemaError(format!("duplicate element: {symbol}")));
            }
            symbols.push(symbol);
            values.extend(row);
        }

        Ok(Self { symbols, columns, values, index })
    }

    /// Load a table: the process-wide default for `None`, otherwise the given source.
    pub fn load(source: Option<ElementSource>) -> Result<Arc<Self>> {
        match source {
            None => default_table(),
            Some(ElementSource::Path(path)) => Ok(Arc::new(Self::from_csv_path(path)?)),
            Some(ElementSource::Rows { columns, rows }) => Ok(Arc::new(Self::new(columns, rows)?)),
        }
    }

    /// The table shipped with the crate.
    pub fn bundled() -> Result<Self> {
        Self::from_csv_reader(BUNDLED_CSV.as_bytes())
    }

    /// Read a table from CSV. The first header cell names the symbol column.
    ///
    /// # Errors
    ///
    /// `SchemaError` for non-numeric or missing cells and ragged records, plus
    /// everything [`ElementTable::new`] rejects.
    pub fn from_csv_reader(reader: impl Read) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);
        let headers = rdr.headers()?.clone();
        let columns: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let symbol = record.get(0).unwrap_or_default().to_string();
            if record.len() != headers.len() {
                return Err(DescriptorError::SchemaError(format!(
                    "element {symbol} has {} fields, header has {}",
                    record.len(),
                    headers.len()
                )));
            }
            let mut row = Vec::with_capacity(columns.len());
            for (field, column) in record.iter().skip(1).zip(&columns) {
                if field.is_empty() {
                    return Err(DescriptorError::SchemaError(format!(
                        "element {symbol} has a missing value in column {column}"
                    )));
                }
                let value: f64 = field.parse().map_err(|_| {
                    DescriptorError::SchemaError(format!(
                        "column {column} is not numeric: '{field}' for element {symbol}"
                    ))
                })?;
                row.push(value);
            }
            rows.push((symbol, row));
        }

        Self::new(columns, rows)
    }

    /// Read a table from a CSV file.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let table = Self::from_csv_reader(file)?;
        debug!(
            "loaded element table from {}: {} elements x {} columns",
            path.as_ref().display(),
            table.len(),
            table.width()
        );
        Ok(table)
    }

    /// Element symbols in table order (the Counting vocabulary).
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Property column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of property columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Always false for a validated table.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Whether `symbol` is part of the table.
    pub fn contains(&self, symbol: &str) -> bool {
        self.index.contains_key(symbol)
    }

    /// Row position of `symbol`.
    pub fn position(&self, symbol: &str) -> Option<usize> {
        self.index.get(symbol).copied()
    }

    /// Position of the property column `name`.
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Property row of `symbol`.
    pub fn row(&self, symbol: &str) -> Option<&[f64]> {
        let width = self.width();
        self.position(symbol).map(|i| &self.values[i * width..(i + 1) * width])
    }

    /// The table as an `(elements x columns)` matrix.
    pub fn to_array(&self) -> Array2<f64> {
        // shape always matches the validated row-major buffer
        Array2::from_shape_vec((self.len(), self.width()), self.values.clone())
            .unwrap_or_else(|_| Array2::zeros((0, 0)))
    }
}

/// Process-wide default table, initialised on first use and kept for the
/// lifetime of the process.
///
/// When [`ELEMENTS_ENV`] names a readable CSV file, that table is used;
/// otherwise the bundled data. A broken override is logged and ignored.
pub fn default_table() -> Result<Arc<ElementTable>> {
    if let Some(table) = DEFAULT_TABLE.get() {
        return Ok(Arc::clone(table));
    }
    let table = resolve_default(std::env::var_os(ELEMENTS_ENV))?;
    Ok(Arc::clone(DEFAULT_TABLE.get_or_init(|| Arc::new(table))))
}

/// Table for an optional override path; a path that cannot be loaded falls
/// back to the bundled table.
fn resolve_default(path: Option<OsString>) -> Result<ElementTable> {
    let Some(path) = path else {
        return ElementTable::bundled();
    };
    match ElementTable::from_csv_path(&path) {
        Ok(table) => Ok(table),
        Err(e) => {
            warn!(
                "{ELEMENTS_ENV}={} could not be loaded ({e}); using bundled element table",
                PathBuf::from(&path).display()
            );
            ElementTable::bundled()
        }
    }
}
