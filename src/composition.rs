//! Composition inputs and the formula parser.
//!
//! Every input row is normalised into a [`ParsedComposition`]: unique element
//! symbols in first-occurrence order with index-aligned amounts.
//!
//! Accepted inputs:
//! - formula strings: `"Fe2O3"`, `"Li0.5CoO2"`, `"Ca(OH)2"`, `"(NH4)2[SO4]"`
//! - symbol → amount pairs or maps: `vec![("Fe", 2.0), ("O", 3.0)]`
//! - an already parsed composition
//!
//! ```
//! use compdesc::composition::{parse, CompositionInput};
//!
//! let comp = parse(&CompositionInput::from("Ca(OH)2")).unwrap();
//! assert_eq!(comp.elements(), &["Ca", "O", "H"]);
//! assert_eq!(comp.amounts(), &[1.0, 2.0, 2.0]);
//! ```
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::descriptors::{DescriptorError, Result};

/// One composition: unique symbols with non-negative amounts.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedComposition {
    elements: Vec<String>,
    amounts: Vec<f64>,
}

impl ParsedComposition {
    /// Build from `(symbol, amount)` pairs. Repeated symbols are summed and keep
    /// the position of their first occurrence.
    ///
    /// # Errors
    ///
    /// `ParseError` for an empty list or malformed symbol, `NegativeAmount`
    /// for negative or non-finite amounts.
    pub fn new<S: AsRef<str>>(pairs: impl IntoIterator<Item = (S, f64)>) -> Result<Self> {
        let mut elements: Vec<String> = Vec::new();
        let mut amounts: Vec<f64> = Vec::new();

        for (symbol, amount) in pairs {
            let symbol = symbol.as_ref().trim();
            if !is_symbol(symbol) {
                return Err(DescriptorError::ParseError(format!("invalid element symbol '{symbol}'")));
            }
            if !(amount >= 0.0 && amount.is_finite()) {
                return Err(DescriptorError::NegativeAmount {
                    element: symbol.to_string(),
                    amount,
                });
            }
            match elements.iter().position(|e| e == symbol) {
                Some(i) => amounts[i] += amount,
                None => {
                    elements.push(symbol.to_string());
                    amounts.push(amount);
                }
            }
        }

        if elements.is_empty() {
            return Err(DescriptorError::ParseError("empty composition".to_string()));
        }
        Ok(Self { elements, amounts })
    }

    /// Element symbols.
    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    /// Amounts, aligned with [`ParsedComposition::elements`].
    pub fn amounts(&self) -> &[f64] {
        &self.amounts
    }

    /// Number of distinct elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Always false for a parsed composition.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Sum of all amounts.
    pub fn total(&self) -> f64 {
        self.amounts.iter().sum()
    }

    /// Amount of `symbol`, if present.
    pub fn amount(&self, symbol: &str) -> Option<f64> {
        self.elements.iter().position(|e| e == symbol).map(|i| self.amounts[i])
    }

    /// `(symbol, amount)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.elements.iter().map(String::as_str).zip(self.amounts.iter().copied())
    }
}

impl fmt::Display for ParsedComposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (symbol, amount) in self.iter() {
            if amount == 1.0 {
                write!(f, "{symbol}")?;
            } else {
                write!(f, "{symbol}{amount}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for ParsedComposition {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self> {
        parse_formula(s)
    }
}

/// A raw composition input row.
#[derive(Debug, Clone, PartialEq)]
pub enum CompositionInput {
    /// Chemical formula text.
    Formula(String),
    /// Symbol → amount pairs.
    Amounts(Vec<(String, f64)>),
    /// Already parsed.
    Parsed(ParsedComposition),
}

impl From<&str> for CompositionInput {
    fn from(formula: &str) -> Self {
        Self::Formula(formula.to_string())
    }
}

impl From<String> for CompositionInput {
    fn from(formula: String) -> Self {
        Self::Formula(formula)
    }
}

impl<S: Into<String>> From<Vec<(S, f64)>> for CompositionInput {
    fn from(pairs: Vec<(S, f64)>) -> Self {
        Self::Amounts(pairs.into_iter().map(|(s, a)| (s.into(), a)).collect())
    }
}

impl<S: Into<String>> From<BTreeMap<S, f64>> for CompositionInput {
    fn from(map: BTreeMap<S, f64>) -> Self {
        Self::Amounts(map.into_iter().map(|(s, a)| (s.into(), a)).collect())
    }
}

impl<S: Into<String>> From<HashMap<S, f64>> for CompositionInput {
    /// Hash maps carry no order, so symbols are sorted to keep results reproducible.
    fn from(map: HashMap<S, f64>) -> Self {
        let mut pairs: Vec<(String, f64)> = map.into_iter().map(|(s, a)| (s.into(), a)).collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Self::Amounts(pairs)
    }
}

impl From<ParsedComposition> for CompositionInput {
    fn from(comp: ParsedComposition) -> Self {
        Self::Parsed(comp)
    }
}

impl fmt::Display for CompositionInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Formula(s) => f.write_str(s),
            Self::Amounts(pairs) => {
                let parts: Vec<String> = pairs.iter().map(|(s, a)| format!("{s}: {a}")).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Self::Parsed(comp) => fmt::Display::fmt(comp, f),
        }
    }
}

/// Normalise any [`CompositionInput`] into a [`ParsedComposition`].
///
/// # Errors
///
/// Parse-kind errors when the input cannot be read as element/amount pairs or
/// carries a negative amount.
pub fn parse(input: &CompositionInput) -> Result<ParsedComposition> {
    match input {
        CompositionInput::Formula(formula) => parse_formula(formula),
        CompositionInput::Amounts(pairs) => {
            ParsedComposition::new(pairs.iter().map(|(s, a)| (s.as_str(), *a)))
        }
        CompositionInput::Parsed(comp) => Ok(comp.clone()),
    }
}

fn is_symbol(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase()) && chars.all(|c| c.is_ascii_lowercase())
}

/// Parse formula text such as `"(NH4)2SO4"` or `"Li0.5CoO2"`.
pub fn parse_formula(formula: &str) -> Result<ParsedComposition> {
    let chars: Vec<char> = formula.chars().filter(|c| !c.is_whitespace()).collect();
    if chars.is_empty() {
        return Err(DescriptorError::ParseError(format!("empty formula '{formula}'")));
    }

    // one frame per open group; the closing bracket it expects travels with it
    let mut stack: Vec<(Vec<(String, f64)>, char)> = vec![(Vec::new(), '\0')];
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '(' | '[' => {
                let close = if c == '(' { ')' } else { ']' };
                stack.push((Vec::new(), close));
                i += 1;
            }
            ')' | ']' => {
                let (group, expected) = match stack.pop() {
                    Some(frame) if !stack.is_empty() => frame,
                    _ => unbalanced(formula)?,
                };
                if expected != c {
                    return Err(DescriptorError::ParseError(format!(
                        "unbalanced '{c}' in formula '{formula}'"
                    )));
                }
                i += 1;
                let (mult, next) = read_number(&chars, i, formula)?;
                i = next;
                if group.is_empty() {
                    return Err(DescriptorError::ParseError(format!("empty group in formula '{formula}'")));
                }
                let parent = match stack.last_mut() {
                    Some((parent, _)) => parent,
                    None => unbalanced(formula)?,
                };
                parent.extend(group.into_iter().map(|(s, a)| (s, a * mult)));
            }
            c if c.is_ascii_uppercase() => {
                let mut symbol = c.to_string();
                i += 1;
                while i < chars.len() && chars[i].is_ascii_lowercase() {
                    symbol.push(chars[i]);
                    i += 1;
                }
                let (count, next) = read_number(&chars, i, formula)?;
                i = next;
                if let Some((top, _)) = stack.last_mut() {
                    top.push((symbol, count));
                }
            }
            '-' => {
                return Err(DescriptorError::ParseError(format!(
                    "negative amounts are not allowed in formula '{formula}'"
                )));
            }
            other => {
                return Err(DescriptorError::ParseError(format!(
                    "unexpected character '{other}' in formula '{formula}'"
                )));
            }
        }
    }

    if stack.len() != 1 {
        return Err(DescriptorError::ParseError(format!("unclosed group in formula '{formula}'")));
    }
    let (pairs, _) = stack.remove(0);
    ParsedComposition::new(pairs)
}

fn unbalanced<T>(formula: &str) -> Result<T> {
    Err(DescriptorError::ParseError(format!("unbalanced brackets in formula '{formula}'")))
}

/// Read an optional decimal count starting at `start`; absent means `1`.
fn read_number(chars: &[char], start: usize, formula: &str) -> Result<(f64, usize)> {
    let mut end = start;
    while end < chars.len() && (chars[end].is_ascii_digit() || chars[end] == '.') {
        end += 1;
    }
    if end == start {
        return Ok((1.0, start));
    }
    let text: String = chars[start..end].iter().collect();
    let value: f64 = text
        .parse()
        .map_err(|_| DescriptorError::ParseError(format!("bad count '{text}' in formula '{formula}'")))?;
    Ok((value, end))
}

/// Labelled table of composition inputs: a row index plus named columns.
#[derive(Debug, Clone, Default)]
pub struct CompositionTable {
    index: Vec<String>,
    names: Vec<String>,
    columns: Vec<Vec<CompositionInput>>,
}

impl CompositionTable {
    /// Empty table with the given row labels.
    pub fn new(index: Vec<String>) -> Self {
        Self { index, names: Vec::new(), columns: Vec::new() }
    }

    /// Single-column table labelled `0..n`.
    pub fn from_rows(name: impl Into<String>, rows: Vec<CompositionInput>) -> Self {
        let index = (0..rows.len()).map(|i| i.to_string()).collect();
        Self { index, names: vec![name.into()], columns: vec![rows] }
    }

    /// Append a column.
    ///
    /// # Errors
    ///
    /// `ConfigError` when the column length differs from the index or the
    /// name is already taken.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<CompositionInput>) -> Result<Self> {
        let name = name.into();
        if values.len() != self.index.len() {
            return Err(DescriptorError::ConfigError(format!(
                "column {name} has {} rows, index has {}",
                values.len(),
                self.index.len()
            )));
        }
        if self.names.contains(&name) {
            return Err(DescriptorError::ConfigError(format!("duplicate column: {name}")));
        }
        self.names.push(name);
        self.columns.push(values);
        Ok(self)
    }

    /// Row labels.
    pub fn index(&self) -> &[String] {
        &self.index
    }

    /// Column names in order.
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Values of column `name`.
    pub fn column(&self, name: &str) -> Option<&[CompositionInput]> {
        self.names.iter().position(|n| n == name).map(|i| self.columns[i].as_slice())
    }

    /// `(name, values)` for every column in order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &[CompositionInput])> + '_ {
        self.names.iter().map(String::as_str).zip(self.columns.iter().map(Vec::as_slice))
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.index.len()
    }
}
