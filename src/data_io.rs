//! CSV helpers: composition tables in, descriptor frames out.
//!
//! - [`read_csv_compositions`] loads a labelled [`CompositionTable`] where
//!   every non-index column holds formulas.
//! - [`write_descriptor_csv`] writes a [`DescriptorFrame`] with its index as
//!   the first column.
//! - [`read_csv_descriptors`] loads numeric feature columns plus a target for
//!   fitting a predictor.
use std::io::{Read, Write};
use std::path::Path;

use csv::StringRecord;
use log::debug;

use crate::composition::{CompositionInput, CompositionTable};
use crate::descriptors::{DescriptorError, Result};
use crate::frame::{Cell, DescriptorFrame};

/// Read a composition table from CSV.
///
/// With `index_col`, that column labels the rows and every other column is a
/// composition column; without it rows are labelled `0..n` and all columns
/// hold compositions.
///
/// ```
/// use compdesc::data_io::read_csv_compositions;
///
/// let data = "id,host,dopant\nmp-1,Fe2O3,Cu\nmp-2,NaCl,Zn\n";
/// let table = read_csv_compositions(data.as_bytes(), Some("id")).unwrap();
/// assert_eq!(table.index(), &["mp-1".to_string(), "mp-2".to_string()]);
/// assert_eq!(table.column_names(), &["host".to_string(), "dopant".to_string()]);
/// ```
///
/// # Errors
///
/// `ConfigError` when `index_col` is not a header, CSV errors otherwise.
pub fn read_csv_compositions(reader: impl Read, index_col: Option<&str>) -> Result<CompositionTable> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();

    let index_pos = match index_col {
        Some(name) => Some(find_column(&headers, name)?),
        None => None,
    };
    let data_cols: Vec<usize> = (0..headers.len()).filter(|&i| Some(i) != index_pos).collect();

    let mut index = Vec::new();
    let mut columns: Vec<Vec<CompositionInput>> = vec![Vec::new(); data_cols.len()];
    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        index.push(match index_pos {
            Some(pos) => record.get(pos).unwrap_or_default().to_string(),
            None => row.to_string(),
        });
        for (column, &pos) in columns.iter_mut().zip(&data_cols) {
            column.push(record.get(pos).unwrap_or_default().into());
        }
    }
    debug!("read {} compositions in {} column(s)", index.len(), data_cols.len());

    let mut table = CompositionTable::new(index);
    for (&pos, values) in data_cols.iter().zip(columns) {
        table = table.with_column(&headers[pos], values)?;
    }
    Ok(table)
}

/// Write `frame` as CSV: an `index` column followed by the frame's labels.
///
/// NaN is written as `NaN`; a kept failure is written as its error message.
///
/// # Errors
///
/// CSV or I/O errors from the writer.
pub fn write_descriptor_csv(writer: impl Write, frame: &DescriptorFrame) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(std::iter::once("index").chain(frame.labels().iter().map(String::as_str)))?;

    for (label, cells) in frame.index().iter().zip(frame.cells().rows()) {
        let mut record = Vec::with_capacity(cells.len() + 1);
        record.push(label.clone());
        record.extend(cells.iter().map(|cell| match cell {
            Cell::Value(v) if v.is_nan() => "NaN".to_string(),
            other => other.to_string(),
        }));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read numeric feature columns and a target column from a CSV file.
///
/// Returns `(descriptors, targets)`, with `descriptors` shaped
/// (n_samples x n_features). See [`crate::models::to_ndarrays`] to convert.
///
/// ```no_run
/// use compdesc::data_io::read_csv_descriptors;
/// let (x, y) = read_csv_descriptors("data/volumes.csv", &["ave:atomic_weight", "max:period"], "volume")?;
/// # Ok::<(), compdesc::DescriptorError>(())
/// ```
pub fn read_csv_descriptors<P: AsRef<Path>>(
    path: P,
    feature_cols: &[&str],
    target_col: &str,
) -> Result<(Vec<Vec<f64>>, Vec<f64>)> {
    let file = std::fs::File::open(path)?;
    read_csv_descriptors_from_reader(file, feature_cols, target_col)
}

/// Like [`read_csv_descriptors`], from any reader.
pub fn read_csv_descriptors_from_reader(
    reader: impl Read,
    feature_cols: &[&str],
    target_col: &str,
) -> Result<(Vec<Vec<f64>>, Vec<f64>)> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();

    let feature_idxs = feature_cols
        .iter()
        .map(|col| find_column(&headers, col))
        .collect::<Result<Vec<usize>>>()?;
    let target_idx = find_column(&headers, target_col)?;

    let mut descriptors = Vec::new();
    let mut targets = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let row = feature_idxs
            .iter()
            .map(|&idx| parse_field(&record, idx, &headers))
            .collect::<Result<Vec<f64>>>()?;
        targets.push(parse_field(&record, target_idx, &headers)?);
        descriptors.push(row);
    }
    Ok((descriptors, targets))
}

fn find_column(headers: &StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| DescriptorError::ConfigError(format!("column '{name}' not found in CSV headers")))
}

fn parse_field(record: &StringRecord, idx: usize, headers: &StringRecord) -> Result<f64> {
    let column = headers.get(idx).unwrap_or_default();
    let raw = record
        .get(idx)
        .ok_or_else(|| DescriptorError::ComputationError(format!("missing field '{column}'")))?;
    raw.trim().parse().map_err(|e| {
        DescriptorError::ComputationError(format!("failed to parse '{raw}' in column '{column}': {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::ErrorKind;
    use ndarray::Array2;
    use std::sync::Arc;

    #[test]
    fn read_csv_from_reader_example() {
        let data = "ave:atomic_weight,max:period,volume\n31.94, 4, 60.2\n29.22, 3, 44.9\n";
        let (x, y) = read_csv_descriptors_from_reader(data.as_bytes(), &["ave:atomic_weight", "max:period"], "volume")
            .unwrap();
        assert_eq!(x.len(), 2);
        assert_eq!(x[0].len(), 2);
        assert!((x[0][0] - 31.94).abs() < 1e-9);
        assert!((y[1] - 44.9).abs() < 1e-9);
    }

    #[test]
    fn missing_columns_are_config_errors() {
        let data = "a,b\n1,2\n";
        let err = read_csv_descriptors_from_reader(data.as_bytes(), &["a"], "c").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        let err = read_csv_compositions(data.as_bytes(), Some("id")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn compositions_without_index_are_numbered() {
        let table = read_csv_compositions("formula\nFe2O3\n NaCl \n".as_bytes(), None).unwrap();
        assert_eq!(table.index(), &["0".to_string(), "1".to_string()]);
        let column = table.column("formula").unwrap();
        assert_eq!(column[1].to_string(), "NaCl");
    }

    #[test]
    fn frame_is_written_with_index_and_markers() {
        let mut cells = Array2::from_elem((2, 2), Cell::Value(1.5));
        cells[[1, 0]] = Cell::Value(f64::NAN);
        cells[[1, 1]] = Cell::Failed(Arc::new(crate::frame::ErrorRecord {
            row: 1,
            label: Some("b".into()),
            featurizer: "MaxPooling".into(),
            error: DescriptorError::UnknownElement("Xx".into()),
        }));
        let frame = DescriptorFrame::new(
            vec!["a".into(), "b".into()],
            vec!["max:x".into(), "max:y".into()],
            cells,
            Vec::new(),
        )
        .unwrap();

        let mut out = Vec::new();
        write_descriptor_csv(&mut out, &frame).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "index,max:x,max:y");
        assert_eq!(lines[1], "a,1.5,1.5");
        assert_eq!(lines[2], "b,NaN,unknown element: Xx");
    }

    #[test]
    fn descriptors_round_trip_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.csv");
        std::fs::write(&path, "x,y\n1,2\n3,4\n").unwrap();
        let (x, y) = read_csv_descriptors(&path, &["x"], "y").unwrap();
        assert_eq!(x, vec![vec![1.0], vec![3.0]]);
        assert_eq!(y, vec![2.0, 4.0]);

        let err = read_csv_descriptors(dir.path().join("missing.csv"), &["x"], "y").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
