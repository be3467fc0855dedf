//! Tab-separated table I/O shared by all PEtab tables
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum TableError {
    /// Error reported by the TSV reader or writer
    #[error("CSV error: {0}")]
    CsvError(String),
    /// Error while accessing a file
    #[error("I/O error for {path}: {message}")]
    IoError { path: String, message: String },
    /// A header cell carries surrounding whitespace
    #[error("Whitespace around column name `{column}` in {table} table")]
    HeaderWhitespace { table: String, column: String },
    /// A mandatory column is missing
    #[error("{table} table missing mandatory field {column}")]
    MissingColumn { table: String, column: String },
    /// A row could not be converted into its typed representation
    #[error("Invalid row {row} in {table} table: {message}")]
    InvalidRow {
        table: String,
        row: usize,
        message: String,
    },
    /// A cell value is not allowed in its column
    #[error("Invalid value `{value}` in column {column}: {reason}")]
    InvalidValue {
        column: String,
        value: String,
        reason: String,
    },
    /// One or more identifiers are not valid PEtab identifiers
    #[error("Invalid {kind} ID(s): {ids:?}")]
    InvalidIds { kind: String, ids: Vec<String> },
    /// An identifier occurs more than once
    #[error("Duplicate {kind} ID(s): {ids:?}")]
    DuplicateIds { kind: String, ids: Vec<String> },
    /// A formula cell could not be parsed
    #[error("Invalid formula in column {column}: {source}")]
    InvalidFormula {
        column: String,
        #[source]
        source: crate::math::MathError,
    },
    /// Lookup of an unknown identifier
    #[error("{kind} ID {id} not found")]
    NotFound { kind: String, id: String },
}

impl From<csv::Error> for TableError {
    fn from(e: csv::Error) -> Self {
        TableError::CsvError(e.to_string())
    }
}

/// An untyped table: a header row and string cells
///
/// Missing cells are represented by empty strings. Every typed PEtab table is
/// read through a [RawTable] and written back as one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        RawTable {
            headers,
            rows: Vec::new(),
        }
    }

    /// Read a tab-separated table from any reader
    ///
    /// Header cells must not carry leading or trailing whitespace. `table`
    /// names the table in error messages.
    pub fn from_reader<R: Read>(reader: R, table: &str) -> Result<Self, TableError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        assert_no_leading_trailing_whitespace(&headers, table)?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row: Vec<String> = record.iter().map(String::from).collect();
            // Short rows are padded, trailing empty cells are often dropped by editors
            row.resize(headers.len(), String::new());
            rows.push(row);
        }
        Ok(RawTable { headers, rows })
    }

    pub fn from_path(path: impl AsRef<Path>, table: &str) -> Result<Self, TableError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| TableError::IoError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_reader(file, table)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    /// Fail if any of `columns` is absent
    pub fn require_columns(&self, columns: &[&str], table: &str) -> Result<(), TableError> {
        match columns.iter().find(|c| !self.has_column(c)) {
            Some(missing) => Err(TableError::MissingColumn {
                table: table.to_string(),
                column: missing.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// The cell in `row` for `column`, `None` if the column is missing or the cell is empty
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows
            .get(row)
            .and_then(|r| r.get(idx))
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        let mut row = row;
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    /// Deserialize every row into `T`, using the header row as field names
    pub fn deserialize<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>, TableError> {
        let headers = StringRecord::from(self.headers.clone());
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                StringRecord::from(row.clone())
                    .deserialize(Some(&headers))
                    .map_err(|e| TableError::InvalidRow {
                        table: table.to_string(),
                        row: i,
                        message: e.to_string(),
                    })
            })
            .collect()
    }

    /// Write the table as tab-separated values
    pub fn to_writer<W: Write>(&self, writer: W) -> Result<(), TableError> {
        let mut writer = WriterBuilder::new().delimiter(b'\t').from_writer(writer);
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush().map_err(|e| TableError::IoError {
            path: "<writer>".to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Write the table to `path`, creating the parent directory if necessary
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), TableError> {
        let path = path.as_ref();
        let io_err = |e: std::io::Error| TableError::IoError {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = File::create(path).map_err(io_err)?;
        self.to_writer(file)
    }
}

/// A PEtab table that can be read from and written to TSV
pub trait TsvTable: Sized {
    /// Table name used in error messages
    const TABLE: &'static str;

    fn from_raw(raw: &RawTable) -> Result<Self, TableError>;

    fn to_raw(&self) -> RawTable;

    fn from_reader<R: Read>(reader: R) -> Result<Self, TableError> {
        Self::from_raw(&RawTable::from_reader(reader, Self::TABLE)?)
    }

    fn from_path(path: impl AsRef<Path>) -> Result<Self, TableError> {
        Self::from_raw(&RawTable::from_path(path, Self::TABLE)?)
    }

    /// Read and concatenate several files of the same table type
    fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Self, TableError>
    where
        Self: Default + Extend<Self>,
    {
        let mut table = Self::default();
        for path in paths {
            table.extend(std::iter::once(Self::from_path(path)?));
        }
        Ok(table)
    }

    fn to_writer<W: Write>(&self, writer: W) -> Result<(), TableError> {
        self.to_raw().to_writer(writer)
    }

    fn to_path(&self, path: impl AsRef<Path>) -> Result<(), TableError> {
        self.to_raw().to_path(path)
    }
}

/// Fail if any of the given column names has leading or trailing whitespace
pub fn assert_no_leading_trailing_whitespace(
    names: &[String],
    table: &str,
) -> Result<(), TableError> {
    match names.iter().find(|n| n.trim() != n.as_str()) {
        Some(name) => Err(TableError::HeaderWhitespace {
            table: table.to_string(),
            column: name.clone(),
        }),
        None => Ok(()),
    }
}

/// Parse a float cell, accepting `inf`, `-inf` and `nan` in any case
pub fn parse_float(s: &str) -> Option<f64> {
    f64::from_str(s.trim()).ok()
}

/// Format a float for writing, the inverse of [parse_float]
pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v == f64::INFINITY {
        "inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        v.to_string()
    }
}

pub(crate) fn format_option_float(v: Option<f64>) -> String {
    v.map(format_float).unwrap_or_default()
}

/// Deserialize Option<T> from a cell, empty cells become `None`
pub(crate) fn deserialize_option<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => T::from_str(s.trim()).map(Some).map_err(serde::de::Error::custom),
    }
}

pub(crate) fn deserialize_option_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_option::<f64, D>(deserializer)
}

pub(crate) fn deserialize_option_string<'de, D>(
    deserializer: D,
) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_option::<String, D>(deserializer)
}

/// Deserialize a mandatory float cell
pub(crate) fn deserialize_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_float(&s).ok_or_else(|| serde::de::Error::custom(format!("expected a number, got `{}`", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Row {
        observable_id: String,
        #[serde(deserialize_with = "deserialize_f64")]
        time: f64,
        #[serde(default, deserialize_with = "deserialize_option_string")]
        dataset_id: Option<String>,
    }

    #[test]
    fn test_read_and_deserialize() {
        let tsv = "observableId\ttime\tdatasetId\nobs1\t1.5\t\nobs2\tinf\td1\n";
        let raw = RawTable::from_reader(tsv.as_bytes(), "measurement").unwrap();
        assert_eq!(raw.len(), 2);
        let rows: Vec<Row> = raw.deserialize("measurement").unwrap();
        assert_eq!(rows[0].observable_id, "obs1");
        assert_eq!(rows[0].time, 1.5);
        assert_eq!(rows[0].dataset_id, None);
        assert!(rows[1].time.is_infinite());
        assert_eq!(rows[1].dataset_id.as_deref(), Some("d1"));
    }

    #[test]
    fn test_header_whitespace_is_rejected() {
        let tsv = "observableId\t time\nobs1\t1\n";
        assert!(matches!(
            RawTable::from_reader(tsv.as_bytes(), "measurement"),
            Err(TableError::HeaderWhitespace { .. })
        ));
    }

    #[test]
    fn test_missing_optional_column_uses_default() {
        let tsv = "observableId\ttime\nobs1\t2\n";
        let raw = RawTable::from_reader(tsv.as_bytes(), "measurement").unwrap();
        let rows: Vec<Row> = raw.deserialize("measurement").unwrap();
        assert_eq!(rows[0].dataset_id, None);
    }

    #[test]
    fn test_float_parsing_and_formatting() {
        assert_eq!(parse_float("INF"), Some(f64::INFINITY));
        assert_eq!(parse_float("-inf"), Some(f64::NEG_INFINITY));
        assert!(parse_float("NaN").unwrap().is_nan());
        assert_eq!(parse_float("k1"), None);
        assert_eq!(format_float(2.0), "2");
        assert_eq!(format_float(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("table.tsv");
        let mut raw = RawTable::new(vec!["a".to_string(), "b".to_string()]);
        raw.push_row(vec!["1".to_string()]);
        raw.to_path(&path).unwrap();
        let read = RawTable::from_path(&path, "test").unwrap();
        assert_eq!(read, raw);
    }
}
