//! In-memory tables
//!
//! A [`Frame`] is the unit passed between pipeline stages: named columns over
//! rows of optional string cells, exactly as read from CSV. Typing happens
//! late, per column, when a stage needs numbers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single cell; `None` is a null
pub type Cell = Option<String>;

/// One load-ready row
pub type Row = Vec<Cell>;

/// A row whose width does not match the header
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Row {row} has {found} cells but the header has {expected} columns")]
pub struct RowWidthError {
    /// 1-based row number within the frame
    pub row: usize,
    pub expected: usize,
    pub found: usize,
}

/// Column-named table of string cells
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Frame {
    /// Create an empty frame with the given header
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Create a frame from a header and rows
    ///
    /// Every row must have one cell per column.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Row>) -> Result<Self, RowWidthError> {
        let mut frame = Self::new(columns);
        frame.rows.reserve(rows.len());
        for row in rows {
            frame.push_row(row)?;
        }
        Ok(frame)
    }

    /// Column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All rows
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the frame has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Append a row with one cell per column
    pub fn push_row(&mut self, row: Row) -> Result<(), RowWidthError> {
        if row.len() != self.columns.len() {
            return Err(RowWidthError {
                row: self.rows.len() + 1,
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Append all rows of another frame with the same header
    pub fn extend(&mut self, other: Frame) {
        debug_assert_eq!(self.columns, other.columns);
        self.rows.extend(other.rows);
    }

    /// Iterate the cells of one column
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = Option<&str>> {
        self.rows.iter().map(move |r| r[index].as_deref())
    }

    /// Build a left-join lookup from a key column to another column's value
    ///
    /// Keys are normalized with [`join_key`]. The first occurrence of a key
    /// wins and null keys are skipped.
    pub fn lookup(&self, key: usize, value: usize) -> HashMap<String, Option<&str>> {
        let mut map = HashMap::with_capacity(self.rows.len());
        for row in &self.rows {
            if let Some(k) = row[key].as_deref() {
                map.entry(join_key(k)).or_insert(row[value].as_deref());
            }
        }
        map
    }
}

/// Inferred numeric type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Every non-null value is an integer literal
    Integer,
    /// Every non-null value is numeric and at least one is fractional
    Float,
    /// Anything else, passed through verbatim
    Text,
}

impl ColumnType {
    /// Infer the type of a column from its non-null values
    ///
    /// An all-null column is text. Zero-padded digit strings (zip codes,
    /// account numbers) are text so their padding survives.
    pub fn infer<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Self {
        let mut seen = false;
        let mut float = false;
        for value in values.flatten() {
            seen = true;
            let value = value.trim();
            if is_zero_padded(value) {
                return Self::Text;
            }
            if value.parse::<i64>().is_ok() {
                continue;
            }
            match value.parse::<f64>() {
                Ok(v) if v.is_finite() => float = true,
                _ => return Self::Text,
            }
        }
        match (seen, float) {
            (false, _) => Self::Text,
            (true, true) => Self::Float,
            (true, false) => Self::Integer,
        }
    }
}

fn is_zero_padded(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() > 1 && bytes[0] == b'0' && bytes[1].is_ascii_digit()
}

/// Parse a cell as a float
pub fn parse_float(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a cell as an integer, accepting integral floats such as `3.0`
pub fn parse_int(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(v) = value.parse::<i64>() {
        return Some(v);
    }
    let v = parse_float(value)?;
    if v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

/// Normalize a cell used as a join key so `7` and `7.0` match
pub fn join_key(value: &str) -> String {
    match parse_int(value) {
        Some(v) => v.to_string(),
        None => value.trim().to_string(),
    }
}

/// Render a float the way the warehouse loader expects it
///
/// Shortest round-trip form, always with a fractional part (`19.0`).
pub fn format_float(value: f64) -> String {
    format!("{value:?}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[Option<&'static str>]) -> impl Iterator<Item = Option<&'static str>> {
        values.to_vec().into_iter()
    }

    #[test]
    fn test_infer_integer_with_nulls() {
        let ty = ColumnType::infer(cells(&[Some("1"), None, Some("3")]));
        assert_eq!(ty, ColumnType::Integer);
    }

    #[test]
    fn test_infer_float_when_any_fractional() {
        let ty = ColumnType::infer(cells(&[Some("1"), Some("2.5")]));
        assert_eq!(ty, ColumnType::Float);
        let ty = ColumnType::infer(cells(&[Some("10.0")]));
        assert_eq!(ty, ColumnType::Float);
    }

    #[test]
    fn test_infer_text() {
        let ty = ColumnType::infer(cells(&[Some("1"), Some("abc")]));
        assert_eq!(ty, ColumnType::Text);
        assert_eq!(ColumnType::infer(cells(&[None, None])), ColumnType::Text);
        assert_eq!(ColumnType::infer(cells(&[Some("True")])), ColumnType::Text);
    }

    #[test]
    fn test_infer_zero_padded_is_text() {
        let ty = ColumnType::infer(cells(&[Some("12345"), Some("02134")]));
        assert_eq!(ty, ColumnType::Text);
        assert_eq!(ColumnType::infer(cells(&[Some("0.5")])), ColumnType::Float);
        assert_eq!(ColumnType::infer(cells(&[Some("0")])), ColumnType::Integer);
    }

    #[test]
    fn test_parse_int_accepts_integral_float() {
        assert_eq!(parse_int("3.0"), Some(3));
        assert_eq!(parse_int(" 42 "), Some(42));
        assert_eq!(parse_int("3.5"), None);
        assert_eq!(parse_int("x"), None);
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(19.0), "19.0");
        assert_eq!(format_float(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_float(35.0 / 3.0), "11.666666666666666");
    }

    #[test]
    fn test_lookup_first_wins() {
        let frame = Frame::from_rows(
            vec!["id".into(), "v".into()],
            vec![
                vec![Some("1".into()), Some("a".into())],
                vec![Some("1.0".into()), Some("b".into())],
                vec![None, Some("c".into())],
                vec![Some(" 2 ".into()), None],
            ],
        )
        .unwrap();
        let map = frame.lookup(0, 1);
        assert_eq!(map.len(), 2);
        assert_eq!(map["1"], Some("a"));
        assert_eq!(map["2"], None);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = Frame::from_rows(
            vec!["id".into(), "v".into()],
            vec![
                vec![Some("1".into()), Some("a".into())],
                vec![Some("2".into())],
            ],
        )
        .unwrap_err();
        assert_eq!(
            err,
            RowWidthError {
                row: 2,
                expected: 2,
                found: 1
            }
        );

        let mut frame = Frame::new(vec!["id".into()]);
        assert!(frame.push_row(vec![Some("1".into()), None]).is_err());
        assert!(frame.is_empty());
        frame.push_row(vec![Some("1".into())]).unwrap();
        assert_eq!(frame.len(), 1);
    }
}
