use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Result, SiftError};

/// Rendering used when a date cell is turned into text.
pub const DATETIME_DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---------------------------------------------------------------------------
// CellValue – a single cell of a table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell mirroring the dtypes a spreadsheet export carries.
/// Ordered so it can live in `BTreeSet`s for distinct-value reports.
#[derive(Debug, Clone)]
pub enum CellValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDateTime),
    Null,
}

/// Runtime tag of a [`CellValue`], used in type-mismatch messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Integer,
    Float,
    Bool,
    Date,
    Null,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Text => "text",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::Bool => "bool",
            ValueKind::Date => "date",
            ValueKind::Null => "null",
        };
        f.write_str(name)
    }
}

// -- Manual Eq/Ord so we can put CellValue in BTreeSet --

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for CellValue {}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use CellValue::*;
        fn discriminant(v: &CellValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
                Date(_) => 5,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for CellValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::String(s) => s.hash(state),
            CellValue::Integer(i) => i.hash(state),
            CellValue::Float(f) => f.to_bits().hash(state),
            CellValue::Bool(b) => b.hash(state),
            CellValue::Date(d) => d.hash(state),
            CellValue::Null => {}
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::String(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            // Debug keeps the trailing ".0" on whole floats ("6.0", not "6").
            CellValue::Float(v) => write!(f, "{v:?}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Date(d) => write!(f, "{}", d.format(DATETIME_DISPLAY_FORMAT)),
            CellValue::Null => Ok(()),
        }
    }
}

impl CellValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            CellValue::String(_) => ValueKind::Text,
            CellValue::Integer(_) => ValueKind::Integer,
            CellValue::Float(_) => ValueKind::Float,
            CellValue::Bool(_) => ValueKind::Bool,
            CellValue::Date(_) => ValueKind::Date,
            CellValue::Null => ValueKind::Null,
        }
    }

    /// Null cells and NaN floats are both "missing".
    pub fn is_missing(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Float(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Try to interpret the value as an `f64` for numeric comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(v) => Some(*v),
            CellValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            CellValue::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Integer(i)
    }
}

impl From<i32> for CellValue {
    fn from(i: i32) -> Self {
        CellValue::Integer(i64::from(i))
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(d: NaiveDateTime) -> Self {
        CellValue::Date(d)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(d: NaiveDate) -> Self {
        CellValue::Date(d.and_time(NaiveTime::MIN))
    }
}

/// Parse `text` with a strftime-style `format`, accepting formats with or
/// without a time component. Returns `None` on any mismatch.
pub fn parse_date(text: &str, format: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, format)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, format)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

// ---------------------------------------------------------------------------
// Table – rows of cells under named columns
// ---------------------------------------------------------------------------

/// Representation a column has been rewritten into by a coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Representation {
    Text,
    Date,
}

/// One loaded sheet: ordered rows, every row holding exactly one cell per
/// column.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
    /// column name → representation it was last coerced into.
    coerced: HashMap<String, Representation>,
}

impl Table {
    /// Build a table, padding short rows with nulls and truncating long ones
    /// so every row matches the header.
    pub fn new(name: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, CellValue::Null);
                row
            })
            .collect();
        Table {
            name: name.into(),
            columns,
            rows,
            coerced: HashMap::new(),
        }
    }

    /// Name used in error messages (usually the source file name).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Position of `column`, or `ColumnNotFound` naming this table.
    pub fn column_index(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| SiftError::ColumnNotFound {
                column: column.to_string(),
                table: self.name.clone(),
            })
    }

    /// All cells of one column, in row order.
    pub fn column(&self, column: &str) -> Result<Vec<&CellValue>> {
        let idx = self.column_index(column)?;
        Ok(self.rows.iter().map(|row| &row[idx]).collect())
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&CellValue> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// Keep the rows whose mask entry is `true`. Coercion state carries over.
    pub fn filter(&self, mask: &[bool]) -> Table {
        let rows = self
            .rows
            .iter()
            .zip(mask)
            .filter(|(_, keep)| **keep)
            .map(|(row, _)| row.clone())
            .collect();
        self.with_rows(rows)
    }

    /// Subset of rows by position, in the order given.
    pub fn select(&self, indices: &[usize]) -> Table {
        let rows = indices
            .iter()
            .filter_map(|&i| self.rows.get(i).cloned())
            .collect();
        self.with_rows(rows)
    }

    /// First `n` rows.
    pub fn head(&self, n: usize) -> Table {
        self.with_rows(self.rows.iter().take(n).cloned().collect())
    }

    /// Copy of this table with one extra column appended.
    pub fn with_column(&self, column: impl Into<String>, values: Vec<CellValue>) -> Table {
        let mut columns = self.columns.clone();
        columns.push(column.into());
        let mut values = values.into_iter();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                row.push(values.next().unwrap_or(CellValue::Null));
                row
            })
            .collect();
        Table {
            name: self.name.clone(),
            columns,
            rows,
            coerced: self.coerced.clone(),
        }
    }

    fn with_rows(&self, rows: Vec<Vec<CellValue>>) -> Table {
        Table {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows,
            coerced: self.coerced.clone(),
        }
    }

    /// Representation `column` was last coerced into, if any.
    pub fn representation(&self, column: &str) -> Option<Representation> {
        self.coerced.get(column).copied()
    }

    /// Rewrite `column` as text. Nulls stay null. No-op when the column is
    /// already held as text.
    pub fn coerce_to_text(&mut self, column: &str) -> Result<()> {
        let idx = self.column_index(column)?;
        if self.representation(column) == Some(Representation::Text) {
            return Ok(());
        }
        for row in &mut self.rows {
            let cell = &mut row[idx];
            if cell.is_missing() {
                *cell = CellValue::Null;
            } else if !matches!(cell, CellValue::String(_)) {
                *cell = CellValue::String(cell.to_string());
            }
        }
        self.coerced.insert(column.to_string(), Representation::Text);
        Ok(())
    }

    /// Rewrite `column` as dates, parsing text with `format`. Cells that are
    /// already dates are kept; anything that fails to parse becomes null.
    /// No-op when the column is already held as dates, whatever the format.
    pub fn coerce_to_date(&mut self, column: &str, format: &str) -> Result<()> {
        let idx = self.column_index(column)?;
        if self.representation(column) == Some(Representation::Date) {
            return Ok(());
        }
        for row in &mut self.rows {
            let cell = &mut row[idx];
            let parsed = match cell {
                CellValue::Date(d) => Some(*d),
                CellValue::String(s) => parse_date(s, format),
                _ => None,
            };
            *cell = parsed.map_or(CellValue::Null, CellValue::Date);
        }
        self.coerced.insert(column.to_string(), Representation::Date);
        Ok(())
    }

    /// Sorted set of distinct values in `column`.
    pub fn unique_values(&self, column: &str) -> Result<BTreeSet<CellValue>> {
        Ok(self.column(column)?.into_iter().cloned().collect())
    }

    /// Sorted set of distinct calendar dates in `column`; non-date cells are
    /// skipped.
    pub fn unique_dates(&self, column: &str) -> Result<BTreeSet<NaiveDate>> {
        Ok(self
            .column(column)?
            .into_iter()
            .filter_map(|cell| cell.as_date().map(|d| d.date()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zones() -> Table {
        Table::new(
            "zones.csv",
            vec!["Zone".into(), "Count".into()],
            vec![
                vec!["6A".into(), 3.into()],
                vec!["6B".into(), CellValue::Float(2.0)],
                vec!["7A".into()],
            ],
        )
    }

    #[test]
    fn short_rows_are_padded_with_null() {
        let table = zones();
        assert_eq!(table.cell(2, 1), Some(&CellValue::Null));
        assert!(table.rows().iter().all(|r| r.len() == 2));
    }

    #[test]
    fn missing_column_names_the_table() {
        let err = zones().column_index("Region").unwrap_err();
        assert_eq!(err.to_string(), "column 'Region' not found in zones.csv");
    }

    #[test]
    fn filter_keeps_masked_rows() {
        let table = zones().filter(&[true, false, true]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(1, 0), Some(&CellValue::from("7A")));
    }

    #[test]
    fn text_coercion_keeps_nulls_and_float_suffix() {
        let mut table = zones();
        table.coerce_to_text("Count").unwrap();
        let col: Vec<_> = table.column("Count").unwrap().into_iter().cloned().collect();
        assert_eq!(col, vec!["3".into(), "2.0".into(), CellValue::Null]);
        assert_eq!(table.representation("Count"), Some(Representation::Text));
    }

    #[test]
    fn date_coercion_is_idempotent() {
        let mut table = Table::new(
            "stamps",
            vec!["Timestamp".into()],
            vec![vec!["05/02/2025".into()], vec!["not a date".into()]],
        );
        table.coerce_to_date("Timestamp", "%d/%m/%Y").unwrap();
        let first: Vec<_> = table.column("Timestamp").unwrap().into_iter().cloned().collect();
        table.coerce_to_date("Timestamp", "%Y-%m-%d").unwrap();
        let second: Vec<_> = table.column("Timestamp").unwrap().into_iter().cloned().collect();

        let expected = NaiveDate::from_ymd_opt(2025, 2, 5).unwrap();
        assert_eq!(first, vec![CellValue::from(expected), CellValue::Null]);
        assert_eq!(first, second);
    }

    #[test]
    fn parse_date_accepts_time_components() {
        let parsed = parse_date("05/02/2025 14:30", "%d/%m/%Y %H:%M").unwrap();
        assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(2025, 2, 5).unwrap());
        assert!(parse_date("2025-02-05", "%d/%m/%Y").is_none());
    }

    #[test]
    fn unique_values_are_sorted_with_null_first() {
        let table = Table::new(
            "t",
            vec!["Zone".into()],
            vec![vec!["6B".into()], vec![CellValue::Null], vec!["6A".into()], vec!["6B".into()]],
        );
        let unique: Vec<_> = table.unique_values("Zone").unwrap().into_iter().collect();
        assert_eq!(unique, vec![CellValue::Null, "6A".into(), "6B".into()]);
    }

    #[test]
    fn with_column_appends_values() {
        let table = zones().with_column("Matched With", vec!["x".into()]);
        assert_eq!(table.columns().last().map(String::as_str), Some("Matched With"));
        assert_eq!(table.cell(0, 2), Some(&CellValue::from("x")));
        assert_eq!(table.cell(1, 2), Some(&CellValue::Null));
    }
}
