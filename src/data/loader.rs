use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, AsArray, BooleanArray, Date32Array, Float32Array, Float64Array, Int32Array,
    Int64Array, StringArray, TimestampMicrosecondArray, TimestampMillisecondArray,
    TimestampNanosecondArray, TimestampSecondArray,
};
use arrow::datatypes::{DataType, TimeUnit};
use calamine::{open_workbook_auto, Data, Range, Reader};
use log::{debug, warn};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::model::{CellValue, Table};
use crate::error::SiftError;

// ---------------------------------------------------------------------------
// Load options
// ---------------------------------------------------------------------------

/// Where the header sits and which sheet to read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Zero-based row holding the column names; rows above it are skipped.
    pub header_row: usize,
    /// Sheet to read from a workbook. `None` reads the first sheet.
    pub sheet: Option<String>,
}

impl LoadOptions {
    pub fn with_header_row(header_row: usize) -> Self {
        LoadOptions {
            header_row,
            sheet: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv` / `.tsv` / `.txt` – delimited text, header at `header_row`
/// * `.json`    – `[{ "col": value, ... }, ...]`
/// * `.parquet` – any flat Parquet file
/// * anything else is opened as a workbook (xlsx, xlsm, xlsb, xls, ods)
///
/// A missing path is reported as `FileNotFound`; every other failure is
/// folded into `ParseFailure` with the full context chain.
pub fn load_table(path: &Path, options: &LoadOptions) -> crate::error::Result<Table> {
    if !path.exists() {
        return Err(SiftError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let result = match ext.as_str() {
        "csv" | "txt" => load_delimited(path, b',', options.header_row),
        "tsv" => load_delimited(path, b'\t', options.header_row),
        "json" => load_json(path),
        "parquet" | "pq" => load_parquet(path),
        _ => load_workbook(path, options),
    };

    let (columns, rows) = result.map_err(|e| SiftError::ParseFailure {
        path: path.to_path_buf(),
        reason: format!("{e:#}"),
    })?;

    debug!(
        "loaded {} rows x {} columns from {}",
        rows.len(),
        columns.len(),
        path.display()
    );
    Ok(Table::new(table_name(path), columns, rows))
}

fn table_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

type RawTable = (Vec<String>, Vec<Vec<CellValue>>);

// ---------------------------------------------------------------------------
// Header helpers
// ---------------------------------------------------------------------------

/// Blank headers become `Unnamed: <i>`, repeats get a `.1`, `.2`, ... suffix.
fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    raw.into_iter()
        .enumerate()
        .map(|(i, h)| {
            let base = if h.trim().is_empty() {
                format!("Unnamed: {i}")
            } else {
                h
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{base}.{count}")
            };
            *count += 1;
            name
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Delimited-text loader
// ---------------------------------------------------------------------------

/// Rows above `header_row` are skipped, the header row names the columns and
/// every later record becomes a row. Each column gets one type, picked from
/// all of its cells.
fn load_delimited(path: &Path, delimiter: u8, header_row: usize) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context("opening delimited file")?;

    let mut records = reader.records().skip(header_row);

    let headers: Vec<String> = match records.next() {
        Some(record) => record
            .context("reading header row")?
            .iter()
            .map(|h| h.to_string())
            .collect(),
        None => bail!("no header row at line {}", header_row + 1),
    };

    let mut raw: Vec<Vec<String>> = Vec::new();
    for (row_no, result) in records.enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        raw.push(record.iter().map(str::to_string).collect());
    }

    let width = raw.iter().map(Vec::len).max().unwrap_or(0).max(headers.len());
    let types: Vec<ColumnType> = (0..width)
        .map(|col| ColumnType::infer(raw.iter().filter_map(|row| row.get(col))))
        .collect();

    let rows = raw
        .into_iter()
        .map(|row| {
            row.iter()
                .zip(&types)
                .map(|(text, ty)| ty.cell(text))
                .collect()
        })
        .collect();

    Ok((normalize_headers(headers), rows))
}

/// Type shared by every cell of a delimited column. Empty cells don't vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Integer,
    Float,
    Bool,
    Text,
}

impl ColumnType {
    fn infer<'a>(cells: impl Iterator<Item = &'a String>) -> ColumnType {
        let filled: Vec<&str> = cells.map(String::as_str).filter(|s| !s.is_empty()).collect();
        if filled.is_empty() {
            ColumnType::Text
        } else if filled.iter().all(|s| s.parse::<i64>().is_ok()) {
            ColumnType::Integer
        } else if filled.iter().all(|s| s.parse::<f64>().is_ok()) {
            ColumnType::Float
        } else if filled.iter().all(|s| parse_bool(s).is_some()) {
            ColumnType::Bool
        } else {
            ColumnType::Text
        }
    }

    fn cell(self, text: &str) -> CellValue {
        if text.is_empty() {
            return CellValue::Null;
        }
        let typed = match self {
            ColumnType::Integer => text.parse().ok().map(CellValue::Integer),
            ColumnType::Float => text.parse().ok().map(CellValue::Float),
            ColumnType::Bool => parse_bool(text).map(CellValue::Bool),
            ColumnType::Text => None,
        };
        typed.unwrap_or_else(|| CellValue::String(text.to_string()))
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Workbook loader
// ---------------------------------------------------------------------------

/// Read the requested sheet (or the first one). If that read fails, retry
/// with the first sheet listed in the workbook before giving up.
fn load_workbook(path: &Path, options: &LoadOptions) -> Result<RawTable> {
    let mut workbook = open_workbook_auto(path).context("opening workbook")?;
    let sheet_names = workbook.sheet_names();

    let range = read_with_fallback(path, options.sheet.as_deref(), &sheet_names, |sheet| {
        match sheet {
            Some(name) => workbook
                .worksheet_range(name)
                .with_context(|| format!("reading sheet '{name}'")),
            None => match workbook.worksheet_range_at(0) {
                Some(range) => range.context("reading default sheet"),
                None => Err(anyhow::anyhow!("workbook has no sheets")),
            },
        }
    })?;

    range_to_rows(&range, options.header_row)
}

/// `read(None)` reads the first sheet by position, `read(Some(name))` by
/// name. A failed first read is retried once on `sheet_names[0]`; if that
/// fails too the error names both attempts.
fn read_with_fallback<T>(
    path: &Path,
    requested: Option<&str>,
    sheet_names: &[String],
    mut read: impl FnMut(Option<&str>) -> Result<T>,
) -> Result<T> {
    let first_err = match read(requested) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };
    let sheet_name = sheet_names
        .first()
        .with_context(|| format!("{first_err:#}; workbook has no sheets to fall back to"))?;
    warn!(
        "{}: {first_err:#}; falling back to sheet '{sheet_name}'",
        path.display()
    );
    read(Some(sheet_name.as_str())).with_context(|| {
        format!("first attempt: {first_err:#}; second attempt on sheet '{sheet_name}'")
    })
}

/// `header_row` counts from the top of the sheet, not from the first used
/// cell, so leading blank rows still count.
fn range_to_rows(range: &Range<Data>, header_row: usize) -> Result<RawTable> {
    let first_used_row = range.start().map_or(0, |(row, _)| row as usize);
    let skip = header_row.saturating_sub(first_used_row);

    let mut rows_iter = range.rows().skip(skip);
    let headers: Vec<String> = match rows_iter.next() {
        Some(header) => header.iter().map(header_text).collect(),
        None => bail!("no header row at row {}", header_row + 1),
    };

    let rows = rows_iter
        .map(|row| row.iter().map(workbook_cell).collect())
        .collect();

    Ok((normalize_headers(headers), rows))
}

fn header_text(cell: &Data) -> String {
    match workbook_cell(cell) {
        CellValue::Null => String::new(),
        other => other.to_string(),
    }
}

fn workbook_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Int(i) => CellValue::Integer(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::String(s) if s.is_empty() => CellValue::Null,
        Data::String(s) => CellValue::String(s.clone()),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => dt.as_datetime().map_or(CellValue::Null, CellValue::Date),
        Data::DateTimeIso(s) => chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .map(CellValue::Date)
            .unwrap_or_else(|_| CellValue::String(s.clone())),
        Data::DurationIso(s) => CellValue::String(s.clone()),
        Data::Error(_) | Data::Empty => CellValue::Null,
    }
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, the default `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "NAME OF FACILITY": "ABC Hospital", "Beds": 40 },
///   ...
/// ]
/// ```
///
/// Columns are taken in first-seen order; keys absent from a record are null.
fn load_json(path: &Path) -> Result<RawTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut columns: Vec<String> = Vec::new();
    let mut parsed: Vec<BTreeMap<String, CellValue>> = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let mut cells = BTreeMap::new();
        for (key, val) in obj {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
            cells.insert(key.clone(), json_to_cell(val));
        }
        parsed.push(cells);
    }

    let rows = parsed
        .into_iter()
        .map(|mut cells| {
            columns
                .iter()
                .map(|c| cells.remove(c).unwrap_or(CellValue::Null))
                .collect()
        })
        .collect();

    Ok((columns, rows))
}

/// Map a JSON scalar onto a cell. Arrays and objects are kept as their JSON
/// text.
pub fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::String(s) => CellValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                CellValue::Float(f)
            } else {
                CellValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Null => CellValue::Null,
        other => CellValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a flat Parquet file. Works with files written by both **Pandas**
/// (`df.to_parquet()`) and **Polars** (`df.write_parquet()`).
fn load_parquet(path: &Path) -> Result<RawTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let columns: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for row in 0..batch.num_rows() {
            rows.push(
                batch
                    .columns()
                    .iter()
                    .map(|col| arrow_cell(col, row))
                    .collect(),
            );
        }
    }

    Ok((columns, rows))
}

/// Extract a single cell from an Arrow column at a given row. Unsupported
/// types are rendered through their Debug name.
fn arrow_cell(col: &Arc<dyn Array>, row: usize) -> CellValue {
    if col.is_null(row) {
        return CellValue::Null;
    }
    let any = col.as_any();
    let cell = match col.data_type() {
        DataType::Utf8 => any
            .downcast_ref::<StringArray>()
            .map(|a| CellValue::String(a.value(row).to_string())),
        DataType::LargeUtf8 => Some(CellValue::String(
            col.as_string::<i64>().value(row).to_string(),
        )),
        DataType::Int32 => any
            .downcast_ref::<Int32Array>()
            .map(|a| CellValue::Integer(i64::from(a.value(row)))),
        DataType::Int64 => any
            .downcast_ref::<Int64Array>()
            .map(|a| CellValue::Integer(a.value(row))),
        DataType::Float32 => any
            .downcast_ref::<Float32Array>()
            .map(|a| CellValue::Float(f64::from(a.value(row)))),
        DataType::Float64 => any
            .downcast_ref::<Float64Array>()
            .map(|a| CellValue::Float(a.value(row))),
        DataType::Boolean => any
            .downcast_ref::<BooleanArray>()
            .map(|a| CellValue::Bool(a.value(row))),
        DataType::Date32 => any
            .downcast_ref::<Date32Array>()
            .and_then(|a| a.value_as_date(row))
            .map(CellValue::from),
        DataType::Timestamp(unit, _) => match unit {
            TimeUnit::Second => any
                .downcast_ref::<TimestampSecondArray>()
                .and_then(|a| a.value_as_datetime(row)),
            TimeUnit::Millisecond => any
                .downcast_ref::<TimestampMillisecondArray>()
                .and_then(|a| a.value_as_datetime(row)),
            TimeUnit::Microsecond => any
                .downcast_ref::<TimestampMicrosecondArray>()
                .and_then(|a| a.value_as_datetime(row)),
            TimeUnit::Nanosecond => any
                .downcast_ref::<TimestampNanosecondArray>()
                .and_then(|a| a.value_as_datetime(row)),
        }
        .map(CellValue::Date),
        _ => None,
    };
    cell.unwrap_or_else(|| CellValue::String(format!("{:?}", col.data_type())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn missing_file_is_not_a_parse_failure() {
        let err = load_table(Path::new("/nonexistent/responses.csv"), &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, SiftError::FileNotFound { .. }));
    }

    #[test]
    fn csv_cells_are_typed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "t.csv", "a,b,c,d\n1,2.5,true,x\n,,False,\n");
        let table = load_table(&path, &LoadOptions::default()).unwrap();

        assert_eq!(table.name(), "t.csv");
        assert_eq!(table.columns(), ["a", "b", "c", "d"]);
        assert_eq!(
            table.rows()[0],
            vec![
                CellValue::Integer(1),
                CellValue::Float(2.5),
                CellValue::Bool(true),
                CellValue::from("x")
            ]
        );
        assert_eq!(
            table.rows()[1],
            vec![CellValue::Null, CellValue::Null, CellValue::Bool(false), CellValue::Null]
        );
    }

    #[test]
    fn csv_column_with_any_text_stays_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "t.csv", "Zone,Beds\n6,4\n6A,\n7,2.5\n");
        let table = load_table(&path, &LoadOptions::default()).unwrap();

        assert_eq!(
            table.column("Zone").unwrap(),
            vec![&CellValue::from("6"), &CellValue::from("6A"), &CellValue::from("7")]
        );
        assert_eq!(
            table.column("Beds").unwrap(),
            vec![&CellValue::Float(4.0), &CellValue::Null, &CellValue::Float(2.5)]
        );
    }

    #[test]
    fn missing_sheet_falls_back_to_first_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.xlsx");
        let table = Table::new(
            "registry",
            vec!["NAME OF FACILITY".into()],
            vec![vec!["ABC Hospital".into()]],
        );
        crate::data::writer::save_table(&table, &path, Some("Data")).unwrap();

        let options = LoadOptions {
            header_row: 0,
            sheet: Some("Nope".into()),
        };
        let loaded = load_table(&path, &options).unwrap();
        assert_eq!(loaded.columns(), ["NAME OF FACILITY"]);
        assert_eq!(loaded.cell(0, 0), Some(&CellValue::from("ABC Hospital")));
    }

    #[test]
    fn failed_fallback_names_both_attempts() {
        let sheets = vec!["Data".to_string()];
        let mut attempts = Vec::new();
        let err = read_with_fallback(Path::new("registry.xlsx"), Some("Nope"), &sheets, |sheet| {
            attempts.push(sheet.map(str::to_string));
            Err::<(), _>(anyhow::anyhow!("cannot read {sheet:?}"))
        })
        .unwrap_err();

        assert_eq!(attempts, vec![Some("Nope".to_string()), Some("Data".to_string())]);
        let reason = format!("{err:#}");
        assert!(reason.contains("first attempt: cannot read Some(\"Nope\")"));
        assert!(reason.contains("second attempt on sheet 'Data'"));
        assert!(reason.contains("cannot read Some(\"Data\")"));
    }

    #[test]
    fn no_sheets_to_fall_back_to() {
        let err = read_with_fallback(Path::new("empty.xlsx"), None, &[], |_| {
            Err::<(), _>(anyhow::anyhow!("workbook has no sheets"))
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("no sheets to fall back to"));
    }

    #[test]
    fn csv_header_offset_skips_preamble() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "t.csv", "Report\nGenerated today\nNAME,,NAME\nA,B,C\n");
        let table = load_table(&path, &LoadOptions::with_header_row(2)).unwrap();

        assert_eq!(table.columns(), ["NAME", "Unnamed: 1", "NAME.1"]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn json_records_fill_missing_keys_with_null() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "t.json", r#"[{"name": "A", "beds": 4}, {"name": "B"}]"#);
        let table = load_table(&path, &LoadOptions::default()).unwrap();

        assert_eq!(table.columns(), ["beds", "name"]);
        assert_eq!(table.cell(1, 0), Some(&CellValue::Null));
    }

    #[test]
    fn garbage_workbook_is_a_parse_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "registry.xlsx", "this is not a zip archive");
        let err = load_table(&path, &LoadOptions::default()).unwrap_err();
        match err {
            SiftError::ParseFailure { path: failed, .. } => assert_eq!(failed, path),
            other => panic!("expected ParseFailure, got {other:?}"),
        }
    }
}
