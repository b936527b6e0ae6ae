use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use log::info;
use parquet::arrow::ArrowWriter;
use rust_xlsxwriter::{Format, Workbook};

use super::model::{CellValue, Table, DATETIME_DISPLAY_FORMAT};
use crate::error::SiftError;

/// Sheet name used when none is given.
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Persist `table` to `path`, choosing the format by extension:
/// * `.xlsx` – one worksheet named `sheet_name` (or `Sheet1`)
/// * `.csv`  – comma separated, header first
/// * `.parquet` – one column per table column, types inferred from cells
///
/// Missing parent directories are created. No row-number column is written.
pub fn save_table(
    table: &Table,
    path: &Path,
    sheet_name: Option<&str>,
) -> crate::error::Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    if !matches!(ext.as_str(), "xlsx" | "csv" | "parquet" | "pq") {
        return Err(SiftError::UnsupportedFormat(ext));
    }

    create_parent_dirs(path)
        .and_then(|_| match ext.as_str() {
            "xlsx" => write_xlsx(table, path, sheet_name.unwrap_or(DEFAULT_SHEET_NAME)),
            "csv" => write_csv(table, path),
            _ => write_parquet(table, path),
        })
        .map_err(|e| SiftError::WriteFailure {
            path: path.to_path_buf(),
            reason: format!("{e:#}"),
        })?;

    info!("wrote {} rows to {}", table.len(), path.display());
    Ok(())
}

/// `dir/name.ext` → `dir/name_backup.csv`.
pub fn backup_path(source: &Path) -> PathBuf {
    sibling_path(source, "_backup", "csv")
}

/// `dir/name.ext` → `dir/name<suffix>.<ext>`.
pub fn sibling_path(source: &Path, suffix: &str, ext: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!("{stem}{suffix}.{ext}"))
}

/// Write the untouched source table next to the original as a CSV backup.
pub fn write_backup(table: &Table, source: &Path) -> crate::error::Result<PathBuf> {
    let path = backup_path(source);
    save_table(table, &path, None)?;
    Ok(path)
}

fn create_parent_dirs(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.exists() => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating directory {}", dir.display()))
        }
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// CSV writer
// ---------------------------------------------------------------------------

fn write_csv(table: &Table, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating CSV file")?;
    writer
        .write_record(table.columns())
        .context("writing CSV header")?;
    for (row_no, row) in table.rows().iter().enumerate() {
        writer
            .write_record(row.iter().map(|cell| cell.to_string()))
            .with_context(|| format!("writing CSV row {row_no}"))?;
    }
    writer.flush().context("flushing CSV file")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// XLSX writer
// ---------------------------------------------------------------------------

fn write_xlsx(table: &Table, path: &Path, sheet_name: &str) -> Result<()> {
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
    let header_format = Format::new().set_bold();

    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(sheet_name)
        .with_context(|| format!("naming sheet '{sheet_name}'"))?;

    for (col, name) in table.columns().iter().enumerate() {
        let col = xlsx_col(col)?;
        worksheet
            .write_string_with_format(0, col, name, &header_format)
            .context("writing header")?;
    }

    for (row_idx, row) in table.rows().iter().enumerate() {
        let xrow = u32::try_from(row_idx + 1).context("too many rows for a worksheet")?;
        for (col, cell) in row.iter().enumerate() {
            let xcol = xlsx_col(col)?;
            match cell {
                CellValue::String(s) => {
                    worksheet.write_string(xrow, xcol, s)?;
                }
                CellValue::Integer(i) => {
                    worksheet.write_number(xrow, xcol, *i as f64)?;
                }
                CellValue::Float(f) if f.is_finite() => {
                    worksheet.write_number(xrow, xcol, *f)?;
                }
                CellValue::Float(_) | CellValue::Null => {}
                CellValue::Bool(b) => {
                    worksheet.write_boolean(xrow, xcol, *b)?;
                }
                CellValue::Date(d) => {
                    worksheet.write_datetime_with_format(xrow, xcol, d, &date_format)?;
                }
            }
        }
    }

    workbook.save(path).context("saving workbook")?;
    Ok(())
}

fn xlsx_col(col: usize) -> Result<u16> {
    u16::try_from(col).context("too many columns for a worksheet")
}

// ---------------------------------------------------------------------------
// Parquet writer
// ---------------------------------------------------------------------------

/// Column type for a parquet column, decided from the non-null cells.
fn infer_type(cells: &[&CellValue]) -> DataType {
    let mut kinds = cells.iter().filter(|c| !c.is_missing());
    let Some(first) = kinds.next() else {
        return DataType::Utf8;
    };
    let mut ty = match first {
        CellValue::Integer(_) => DataType::Int64,
        CellValue::Float(_) => DataType::Float64,
        CellValue::Bool(_) => DataType::Boolean,
        CellValue::Date(_) => DataType::Timestamp(TimeUnit::Millisecond, None),
        _ => DataType::Utf8,
    };
    for cell in kinds {
        ty = match (&ty, cell) {
            (DataType::Int64, CellValue::Integer(_)) => DataType::Int64,
            (DataType::Int64 | DataType::Float64, CellValue::Integer(_) | CellValue::Float(_)) => {
                DataType::Float64
            }
            (DataType::Boolean, CellValue::Bool(_)) => DataType::Boolean,
            (DataType::Timestamp(..), CellValue::Date(_)) => ty.clone(),
            _ => return DataType::Utf8,
        };
    }
    ty
}

fn build_array(cells: &[&CellValue], ty: &DataType) -> ArrayRef {
    match ty {
        DataType::Int64 => Arc::new(Int64Array::from(
            cells
                .iter()
                .map(|c| match c {
                    CellValue::Integer(i) => Some(*i),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        DataType::Float64 => Arc::new(Float64Array::from(
            cells.iter().map(|c| c.as_f64()).collect::<Vec<_>>(),
        )),
        DataType::Boolean => Arc::new(BooleanArray::from(
            cells
                .iter()
                .map(|c| match c {
                    CellValue::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        DataType::Timestamp(..) => Arc::new(TimestampMillisecondArray::from(
            cells
                .iter()
                .map(|c| c.as_date().map(|d| d.and_utc().timestamp_millis()))
                .collect::<Vec<_>>(),
        )),
        _ => Arc::new(StringArray::from(
            cells
                .iter()
                .map(|c| match c {
                    CellValue::Null => None,
                    CellValue::Date(d) => Some(d.format(DATETIME_DISPLAY_FORMAT).to_string()),
                    other => Some(other.to_string()),
                })
                .collect::<Vec<_>>(),
        )),
    }
}

fn write_parquet(table: &Table, path: &Path) -> Result<()> {
    let mut fields = Vec::with_capacity(table.columns().len());
    let mut arrays = Vec::with_capacity(table.columns().len());

    for (idx, name) in table.columns().iter().enumerate() {
        let cells: Vec<&CellValue> = table.rows().iter().map(|row| &row[idx]).collect();
        let ty = infer_type(&cells);
        arrays.push(build_array(&cells, &ty));
        fields.push(Field::new(name, ty, true));
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays).context("building record batch")?;

    let file = File::create(path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}
