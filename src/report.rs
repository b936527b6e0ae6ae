use std::fmt;
use std::path::PathBuf;

use comfy_table::{presets::UTF8_FULL_CONDENSED, Table as ConsoleTable};
use log::warn;

use crate::data::model::{CellValue, Representation, Table};
use crate::dedup::partition::MatchResult;

// ---------------------------------------------------------------------------
// Previews
// ---------------------------------------------------------------------------

/// Render the first `rows` rows of `table` as a console table.
pub fn render_preview(table: &Table, rows: usize) -> String {
    let mut console = ConsoleTable::new();
    console.load_preset(UTF8_FULL_CONDENSED);
    console.set_header(table.columns());
    for row in table.head(rows).rows() {
        console.add_row(row.iter().map(|cell| match cell {
            CellValue::Null => "<null>".to_string(),
            other => other.to_string(),
        }));
    }
    console.to_string()
}

fn bracketed<T: fmt::Display>(items: impl IntoIterator<Item = T>) -> String {
    let joined: Vec<String> = items.into_iter().map(|i| i.to_string()).collect();
    format!("[{}]", joined.join(", "))
}

// ---------------------------------------------------------------------------
// Filter report
// ---------------------------------------------------------------------------

/// Distinct values of one column after filtering.
#[derive(Debug, Clone)]
pub enum ColumnSummary {
    Values { column: String, values: Vec<CellValue> },
    Dates { column: String, dates: Vec<chrono::NaiveDate> },
}

/// What the filter command prints once it's done.
#[derive(Debug, Clone)]
pub struct FilterReport {
    pub input_rows: usize,
    pub output_rows: usize,
    pub output_path: Option<PathBuf>,
    pub preview: String,
    pub columns: Vec<ColumnSummary>,
}

impl FilterReport {
    /// Columns absent from `table` are skipped with a warning. Columns held
    /// as dates are summarised by calendar day.
    pub fn new(
        table: &Table,
        input_rows: usize,
        output_path: Option<PathBuf>,
        report_columns: &[String],
        preview_rows: usize,
    ) -> Self {
        let mut columns = Vec::new();
        for column in report_columns {
            let summary = if table.representation(column) == Some(Representation::Date) {
                table.unique_dates(column).map(|dates| ColumnSummary::Dates {
                    column: column.clone(),
                    dates: dates.into_iter().collect(),
                })
            } else {
                table.unique_values(column).map(|values| ColumnSummary::Values {
                    column: column.clone(),
                    values: values.into_iter().collect(),
                })
            };
            match summary {
                Ok(summary) => columns.push(summary),
                Err(e) => warn!("skipping report column: {e}"),
            }
        }

        FilterReport {
            input_rows,
            output_rows: table.len(),
            output_path,
            preview: render_preview(table, preview_rows),
            columns,
        }
    }
}

impl fmt::Display for FilterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = &self.output_path {
            writeln!(f, "Filtered data saved to {}", path.display())?;
        }
        writeln!(
            f,
            "\nFound {} rows matching all conditions (of {})",
            self.output_rows, self.input_rows
        )?;
        writeln!(f, "\nFirst few rows of filtered data:\n{}", self.preview)?;
        for summary in &self.columns {
            match summary {
                ColumnSummary::Values { column, values } => {
                    writeln!(f, "\nUnique values in {column} column:\n{}", bracketed(values))?;
                }
                ColumnSummary::Dates { column, dates } => {
                    writeln!(f, "\nUnique dates in {column} column:\n{}", bracketed(dates))?;
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dedup report
// ---------------------------------------------------------------------------

/// What the dedup command prints once it's done.
#[derive(Debug, Clone)]
pub struct DedupReport {
    pub key_column: String,
    pub original_rows: usize,
    pub kept_rows: usize,
    pub matches: Vec<MatchResult>,
    pub removed_path: Option<PathBuf>,
    pub backup_path: PathBuf,
    pub filtered_path: PathBuf,
}

impl fmt::Display for DedupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = &self.key_column;
        if let Some(path) = &self.removed_path {
            writeln!(f, "\nRemoved facilities saved to: {}", path.display())?;
        }
        if !self.matches.is_empty() {
            writeln!(f, "\nRemoved the following {key}s:")?;
            for m in &self.matches {
                writeln!(f, "- {} (matched with: {})", m.removed.name, m.matched_with)?;
            }
        }
        writeln!(f, "\nBackup created: {}", self.backup_path.display())?;
        writeln!(f, "\nFiltered responses saved to: {}", self.filtered_path.display())?;
        writeln!(f, "\nTotal removed: {} similar {key}s", self.matches.len())?;
        write!(
            f,
            "Filtered responses file contains {} entries (from {})",
            self.kept_rows, self.original_rows
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::names::NameRecord;
    use chrono::NaiveDate;

    fn table() -> Table {
        Table::new(
            "fse.xlsx",
            vec!["Zone".into(), "Timestamp".into()],
            vec![
                vec!["6B".into(), "06/02/2025".into()],
                vec!["6A".into(), "05/02/2025".into()],
                vec!["6A".into(), "05/02/2025".into()],
            ],
        )
    }

    #[test]
    fn filter_report_lists_sorted_values_and_dates() {
        let mut table = table();
        table.coerce_to_date("Timestamp", "%d/%m/%Y").unwrap();
        let report = FilterReport::new(
            &table,
            10,
            Some(PathBuf::from("out/filtered.xlsx")),
            &["Zone".to_string(), "Timestamp".to_string(), "Region".to_string()],
            2,
        );

        assert_eq!(report.columns.len(), 2);
        let ColumnSummary::Dates { dates, .. } = &report.columns[1] else {
            panic!("Timestamp should be summarised as dates");
        };
        assert_eq!(
            dates,
            &vec![
                NaiveDate::from_ymd_opt(2025, 2, 5).unwrap(),
                NaiveDate::from_ymd_opt(2025, 2, 6).unwrap()
            ]
        );

        let text = report.to_string();
        assert!(text.contains("Filtered data saved to out/filtered.xlsx"));
        assert!(text.contains("Found 3 rows matching all conditions (of 10)"));
        assert!(text.contains("Unique values in Zone column:\n[6A, 6B]"));
        assert!(text.contains("Unique dates in Timestamp column:\n[2025-02-05, 2025-02-06]"));
    }

    #[test]
    fn preview_is_limited_and_shows_nulls() {
        let table = Table::new(
            "t",
            vec!["Name".into()],
            vec![vec!["first".into()], vec![CellValue::Null], vec!["third".into()]],
        );
        let preview = render_preview(&table, 2);
        assert!(preview.contains("first"));
        assert!(preview.contains("<null>"));
        assert!(!preview.contains("third"));
    }

    #[test]
    fn dedup_report_lists_matches() {
        let report = DedupReport {
            key_column: "NAME OF FACILITY".into(),
            original_rows: 3,
            kept_rows: 2,
            matches: vec![MatchResult {
                removed: NameRecord::new("ABC Hospital".into(), 0),
                matched_with: "abc hospital ".into(),
                reference_table: "registry.xlsx".into(),
            }],
            removed_path: Some(PathBuf::from("removed.xlsx")),
            backup_path: PathBuf::from("responses_backup.csv"),
            filtered_path: PathBuf::from("responses_filtered.xlsx"),
        };
        let text = report.to_string();
        assert!(text.contains("- ABC Hospital (matched with: abc hospital )"));
        assert!(text.contains("Total removed: 1 similar NAME OF FACILITYs"));
        assert!(text.contains("Filtered responses file contains 2 entries (from 3)"));
    }
}
