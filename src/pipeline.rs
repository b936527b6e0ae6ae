use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::config::{DedupConfig, SourceConfig};
use crate::data::filter::{apply_filters, FilterItem, Mask};
use crate::data::loader::{load_table, LoadOptions};
use crate::data::model::Table;
use crate::data::writer::{save_table, sibling_path, write_backup};
use crate::dedup::fuzzy::FuzzyMatcher;
use crate::dedup::partition::{partition_rows, Partition, ReferencePool};
use crate::error::Result;
use crate::report::DedupReport;

/// Sheet holding the removed rows.
pub const REMOVED_SHEET: &str = "Removed Facilities";
/// Sheet holding the kept rows.
pub const FILTERED_SHEET: &str = "Filtered Responses";

// ---------------------------------------------------------------------------
// Filter pipeline
// ---------------------------------------------------------------------------

/// Load → filter → optionally save.
#[derive(Debug, Clone)]
pub struct FilterJob {
    pub input: PathBuf,
    pub load: LoadOptions,
    pub filters: Vec<FilterItem>,
    /// Nothing is written when `None`; the result is still returned.
    pub output: Option<PathBuf>,
    pub sheet_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FilterRun {
    pub input_rows: usize,
    pub mask: Mask,
    pub table: Table,
    pub output: Option<PathBuf>,
}

impl FilterJob {
    pub fn new(input: impl Into<PathBuf>, filters: Vec<FilterItem>) -> Self {
        FilterJob {
            input: input.into(),
            load: LoadOptions::default(),
            filters,
            output: None,
            sheet_name: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn run(&self) -> Result<FilterRun> {
        let table = load_table(&self.input, &self.load)?;
        let input_rows = table.len();

        let outcome = apply_filters(table, &self.filters)?;
        info!(
            "{}: {} of {} rows match {} filter items",
            self.input.display(),
            outcome.table.len(),
            input_rows,
            self.filters.len()
        );

        if let Some(output) = &self.output {
            save_table(&outcome.table, output, self.sheet_name.as_deref())?;
        }

        Ok(FilterRun {
            input_rows,
            mask: outcome.mask,
            table: outcome.table,
            output: self.output.clone(),
        })
    }
}

/// Filter one file and optionally save the surviving rows.
pub fn filter_file(input: &Path, filters: &[FilterItem], output: Option<&Path>) -> Result<Table> {
    let mut job = FilterJob::new(input, filters.to_vec());
    job.output = output.map(Path::to_path_buf);
    Ok(job.run()?.table)
}

// ---------------------------------------------------------------------------
// Dedup pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DedupRun {
    pub original: Table,
    pub partition: Partition,
    pub removed_path: Option<PathBuf>,
    pub backup_path: PathBuf,
    pub filtered_path: PathBuf,
}

impl DedupRun {
    pub fn report(&self, key_column: &str) -> DedupReport {
        DedupReport {
            key_column: key_column.to_string(),
            original_rows: self.original.len(),
            kept_rows: self.partition.kept.len(),
            matches: self.partition.matches.clone(),
            removed_path: self.removed_path.clone(),
            backup_path: self.backup_path.clone(),
            filtered_path: self.filtered_path.clone(),
        }
    }
}

/// Load every source, logging each failure, and return the first failure.
fn load_sources(sources: &[&SourceConfig]) -> Result<Vec<Table>> {
    let mut tables = Vec::with_capacity(sources.len());
    let mut first_error = None;
    for source in sources {
        match load_table(&source.path, &source.options) {
            Ok(table) => tables.push(table),
            Err(e) => {
                error!("could not read {}: {e}", source.path.display());
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(tables),
    }
}

/// Check every table for `column`, logging the columns of those missing it.
fn require_column(tables: &[Table], column: &str) -> Result<()> {
    let mut first_error = None;
    for table in tables {
        if let Err(e) = table.column_index(column) {
            warn!("columns in {}: {:?}", table.name(), table.columns());
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Drop primary rows whose name matches any reference name, writing the
/// removed rows, a backup of the primary table and the kept rows.
///
/// Nothing is written unless every source loads and carries the key column.
pub fn remove_duplicates(config: &DedupConfig) -> Result<DedupRun> {
    let matcher = FuzzyMatcher::new(config.threshold)?;

    let sources: Vec<&SourceConfig> = std::iter::once(&config.primary)
        .chain(config.references.iter())
        .collect();
    let mut tables = load_sources(&sources)?;
    require_column(&tables, &config.key_column)?;

    let primary = tables.remove(0);
    let mut pool = ReferencePool::new();
    for reference in &tables {
        pool.extend_from_table(reference, &config.key_column)?;
    }

    let partition = partition_rows(&primary, &config.key_column, &pool, &matcher)?;

    let removed_path = if partition.removed.is_empty() {
        None
    } else {
        save_table(&partition.removed, &config.removed_output, Some(REMOVED_SHEET))?;
        Some(config.removed_output.clone())
    };

    let backup_path = write_backup(&primary, &config.primary.path)?;

    let filtered_path = config
        .filtered_output
        .clone()
        .unwrap_or_else(|| sibling_path(&config.primary.path, "_filtered", "xlsx"));
    save_table(&partition.kept, &filtered_path, Some(FILTERED_SHEET))?;

    Ok(DedupRun {
        original: primary,
        partition,
        removed_path,
        backup_path,
        filtered_path,
    })
}
