use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::data::filter::{
    Comparison, FilterCondition, FilterGroup, FilterItem, FilterValue, OrderingPolicy,
};
use crate::data::loader::{json_to_cell, LoadOptions};
use crate::dedup::fuzzy::DEDUP_DEFAULT_THRESHOLD;
use crate::error::{Result, SiftError};

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// A table on disk plus how to read it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceConfig {
    pub path: PathBuf,
    #[serde(flatten)]
    pub options: LoadOptions,
}

impl SourceConfig {
    pub fn new(path: impl Into<PathBuf>, header_row: usize) -> Self {
        SourceConfig {
            path: path.into(),
            options: LoadOptions::with_header_row(header_row),
        }
    }
}

// ---------------------------------------------------------------------------
// Filter files
// ---------------------------------------------------------------------------

fn default_comparison() -> Comparison {
    Comparison::Equals
}

/// One condition as written in a filter file:
///
/// ```json
/// { "column": "Timestamp", "condition": "date_equals", "value": "05/02/2025" }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionSpec {
    pub column: String,
    #[serde(default = "default_comparison")]
    pub condition: Comparison,
    pub value: JsonValue,
    #[serde(default)]
    pub date_format: Option<String>,
    #[serde(default)]
    pub ordering: OrderingPolicy,
}

/// A top-level filter entry: a condition, or `{ "any_of": [...] }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FilterItemSpec {
    Group { any_of: Vec<ConditionSpec> },
    Condition(ConditionSpec),
}

/// Everything the filter command can take from a file. Only `filters` is
/// needed; a file holding just the array of filters is accepted too.
/// Unknown keys are rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    pub input: Option<SourceConfig>,
    pub output: Option<PathBuf>,
    pub sheet_name: Option<String>,
    /// Applied to date conditions that don't name a format.
    pub date_format: Option<String>,
    /// Columns whose distinct values are reported after filtering.
    pub report_columns: Vec<String>,
    pub filters: Vec<FilterItemSpec>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FilterFile {
    Full(FilterConfig),
    Bare(Vec<FilterItemSpec>),
}

impl ConditionSpec {
    fn to_condition(&self, default_date_format: Option<&str>) -> FilterCondition {
        let value = match &self.value {
            JsonValue::Array(items) => FilterValue::List(items.iter().map(json_to_cell).collect()),
            other => FilterValue::Single(json_to_cell(other)),
        };
        let mut condition =
            FilterCondition::new(self.column.clone(), self.condition, value).with_ordering(self.ordering);
        if self.condition.is_date() {
            if let Some(format) = self.date_format.as_deref().or(default_date_format) {
                condition = condition.with_date_format(format);
            }
        }
        condition
    }
}

impl FilterConfig {
    /// The filter expression with file-level defaults applied.
    pub fn filter_items(&self) -> Vec<FilterItem> {
        let default_format = self.date_format.as_deref();
        self.filters
            .iter()
            .map(|spec| match spec {
                FilterItemSpec::Condition(c) => c.to_condition(default_format).into(),
                FilterItemSpec::Group { any_of } => FilterGroup::new(
                    any_of.iter().map(|c| c.to_condition(default_format)).collect(),
                )
                .into(),
            })
            .collect()
    }
}

/// Read a filter file (full config object or bare array of filters).
pub fn load_filter_config(path: &Path) -> Result<FilterConfig> {
    Ok(match read_json::<FilterFile>(path)? {
        FilterFile::Full(config) => config,
        FilterFile::Bare(filters) => FilterConfig {
            filters,
            ..FilterConfig::default()
        },
    })
}

// ---------------------------------------------------------------------------
// Dedup job
// ---------------------------------------------------------------------------

/// Settings for the de-duplication job. Defaults describe the survey
/// clean-up it was written for.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Table rows are removed from.
    pub primary: SourceConfig,
    /// Tables whose names count as already known.
    pub references: Vec<SourceConfig>,
    pub key_column: String,
    pub threshold: u32,
    /// Removed rows plus the name each one matched.
    pub removed_output: PathBuf,
    /// Kept rows. Defaults to `<primary stem>_filtered.xlsx`.
    pub filtered_output: Option<PathBuf>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        DedupConfig {
            primary: SourceConfig::new("spreadsheets/responses.csv", 0),
            references: vec![
                SourceConfig::new("spreadsheets/registry.xlsx", 2),
                SourceConfig::new("spreadsheets/surveillance.xlsx", 12),
            ],
            key_column: "NAME OF FACILITY".to_string(),
            threshold: u32::from(DEDUP_DEFAULT_THRESHOLD),
            removed_output: PathBuf::from("spreadsheets/removed_facilities.xlsx"),
            filtered_output: None,
        }
    }
}

pub fn load_dedup_config(path: &Path) -> Result<DedupConfig> {
    read_json(path)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SiftError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => SiftError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    })?;
    serde_json::from_str(&text).map_err(|e| SiftError::Config {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::CellValue;

    fn parse(json: &str) -> FilterConfig {
        match serde_json::from_str::<FilterFile>(json).unwrap() {
            FilterFile::Full(c) => c,
            FilterFile::Bare(filters) => FilterConfig {
                filters,
                ..FilterConfig::default()
            },
        }
    }

    #[test]
    fn full_filter_file() {
        let config = parse(
            r#"{
                "input": { "path": "spreadsheets/fse.xlsx", "header_row": 1 },
                "output": "spreadsheets/filtered/filtered_data.xlsx",
                "report_columns": ["Zone/Zonal Council"],
                "filters": [
                    { "column": "Zone/Zonal Council", "condition": "starts_with", "value": "6" },
                    { "any_of": [
                        { "column": "Timestamp", "condition": "date_equals", "value": "05/02/2025" },
                        { "column": "Timestamp", "condition": "date_equals", "value": "2025-02-06",
                          "date_format": "%Y-%m-%d" }
                    ] }
                ]
            }"#,
        );

        let input = config.input.clone().unwrap();
        assert_eq!(input.options.header_row, 1);
        assert_eq!(config.report_columns, vec!["Zone/Zonal Council"]);

        let items = config.filter_items();
        assert_eq!(
            items[0],
            FilterItem::Condition(FilterCondition::starts_with("Zone/Zonal Council", "6"))
        );
        let FilterItem::Group(group) = &items[1] else {
            panic!("expected a group");
        };
        assert_eq!(group.conditions[0].date_format, "%d/%m/%Y");
        assert_eq!(group.conditions[1].date_format, "%Y-%m-%d");
    }

    #[test]
    fn bare_array_with_defaults() {
        let config = parse(
            r#"[
                { "column": "Zone", "value": 6 },
                { "column": "Zone", "condition": "in", "value": ["6A", 7] },
                { "column": "Beds", "condition": "greater_than", "value": "5", "ordering": "coerce_numeric" }
            ]"#,
        );
        let items = config.filter_items();
        assert_eq!(items[0], FilterItem::from(FilterCondition::equals("Zone", 6)));
        assert_eq!(
            items[1],
            FilterItem::from(FilterCondition::is_in(
                "Zone",
                [CellValue::from("6A"), CellValue::from(7)]
            ))
        );
        assert_eq!(
            items[2],
            FilterItem::from(
                FilterCondition::greater_than("Beds", "5").with_ordering(OrderingPolicy::CoerceNumeric)
            )
        );
    }

    #[test]
    fn unknown_condition_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.json");
        std::fs::write(&path, r#"[{ "column": "Zone", "condition": "like", "value": "6" }]"#).unwrap();
        assert!(matches!(load_filter_config(&path), Err(SiftError::Config { .. })));
        assert!(matches!(
            load_filter_config(&dir.path().join("missing.json")),
            Err(SiftError::FileNotFound { .. })
        ));
    }

    #[test]
    fn misspelt_filter_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.json");
        std::fs::write(
            &path,
            r#"{ "output": "out.xlsx", "filter": [{ "column": "Zone", "value": "6" }] }"#,
        )
        .unwrap();
        assert!(matches!(load_filter_config(&path), Err(SiftError::Config { .. })));
    }

    #[test]
    fn dedup_defaults_and_overrides() {
        let defaults = DedupConfig::default();
        assert_eq!(defaults.threshold, 75);
        assert_eq!(defaults.references[1].options.header_row, 12);

        let config: DedupConfig = serde_json::from_str(
            r#"{ "primary": { "path": "a.csv" }, "threshold": 90, "key_column": "Facility" }"#,
        )
        .unwrap();
        assert_eq!(config.primary, SourceConfig::new("a.csv", 0));
        assert_eq!(config.threshold, 90);
        assert_eq!(config.references, defaults.references);
    }
}
