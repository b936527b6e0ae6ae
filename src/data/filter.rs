use std::cmp::Ordering;

use chrono::{NaiveDate, NaiveDateTime};
use log::debug;
use serde::{Deserialize, Serialize};

use super::model::{parse_date, CellValue, Table};
use crate::error::{Result, SiftError};

/// Date format assumed when a condition does not name one.
pub const DEFAULT_DATE_FORMAT: &str = "%d/%m/%Y";

// ---------------------------------------------------------------------------
// Filter expression types
// ---------------------------------------------------------------------------

/// How a single condition compares a cell against its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Equals,
    Contains,
    StartsWith,
    In,
    GreaterThan,
    LessThan,
    DateEquals,
    DateGreater,
    DateLess,
}

impl Comparison {
    pub fn is_date(self) -> bool {
        matches!(
            self,
            Comparison::DateEquals | Comparison::DateGreater | Comparison::DateLess
        )
    }
}

/// What `greater_than` / `less_than` do when a text cell meets a number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingPolicy {
    /// Text against number is a `TypeMismatch`.
    #[default]
    Strict,
    /// Text cells are parsed as numbers; cells that don't parse never match.
    CoerceNumeric,
}

/// Right-hand side of a condition: one value, or a list for `in`.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Single(CellValue),
    List(Vec<CellValue>),
}

macro_rules! single_value_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FilterValue {
                fn from(value: $ty) -> Self {
                    FilterValue::Single(value.into())
                }
            }
        )*
    };
}

single_value_from!(CellValue, &str, String, i64, i32, f64, bool, NaiveDate, NaiveDateTime);

impl<T: Into<CellValue>> FromIterator<T> for FilterValue {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        FilterValue::List(iter.into_iter().map(Into::into).collect())
    }
}

/// One predicate over one column.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    pub column: String,
    pub comparison: Comparison,
    pub value: FilterValue,
    /// strftime-style format used by the `date_*` comparisons.
    pub date_format: String,
    pub ordering: OrderingPolicy,
}

impl FilterCondition {
    pub fn new(column: impl Into<String>, comparison: Comparison, value: impl Into<FilterValue>) -> Self {
        FilterCondition {
            column: column.into(),
            comparison,
            value: value.into(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            ordering: OrderingPolicy::Strict,
        }
    }

    pub fn equals(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(column, Comparison::Equals, value)
    }

    pub fn contains(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(column, Comparison::Contains, value)
    }

    pub fn starts_with(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(column, Comparison::StartsWith, value)
    }

    pub fn is_in<T: Into<CellValue>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = T>,
    ) -> Self {
        Self::new(column, Comparison::In, values.into_iter().collect::<FilterValue>())
    }

    pub fn greater_than(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(column, Comparison::GreaterThan, value)
    }

    pub fn less_than(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(column, Comparison::LessThan, value)
    }

    pub fn date_equals(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(column, Comparison::DateEquals, value)
    }

    pub fn date_greater(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(column, Comparison::DateGreater, value)
    }

    pub fn date_less(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(column, Comparison::DateLess, value)
    }

    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    pub fn with_ordering(mut self, ordering: OrderingPolicy) -> Self {
        self.ordering = ordering;
        self
    }
}

/// Conditions combined with OR.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterGroup {
    pub conditions: Vec<FilterCondition>,
}

impl FilterGroup {
    pub fn new(conditions: Vec<FilterCondition>) -> Self {
        FilterGroup { conditions }
    }
}

/// One top-level element of a filter expression. Elements are combined
/// with AND.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterItem {
    Condition(FilterCondition),
    Group(FilterGroup),
}

impl From<FilterCondition> for FilterItem {
    fn from(c: FilterCondition) -> Self {
        FilterItem::Condition(c)
    }
}

impl From<FilterGroup> for FilterItem {
    fn from(g: FilterGroup) -> Self {
        FilterItem::Group(g)
    }
}

/// One boolean per row.
pub type Mask = Vec<bool>;

// ---------------------------------------------------------------------------
// Condition evaluation
// ---------------------------------------------------------------------------

/// Evaluate one condition against every row of `table`.
///
/// Text and date comparisons coerce the column in place first; the table
/// remembers the coercion so later conditions on the same column reuse it.
pub fn evaluate_condition(table: &mut Table, condition: &FilterCondition) -> Result<Mask> {
    let idx = table.column_index(&condition.column)?;
    let column = condition.column.as_str();

    let mask = match condition.comparison {
        Comparison::Equals => {
            let value = single_value(condition)?;
            column_mask(table, idx, |cell| values_equal(cell, value))
        }
        Comparison::In => {
            let FilterValue::List(values) = &condition.value else {
                return Err(SiftError::TypeMismatch {
                    column: column.to_string(),
                    detail: "'in' needs a list of values".to_string(),
                });
            };
            column_mask(table, idx, |cell| values.iter().any(|v| values_equal(cell, v)))
        }
        Comparison::Contains | Comparison::StartsWith => {
            let needle = single_value(condition)?.to_string();
            table.coerce_to_text(column)?;
            let prefix_only = condition.comparison == Comparison::StartsWith;
            column_mask(table, idx, |cell| match cell {
                CellValue::String(s) if prefix_only => s.starts_with(&needle),
                CellValue::String(s) => s.contains(&needle),
                _ => false,
            })
        }
        Comparison::GreaterThan | Comparison::LessThan => {
            let value = single_value(condition)?;
            let wanted = if condition.comparison == Comparison::GreaterThan {
                Ordering::Greater
            } else {
                Ordering::Less
            };
            let mut mask = Vec::with_capacity(table.len());
            for row in table.rows() {
                let ord = compare_ordered(&row[idx], value, condition.ordering, column)?;
                mask.push(ord == Some(wanted));
            }
            mask
        }
        Comparison::DateEquals | Comparison::DateGreater | Comparison::DateLess => {
            let target = target_date(condition)?;
            table.coerce_to_date(column, &condition.date_format)?;
            let wanted = match condition.comparison {
                Comparison::DateGreater => Ordering::Greater,
                Comparison::DateLess => Ordering::Less,
                _ => Ordering::Equal,
            };
            column_mask(table, idx, |cell| {
                cell.as_date()
                    .is_some_and(|d| d.date().cmp(&target) == wanted)
            })
        }
    };

    debug!(
        "{:?} on '{}' kept {} of {} rows",
        condition.comparison,
        column,
        mask.iter().filter(|m| **m).count(),
        mask.len()
    );
    Ok(mask)
}

fn column_mask(table: &Table, idx: usize, pred: impl Fn(&CellValue) -> bool) -> Mask {
    table.rows().iter().map(|row| pred(&row[idx])).collect()
}

fn single_value(condition: &FilterCondition) -> Result<&CellValue> {
    match &condition.value {
        FilterValue::Single(v) => Ok(v),
        FilterValue::List(_) => Err(SiftError::TypeMismatch {
            column: condition.column.clone(),
            detail: format!("{:?} needs a single value, got a list", condition.comparison),
        }),
    }
}

/// Exact equality on the runtime tag. Integers and floats compare by value;
/// missing cells never equal anything.
fn values_equal(cell: &CellValue, value: &CellValue) -> bool {
    if cell.is_missing() || value.is_missing() {
        return false;
    }
    match (cell.as_f64(), value.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => cell == value,
    }
}

/// Order `cell` relative to `value`. `Ok(None)` means "does not match"
/// (missing cell, or unparsable text under `CoerceNumeric`).
fn compare_ordered(
    cell: &CellValue,
    value: &CellValue,
    policy: OrderingPolicy,
    column: &str,
) -> Result<Option<Ordering>> {
    if cell.is_missing() || value.is_missing() {
        return Ok(None);
    }
    match (cell, value) {
        (CellValue::String(a), CellValue::String(b)) => return Ok(Some(a.cmp(b))),
        (CellValue::Date(a), CellValue::Date(b)) => return Ok(Some(a.cmp(b))),
        (CellValue::Bool(a), CellValue::Bool(b)) => return Ok(Some(a.cmp(b))),
        _ => {}
    }
    if let (Some(a), Some(b)) = (cell.as_f64(), value.as_f64()) {
        return Ok(a.partial_cmp(&b));
    }
    if policy == OrderingPolicy::CoerceNumeric {
        let a = numeric_or_parsed(cell);
        let b = numeric_or_parsed(value);
        if let (Some(a), Some(b)) = (a, b) {
            return Ok(a.partial_cmp(&b));
        }
        if a.is_some() || b.is_some() {
            return Ok(None);
        }
    }
    Err(SiftError::TypeMismatch {
        column: column.to_string(),
        detail: format!("cannot order {} against {}", cell.kind(), value.kind()),
    })
}

fn numeric_or_parsed(v: &CellValue) -> Option<f64> {
    match v {
        CellValue::String(s) => s.trim().parse::<f64>().ok(),
        other => other.as_f64(),
    }
}

/// Calendar date a `date_*` condition compares against.
fn target_date(condition: &FilterCondition) -> Result<NaiveDate> {
    match single_value(condition)? {
        CellValue::Date(d) => Ok(d.date()),
        CellValue::String(s) => parse_date(s, &condition.date_format)
            .map(|d| d.date())
            .ok_or_else(|| SiftError::InvalidValue {
                column: condition.column.clone(),
                detail: format!("'{s}' does not match date format '{}'", condition.date_format),
            }),
        other => Err(SiftError::TypeMismatch {
            column: condition.column.clone(),
            detail: format!("date comparison needs a date or text value, got {}", other.kind()),
        }),
    }
}

// ---------------------------------------------------------------------------
// Expression evaluation
// ---------------------------------------------------------------------------

/// Result of running a filter expression.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    /// Combined mask over the rows of the input table.
    pub mask: Mask,
    /// Rows where `mask` is true, in input order.
    pub table: Table,
}

/// AND the top-level items together, OR the members of each group.
///
/// The working table shrinks after every item so later conditions only touch
/// surviving rows. An empty group keeps nothing; an empty expression keeps
/// everything.
pub fn apply_filters(table: Table, items: &[FilterItem]) -> Result<FilterOutcome> {
    let mut table = table;
    let original_len = table.len();
    let mut surviving: Vec<usize> = (0..original_len).collect();

    for item in items {
        let step = match item {
            FilterItem::Condition(condition) => evaluate_condition(&mut table, condition)?,
            FilterItem::Group(group) => {
                let mut group_mask = vec![false; table.len()];
                for condition in &group.conditions {
                    let m = evaluate_condition(&mut table, condition)?;
                    for (acc, hit) in group_mask.iter_mut().zip(m) {
                        *acc |= hit;
                    }
                }
                group_mask
            }
        };

        surviving = surviving
            .into_iter()
            .zip(&step)
            .filter_map(|(row, keep)| keep.then_some(row))
            .collect();
        table = table.filter(&step);
    }

    let mut mask = vec![false; original_len];
    for row in &surviving {
        mask[*row] = true;
    }

    Ok(FilterOutcome { mask, table })
}
