use std::collections::BTreeMap;

use log::{debug, info};

use crate::data::model::{CellValue, Table};
use crate::error::Result;

use super::fuzzy::FuzzyMatcher;
use super::names::{NameRecord, NameTokens};

/// Column appended to the removed-rows table.
pub const MATCHED_WITH_COLUMN: &str = "Matched With";

// ---------------------------------------------------------------------------
// Reference pool
// ---------------------------------------------------------------------------

/// A reference name and the table it was read from.
#[derive(Debug, Clone)]
pub struct ReferenceName {
    pub record: NameRecord,
    pub table: String,
}

/// Reference names from one or more tables, in load order, bucketed by token
/// count so a lookup only scores names that can pass the size guard.
#[derive(Debug, Clone, Default)]
pub struct ReferencePool {
    names: Vec<ReferenceName>,
    /// token count → positions in `names`, ascending.
    by_token_count: BTreeMap<usize, Vec<usize>>,
}

impl ReferencePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every name in `column` of `table`. Missing names are kept in
    /// order but never indexed, since they can't match.
    pub fn extend_from_table(&mut self, table: &Table, column: &str) -> Result<()> {
        let cells = table.column(column)?;
        for (row, cell) in cells.into_iter().enumerate() {
            let record = NameRecord::new(cell.clone(), row);
            let position = self.names.len();
            if let Some(tokens) = record.tokens() {
                self.by_token_count
                    .entry(tokens.len())
                    .or_default()
                    .push(position);
            }
            self.names.push(ReferenceName {
                record,
                table: table.name().to_string(),
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// First reference name, in load order, that matches `tokens`.
    ///
    /// Gives the same answer as scanning every name in order.
    pub fn find_match(&self, tokens: &NameTokens, matcher: &FuzzyMatcher) -> Option<&ReferenceName> {
        let n = tokens.len();
        let mut candidates: Vec<usize> = self
            .by_token_count
            .range(n.saturating_sub(1)..=n + 1)
            .flat_map(|(_, positions)| positions.iter().copied())
            .collect();
        candidates.sort_unstable();

        candidates.into_iter().map(|i| &self.names[i]).find(|reference| {
            reference
                .record
                .tokens()
                .is_some_and(|other| matcher.matches(tokens, other))
        })
    }
}

// ---------------------------------------------------------------------------
// Partitioning
// ---------------------------------------------------------------------------

/// A primary row dropped because its name matched a reference name.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub removed: NameRecord,
    pub matched_with: CellValue,
    /// Table the reference name came from.
    pub reference_table: String,
}

/// Primary rows split into kept and removed.
#[derive(Debug, Clone)]
pub struct Partition {
    pub kept: Table,
    /// Removed rows with an extra [`MATCHED_WITH_COLUMN`].
    pub removed: Table,
    pub matches: Vec<MatchResult>,
}

/// Check every row of `primary` against `pool` and split the table.
pub fn partition_rows(
    primary: &Table,
    column: &str,
    pool: &ReferencePool,
    matcher: &FuzzyMatcher,
) -> Result<Partition> {
    let cells = primary.column(column)?;

    let mut kept_rows = Vec::new();
    let mut removed_rows = Vec::new();
    let mut matches = Vec::new();

    for (row, cell) in cells.into_iter().enumerate() {
        let record = NameRecord::new(cell.clone(), row);
        let found = record
            .tokens()
            .and_then(|tokens| pool.find_match(tokens, matcher));

        match found {
            Some(reference) => {
                debug!(
                    "row {row}: '{}' matched '{}' from {}",
                    record.name, reference.record.name, reference.table
                );
                removed_rows.push(row);
                matches.push(MatchResult {
                    removed: record,
                    matched_with: reference.record.name.clone(),
                    reference_table: reference.table.clone(),
                });
            }
            None => kept_rows.push(row),
        }
    }

    info!(
        "{}: {} of {} rows matched {} reference names at threshold {}",
        primary.name(),
        removed_rows.len(),
        primary.len(),
        pool.len(),
        matcher.threshold()
    );

    let matched_with = matches.iter().map(|m| m.matched_with.clone()).collect();
    Ok(Partition {
        kept: primary.select(&kept_rows),
        removed: primary
            .select(&removed_rows)
            .with_column(MATCHED_WITH_COLUMN, matched_with),
        matches,
    })
}
