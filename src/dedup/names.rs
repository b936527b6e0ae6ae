use std::collections::BTreeSet;

use crate::data::model::CellValue;

// ---------------------------------------------------------------------------
// Name normalisation
// ---------------------------------------------------------------------------

/// Canonical form of a facility name: the set of its lowercase words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTokens(BTreeSet<String>);

impl NameTokens {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Lowercase, trim and split on whitespace. Repeated words collapse.
pub fn tokenize(name: &str) -> NameTokens {
    NameTokens(
        name.trim()
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect(),
    )
}

/// Missing cells (null or NaN) are not comparable and yield `None`.
/// Non-text cells are compared through their text form.
pub fn normalize_name(value: &CellValue) -> Option<NameTokens> {
    if value.is_missing() {
        return None;
    }
    match value {
        CellValue::String(s) => Some(tokenize(s)),
        other => Some(tokenize(&other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// NameRecord – a name and the row it came from
// ---------------------------------------------------------------------------

/// A facility name taken from one row of a table, normalised once.
#[derive(Debug, Clone)]
pub struct NameRecord {
    pub name: CellValue,
    pub row: usize,
    tokens: Option<NameTokens>,
}

impl NameRecord {
    pub fn new(name: CellValue, row: usize) -> Self {
        let tokens = normalize_name(&name);
        NameRecord { name, row, tokens }
    }

    /// `None` when the name is missing.
    pub fn tokens(&self) -> Option<&NameTokens> {
        self.tokens.as_ref()
    }
}
