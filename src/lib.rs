//! Row filtering and fuzzy de-duplication for spreadsheet exports.
//!
//! Two independent jobs share the [`Table`] model:
//!
//! * **filter** – keep the rows matching an AND-list of conditions and
//!   OR-groups ([`data::filter`]), then save them.
//! * **dedup** – drop rows of a primary table whose name fuzzily matches a
//!   name in one of several reference tables ([`dedup`]), saving the kept
//!   rows, the removed rows with what they matched, and a backup.
//!
//! ```
//! use sheet_sifter::{apply_filters, CellValue, FilterCondition, FilterGroup, FilterItem, Table};
//!
//! let table = Table::new(
//!     "fse.xlsx",
//!     vec!["Zone".into(), "Timestamp".into()],
//!     vec![
//!         vec!["6A".into(), "05/02/2025".into()],
//!         vec!["6B".into(), "07/02/2025".into()],
//!         vec!["7A".into(), "05/02/2025".into()],
//!     ],
//! );
//! let filters: Vec<FilterItem> = vec![
//!     FilterCondition::starts_with("Zone", "6").into(),
//!     FilterGroup::new(vec![
//!         FilterCondition::date_equals("Timestamp", "05/02/2025"),
//!         FilterCondition::date_equals("Timestamp", "06/02/2025"),
//!     ])
//!     .into(),
//! ];
//! let outcome = apply_filters(table, &filters).unwrap();
//! assert_eq!(outcome.table.len(), 1);
//! assert_eq!(outcome.table.cell(0, 0), Some(&CellValue::from("6A")));
//! ```

pub mod config;
pub mod data;
pub mod dedup;
pub mod error;
pub mod pipeline;
pub mod report;

pub use data::filter::{
    apply_filters, evaluate_condition, Comparison, FilterCondition, FilterGroup, FilterItem,
    FilterOutcome, FilterValue, OrderingPolicy,
};
pub use data::loader::{load_table, LoadOptions};
pub use data::model::{CellValue, Table};
pub use data::writer::save_table;
pub use dedup::fuzzy::{is_similar_name, FuzzyMatcher};
pub use error::{Result, SiftError};
pub use pipeline::{filter_file, remove_duplicates, FilterJob};
