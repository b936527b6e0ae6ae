/// Data layer: table model, loading, filtering and writing.
///
/// Architecture:
/// ```text
///  .xlsx / .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader  │  parse file → Table
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  Table   │  columns, rows of CellValue, coercion memo
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter  │  conditions / OR-groups → mask → row subset
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  writer  │  Table → .xlsx / .csv / .parquet
///   └──────────┘
/// ```

pub mod filter;
pub mod loader;
pub mod model;
pub mod writer;
