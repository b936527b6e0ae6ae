/// Near-duplicate removal across tables.
///
/// ```text
///   primary names          reference names (registry + surveillance)
///        │                          │
///        ▼                          ▼
///   ┌──────────┐              ┌──────────────┐
///   │  names   │  tokenize →  │ ReferencePool │  bucketed by token count
///   └──────────┘              └──────────────┘
///        │                          │
///        └──────────┬───────────────┘
///                   ▼
///             ┌──────────┐
///             │  fuzzy   │  per-token best ratio, weakest must pass
///             └──────────┘
///                   │
///                   ▼
///             ┌───────────┐
///             │ partition │  kept rows / removed rows + matched name
///             └───────────┘
/// ```

pub mod fuzzy;
pub mod names;
pub mod partition;
