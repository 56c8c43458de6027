/// Data layer: the dataset collaborator and its loaders.
///
/// Architecture:
/// ```text
///  .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → Dataset (subsample, normalise)
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │   Dataset     │  DatasetId, n × p (× t) array, variable names
///   └──────────────┘
///        │
///        ▼
///   ┌──────────────────┐
///   │ ComputationCache  │  keyed by DatasetId, never by contents
///   └──────────────────┘
/// ```

pub mod loader;
pub mod model;

pub use loader::{load_file, LoadOptions};
pub use model::{Dataset, DatasetId};
