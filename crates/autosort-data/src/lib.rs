//! Data-file loading for AutoSort: the item catalog and the sorter
//! configuration, read from RON, TOML or JSON and resolved into core types.

pub mod loader;
pub mod schema;

pub use loader::{DataLoadError, ItemCatalog, SorterData, load_sorter_data};
