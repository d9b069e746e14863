//! Data files for Scenebuild. Build definitions and component tables load
//! from RON, TOML or JSON by extension; preferences are TOML. [`FsStorage`]
//! keeps scene assets on disk.

pub mod components;
pub mod definition;
pub mod fs_storage;
pub mod loader;
pub mod prefs;

pub use components::{default_component_registry, find_component_table, load_component_registry};
pub use definition::BuildDefinition;
pub use fs_storage::FsStorage;
pub use loader::{DataLoadError, Format};
pub use prefs::Preferences;
