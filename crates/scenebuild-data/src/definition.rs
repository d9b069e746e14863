//! Build definitions: the persisted description of one build.

use crate::loader::{DataLoadError, deserialize_file};
use scenebuild_core::pipeline::BuildRequest;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One build as stored on disk.
///
/// ```ron
/// (
///     name: "Level 1",
///     fragments: [Some("Scenes/Base.ron"), Some("Scenes/Forest.ron"), None],
///     main_index: 0,
///     output_path: "Built/Level1.scene",
///     unpack_prefabs: true,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildDefinition {
    #[serde(default)]
    pub name: String,
    /// Fragment asset references; `None` is an empty slot.
    pub fragments: Vec<Option<String>>,
    #[serde(default)]
    pub main_index: usize,
    #[serde(default)]
    pub output_path: String,
    #[serde(default)]
    pub unpack_prefabs: bool,
}

impl BuildDefinition {
    /// Load a definition from a RON, TOML or JSON file. An unnamed
    /// definition takes the file stem as its name.
    pub fn load(path: &Path) -> Result<Self, DataLoadError> {
        let mut def: Self = deserialize_file(path)?;
        if def.name.is_empty() {
            def.name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
        }
        Ok(def)
    }

    /// Whether the build can be started at all. Mirrors the check the
    /// pipeline repeats before starting.
    pub fn can_build(&self) -> bool {
        !self.output_path.trim().is_empty()
    }

    pub fn to_request(&self) -> BuildRequest {
        BuildRequest {
            name: self.name.clone(),
            fragments: self.fragments.clone(),
            main_index: self.main_index,
            output_path: self.output_path.clone(),
            unpack_prefabs: self.unpack_prefabs,
        }
    }
}

impl From<BuildDefinition> for BuildRequest {
    fn from(def: BuildDefinition) -> Self {
        BuildRequest {
            name: def.name,
            fragments: def.fragments,
            main_index: def.main_index,
            output_path: def.output_path,
            unpack_prefabs: def.unpack_prefabs,
        }
    }
}
