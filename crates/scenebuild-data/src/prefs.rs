//! The persisted builder preference.

use crate::loader::DataLoadError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Builder preferences, stored as TOML.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Open the output scene when a build finishes.
    #[serde(default)]
    pub load_built_scene_on_finish: bool,
}

impl Preferences {
    /// Read preferences. A missing file gives the defaults.
    pub fn load(path: &Path) -> Result<Self, DataLoadError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no preferences file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&content).map_err(|e| DataLoadError::Parse {
            file: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), DataLoadError> {
        let content = toml::to_string(self).map_err(|e| DataLoadError::Write {
            file: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Flip `load_built_scene_on_finish` and write the result.
    pub fn toggle_load_built_scene(path: &Path) -> Result<Self, DataLoadError> {
        let mut prefs = Self::load(path)?;
        prefs.load_built_scene_on_finish = !prefs.load_built_scene_on_finish;
        prefs.save(path)?;
        Ok(prefs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences::load(&dir.path().join("prefs.toml")).unwrap();
        assert!(!prefs.load_built_scene_on_finish);
    }

    #[test]
    fn toggle_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/prefs.toml");
        assert!(Preferences::toggle_load_built_scene(&path).unwrap().load_built_scene_on_finish);
        assert!(Preferences::load(&path).unwrap().load_built_scene_on_finish);
        assert!(!Preferences::toggle_load_built_scene(&path).unwrap().load_built_scene_on_finish);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("load_built_scene_on_finish = false"));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.toml");
        std::fs::write(&path, "load_built_scene_on_finish = maybe").unwrap();
        assert!(matches!(
            Preferences::load(&path),
            Err(DataLoadError::Parse { .. })
        ));
    }
}
