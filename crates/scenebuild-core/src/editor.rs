//! Editor state: which scenes are open, and moving them to and from storage.

use crate::document::DocumentError;
use crate::id::SceneId;
use crate::processor::ProcessorContext;
use crate::registry::ComponentRegistry;
use crate::storage::{SceneStorage, StorageError};
use crate::world::{GraphError, SceneInfo, World};
use std::path::Path;
use tracing::{debug, error, info};

/// How a newly opened scene relates to the scenes already open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Close every open scene first; the new scene becomes active.
    Single,
    /// Open alongside the others; the active scene is unchanged.
    Additive,
}

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("scene {0} has no asset path")]
    NoPath(SceneId),
    #[error("empty asset path")]
    EmptyPath,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Open scenes plus the asset store they come from.
#[derive(Debug)]
pub struct Editor {
    world: World,
    storage: Box<dyn SceneStorage>,
}

impl Editor {
    pub fn new(storage: impl SceneStorage + 'static) -> Self {
        Self::with_registry(storage, ComponentRegistry::default())
    }

    pub fn with_registry(storage: impl SceneStorage + 'static, registry: ComponentRegistry) -> Self {
        Self {
            world: World::with_registry(registry),
            storage: Box::new(storage),
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn storage(&self) -> &dyn SceneStorage {
        self.storage.as_ref()
    }

    pub fn storage_mut(&mut self) -> &mut dyn SceneStorage {
        self.storage.as_mut()
    }

    /// Split borrow for running processors against `scene`.
    pub fn processor_context(&mut self, scene: SceneId) -> ProcessorContext<'_> {
        ProcessorContext::new(&mut self.world, self.storage.as_ref(), scene)
    }

    // -----------------------------------------------------------------------
    // Opening and closing
    // -----------------------------------------------------------------------

    /// Open a new, empty, unsaved scene named "Untitled". In single mode it
    /// is the only open scene and therefore active.
    pub fn new_scene(&mut self, mode: OpenMode) -> SceneId {
        if mode == OpenMode::Single {
            self.close_all();
        }
        let scene = self.world.create_scene("Untitled");
        debug!(%scene, ?mode, "new scene");
        scene
    }

    /// Open the scene asset at `path`. The asset is read before anything is
    /// closed, so a failed open leaves the editor untouched.
    pub fn open_scene(&mut self, path: &str, mode: OpenMode) -> Result<SceneId, EditorError> {
        if path.trim().is_empty() {
            return Err(EditorError::EmptyPath);
        }
        let doc = self.storage.read(path)?;
        doc.validate()?;
        if mode == OpenMode::Single {
            self.close_all();
        }
        let scene = self.world.create_scene(scene_name(path));
        self.world.set_scene_path(scene, Some(path.to_string()))?;
        if let Err(e) = self.world.instantiate_document(&doc, scene, None, None) {
            self.world.close_scene(scene)?;
            return Err(e.into());
        }
        if mode == OpenMode::Single {
            self.world.set_active_scene(scene)?;
        }
        info!(path, ?mode, nodes = doc.nodes.len(), "opened scene");
        Ok(scene)
    }

    pub fn close_scene(&mut self, scene: SceneId) -> Result<(), EditorError> {
        self.world.close_scene(scene)?;
        debug!(%scene, "closed scene");
        Ok(())
    }

    pub fn close_all(&mut self) {
        let ids: Vec<SceneId> = self.world.scenes().iter().map(SceneInfo::id).collect();
        for id in ids {
            // Ids come straight from the open list.
            let _ = self.world.close_scene(id);
        }
    }

    pub fn open_scenes(&self) -> &[SceneInfo] {
        self.world.scenes()
    }

    pub fn active_scene(&self) -> Option<SceneId> {
        self.world.active_scene()
    }

    /// Asset path of the active scene, if it has one.
    pub fn active_scene_path(&self) -> Option<String> {
        let scene = self.world.active_scene()?;
        self.world.scene(scene)?.path().map(str::to_string)
    }

    // -----------------------------------------------------------------------
    // Saving
    // -----------------------------------------------------------------------

    /// Save a scene back to its own path.
    pub fn save_scene(&mut self, scene: SceneId) -> Result<String, EditorError> {
        let path = self
            .world
            .scene(scene)
            .ok_or(GraphError::SceneNotFound(scene))?
            .path()
            .map(str::to_string)
            .ok_or(EditorError::NoPath(scene))?;
        self.write_scene(scene, &path)?;
        Ok(path)
    }

    /// Save a scene to `path` and make that its path from now on.
    pub fn save_scene_as(&mut self, scene: SceneId, path: &str) -> Result<(), EditorError> {
        self.write_scene(scene, path)?;
        self.world.set_scene_path(scene, Some(path.to_string()))?;
        self.world.set_scene_name(scene, scene_name(path))?;
        Ok(())
    }

    /// Write a copy of a scene to `path`. The open scene keeps its own path.
    pub fn save_scene_as_copy(&mut self, scene: SceneId, path: &str) -> Result<(), EditorError> {
        self.write_scene(scene, path)
    }

    fn write_scene(&mut self, scene: SceneId, path: &str) -> Result<(), EditorError> {
        if path.trim().is_empty() {
            return Err(EditorError::EmptyPath);
        }
        let doc = self.world.export_scene(scene)?;
        self.storage.write(path, &doc)?;
        info!(path, %scene, nodes = doc.nodes.len(), "saved scene");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Assets
    // -----------------------------------------------------------------------

    pub fn asset_exists(&self, path: &str) -> bool {
        self.storage.exists(path)
    }

    pub fn delete_asset(&mut self, path: &str) -> Result<bool, EditorError> {
        let deleted = self.storage.delete(path)?;
        if deleted {
            info!(path, "deleted asset");
        }
        Ok(deleted)
    }

    /// Whether a scene open in the editor is the asset at `path`.
    pub fn is_editing(&self, path: &str) -> bool {
        self.world.scenes().iter().any(|s| s.path() == Some(path))
    }

    /// Log an error when the build output at `path` is open for editing.
    pub fn check_editing(&self, path: &str) {
        if self.is_editing(path) {
            error!(
                path,
                "editing a build output scene; changes made here are lost on the next build"
            );
        }
    }
}

/// Scene display name: the file name up to its first dot.
fn scene_name(path: &str) -> String {
    let file = Path::new(path)
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or(path);
    file.split('.').next().unwrap_or(file).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{NodeRecord, SceneDocument};
    use crate::storage::MemoryStorage;

    fn doc(names: &[&str]) -> SceneDocument {
        SceneDocument {
            nodes: names.iter().map(|n| NodeRecord::new(*n)).collect(),
        }
    }

    fn editor() -> Editor {
        let mut storage = MemoryStorage::new();
        storage.insert("Levels/Forest.scene", &doc(&["Tree", "Rock"])).unwrap();
        storage.insert("Levels/Cave.scene", &doc(&["Bat"])).unwrap();
        Editor::new(storage)
    }

    #[test]
    fn scene_names_from_paths() {
        assert_eq!(scene_name("Levels/Forest.scene"), "Forest");
        assert_eq!(scene_name("Out/Built.scene.ron"), "Built");
        assert_eq!(scene_name("plain"), "plain");
    }

    #[test]
    fn open_single_replaces_open_scenes() {
        let mut ed = editor();
        let a = ed.open_scene("Levels/Forest.scene", OpenMode::Single).unwrap();
        assert_eq!(ed.open_scenes().len(), 1);
        assert_eq!(ed.world().roots(a).unwrap().len(), 2);
        let b = ed.open_scene("Levels/Cave.scene", OpenMode::Single).unwrap();
        assert_eq!(ed.open_scenes().len(), 1);
        assert_eq!(ed.active_scene(), Some(b));
        assert_eq!(ed.active_scene_path().as_deref(), Some("Levels/Cave.scene"));
        assert_eq!(ed.world().scene(b).unwrap().name, "Cave");
    }

    #[test]
    fn open_additive_keeps_active() {
        let mut ed = editor();
        let a = ed.open_scene("Levels/Forest.scene", OpenMode::Single).unwrap();
        let b = ed.open_scene("Levels/Cave.scene", OpenMode::Additive).unwrap();
        assert_eq!(ed.open_scenes().len(), 2);
        assert_eq!(ed.active_scene(), Some(a));
        assert_ne!(a, b);
    }

    #[test]
    fn failed_open_leaves_state() {
        let mut ed = editor();
        let a = ed.open_scene("Levels/Forest.scene", OpenMode::Single).unwrap();
        assert!(matches!(
            ed.open_scene("Levels/Missing.scene", OpenMode::Single),
            Err(EditorError::Storage(StorageError::NotFound(_)))
        ));
        assert_eq!(ed.active_scene(), Some(a));
        assert!(matches!(
            ed.open_scene("  ", OpenMode::Single),
            Err(EditorError::EmptyPath)
        ));
    }

    #[test]
    fn new_scene_single_and_additive() {
        let mut ed = editor();
        ed.open_scene("Levels/Forest.scene", OpenMode::Single).unwrap();
        let extra = ed.new_scene(OpenMode::Additive);
        assert_eq!(ed.open_scenes().len(), 2);
        let fresh = ed.new_scene(OpenMode::Single);
        assert_eq!(ed.open_scenes().len(), 1);
        assert_eq!(ed.active_scene(), Some(fresh));
        assert_ne!(extra, fresh);
        assert_eq!(ed.active_scene_path(), None);
    }

    #[test]
    fn save_requires_path() {
        let mut ed = editor();
        let s = ed.new_scene(OpenMode::Single);
        assert!(matches!(ed.save_scene(s), Err(EditorError::NoPath(_))));
        ed.save_scene_as(s, "Levels/New.scene").unwrap();
        assert_eq!(ed.save_scene(s).unwrap(), "Levels/New.scene");
        assert_eq!(ed.world().scene(s).unwrap().name, "New");
    }

    #[test]
    fn save_as_copy_keeps_scene_path() {
        let mut ed = editor();
        let s = ed.open_scene("Levels/Forest.scene", OpenMode::Single).unwrap();
        ed.world_mut().create_root("Extra").unwrap();
        ed.save_scene_as_copy(s, "Out/Copy.scene").unwrap();
        assert_eq!(ed.active_scene_path().as_deref(), Some("Levels/Forest.scene"));
        assert_eq!(ed.storage().read("Out/Copy.scene").unwrap().nodes.len(), 3);
        assert_eq!(ed.storage().read("Levels/Forest.scene").unwrap().nodes.len(), 2);
    }

    #[test]
    fn delete_and_exists() {
        let mut ed = editor();
        assert!(ed.asset_exists("Levels/Cave.scene"));
        assert!(ed.delete_asset("Levels/Cave.scene").unwrap());
        assert!(!ed.asset_exists("Levels/Cave.scene"));
        assert!(!ed.delete_asset("Levels/Cave.scene").unwrap());
    }

    #[test]
    fn editing_output_detected() {
        let mut ed = editor();
        ed.open_scene("Levels/Forest.scene", OpenMode::Single).unwrap();
        assert!(ed.is_editing("Levels/Forest.scene"));
        assert!(!ed.is_editing("Levels/Cave.scene"));
        ed.check_editing("Levels/Forest.scene");
        ed.close_all();
        assert!(!ed.is_editing("Levels/Forest.scene"));
    }

    #[test]
    fn close_scene_and_all() {
        let mut ed = editor();
        let a = ed.open_scene("Levels/Forest.scene", OpenMode::Single).unwrap();
        ed.open_scene("Levels/Cave.scene", OpenMode::Additive).unwrap();
        ed.close_scene(a).unwrap();
        assert_eq!(ed.open_scenes().len(), 1);
        ed.close_all();
        assert!(ed.open_scenes().is_empty());
        assert!(ed.world().is_empty());
    }
}
