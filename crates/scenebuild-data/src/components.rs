//! Component tables: component kinds with their capabilities and hard
//! requirements, loaded into a [`ComponentRegistry`].

use crate::loader::{DataLoadError, check_duplicates, deserialize_list, find_data_file};
use scenebuild_core::registry::{ComponentRegistry, ComponentRegistryBuilder, ComponentTypeDef};
use std::path::{Path, PathBuf};
use tracing::info;

/// Base name of a component table inside a project directory.
pub const COMPONENT_TABLE_NAME: &str = "components";

/// Resolve a component table location. A directory resolves to the single
/// `components.{ron,toml,json}` inside it; a file is used as given.
pub fn find_component_table(path: &Path) -> Result<PathBuf, DataLoadError> {
    if !path.is_dir() {
        return Ok(path.to_path_buf());
    }
    find_data_file(path, COMPONENT_TABLE_NAME)?.ok_or_else(|| DataLoadError::MissingFile {
        dir: path.to_path_buf(),
        base_name: COMPONENT_TABLE_NAME.to_string(),
    })
}

/// Load a component table from a file or a directory holding one. TOML
/// files keep the list under `components`.
pub fn load_component_registry(path: &Path) -> Result<ComponentRegistry, DataLoadError> {
    let resolved = find_component_table(path)?;
    let path = resolved.as_path();
    let defs: Vec<ComponentTypeDef> = deserialize_list(path, "components")?;
    check_duplicates(defs.iter().map(|d| d.name.as_str()), path)?;

    let mut builder = ComponentRegistryBuilder::new();
    for def in defs {
        builder.register_def(def);
    }
    let registry = builder.build().map_err(|source| DataLoadError::Registry {
        file: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), kinds = registry.len(), "loaded component table");
    Ok(registry)
}

/// Common scene component kinds, used when no table is given.
pub fn default_component_registry() -> ComponentRegistry {
    let mut b = ComponentRegistryBuilder::new();
    b.register("MeshFilter", &[], &[]);
    b.register("MeshRenderer", &["Renderer"], &["MeshFilter"]);
    b.register("SkinnedMeshRenderer", &["Renderer"], &[]);
    b.register("BoxCollider", &["Collider"], &[]);
    b.register("SphereCollider", &["Collider"], &[]);
    b.register("CapsuleCollider", &["Collider"], &[]);
    b.register("MeshCollider", &["Collider"], &[]);
    b.register("Rigidbody", &[], &[]);
    b.register("Light", &[], &[]);
    b.register("AudioSource", &[], &[]);
    b.register("ParticleSystem", &[], &[]);
    b.register("ParticleSystemRenderer", &["Renderer"], &["ParticleSystem"]);
    b.register("LODGroup", &[], &[]);
    // Static table; names are non-empty and every requirement is registered.
    b.build().unwrap_or_default()
}
