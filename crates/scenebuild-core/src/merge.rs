//! Fragment merge engine.
//!
//! Each fragment with a manifest gets an isolating root node named after
//! the fragment. The manifest's included objects are reparented under that
//! root inside the fragment's own scene, then the root moves into the
//! target scene. The [`RootMap`] remembers which root belongs to which
//! fragment, in merge order.

use crate::id::{NodeId, SceneId};
use crate::manifest::{FragmentManifest, find_fragment_manifests};
use crate::processor::ProcessorSpec;
use crate::report::{BuildWarning, Warnings};
use crate::world::{GraphError, World};
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One entry of the build's fragment list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Position in the fragment list.
    pub index: usize,
    /// Resolved asset path.
    pub path: String,
    pub is_main: bool,
}

/// A fragment opened additively next to the target scene.
#[derive(Debug, Clone)]
pub struct LoadedFragment {
    pub fragment: Fragment,
    pub scene: SceneId,
}

/// A loaded fragment together with its manifest.
#[derive(Debug, Clone)]
pub struct ResolvedFragment {
    pub fragment: Fragment,
    pub scene: SceneId,
    pub manifest_node: NodeId,
    pub manifest: FragmentManifest,
}

/// A merged fragment's root and the processors to run on it.
#[derive(Debug, Clone)]
pub struct RootEntry {
    pub fragment: Fragment,
    /// Display name of the fragment (its scene name).
    pub name: String,
    pub root: NodeId,
    pub processors: Vec<Option<ProcessorSpec>>,
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("fragment #{0} already has a root")]
    DuplicateFragment(usize),
    #[error("main fragment #{0} cannot have a root")]
    MainFragment(usize),
    #[error("fragment scene {0} is not open")]
    SceneClosed(SceneId),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

// ---------------------------------------------------------------------------
// RootMap
// ---------------------------------------------------------------------------

/// Fragment to root-node mapping. Iterates in insertion (merge) order.
#[derive(Debug, Clone, Default)]
pub struct RootMap {
    entries: Vec<RootEntry>,
}

impl RootMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root. Each fragment appears at most once and the main fragment
    /// never does.
    pub fn insert(&mut self, entry: RootEntry) -> Result<(), MergeError> {
        if entry.fragment.is_main {
            return Err(MergeError::MainFragment(entry.fragment.index));
        }
        if self.get(entry.fragment.index).is_some() {
            return Err(MergeError::DuplicateFragment(entry.fragment.index));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Entry for the fragment at `index` in the fragment list.
    pub fn get(&self, index: usize) -> Option<&RootEntry> {
        self.entries.iter().find(|e| e.fragment.index == index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RootEntry> {
        self.entries.iter()
    }

    pub fn roots(&self) -> Vec<NodeId> {
        self.entries.iter().map(|e| e.root).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Locate the manifest of a loaded fragment. Returns `None` (with a
/// warning) when the fragment has none; the caller unloads it.
pub fn resolve_manifest(
    world: &World,
    loaded: &LoadedFragment,
    warnings: &mut Warnings,
) -> Result<Option<ResolvedFragment>, MergeError> {
    let name = scene_name(world, loaded.scene)?;
    let found = find_fragment_manifests(world, loaded.scene)?;
    let Some(&(manifest_node, manifest)) = found.first() else {
        warnings.push(BuildWarning::MissingManifest { fragment: name });
        return Ok(None);
    };
    if found.len() > 1 {
        warnings.push(BuildWarning::MultipleManifests {
            fragment: name,
            count: found.len(),
        });
    }
    Ok(Some(ResolvedFragment {
        fragment: loaded.fragment.clone(),
        scene: loaded.scene,
        manifest_node,
        manifest: manifest.clone(),
    }))
}

/// Merge one fragment into `target` and return its root entry.
///
/// Null or destroyed included objects are skipped with a warning.
pub fn merge_fragment(
    world: &mut World,
    resolved: &ResolvedFragment,
    target: SceneId,
    warnings: &mut Warnings,
) -> Result<RootEntry, MergeError> {
    let name = scene_name(world, resolved.scene)?;
    let root = world.create_root_in(resolved.scene, name.clone())?;

    let mut moved = 0usize;
    for (slot, included) in resolved.manifest.included.iter().enumerate() {
        match included {
            Some(node) if world.contains(*node) => {
                world.reparent(*node, Some(root))?;
                moved += 1;
            }
            _ => warnings.push(BuildWarning::NullIncludedObject {
                fragment: name.clone(),
                slot,
            }),
        }
    }

    world.move_to_scene(root, target)?;
    debug!(fragment = %name, moved, "merged fragment");
    Ok(RootEntry {
        fragment: resolved.fragment.clone(),
        name,
        root,
        processors: resolved.manifest.processors.clone(),
    })
}

/// Replace every root with a deep copy and destroy the original, severing
/// template links. Returns the number of roots replaced.
pub fn unpack_roots(world: &mut World, roots: &mut RootMap) -> Result<usize, MergeError> {
    for entry in &mut roots.entries {
        let copy = world.deep_copy(entry.root)?;
        world.destroy(entry.root);
        entry.root = copy;
    }
    info!(roots = roots.len(), "unpacked fragment roots");
    Ok(roots.len())
}

fn scene_name(world: &World, scene: SceneId) -> Result<String, MergeError> {
    world
        .scene(scene)
        .map(|s| s.name.clone())
        .ok_or(MergeError::SceneClosed(scene))
}
