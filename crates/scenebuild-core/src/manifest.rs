//! Builder manifests: the markers fragment authors place in their scenes.

use crate::component::Component;
use crate::id::{NodeId, SceneId};
use crate::processor::ProcessorSpec;
use crate::world::{GraphError, World};

/// Per-fragment marker: which objects to pull into the merge and which
/// fragment processors to run afterwards. `None` slots are null references
/// (never assigned, or pointing at something that was not saved with the
/// fragment).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentManifest {
    pub included: Vec<Option<NodeId>>,
    pub processors: Vec<Option<ProcessorSpec>>,
}

/// Marker in the main fragment listing objects to delete from the built
/// output after it has been persisted and reloaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MainManifest {
    pub excluded: Vec<Option<NodeId>>,
}

/// Every fragment manifest on an active node of `scene`, in scene preorder.
pub fn find_fragment_manifests(
    world: &World,
    scene: SceneId,
) -> Result<Vec<(NodeId, &FragmentManifest)>, GraphError> {
    let mut found = Vec::new();
    for id in world.scene_nodes(scene, false)? {
        if let Some(node) = world.node(id) {
            for component in &node.components {
                if let Component::FragmentManifest(m) = component {
                    found.push((id, m));
                }
            }
        }
    }
    Ok(found)
}

/// The first main manifest on an active node in any open scene.
pub fn find_main_manifest(world: &World) -> Option<(NodeId, &MainManifest)> {
    world.scenes().iter().find_map(|scene| {
        world
            .scene_nodes(scene.id(), false)
            .ok()?
            .into_iter()
            .find_map(|id| {
                world.node(id)?.components.iter().find_map(|c| match c {
                    Component::MainManifest(m) => Some((id, m)),
                    _ => None,
                })
            })
    })
}
