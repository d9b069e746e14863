use scenebuild_core::dependency::DependencyRemover;
use scenebuild_core::id::NodeId;
use scenebuild_core::processor::{
    FragmentProcessor, ProcessorContext, ProcessorError, ProcessorSpec,
};
use scenebuild_core::world::World;
use tracing::{debug, info};

/// Capability kept by default.
pub const DEFAULT_KEEP: &str = "Collider";

/// Splits a fragment into a visual part and a collision part.
///
/// The fragment root is deep-copied into a sibling root named
/// `"{name} (Collisions)"`. The copy loses every component that does not
/// provide the `keep` capability, along with any node whose subtree no
/// longer holds one. The original loses its `keep` components. Components
/// with hard requirements are removed in dependency order; a component
/// still needed by a kept one stays.
///
/// Params: `keep` (capability, default [`DEFAULT_KEEP`]).
#[derive(Debug)]
pub struct ExtractCollisions {
    pub keep: String,
    remover: DependencyRemover,
}

impl ExtractCollisions {
    pub fn new(keep: impl Into<String>) -> Self {
        Self {
            keep: keep.into(),
            remover: DependencyRemover::new(),
        }
    }

    pub fn from_spec(spec: &ProcessorSpec) -> Result<Self, ProcessorError> {
        Ok(Self::new(spec.text("keep")?.unwrap_or(DEFAULT_KEEP)))
    }

    /// Remove every component on `nodes` selected by `strip`, protecting
    /// whatever `protect` accepts. Returns the number of components removed.
    fn strip(
        &mut self,
        world: &mut World,
        nodes: &[NodeId],
        strip: &dyn Fn(&str) -> bool,
        protect: &dyn Fn(&str) -> bool,
    ) -> Result<usize, ProcessorError> {
        let mut removed = 0;
        for &node in nodes {
            let mut kinds: Vec<String> = match world.node(node) {
                Some(data) => data
                    .components
                    .iter()
                    .map(|c| c.kind().to_string())
                    .filter(|k| strip(k.as_str()))
                    .collect(),
                None => continue,
            };
            kinds.dedup();
            for kind in kinds {
                while world
                    .node(node)
                    .is_some_and(|d| d.components.iter().any(|c| c.kind() == kind))
                {
                    let gone = self.remover.remove(world, node, &kind, protect)?;
                    if gone.is_empty() {
                        debug!(?node, kind = %kind, "component kept by a dependent");
                        break;
                    }
                    removed += gone.len();
                }
            }
        }
        Ok(removed)
    }
}

impl FragmentProcessor for ExtractCollisions {
    fn name(&self) -> &str {
        crate::EXTRACT_COLLISIONS
    }

    fn on_build_scene(
        &mut self,
        ctx: &mut ProcessorContext<'_>,
        root: NodeId,
    ) -> Result<(), ProcessorError> {
        let world = &mut *ctx.world;
        let name = world
            .node(root)
            .map(|n| n.name.clone())
            .ok_or(scenebuild_core::world::GraphError::NodeNotFound(root))?;
        info!(fragment = %name, "extracting collisions");

        let copy = world.deep_copy(root)?;
        let copy_name = format!("{name} (Collisions)");
        if let Some(data) = world.node_mut(copy) {
            data.name = copy_name.clone();
        }
        debug!(copy = %copy_name, "created collision copy");

        let registry = world.registry().clone();
        let keep = self.keep.clone();
        let is_kept = |kind: &str| registry.has_capability(kind, &keep);

        let original_nodes = world.descendants(root, true);
        let from_original =
            self.strip(world, &original_nodes, &is_kept, &|k: &str| !is_kept(k))?;

        let copy_nodes = world.descendants(copy, true);
        let from_copy = self.strip(world, &copy_nodes, &|k: &str| !is_kept(k), &is_kept)?;

        let mut pruned = 0;
        for &node in &copy_nodes {
            if !world.contains(node) {
                continue;
            }
            if world.components_in_children(node, &keep, true).is_empty() {
                world.destroy(node);
                pruned += 1;
            }
        }

        info!(
            fragment = %name,
            from_original,
            from_copy,
            pruned,
            "collisions extracted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenebuild_core::component::Component;
    use scenebuild_core::id::SceneId;
    use scenebuild_core::registry::{ComponentRegistry, ComponentRegistryBuilder};
    use scenebuild_core::storage::MemoryStorage;

    fn registry() -> ComponentRegistry {
        let mut b = ComponentRegistryBuilder::new();
        b.register("MeshFilter", &[], &[]);
        b.register("MeshRenderer", &["Renderer"], &["MeshFilter"]);
        b.register("BoxCollider", &["Collider"], &[]);
        b.register("MeshCollider", &["Collider"], &["MeshFilter"]);
        b.register("Light", &[], &[]);
        b.build().unwrap()
    }

    fn kinds(world: &World, node: NodeId) -> Vec<String> {
        world
            .node(node)
            .unwrap()
            .components
            .iter()
            .map(|c| c.kind().to_string())
            .collect()
    }

    fn add(world: &mut World, node: NodeId, kinds: &[&str]) {
        for k in kinds {
            world.add_component(node, Component::data(*k)).unwrap();
        }
    }

    /// Level
    ///   Wall  [MeshFilter, MeshRenderer, BoxCollider]
    ///   Lamp  [Light]
    ///     Bulb [MeshFilter, MeshRenderer]
    ///   Rock  [MeshFilter, MeshCollider, MeshRenderer]
    fn level() -> (World, SceneId, NodeId) {
        let mut w = World::with_registry(registry());
        let s = w.create_scene("Level");
        let root = w.create_root("Level").unwrap();
        let wall = w.create_child(root, "Wall").unwrap();
        add(&mut w, wall, &["MeshFilter", "MeshRenderer", "BoxCollider"]);
        let lamp = w.create_child(root, "Lamp").unwrap();
        add(&mut w, lamp, &["Light"]);
        let bulb = w.create_child(lamp, "Bulb").unwrap();
        add(&mut w, bulb, &["MeshFilter", "MeshRenderer"]);
        let rock = w.create_child(root, "Rock").unwrap();
        add(&mut w, rock, &["MeshFilter", "MeshCollider", "MeshRenderer"]);
        (w, s, root)
    }

    fn run(world: &mut World, scene: SceneId, root: NodeId) {
        let storage = MemoryStorage::new();
        let mut ctx = ProcessorContext::new(world, &storage, scene);
        ExtractCollisions::new(DEFAULT_KEEP)
            .on_build_scene(&mut ctx, root)
            .unwrap();
    }

    #[test]
    fn copy_keeps_only_colliders_and_their_requirements() {
        let (mut world, scene, root) = level();
        run(&mut world, scene, root);

        let copy = world.find_named(scene, "Level (Collisions)").unwrap();
        assert_eq!(world.node(copy).unwrap().parent(), None);
        assert_eq!(world.roots(scene).unwrap(), &[root, copy]);

        let children: Vec<String> = world
            .node(copy)
            .unwrap()
            .children()
            .iter()
            .map(|&c| world.node(c).unwrap().name.clone())
            .collect();
        assert_eq!(children, vec!["Wall", "Rock"]);

        let wall = world.node(copy).unwrap().children()[0];
        assert_eq!(kinds(&world, wall), vec!["BoxCollider"]);
        let rock = world.node(copy).unwrap().children()[1];
        assert_eq!(kinds(&world, rock), vec!["MeshFilter", "MeshCollider"]);
    }

    #[test]
    fn original_loses_colliders_only() {
        let (mut world, scene, root) = level();
        let original: Vec<NodeId> = world.node(root).unwrap().children().to_vec();
        run(&mut world, scene, root);

        assert_eq!(kinds(&world, original[0]), vec!["MeshFilter", "MeshRenderer"]);
        assert_eq!(kinds(&world, original[1]), vec!["Light"]);
        assert_eq!(kinds(&world, original[2]), vec!["MeshFilter", "MeshRenderer"]);
        assert_eq!(world.descendants(root, true).len(), 5);
    }

    #[test]
    fn fragment_without_colliders_leaves_no_copy() {
        let mut world = World::with_registry(registry());
        let scene = world.create_scene("Empty");
        let root = world.create_root("Empty").unwrap();
        let lamp = world.create_child(root, "Lamp").unwrap();
        add(&mut world, lamp, &["Light"]);
        run(&mut world, scene, root);

        assert!(world.find_named(scene, "Empty (Collisions)").is_none());
        assert_eq!(kinds(&world, lamp), vec!["Light"]);
    }

    #[test]
    fn inactive_nodes_are_processed() {
        let (mut world, scene, root) = level();
        let wall = world.node(root).unwrap().children()[0];
        world.node_mut(wall).unwrap().active = false;
        run(&mut world, scene, root);

        assert_eq!(kinds(&world, wall), vec!["MeshFilter", "MeshRenderer"]);
        let copy = world.find_named(scene, "Level (Collisions)").unwrap();
        let copied_wall = world.node(copy).unwrap().children()[0];
        assert!(!world.node(copied_wall).unwrap().active);
        assert_eq!(kinds(&world, copied_wall), vec!["BoxCollider"]);
    }

    #[test]
    fn custom_keep_capability() {
        let (mut world, scene, root) = level();
        let storage = MemoryStorage::new();
        let mut ctx = ProcessorContext::new(&mut world, &storage, scene);
        let spec = ProcessorSpec::new(crate::EXTRACT_COLLISIONS).with_param(
            "keep",
            scenebuild_core::component::PropValue::Text("Renderer".into()),
        );
        let mut p = ExtractCollisions::from_spec(&spec).unwrap();
        assert_eq!(p.keep, "Renderer");
        p.on_build_scene(&mut ctx, root).unwrap();

        let copy = world.find_named(scene, "Level (Collisions)").unwrap();
        // Wall, Lamp (for Bulb) and Rock all hold a renderer.
        assert_eq!(world.node(copy).unwrap().children().len(), 3);
        let wall = world.node(copy).unwrap().children()[0];
        assert_eq!(kinds(&world, wall), vec!["MeshFilter", "MeshRenderer"]);
    }
}
