use scenebuild_core::id::NodeId;
use scenebuild_core::processor::{
    FragmentProcessor, ProcessorContext, ProcessorError, ProcessorSpec,
};
use tracing::info;

pub const DEFAULT_MARKER_PREFIX: &str = "_CG_";

/// Destroys nodes under the fragment root that are inactive themselves and
/// whose name starts with `prefix`. With `capability` set, only nodes that
/// carry a component providing it are destroyed.
///
/// Params: `prefix` (default [`DEFAULT_MARKER_PREFIX`]), `capability`
/// (optional).
#[derive(Debug, Clone)]
pub struct PruneDisabledMarkers {
    pub prefix: String,
    pub capability: Option<String>,
}

impl Default for PruneDisabledMarkers {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_MARKER_PREFIX.to_string(),
            capability: None,
        }
    }
}

impl PruneDisabledMarkers {
    pub fn from_spec(spec: &ProcessorSpec) -> Result<Self, ProcessorError> {
        Ok(Self {
            prefix: spec
                .text("prefix")?
                .unwrap_or(DEFAULT_MARKER_PREFIX)
                .to_string(),
            capability: spec.text("capability")?.map(str::to_string),
        })
    }
}

impl FragmentProcessor for PruneDisabledMarkers {
    fn name(&self) -> &str {
        crate::PRUNE_DISABLED_MARKERS
    }

    fn on_build_scene(
        &mut self,
        ctx: &mut ProcessorContext<'_>,
        root: NodeId,
    ) -> Result<(), ProcessorError> {
        let world = &mut *ctx.world;
        let targets: Vec<NodeId> = world
            .descendants(root, true)
            .into_iter()
            .filter(|&id| {
                let Some(node) = world.node(id) else {
                    return false;
                };
                !node.active
                    && node.name.starts_with(&self.prefix)
                    && self
                        .capability
                        .as_deref()
                        .is_none_or(|cap| world.has_component(id, cap))
            })
            .collect();

        let mut removed = 0;
        for id in targets {
            if world.destroy(id) {
                removed += 1;
            }
        }
        info!(removed, prefix = %self.prefix, "removed disabled marker nodes");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenebuild_core::component::Component;
    use scenebuild_core::id::SceneId;
    use scenebuild_core::storage::MemoryStorage;
    use scenebuild_core::world::World;

    /// Area
    ///   _CG_Hall (inactive, BoxCollider)
    ///     _CG_Inner (inactive)
    ///   _CG_Open (active)
    ///   Door (inactive)
    ///   _CG_Plain (inactive)
    fn area() -> (World, SceneId, NodeId) {
        let mut w = World::new();
        let s = w.create_scene("Area");
        let root = w.create_root("Area").unwrap();
        let hall = w.create_child(root, "_CG_Hall").unwrap();
        w.node_mut(hall).unwrap().active = false;
        w.add_component(hall, Component::data("BoxCollider")).unwrap();
        let inner = w.create_child(hall, "_CG_Inner").unwrap();
        w.node_mut(inner).unwrap().active = false;
        w.create_child(root, "_CG_Open").unwrap();
        let door = w.create_child(root, "Door").unwrap();
        w.node_mut(door).unwrap().active = false;
        let plain = w.create_child(root, "_CG_Plain").unwrap();
        w.node_mut(plain).unwrap().active = false;
        (w, s, root)
    }

    fn child_names(world: &World, node: NodeId) -> Vec<String> {
        world
            .node(node)
            .unwrap()
            .children()
            .iter()
            .map(|&c| world.node(c).unwrap().name.clone())
            .collect()
    }

    #[test]
    fn removes_inactive_prefixed_nodes() {
        let (mut world, scene, root) = area();
        let storage = MemoryStorage::new();
        let mut ctx = ProcessorContext::new(&mut world, &storage, scene);
        PruneDisabledMarkers::default()
            .on_build_scene(&mut ctx, root)
            .unwrap();
        assert_eq!(child_names(&world, root), vec!["_CG_Open", "Door"]);
        assert_eq!(world.len(), 3);
    }

    #[test]
    fn capability_filter_limits_matches() {
        let (mut world, scene, root) = area();
        let storage = MemoryStorage::new();
        let mut ctx = ProcessorContext::new(&mut world, &storage, scene);
        let mut p = PruneDisabledMarkers {
            capability: Some("BoxCollider".into()),
            ..PruneDisabledMarkers::default()
        };
        p.on_build_scene(&mut ctx, root).unwrap();
        assert_eq!(
            child_names(&world, root),
            vec!["_CG_Open", "Door", "_CG_Plain"]
        );
    }

    #[test]
    fn inactive_root_itself_is_a_candidate() {
        let mut world = World::new();
        let scene = world.create_scene("Area");
        let root = world.create_root("_CG_Root").unwrap();
        world.node_mut(root).unwrap().active = false;
        let storage = MemoryStorage::new();
        let mut ctx = ProcessorContext::new(&mut world, &storage, scene);
        PruneDisabledMarkers::default()
            .on_build_scene(&mut ctx, root)
            .unwrap();
        assert!(!world.contains(root));
    }

    #[test]
    fn params_from_spec() {
        let spec = ProcessorSpec::new(crate::PRUNE_DISABLED_MARKERS).with_param(
            "prefix",
            scenebuild_core::component::PropValue::Text("_OCC_".into()),
        );
        let p = PruneDisabledMarkers::from_spec(&spec).unwrap();
        assert_eq!(p.prefix, "_OCC_");
        assert_eq!(p.capability, None);
        let d = PruneDisabledMarkers::from_spec(&ProcessorSpec::new("x")).unwrap();
        assert_eq!(d.prefix, DEFAULT_MARKER_PREFIX);
    }
}
