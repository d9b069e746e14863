//! Node arena and open scenes. Every node belongs to exactly one scene,
//! either as a root or under a parent in that scene. Mutation is immediate.

use crate::component::Component;
use crate::id::{NodeId, SceneId};
use crate::registry::ComponentRegistry;
use slotmap::SlotMap;
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during world graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("node not found: {0:?}")]
    NodeNotFound(NodeId),
    #[error("scene not found: {0}")]
    SceneNotFound(SceneId),
    #[error("no active scene")]
    NoActiveScene,
    #[error("reparenting {node:?} under {parent:?} would create a cycle")]
    CycleDetected { node: NodeId, parent: NodeId },
    #[error("node {0:?} is not a scene root")]
    NotARoot(NodeId),
    #[error("cannot remove '{kind}': required by '{required_by}'")]
    ComponentRequired { kind: String, required_by: String },
    #[error("component '{kind}' not found on node {node:?}")]
    ComponentNotFound { node: NodeId, kind: String },
}

// ---------------------------------------------------------------------------
// Core data structures
// ---------------------------------------------------------------------------

/// Per-node data stored in the world.
///
/// Hierarchy links (`parent`, `children`, `scene`) are read-only from the
/// outside; change them through [`World::reparent`] and
/// [`World::move_to_scene`] so both ends stay consistent.
#[derive(Debug, Clone)]
pub struct NodeData {
    pub name: String,
    /// Identity tag used by tag-based extraction.
    pub tag: Option<String>,
    /// The node's own active flag. See [`World::is_active_in_hierarchy`].
    pub active: bool,
    pub components: Vec<Component>,
    /// Template (prefab) this node was instantiated from, if still linked.
    pub prefab: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    scene: SceneId,
}

impl NodeData {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn scene(&self) -> SceneId {
        self.scene
    }
}

/// An open scene graph: a name, an optional backing asset path and its
/// ordered root nodes.
#[derive(Debug, Clone)]
pub struct SceneInfo {
    id: SceneId,
    pub name: String,
    path: Option<String>,
    roots: Vec<NodeId>,
}

impl SceneInfo {
    pub fn id(&self) -> SceneId {
        self.id
    }

    /// Asset path the scene was loaded from or last saved to.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// Every open scene graph and all of their nodes.
///
/// All mutation is immediate. A destroyed node's id never resolves again,
/// so references held elsewhere (manifest slots, processor state) read as
/// null afterwards.
#[derive(Debug, Default)]
pub struct World {
    nodes: SlotMap<NodeId, NodeData>,
    scenes: Vec<SceneInfo>,
    active_scene: Option<SceneId>,
    next_scene_id: u32,
    registry: ComponentRegistry,
}

impl World {
    /// Create an empty world with no scenes and an empty component registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty world that resolves capabilities and requirements
    /// through `registry`.
    pub fn with_registry(registry: ComponentRegistry) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // Scenes
    // -----------------------------------------------------------------------

    /// Open a new empty scene. It becomes active if no scene was active.
    pub fn create_scene(&mut self, name: impl Into<String>) -> SceneId {
        let id = SceneId(self.next_scene_id);
        self.next_scene_id += 1;
        self.scenes.push(SceneInfo {
            id,
            name: name.into(),
            path: None,
            roots: Vec::new(),
        });
        if self.active_scene.is_none() {
            self.active_scene = Some(id);
        }
        id
    }

    /// Close a scene and destroy all of its nodes. If it was active, the
    /// first remaining scene becomes active.
    pub fn close_scene(&mut self, scene: SceneId) -> Result<(), GraphError> {
        let idx = self.scene_index(scene)?;
        let info = self.scenes.remove(idx);
        for root in info.roots {
            self.destroy_subtree(root);
        }
        if self.active_scene == Some(scene) {
            self.active_scene = self.scenes.first().map(|s| s.id);
        }
        Ok(())
    }

    pub fn scene(&self, scene: SceneId) -> Option<&SceneInfo> {
        self.scenes.iter().find(|s| s.id == scene)
    }

    /// Open scenes in the order they were opened.
    pub fn scenes(&self) -> &[SceneInfo] {
        &self.scenes
    }

    pub(crate) fn set_scene_path(
        &mut self,
        scene: SceneId,
        path: Option<String>,
    ) -> Result<(), GraphError> {
        let idx = self.scene_index(scene)?;
        self.scenes[idx].path = path;
        Ok(())
    }

    pub(crate) fn set_scene_name(
        &mut self,
        scene: SceneId,
        name: impl Into<String>,
    ) -> Result<(), GraphError> {
        let idx = self.scene_index(scene)?;
        self.scenes[idx].name = name.into();
        Ok(())
    }

    pub fn active_scene(&self) -> Option<SceneId> {
        self.active_scene
    }

    pub fn set_active_scene(&mut self, scene: SceneId) -> Result<(), GraphError> {
        self.scene_index(scene)?;
        self.active_scene = Some(scene);
        Ok(())
    }

    /// Root nodes of a scene, in order.
    pub fn roots(&self, scene: SceneId) -> Result<&[NodeId], GraphError> {
        self.scene(scene)
            .map(|s| s.roots.as_slice())
            .ok_or(GraphError::SceneNotFound(scene))
    }

    fn scene_index(&self, scene: SceneId) -> Result<usize, GraphError> {
        self.scenes
            .iter()
            .position(|s| s.id == scene)
            .ok_or(GraphError::SceneNotFound(scene))
    }

    // -----------------------------------------------------------------------
    // Node creation and lookup
    // -----------------------------------------------------------------------

    /// Create a root node in the active scene.
    pub fn create_root(&mut self, name: impl Into<String>) -> Result<NodeId, GraphError> {
        let scene = self.active_scene.ok_or(GraphError::NoActiveScene)?;
        self.create_root_in(scene, name)
    }

    /// Create a root node in a specific scene.
    pub fn create_root_in(
        &mut self,
        scene: SceneId,
        name: impl Into<String>,
    ) -> Result<NodeId, GraphError> {
        let idx = self.scene_index(scene)?;
        let id = self.nodes.insert(NodeData {
            name: name.into(),
            tag: None,
            active: true,
            components: Vec::new(),
            prefab: None,
            parent: None,
            children: Vec::new(),
            scene,
        });
        self.scenes[idx].roots.push(id);
        Ok(id)
    }

    /// Create a node as the last child of `parent`, in the parent's scene.
    pub fn create_child(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
    ) -> Result<NodeId, GraphError> {
        let scene = self.node(parent).ok_or(GraphError::NodeNotFound(parent))?.scene;
        let id = self.nodes.insert(NodeData {
            name: name.into(),
            tag: None,
            active: true,
            components: Vec::new(),
            prefab: None,
            parent: Some(parent),
            children: Vec::new(),
            scene,
        });
        self.nodes[parent].children.push(id);
        Ok(id)
    }

    pub fn node(&self, node: NodeId) -> Option<&NodeData> {
        self.nodes.get(node)
    }

    pub fn node_mut(&mut self, node: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(node)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(node)
    }

    /// Total node count across all open scenes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First node (scene preorder, inactive included) with the given name.
    pub fn find_named(&self, scene: SceneId, name: &str) -> Option<NodeId> {
        self.scene_nodes(scene, true)
            .ok()?
            .into_iter()
            .find(|&id| self.nodes[id].name == name)
    }

    // -----------------------------------------------------------------------
    // Hierarchy mutation
    // -----------------------------------------------------------------------

    /// Move `node` under `new_parent`, or make it a root of its current
    /// scene when `new_parent` is `None`. Moving under a parent in another
    /// scene carries the whole subtree into that scene.
    pub fn reparent(&mut self, node: NodeId, new_parent: Option<NodeId>) -> Result<(), GraphError> {
        if !self.contains(node) {
            return Err(GraphError::NodeNotFound(node));
        }
        if let Some(parent) = new_parent {
            if !self.contains(parent) {
                return Err(GraphError::NodeNotFound(parent));
            }
            if self.is_self_or_ancestor(node, parent) {
                return Err(GraphError::CycleDetected { node, parent });
            }
        }

        self.detach(node);
        match new_parent {
            Some(parent) => {
                let scene = self.nodes[parent].scene;
                self.nodes[parent].children.push(node);
                self.nodes[node].parent = Some(parent);
                self.set_subtree_scene(node, scene);
            }
            None => {
                let scene = self.nodes[node].scene;
                self.attach_root(node, scene)?;
            }
        }
        Ok(())
    }

    /// Move a root node (and its subtree) to the end of another scene's
    /// root list.
    pub fn move_to_scene(&mut self, node: NodeId, scene: SceneId) -> Result<(), GraphError> {
        let data = self.node(node).ok_or(GraphError::NodeNotFound(node))?;
        if data.parent.is_some() {
            return Err(GraphError::NotARoot(node));
        }
        self.scene_index(scene)?;
        self.detach(node);
        self.attach_root(node, scene)?;
        self.set_subtree_scene(node, scene);
        Ok(())
    }

    /// Structural clone of `node` and its subtree. The copy becomes a new
    /// root in the source node's scene, keeps the source name, drops every
    /// template link, and has references into the copied subtree rewritten
    /// to point at the copies.
    pub fn deep_copy(&mut self, node: NodeId) -> Result<NodeId, GraphError> {
        let scene = self.node(node).ok_or(GraphError::NodeNotFound(node))?.scene;
        let originals = self.descendants(node, true);

        let mut mapping: HashMap<NodeId, NodeId> = HashMap::with_capacity(originals.len());
        for &orig in &originals {
            let src = &self.nodes[orig];
            let copy = NodeData {
                name: src.name.clone(),
                tag: src.tag.clone(),
                active: src.active,
                components: src.components.clone(),
                prefab: None,
                parent: None,
                children: Vec::new(),
                scene,
            };
            let parent = src.parent.and_then(|p| mapping.get(&p).copied());
            let id = self.nodes.insert(copy);
            if let Some(p) = parent {
                self.nodes[id].parent = Some(p);
                self.nodes[p].children.push(id);
            }
            mapping.insert(orig, id);
        }

        for &orig in &originals {
            let copy = mapping[&orig];
            for component in &mut self.nodes[copy].components {
                component.remap_refs(|r| mapping.get(&r).copied().unwrap_or(r));
            }
        }

        let root = mapping[&node];
        self.attach_root(root, scene)?;
        Ok(root)
    }

    /// Destroy a node and its whole subtree. Returns `false` if the node no
    /// longer exists.
    pub fn destroy(&mut self, node: NodeId) -> bool {
        if !self.contains(node) {
            return false;
        }
        self.detach(node);
        self.destroy_subtree(node);
        true
    }

    fn destroy_subtree(&mut self, node: NodeId) {
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(data) = self.nodes.remove(id) {
                stack.extend(data.children);
            }
        }
    }

    /// Unlink a node from its parent's child list or its scene's root list.
    fn detach(&mut self, node: NodeId) {
        let (parent, scene) = {
            let data = &self.nodes[node];
            (data.parent, data.scene)
        };
        match parent {
            Some(p) => {
                if let Some(pd) = self.nodes.get_mut(p) {
                    pd.children.retain(|&c| c != node);
                }
            }
            None => {
                if let Some(info) = self.scenes.iter_mut().find(|s| s.id == scene) {
                    info.roots.retain(|&r| r != node);
                }
            }
        }
        self.nodes[node].parent = None;
    }

    fn attach_root(&mut self, node: NodeId, scene: SceneId) -> Result<(), GraphError> {
        let idx = self.scene_index(scene)?;
        self.scenes[idx].roots.push(node);
        self.nodes[node].parent = None;
        self.nodes[node].scene = scene;
        Ok(())
    }

    fn set_subtree_scene(&mut self, node: NodeId, scene: SceneId) {
        for id in self.descendants(node, true) {
            self.nodes[id].scene = scene;
        }
    }

    /// Whether `candidate` is `node` itself or one of its descendants.
    fn is_self_or_ancestor(&self, node: NodeId, candidate: NodeId) -> bool {
        let mut cursor = Some(candidate);
        while let Some(id) = cursor {
            if id == node {
                return true;
            }
            cursor = self.nodes.get(id).and_then(|d| d.parent);
        }
        false
    }

    // -----------------------------------------------------------------------
    // Traversal
    // -----------------------------------------------------------------------

    /// `root` and its descendants in preorder. Without `include_inactive`,
    /// subtrees under an inactive node are skipped, and nothing is returned
    /// when `root` itself is inactive in the hierarchy.
    pub fn descendants(&self, root: NodeId, include_inactive: bool) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.contains(root) || (!include_inactive && !self.is_active_in_hierarchy(root)) {
            return out;
        }
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let data = &self.nodes[id];
            if !include_inactive && !data.active {
                continue;
            }
            out.push(id);
            stack.extend(data.children.iter().rev().copied());
        }
        out
    }

    /// Every node of a scene in preorder, roots in scene order.
    pub fn scene_nodes(
        &self,
        scene: SceneId,
        include_inactive: bool,
    ) -> Result<Vec<NodeId>, GraphError> {
        Ok(self
            .roots(scene)?
            .iter()
            .flat_map(|&r| self.descendants(r, include_inactive))
            .collect())
    }

    /// A node is active in the hierarchy when it and all of its ancestors
    /// are active.
    pub fn is_active_in_hierarchy(&self, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            match self.nodes.get(id) {
                Some(data) if data.active => cursor = data.parent,
                _ => return false,
            }
        }
        true
    }

    // -----------------------------------------------------------------------
    // Components
    // -----------------------------------------------------------------------

    /// Components providing `capability` on `root` and its descendants,
    /// in preorder.
    pub fn components_in_children(
        &self,
        root: NodeId,
        capability: &str,
        include_inactive: bool,
    ) -> Vec<(NodeId, &Component)> {
        let nodes = &self.nodes;
        let registry = &self.registry;
        self.descendants(root, include_inactive)
            .into_iter()
            .flat_map(move |id| {
                nodes[id]
                    .components
                    .iter()
                    .filter(move |c| registry.has_capability(c.kind(), capability))
                    .map(move |c| (id, c))
            })
            .collect()
    }

    /// First component providing `capability` on an active node, searching
    /// every open scene in order.
    pub fn find_first_of_capability(&self, capability: &str) -> Option<(NodeId, &Component)> {
        for scene in &self.scenes {
            for &root in &scene.roots {
                if let Some(found) = self
                    .components_in_children(root, capability, false)
                    .into_iter()
                    .next()
                {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Whether `node` carries a component providing `capability`.
    pub fn has_component(&self, node: NodeId, capability: &str) -> bool {
        self.nodes.get(node).is_some_and(|d| {
            d.components
                .iter()
                .any(|c| self.registry.has_capability(c.kind(), capability))
        })
    }

    pub fn add_component(&mut self, node: NodeId, component: Component) -> Result<(), GraphError> {
        let data = self.nodes.get_mut(node).ok_or(GraphError::NodeNotFound(node))?;
        data.components.push(component);
        Ok(())
    }

    /// Remove the first component of exactly type `kind` from `node`.
    ///
    /// Refused with [`GraphError::ComponentRequired`] while another component
    /// on the node hard-requires `kind` and no second component of that type
    /// would remain.
    pub fn remove_component(&mut self, node: NodeId, kind: &str) -> Result<Component, GraphError> {
        let data = self.nodes.get(node).ok_or(GraphError::NodeNotFound(node))?;
        let position = data
            .components
            .iter()
            .position(|c| c.kind() == kind)
            .ok_or_else(|| GraphError::ComponentNotFound {
                node,
                kind: kind.to_string(),
            })?;
        let remaining_same_kind = data.components.iter().filter(|c| c.kind() == kind).count() - 1;
        if remaining_same_kind == 0 {
            for (i, other) in data.components.iter().enumerate() {
                if i == position {
                    continue;
                }
                if self.registry.requires(other.kind()).iter().any(|r| r == kind) {
                    return Err(GraphError::ComponentRequired {
                        kind: kind.to_string(),
                        required_by: other.kind().to_string(),
                    });
                }
            }
        }
        Ok(self.nodes[node].components.remove(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::FragmentManifest;
    use crate::registry::ComponentRegistryBuilder;

    fn registry() -> ComponentRegistry {
        let mut b = ComponentRegistryBuilder::new();
        b.register("MeshFilter", &[], &[]);
        b.register("MeshRenderer", &["Renderer"], &["MeshFilter"]);
        b.register("BoxCollider", &["Collider"], &[]);
        b.build().unwrap()
    }

    fn world_with_scene() -> (World, SceneId) {
        let mut w = World::with_registry(registry());
        let s = w.create_scene("Main");
        (w, s)
    }

    fn names(w: &World, ids: &[NodeId]) -> Vec<String> {
        ids.iter().map(|&id| w.node(id).unwrap().name.clone()).collect()
    }

    #[test]
    fn first_scene_becomes_active() {
        let mut w = World::new();
        assert_eq!(w.active_scene(), None);
        let a = w.create_scene("A");
        let _b = w.create_scene("B");
        assert_eq!(w.active_scene(), Some(a));
    }

    #[test]
    fn create_root_without_scene_fails() {
        let mut w = World::new();
        assert!(matches!(w.create_root("x"), Err(GraphError::NoActiveScene)));
    }

    #[test]
    fn create_root_and_children() {
        let (mut w, s) = world_with_scene();
        let root = w.create_root("Root").unwrap();
        let a = w.create_child(root, "A").unwrap();
        let b = w.create_child(root, "B").unwrap();
        assert_eq!(w.roots(s).unwrap(), &[root]);
        assert_eq!(w.node(root).unwrap().children(), &[a, b]);
        assert_eq!(w.node(a).unwrap().parent(), Some(root));
        assert_eq!(w.node(b).unwrap().scene(), s);
        assert_eq!(w.len(), 3);
    }

    #[test]
    fn descendants_preorder() {
        let (mut w, _) = world_with_scene();
        let root = w.create_root("R").unwrap();
        let a = w.create_child(root, "A").unwrap();
        w.create_child(a, "A1").unwrap();
        w.create_child(root, "B").unwrap();
        assert_eq!(names(&w, &w.descendants(root, true)), ["R", "A", "A1", "B"]);
    }

    #[test]
    fn descendants_skip_inactive_subtrees() {
        let (mut w, _) = world_with_scene();
        let root = w.create_root("R").unwrap();
        let a = w.create_child(root, "A").unwrap();
        w.create_child(a, "A1").unwrap();
        w.create_child(root, "B").unwrap();
        w.node_mut(a).unwrap().active = false;
        assert_eq!(names(&w, &w.descendants(root, false)), ["R", "B"]);
        assert!(w.descendants(a, false).is_empty());
        assert_eq!(w.descendants(a, true).len(), 2);
    }

    #[test]
    fn active_in_hierarchy_follows_ancestors() {
        let (mut w, _) = world_with_scene();
        let root = w.create_root("R").unwrap();
        let child = w.create_child(root, "C").unwrap();
        assert!(w.is_active_in_hierarchy(child));
        w.node_mut(root).unwrap().active = false;
        assert!(!w.is_active_in_hierarchy(child));
        assert!(w.node(child).unwrap().active);
    }

    #[test]
    fn reparent_moves_between_parents() {
        let (mut w, s) = world_with_scene();
        let a = w.create_root("A").unwrap();
        let b = w.create_root("B").unwrap();
        let c = w.create_child(a, "C").unwrap();
        w.reparent(c, Some(b)).unwrap();
        assert!(w.node(a).unwrap().children().is_empty());
        assert_eq!(w.node(b).unwrap().children(), &[c]);

        w.reparent(b, Some(a)).unwrap();
        assert_eq!(w.roots(s).unwrap(), &[a]);

        w.reparent(c, None).unwrap();
        assert_eq!(w.roots(s).unwrap(), &[a, c]);
        assert_eq!(w.node(c).unwrap().parent(), None);
    }

    #[test]
    fn reparent_cycle_detected() {
        let (mut w, _) = world_with_scene();
        let a = w.create_root("A").unwrap();
        let b = w.create_child(a, "B").unwrap();
        match w.reparent(a, Some(b)) {
            Err(GraphError::CycleDetected { node, parent }) => {
                assert_eq!(node, a);
                assert_eq!(parent, b);
            }
            other => panic!("expected CycleDetected, got: {other:?}"),
        }
        assert!(matches!(
            w.reparent(a, Some(a)),
            Err(GraphError::CycleDetected { .. })
        ));
    }

    #[test]
    fn reparent_across_scenes_moves_subtree() {
        let (mut w, s1) = world_with_scene();
        let s2 = w.create_scene("Other");
        let host = w.create_root_in(s1, "Host").unwrap();
        let item = w.create_root_in(s2, "Item").unwrap();
        let leaf = w.create_child(item, "Leaf").unwrap();
        w.reparent(item, Some(host)).unwrap();
        assert!(w.roots(s2).unwrap().is_empty());
        assert_eq!(w.node(item).unwrap().scene(), s1);
        assert_eq!(w.node(leaf).unwrap().scene(), s1);
    }

    #[test]
    fn move_to_scene_requires_root() {
        let (mut w, s1) = world_with_scene();
        let s2 = w.create_scene("Other");
        let root = w.create_root_in(s1, "R").unwrap();
        let child = w.create_child(root, "C").unwrap();
        assert!(matches!(
            w.move_to_scene(child, s2),
            Err(GraphError::NotARoot(n)) if n == child
        ));
        w.move_to_scene(root, s2).unwrap();
        assert!(w.roots(s1).unwrap().is_empty());
        assert_eq!(w.roots(s2).unwrap(), &[root]);
        assert_eq!(w.node(child).unwrap().scene(), s2);
    }

    #[test]
    fn destroy_is_recursive_and_idempotent() {
        let (mut w, s) = world_with_scene();
        let root = w.create_root("R").unwrap();
        let child = w.create_child(root, "C").unwrap();
        assert!(w.destroy(root));
        assert!(!w.contains(child));
        assert!(w.roots(s).unwrap().is_empty());
        assert!(!w.destroy(root));
        assert!(w.is_empty());
    }

    #[test]
    fn destroy_child_unlinks_from_parent() {
        let (mut w, _) = world_with_scene();
        let root = w.create_root("R").unwrap();
        let child = w.create_child(root, "C").unwrap();
        assert!(w.destroy(child));
        assert!(w.node(root).unwrap().children().is_empty());
    }

    #[test]
    fn deep_copy_clones_structure_and_clears_templates() {
        let (mut w, s) = world_with_scene();
        let root = w.create_root("R").unwrap();
        let child = w.create_child(root, "C").unwrap();
        w.node_mut(root).unwrap().prefab = Some("Props/Crate.ron".into());
        w.node_mut(child).unwrap().prefab = Some("Props/Crate.ron".into());
        w.node_mut(child).unwrap().tag = Some("Glow".into());
        w.add_component(child, Component::data("BoxCollider")).unwrap();

        let copy = w.deep_copy(root).unwrap();
        assert_ne!(copy, root);
        assert_eq!(w.roots(s).unwrap(), &[root, copy]);
        let copied = w.descendants(copy, true);
        assert_eq!(names(&w, &copied), ["R", "C"]);
        assert!(copied.iter().all(|&id| w.node(id).unwrap().prefab.is_none()));
        let copied_child = copied[1];
        assert_eq!(w.node(copied_child).unwrap().tag.as_deref(), Some("Glow"));
        assert!(w.has_component(copied_child, "Collider"));
        // Original untouched.
        assert!(w.node(root).unwrap().prefab.is_some());
    }

    #[test]
    fn deep_copy_remaps_internal_references() {
        let (mut w, _) = world_with_scene();
        let outside = w.create_root("Outside").unwrap();
        let root = w.create_root("R").unwrap();
        let inner = w.create_child(root, "Inner").unwrap();
        w.add_component(
            root,
            Component::FragmentManifest(FragmentManifest {
                included: vec![Some(inner), Some(outside), None],
                processors: Vec::new(),
            }),
        )
        .unwrap();

        let copy = w.deep_copy(root).unwrap();
        let copied_inner = w.node(copy).unwrap().children()[0];
        match &w.node(copy).unwrap().components[0] {
            Component::FragmentManifest(m) => {
                assert_eq!(m.included, vec![Some(copied_inner), Some(outside), None]);
            }
            other => panic!("unexpected component {other:?}"),
        }
    }

    #[test]
    fn close_scene_destroys_nodes_and_moves_active() {
        let (mut w, s1) = world_with_scene();
        let s2 = w.create_scene("B");
        let r = w.create_root_in(s1, "R").unwrap();
        w.close_scene(s1).unwrap();
        assert!(!w.contains(r));
        assert_eq!(w.active_scene(), Some(s2));
        assert!(matches!(w.close_scene(s1), Err(GraphError::SceneNotFound(_))));
        w.close_scene(s2).unwrap();
        assert_eq!(w.active_scene(), None);
    }

    #[test]
    fn components_by_capability() {
        let (mut w, _) = world_with_scene();
        let root = w.create_root("R").unwrap();
        let hidden = w.create_child(root, "Hidden").unwrap();
        w.add_component(root, Component::data("BoxCollider")).unwrap();
        w.add_component(hidden, Component::data("BoxCollider")).unwrap();
        w.add_component(hidden, Component::data("MeshFilter")).unwrap();
        w.node_mut(hidden).unwrap().active = false;

        assert_eq!(w.components_in_children(root, "Collider", true).len(), 2);
        assert_eq!(w.components_in_children(root, "Collider", false).len(), 1);
        assert!(w.has_component(hidden, "MeshFilter"));
        assert!(!w.has_component(root, "MeshFilter"));
    }

    #[test]
    fn find_first_of_capability_searches_active_nodes_across_scenes() {
        let (mut w, s1) = world_with_scene();
        let s2 = w.create_scene("B");
        let inactive = w.create_root_in(s1, "Off").unwrap();
        w.add_component(inactive, Component::data("BoxCollider")).unwrap();
        w.node_mut(inactive).unwrap().active = false;
        assert!(w.find_first_of_capability("Collider").is_none());

        let on = w.create_root_in(s2, "On").unwrap();
        w.add_component(on, Component::data("BoxCollider")).unwrap();
        let (found, c) = w.find_first_of_capability("Collider").unwrap();
        assert_eq!(found, on);
        assert_eq!(c.kind(), "BoxCollider");
    }

    #[test]
    fn remove_component_refused_while_required() {
        let (mut w, _) = world_with_scene();
        let n = w.create_root("Mesh").unwrap();
        w.add_component(n, Component::data("MeshFilter")).unwrap();
        w.add_component(n, Component::data("MeshRenderer")).unwrap();
        match w.remove_component(n, "MeshFilter") {
            Err(GraphError::ComponentRequired { kind, required_by }) => {
                assert_eq!(kind, "MeshFilter");
                assert_eq!(required_by, "MeshRenderer");
            }
            other => panic!("expected ComponentRequired, got: {other:?}"),
        }
        w.remove_component(n, "MeshRenderer").unwrap();
        w.remove_component(n, "MeshFilter").unwrap();
        assert!(w.node(n).unwrap().components.is_empty());
    }

    #[test]
    fn remove_duplicate_required_component_allowed() {
        let (mut w, _) = world_with_scene();
        let n = w.create_root("Mesh").unwrap();
        w.add_component(n, Component::data("MeshFilter")).unwrap();
        w.add_component(n, Component::data("MeshFilter")).unwrap();
        w.add_component(n, Component::data("MeshRenderer")).unwrap();
        w.remove_component(n, "MeshFilter").unwrap();
        assert!(w.remove_component(n, "MeshFilter").is_err());
    }

    #[test]
    fn remove_missing_component() {
        let (mut w, _) = world_with_scene();
        let n = w.create_root("N").unwrap();
        assert!(matches!(
            w.remove_component(n, "Light"),
            Err(GraphError::ComponentNotFound { .. })
        ));
    }

    #[test]
    fn find_named_searches_preorder() {
        let (mut w, s) = world_with_scene();
        let root = w.create_root("R").unwrap();
        let c = w.create_child(root, "Target").unwrap();
        w.create_root("Target").unwrap();
        assert_eq!(w.find_named(s, "Target"), Some(c));
        assert_eq!(w.find_named(s, "Nope"), None);
    }

    #[test]
    fn graph_error_display_messages() {
        let err = GraphError::ComponentRequired {
            kind: "MeshFilter".into(),
            required_by: "MeshRenderer".into(),
        };
        assert_eq!(
            err.to_string(),
            "cannot remove 'MeshFilter': required by 'MeshRenderer'"
        );
        assert_eq!(GraphError::NoActiveScene.to_string(), "no active scene");
    }
}
