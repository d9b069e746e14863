use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a node in the world. Generational: a key to a destroyed
    /// node never resolves again, even after its slot is reused.
    pub struct NodeId;
}

/// Identifies an open scene graph in the world. Never reused within one
/// world, so a stale id keeps failing lookups after the scene is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SceneId(pub u32);

/// Identifies a component type in the registry. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentTypeId(pub u32);

impl std::fmt::Display for SceneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scene#{}", self.0)
    }
}
