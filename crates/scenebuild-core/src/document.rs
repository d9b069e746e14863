//! Persistent form of a scene graph.
//!
//! A [`SceneDocument`] is a flat, preorder list of node records. Parents and
//! node references are local indices into that list, so a document is
//! self-contained: references to nodes outside the exported scene are
//! written as null.

use crate::component::{Component, DataComponent};
use crate::id::{NodeId, SceneId};
use crate::manifest::{FragmentManifest, MainManifest};
use crate::processor::ProcessorSpec;
use crate::world::{GraphError, World};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDocument {
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Index of the parent record. Must precede this record.
    #[serde(default)]
    pub parent: Option<u32>,
    #[serde(default)]
    pub components: Vec<ComponentRecord>,
    #[serde(default)]
    pub prefab: Option<String>,
}

fn default_active() -> bool {
    true
}

impl NodeRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: None,
            active: true,
            parent: None,
            components: Vec::new(),
            prefab: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComponentRecord {
    Data(DataComponent),
    FragmentManifest(ManifestRecord),
    MainManifest(MainManifestRecord),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestRecord {
    #[serde(default)]
    pub included: Vec<Option<u32>>,
    #[serde(default)]
    pub processors: Vec<Option<ProcessorSpec>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MainManifestRecord {
    #[serde(default)]
    pub excluded: Vec<Option<u32>>,
}

impl SceneDocument {
    /// Indices of records without a parent.
    pub fn top_level(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(i, _)| i)
    }

    /// Parents must reference an earlier record.
    pub fn validate(&self) -> Result<(), DocumentError> {
        for (index, node) in self.nodes.iter().enumerate() {
            match node.parent {
                Some(parent) if parent as usize >= index => {
                    return Err(DocumentError::InvalidParent { index, parent });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Errors that can occur when instantiating a document into the world.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("record {index} has parent {parent}, which does not precede it")]
    InvalidParent { index: usize, parent: u32 },
    #[error(transparent)]
    Graph(#[from] GraphError),
}

// ---------------------------------------------------------------------------
// World <-> document
// ---------------------------------------------------------------------------

impl World {
    /// Create every record of `doc` in `scene`. Top-level records become
    /// roots of the scene, or children of `parent` when one is given.
    ///
    /// With `prefab_link` set, every created node is linked to that template.
    /// Out-of-range references load as null. Returns the created ids in
    /// record order; nothing is created if the document is malformed.
    pub fn instantiate_document(
        &mut self,
        doc: &SceneDocument,
        scene: SceneId,
        parent: Option<NodeId>,
        prefab_link: Option<&str>,
    ) -> Result<Vec<NodeId>, DocumentError> {
        doc.validate()?;
        self.roots(scene)?;
        if let Some(p) = parent.filter(|&p| !self.contains(p)) {
            return Err(GraphError::NodeNotFound(p).into());
        }

        let mut ids: Vec<NodeId> = Vec::with_capacity(doc.nodes.len());
        for record in &doc.nodes {
            let id = match (record.parent, parent) {
                (Some(local), _) => self.create_child(ids[local as usize], record.name.clone())?,
                (None, Some(p)) => self.create_child(p, record.name.clone())?,
                (None, None) => self.create_root_in(scene, record.name.clone())?,
            };
            ids.push(id);
        }

        let resolve = |slot: &Option<u32>, what: &str| -> Option<NodeId> {
            let index = (*slot)?;
            match ids.get(index as usize) {
                Some(&id) => Some(id),
                None => {
                    warn!(index, what, "document reference out of range; loading as null");
                    None
                }
            }
        };

        let mut resolved: Vec<Vec<Component>> = Vec::with_capacity(doc.nodes.len());
        for record in &doc.nodes {
            let components = record
                .components
                .iter()
                .map(|c| match c {
                    ComponentRecord::Data(data) => Component::Data(data.clone()),
                    ComponentRecord::FragmentManifest(m) => {
                        Component::FragmentManifest(FragmentManifest {
                            included: m.included.iter().map(|s| resolve(s, "included")).collect(),
                            processors: m.processors.clone(),
                        })
                    }
                    ComponentRecord::MainManifest(m) => Component::MainManifest(MainManifest {
                        excluded: m.excluded.iter().map(|s| resolve(s, "excluded")).collect(),
                    }),
                })
                .collect();
            resolved.push(components);
        }

        for ((record, &id), components) in doc.nodes.iter().zip(&ids).zip(resolved) {
            if let Some(node) = self.node_mut(id) {
                node.tag = record.tag.clone();
                node.active = record.active;
                node.components = components;
                node.prefab = prefab_link.map(str::to_string).or_else(|| record.prefab.clone());
            }
        }
        Ok(ids)
    }

    /// Export a scene in preorder. References to nodes outside the scene
    /// (or already destroyed) are written as null.
    pub fn export_scene(&self, scene: SceneId) -> Result<SceneDocument, GraphError> {
        let order = self.scene_nodes(scene, true)?;
        let index: HashMap<NodeId, u32> = order
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i as u32))
            .collect();
        let local = |slot: &Option<NodeId>| slot.and_then(|id| index.get(&id).copied());

        let mut nodes = Vec::with_capacity(order.len());
        for &id in &order {
            let data = self.node(id).ok_or(GraphError::NodeNotFound(id))?;
            let components = data
                .components
                .iter()
                .map(|c| match c {
                    Component::Data(d) => ComponentRecord::Data(d.clone()),
                    Component::FragmentManifest(m) => ComponentRecord::FragmentManifest(ManifestRecord {
                        included: m.included.iter().map(|s| local(s)).collect(),
                        processors: m.processors.clone(),
                    }),
                    Component::MainManifest(m) => ComponentRecord::MainManifest(MainManifestRecord {
                        excluded: m.excluded.iter().map(|s| local(s)).collect(),
                    }),
                })
                .collect();
            nodes.push(NodeRecord {
                name: data.name.clone(),
                tag: data.tag.clone(),
                active: data.active,
                parent: data.parent().and_then(|p| index.get(&p).copied()),
                components,
                prefab: data.prefab.clone(),
            });
        }
        Ok(SceneDocument { nodes })
    }
}
