//! Components attached to scene nodes.
//!
//! Authored content is carried by [`DataComponent`]s: a type name plus a bag
//! of properties. The two builder markers, [`FragmentManifest`] and
//! [`MainManifest`], are first-class variants because they hold node
//! references that must survive copying and persistence.

use crate::id::NodeId;
use crate::manifest::{FragmentManifest, MainManifest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Component type name of the per-fragment manifest marker.
pub const FRAGMENT_MANIFEST: &str = "FragmentManifest";

/// Component type name of the post-build main manifest marker.
pub const MAIN_MANIFEST: &str = "MainManifest";

/// A property value on a data component or a processor spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl PropValue {
    /// Short type label used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            PropValue::Bool(_) => "bool",
            PropValue::Int(_) => "int",
            PropValue::Float(_) => "float",
            PropValue::Text(_) => "text",
            PropValue::List(_) => "list",
        }
    }
}

/// An authored component: a registered (or ad hoc) type name and its
/// properties. Capabilities and hard dependencies come from the
/// [`ComponentRegistry`](crate::registry::ComponentRegistry), not from here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataComponent {
    pub kind: String,
    #[serde(default)]
    pub props: BTreeMap<String, PropValue>,
}

impl DataComponent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            props: BTreeMap::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with_prop(mut self, key: impl Into<String>, value: PropValue) -> Self {
        self.props.insert(key.into(), value);
        self
    }
}

/// A component instance living on a node in the world.
#[derive(Debug, Clone, PartialEq)]
pub enum Component {
    Data(DataComponent),
    FragmentManifest(FragmentManifest),
    MainManifest(MainManifest),
}

impl Component {
    /// Convenience constructor for a property-less data component.
    pub fn data(kind: impl Into<String>) -> Self {
        Component::Data(DataComponent::new(kind))
    }

    /// The component's type name.
    pub fn kind(&self) -> &str {
        match self {
            Component::Data(data) => &data.kind,
            Component::FragmentManifest(_) => FRAGMENT_MANIFEST,
            Component::MainManifest(_) => MAIN_MANIFEST,
        }
    }

    /// Rewrite every node reference held by this component.
    pub(crate) fn remap_refs(&mut self, mut map: impl FnMut(NodeId) -> NodeId) {
        match self {
            Component::Data(_) => {}
            Component::FragmentManifest(manifest) => {
                for slot in manifest.included.iter_mut().flatten() {
                    *slot = map(*slot);
                }
            }
            Component::MainManifest(manifest) => {
                for slot in manifest.excluded.iter_mut().flatten() {
                    *slot = map(*slot);
                }
            }
        }
    }
}
