//! Processor capabilities for extending the build pipeline.
//!
//! Two hooks exist. A [`FragmentProcessor`] is listed in a fragment's
//! manifest as a [`ProcessorSpec`] and runs once against that fragment's
//! merged root. A [`FinalProcessor`] is registered globally and runs once
//! over the reloaded output, locating its own targets. Both are created
//! through factories in a [`ProcessorRegistry`] that collaborators fill at
//! startup; final processors run in registration order.

use crate::component::PropValue;
use crate::document::DocumentError;
use crate::id::{NodeId, SceneId};
use crate::storage::{SceneStorage, StorageError};
use crate::world::{GraphError, World};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// ProcessorSpec
// ---------------------------------------------------------------------------

/// A data-driven processor entry in a fragment manifest: a registered kind
/// plus its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorSpec {
    pub kind: String,
    #[serde(default)]
    pub params: BTreeMap<String, PropValue>,
}

impl ProcessorSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: PropValue) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Optional text parameter.
    pub fn text(&self, key: &str) -> Result<Option<&str>, ProcessorError> {
        match self.params.get(key) {
            None => Ok(None),
            Some(PropValue::Text(s)) => Ok(Some(s)),
            Some(other) => Err(self.invalid(key, "text", other)),
        }
    }

    /// List parameter. A single text value is accepted as a one-element
    /// list; a missing key is an empty list.
    pub fn list(&self, key: &str) -> Result<Vec<String>, ProcessorError> {
        match self.params.get(key) {
            None => Ok(Vec::new()),
            Some(PropValue::List(items)) => Ok(items.clone()),
            Some(PropValue::Text(s)) => Ok(vec![s.clone()]),
            Some(other) => Err(self.invalid(key, "list", other)),
        }
    }

    /// Boolean parameter, `false` when missing.
    pub fn flag(&self, key: &str) -> Result<bool, ProcessorError> {
        match self.params.get(key) {
            None => Ok(false),
            Some(PropValue::Bool(b)) => Ok(*b),
            Some(other) => Err(self.invalid(key, "bool", other)),
        }
    }

    fn invalid(&self, key: &str, expected: &'static str, found: &PropValue) -> ProcessorError {
        ProcessorError::InvalidParam {
            kind: self.kind.clone(),
            key: key.to_string(),
            expected,
            found: found.type_name(),
        }
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Runs once per merged fragment, against that fragment's root in the
/// target scene. May mutate anything reachable through the context; the
/// pipeline trusts it to stay within its fragment.
pub trait FragmentProcessor: std::fmt::Debug {
    fn name(&self) -> &str;

    fn on_build_scene(
        &mut self,
        ctx: &mut ProcessorContext<'_>,
        root: NodeId,
    ) -> Result<(), ProcessorError>;
}

/// Runs once per build over the reloaded output. Receives no node handle.
pub trait FinalProcessor: std::fmt::Debug {
    fn name(&self) -> &str;

    fn on_post_build_scene(&mut self, ctx: &mut ProcessorContext<'_>) -> Result<(), ProcessorError>;
}

// ---------------------------------------------------------------------------
// ProcessorContext
// ---------------------------------------------------------------------------

/// Mutable context handed to processors.
pub struct ProcessorContext<'a> {
    /// Every open scene. Processors usually stay inside [`Self::scene`].
    pub world: &'a mut World,
    /// Read access to assets, for templates.
    pub storage: &'a dyn SceneStorage,
    /// The target scene being built.
    pub scene: SceneId,
}

impl<'a> ProcessorContext<'a> {
    pub fn new(world: &'a mut World, storage: &'a dyn SceneStorage, scene: SceneId) -> Self {
        Self {
            world,
            storage,
            scene,
        }
    }

    /// Instantiate the template asset at `path` under `parent`, linking the
    /// new nodes to the template. Returns the template's first top-level
    /// node.
    pub fn instantiate_template(
        &mut self,
        path: &str,
        parent: NodeId,
    ) -> Result<NodeId, ProcessorError> {
        let doc = self.storage.read(path)?;
        let first = doc
            .top_level()
            .next()
            .ok_or_else(|| ProcessorError::EmptyTemplate(path.to_string()))?;
        let ids = self
            .world
            .instantiate_document(&doc, self.scene, Some(parent), Some(path))?;
        Ok(ids[first])
    }
}

// ---------------------------------------------------------------------------
// ProcessorRegistry
// ---------------------------------------------------------------------------

/// Builds a fragment processor from its manifest entry.
pub type FragmentFactory =
    Box<dyn Fn(&ProcessorSpec) -> Result<Box<dyn FragmentProcessor>, ProcessorError>>;

/// Builds a final processor with no arguments.
pub type FinalFactory = Box<dyn Fn() -> Box<dyn FinalProcessor>>;

/// Explicit table of processor factories.
#[derive(Default)]
pub struct ProcessorRegistry {
    fragments: BTreeMap<String, FragmentFactory>,
    finals: Vec<(String, FinalFactory)>,
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("fragments", &self.fragments.keys().collect::<Vec<_>>())
            .field(
                "finals",
                &self.finals.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fragment processor kind. Re-registering replaces the
    /// previous factory.
    pub fn register_fragment<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&ProcessorSpec) -> Result<Box<dyn FragmentProcessor>, ProcessorError> + 'static,
    {
        self.fragments.insert(kind.to_string(), Box::new(factory));
    }

    /// Register a final processor. Finals run in registration order.
    pub fn register_final<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn FinalProcessor> + 'static,
    {
        self.finals.push((name.to_string(), Box::new(factory)));
    }

    pub fn has_fragment(&self, kind: &str) -> bool {
        self.fragments.contains_key(kind)
    }

    /// Instantiate the processor described by `spec`.
    pub fn create_fragment(
        &self,
        spec: &ProcessorSpec,
    ) -> Result<Box<dyn FragmentProcessor>, ProcessorError> {
        let factory = self
            .fragments
            .get(&spec.kind)
            .ok_or_else(|| ProcessorError::UnknownKind(spec.kind.clone()))?;
        factory(spec)
    }

    /// One fresh instance of every final processor, in registration order.
    pub fn create_finals(&self) -> Vec<Box<dyn FinalProcessor>> {
        self.finals.iter().map(|(_, factory)| factory()).collect()
    }

    pub fn fragment_kinds(&self) -> impl Iterator<Item = &str> {
        self.fragments.keys().map(String::as_str)
    }

    pub fn final_names(&self) -> impl Iterator<Item = &str> {
        self.finals.iter().map(|(n, _)| n.as_str())
    }
}

// ---------------------------------------------------------------------------
// ProcessorError
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("unknown processor kind '{0}'")]
    UnknownKind(String),
    #[error("processor '{kind}': parameter '{key}' must be {expected}, got {found}")]
    InvalidParam {
        kind: String,
        key: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("template '{0}' has no nodes")]
    EmptyTemplate(String),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("{0}")]
    Failed(String),
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{NodeRecord, SceneDocument};
    use crate::storage::MemoryStorage;

    #[derive(Debug)]
    struct Marker {
        label: String,
    }

    impl FragmentProcessor for Marker {
        fn name(&self) -> &str {
            "Marker"
        }

        fn on_build_scene(
            &mut self,
            ctx: &mut ProcessorContext<'_>,
            root: NodeId,
        ) -> Result<(), ProcessorError> {
            ctx.world.create_child(root, self.label.clone())?;
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Noop;

    impl FinalProcessor for Noop {
        fn name(&self) -> &str {
            "Noop"
        }

        fn on_post_build_scene(&mut self, _ctx: &mut ProcessorContext<'_>) -> Result<(), ProcessorError> {
            Ok(())
        }
    }

    fn registry() -> ProcessorRegistry {
        let mut r = ProcessorRegistry::new();
        r.register_fragment("Marker", |spec| {
            let label = spec.text("label")?.unwrap_or("Marked").to_string();
            Ok(Box::new(Marker { label }))
        });
        r
    }

    #[test]
    fn spec_param_accessors() {
        let spec = ProcessorSpec::new("X")
            .with_param("name", PropValue::Text("a".into()))
            .with_param("tags", PropValue::List(vec!["t1".into(), "t2".into()]))
            .with_param("on", PropValue::Bool(true));
        assert_eq!(spec.text("name").unwrap(), Some("a"));
        assert_eq!(spec.text("missing").unwrap(), None);
        assert_eq!(spec.list("tags").unwrap(), vec!["t1", "t2"]);
        assert_eq!(spec.list("name").unwrap(), vec!["a"]);
        assert!(spec.list("missing").unwrap().is_empty());
        assert!(spec.flag("on").unwrap());
        assert!(!spec.flag("missing").unwrap());
    }

    #[test]
    fn spec_param_type_mismatch() {
        let spec = ProcessorSpec::new("X").with_param("tags", PropValue::Int(3));
        match spec.list("tags") {
            Err(ProcessorError::InvalidParam {
                kind,
                key,
                expected,
                found,
            }) => {
                assert_eq!(kind, "X");
                assert_eq!(key, "tags");
                assert_eq!(expected, "list");
                assert_eq!(found, "int");
            }
            other => panic!("expected InvalidParam, got: {other:?}"),
        }
    }

    #[test]
    fn create_registered_fragment_and_run() {
        let reg = registry();
        let storage = MemoryStorage::new();
        let mut world = World::new();
        let scene = world.create_scene("Out");
        let root = world.create_root("Root").unwrap();

        let spec = ProcessorSpec::new("Marker").with_param("label", PropValue::Text("Hi".into()));
        let mut p = reg.create_fragment(&spec).unwrap();
        assert_eq!(p.name(), "Marker");
        let mut ctx = ProcessorContext::new(&mut world, &storage, scene);
        p.on_build_scene(&mut ctx, root).unwrap();
        assert!(world.find_named(scene, "Hi").is_some());
    }

    #[test]
    fn unknown_kind() {
        let reg = registry();
        assert!(!reg.has_fragment("Nope"));
        match reg.create_fragment(&ProcessorSpec::new("Nope")) {
            Err(ProcessorError::UnknownKind(k)) => assert_eq!(k, "Nope"),
            other => panic!("expected UnknownKind, got: {other:?}"),
        }
    }

    #[test]
    fn finals_in_registration_order() {
        let mut reg = ProcessorRegistry::new();
        reg.register_final("B", || Box::new(Noop));
        reg.register_final("A", || Box::new(Noop));
        assert_eq!(reg.final_names().collect::<Vec<_>>(), vec!["B", "A"]);
        assert_eq!(reg.create_finals().len(), 2);
    }

    #[test]
    fn instantiate_template_links_nodes() {
        let mut storage = MemoryStorage::new();
        let mut frame = NodeRecord::new("Frame");
        frame.prefab = Some("ignored".into());
        let mut inner = NodeRecord::new("Inner");
        inner.parent = Some(0);
        storage
            .insert(
                "Templates/Frame.scene",
                &SceneDocument {
                    nodes: vec![frame, inner],
                },
            )
            .unwrap();
        let mut world = World::new();
        let scene = world.create_scene("Out");
        let root = world.create_root("Root").unwrap();

        let mut ctx = ProcessorContext::new(&mut world, &storage, scene);
        let frame = ctx.instantiate_template("Templates/Frame.scene", root).unwrap();
        assert_eq!(world.node(root).unwrap().children(), &[frame]);
        assert_eq!(
            world.node(frame).unwrap().prefab.as_deref(),
            Some("Templates/Frame.scene")
        );
        assert_eq!(world.node(frame).unwrap().children().len(), 1);
    }

    #[test]
    fn instantiate_missing_or_empty_template() {
        let mut storage = MemoryStorage::new();
        storage.insert("Empty.scene", &SceneDocument::default()).unwrap();
        let mut world = World::new();
        let scene = world.create_scene("Out");
        let root = world.create_root("Root").unwrap();
        let mut ctx = ProcessorContext::new(&mut world, &storage, scene);
        assert!(matches!(
            ctx.instantiate_template("Missing.scene", root),
            Err(ProcessorError::Storage(StorageError::NotFound(_)))
        ));
        assert!(matches!(
            ctx.instantiate_template("Empty.scene", root),
            Err(ProcessorError::EmptyTemplate(_))
        ));
    }

    #[test]
    fn registry_debug_lists_names() {
        let mut reg = registry();
        reg.register_final("Tidy", || Box::new(Noop));
        let dbg = format!("{reg:?}");
        assert!(dbg.contains("Marker"));
        assert!(dbg.contains("Tidy"));
    }
}
