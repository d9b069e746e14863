//! Shared test helpers for unit and integration tests.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so downstream
//! crates can pull them in through the `test-utils` feature.

use crate::component::{DataComponent, PropValue};
use crate::document::{
    ComponentRecord, MainManifestRecord, ManifestRecord, NodeRecord, SceneDocument,
};
use crate::editor::Editor;
use crate::id::NodeId;
use crate::pipeline::{BuildError, BuildObserver, BuildOptions, BuildRequest, BuildStage};
use crate::processor::{
    FinalProcessor, FragmentProcessor, ProcessorContext, ProcessorError, ProcessorRegistry,
    ProcessorSpec,
};
use crate::session::Pacing;
use crate::storage::{MemoryStorage, SceneStorage, StorageError};
use std::collections::BTreeSet;

// ===========================================================================
// Documents
// ===========================================================================

/// Builds a [`SceneDocument`] record by record. Modifiers apply to the most
/// recently added record; record indices follow insertion order.
#[derive(Debug, Default)]
pub struct DocBuilder {
    doc: SceneDocument,
}

impl DocBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, name: &str) -> Self {
        self.doc.nodes.push(NodeRecord::new(name));
        self
    }

    pub fn child(mut self, parent: u32, name: &str) -> Self {
        let mut record = NodeRecord::new(name);
        record.parent = Some(parent);
        self.doc.nodes.push(record);
        self
    }

    pub fn tag(self, tag: &str) -> Self {
        self.edit(|n| n.tag = Some(tag.to_string()))
    }

    pub fn inactive(self) -> Self {
        self.edit(|n| n.active = false)
    }

    pub fn prefab(self, path: &str) -> Self {
        self.edit(|n| n.prefab = Some(path.to_string()))
    }

    pub fn component(self, kind: &str) -> Self {
        self.edit(|n| {
            n.components
                .push(ComponentRecord::Data(DataComponent::new(kind)))
        })
    }

    pub fn component_with(self, component: DataComponent) -> Self {
        self.edit(|n| n.components.push(ComponentRecord::Data(component)))
    }

    pub fn manifest(self, included: &[Option<u32>], processors: Vec<Option<ProcessorSpec>>) -> Self {
        let record = ManifestRecord {
            included: included.to_vec(),
            processors,
        };
        self.edit(|n| n.components.push(ComponentRecord::FragmentManifest(record)))
    }

    pub fn main_manifest(self, excluded: &[Option<u32>]) -> Self {
        let record = MainManifestRecord {
            excluded: excluded.to_vec(),
        };
        self.edit(|n| n.components.push(ComponentRecord::MainManifest(record)))
    }

    pub fn build(self) -> SceneDocument {
        self.doc
    }

    fn edit(mut self, f: impl FnOnce(&mut NodeRecord)) -> Self {
        if let Some(last) = self.doc.nodes.last_mut() {
            f(last);
        }
        self
    }
}

pub fn spec(kind: &str) -> ProcessorSpec {
    ProcessorSpec::new(kind)
}

pub fn text(value: &str) -> PropValue {
    PropValue::Text(value.to_string())
}

// ===========================================================================
// Fixture assets
// ===========================================================================

pub const MAIN_PATH: &str = "Scenes/Main.scene";
pub const SECOND_PATH: &str = "Scenes/Second.scene";
pub const OUTPUT_PATH: &str = "Scenes/Built.scene";

/// Main fragment: a ground node, a scaffold excluded by the main manifest.
pub fn main_doc() -> SceneDocument {
    DocBuilder::new()
        .node("Ground")
        .node("Scaffold")
        .node("Main Manifest")
        .main_manifest(&[Some(1)])
        .build()
}

/// Second fragment: a tree with a leaf, included by its manifest, plus a
/// stray node the manifest leaves behind.
pub fn second_doc() -> SceneDocument {
    DocBuilder::new()
        .node("Tree")
        .child(0, "Leaf")
        .node("Stray")
        .node("Manifest")
        .manifest(&[Some(0)], vec![Some(spec("rename-root"))])
        .build()
}

pub fn memory_storage() -> MemoryStorage {
    let mut storage = MemoryStorage::new();
    storage.insert(MAIN_PATH, &main_doc()).unwrap();
    storage.insert(SECOND_PATH, &second_doc()).unwrap();
    storage
}

pub fn memory_editor() -> Editor {
    Editor::new(memory_storage())
}

pub fn two_fragment_request() -> BuildRequest {
    BuildRequest {
        name: "test".into(),
        fragments: vec![Some(MAIN_PATH.into()), Some(SECOND_PATH.into())],
        main_index: 0,
        output_path: OUTPUT_PATH.into(),
        unpack_prefabs: false,
    }
}

/// Automatic pacing with no delay.
pub fn immediate() -> BuildOptions {
    BuildOptions {
        load_built_result: false,
        pacing: Pacing::immediate(),
    }
}

// ===========================================================================
// Processors
// ===========================================================================

/// Renames the fragment root to its `name` parameter, or appends
/// " (processed)" when there is none.
#[derive(Debug, Default)]
pub struct RenameRoot {
    pub to: Option<String>,
}

impl RenameRoot {
    pub fn from_spec(spec: &ProcessorSpec) -> Result<Self, ProcessorError> {
        Ok(Self {
            to: spec.text("name")?.map(str::to_string),
        })
    }
}

impl FragmentProcessor for RenameRoot {
    fn name(&self) -> &str {
        "rename-root"
    }

    fn on_build_scene(
        &mut self,
        ctx: &mut ProcessorContext<'_>,
        root: NodeId,
    ) -> Result<(), ProcessorError> {
        let node = ctx
            .world
            .node_mut(root)
            .ok_or_else(|| ProcessorError::Failed("root is gone".into()))?;
        match &self.to {
            Some(name) => node.name = name.clone(),
            None => node.name.push_str(" (processed)"),
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FailingProcessor;

impl FragmentProcessor for FailingProcessor {
    fn name(&self) -> &str {
        "fail"
    }

    fn on_build_scene(
        &mut self,
        _ctx: &mut ProcessorContext<'_>,
        _root: NodeId,
    ) -> Result<(), ProcessorError> {
        Err(ProcessorError::Failed("fragment processor failed".into()))
    }
}

/// Final processor that adds a "Finalized" root to the output.
#[derive(Debug, Default)]
pub struct MarkFinal;

impl FinalProcessor for MarkFinal {
    fn name(&self) -> &str {
        "mark-final"
    }

    fn on_post_build_scene(&mut self, ctx: &mut ProcessorContext<'_>) -> Result<(), ProcessorError> {
        let scene = ctx.scene;
        ctx.world.create_root_in(scene, "Finalized")?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FailingFinal;

impl FinalProcessor for FailingFinal {
    fn name(&self) -> &str {
        "fail-final"
    }

    fn on_post_build_scene(&mut self, _ctx: &mut ProcessorContext<'_>) -> Result<(), ProcessorError> {
        Err(ProcessorError::Failed("final processor failed".into()))
    }
}

/// `rename-root` and `fail` fragment kinds, no finals.
pub fn test_processors() -> ProcessorRegistry {
    let mut registry = ProcessorRegistry::new();
    registry.register_fragment("rename-root", |spec| Ok(Box::new(RenameRoot::from_spec(spec)?)));
    registry.register_fragment("fail", |_| Ok(Box::new(FailingProcessor)));
    registry
}

// ===========================================================================
// Observer
// ===========================================================================

/// Records every callback.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub before_build: usize,
    pub labels: Vec<String>,
    pub progress: Vec<f32>,
    pub suspended: Vec<BuildStage>,
    pub failures: Vec<String>,
    pub cleared: usize,
}

impl BuildObserver for RecordingObserver {
    fn before_build(&mut self, _editor: &mut Editor) {
        self.before_build += 1;
    }

    fn on_progress(&mut self, label: &str, progress: f32) {
        self.labels.push(label.to_string());
        self.progress.push(progress);
    }

    fn on_suspended(&mut self, next: BuildStage) {
        self.suspended.push(next);
    }

    fn clear_progress(&mut self) {
        self.cleared += 1;
    }

    fn on_failure(&mut self, error: &BuildError) {
        self.failures.push(error.to_string());
    }
}

// ===========================================================================
// Fault injection
// ===========================================================================

/// [`MemoryStorage`] wrapper that rejects chosen operations.
#[derive(Debug, Default)]
pub struct FailingStorage {
    pub inner: MemoryStorage,
    /// Paths whose reads fail.
    pub fail_reads: BTreeSet<String>,
    /// Writes succeed this many times, then fail.
    pub writes_before_failure: Option<usize>,
    writes: usize,
}

impl FailingStorage {
    pub fn new(inner: MemoryStorage) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn fail_read(mut self, path: &str) -> Self {
        self.fail_reads.insert(path.to_string());
        self
    }

    pub fn fail_writes_after(mut self, n: usize) -> Self {
        self.writes_before_failure = Some(n);
        self
    }

    fn rejected(path: &str, what: &str) -> StorageError {
        StorageError::Rejected {
            path: path.to_string(),
            reason: format!("injected {what} failure"),
        }
    }
}

impl SceneStorage for FailingStorage {
    fn read(&self, path: &str) -> Result<SceneDocument, StorageError> {
        if self.fail_reads.contains(path) {
            return Err(Self::rejected(path, "read"));
        }
        self.inner.read(path)
    }

    fn write(&mut self, path: &str, doc: &SceneDocument) -> Result<(), StorageError> {
        if self
            .writes_before_failure
            .is_some_and(|limit| self.writes >= limit)
        {
            return Err(Self::rejected(path, "write"));
        }
        self.writes += 1;
        self.inner.write(path, doc)
    }

    fn exists(&self, path: &str) -> bool {
        self.inner.exists(path)
    }

    fn delete(&mut self, path: &str) -> Result<bool, StorageError> {
        self.inner.delete(path)
    }
}
