//! Scenebuild Core -- composes scene fragments into one built scene.
//!
//! A build takes an ordered list of scene fragments, one of which is the
//! main fragment, and produces a single persisted output scene. Each other
//! fragment declares through its manifest which top-level objects take part
//! and which processors run on them.
//!
//! # Pipeline
//!
//! [`pipeline::SceneBuilder`] drives a [`pipeline::BuildRun`] through a fixed
//! sequence of stages:
//!
//! 1. **Load** -- Open an empty scene, the main fragment, then every other
//!    fragment additively.
//! 2. **Merge** -- Resolve manifests, gather each fragment's included objects
//!    under a root named after the fragment and move that root into the
//!    main fragment's scene.
//! 3. **Transform** -- Optionally unpack roots into plain copies, then run
//!    each fragment's processors against its root.
//! 4. **Persist** -- Write the merged scene to the output path and reopen it.
//! 5. **Post-process** -- Destroy the main manifest's excluded objects, run
//!    final processors, save and close.
//!
//! The previously open scene is restored on success and on failure alike.
//!
//! # Key Types
//!
//! - [`world::World`] -- Arena of nodes grouped into open scenes.
//! - [`editor::Editor`] -- Open, save and close scenes against a
//!   [`storage::SceneStorage`].
//! - [`registry::ComponentRegistry`] -- Component kinds, their capabilities
//!   and hard requirements (frozen after build).
//! - [`processor::ProcessorRegistry`] -- Fragment and final processor
//!   factories.
//! - [`dependency::DependencyRemover`] -- Dependency-aware component removal.
//! - [`serialize`] -- Versioned binary encoding of scene documents via
//!   bitcode.

pub mod component;
pub mod dependency;
pub mod document;
pub mod editor;
pub mod id;
pub mod manifest;
pub mod merge;
pub mod pipeline;
pub mod processor;
pub mod registry;
pub mod report;
pub mod serialize;
pub mod session;
pub mod storage;
pub mod world;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
