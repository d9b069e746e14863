//! The build pipeline.
//!
//! A build walks a fixed sequence of [`BuildStage`]s over the editor's open
//! scenes: open an empty scene, load the main fragment (which becomes the
//! target scene), load the remaining fragments next to it, resolve their
//! manifests, merge, optionally unpack, run fragment processors, persist,
//! reload, apply exclusions, run final processors, save and close.
//!
//! [`BuildRun`] is an explicit state machine. Each [`BuildRun::poll`] runs at
//! most one stage. Under [`Pacing::Manual`] the run suspends before every
//! stage until [`BuildRun::resume`] is called. Whatever happens, finishing
//! the run releases the build slot and reopens the scene that was open
//! before the build (or the output, when requested and written).

use crate::editor::{Editor, EditorError, OpenMode};
use crate::id::SceneId;
use crate::manifest::find_main_manifest;
use crate::merge::{
    Fragment, LoadedFragment, MergeError, ResolvedFragment, RootMap, merge_fragment,
    resolve_manifest, unpack_roots,
};
use crate::processor::{ProcessorError, ProcessorRegistry};
use crate::report::{BuildReport, BuildWarning, Warnings};
use crate::session::{BuildSession, BuildSlot, Pacing, SlotGuard};
use crate::world::GraphError;
use std::fmt;
use tracing::{debug, error, info, warn};

// ---------------------------------------------------------------------------
// Request and options
// ---------------------------------------------------------------------------

/// What to build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildRequest {
    pub name: String,
    /// Fragment asset references. `None` is a null slot.
    pub fragments: Vec<Option<String>>,
    /// Index of the main fragment in `fragments`.
    pub main_index: usize,
    pub output_path: String,
    /// Replace merged roots with deep copies before processors run.
    pub unpack_prefabs: bool,
}

impl BuildRequest {
    /// Checks that must pass before a build may start.
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.output_path.trim().is_empty() {
            return Err(BuildError::InvalidConfig(format!(
                "build '{}' has no output path",
                self.name
            )));
        }
        Ok(())
    }
}

/// Host-side switches for one build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Open the output when the build finishes instead of the scene that
    /// was open before.
    pub load_built_result: bool,
    pub pacing: Pacing,
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Pipeline stages in execution order. `Unpacked` only runs when the
/// request asks for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStage {
    EmptyGraph,
    MainLoaded,
    FragmentsLoaded,
    ManifestsResolved,
    Merged,
    Unpacked,
    FragmentProcessed,
    Persisted,
    Reloaded,
    ExclusionsApplied,
    FinalProcessed,
    Saved,
    Closed,
}

impl BuildStage {
    pub const ALL: [BuildStage; 13] = [
        BuildStage::EmptyGraph,
        BuildStage::MainLoaded,
        BuildStage::FragmentsLoaded,
        BuildStage::ManifestsResolved,
        BuildStage::Merged,
        BuildStage::Unpacked,
        BuildStage::FragmentProcessed,
        BuildStage::Persisted,
        BuildStage::Reloaded,
        BuildStage::ExclusionsApplied,
        BuildStage::FinalProcessed,
        BuildStage::Saved,
        BuildStage::Closed,
    ];

    /// Progress label shown while this stage is about to run.
    pub fn label(self) -> &'static str {
        match self {
            BuildStage::EmptyGraph => "Loading empty scene...",
            BuildStage::MainLoaded => "Loading main scene...",
            BuildStage::FragmentsLoaded => "Loading additive scenes...",
            BuildStage::ManifestsResolved => "Loading scene data...",
            BuildStage::Merged => "Building scene...",
            BuildStage::Unpacked => "Unpacking prefabs...",
            BuildStage::FragmentProcessed => "Running fragment processors...",
            BuildStage::Persisted => "Saving built scene...",
            BuildStage::Reloaded => "Reloading built scene...",
            BuildStage::ExclusionsApplied => "Removing excluded objects...",
            BuildStage::FinalProcessed => "Running final scene processors...",
            BuildStage::Saved => "Saving final scene...",
            BuildStage::Closed => "Closing built scene...",
        }
    }

    /// The stages a build runs, in order.
    pub fn sequence(unpack: bool) -> Vec<BuildStage> {
        Self::ALL
            .into_iter()
            .filter(|s| unpack || *s != BuildStage::Unpacked)
            .collect()
    }

    fn first() -> Self {
        BuildStage::EmptyGraph
    }

    fn next(self, unpack: bool) -> Option<BuildStage> {
        let at = Self::ALL.iter().position(|s| *s == self)?;
        Self::ALL[at + 1..]
            .iter()
            .copied()
            .find(|s| unpack || *s != BuildStage::Unpacked)
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A stage failed. Aborts the rest of the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("main fragment index {index} is out of range ({len} fragments)")]
    MainIndexOutOfRange { index: usize, len: usize },
    #[error("main fragment #{0} is null")]
    MissingMainFragment(usize),
    #[error("main fragment '{0}' could not be resolved")]
    UnresolvedMainFragment(String),
    #[error("processor '{processor}' failed: {source}")]
    Processor {
        processor: String,
        #[source]
        source: ProcessorError,
    },
    #[error("pipeline state missing: {0}")]
    MissingState(&'static str),
    #[error(transparent)]
    Editor(#[from] EditorError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Merge(#[from] MergeError),
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid build configuration: {0}")]
    InvalidConfig(String),
    #[error("a build is already running")]
    AlreadyRunning,
    #[error("build failed at {stage}: {source}")]
    Failed {
        stage: BuildStage,
        #[source]
        source: StageError,
    },
    #[error("build run was dropped before it finished")]
    Abandoned,
    #[error("could not restore the editor after the build: {0}")]
    Restore(#[source] EditorError),
}

pub type BuildOutcome = Result<BuildReport, BuildError>;

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// Host callbacks. Every method defaults to a no-op.
pub trait BuildObserver {
    /// Called once before the build touches the editor, so the host can
    /// save modified scenes.
    fn before_build(&mut self, editor: &mut Editor) {
        let _ = editor;
    }

    /// A stage is about to run.
    fn on_progress(&mut self, label: &str, progress: f32) {
        let _ = (label, progress);
    }

    /// Manual pacing: the run is waiting for [`BuildRun::resume`].
    fn on_suspended(&mut self, next: BuildStage) {
        let _ = next;
    }

    fn clear_progress(&mut self) {}

    /// The build failed. The error message is meant for the user.
    fn on_failure(&mut self, error: &BuildError) {
        let _ = error;
    }
}

/// Observer that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl BuildObserver for LogObserver {
    fn on_progress(&mut self, label: &str, progress: f32) {
        info!(progress = format_args!("{:.0}%", progress * 100.0), "{label}");
    }

    fn on_suspended(&mut self, next: BuildStage) {
        info!(next = %next, "waiting to continue: {}", next.label());
    }
}

// ---------------------------------------------------------------------------
// SceneBuilder
// ---------------------------------------------------------------------------

/// Entry point for builds. Holds the processor registry and the build slot
/// that keeps a second build from starting while one runs.
#[derive(Debug)]
pub struct SceneBuilder {
    processors: ProcessorRegistry,
    slot: BuildSlot,
}

impl SceneBuilder {
    /// A builder sharing the process-wide build slot.
    pub fn new(processors: ProcessorRegistry) -> Self {
        Self::with_slot(processors, BuildSlot::process_wide())
    }

    pub fn with_slot(processors: ProcessorRegistry, slot: BuildSlot) -> Self {
        Self { processors, slot }
    }

    pub fn processors(&self) -> &ProcessorRegistry {
        &self.processors
    }

    pub fn is_building(&self) -> bool {
        self.slot.is_building()
    }

    /// Validate the request, claim the build slot and set up a run. Nothing
    /// in the editor changes until the first poll, apart from whatever the
    /// observer's `before_build` does.
    pub fn start<'a>(
        &'a self,
        editor: &'a mut Editor,
        request: BuildRequest,
        options: BuildOptions,
        observer: &'a mut dyn BuildObserver,
    ) -> Result<BuildRun<'a>, BuildError> {
        request.validate()?;
        let guard = self.slot.try_acquire().ok_or(BuildError::AlreadyRunning)?;

        observer.before_build(editor);
        let previous_scene = editor.active_scene_path();
        info!(
            build = %request.name,
            output = %request.output_path,
            fragments = request.fragments.len(),
            previous = ?previous_scene,
            "starting build"
        );

        let session = BuildSession::new(
            request.output_path.clone(),
            request.main_index,
            request.unpack_prefabs,
            options.load_built_result,
            options.pacing,
        );
        Ok(BuildRun {
            editor,
            processors: &self.processors,
            observer,
            request,
            session,
            previous_scene,
            guard: Some(guard),
            next: Some(BuildStage::first()),
            resumed: false,
            finished: false,
            state: PipelineState::default(),
            warnings: Warnings::default(),
            report: BuildReport::default(),
            outcome: None,
        })
    }

    /// Run a whole build. Manual pacing continues immediately; hosts that
    /// want to wait use [`BuildRun::run_to_completion`] themselves.
    pub fn build(
        &self,
        editor: &mut Editor,
        request: BuildRequest,
        options: BuildOptions,
        observer: &mut dyn BuildObserver,
    ) -> BuildOutcome {
        self.start(editor, request, options, observer)?
            .run_to_completion(|_, _| {})
    }
}

// ---------------------------------------------------------------------------
// BuildRun
// ---------------------------------------------------------------------------

/// What a single poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPoll {
    /// Waiting for [`BuildRun::resume`] before running `next`.
    Suspended { next: BuildStage },
    /// `completed` ran successfully.
    Advanced { completed: BuildStage },
    /// The run is over; see [`BuildRun::into_outcome`].
    Finished,
}

/// Working data carried between stages.
#[derive(Debug, Default)]
struct PipelineState {
    target: Option<SceneId>,
    loaded: Vec<LoadedFragment>,
    resolved: Vec<ResolvedFragment>,
    roots: RootMap,
    output_scene: Option<SceneId>,
}

/// One build in progress. Dropping an unfinished run aborts it with
/// [`BuildError::Abandoned`], running the usual cleanup.
pub struct BuildRun<'a> {
    editor: &'a mut Editor,
    processors: &'a ProcessorRegistry,
    observer: &'a mut dyn BuildObserver,
    request: BuildRequest,
    session: BuildSession,
    previous_scene: Option<String>,
    guard: Option<SlotGuard>,
    next: Option<BuildStage>,
    resumed: bool,
    finished: bool,
    state: PipelineState,
    warnings: Warnings,
    report: BuildReport,
    outcome: Option<BuildOutcome>,
}

impl fmt::Debug for BuildRun<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildRun")
            .field("request", &self.request)
            .field("session", &self.session)
            .field("next", &self.next)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<'a> BuildRun<'a> {
    pub fn session(&self) -> &BuildSession {
        &self.session
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The stage the next poll will run.
    pub fn next_stage(&self) -> Option<BuildStage> {
        self.next
    }

    pub fn warnings(&self) -> &[BuildWarning] {
        self.warnings.as_slice()
    }

    /// Continue past a manual suspension.
    pub fn resume(&mut self) {
        self.resumed = true;
    }

    /// Advance the run by at most one stage.
    pub fn poll(&mut self) -> BuildPoll {
        let Some(stage) = self.next.filter(|_| !self.finished) else {
            return BuildPoll::Finished;
        };

        if self.session.pacing.is_manual() && !self.resumed {
            self.observer.clear_progress();
            self.observer.on_suspended(stage);
            return BuildPoll::Suspended { next: stage };
        }
        self.resumed = false;

        let shown = self.session.show_progress(stage.label());
        self.observer.on_progress(stage.label(), shown);

        match self.execute(stage) {
            Ok(()) => {
                self.report.stages.push(stage.label());
                self.next = stage.next(self.session.unpack_prefabs);
                if self.next.is_none() {
                    self.finish(Ok(()));
                }
                BuildPoll::Advanced { completed: stage }
            }
            Err(source) => {
                self.next = None;
                self.finish(Err(BuildError::Failed { stage, source }));
                BuildPoll::Finished
            }
        }
    }

    /// Poll until the run finishes. `wait` is called at every manual
    /// suspension and the run resumes when it returns. Automatic pacing
    /// sleeps for its delay after each stage.
    pub fn run_to_completion(
        mut self,
        mut wait: impl FnMut(&BuildSession, BuildStage),
    ) -> BuildOutcome {
        loop {
            match self.poll() {
                BuildPoll::Suspended { next } => {
                    wait(&self.session, next);
                    self.resume();
                }
                BuildPoll::Advanced { .. } => {
                    if let Pacing::Automatic { delay } = self.session.pacing {
                        if !delay.is_zero() && !self.finished {
                            std::thread::sleep(delay);
                        }
                    }
                }
                BuildPoll::Finished => break,
            }
        }
        self.into_outcome()
    }

    /// The final outcome. An unfinished run is abandoned first.
    pub fn into_outcome(mut self) -> BuildOutcome {
        if !self.finished {
            self.finish(Err(BuildError::Abandoned));
        }
        self.outcome.take().unwrap_or(Err(BuildError::Abandoned))
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    fn execute(&mut self, stage: BuildStage) -> Result<(), StageError> {
        match stage {
            BuildStage::EmptyGraph => {
                self.editor.new_scene(OpenMode::Single);
                Ok(())
            }
            BuildStage::MainLoaded => self.load_main(),
            BuildStage::FragmentsLoaded => self.load_fragments(),
            BuildStage::ManifestsResolved => self.resolve_manifests(),
            BuildStage::Merged => self.merge(),
            BuildStage::Unpacked => {
                let target = self.target()?;
                self.editor.world_mut().set_active_scene(target)?;
                unpack_roots(self.editor.world_mut(), &mut self.state.roots)?;
                Ok(())
            }
            BuildStage::FragmentProcessed => self.run_fragment_processors(),
            BuildStage::Persisted => self.persist(),
            BuildStage::Reloaded => {
                let scene = self
                    .editor
                    .open_scene(&self.session.output_path, OpenMode::Single)?;
                self.state.output_scene = Some(scene);
                Ok(())
            }
            BuildStage::ExclusionsApplied => self.apply_exclusions(),
            BuildStage::FinalProcessed => self.run_final_processors(),
            BuildStage::Saved => {
                let scene = self.output_scene()?;
                self.editor.save_scene(scene)?;
                Ok(())
            }
            BuildStage::Closed => {
                let scene = self.output_scene()?;
                self.editor.close_scene(scene)?;
                Ok(())
            }
        }
    }

    fn target(&self) -> Result<SceneId, StageError> {
        self.state.target.ok_or(StageError::MissingState("target scene"))
    }

    fn output_scene(&self) -> Result<SceneId, StageError> {
        self.state
            .output_scene
            .ok_or(StageError::MissingState("output scene"))
    }

    /// The main fragment opens additively next to the empty scene and is
    /// the target graph from here on.
    fn load_main(&mut self) -> Result<(), StageError> {
        let index = self.request.main_index;
        let reference = match self.request.fragments.get(index) {
            None => {
                return Err(StageError::MainIndexOutOfRange {
                    index,
                    len: self.request.fragments.len(),
                });
            }
            Some(None) => return Err(StageError::MissingMainFragment(index)),
            Some(Some(reference)) => reference,
        };
        let path = self
            .editor
            .storage()
            .resolve(reference)
            .ok_or_else(|| StageError::UnresolvedMainFragment(reference.clone()))?;
        let scene = self.editor.open_scene(&path, OpenMode::Additive)?;
        info!(path = %path, "loaded main fragment");
        self.state.target = Some(scene);
        Ok(())
    }

    fn load_fragments(&mut self) -> Result<(), StageError> {
        for (index, entry) in self.request.fragments.iter().enumerate() {
            if index == self.request.main_index {
                continue;
            }
            let Some(reference) = entry else {
                self.warnings.push(BuildWarning::NullFragment { index });
                continue;
            };
            let Some(path) = self.editor.storage().resolve(reference) else {
                self.warnings.push(BuildWarning::UnresolvedFragment {
                    index,
                    reference: reference.clone(),
                });
                continue;
            };
            info!(path = %path, index, "loading fragment");
            let scene = self.editor.open_scene(&path, OpenMode::Additive)?;
            self.state.loaded.push(LoadedFragment {
                fragment: Fragment {
                    index,
                    path,
                    is_main: false,
                },
                scene,
            });
        }
        Ok(())
    }

    /// Fragments without a manifest are unloaded right away.
    fn resolve_manifests(&mut self) -> Result<(), StageError> {
        for loaded in &self.state.loaded {
            match resolve_manifest(self.editor.world(), loaded, &mut self.warnings)? {
                Some(resolved) => self.state.resolved.push(resolved),
                None => {
                    if let Some(info) = self.editor.world().scene(loaded.scene) {
                        self.report.skipped.push(info.name.clone());
                    }
                    self.editor.close_scene(loaded.scene)?;
                }
            }
        }
        Ok(())
    }

    fn merge(&mut self) -> Result<(), StageError> {
        let target = self.target()?;
        for resolved in &self.state.resolved {
            self.editor.world_mut().set_active_scene(resolved.scene)?;
            let entry = merge_fragment(
                self.editor.world_mut(),
                resolved,
                target,
                &mut self.warnings,
            )?;
            self.report.merged.push(entry.name.clone());
            self.state.roots.insert(entry)?;
        }
        self.editor.world_mut().set_active_scene(target)?;
        info!(roots = self.state.roots.len(), "merged fragments");
        Ok(())
    }

    /// Fragment processors run per root, in merge order, against the
    /// (possibly unpacked) root.
    fn run_fragment_processors(&mut self) -> Result<(), StageError> {
        let target = self.target()?;
        self.editor.world_mut().set_active_scene(target)?;
        for entry in self.state.roots.iter() {
            for (slot, spec) in entry.processors.iter().enumerate() {
                let Some(spec) = spec else {
                    self.warnings.push(BuildWarning::NullProcessor {
                        fragment: entry.name.clone(),
                        slot,
                    });
                    continue;
                };
                let mut processor = match self.processors.create_fragment(spec) {
                    Ok(p) => p,
                    Err(ProcessorError::UnknownKind(kind)) => {
                        self.warnings.push(BuildWarning::UnknownProcessor {
                            fragment: entry.name.clone(),
                            kind,
                        });
                        continue;
                    }
                    Err(source) => {
                        return Err(StageError::Processor {
                            processor: spec.kind.clone(),
                            source,
                        });
                    }
                };
                debug!(processor = processor.name(), fragment = %entry.name, "running fragment processor");
                let mut ctx = self.editor.processor_context(target);
                processor
                    .on_build_scene(&mut ctx, entry.root)
                    .map_err(|source| StageError::Processor {
                        processor: processor.name().to_string(),
                        source,
                    })?;
                self.report.fragment_processors_run += 1;
            }
        }
        Ok(())
    }

    /// Replace any existing output, write the target as a copy, then close
    /// the target and every fragment scene.
    fn persist(&mut self) -> Result<(), StageError> {
        let target = self.target()?;
        let output = self.session.output_path.clone();
        if self.editor.asset_exists(&output) {
            info!(path = %output, "replacing existing output");
            self.editor.delete_asset(&output)?;
        }
        self.editor.save_scene_as_copy(target, &output)?;
        self.session.persisted = true;

        self.editor.close_scene(target)?;
        for loaded in &self.state.loaded {
            if self.editor.world().scene(loaded.scene).is_some() {
                self.editor.close_scene(loaded.scene)?;
            }
        }
        Ok(())
    }

    fn apply_exclusions(&mut self) -> Result<(), StageError> {
        let Some((_, manifest)) = find_main_manifest(self.editor.world()) else {
            debug!("no main manifest in output");
            return Ok(());
        };
        let excluded = manifest.excluded.clone();
        let world = self.editor.world_mut();
        for (slot, node) in excluded.into_iter().enumerate() {
            match node {
                Some(id) if world.destroy(id) => self.report.excluded_removed += 1,
                _ => self.warnings.push(BuildWarning::NullExcludedObject { slot }),
            }
        }
        info!(removed = self.report.excluded_removed, "applied exclusions");
        Ok(())
    }

    fn run_final_processors(&mut self) -> Result<(), StageError> {
        let scene = self.output_scene()?;
        for mut processor in self.processors.create_finals() {
            debug!(processor = processor.name(), "running final processor");
            let mut ctx = self.editor.processor_context(scene);
            processor
                .on_post_build_scene(&mut ctx)
                .map_err(|source| StageError::Processor {
                    processor: processor.name().to_string(),
                    source,
                })?;
            self.report.final_processors_run += 1;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Cleanup
    // -----------------------------------------------------------------------

    /// Runs exactly once, on success, failure or abandonment.
    fn finish(&mut self, result: Result<(), BuildError>) {
        self.finished = true;
        self.next = None;

        if let Err(e) = &result {
            self.observer.on_failure(e);
            error!(error = %e, "build failed");
            let mut source = std::error::Error::source(e);
            while let Some(cause) = source {
                error!(cause = %cause, "caused by");
                source = std::error::Error::source(cause);
            }
            warn!(
                output = %self.session.output_path,
                persisted = self.session.persisted,
                "output is not rolled back after a failed build and may be incomplete or missing"
            );
        }

        self.observer.clear_progress();
        self.guard.take();

        let restored = self.restore();
        if restored.is_err() {
            self.editor.new_scene(OpenMode::Single);
        }

        self.outcome = Some(match (result, restored) {
            (Err(e), Err(restore_err)) => {
                error!(error = %restore_err, "could not restore the editor, left an empty scene open");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), Err(restore_err)) => Err(BuildError::Restore(restore_err)),
            (Ok(()), Ok(())) => {
                let mut report = std::mem::take(&mut self.report);
                report.output_path = self.session.output_path.clone();
                report.warnings = std::mem::take(&mut self.warnings).into_vec();
                report.progress = self.session.progress();
                info!(
                    output = %report.output_path,
                    merged = report.merged.len(),
                    warnings = report.warnings.len(),
                    "build finished"
                );
                Ok(report)
            }
        });
    }

    /// Reopen the output (if requested and written) or whatever was open
    /// before the build. On error the caller replaces every open scene with
    /// an empty one.
    fn restore(&mut self) -> Result<(), EditorError> {
        if self.session.load_built_result && self.session.persisted {
            self.editor
                .open_scene(&self.session.output_path, OpenMode::Single)?;
        } else if let Some(previous) = self.previous_scene.clone() {
            self.editor.open_scene(&previous, OpenMode::Single)?;
        } else {
            self.editor.new_scene(OpenMode::Single);
        }
        self.editor.check_editing(&self.session.output_path);
        Ok(())
    }
}

impl Drop for BuildRun<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(Err(BuildError::Abandoned));
        }
    }
}
