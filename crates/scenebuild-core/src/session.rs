//! Build session state and the process-wide build slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::debug;

/// Amount the progress counter rises at every step boundary.
pub const PROGRESS_STEP: f32 = 0.1;

/// Default pause between steps in automatic mode.
pub const DEFAULT_STEP_DELAY: Duration = Duration::from_millis(100);

/// How the pipeline advances between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Stop at every step boundary until the host resumes the run.
    Manual,
    /// Advance on its own after `delay`. The delay only paces the display.
    Automatic { delay: Duration },
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing::Automatic {
            delay: DEFAULT_STEP_DELAY,
        }
    }
}

impl Pacing {
    /// Automatic pacing with no delay.
    pub fn immediate() -> Self {
        Pacing::Automatic {
            delay: Duration::ZERO,
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, Pacing::Manual)
    }
}

/// Transient state of one build invocation.
#[derive(Debug, Clone)]
pub struct BuildSession {
    pub output_path: String,
    pub main_index: usize,
    pub unpack_prefabs: bool,
    pub load_built_result: bool,
    pub pacing: Pacing,
    progress: f32,
    label: String,
    /// Whether the output asset was written during this session.
    pub(crate) persisted: bool,
}

impl BuildSession {
    pub(crate) fn new(
        output_path: String,
        main_index: usize,
        unpack_prefabs: bool,
        load_built_result: bool,
        pacing: Pacing,
    ) -> Self {
        Self {
            output_path,
            main_index,
            unpack_prefabs,
            load_built_result,
            pacing,
            progress: 0.0,
            label: String::new(),
            persisted: false,
        }
    }

    /// Cumulative progress. Rises by [`PROGRESS_STEP`] per step and is not
    /// clamped; clamping for display is the host's call.
    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Label of the step about to run.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn persisted(&self) -> bool {
        self.persisted
    }

    /// Step boundary: record the next step's label and advance progress.
    /// Returns the progress value to display for this step.
    pub(crate) fn show_progress(&mut self, label: &str) -> f32 {
        self.label.clear();
        self.label.push_str(label);
        let shown = self.progress;
        self.progress += PROGRESS_STEP;
        debug!(label, progress = shown, "build step");
        shown
    }
}

// ---------------------------------------------------------------------------
// BuildSlot
// ---------------------------------------------------------------------------

/// The single "a build is running" slot. Clones share the slot.
#[derive(Debug, Clone, Default)]
pub struct BuildSlot {
    busy: Arc<AtomicBool>,
}

impl BuildSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot shared by every builder in this process.
    pub fn process_wide() -> Self {
        static SLOT: OnceLock<BuildSlot> = OnceLock::new();
        SLOT.get_or_init(BuildSlot::new).clone()
    }

    /// Claim the slot. `None` while another build holds it.
    pub fn try_acquire(&self) -> Option<SlotGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SlotGuard {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_building(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Holds the build slot; releases it on drop.
#[derive(Debug)]
pub struct SlotGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
