//! Soft warnings and the summary of a finished build.

use std::fmt;
use tracing::warn;

/// A problem that is logged and reported but never aborts a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildWarning {
    /// A fragment slot in the build definition is empty.
    NullFragment { index: usize },
    /// A fragment reference did not resolve to a loadable asset.
    UnresolvedFragment { index: usize, reference: String },
    /// A loaded fragment carries no manifest; it is left out of the build.
    MissingManifest { fragment: String },
    /// A fragment carries more than one manifest; the first one is used.
    MultipleManifests { fragment: String, count: usize },
    NullIncludedObject { fragment: String, slot: usize },
    NullProcessor { fragment: String, slot: usize },
    /// A manifest names a processor kind nobody registered.
    UnknownProcessor { fragment: String, kind: String },
    NullExcludedObject { slot: usize },
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildWarning::NullFragment { index } => write!(f, "fragment #{index} is null"),
            BuildWarning::UnresolvedFragment { index, reference } => {
                write!(f, "fragment #{index} '{reference}' could not be resolved")
            }
            BuildWarning::MissingManifest { fragment } => write!(
                f,
                "fragment '{fragment}' has no manifest, it will not be included in the build"
            ),
            BuildWarning::MultipleManifests { fragment, count } => write!(
                f,
                "fragment '{fragment}' has {count} manifests, using the first"
            ),
            BuildWarning::NullIncludedObject { fragment, slot } => write!(
                f,
                "included object #{slot} in '{fragment}' is null, it will not be included in the build"
            ),
            BuildWarning::NullProcessor { fragment, slot } => write!(
                f,
                "processor #{slot} in '{fragment}' is null, it will not run"
            ),
            BuildWarning::UnknownProcessor { fragment, kind } => write!(
                f,
                "processor kind '{kind}' in '{fragment}' is not registered, it will not run"
            ),
            BuildWarning::NullExcludedObject { slot } => {
                write!(f, "excluded object #{slot} is null")
            }
        }
    }
}

/// Collects warnings, logging each one as it arrives.
#[derive(Debug, Clone, Default)]
pub struct Warnings {
    items: Vec<BuildWarning>,
}

impl Warnings {
    pub fn push(&mut self, warning: BuildWarning) {
        warn!("{warning}");
        self.items.push(warning);
    }

    pub fn as_slice(&self) -> &[BuildWarning] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<BuildWarning> {
        self.items
    }
}

/// Summary of a successful build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    pub output_path: String,
    /// Fragment names merged into the output, in merge order.
    pub merged: Vec<String>,
    /// Fragment names loaded but left out (no manifest).
    pub skipped: Vec<String>,
    pub warnings: Vec<BuildWarning>,
    pub fragment_processors_run: usize,
    pub final_processors_run: usize,
    pub excluded_removed: usize,
    /// Labels of the completed pipeline stages, in order.
    pub stages: Vec<&'static str>,
    /// Progress counter when the build finished. Not clamped.
    pub progress: f32,
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "built {}", self.output_path)?;
        writeln!(f, "  merged:   {}", self.merged.join(", "))?;
        if !self.skipped.is_empty() {
            writeln!(f, "  skipped:  {}", self.skipped.join(", "))?;
        }
        writeln!(
            f,
            "  processors: {} fragment, {} final; {} excluded objects removed",
            self.fragment_processors_run, self.final_processors_run, self.excluded_removed
        )?;
        write!(f, "  warnings: {}", self.warnings.len())
    }
}
