//! Reference fragment processors for Scenebuild.
//!
//! - [`ExtractTagged`] (`extract-tagged`) gathers tagged nodes under one
//!   output node.
//! - [`ExtractCollisions`] (`extract-collisions`) splits a fragment into a
//!   visual copy and a collision-only copy.
//! - [`PruneDisabledMarkers`] (`prune-disabled-markers`) destroys inactive
//!   marker nodes.
//!
//! Call [`register_builtin`] to add all three to a
//! [`ProcessorRegistry`].

mod collisions;
mod markers;
mod tagged;

pub use collisions::{DEFAULT_KEEP, ExtractCollisions};
pub use markers::{DEFAULT_MARKER_PREFIX, PruneDisabledMarkers};
pub use tagged::{ExtractTagged, TAGGED_OUTPUT_NAME};

use scenebuild_core::processor::ProcessorRegistry;

pub const EXTRACT_TAGGED: &str = "extract-tagged";
pub const EXTRACT_COLLISIONS: &str = "extract-collisions";
pub const PRUNE_DISABLED_MARKERS: &str = "prune-disabled-markers";

/// Register the built-in fragment processor kinds.
pub fn register_builtin(registry: &mut ProcessorRegistry) {
    registry.register_fragment(EXTRACT_TAGGED, |spec| {
        Ok(Box::new(ExtractTagged::from_spec(spec)?))
    });
    registry.register_fragment(EXTRACT_COLLISIONS, |spec| {
        Ok(Box::new(ExtractCollisions::from_spec(spec)?))
    });
    registry.register_fragment(PRUNE_DISABLED_MARKERS, |spec| {
        Ok(Box::new(PruneDisabledMarkers::from_spec(spec)?))
    });
}
