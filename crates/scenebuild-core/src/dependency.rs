//! Dependency-ordered component removal.
//!
//! The world refuses to remove a component that another component on the
//! same node requires. [`DependencyRemover`] removes such components the
//! long way: dependents first, then the component, then whatever it
//! required that nothing else on the node still needs.

use crate::id::NodeId;
use crate::world::{GraphError, World};
use std::collections::HashMap;
use tracing::debug;

/// Removes components together with their dependency closure on one node.
///
/// Requirement and dependent lists are looked up once per component type
/// and cached for the lifetime of the remover.
#[derive(Debug, Default)]
pub struct DependencyRemover {
    requires: HashMap<String, Vec<String>>,
    dependents: HashMap<String, Vec<String>>,
}

impl DependencyRemover {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `kind` declares any hard requirement.
    pub fn has_dependencies(&mut self, world: &World, kind: &str) -> bool {
        !self.requires_of(world, kind).is_empty()
    }

    /// Number of component types with cached lookups.
    pub fn cached_types(&self) -> usize {
        self.requires.len()
    }

    fn requires_of(&mut self, world: &World, kind: &str) -> Vec<String> {
        self.requires
            .entry(kind.to_string())
            .or_insert_with(|| world.registry().requires(kind).to_vec())
            .clone()
    }

    fn dependents_of(&mut self, world: &World, kind: &str) -> Vec<String> {
        self.dependents
            .entry(kind.to_string())
            .or_insert_with(|| world.registry().dependents_of(kind))
            .clone()
    }

    /// Remove one `kind` component from `node`, plus everything that has to
    /// go with it. Components for which `keep` returns true are never
    /// removed; if one of them depends on `kind`, nothing is removed.
    ///
    /// Returns the removed component types in removal order (empty when the
    /// removal was blocked or `kind` is absent).
    pub fn remove(
        &mut self,
        world: &mut World,
        node: NodeId,
        kind: &str,
        keep: &dyn Fn(&str) -> bool,
    ) -> Result<Vec<String>, GraphError> {
        if !world.contains(node) {
            return Err(GraphError::NodeNotFound(node));
        }
        let mut removed = Vec::new();
        self.remove_inner(world, node, kind, keep, &mut removed)?;
        Ok(removed)
    }

    fn remove_inner(
        &mut self,
        world: &mut World,
        node: NodeId,
        kind: &str,
        keep: &dyn Fn(&str) -> bool,
        removed: &mut Vec<String>,
    ) -> Result<bool, GraphError> {
        if count_of(world, node, kind) == 0 {
            return Ok(false);
        }

        if count_of(world, node, kind) == 1 {
            for dependent in self.dependents_of(world, kind) {
                while count_of(world, node, &dependent) > 0 {
                    if keep(&dependent) {
                        debug!(kind, dependent = %dependent, "removal blocked by kept dependent");
                        return Ok(false);
                    }
                    if !self.remove_inner(world, node, &dependent, keep, removed)? {
                        return Ok(false);
                    }
                }
            }
            // A dependent's cleanup may already have taken `kind` with it.
            if count_of(world, node, kind) == 0 {
                return Ok(true);
            }
        }

        world.remove_component(node, kind)?;
        removed.push(kind.to_string());

        let requirements = self.requires_of(world, kind);
        if !requirements.is_empty() {
            debug!(kind, requires = ?requirements, "removing requirements");
        }
        for required in requirements {
            if keep(&required) || count_of(world, node, &required) != 1 {
                continue;
            }
            if still_required(world, node, &required) {
                continue;
            }
            self.remove_inner(world, node, &required, keep, removed)?;
        }
        Ok(true)
    }
}

fn count_of(world: &World, node: NodeId, kind: &str) -> usize {
    world
        .node(node)
        .map(|d| d.components.iter().filter(|c| c.kind() == kind).count())
        .unwrap_or(0)
}

fn still_required(world: &World, node: NodeId, kind: &str) -> bool {
    world.node(node).is_some_and(|d| {
        d.components
            .iter()
            .any(|c| world.registry().requires(c.kind()).iter().any(|r| r == kind))
    })
}
