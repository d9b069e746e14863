use crate::id::ComponentTypeId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// A component type definition: its capabilities and the component types it
/// hard-requires on the same node.
///
/// Every type implicitly has its own name as a capability, so
/// `capabilities` only lists the extra ones (`"BoxCollider"` might list
/// `"Collider"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentTypeDef {
    pub name: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub requires: Vec<String>,
}

/// Builder for constructing an immutable [`ComponentRegistry`].
/// Three-phase lifecycle: registration -> mutation -> finalization.
#[derive(Debug, Default)]
pub struct ComponentRegistryBuilder {
    types: Vec<ComponentTypeDef>,
    name_to_id: HashMap<String, ComponentTypeId>,
}

impl ComponentRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase 1: Register a component type. Re-registering a name replaces
    /// the earlier definition and keeps its ID.
    pub fn register(
        &mut self,
        name: &str,
        capabilities: &[&str],
        requires: &[&str],
    ) -> ComponentTypeId {
        self.register_def(ComponentTypeDef {
            name: name.to_string(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            requires: requires.iter().map(|r| r.to_string()).collect(),
        })
    }

    /// Phase 1: Register a pre-built definition (used by data loading).
    pub fn register_def(&mut self, def: ComponentTypeDef) -> ComponentTypeId {
        if let Some(&id) = self.name_to_id.get(&def.name) {
            self.types[id.0 as usize] = def;
            return id;
        }
        let id = ComponentTypeId(self.types.len() as u32);
        self.name_to_id.insert(def.name.clone(), id);
        self.types.push(def);
        id
    }

    /// Phase 2: Mutate an existing type by name.
    pub fn mutate<F>(&mut self, name: &str, f: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut ComponentTypeDef),
    {
        let id = self
            .name_to_id
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        f(&mut self.types[id.0 as usize]);
        Ok(())
    }

    /// Phase 3: Validate and freeze.
    ///
    /// Every requirement must name a registered type, and the requirement
    /// relation must be acyclic so dependency-ordered removal terminates.
    pub fn build(self) -> Result<ComponentRegistry, RegistryError> {
        for def in &self.types {
            if def.name.is_empty() {
                return Err(RegistryError::EmptyName);
            }
            for req in &def.requires {
                if !self.name_to_id.contains_key(req) {
                    return Err(RegistryError::UnknownRequirement {
                        kind: def.name.clone(),
                        requires: req.clone(),
                    });
                }
            }
        }

        // Kahn's algorithm over "requires" edges.
        let n = self.types.len();
        let mut in_degree = vec![0usize; n];
        for def in &self.types {
            for req in &def.requires {
                in_degree[self.name_to_id[req].0 as usize] += 1;
            }
        }
        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut visited = 0usize;
        while let Some(i) = queue.pop_front() {
            visited += 1;
            for req in &self.types[i].requires {
                let j = self.name_to_id[req].0 as usize;
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    queue.push_back(j);
                }
            }
        }
        if visited < n {
            let stuck = (0..n)
                .find(|&i| in_degree[i] > 0)
                .map(|i| self.types[i].name.clone())
                .unwrap_or_default();
            return Err(RegistryError::CyclicRequirement(stuck));
        }

        Ok(ComponentRegistry {
            types: self.types,
            name_to_id: self.name_to_id,
        })
    }
}

/// Immutable table of component types. Frozen after `build()`.
///
/// Types that were never registered still work everywhere: they carry only
/// their own name as a capability and require nothing.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    types: Vec<ComponentTypeDef>,
    name_to_id: HashMap<String, ComponentTypeId>,
}

impl ComponentRegistry {
    pub fn get(&self, name: &str) -> Option<&ComponentTypeDef> {
        self.name_to_id
            .get(name)
            .map(|id| &self.types[id.0 as usize])
    }

    pub fn type_id(&self, name: &str) -> Option<ComponentTypeId> {
        self.name_to_id.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Component types `kind` hard-requires on the same node.
    pub fn requires(&self, kind: &str) -> &[String] {
        self.get(kind).map(|d| d.requires.as_slice()).unwrap_or(&[])
    }

    /// Component types that hard-require `kind`, in registration order.
    pub fn dependents_of(&self, kind: &str) -> Vec<String> {
        self.types
            .iter()
            .filter(|d| d.requires.iter().any(|r| r == kind))
            .map(|d| d.name.clone())
            .collect()
    }

    /// Whether a component of type `kind` provides `capability`.
    pub fn has_capability(&self, kind: &str, capability: &str) -> bool {
        kind == capability
            || self
                .get(kind)
                .is_some_and(|d| d.capabilities.iter().any(|c| c == capability))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("component type with empty name")]
    EmptyName,
    #[error("component type '{kind}' requires unknown type '{requires}'")]
    UnknownRequirement { kind: String, requires: String },
    #[error("cyclic requirement involving component type '{0}'")]
    CyclicRequirement(String),
}
