//! System registry — named processing steps gated by component predicates.
//!
//! A system matches an entity iff the entity currently holds every `required`
//! component and none of the `disallowed` components. Registration is
//! idempotent for identical predicates and a conflict otherwise; callers are
//! expected to serialize registration (the single-threaded scheduling model
//! makes this automatic).

use std::collections::HashMap;

use payflow_store::{Entity, Store};

use crate::error::EcsError;

/// A registered system: its name and its match predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemDef {
    /// The system's name, as it appears in `systems` arrays.
    pub name: String,
    /// Components that must all be present for the system to match.
    /// An empty list means the system can never match (a pure marker).
    pub required: Vec<String>,
    /// Components that must all be absent for the system to match.
    pub disallowed: Vec<String>,
}

impl SystemDef {
    /// Create a system definition.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        required: Vec<String>,
        disallowed: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            required,
            disallowed,
        }
    }

    /// Test the match predicate against an entity's live component set.
    #[must_use]
    pub fn matches(&self, store: &Store, entity: Entity) -> bool {
        if self.required.is_empty() {
            return false;
        }
        self.required
            .iter()
            .all(|c| store.has_component(entity, c))
            && !self
                .disallowed
                .iter()
                .any(|c| store.has_component(entity, c))
    }
}

/// Registry of all systems known to this engine instance.
#[derive(Debug, Default)]
pub struct Registry {
    systems: HashMap<String, SystemDef>,
}

impl Registry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            systems: HashMap::new(),
        }
    }

    /// Register a system.
    ///
    /// Re-registering the same name with identical predicates succeeds
    /// silently so independent modules can both declare the systems they
    /// depend on.
    ///
    /// # Errors
    ///
    /// [`EcsError::RegistrationConflict`] if the name exists with different
    /// predicates.
    pub fn register(&mut self, def: SystemDef) -> Result<(), EcsError> {
        if let Some(existing) = self.systems.get(&def.name) {
            if *existing == def {
                return Ok(());
            }
            return Err(EcsError::RegistrationConflict { system: def.name });
        }
        self.systems.insert(def.name.clone(), def);
        Ok(())
    }

    /// Look up a system by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SystemDef> {
        self.systems.get(name)
    }

    /// Returns `true` if a system of that name is registered.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.systems.contains_key(name)
    }

    /// Returns the number of registered systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Returns `true` if no systems are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}
