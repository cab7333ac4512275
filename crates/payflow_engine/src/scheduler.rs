//! The advancement scheduler.
//!
//! [`Scheduler::advance`] reads an entity's bookkeeping component, scans the
//! candidate system list circularly starting after the cursor, commits the
//! cursor to the first match, and returns the [`SystemInvoke`] describing the
//! step to dispatch. The caller (the facade) decides how to deliver it —
//! local handler call, outbound signal, or both.
//!
//! The cursor commit happens before the step executes, so an interruption
//! mid-step never re-runs the same step on retry. Every scheduler-level
//! failure rewrites the bookkeeping `error` field before the error is
//! returned, so external observers polling the component can see the last
//! failure without a separate round trip.

use serde_json::{Map, Value, json};

use payflow_store::{Entity, Store};

use crate::bookkeeping;
use crate::error::EcsError;
use crate::registry::{Registry, SystemDef};

/// A matched step ready for dispatch: the system name plus a snapshot of the
/// step's required components, taken at match time so the step does not need
/// a redundant read.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemInvoke {
    /// The matched system.
    pub system: String,
    /// The entity being advanced.
    pub entity: Entity,
    /// Current values of the system's required components.
    pub components: Map<String, Value>,
}

impl SystemInvoke {
    /// The wire payload of the `system-invoke` signal:
    /// `{"system": ..., "entity": {"entity": id, <required components...>}}`.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        let mut entity_obj = Map::new();
        entity_obj.insert("entity".to_string(), json!(self.entity));
        for (name, value) in &self.components {
            entity_obj.insert(name.clone(), value.clone());
        }
        json!({"system": self.system, "entity": Value::Object(entity_obj)})
    }

    /// Parse an inbound `system-invoke` payload.
    ///
    /// Returns `None` if the payload lacks the `system` name or the numeric
    /// entity ID; extra fields inside the entity object become the component
    /// snapshot.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let obj = payload.as_object()?;
        let system = obj.get("system")?.as_str()?.to_string();
        let entity_obj = obj.get("entity")?.as_object()?;
        let id = u32::try_from(entity_obj.get("entity")?.as_u64()?).ok()?;

        let mut components = Map::new();
        for (name, value) in entity_obj {
            if name == "entity" {
                continue;
            }
            components.insert(name.clone(), value.clone());
        }
        Some(Self {
            system,
            entity: Entity(id),
            components,
        })
    }
}

/// The scheduler: a registry plus the advance algorithm over a [`Store`].
#[derive(Debug, Default)]
pub struct Scheduler {
    registry: Registry,
}

impl Scheduler {
    /// Create a scheduler with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    /// Access the system registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Register a system; see [`Registry::register`] for the idempotence
    /// rule.
    ///
    /// # Errors
    ///
    /// [`EcsError::RegistrationConflict`] on a duplicate name with different
    /// predicates.
    pub fn register(&mut self, def: SystemDef) -> Result<(), EcsError> {
        self.registry.register(def)
    }

    /// Select the next matching system for `entity` and commit the cursor to
    /// it.
    ///
    /// The scan visits candidate indices in circular order starting at
    /// `cursor + 1` (or index 0 when no cursor is recorded), for at most one
    /// full circle. An unregistered name anywhere in the scan fails
    /// immediately, even if a later entry would have matched.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidSystemsComponent`] for malformed bookkeeping data
    /// or an unregistered scheduled name; [`EcsError::NotAdvanceable`] when a
    /// full circle finds no match. Both are recorded into the bookkeeping
    /// `error` field before returning.
    pub fn advance(&self, store: &mut Store, entity: Entity) -> Result<SystemInvoke, EcsError> {
        let Some(systems) = bookkeeping::systems_list(store, entity) else {
            return Err(self.fail(
                store,
                entity,
                EcsError::InvalidSystemsComponent {
                    reason: "invalid or absent `systems` field".to_string(),
                },
            ));
        };

        let start = match bookkeeping::cursor(store, entity) {
            Some(current) => current as usize + 1,
            None => 0,
        };

        let mut matched: Option<(usize, &SystemDef)> = None;
        for i in 0..systems.len() {
            let index = (start + i) % systems.len();
            let name = &systems[index];
            let Some(def) = self.registry.get(name) else {
                return Err(self.fail(
                    store,
                    entity,
                    EcsError::InvalidSystemsComponent {
                        reason: format!(
                            "`systems` array contains unregistered system: {name}"
                        ),
                    },
                ));
            };
            if def.matches(store, entity) {
                matched = Some((index, def));
                break;
            }
        }

        let Some((index, def)) = matched else {
            return Err(self.fail(store, entity, EcsError::NotAdvanceable));
        };

        // Snapshot the required components before committing, then commit the
        // cursor before the caller dispatches the step.
        let mut components = Map::new();
        for name in &def.required {
            let (cell, _) = store.get_component(entity, name);
            components.insert(name.clone(), cell.value().clone());
        }
        let invoke = SystemInvoke {
            system: def.name.clone(),
            entity,
            components,
        };

        bookkeeping::set_field(
            store,
            entity,
            bookkeeping::CURSOR_FIELD,
            Some(json!(index as u32)),
        );

        Ok(invoke)
    }

    /// Record a scheduler failure into the bookkeeping `error` field, then
    /// hand the error back for the caller to return.
    fn fail(&self, store: &mut Store, entity: Entity, err: EcsError) -> EcsError {
        bookkeeping::set_field(
            store,
            entity,
            bookkeeping::ERROR_FIELD,
            Some(json!({"code": err.code(), "message": err.to_string()})),
        );
        err
    }
}
