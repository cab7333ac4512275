//! The engine facade and dispatch bridge.
//!
//! [`Ecs`] unifies the store and the scheduler behind one API, binds
//! in-process step functions to registered systems, and routes inbound
//! `system-invoke` signals to the correct step. It is an explicitly
//! constructed, owned instance — pass it by reference to whatever drives the
//! workflow; there is no process-wide singleton, so tests can run several
//! isolated engines side by side.
//!
//! Steps registered with a handler run synchronously on the advancing
//! thread. Systems registered without one belong to external parties: their
//! dispatches are forwarded on the outbound invoke channel and ignored
//! locally.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, warn};

use payflow_store::{Cell, Entity, Store};

use crate::bookkeeping;
use crate::error::EcsError;
use crate::registry::SystemDef;
use crate::scheduler::{Scheduler, SystemInvoke};
use crate::trace::TraceLog;
use crate::writes::{self, WriteSpec};

/// An in-process step function.
///
/// Receives the engine, the entity being advanced, and the current values of
/// the step's required components (snapshotted at match time, so the step
/// does not need a redundant read). A step normally ends by calling
/// [`Ecs::advance_done`].
pub type SystemHandler =
    Arc<dyn Fn(&mut Ecs, Entity, &Map<String, Value>) -> Result<(), EcsError> + Send + Sync>;

/// One tagged entry of a registration batch.
#[derive(Clone)]
pub enum RegisterEntry {
    /// Start describing a system of this name.
    Name(String),
    /// Bind an in-process handler to the system being described.
    Handler(SystemHandler),
    /// Add a required component to the system being described.
    Require(String),
    /// Add a disallowed component to the system being described.
    Disallow(String),
    /// Commit the system being described.
    Done,
}

impl std::fmt::Debug for RegisterEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisterEntry::Name(n) => write!(f, "Name({n:?})"),
            RegisterEntry::Handler(_) => write!(f, "Handler(..)"),
            RegisterEntry::Require(c) => write!(f, "Require({c:?})"),
            RegisterEntry::Disallow(c) => write!(f, "Disallow({c:?})"),
            RegisterEntry::Done => write!(f, "Done"),
        }
    }
}

/// A growable, concatenable batch of system registrations.
///
/// Independently written modules each build their own batch; the process
/// start-up concatenates them and applies the result in one call to
/// [`Ecs::register_batch`] or [`Ecs::register_default_batch`].
#[derive(Debug, Default, Clone)]
pub struct RegistrationBatch {
    entries: Vec<RegisterEntry>,
}

impl RegistrationBatch {
    /// Create an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin describing a system.
    #[must_use]
    pub fn system(mut self, name: impl Into<String>) -> Self {
        self.entries.push(RegisterEntry::Name(name.into()));
        self
    }

    /// Bind an in-process handler to the system being described.
    #[must_use]
    pub fn handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Ecs, Entity, &Map<String, Value>) -> Result<(), EcsError>
            + Send
            + Sync
            + 'static,
    {
        self.entries.push(RegisterEntry::Handler(Arc::new(f)));
        self
    }

    /// Add a required component.
    #[must_use]
    pub fn require(mut self, component: impl Into<String>) -> Self {
        self.entries.push(RegisterEntry::Require(component.into()));
        self
    }

    /// Add a disallowed component.
    #[must_use]
    pub fn disallow(mut self, component: impl Into<String>) -> Self {
        self.entries.push(RegisterEntry::Disallow(component.into()));
        self
    }

    /// Commit the system being described.
    #[must_use]
    pub fn done(mut self) -> Self {
        self.entries.push(RegisterEntry::Done);
        self
    }

    /// Append another batch's entries to this one.
    pub fn concat(&mut self, other: RegistrationBatch) {
        self.entries.extend(other.entries);
    }

    /// Names of the systems this batch commits, in order.
    #[must_use]
    pub fn system_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut pending: Option<&str> = None;
        for entry in &self.entries {
            match entry {
                RegisterEntry::Name(n) => pending = Some(n),
                RegisterEntry::Done => {
                    if let Some(n) = pending.take() {
                        names.push(n.to_string());
                    }
                }
                _ => {}
            }
        }
        names
    }
}

/// The engine facade: store + scheduler + handler table + defaults + trace.
pub struct Ecs {
    store: Store,
    scheduler: Scheduler,
    handlers: HashMap<String, SystemHandler>,
    default_systems: Vec<String>,
    trace: TraceLog,
    invoke_tx: Option<UnboundedSender<SystemInvoke>>,
}

impl Ecs {
    /// Create an engine with an empty store and registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_trace_capacity(crate::trace::DEFAULT_TRACE_CAPACITY)
    }

    /// Create an engine with a custom dispatch-trace capacity.
    #[must_use]
    pub fn with_trace_capacity(capacity: usize) -> Self {
        Self {
            store: Store::new(),
            scheduler: Scheduler::new(),
            handlers: HashMap::new(),
            default_systems: Vec::new(),
            trace: TraceLog::with_capacity(capacity),
            invoke_tx: None,
        }
    }

    /// Forward every dispatched [`SystemInvoke`] on this channel, so the
    /// hosting process can relay `system-invoke` signals to peers that own
    /// systems registered without a local handler.
    pub fn set_invoke_sink(&mut self, tx: UnboundedSender<SystemInvoke>) {
        self.invoke_tx = Some(tx);
    }

    // -- Store delegation --

    /// Allocate a fresh entity ID.
    pub fn new_entity(&mut self) -> Entity {
        self.store.new_entity()
    }

    /// Bounds over entities with at least one component; see
    /// [`Store::entity_bounds`].
    #[must_use]
    pub fn entity_bounds(&self) -> (Entity, Entity) {
        self.store.entity_bounds()
    }

    /// Component names of an entity, lexicographically sorted.
    #[must_use]
    pub fn component_names(&self, entity: Entity) -> Vec<String> {
        self.store.component_names(entity)
    }

    /// Look up one component; absent components read as a `null` cell.
    #[must_use]
    pub fn get_component(&self, entity: Entity, component: &str) -> (&Cell, bool) {
        self.store.get_component(entity, component)
    }

    /// Returns `true` if the entity holds the component.
    #[must_use]
    pub fn has_component(&self, entity: Entity, component: &str) -> bool {
        self.store.has_component(entity, component)
    }

    /// Attach, replace, or detach (with `null`) a component.
    pub fn set_component_value(&mut self, entity: Entity, component: &str, value: Value) {
        self.store.set_component_value(entity, component, value);
    }

    /// Like [`Ecs::set_component_value`] but parses raw JSON text.
    ///
    /// # Errors
    ///
    /// Returns the parse error for invalid JSON; the store is unchanged.
    pub fn set_component_text(
        &mut self,
        entity: Entity,
        component: &str,
        text: &str,
    ) -> Result<(), serde_json::Error> {
        self.store.set_component_text(entity, component, text)
    }

    /// Edit one field of the bookkeeping component, preserving the rest;
    /// see [`bookkeeping::set_field`].
    pub fn set_bookkeeping_field(&mut self, entity: Entity, field: &str, value: Option<Value>) {
        bookkeeping::set_field(&mut self.store, entity, field, value);
    }

    /// Read back the message of the last recorded scheduler failure.
    #[must_use]
    pub fn last_error_message(&self, entity: Entity) -> Option<String> {
        bookkeeping::error_message(&self.store, entity)
    }

    // -- Registration --

    /// Register a system without a local handler (owned by an external
    /// party; its dispatches go out as `system-invoke` signals only).
    ///
    /// # Errors
    ///
    /// [`EcsError::RegistrationConflict`] on a duplicate name with different
    /// predicates.
    pub fn register_system(
        &mut self,
        name: impl Into<String>,
        required: Vec<String>,
        disallowed: Vec<String>,
    ) -> Result<(), EcsError> {
        self.scheduler
            .register(SystemDef::new(name, required, disallowed))
    }

    /// Apply a registration batch.
    ///
    /// # Errors
    ///
    /// [`EcsError::RegistrationConflict`] for any committed system whose
    /// name exists with different predicates; systems committed before the
    /// conflict stay registered.
    pub fn register_batch(&mut self, batch: RegistrationBatch) -> Result<(), EcsError> {
        let mut name: Option<String> = None;
        let mut handler: Option<SystemHandler> = None;
        let mut required: Vec<String> = Vec::new();
        let mut disallowed: Vec<String> = Vec::new();

        for entry in batch.entries {
            match entry {
                RegisterEntry::Name(n) => name = Some(n),
                RegisterEntry::Handler(f) => handler = Some(f),
                RegisterEntry::Require(c) => required.push(c),
                RegisterEntry::Disallow(c) => disallowed.push(c),
                RegisterEntry::Done => {
                    let Some(n) = name.take() else {
                        warn!("registration entry committed without a system name; skipped");
                        handler = None;
                        required.clear();
                        disallowed.clear();
                        continue;
                    };
                    self.scheduler.register(SystemDef::new(
                        n.clone(),
                        std::mem::take(&mut required),
                        std::mem::take(&mut disallowed),
                    ))?;
                    if let Some(f) = handler.take() {
                        self.handlers.insert(n, f);
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply a registration batch and append its system names to the
    /// process-wide default-systems list.
    ///
    /// # Errors
    ///
    /// Same as [`Ecs::register_batch`].
    pub fn register_default_batch(&mut self, batch: RegistrationBatch) -> Result<(), EcsError> {
        let names = batch.system_names();
        self.register_batch(batch)?;
        self.default_systems.extend(names);
        Ok(())
    }

    /// Returns `true` if a system of that name is registered.
    #[must_use]
    pub fn system_exists(&self, name: &str) -> bool {
        self.scheduler.registry().exists(name)
    }

    /// The ordered list of built-in default systems.
    #[must_use]
    pub fn default_systems(&self) -> &[String] {
        &self.default_systems
    }

    // -- Advancement --

    /// Select and dispatch the next matching system for `entity`.
    ///
    /// Returns as soon as dispatch is initiated; step completion is signaled
    /// separately via [`Ecs::advance_done`].
    ///
    /// # Errors
    ///
    /// The scheduler's [`EcsError::InvalidSystemsComponent`] or
    /// [`EcsError::NotAdvanceable`], both also recorded into the bookkeeping
    /// `error` field.
    pub fn advance(&mut self, entity: Entity) -> Result<(), EcsError> {
        let invoke = self.scheduler.advance(&mut self.store, entity)?;
        debug!(entity = entity.id(), system = %invoke.system, "dispatching system");
        self.trace.record(&invoke);

        if let Some(tx) = &self.invoke_tx {
            // A closed sink means the host stopped listening; dispatch
            // locally regardless.
            let _ = tx.send(invoke.clone());
        }

        self.run_local(&invoke);
        Ok(())
    }

    /// Signal that a step finished its work and the workflow should
    /// continue.
    ///
    /// Re-invokes [`Ecs::advance`]; a resulting `NotAdvanceable` is treated
    /// as successful termination of the workflow, any other failure is
    /// logged at high severity. Never propagates an error, so most steps end
    /// with a single unconditional call.
    pub fn advance_done(&mut self, entity: Entity) {
        match self.advance(entity) {
            Ok(()) => {}
            Err(EcsError::NotAdvanceable) => {
                debug!(entity = entity.id(), "no further systems match; workflow complete");
            }
            Err(err) => {
                let msg = self
                    .last_error_message(entity)
                    .unwrap_or_else(|| err.to_string());
                error!(entity = entity.id(), %msg, "cannot advance entity");
            }
        }
    }

    /// Route an inbound `system-invoke` signal to its local handler.
    ///
    /// A name with no local handler is a no-op, not an error: other parties
    /// may own that system. Malformed payloads and payloads missing required
    /// components are logged and dropped.
    pub fn handle_invoke(&mut self, payload: &Value) {
        let Some(invoke) = SystemInvoke::from_payload(payload) else {
            warn!(%payload, "malformed system-invoke payload");
            return;
        };
        if !self.handlers.contains_key(&invoke.system) {
            debug!(system = %invoke.system, "no local handler; ignoring system-invoke");
            return;
        }
        if let Some(def) = self.scheduler.registry().get(&invoke.system) {
            for component in &def.required {
                if !invoke.components.contains_key(component) {
                    warn!(
                        system = %invoke.system,
                        component,
                        "system-invoke missing required component"
                    );
                    return;
                }
            }
        }
        self.run_local(&invoke);
    }

    /// Run the bound handler for a dispatch, if any.
    fn run_local(&mut self, invoke: &SystemInvoke) {
        let Some(handler) = self.handlers.get(&invoke.system).cloned() else {
            return;
        };
        if let Err(err) = handler(self, invoke.entity, &invoke.components) {
            // Step failures are the step's responsibility to record; the
            // dispatch itself already succeeded.
            error!(
                entity = invoke.entity.id(),
                system = %invoke.system,
                %err,
                "system handler failed"
            );
        }
    }

    // -- Optimistic writes --

    /// Validate `expected` then apply `writes`; see
    /// [`writes::set_components`].
    ///
    /// # Errors
    ///
    /// [`EcsError::UnexpectedComponents`] when validation fails; no writes
    /// are applied in that case.
    pub fn set_components(
        &mut self,
        writes: &[WriteSpec],
        expected: &[WriteSpec],
    ) -> Result<(), EcsError> {
        writes::set_components(&mut self.store, writes, expected)
    }

    /// The dispatch trace buffer.
    #[must_use]
    pub fn trace(&self) -> &TraceLog {
        &self.trace
    }
}

impl Default for Ecs {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Ecs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ecs")
            .field("store", &self.store)
            .field("scheduler", &self.scheduler)
            .field("handlers", &self.handlers.keys())
            .field("default_systems", &self.default_systems)
            .finish_non_exhaustive()
    }
}
