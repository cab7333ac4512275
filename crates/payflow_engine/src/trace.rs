//! Dispatch trace — a bounded ring buffer of executed steps.
//!
//! A debugging aid, not part of the scheduling contract: every dispatched
//! step is recorded process-wide as `{time, system, entity}`, and the buffer
//! can be filtered by entity.

use std::collections::VecDeque;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};

use payflow_store::Entity;

use crate::scheduler::SystemInvoke;

/// Default process-wide trace capacity.
pub const DEFAULT_TRACE_CAPACITY: usize = 100_000;

/// One recorded dispatch.
#[derive(Debug, Clone)]
pub struct TraceEntry {
    /// When the step was dispatched.
    pub time: DateTime<Utc>,
    /// The dispatched system.
    pub system: String,
    /// The entity being advanced.
    pub entity: Entity,
    /// The entity payload handed to the step (ID plus required components).
    pub payload: Value,
}

impl TraceEntry {
    /// The JSON form reported by the trace command.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "time": self.time.to_rfc3339_opts(SecondsFormat::Millis, true),
            "system": self.system,
            "entity": self.payload,
        })
    }
}

/// Bounded ring buffer of dispatched steps.
#[derive(Debug)]
pub struct TraceLog {
    capacity: usize,
    entries: VecDeque<TraceEntry>,
}

impl TraceLog {
    /// Create a trace log with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TRACE_CAPACITY)
    }

    /// Create a trace log with a custom capacity. A capacity of zero keeps
    /// nothing.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::new(),
        }
    }

    /// Record one dispatch, evicting the oldest entry when full.
    pub fn record(&mut self, invoke: &SystemInvoke) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        let entity_payload = invoke
            .to_payload()
            .get("entity")
            .cloned()
            .unwrap_or(Value::Null);
        self.entries.push_back(TraceEntry {
            time: Utc::now(),
            system: invoke.system.clone(),
            entity: invoke.entity,
            payload: entity_payload,
        });
    }

    /// All recorded dispatches of one entity, oldest first.
    #[must_use]
    pub fn for_entity(&self, entity: Entity) -> Vec<&TraceEntry> {
        self.entries.iter().filter(|t| t.entity == entity).collect()
    }

    /// Total number of recorded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TraceLog {
    fn default() -> Self {
        Self::new()
    }
}
