//! The entity/component table.
//!
//! A [`Store`] maps entities to rows, and a row maps component names to
//! [`Cell`]s. A cell keeps both the canonical serialized text and the parsed
//! [`Value`] of one JSON component, so sub-values can be re-emitted
//! byte-for-byte without re-serialization.
//!
//! The store has no scheduling knowledge; it is a pure data structure owned
//! by whoever drives the workflow.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::entity::{Entity, EntityAllocator};

/// One JSON component value: canonical text plus the parsed structure.
///
/// The two representations always agree; construct cells only through
/// [`Cell::from_value`] or [`Cell::from_text`].
#[derive(Debug, Clone)]
pub struct Cell {
    text: String,
    value: Value,
}

impl Cell {
    /// Build a cell from a parsed JSON value, serializing once for the
    /// canonical text.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let text = value.to_string();
        Self { text, value }
    }

    /// Build a cell from raw JSON text, parsing once.
    ///
    /// The canonical text is the compact re-serialization, so two cells with
    /// structurally equal values also have equal text.
    ///
    /// # Errors
    ///
    /// Returns the parse error if `text` is not valid JSON.
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(value))
    }

    /// The canonical serialized form of this component.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The parsed JSON value of this component.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Returns `true` if this cell holds JSON `null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }
}

/// The components attached to one entity, keyed by component name.
///
/// `BTreeMap` keeps names in lexicographic order, which is the order
/// [`Store::component_names`] reports them in.
type EntityRow = BTreeMap<String, Cell>;

/// The entity/component table.
///
/// Invariant: a row with zero components does not exist — detaching the last
/// component of an entity removes its row entirely.
#[derive(Debug)]
pub struct Store {
    allocator: EntityAllocator,
    /// Rows keyed by entity in ascending ID order.
    rows: BTreeMap<Entity, EntityRow>,
    /// Shared "null" cell handed out for absent components, so lookups never
    /// need a separate missing-value path.
    null_cell: Cell,
}

impl Store {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            allocator: EntityAllocator::new(),
            rows: BTreeMap::new(),
            null_cell: Cell::from_value(Value::Null),
        }
    }

    /// Allocate a fresh entity ID. Never returns [`Entity::INVALID`] and
    /// never fails.
    pub fn new_entity(&mut self) -> Entity {
        self.allocator.allocate()
    }

    /// Returns `(min, max)` bounds over entities with at least one attached
    /// component: `min` inclusive, `max` exclusive. Returns
    /// `(Entity(0), Entity(0))` when the store is empty.
    #[must_use]
    pub fn entity_bounds(&self) -> (Entity, Entity) {
        let Some((first, _)) = self.rows.first_key_value() else {
            return (Entity::INVALID, Entity::INVALID);
        };
        // rows is non-empty, so last_key_value cannot fail.
        let (last, _) = self
            .rows
            .last_key_value()
            .unwrap_or((first, &EntityRow::new()));
        (*first, Entity(last.id() + 1))
    }

    /// Component names attached to `entity`, lexicographically sorted.
    /// Empty if the entity has no row.
    #[must_use]
    pub fn component_names(&self, entity: Entity) -> Vec<String> {
        match self.rows.get(&entity) {
            Some(row) => row.keys().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Look up one component of an entity.
    ///
    /// Returns the cell and whether the component is actually attached. When
    /// not attached, the returned cell is a JSON `null` placeholder, so
    /// callers never need a separate null-check path.
    #[must_use]
    pub fn get_component(&self, entity: Entity, component: &str) -> (&Cell, bool) {
        match self.rows.get(&entity).and_then(|row| row.get(component)) {
            Some(cell) => (cell, true),
            None => (&self.null_cell, false),
        }
    }

    /// Returns `true` if `entity` currently holds `component`.
    #[must_use]
    pub fn has_component(&self, entity: Entity, component: &str) -> bool {
        self.rows
            .get(&entity)
            .is_some_and(|row| row.contains_key(component))
    }

    /// Attach, replace, or detach a component.
    ///
    /// `None` — or a cell holding JSON `null` — detaches the component
    /// (no-op when absent); detaching the last component deletes the row.
    /// Any other cell attaches or replaces, with the store taking ownership
    /// of the copy.
    pub fn set_component(&mut self, entity: Entity, component: &str, cell: Option<Cell>) {
        let detach = cell.as_ref().is_none_or(Cell::is_null);

        if detach {
            let Some(row) = self.rows.get_mut(&entity) else {
                return;
            };
            if row.remove(component).is_some() && row.is_empty() {
                self.rows.remove(&entity);
            }
        } else if let Some(cell) = cell {
            self.rows
                .entry(entity)
                .or_default()
                .insert(component.to_string(), cell);
        }
    }

    /// Like [`Store::set_component`], but takes a parsed JSON value.
    /// A `null` value detaches.
    pub fn set_component_value(&mut self, entity: Entity, component: &str, value: Value) {
        self.set_component(entity, component, Some(Cell::from_value(value)));
    }

    /// Like [`Store::set_component`], but parses raw JSON text first.
    /// The text `"null"` detaches.
    ///
    /// # Errors
    ///
    /// Returns the parse error if `text` is not valid JSON; the store is
    /// unchanged in that case.
    pub fn set_component_text(
        &mut self,
        entity: Entity,
        component: &str,
        text: &str,
    ) -> Result<(), serde_json::Error> {
        let cell = Cell::from_text(text)?;
        self.set_component(entity, component, Some(cell));
        Ok(())
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
