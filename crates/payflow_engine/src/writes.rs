//! The optimistic write layer.
//!
//! [`set_components`] applies a batch of writes only if an accompanying batch
//! of expectations currently holds, emulating a transaction over the
//! lock-free store: sample state, compute, then write with the sampled state
//! passed back as `expected`. If validation fails, re-sample and re-compute.
//!
//! The whole call runs without yielding, so each entity's pre-check is
//! atomic with its own writes; writes across different entities are not
//! mutually atomic with each other.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use payflow_store::{Entity, Store, json_equal};

use crate::error::EcsError;

/// One entry of a `writes` or `expected` batch.
///
/// Wire form: `{"entity": id, "exact": bool?, "<component>": value, ...}` —
/// every key other than `entity` and `exact` is a component field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteSpec {
    /// The entity to write or validate.
    pub entity: Entity,
    /// In an expectation: the entity must hold exactly the listed fields.
    /// In a write: detach every existing component before writing.
    #[serde(default)]
    pub exact: bool,
    /// Component name to value. In a write, a `null` value detaches that
    /// single field.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl WriteSpec {
    /// Build a write spec programmatically.
    #[must_use]
    pub fn new(entity: Entity, fields: Map<String, Value>) -> Self {
        Self {
            entity,
            exact: false,
            fields,
        }
    }

    /// Request exact-match validation / exact overwrite.
    #[must_use]
    pub fn exact(mut self) -> Self {
        self.exact = true;
        self
    }
}

/// Validate `expected` against the store, then apply `writes`.
///
/// The validation phase is read-only: every expected field must be
/// structurally equal to the current value (an absent component reads as
/// `null`, so expecting `null` means expecting absence), and an `exact`
/// expectation additionally pins the entity's full component count. Any
/// mismatch aborts the whole call with no writes at all.
///
/// # Errors
///
/// [`EcsError::UnexpectedComponents`] when validation fails.
pub fn set_components(
    store: &mut Store,
    writes: &[WriteSpec],
    expected: &[WriteSpec],
) -> Result<(), EcsError> {
    for expect in expected {
        for (component, value) in &expect.fields {
            let (cell, _) = store.get_component(expect.entity, component);
            if !json_equal(value, cell.value()) {
                return Err(EcsError::UnexpectedComponents);
            }
        }
        if expect.exact {
            let live = store.component_names(expect.entity);
            if live.len() != expect.fields.len() {
                return Err(EcsError::UnexpectedComponents);
            }
        }
    }

    for write in writes {
        if write.exact {
            for component in store.component_names(write.entity) {
                store.set_component(write.entity, &component, None);
            }
        }
        for (component, value) in &write.fields {
            store.set_component_value(write.entity, component, value.clone());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn spec(entity: Entity, fields: Value) -> WriteSpec {
        let Value::Object(fields) = fields else {
            panic!("fields must be an object");
        };
        WriteSpec::new(entity, fields)
    }

    #[test]
    fn test_writes_without_expectations() {
        let mut store = Store::new();
        let e = Entity(1);
        set_components(&mut store, &[spec(e, json!({"x": 1, "y": "z"}))], &[]).unwrap();
        assert_eq!(store.get_component(e, "x").0.value(), &json!(1));
        assert_eq!(store.get_component(e, "y").0.value(), &json!("z"));
    }

    #[test]
    fn test_cas_succeeds_when_expectation_holds() {
        let mut store = Store::new();
        let e = Entity(1);
        store.set_component_value(e, "x", json!(0));

        set_components(
            &mut store,
            &[spec(e, json!({"x": 1}))],
            &[spec(e, json!({"x": 0}))],
        )
        .unwrap();
        assert_eq!(store.get_component(e, "x").0.value(), &json!(1));
    }

    #[test]
    fn test_cas_fails_and_writes_nothing() {
        let mut store = Store::new();
        let e = Entity(1);
        store.set_component_value(e, "x", json!(5));

        let err = set_components(
            &mut store,
            &[spec(e, json!({"x": 1}))],
            &[spec(e, json!({"x": 0}))],
        )
        .unwrap_err();
        assert_eq!(err, EcsError::UnexpectedComponents);
        assert_eq!(store.get_component(e, "x").0.value(), &json!(5));
    }

    #[test]
    fn test_expecting_null_means_absence() {
        let mut store = Store::new();
        let e = Entity(1);
        // "x" is absent, so expecting null holds.
        set_components(
            &mut store,
            &[spec(e, json!({"x": 1}))],
            &[spec(e, json!({"x": null}))],
        )
        .unwrap();
        assert_eq!(store.get_component(e, "x").0.value(), &json!(1));
    }

    #[test]
    fn test_any_mismatch_aborts_whole_batch() {
        let mut store = Store::new();
        let e1 = Entity(1);
        let e2 = Entity(2);
        store.set_component_value(e1, "a", json!(1));

        let err = set_components(
            &mut store,
            &[spec(e1, json!({"a": 2})), spec(e2, json!({"b": 1}))],
            &[
                spec(e1, json!({"a": 1})),
                spec(e2, json!({"b": "wrong"})),
            ],
        )
        .unwrap_err();
        assert_eq!(err, EcsError::UnexpectedComponents);
        // Even the passing entity's write was not applied.
        assert_eq!(store.get_component(e1, "a").0.value(), &json!(1));
        assert!(store.component_names(e2).is_empty());
    }

    #[test]
    fn test_exact_expectation_pins_component_count() {
        let mut store = Store::new();
        let e = Entity(1);
        store.set_component_value(e, "a", json!(1));
        store.set_component_value(e, "b", json!(2));

        // Expecting exactly {a} fails: the entity also has "b".
        let err = set_components(
            &mut store,
            &[],
            &[spec(e, json!({"a": 1})).exact()],
        )
        .unwrap_err();
        assert_eq!(err, EcsError::UnexpectedComponents);

        // Expecting exactly {a, b} passes.
        set_components(
            &mut store,
            &[],
            &[spec(e, json!({"a": 1, "b": 2})).exact()],
        )
        .unwrap();
    }

    #[test]
    fn test_exact_write_replaces_full_component_set() {
        let mut store = Store::new();
        let e = Entity(1);
        store.set_component_value(e, "old1", json!(1));
        store.set_component_value(e, "old2", json!(2));

        set_components(&mut store, &[spec(e, json!({"fresh": 3})).exact()], &[]).unwrap();
        assert_eq!(store.component_names(e), vec!["fresh"]);
    }

    #[test]
    fn test_null_write_detaches_single_field() {
        let mut store = Store::new();
        let e = Entity(1);
        store.set_component_value(e, "a", json!(1));
        store.set_component_value(e, "b", json!(2));

        set_components(&mut store, &[spec(e, json!({"a": null}))], &[]).unwrap();
        assert_eq!(store.component_names(e), vec!["b"]);
    }

    #[test]
    fn test_writespec_deserializes_flattened_fields() {
        let spec: WriteSpec =
            serde_json::from_value(json!({"entity": 4, "exact": true, "x": 1, "y": [2]}))
                .unwrap();
        assert_eq!(spec.entity, Entity(4));
        assert!(spec.exact);
        assert_eq!(spec.fields.get("x"), Some(&json!(1)));
        assert_eq!(spec.fields.get("y"), Some(&json!([2])));
    }

    #[test]
    fn test_writespec_exact_defaults_to_false() {
        let spec: WriteSpec = serde_json::from_value(json!({"entity": 4, "x": 1})).unwrap();
        assert!(!spec.exact);
    }
}
