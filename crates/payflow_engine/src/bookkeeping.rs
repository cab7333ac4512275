//! The scheduling bookkeeping component and its copy-on-write field editor.
//!
//! Entities participating in scheduling carry a component conventionally
//! named `lightningd:systems`:
//!
//! ```json
//! {"systems": ["sys1", "sys2"], "current": 0, "error": {"code": 2201, "message": "..."}}
//! ```
//!
//! `systems` is the ordered candidate list, `current` records the index of
//! the system that most recently ran (so the next scan resumes at
//! `current + 1`), and `error` is the last scheduler-level failure.
//!
//! The field editor rebuilds the whole object copying every existing field
//! except the target, then stores the rebuilt object; because the whole
//! rebuild-and-replace runs without yielding, unrelated fields added by
//! other parties are never lost.

use serde_json::{Map, Value};

use payflow_store::{Entity, Store};

/// Name of the scheduling bookkeeping component.
pub const SYSTEMS_COMPONENT: &str = "lightningd:systems";

/// Field holding the ordered candidate system list.
pub const SYSTEMS_FIELD: &str = "systems";

/// Cursor field: index of the most recently executed system.
pub const CURSOR_FIELD: &str = "current";

/// Field holding the last scheduler-level failure, `{code, message}`.
pub const ERROR_FIELD: &str = "error";

/// Add, overwrite, or delete one field of the bookkeeping component,
/// preserving every other field.
///
/// `value = None` deletes the field. If the component is currently absent or
/// not an object, the rebuilt component starts empty, so the result is a
/// well-formed object either way.
pub fn set_field(store: &mut Store, entity: Entity, field: &str, value: Option<Value>) {
    let mut rebuilt = Map::new();

    let (cell, _) = store.get_component(entity, SYSTEMS_COMPONENT);
    if let Value::Object(existing) = cell.value() {
        for (key, val) in existing {
            if key == field {
                continue;
            }
            rebuilt.insert(key.clone(), val.clone());
        }
    }

    if let Some(value) = value {
        rebuilt.insert(field.to_string(), value);
    }

    store.set_component_value(entity, SYSTEMS_COMPONENT, Value::Object(rebuilt));
}

/// Read the `systems` candidate list.
///
/// Returns `None` if the bookkeeping component is absent, not an object, or
/// its `systems` field is not an array of strings.
#[must_use]
pub fn systems_list(store: &Store, entity: Entity) -> Option<Vec<String>> {
    let (cell, found) = store.get_component(entity, SYSTEMS_COMPONENT);
    if !found {
        return None;
    }
    let list = cell.value().as_object()?.get(SYSTEMS_FIELD)?.as_array()?;
    list.iter()
        .map(|v| v.as_str().map(ToString::to_string))
        .collect()
}

/// Read the cursor field, if present and a valid index-sized integer.
#[must_use]
pub fn cursor(store: &Store, entity: Entity) -> Option<u32> {
    let (cell, _) = store.get_component(entity, SYSTEMS_COMPONENT);
    let n = cell.value().as_object()?.get(CURSOR_FIELD)?.as_u64()?;
    u32::try_from(n).ok()
}

/// Read back the message of the last recorded scheduler failure.
#[must_use]
pub fn error_message(store: &Store, entity: Entity) -> Option<String> {
    let (cell, _) = store.get_component(entity, SYSTEMS_COMPONENT);
    let msg = cell
        .value()
        .as_object()?
        .get(ERROR_FIELD)?
        .as_object()?
        .get("message")?
        .as_str()?;
    Some(msg.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_set_field_creates_component() {
        let mut store = Store::new();
        let e = Entity(1);
        set_field(&mut store, e, SYSTEMS_FIELD, Some(json!(["a", "b"])));
        let (cell, found) = store.get_component(e, SYSTEMS_COMPONENT);
        assert!(found);
        assert_eq!(cell.value(), &json!({"systems": ["a", "b"]}));
    }

    #[test]
    fn test_set_field_preserves_unrelated_fields() {
        let mut store = Store::new();
        let e = Entity(1);
        store.set_component_value(
            e,
            SYSTEMS_COMPONENT,
            json!({"systems": ["a"], "peer:note": "keep me"}),
        );
        set_field(&mut store, e, CURSOR_FIELD, Some(json!(0)));
        let (cell, _) = store.get_component(e, SYSTEMS_COMPONENT);
        assert_eq!(
            cell.value(),
            &json!({"systems": ["a"], "peer:note": "keep me", "current": 0})
        );
    }

    #[test]
    fn test_set_field_none_deletes_field() {
        let mut store = Store::new();
        let e = Entity(1);
        store.set_component_value(
            e,
            SYSTEMS_COMPONENT,
            json!({"systems": ["a"], "error": {"code": 2201, "message": "x"}}),
        );
        set_field(&mut store, e, ERROR_FIELD, None);
        let (cell, _) = store.get_component(e, SYSTEMS_COMPONENT);
        assert_eq!(cell.value(), &json!({"systems": ["a"]}));
    }

    #[test]
    fn test_set_field_replaces_non_object_component() {
        let mut store = Store::new();
        let e = Entity(1);
        store.set_component_value(e, SYSTEMS_COMPONENT, json!("garbage"));
        set_field(&mut store, e, SYSTEMS_FIELD, Some(json!([])));
        let (cell, _) = store.get_component(e, SYSTEMS_COMPONENT);
        assert_eq!(cell.value(), &json!({"systems": []}));
    }

    #[test]
    fn test_systems_list_valid() {
        let mut store = Store::new();
        let e = Entity(1);
        store.set_component_value(e, SYSTEMS_COMPONENT, json!({"systems": ["x", "y"]}));
        assert_eq!(
            systems_list(&store, e),
            Some(vec!["x".to_string(), "y".to_string()])
        );
    }

    #[test]
    fn test_systems_list_rejects_malformed() {
        let mut store = Store::new();
        let e = Entity(1);
        assert_eq!(systems_list(&store, e), None);

        store.set_component_value(e, SYSTEMS_COMPONENT, json!(["not", "an", "object"]));
        assert_eq!(systems_list(&store, e), None);

        store.set_component_value(e, SYSTEMS_COMPONENT, json!({"systems": "not-array"}));
        assert_eq!(systems_list(&store, e), None);

        store.set_component_value(e, SYSTEMS_COMPONENT, json!({"systems": ["ok", 5]}));
        assert_eq!(systems_list(&store, e), None);
    }

    #[test]
    fn test_cursor_absent_and_present() {
        let mut store = Store::new();
        let e = Entity(1);
        store.set_component_value(e, SYSTEMS_COMPONENT, json!({"systems": ["x"]}));
        assert_eq!(cursor(&store, e), None);
        set_field(&mut store, e, CURSOR_FIELD, Some(json!(3)));
        assert_eq!(cursor(&store, e), Some(3));
    }

    #[test]
    fn test_error_message_roundtrip() {
        let mut store = Store::new();
        let e = Entity(1);
        set_field(
            &mut store,
            e,
            ERROR_FIELD,
            Some(json!({"code": 2201, "message": "no systems match"})),
        );
        assert_eq!(error_message(&store, e), Some("no systems match".into()));
    }
}
