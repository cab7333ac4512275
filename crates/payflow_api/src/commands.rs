//! Command handlers — the engine's request/response surface.
//!
//! The hosting process routes a method name and JSON params into
//! [`dispatch`] and sends the JSON result (or `{code, message}` failure)
//! back to the requester. The transport itself lives outside this crate.

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use payflow_engine::bookkeeping::SYSTEMS_FIELD;
use payflow_engine::{Ecs, EcsError, Entity, WriteSpec};

/// A command failure: stable numeric code plus human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CommandError {
    /// Stable error code (2200/2201/2244 for engine errors, JSON-RPC codes
    /// for request problems).
    pub code: i64,
    /// Human-readable description.
    pub message: String,
}

impl CommandError {
    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }

    fn unknown_method(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("unknown method: {method}"),
        }
    }

    /// The wire form of this failure.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({"code": self.code, "message": self.message})
    }
}

impl From<EcsError> for CommandError {
    fn from(err: EcsError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Accepts either a single value or an array of them; several commands
/// promote a lone string (or write spec) to a one-entry list as a caller
/// convenience.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(vs) => vs,
        }
    }
}

fn parse_params<T: for<'de> Deserialize<'de>>(params: Value) -> Result<T, CommandError> {
    serde_json::from_value(params).map_err(|e| CommandError::invalid_params(e.to_string()))
}

/// Route one command to its handler.
///
/// # Errors
///
/// [`CommandError`] with the engine's stable codes for scheduler, write, and
/// registration failures, or JSON-RPC codes for malformed requests and
/// unknown methods.
pub fn dispatch(ecs: &mut Ecs, method: &str, params: Value) -> Result<Value, CommandError> {
    debug!(method, "handling command");
    match method {
        "payecs_newentity" => new_entity(ecs),
        "payecs_listentities" => list_entities(ecs, params),
        "payecs_getcomponents" => get_components(ecs, params),
        "payecs_setcomponents" => set_components(ecs, params),
        "payecs_newsystem" => new_system(ecs, params),
        "payecs_advance" => advance(ecs, params),
        "payecs_getdefaultsystems" => get_default_systems(ecs),
        "payecs_setdefaultsystems" => set_default_systems(ecs, params),
        "payecs_systrace" => systrace(ecs, params),
        other => Err(CommandError::unknown_method(other)),
    }
}

fn new_entity(ecs: &mut Ecs) -> Result<Value, CommandError> {
    let entity = ecs.new_entity();
    Ok(json!({"entity": entity}))
}

/// `{entity, <name: value>...}` for every component the entity holds.
fn splice_entity_components(ecs: &Ecs, entity: Entity, components: &[String]) -> Value {
    let mut obj = Map::new();
    obj.insert("entity".to_string(), json!(entity));
    for component in components {
        let (cell, _) = ecs.get_component(entity, component);
        obj.insert(component.clone(), cell.value().clone());
    }
    Value::Object(obj)
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListEntitiesParams {
    required: Option<OneOrMany<String>>,
    disallowed: Option<OneOrMany<String>>,
}

fn list_entities(ecs: &mut Ecs, params: Value) -> Result<Value, CommandError> {
    let params: ListEntitiesParams = parse_params(params)?;
    let required = params.required.map(OneOrMany::into_vec).unwrap_or_default();
    let disallowed = params
        .disallowed
        .map(OneOrMany::into_vec)
        .unwrap_or_default();

    let (min, max) = ecs.entity_bounds();
    let mut entities = Vec::new();
    for id in min.id()..max.id() {
        let entity = Entity(id);
        let components = ecs.component_names(entity);
        if components.is_empty() {
            continue;
        }
        if !required.iter().all(|c| components.contains(c)) {
            continue;
        }
        if disallowed.iter().any(|c| components.contains(c)) {
            continue;
        }
        entities.push(splice_entity_components(ecs, entity, &components));
    }
    Ok(json!({"entities": entities}))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetComponentsParams {
    entity: u32,
    components: OneOrMany<String>,
}

fn get_components(ecs: &mut Ecs, params: Value) -> Result<Value, CommandError> {
    let params: GetComponentsParams = parse_params(params)?;
    Ok(splice_entity_components(
        ecs,
        Entity(params.entity),
        &params.components.into_vec(),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SetComponentsParams {
    writes: OneOrMany<WriteSpec>,
    expected: Option<OneOrMany<WriteSpec>>,
}

fn set_components(ecs: &mut Ecs, params: Value) -> Result<Value, CommandError> {
    let params: SetComponentsParams = parse_params(params)?;
    let writes = params.writes.into_vec();
    let expected = params.expected.map(OneOrMany::into_vec).unwrap_or_default();
    ecs.set_components(&writes, &expected)?;
    Ok(json!({}))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NewSystemParams {
    system: String,
    required: OneOrMany<String>,
    disallowed: Option<OneOrMany<String>>,
}

fn new_system(ecs: &mut Ecs, params: Value) -> Result<Value, CommandError> {
    let params: NewSystemParams = parse_params(params)?;
    ecs.register_system(
        params.system,
        params.required.into_vec(),
        params.disallowed.map(OneOrMany::into_vec).unwrap_or_default(),
    )?;
    Ok(json!({}))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntityParams {
    entity: u32,
}

fn advance(ecs: &mut Ecs, params: Value) -> Result<Value, CommandError> {
    let params: EntityParams = parse_params(params)?;
    let entity = Entity(params.entity);
    match ecs.advance(entity) {
        Ok(()) => Ok(json!({})),
        Err(err) => {
            // Report the message recorded into the bookkeeping component,
            // which is what external pollers will also see.
            let message = ecs
                .last_error_message(entity)
                .unwrap_or_else(|| err.to_string());
            Err(CommandError {
                code: err.code(),
                message,
            })
        }
    }
}

fn get_default_systems(ecs: &mut Ecs) -> Result<Value, CommandError> {
    Ok(json!({"systems": ecs.default_systems()}))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SetDefaultSystemsParams {
    entity: u32,
    prepend: Option<OneOrMany<String>>,
    append: Option<OneOrMany<String>>,
}

fn set_default_systems(ecs: &mut Ecs, params: Value) -> Result<Value, CommandError> {
    let params: SetDefaultSystemsParams = parse_params(params)?;
    let prepend = params.prepend.map(OneOrMany::into_vec).unwrap_or_default();
    let append = params.append.map(OneOrMany::into_vec).unwrap_or_default();

    for system in prepend.iter().chain(append.iter()) {
        if !ecs.system_exists(system) {
            return Err(CommandError::invalid_params(format!(
                "unregistered system: {system}"
            )));
        }
    }

    let systems: Vec<&String> = prepend
        .iter()
        .chain(ecs.default_systems().iter())
        .chain(append.iter())
        .collect();
    let systems = json!(systems);
    ecs.set_bookkeeping_field(Entity(params.entity), SYSTEMS_FIELD, Some(systems));
    Ok(json!({}))
}

fn systrace(ecs: &mut Ecs, params: Value) -> Result<Value, CommandError> {
    let params: EntityParams = parse_params(params)?;
    let entity = Entity(params.entity);
    let trace: Vec<Value> = ecs
        .trace()
        .for_entity(entity)
        .iter()
        .map(|entry| entry.to_json())
        .collect();
    Ok(json!({"entity": entity, "trace": trace}))
}
