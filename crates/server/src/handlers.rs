//! Request dispatch: one function per category, sharing the engine
//! through a single `&mut` for the duration of the request.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tallybook_core::record::{EntityKind, ScoreEvent};
use tallybook_engine::{Engine, EngineError};

use crate::error::ApiError;
use crate::json::{parse_logic_node, parse_schema, snapshot_to_json, typed_value};

/// Route one decoded request to its handler. Category and action tokens
/// are matched case-insensitively.
pub fn dispatch(
    engine: &mut Engine,
    category: &str,
    action: &str,
    payload: &Value,
) -> Result<Value, ApiError> {
    let action = action.to_ascii_lowercase();
    match category.to_ascii_lowercase().as_str() {
        "system" => handle_system(engine, &action, payload),
        "student" => handle_entity(engine, EntityKind::Student, &action, payload),
        "group" => handle_entity(engine, EntityKind::Group, &action, payload),
        "event" => handle_event(engine, &action, payload),
        "user" => handle_user(engine, &action, payload),
        other => Err(ApiError::bad_request(format!("unknown category '{other}'"))),
    }
}

fn unknown_action(category: &str, action: &str) -> ApiError {
    ApiError::bad_request(format!("unknown action '{category}/{action}'"))
}

fn decode_payload<T: serde::de::DeserializeOwned>(payload: &Value) -> Result<T, ApiError> {
    serde_json::from_value(payload.clone())
        .map_err(|err| ApiError::bad_request(format!("bad payload: {err}")))
}

// ============================================================================
// system
// ============================================================================

#[derive(Debug, Deserialize)]
struct DefinePayload {
    target: String,
    schema: BTreeMap<String, String>,
}

fn handle_system(engine: &mut Engine, action: &str, payload: &Value) -> Result<Value, ApiError> {
    match action {
        "define" => {
            let request: DefinePayload = decode_payload(payload)?;
            let kind = EntityKind::parse(&request.target.to_ascii_lowercase()).ok_or_else(
                || ApiError::bad_request(format!("unknown target '{}'", request.target)),
            )?;
            let schema = parse_schema(&request.schema)?;
            engine.define_schema(kind, schema);
            engine.commit()?;
            Ok(json!({ "success": true }))
        }
        "commit" => {
            engine.commit()?;
            Ok(json!({ "success": true }))
        }
        other => Err(unknown_action("system", other)),
    }
}

// ============================================================================
// student / group
// ============================================================================

#[derive(Debug, Deserialize)]
struct CreateItem {
    index: i64,
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    data: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct CreatePayload {
    items: Vec<CreateItem>,
}

#[derive(Debug, Deserialize)]
struct UpdatePayload {
    id: i64,
    set: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct DeletePayload {
    id: i64,
}

fn handle_entity(
    engine: &mut Engine,
    kind: EntityKind,
    action: &str,
    payload: &Value,
) -> Result<Value, ApiError> {
    match action {
        "create" => entity_create(engine, kind, payload),
        "query" => entity_query(engine, kind, payload),
        "update" => entity_update(engine, kind, payload),
        "delete" => entity_delete(engine, kind, payload),
        other => Err(unknown_action(kind.as_str(), other)),
    }
}

/// Batch create. Items succeed or fail one by one; a failed item is
/// cleaned up and does not stop the rest. Commits only when at least
/// one item landed.
fn entity_create(
    engine: &mut Engine,
    kind: EntityKind,
    payload: &Value,
) -> Result<Value, ApiError> {
    engine.ensure_schema(kind)?;
    let request: CreatePayload = decode_payload(payload)?;
    let mut results = Vec::with_capacity(request.items.len());
    let mut created = 0usize;
    for item in &request.items {
        match create_one(engine, kind, item) {
            Ok(id) => {
                created += 1;
                results.push(json!({ "index": item.index, "success": true, "id": id }));
            }
            Err(err) => {
                results.push(json!({
                    "index": item.index,
                    "success": false,
                    "message": err.message,
                }));
            }
        }
    }
    if created > 0 {
        engine.commit()?;
    }
    Ok(json!({ "count": created, "results": results }))
}

fn create_one(engine: &mut Engine, kind: EntityKind, item: &CreateItem) -> Result<i64, ApiError> {
    let id = engine.create_entity(kind, item.id)?;
    let mut failure = None;
    {
        let mut accessor = match engine.entity_fields(kind, id) {
            Ok(accessor) => accessor,
            Err(err) => return Err(err.into()),
        };
        for (field, value) in &item.data {
            let typed = match typed_value(accessor.schema(), field, value) {
                Ok(typed) => typed,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            };
            if let Err(err) = accessor.set(field, typed) {
                failure = Some(err.into());
                break;
            }
        }
    }
    if let Some(err) = failure {
        engine.delete_entity(kind, id);
        return Err(err);
    }
    Ok(id)
}

fn entity_query(engine: &Engine, kind: EntityKind, payload: &Value) -> Result<Value, ApiError> {
    let limit = match payload.get("limit") {
        None | Some(Value::Null) => 0,
        Some(value) => value
            .as_u64()
            .ok_or_else(|| ApiError::bad_request("'limit' must be a non-negative integer"))?
            as usize,
    };
    let filter = match payload.get("logic") {
        None | Some(Value::Null) => None,
        Some(tree) => Some(parse_logic_node(tree)?),
    };
    let ids = engine.query_entities(kind, filter.as_ref(), limit)?;
    let mut items = Vec::with_capacity(ids.len());
    for id in ids {
        let snapshot = engine.snapshot_entity(kind, id)?;
        items.push(json!({ "id": id, "data": snapshot_to_json(&snapshot) }));
    }
    Ok(json!({ "items": items }))
}

fn entity_update(
    engine: &mut Engine,
    kind: EntityKind,
    payload: &Value,
) -> Result<Value, ApiError> {
    engine.ensure_schema(kind)?;
    let request: UpdatePayload = decode_payload(payload)?;
    let updated = request.set.len();
    {
        let mut accessor = engine.entity_fields(kind, request.id)?;
        // type every value before touching the record so a bad field
        // leaves it unchanged
        let mut typed = Vec::with_capacity(request.set.len());
        for (field, value) in &request.set {
            typed.push((field.as_str(), typed_value(accessor.schema(), field, value)?));
        }
        for (field, value) in typed {
            accessor.set(field, value)?;
        }
    }
    engine.commit()?;
    Ok(json!({ "id": request.id, "updated": updated }))
}

fn entity_delete(
    engine: &mut Engine,
    kind: EntityKind,
    payload: &Value,
) -> Result<Value, ApiError> {
    let request: DeletePayload = decode_payload(payload)?;
    if !engine.delete_entity(kind, request.id) {
        return Err(EngineError::NotFound {
            kind,
            id: request.id,
        }
        .into());
    }
    engine.commit()?;
    Ok(json!({ "success": true }))
}

// ============================================================================
// event
// ============================================================================

#[derive(Debug, Deserialize)]
struct EventCreatePayload {
    #[serde(default)]
    id: Option<i64>,
    #[serde(rename = "type")]
    kind: i64,
    ref_id: i64,
    #[serde(default)]
    desc: String,
    val_prev: f64,
    val_curr: f64,
}

#[derive(Debug, Deserialize)]
struct EventUpdatePayload {
    id: i64,
    erased: bool,
}

fn event_kind(code: i64) -> Result<EntityKind, ApiError> {
    match code {
        1 => Ok(EntityKind::Student),
        2 => Ok(EntityKind::Group),
        other => Err(ApiError::bad_request(format!("unknown event type {other}"))),
    }
}

fn event_kind_code(kind: EntityKind) -> i64 {
    match kind {
        EntityKind::Student => 1,
        EntityKind::Group => 2,
    }
}

fn handle_event(engine: &mut Engine, action: &str, payload: &Value) -> Result<Value, ApiError> {
    match action {
        "create" => {
            let request: EventCreatePayload = decode_payload(payload)?;
            if request.id.is_some() {
                return Err(ApiError::unprocessable("explicit event ids are not supported"));
            }
            let kind = event_kind(request.kind)?;
            let id = engine.add_event(
                kind,
                request.ref_id,
                &request.desc,
                request.val_prev,
                request.val_curr,
            )?;
            engine.commit()?;
            let at = engine.event(id).map(|event| event.at).unwrap_or_default();
            Ok(json!({ "id": id, "timestamp": at }))
        }
        "update" => {
            let request: EventUpdatePayload = decode_payload(payload)?;
            engine.set_event_erased(request.id, request.erased)?;
            engine.commit()?;
            Ok(json!({ "success": true }))
        }
        "query" => event_query(engine, payload),
        other => Err(unknown_action("event", other)),
    }
}

fn event_query(engine: &Engine, payload: &Value) -> Result<Value, ApiError> {
    let kind = match payload.get("type") {
        None | Some(Value::Null) => None,
        Some(value) => {
            let code = value
                .as_i64()
                .ok_or_else(|| ApiError::bad_request("'type' must be 1 or 2"))?;
            Some(event_kind(code)?)
        }
    };
    let ref_id = match payload.get("ref_id") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            value
                .as_i64()
                .ok_or_else(|| ApiError::bad_request("'ref_id' must be an integer"))?,
        ),
    };
    let include_erased = payload
        .get("include_erased")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let events = engine.events_matching(|event| {
        kind.is_none_or(|k| event.kind == k)
            && ref_id.is_none_or(|id| event.subject_id == id)
            && (include_erased || !event.erased)
    });
    let items: Vec<Value> = events.into_iter().map(event_to_json).collect();
    Ok(json!({ "items": items }))
}

fn event_to_json(event: &ScoreEvent) -> Value {
    json!({
        "id": event.id,
        "type": event_kind_code(event.kind),
        "ref_id": event.subject_id,
        "desc": event.reason,
        "actor": event.actor,
        "delta": event.delta,
        "timestamp": event.at,
        "erased": event.erased,
    })
}

// ============================================================================
// user
// ============================================================================

#[derive(Debug, Deserialize)]
struct LoginPayload {
    username: String,
    password: String,
}

fn handle_user(engine: &mut Engine, action: &str, payload: &Value) -> Result<Value, ApiError> {
    match action {
        "login" => {
            let request: LoginPayload = decode_payload(payload)?;
            engine.login(&request.username, &request.password)?;
            let permission = engine
                .current_user()
                .map(|user| user.permission.bits())
                .unwrap_or_default();
            Ok(json!({ "username": request.username, "permission": permission }))
        }
        "logout" => {
            engine.logout();
            Ok(json!({ "success": true }))
        }
        "current" => match engine.current_user() {
            Some(user) => Ok(json!({
                "logged_in": true,
                "user": { "username": user.username, "permission": user.permission.bits() },
            })),
            None => Ok(json!({ "logged_in": false, "user": null })),
        },
        "query" => {
            let users: Vec<Value> = engine
                .users()
                .map(|user| {
                    json!({
                        "id": user.id,
                        "username": user.username,
                        "permission": user.permission.bits(),
                        "active": user.active,
                    })
                })
                .collect();
            Ok(json!({ "users": users }))
        }
        other => Err(unknown_action("user", other)),
    }
}
