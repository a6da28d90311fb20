//! Frame-level request and response shapes.
//!
//! Requests are `{seq, category, action, payload}`; responses echo `seq`
//! and carry either `{status: "ok", code: 200, data}` or `{status:
//! "error", code, message}`. A frame that cannot even tell us its `seq`
//! is answered with an empty one.

use serde_json::{Value, json};

/// One decoded request frame.
#[derive(Debug)]
pub struct Request {
    pub seq: String,
    pub category: String,
    pub action: String,
    pub payload: Value,
}

/// Decode a frame. On failure the ready-to-send error response is
/// returned instead.
pub fn parse_request(frame: &[u8]) -> Result<Request, Value> {
    let value: Value = match serde_json::from_slice(frame) {
        Ok(value) => value,
        Err(err) => return Err(error_response("", 400, &format!("invalid json: {err}"))),
    };
    let seq = match value.get("seq").and_then(Value::as_str) {
        Some(seq) => seq.to_owned(),
        None => return Err(error_response("", 400, "missing or non-string 'seq'")),
    };
    let category = match value.get("category").and_then(Value::as_str) {
        Some(category) => category.to_owned(),
        None => return Err(error_response(&seq, 400, "missing or non-string 'category'")),
    };
    let action = match value.get("action").and_then(Value::as_str) {
        Some(action) => action.to_owned(),
        None => return Err(error_response(&seq, 400, "missing or non-string 'action'")),
    };
    let payload = value.get("payload").cloned().unwrap_or_else(|| json!({}));
    Ok(Request {
        seq,
        category,
        action,
        payload,
    })
}

pub fn ok_response(seq: &str, data: Value) -> Value {
    json!({ "seq": seq, "status": "ok", "code": 200, "data": data })
}

pub fn error_response(seq: &str, code: u16, message: &str) -> Value {
    json!({ "seq": seq, "status": "error", "code": code, "message": message })
}
