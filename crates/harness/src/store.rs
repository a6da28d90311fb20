use serde_json::{Value, json};
use tallybook_core::{EntityKind, FieldType, FieldValue};
use tallybook_engine::Engine;
use tallybook_server::{handlers, protocol};

/// An engine plus the server's dispatch plumbing, for driving the store
/// in tests the same way a connected client would.
pub struct TestStore {
    pub engine: Engine,
}

impl TestStore {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            engine: Engine::open_in_memory()?,
        })
    }

    pub fn open(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            engine: Engine::open(path)?,
        })
    }

    /// Declare the usual classroom layout: students carry name/age/score,
    /// groups carry name/score.
    pub fn define_default_schemas(&mut self) {
        self.engine
            .declare_field(EntityKind::Student, "name", FieldType::Text);
        self.engine
            .declare_field(EntityKind::Student, "age", FieldType::Int);
        self.engine
            .declare_field(EntityKind::Student, "score", FieldType::Float);
        self.engine
            .declare_field(EntityKind::Group, "name", FieldType::Text);
        self.engine
            .declare_field(EntityKind::Group, "score", FieldType::Float);
    }

    /// Create a student with the default layout's fields filled in.
    pub fn add_student(
        &mut self,
        name: &str,
        age: i64,
        score: f64,
    ) -> Result<i64, Box<dyn std::error::Error>> {
        let id = self.engine.create_entity(EntityKind::Student, None)?;
        let mut fields = self.engine.entity_fields(EntityKind::Student, id)?;
        fields.set("name", FieldValue::Text(name.to_owned()))?;
        fields.set("age", FieldValue::Int(age))?;
        fields.set("score", FieldValue::Float(score))?;
        Ok(id)
    }

    /// Create a group with the default layout's fields filled in.
    pub fn add_group(
        &mut self,
        name: &str,
        score: f64,
    ) -> Result<i64, Box<dyn std::error::Error>> {
        let id = self.engine.create_entity(EntityKind::Group, None)?;
        let mut fields = self.engine.entity_fields(EntityKind::Group, id)?;
        fields.set("name", FieldValue::Text(name.to_owned()))?;
        fields.set("score", FieldValue::Float(score))?;
        Ok(id)
    }

    /// Dispatch a request the way the TCP server would, skipping only the
    /// framing. Returns `{status, code, data}` or `{status, code, message}`.
    pub fn request(&mut self, category: &str, action: &str, payload: Value) -> Value {
        match handlers::dispatch(&mut self.engine, category, action, &payload) {
            Ok(data) => json!({ "status": "ok", "code": 200, "data": data }),
            Err(err) => json!({ "status": "error", "code": err.code, "message": err.message }),
        }
    }

    /// The full frame path: decode a raw document, dispatch, envelope.
    /// Exactly what a TCP client would be sent back for these bytes.
    pub fn frame(&mut self, frame: &[u8]) -> Value {
        match protocol::parse_request(frame) {
            Ok(request) => {
                match handlers::dispatch(
                    &mut self.engine,
                    &request.category,
                    &request.action,
                    &request.payload,
                ) {
                    Ok(data) => protocol::ok_response(&request.seq, data),
                    Err(err) => protocol::error_response(&request.seq, err.code, &err.message),
                }
            }
            Err(response) => response,
        }
    }
}
