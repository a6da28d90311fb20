pub mod error;
pub mod users;

pub use error::EngineError;
pub use users::{DEFAULT_ROOT_PASSWORD, DEFAULT_ROOT_USER};

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use tallybook_core::{
    CoreError,
    accessor::FieldAccessor,
    predicate::{self, LogicNode},
    record::{EntityKind, Group, ScoreEvent, Student},
    schema::{FieldType, Schema},
    snapshot::TypedSnapshot,
    value::PropertyBag,
};
use tallybook_storage::{SqliteStorage, StoreState};

/// In-memory working copy of the store plus its SQLite backing.
///
/// All reads and writes go against `state`; nothing touches the database
/// until `commit`. `rollback` throws the working copy away and reloads
/// whatever was last committed.
pub struct Engine {
    storage: SqliteStorage,
    state: StoreState,
    next_student_id: i64,
    next_group_id: i64,
    next_event_id: i64,
    next_user_id: i64,
    current_user: Option<i64>,
}

impl Engine {
    /// Open (or create) a store backed by the database file at `path`.
    pub fn open(path: &str) -> Result<Self, EngineError> {
        Self::from_storage(SqliteStorage::open(path)?)
    }

    /// Open a store backed by a private in-memory database.
    pub fn open_in_memory() -> Result<Self, EngineError> {
        Self::from_storage(SqliteStorage::open_in_memory()?)
    }

    fn from_storage(storage: SqliteStorage) -> Result<Self, EngineError> {
        let state = storage.load_state()?;
        let mut engine = Self {
            storage,
            next_student_id: next_id(&state.students),
            next_group_id: next_id(&state.groups),
            next_event_id: next_id(&state.events),
            next_user_id: next_id(&state.users),
            state,
            current_user: None,
        };
        engine.ensure_root_user();
        Ok(engine)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Write the working copy to the database.
    pub fn commit(&mut self) -> Result<(), EngineError> {
        self.storage.save_state(&self.state)?;
        Ok(())
    }

    /// Discard the working copy and reload the last committed state.
    ///
    /// If the logged-in account does not exist in the reloaded state the
    /// session ends as well.
    pub fn rollback(&mut self) -> Result<(), EngineError> {
        self.state = self.storage.load_state()?;
        self.next_student_id = next_id(&self.state.students);
        self.next_group_id = next_id(&self.state.groups);
        self.next_event_id = next_id(&self.state.events);
        self.next_user_id = next_id(&self.state.users);
        self.ensure_root_user();
        if let Some(id) = self.current_user
            && !self.state.users.contains_key(&id)
        {
            self.current_user = None;
        }
        Ok(())
    }

    // ========================================================================
    // Schemas
    // ========================================================================

    pub fn schema(&self, kind: EntityKind) -> &Schema {
        match kind {
            EntityKind::Student => &self.state.student_schema,
            EntityKind::Group => &self.state.group_schema,
        }
    }

    /// Replace the whole field layout for one entity kind.
    ///
    /// Existing property bags are left untouched; entries that no longer
    /// match the schema simply become invisible to typed reads.
    pub fn define_schema(&mut self, kind: EntityKind, schema: Schema) {
        match kind {
            EntityKind::Student => self.state.student_schema = schema,
            EntityKind::Group => self.state.group_schema = schema,
        }
    }

    /// Declare (or re-type) a single field on one entity kind.
    pub fn declare_field(&mut self, kind: EntityKind, name: &str, field_type: FieldType) {
        match kind {
            EntityKind::Student => self.state.student_schema.declare(name, field_type),
            EntityKind::Group => self.state.group_schema.declare(name, field_type),
        }
    }

    pub fn ensure_schema(&self, kind: EntityKind) -> Result<(), EngineError> {
        if self.schema(kind).is_empty() {
            return Err(EngineError::SchemaNotDefined(kind));
        }
        Ok(())
    }

    // ========================================================================
    // Students & Groups
    // ========================================================================

    /// Hand out the next free id for `kind` without creating anything.
    pub fn allocate_entity_id(&mut self, kind: EntityKind) -> i64 {
        match kind {
            EntityKind::Student => {
                let id = self.next_student_id;
                self.next_student_id += 1;
                id
            }
            EntityKind::Group => {
                let id = self.next_group_id;
                self.next_group_id += 1;
                id
            }
        }
    }

    /// Create an empty entity. `id: None` allocates the next free id;
    /// an explicit id must not collide with an existing entity.
    pub fn create_entity(&mut self, kind: EntityKind, id: Option<i64>) -> Result<i64, EngineError> {
        let id = match id {
            Some(id) => id,
            None => self.allocate_entity_id(kind),
        };
        match kind {
            EntityKind::Student => {
                if self.state.students.contains_key(&id) {
                    return Err(EngineError::DuplicateId { kind, id });
                }
                self.state.students.insert(id, Student::new(id));
                self.next_student_id = self.next_student_id.max(id + 1);
            }
            EntityKind::Group => {
                if self.state.groups.contains_key(&id) {
                    return Err(EngineError::DuplicateId { kind, id });
                }
                self.state.groups.insert(id, Group::new(id));
                self.next_group_id = self.next_group_id.max(id + 1);
            }
        }
        Ok(id)
    }

    pub fn has_entity(&self, kind: EntityKind, id: i64) -> bool {
        match kind {
            EntityKind::Student => self.state.students.contains_key(&id),
            EntityKind::Group => self.state.groups.contains_key(&id),
        }
    }

    pub fn entity_count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Student => self.state.students.len(),
            EntityKind::Group => self.state.groups.len(),
        }
    }

    pub fn entity_ids(&self, kind: EntityKind) -> Vec<i64> {
        match kind {
            EntityKind::Student => self.state.students.keys().copied().collect(),
            EntityKind::Group => self.state.groups.keys().copied().collect(),
        }
    }

    pub fn student(&self, id: i64) -> Option<&Student> {
        self.state.students.get(&id)
    }

    pub fn group(&self, id: i64) -> Option<&Group> {
        self.state.groups.get(&id)
    }

    /// Remove an entity and detach it from the other side of every
    /// membership it appears in. Returns false if the id was unknown.
    pub fn delete_entity(&mut self, kind: EntityKind, id: i64) -> bool {
        match kind {
            EntityKind::Student => {
                let Some(student) = self.state.students.remove(&id) else {
                    return false;
                };
                for group_id in student.groups {
                    if let Some(group) = self.state.groups.get_mut(&group_id) {
                        group.members.retain(|member| *member != id);
                    }
                }
                true
            }
            EntityKind::Group => {
                let Some(group) = self.state.groups.remove(&id) else {
                    return false;
                };
                for student_id in group.members {
                    if let Some(student) = self.state.students.get_mut(&student_id) {
                        student.groups.retain(|g| *g != id);
                    }
                }
                true
            }
        }
    }

    /// Schema-checked read/write access to one entity's fields.
    pub fn entity_fields(
        &mut self,
        kind: EntityKind,
        id: i64,
    ) -> Result<FieldAccessor<'_>, EngineError> {
        match kind {
            EntityKind::Student => {
                let student = self
                    .state
                    .students
                    .get_mut(&id)
                    .ok_or(EngineError::NotFound { kind, id })?;
                Ok(FieldAccessor::new(&mut student.fields, &self.state.student_schema))
            }
            EntityKind::Group => {
                let group = self
                    .state
                    .groups
                    .get_mut(&id)
                    .ok_or(EngineError::NotFound { kind, id })?;
                Ok(FieldAccessor::new(&mut group.fields, &self.state.group_schema))
            }
        }
    }

    /// One-shot typed decode of an entity's fields for filtering or display.
    pub fn snapshot_entity(
        &self,
        kind: EntityKind,
        id: i64,
    ) -> Result<TypedSnapshot<'_>, EngineError> {
        match kind {
            EntityKind::Student => {
                let student = self
                    .state
                    .students
                    .get(&id)
                    .ok_or(EngineError::NotFound { kind, id })?;
                Ok(TypedSnapshot::decode(&student.fields, &self.state.student_schema))
            }
            EntityKind::Group => {
                let group = self
                    .state
                    .groups
                    .get(&id)
                    .ok_or(EngineError::NotFound { kind, id })?;
                Ok(TypedSnapshot::decode(&group.fields, &self.state.group_schema))
            }
        }
    }

    /// Ids of all entities of `kind` matching `filter`, in ascending id
    /// order. `filter: None` matches everything. `limit: 0` means no limit.
    pub fn query_entities(
        &self,
        kind: EntityKind,
        filter: Option<&LogicNode>,
        limit: usize,
    ) -> Result<Vec<i64>, EngineError> {
        let schema = self.schema(kind);
        let mut matched = Vec::new();
        match kind {
            EntityKind::Student => {
                for (id, student) in &self.state.students {
                    if limit != 0 && matched.len() >= limit {
                        break;
                    }
                    if bag_matches(&student.fields, schema, filter)? {
                        matched.push(*id);
                    }
                }
            }
            EntityKind::Group => {
                for (id, group) in &self.state.groups {
                    if limit != 0 && matched.len() >= limit {
                        break;
                    }
                    if bag_matches(&group.fields, schema, filter)? {
                        matched.push(*id);
                    }
                }
            }
        }
        Ok(matched)
    }

    /// Delete every entity of `kind` matching `filter`. Returns how many
    /// were removed. Nothing is removed if the filter fails to evaluate.
    pub fn delete_entities_matching(
        &mut self,
        kind: EntityKind,
        filter: &LogicNode,
    ) -> Result<usize, EngineError> {
        let doomed = self.query_entities(kind, Some(filter), 0)?;
        for id in &doomed {
            self.delete_entity(kind, *id);
        }
        Ok(doomed.len())
    }

    // ========================================================================
    // Memberships
    // ========================================================================

    /// Put a student into a group. Both sides must exist; adding an
    /// existing member is a no-op.
    pub fn add_member(&mut self, group_id: i64, student_id: i64) -> Result<(), EngineError> {
        if !self.state.students.contains_key(&student_id) {
            return Err(EngineError::NotFound {
                kind: EntityKind::Student,
                id: student_id,
            });
        }
        let group = self
            .state
            .groups
            .get_mut(&group_id)
            .ok_or(EngineError::NotFound {
                kind: EntityKind::Group,
                id: group_id,
            })?;
        if !group.members.contains(&student_id) {
            group.members.push(student_id);
        }
        if let Some(student) = self.state.students.get_mut(&student_id)
            && !student.groups.contains(&group_id)
        {
            student.groups.push(group_id);
        }
        Ok(())
    }

    /// Take a student out of a group. Both sides must exist; removing a
    /// non-member is a no-op.
    pub fn remove_member(&mut self, group_id: i64, student_id: i64) -> Result<(), EngineError> {
        if !self.state.students.contains_key(&student_id) {
            return Err(EngineError::NotFound {
                kind: EntityKind::Student,
                id: student_id,
            });
        }
        let group = self
            .state
            .groups
            .get_mut(&group_id)
            .ok_or(EngineError::NotFound {
                kind: EntityKind::Group,
                id: group_id,
            })?;
        group.members.retain(|member| *member != student_id);
        if let Some(student) = self.state.students.get_mut(&student_id) {
            student.groups.retain(|g| *g != group_id);
        }
        Ok(())
    }

    // ========================================================================
    // Score Events
    // ========================================================================

    /// Record a score change against an existing entity. The delta is the
    /// rounded difference `curr - prev`; the actor is whoever is logged in.
    pub fn add_event(
        &mut self,
        kind: EntityKind,
        subject_id: i64,
        reason: &str,
        prev: f64,
        curr: f64,
    ) -> Result<i64, EngineError> {
        if !self.has_entity(kind, subject_id) {
            return Err(EngineError::NotFound { kind, id: subject_id });
        }
        let actor = self
            .current_user()
            .map(|user| user.username.clone())
            .unwrap_or_default();
        let id = self.next_event_id;
        self.next_event_id += 1;
        self.state.events.insert(
            id,
            ScoreEvent {
                id,
                kind,
                subject_id,
                reason: reason.to_owned(),
                actor,
                delta: (curr - prev).round() as i64,
                at: unix_now(),
                erased: false,
            },
        );
        Ok(id)
    }

    /// Flip the soft-erase flag on an event. Erased events stay in the log.
    pub fn set_event_erased(&mut self, id: i64, erased: bool) -> Result<(), EngineError> {
        let event = self
            .state
            .events
            .get_mut(&id)
            .ok_or(EngineError::EventNotFound(id))?;
        event.erased = erased;
        Ok(())
    }

    pub fn event(&self, id: i64) -> Option<&ScoreEvent> {
        self.state.events.get(&id)
    }

    pub fn events(&self) -> impl Iterator<Item = &ScoreEvent> {
        self.state.events.values()
    }

    /// Events passing `keep`, in ascending id order.
    pub fn events_matching(&self, mut keep: impl FnMut(&ScoreEvent) -> bool) -> Vec<&ScoreEvent> {
        let mut out = Vec::new();
        for event in self.state.events.values() {
            if keep(event) {
                out.push(event);
            }
        }
        out
    }
}

fn bag_matches(
    bag: &PropertyBag,
    schema: &Schema,
    filter: Option<&LogicNode>,
) -> Result<bool, CoreError> {
    match filter {
        None => Ok(true),
        Some(node) => {
            let snapshot = TypedSnapshot::decode(bag, schema);
            predicate::evaluate(&snapshot, node)
        }
    }
}

/// Smallest id not yet used by `map`, never below 1.
fn next_id<T>(map: &BTreeMap<i64, T>) -> i64 {
    map.keys().next_back().map_or(1, |max| (max + 1).max(1))
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}
