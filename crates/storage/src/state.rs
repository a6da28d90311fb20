use std::collections::BTreeMap;

use tallybook_core::{Group, Schema, ScoreEvent, Student, User};

/// Everything the store persists, as one bulk image. Loaded whole at startup,
/// written whole on every commit; there is no incremental update path.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub student_schema: Schema,
    pub group_schema: Schema,
    pub students: BTreeMap<i64, Student>,
    pub groups: BTreeMap<i64, Group>,
    pub events: BTreeMap<i64, ScoreEvent>,
    pub users: BTreeMap<i64, User>,
}
