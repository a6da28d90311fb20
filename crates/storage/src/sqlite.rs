use rusqlite::Connection;

use tallybook_core::{
    permission::Permission,
    record::{EntityKind, Group, ScoreEvent, Student, User},
    schema::{FieldType, Schema},
};

use crate::error::StorageError;
use crate::state::StoreState;

/// Fixed-width blob columns arrive as `Vec<u8>`; any other length is corrupt.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Corrupt(format!("invalid {label} length")))
}

fn parse_kind(token: &str) -> Result<EntityKind, StorageError> {
    EntityKind::parse(token)
        .ok_or_else(|| StorageError::Corrupt(format!("unknown entity kind '{token}'")))
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Reads the whole persisted image. Membership rows are fanned out to
    /// both the group's member list and the student's group list.
    pub fn load_state(&self) -> Result<StoreState, StorageError> {
        let mut state = StoreState::default();

        state.student_schema = self.load_schema(EntityKind::Student)?;
        state.group_schema = self.load_schema(EntityKind::Group)?;

        let mut stmt = self.conn.prepare("SELECT id FROM students ORDER BY id")?;
        let student_ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        for id in student_ids {
            state.students.insert(id, Student::new(id));
        }

        let mut stmt = self.conn.prepare("SELECT id FROM groups ORDER BY id")?;
        let group_ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        for id in group_ids {
            state.groups.insert(id, Group::new(id));
        }

        let mut stmt = self
            .conn
            .prepare("SELECT kind, owner_id, name, value FROM fields")?;
        let field_rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (kind, owner_id, name, value) in field_rows {
            let bag = match parse_kind(&kind)? {
                EntityKind::Student => state.students.get_mut(&owner_id).map(|s| &mut s.fields),
                EntityKind::Group => state.groups.get_mut(&owner_id).map(|g| &mut g.fields),
            };
            let bag = bag.ok_or_else(|| {
                StorageError::Corrupt(format!("field row for missing {kind} {owner_id}"))
            })?;
            bag.insert(name, value);
        }

        let mut stmt = self.conn.prepare(
            "SELECT group_id, student_id FROM memberships ORDER BY group_id, student_id",
        )?;
        let membership_rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (group_id, student_id) in membership_rows {
            let group = state.groups.get_mut(&group_id).ok_or_else(|| {
                StorageError::Corrupt(format!("membership row for missing group {group_id}"))
            })?;
            group.members.push(student_id);
            let student = state.students.get_mut(&student_id).ok_or_else(|| {
                StorageError::Corrupt(format!("membership row for missing student {student_id}"))
            })?;
            student.groups.push(group_id);
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, kind, subject_id, reason, actor, delta, at, erased FROM events ORDER BY id",
        )?;
        let event_rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (id, kind, subject_id, reason, actor, delta, at, erased) in event_rows {
            state.events.insert(
                id,
                ScoreEvent {
                    id,
                    kind: parse_kind(&kind)?,
                    subject_id,
                    reason,
                    actor,
                    delta,
                    at,
                    erased: erased != 0,
                },
            );
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, username, salt, password_hash, permission, active FROM users ORDER BY id",
        )?;
        let user_rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (id, username, salt, password_hash, permission, active) in user_rows {
            state.users.insert(
                id,
                User {
                    id,
                    username,
                    salt: to_array::<16>(salt, "salt")?,
                    password_hash: to_array::<32>(password_hash, "password_hash")?,
                    permission: Permission::from_bits(permission as u8),
                    active: active != 0,
                },
            );
        }

        Ok(state)
    }

    /// Replaces the whole persisted image in one transaction: every table is
    /// truncated and rewritten from the in-memory state.
    pub fn save_state(&mut self, state: &StoreState) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;

        tx.execute_batch(
            "DELETE FROM schemas;
             DELETE FROM fields;
             DELETE FROM memberships;
             DELETE FROM students;
             DELETE FROM groups;
             DELETE FROM events;
             DELETE FROM users;",
        )?;

        for (kind, schema) in [
            (EntityKind::Student, &state.student_schema),
            (EntityKind::Group, &state.group_schema),
        ] {
            for (field, field_type) in schema.iter() {
                tx.execute(
                    "INSERT INTO schemas (kind, field, field_type) VALUES (?1, ?2, ?3)",
                    rusqlite::params![kind.as_str(), field, field_type.as_str()],
                )?;
            }
        }

        for (id, student) in &state.students {
            tx.execute(
                "INSERT INTO students (id) VALUES (?1)",
                rusqlite::params![id],
            )?;
            for (name, value) in &student.fields {
                tx.execute(
                    "INSERT INTO fields (kind, owner_id, name, value) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![EntityKind::Student.as_str(), id, name, value],
                )?;
            }
        }

        for (id, group) in &state.groups {
            tx.execute("INSERT INTO groups (id) VALUES (?1)", rusqlite::params![id])?;
            for (name, value) in &group.fields {
                tx.execute(
                    "INSERT INTO fields (kind, owner_id, name, value) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![EntityKind::Group.as_str(), id, name, value],
                )?;
            }
            // the group side is the single source of truth for memberships
            for student_id in &group.members {
                tx.execute(
                    "INSERT INTO memberships (group_id, student_id) VALUES (?1, ?2)",
                    rusqlite::params![id, student_id],
                )?;
            }
        }

        for event in state.events.values() {
            tx.execute(
                "INSERT INTO events (id, kind, subject_id, reason, actor, delta, at, erased)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    event.id,
                    event.kind.as_str(),
                    event.subject_id,
                    event.reason,
                    event.actor,
                    event.delta,
                    event.at,
                    event.erased as i64,
                ],
            )?;
        }

        for user in state.users.values() {
            tx.execute(
                "INSERT INTO users (id, username, salt, password_hash, permission, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    user.id,
                    user.username,
                    &user.salt[..],
                    &user.password_hash[..],
                    user.permission.bits() as i64,
                    user.active as i64,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn load_schema(&self, kind: EntityKind) -> Result<Schema, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT field, field_type FROM schemas WHERE kind = ?1")?;
        let rows = stmt
            .query_map(rusqlite::params![kind.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut schema = Schema::new();
        for (field, token) in rows {
            let field_type = FieldType::parse(&token).ok_or_else(|| {
                StorageError::Corrupt(format!("unknown field type '{token}' for '{field}'"))
            })?;
            schema.declare(field, field_type);
        }
        Ok(schema)
    }
}
