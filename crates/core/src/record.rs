use std::fmt;

use crate::permission::Permission;
use crate::value::PropertyBag;

/// The two entity kinds that carry schemas and property bags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntityKind {
    Student,
    Group,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Student => "student",
            EntityKind::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "student" => Some(EntityKind::Student),
            "group" => Some(EntityKind::Group),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Student {
    pub id: i64,
    pub groups: Vec<i64>,
    pub fields: PropertyBag,
}

impl Student {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Group {
    pub id: i64,
    pub members: Vec<i64>,
    pub fields: PropertyBag,
}

impl Group {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}

/// Audit entry for one score change. Events are never deleted; `erased` is a
/// soft tombstone.
#[derive(Debug, Clone)]
pub struct ScoreEvent {
    pub id: i64,
    pub kind: EntityKind,
    pub subject_id: i64,
    pub reason: String,
    /// Username that performed the change; empty when nobody was logged in.
    pub actor: String,
    /// Rounded difference new score minus old score.
    pub delta: i64,
    /// Unix timestamp in seconds.
    pub at: i64,
    pub erased: bool,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub salt: [u8; 16],
    pub password_hash: [u8; 32],
    pub permission: Permission,
    pub active: bool,
}
