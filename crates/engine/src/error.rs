use tallybook_core::record::EntityKind;
use tallybook_core::{CoreError, Permission};
use tallybook_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("no {0} schema has been defined")]
    SchemaNotDefined(EntityKind),

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: i64 },

    #[error("{kind} {id} already exists")]
    DuplicateId { kind: EntityKind, id: i64 },

    #[error("event {0} not found")]
    EventNotFound(i64),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("username '{0}' is already taken")]
    UsernameTaken(String),

    #[error("user '{0}' not found")]
    UserNotFound(String),

    #[error("not logged in")]
    NotLoggedIn,

    #[error("permission denied: requires {required}")]
    PermissionDenied { required: Permission },

    #[error("refusing to {0} the logged-in account")]
    CurrentUserProtected(&'static str),
}
