pub mod accessor;
pub mod auth;
pub mod codec;
pub mod error;
pub mod permission;
pub mod predicate;
pub mod record;
pub mod schema;
pub mod snapshot;
pub mod value;

pub use accessor::FieldAccessor;
pub use error::CoreError;
pub use permission::Permission;
pub use predicate::{LogicNode, evaluate};
pub use record::{EntityKind, Group, ScoreEvent, Student, User};
pub use schema::{FieldType, Schema};
pub use snapshot::TypedSnapshot;
pub use value::{FieldValue, PropertyBag};
