pub mod error;
pub mod schema;
pub mod sqlite;
pub mod state;

pub use error::StorageError;
pub use sqlite::SqliteStorage;
pub use state::StoreState;
