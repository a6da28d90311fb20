pub mod store;

pub use store::TestStore;
