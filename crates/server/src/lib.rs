pub mod error;
pub mod handlers;
pub mod json;
pub mod net;
pub mod protocol;

pub use error::ApiError;
pub use net::TcpServer;
