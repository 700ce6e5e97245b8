pub mod auth;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod moderation;
pub mod server;
pub mod store;
pub mod types;

pub use config::Config;
pub use coordinator::Coordinator;
pub use error::{NeighborlyError, Result};
pub use types::*;
