pub mod api;
pub mod config;
pub mod container;
pub mod database;
pub mod error;
pub mod network;
pub mod orchestrator;
pub mod proxy;
pub mod server;
pub mod template;
pub mod validation;

pub use config::Config;
pub use error::{ErrorKind, Result, TenantBoxError};
pub use orchestrator::Orchestrator;
