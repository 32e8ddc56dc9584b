//! Instance lifecycle: the only component that talks to every other one.

pub mod lifecycle;
pub mod models;
pub mod saga;

pub use lifecycle::Orchestrator;
pub use models::{
    CreateInstanceRequest, CreatedInstance, DeletedInstance, InstanceStatusReport, LifecycleResult, ProxyCleanup,
};
pub use saga::{Compensation, Saga};
